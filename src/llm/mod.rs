//! Language-model text generation for itineraries

pub mod gemini;
pub mod openrouter;
pub mod parse;
pub mod prompt;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::TravelError;

pub use gemini::GeminiClient;
pub use openrouter::OpenRouterClient;
pub use parse::{Itinerary, ItineraryFormat, parse_itinerary, parse_object};

/// A provider that turns a prompt into raw model text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String, TravelError>;
}

type Reply = Arc<dyn Fn() -> Result<String, TravelError> + Send + Sync>;

/// Canned replies for tests and offline development
#[derive(Clone)]
pub struct StubGenerator {
    name: &'static str,
    reply: Reply,
    calls: Arc<AtomicUsize>,
}

impl std::fmt::Debug for StubGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubGenerator")
            .field("name", &self.name)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl StubGenerator {
    #[must_use]
    pub fn replying(name: &'static str, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            name,
            reply: Arc::new(move || Ok(text.clone())),
            calls: Arc::default(),
        }
    }

    #[must_use]
    pub fn failing(
        name: &'static str,
        failure: impl Fn() -> TravelError + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            reply: Arc::new(move || Err(failure())),
            calls: Arc::default(),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn generate(&self, _prompt: &str) -> Result<String, TravelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)()
    }
}
