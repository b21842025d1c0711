use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit, http::StatusCode};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    api,
    auth::AuthService,
    cache::PersistentCache,
    config::AppConfig,
    costs::CostEstimator,
    llm::{GeminiClient, OpenRouterClient, TextGenerator},
    notify::Notifier,
    planner::TripPlanner,
    recommendations::RecommendationEngine,
    routing::{MappingProvider, MappingService, OpenRouteClient},
    store::Store,
    trips::TripPlanService,
};

/// Upstream integrations; `None` disables the feature
#[derive(Clone, Default)]
pub struct Providers {
    pub mapping: Option<Arc<dyn MappingProvider>>,
    pub primary: Option<Arc<dyn TextGenerator>>,
    pub fallback: Option<Arc<dyn TextGenerator>>,
    pub notifier: Notifier,
}

impl Providers {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mapping = OpenRouteClient::from_config(&config.mapping)?
            .map(|client| Arc::new(client) as Arc<dyn MappingProvider>);
        let primary = OpenRouterClient::from_config(&config.openrouter)?
            .map(|client| Arc::new(client) as Arc<dyn TextGenerator>);
        let fallback = GeminiClient::from_config(&config.gemini)?
            .map(|client| Arc::new(client) as Arc<dyn TextGenerator>);

        for (feature, enabled) in [
            ("maps", mapping.is_some()),
            ("openrouter", primary.is_some()),
            ("gemini", fallback.is_some()),
        ] {
            if !enabled {
                tracing::warn!(feature, "no API key configured, feature disabled");
            }
        }

        Ok(Self {
            mapping,
            primary,
            fallback,
            notifier: Notifier::from_config(&config.smtp)?,
        })
    }
}

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub auth: AuthService,
    pub mapping: MappingService,
    pub planner: TripPlanner,
    pub trips: TripPlanService,
    pub recommender: RecommendationEngine,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, store: Store, cache: PersistentCache, providers: Providers) -> Self {
        let mapping = MappingService::new(
            providers.mapping,
            cache.clone(),
            config.cache.geocode_ttl_hours,
        );
        let planner = TripPlanner::new(
            mapping.clone(),
            CostEstimator::new(config.transport.clone()),
            providers.primary,
            providers.fallback,
            cache,
            config.cache.trip_plan_ttl_minutes,
        );
        Self {
            auth: AuthService::new(store.clone(), config.auth.session_ttl_hours),
            trips: TripPlanService::new(store.clone(), providers.notifier),
            recommender: RecommendationEngine::new(config.transport.clone()),
            mapping,
            planner,
            store,
            config: Arc::new(config),
        }
    }
}

/// API under `/api`, the front-end bundle for everything else
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let server = &state.config.server;
    let timeout = Duration::from_secs(server.request_timeout_seconds);

    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(StatusCode::GATEWAY_TIMEOUT, timeout));

    Router::new()
        .nest("/api", api::router())
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .fallback_service(ServeDir::new(&server.static_dir))
        .layer(layers)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

pub async fn run(state: AppState) -> Result<()> {
    let server = state.config.server.clone();
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", server.host, server.port))?;
    let app = app(state);

    if let (Some(cert), Some(key)) = (&server.tls_cert_path, &server.tls_key_path) {
        return serve_tls(app, addr, cert, key).await;
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Web server running at http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

#[cfg(feature = "tls")]
async fn serve_tls(app: Router, addr: SocketAddr, cert: &str, key: &str) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let tls = RustlsConfig::from_pem_file(cert, key)
        .await
        .with_context(|| format!("Failed to load TLS certificate {cert}"))?;
    tracing::info!("Web server running at https://{addr}");
    axum_server::bind_rustls(addr, tls)
        .serve(app.into_make_service())
        .await
        .context("Server error")
}

#[cfg(not(feature = "tls"))]
async fn serve_tls(_app: Router, _addr: SocketAddr, _cert: &str, _key: &str) -> Result<()> {
    anyhow::bail!("TLS certificate configured but the binary was built without the `tls` feature")
}
