//! Shared HTTP plumbing for upstream APIs: retrying clients and mapping
//! transport failures onto [`TravelError`].

use std::time::Duration;

use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::de::DeserializeOwned;

use crate::TravelError;

pub const USER_AGENT: &str = concat!("TourWithMe/", env!("CARGO_PKG_VERSION"));

/// Longest upstream error body kept in error messages
const MAX_ERROR_BODY: usize = 300;

/// Client with a request timeout and transient-failure retries
pub fn build_client(
    timeout: Duration,
    max_retries: u32,
) -> Result<ClientWithMiddleware, TravelError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| TravelError::config(format!("failed to build HTTP client: {e}")))?;
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Classify a failed send
pub fn send_error(service: &str, timeout: Duration, err: reqwest_middleware::Error) -> TravelError {
    match err {
        reqwest_middleware::Error::Reqwest(e) => request_error(service, timeout, &e),
        reqwest_middleware::Error::Middleware(e) => match transport_cause(&e) {
            Some(inner) => request_error(service, timeout, inner),
            None => TravelError::upstream(service, None, format!("{e:#}")),
        },
    }
}

/// The reqwest failure a retry middleware error wraps, if any
fn transport_cause(err: &anyhow::Error) -> Option<&reqwest::Error> {
    err.chain().find_map(|cause| {
        cause.downcast_ref::<reqwest::Error>().or_else(|| {
            match cause.downcast_ref::<reqwest_middleware::Error>() {
                Some(reqwest_middleware::Error::Reqwest(inner)) => Some(inner),
                _ => None,
            }
        })
    })
}

pub fn request_error(service: &str, timeout: Duration, err: &reqwest::Error) -> TravelError {
    if err.is_timeout() {
        TravelError::upstream_timeout(service, timeout.as_secs())
    } else if err.is_decode() {
        TravelError::invalid_response(service, err.to_string())
    } else {
        TravelError::upstream(service, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Check the status and decode the JSON body
pub async fn read_json<T: DeserializeOwned>(
    service: &str,
    timeout: Duration,
    response: Response,
) -> Result<T, TravelError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| request_error(service, timeout, &e))?;

    if !status.is_success() {
        return Err(status_error(service, status, &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        tracing::debug!(service, error = %e, "undecodable upstream body");
        TravelError::invalid_response(service, e.to_string())
    })
}

fn status_error(service: &str, status: StatusCode, body: &str) -> TravelError {
    let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
    tracing::warn!(service, status = status.as_u16(), body = %snippet, "upstream returned an error");
    TravelError::upstream(service, Some(status.as_u16()), format!("HTTP {status}: {snippet}"))
}

/// Strip a trailing slash so paths can be appended with `/`
#[must_use]
pub fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
