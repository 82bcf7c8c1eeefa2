//! HTTP utilities for the agent provider
//!
//! Client construction and conversion of failed responses into
//! [`AgentError`]s.

use crate::agent::AgentError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as HttpClient, Response, StatusCode};
use std::time::Duration;

/// Creates an HTTP client with the given request timeout.
///
/// Falls back to a default client if the builder fails.
#[must_use]
pub fn create_http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Parses a `Retry-After` header given in whole seconds.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Turns a non-success response into an `AgentError`.
///
/// 429 becomes `AgentError::RateLimit`; everything else becomes
/// `AgentError::Api` with HTML error pages suppressed and long bodies
/// truncated.
pub async fn error_from_response(response: Response) -> AgentError {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let wait_secs = parse_retry_after(response.headers());
        let message = response.text().await.unwrap_or_default();
        return AgentError::RateLimit { wait_secs, message };
    }

    let error_text = response.text().await.unwrap_or_default();
    AgentError::Api(clean_error_body(status, &error_text))
}

fn clean_error_body(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("{status} (Server returned HTML error page)");
    }

    if body.chars().count() > 500 {
        format!("{status} - {}... (truncated)", crate::utils::truncate_str(body, 500))
    } else {
        format!("{status} - {body}")
    }
}
