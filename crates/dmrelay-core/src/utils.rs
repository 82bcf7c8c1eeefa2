//! Utility functions
//!
//! Text chunking helpers and a retry wrapper for chat transport calls.

use crate::config::{
    TRANSPORT_INITIAL_BACKOFF_MS, TRANSPORT_MAX_BACKOFF_MS, TRANSPORT_MAX_RETRIES,
};
use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use unicode_segmentation::UnicodeSegmentation;
use tracing::warn;

/// Removes and returns the longest prefix of `buffer` that fits in
/// `max_chars` characters without splitting a grapheme cluster.
///
/// A single grapheme wider than `max_chars` is cut at a char boundary.
///
/// # Examples
///
/// ```
/// use dmrelay_core::utils::take_prefix;
///
/// let mut buffer = String::from("hello world");
/// assert_eq!(take_prefix(&mut buffer, 5), "hello");
/// assert_eq!(buffer, " world");
/// ```
pub fn take_prefix(buffer: &mut String, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }

    let mut taken_chars = 0;
    let mut cut = 0;
    for (idx, grapheme) in buffer.grapheme_indices(true) {
        let width = grapheme.chars().count();
        if taken_chars + width > max_chars {
            break;
        }
        taken_chars += width;
        cut = idx + grapheme.len();
    }

    if cut == 0 && !buffer.is_empty() {
        cut = buffer
            .char_indices()
            .nth(max_chars)
            .map_or(buffer.len(), |(pos, _)| pos);
    }

    let rest = buffer.split_off(cut);
    std::mem::replace(buffer, rest)
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use dmrelay_core::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Retry a chat transport operation with exponential backoff.
///
/// Backoff starts at 500ms, is capped at 4s, carries jitter and gives up
/// after three retries, returning the last error.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_transport_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TRANSPORT_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TRANSPORT_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TRANSPORT_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Transport operation failed after {} attempts: {}",
            TRANSPORT_MAX_RETRIES + 1,
            e
        );
        e
    })
}
