//! User-facing notice texts.

/// Inbound message exceeds the accepted length.
#[must_use]
pub fn message_too_long(max_len: usize) -> String {
    format!("Your message is too long. Please keep it under {max_len} characters.")
}

/// User is still cooling down.
#[must_use]
pub fn cooldown_wait(remaining_secs: u64) -> String {
    let unit = if remaining_secs == 1 { "second" } else { "seconds" };
    format!("Please wait {remaining_secs} {unit} before sending another message.")
}

/// Acknowledges the history clear command.
pub const PURGE_STARTED: &str = "Clearing my messages in this DM, this may take a while...";

/// Reports a finished purge.
#[must_use]
pub fn purge_finished(deleted: usize) -> String {
    let noun = if deleted == 1 { "message" } else { "messages" };
    format!("Done. Deleted {deleted} {noun}.")
}

/// Progress notice for a tool invocation.
#[must_use]
pub fn tool_checking(display_name: &str) -> String {
    format!("Checking `{display_name}`, please wait...")
}

/// A tool invocation failed inside a response.
pub const TOOL_ERROR: &str = "There was an error executing the tool.";

/// The provider throttled the request.
pub const UPSTREAM_RATE_LIMIT: &str =
    "That request was too large for the model right now. Try a shorter message or wait a minute.";

/// Generic failure.
pub const GENERIC_ERROR: &str = "Sorry, I encountered an error. Please try again later.";
