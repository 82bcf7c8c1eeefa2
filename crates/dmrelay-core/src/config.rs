//! Configuration and settings management
//!
//! Loads relay settings from config files and environment variables and
//! defines the pipeline constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Hard length limit of one outbound chat message (characters).
pub const PLATFORM_MESSAGE_LIMIT: usize = 2000;
/// Maximum accepted length of an inbound message (characters).
pub const MAX_INBOUND_LENGTH: usize = 2000;
/// Buffered text is flushed once it grows past this many characters.
pub const FLUSH_THRESHOLD: usize = 1990;
/// Minimum interval between two accepted messages of one user.
pub const COOLDOWN_MS: u64 = 10_000;
/// Period of the expired-cooldown sweep.
pub const COOLDOWN_SWEEP_INTERVAL_MS: u64 = 60_000;
/// Upper bound for tracked cooldown entries.
pub const COOLDOWN_MAX_ENTRIES: u64 = 100_000;
/// Messages fetched per history page during a purge.
pub const PURGE_PAGE_SIZE: u8 = 100;
/// Pause between two deletions during a purge.
pub const PURGE_DELETE_DELAY_MS: u64 = 1000;
/// Reasoning/tool step bound passed to the agent.
pub const AGENT_MAX_STEPS: usize = 10;
/// Literal command that triggers a DM history purge.
pub const CLEAR_COMMAND: &str = "!cleardm";
/// Default OpenAI-compatible API base URL.
pub const AGENT_API_BASE: &str = "https://api.openai.com/v1";
/// Default chat model.
pub const AGENT_MODEL: &str = "gpt-4o-mini";
/// HTTP timeout for one agent request.
pub const AGENT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Transport retry: initial backoff.
pub const TRANSPORT_INITIAL_BACKOFF_MS: u64 = 500;
/// Transport retry: backoff ceiling.
pub const TRANSPORT_MAX_BACKOFF_MS: u64 = 4000;
/// Transport retry: attempts after the first failure.
pub const TRANSPORT_MAX_RETRIES: usize = 3;

/// Settings validation failure.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying config source could not be loaded or deserialized.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A value is out of its allowed range.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// Offending setting name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Relay pipeline settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaySettings {
    /// Maximum accepted inbound message length
    #[serde(default = "default_max_inbound_length")]
    pub max_inbound_length: usize,
    /// Soft threshold that triggers a mid-stream flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Platform hard limit for one outbound message
    #[serde(default = "default_platform_message_limit")]
    pub platform_message_limit: usize,
    /// Cooldown period in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Sweep period in milliseconds
    #[serde(default = "default_cooldown_sweep_interval_ms")]
    pub cooldown_sweep_interval_ms: u64,
    /// Capacity of the cooldown map
    #[serde(default = "default_cooldown_max_entries")]
    pub cooldown_max_entries: u64,
    /// History page size for purges
    #[serde(default = "default_purge_page_size")]
    pub purge_page_size: u8,
    /// Delay between deletions in milliseconds
    #[serde(default = "default_purge_delete_delay_ms")]
    pub purge_delete_delay_ms: u64,
    /// Step bound for the agent
    #[serde(default = "default_agent_max_steps")]
    pub agent_max_steps: usize,
    /// Literal history clear command
    #[serde(default = "default_clear_command")]
    pub clear_command: String,
    /// Prefix stripped from raw tool identifiers for display
    #[serde(default)]
    pub tool_name_prefix: Option<String>,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_agent_api_base")]
    pub agent_api_base: String,
    /// API key for the agent provider
    pub agent_api_key: Option<String>,
    /// Model identifier
    #[serde(default = "default_agent_model")]
    pub agent_model: String,
    /// Optional system prompt
    pub system_message: Option<String>,
    /// HTTP timeout for agent requests
    #[serde(default = "default_agent_http_timeout_secs")]
    pub agent_http_timeout_secs: u64,
}

const fn default_max_inbound_length() -> usize {
    MAX_INBOUND_LENGTH
}

const fn default_flush_threshold() -> usize {
    FLUSH_THRESHOLD
}

const fn default_platform_message_limit() -> usize {
    PLATFORM_MESSAGE_LIMIT
}

const fn default_cooldown_ms() -> u64 {
    COOLDOWN_MS
}

const fn default_cooldown_sweep_interval_ms() -> u64 {
    COOLDOWN_SWEEP_INTERVAL_MS
}

const fn default_cooldown_max_entries() -> u64 {
    COOLDOWN_MAX_ENTRIES
}

const fn default_purge_page_size() -> u8 {
    PURGE_PAGE_SIZE
}

const fn default_purge_delete_delay_ms() -> u64 {
    PURGE_DELETE_DELAY_MS
}

const fn default_agent_max_steps() -> usize {
    AGENT_MAX_STEPS
}

fn default_clear_command() -> String {
    CLEAR_COMMAND.to_string()
}

fn default_agent_api_base() -> String {
    AGENT_API_BASE.to_string()
}

fn default_agent_model() -> String {
    AGENT_MODEL.to_string()
}

const fn default_agent_http_timeout_secs() -> u64 {
    AGENT_HTTP_TIMEOUT_SECS
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_inbound_length: MAX_INBOUND_LENGTH,
            flush_threshold: FLUSH_THRESHOLD,
            platform_message_limit: PLATFORM_MESSAGE_LIMIT,
            cooldown_ms: COOLDOWN_MS,
            cooldown_sweep_interval_ms: COOLDOWN_SWEEP_INTERVAL_MS,
            cooldown_max_entries: COOLDOWN_MAX_ENTRIES,
            purge_page_size: PURGE_PAGE_SIZE,
            purge_delete_delay_ms: PURGE_DELETE_DELAY_MS,
            agent_max_steps: AGENT_MAX_STEPS,
            clear_command: default_clear_command(),
            tool_name_prefix: None,
            agent_api_base: default_agent_api_base(),
            agent_api_key: None,
            agent_model: default_agent_model(),
            system_message: None,
            agent_http_timeout_secs: AGENT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// Builds the layered configuration source shared by all settings structs.
///
/// Order (later wins): `config/default`, `config/{RUN_MODE}`, `config/local`,
/// `APP__*` environment variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE env vars map onto snake_case keys; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl RelaySettings {
    /// Load settings from config files and the environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Config` if loading fails or
    /// `SettingsError::Invalid` if a value is out of range.
    pub fn new() -> Result<Self, SettingsError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.flush_threshold == 0 || self.flush_threshold >= self.platform_message_limit {
            return Err(SettingsError::Invalid {
                field: "flush_threshold",
                reason: format!(
                    "must be in 1..{} (platform limit), got {}",
                    self.platform_message_limit, self.flush_threshold
                ),
            });
        }
        if self.purge_page_size == 0 || self.purge_page_size > 100 {
            return Err(SettingsError::Invalid {
                field: "purge_page_size",
                reason: format!("must be in 1..=100, got {}", self.purge_page_size),
            });
        }
        if self.agent_max_steps == 0 {
            return Err(SettingsError::Invalid {
                field: "agent_max_steps",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.clear_command.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "clear_command",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Cooldown period as a `Duration`.
    #[must_use]
    pub const fn cooldown_period(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Sweep period as a `Duration`.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cooldown_sweep_interval_ms)
    }

    /// Purge inter-delete delay as a `Duration`.
    #[must_use]
    pub const fn purge_delete_delay(&self) -> Duration {
        Duration::from_millis(self.purge_delete_delay_ms)
    }

    /// Agent HTTP timeout as a `Duration`.
    #[must_use]
    pub const fn agent_http_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let settings = RelaySettings::default();
        assert_eq!(settings.max_inbound_length, 2000);
        assert_eq!(settings.flush_threshold, 1990);
        assert_eq!(settings.cooldown_ms, 10_000);
        assert_eq!(settings.cooldown_sweep_interval_ms, 60_000);
        assert_eq!(settings.purge_page_size, 100);
        assert_eq!(settings.purge_delete_delay_ms, 1000);
        assert_eq!(settings.agent_max_steps, 10);
        assert_eq!(settings.clear_command, "!cleardm");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_threshold_must_stay_below_limit() {
        let settings = RelaySettings {
            flush_threshold: 2000,
            ..RelaySettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid {
                field: "flush_threshold",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_steps_rejected() {
        let settings = RelaySettings {
            agent_max_steps: 0,
            ..RelaySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let cfg = Config::builder()
            .set_override("cooldown_ms", 5000)?
            .set_override("tool_name_prefix", "mcp_")?
            .build()?;
        let settings: RelaySettings = cfg.try_deserialize()?;

        assert_eq!(settings.cooldown_ms, 5000);
        assert_eq!(settings.flush_threshold, FLUSH_THRESHOLD);
        assert_eq!(settings.tool_name_prefix.as_deref(), Some("mcp_"));
        assert_eq!(settings.cooldown_period(), Duration::from_secs(5));
        Ok(())
    }
}
