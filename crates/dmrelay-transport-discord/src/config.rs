//! Discord transport settings.

use config::ConfigError;
use dmrelay_core::config::RelaySettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Discord transport settings loaded from environment variables.
#[derive(Deserialize, Serialize, Clone, Default)]
pub struct DiscordSettings {
    /// Discord bot token.
    pub discord_token: String,
}

impl fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordSettings")
            .field("discord_token", &"[MASKED]")
            .finish()
    }
}

impl DiscordSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the token is blank.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = dmrelay_core::config::build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject a blank token before attempting to log in.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` if `discord_token` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord_token.trim().is_empty() {
            return Err(ConfigError::Message(
                "discord_token must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Combined settings used by the Discord transport layer.
#[derive(Clone, Debug)]
pub struct BotSettings {
    /// Relay settings shared across handlers.
    pub relay: Arc<RelaySettings>,
    /// Discord-specific settings.
    pub discord: Arc<DiscordSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(relay: RelaySettings, discord: DiscordSettings) -> Self {
        Self {
            relay: Arc::new(relay),
            discord: Arc::new(discord),
        }
    }
}
