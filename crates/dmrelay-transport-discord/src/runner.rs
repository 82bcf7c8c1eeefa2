use crate::config::BotSettings;
use crate::gateway::DiscordGateway;
use crate::handler::Handler;
use anyhow::{Context as _, Result};
use dmrelay_core::agent::{ConversationalAgent, ToolNameNormalizer};
use dmrelay_core::config::RelaySettings;
use dmrelay_core::cooldown::{spawn_sweeper, Clock, CooldownTracker, SystemClock};
use dmrelay_core::gateway::ChatGateway;
use dmrelay_core::llm::{CurrentTimeTool, OpenAiCompatAgent, ToolRegistry};
use dmrelay_core::purge::HistoryPurge;
use dmrelay_core::router::MessageRouter;
use dmrelay_core::streamer::{ResponseStreamer, StreamSettings};
use serenity::http::Http;
use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Intents needed to read direct-message text.
#[must_use]
pub fn required_intents() -> GatewayIntents {
    GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Run the Discord transport runtime.
///
/// # Errors
///
/// Returns an error if the client cannot be built or the gateway
/// connection terminates with an error (e.g. an invalid token).
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let token = settings.discord.discord_token.clone();
    let relay = settings.relay.as_ref();

    let gateway: Arc<dyn ChatGateway> = Arc::new(DiscordGateway::new(Arc::new(Http::new(&token))));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cooldown = init_cooldown(relay);
    let router = Arc::new(build_router(relay, gateway, Arc::clone(&cooldown), Arc::clone(&clock)));
    info!("Message router initialized.");

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(cooldown, clock, relay.sweep_interval(), cancel.clone());

    let mut client = Client::builder(&token, required_intents())
        .event_handler(Handler::new(router))
        .await
        .context("Failed to build Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Shutdown requested, stopping shards...");
                shutdown.cancel();
                shard_manager.shutdown_all().await;
            }
            () = shutdown.cancelled() => {}
        }
    });

    info!("Bot is running...");
    let result = client.start().await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        error!("Cooldown sweeper task failed: {}", e);
    }

    result.context("Discord client stopped with an error")
}

fn init_cooldown(relay: &RelaySettings) -> Arc<CooldownTracker> {
    info!(
        "Initializing CooldownTracker (period: {}ms, sweep: {}ms, max_entries: {})",
        relay.cooldown_ms, relay.cooldown_sweep_interval_ms, relay.cooldown_max_entries
    );
    Arc::new(CooldownTracker::new(
        relay.cooldown_period(),
        relay.cooldown_max_entries,
    ))
}

fn build_router(
    relay: &RelaySettings,
    gateway: Arc<dyn ChatGateway>,
    cooldown: Arc<CooldownTracker>,
    clock: Arc<dyn Clock>,
) -> MessageRouter {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(CurrentTimeTool));
    let agent: Arc<dyn ConversationalAgent> = Arc::new(OpenAiCompatAgent::new(relay, tools));
    info!(model = %relay.agent_model, "Agent client initialized.");

    let streamer = ResponseStreamer::new(
        agent,
        Arc::clone(&gateway),
        ToolNameNormalizer::new(relay.tool_name_prefix.clone()),
        StreamSettings::from(relay),
    );
    let purge = HistoryPurge::from_settings(Arc::clone(&gateway), relay);

    MessageRouter::new(relay, gateway, cooldown, streamer, purge, clock)
}
