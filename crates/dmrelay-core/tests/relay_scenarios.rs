use dmrelay_core::agent::{
    AgentError, AgentOptions, ConversationalAgent, EventStream, StreamEvent, ToolNameNormalizer,
};
use dmrelay_core::config::RelaySettings;
use dmrelay_core::cooldown::{Clock, CooldownTracker, ManualClock};
use dmrelay_core::gateway::{
    ChannelId, ChannelKind, ChatGateway, GatewayError, HistoryMessage, InboundMessage, MessageId,
};
use dmrelay_core::notices;
use dmrelay_core::purge::HistoryPurge;
use dmrelay_core::router::{MessageRouter, RouteOutcome};
use dmrelay_core::streamer::{ResponseStreamer, StreamSettings};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const USER: u64 = 7;
const CHANNEL: u64 = 99;
const START: i64 = 1_700_000_000_000;

#[derive(Clone, Copy)]
struct StoredMessage {
    id: MessageId,
    by_self: bool,
}

/// In-memory channel that records every call.
#[derive(Default)]
struct FakeGateway {
    history: Mutex<Vec<StoredMessage>>,
    sent: Mutex<Vec<String>>,
    fetch_cursors: Mutex<Vec<Option<MessageId>>>,
    deleted: Mutex<Vec<MessageId>>,
    next_id: AtomicUsize,
}

impl FakeGateway {
    fn with_history(messages: impl IntoIterator<Item = (MessageId, bool)>) -> Self {
        let history = messages
            .into_iter()
            .map(|(id, by_self)| StoredMessage { id, by_self })
            .collect();
        Self {
            history: Mutex::new(history),
            next_id: AtomicUsize::new(10_000),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn cursors(&self) -> Vec<Option<MessageId>> {
        self.fetch_cursors
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn deleted_count(&self) -> usize {
        self.deleted.lock().map(|d| d.len()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ChatGateway for FakeGateway {
    async fn send_message(
        &self,
        _channel: ChannelId,
        text: &str,
    ) -> Result<MessageId, GatewayError> {
        self.sent
            .lock()
            .map_err(|e| GatewayError::Send(e.to_string()))?
            .push(text.to_string());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) as u64)
    }

    async fn fetch_messages(
        &self,
        _channel: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> Result<Vec<HistoryMessage>, GatewayError> {
        self.fetch_cursors
            .lock()
            .map_err(|e| GatewayError::Fetch(e.to_string()))?
            .push(before);
        let history = self
            .history
            .lock()
            .map_err(|e| GatewayError::Fetch(e.to_string()))?;
        let mut page: Vec<HistoryMessage> = history
            .iter()
            .filter(|m| before.map_or(true, |b| m.id < b))
            .map(|m| HistoryMessage {
                id: m.id,
                authored_by_self: m.by_self,
                deletable: true,
            })
            .collect();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(usize::from(limit));
        Ok(page)
    }

    async fn delete_message(
        &self,
        _channel: ChannelId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        self.history
            .lock()
            .map_err(|e| GatewayError::Delete(e.to_string()))?
            .retain(|m| m.id != message);
        self.deleted
            .lock()
            .map_err(|e| GatewayError::Delete(e.to_string()))?
            .push(message);
        Ok(())
    }

    async fn start_typing(&self, _channel: ChannelId) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Agent that replays a fixed script and counts invocations.
struct ScriptedAgent {
    script: Vec<StreamEvent>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    fn new(script: Vec<StreamEvent>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConversationalAgent for ScriptedAgent {
    async fn stream(&self, _text: &str, _options: AgentOptions) -> Result<EventStream, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let events: Vec<Result<StreamEvent, AgentError>> =
            self.script.iter().cloned().map(Ok).collect();
        Ok(futures_util::stream::iter(events).boxed())
    }
}

struct Harness {
    router: MessageRouter,
    gateway: Arc<FakeGateway>,
    agent: Arc<ScriptedAgent>,
    clock: Arc<ManualClock>,
}

fn harness(gateway: FakeGateway, agent: ScriptedAgent) -> Harness {
    let settings = RelaySettings {
        tool_name_prefix: Some("mcp_".to_string()),
        ..RelaySettings::default()
    };
    let gateway = Arc::new(gateway);
    let agent = Arc::new(agent);
    let clock = Arc::new(ManualClock::new(START));

    let dyn_gateway: Arc<dyn ChatGateway> = gateway.clone();
    let streamer = ResponseStreamer::new(
        agent.clone(),
        Arc::clone(&dyn_gateway),
        ToolNameNormalizer::new(settings.tool_name_prefix.clone()),
        StreamSettings::from(&settings),
    );
    let purge = HistoryPurge::from_settings(Arc::clone(&dyn_gateway), &settings);
    let cooldown = Arc::new(CooldownTracker::new(
        settings.cooldown_period(),
        settings.cooldown_max_entries,
    ));
    let router = MessageRouter::new(
        &settings,
        dyn_gateway,
        cooldown,
        streamer,
        purge,
        clock.clone() as Arc<dyn Clock>,
    );

    Harness {
        router,
        gateway,
        agent,
        clock,
    }
}

fn dm(content: &str) -> InboundMessage {
    InboundMessage {
        author_id: USER,
        author_is_bot: false,
        channel_id: CHANNEL,
        channel_kind: ChannelKind::Direct,
        content: content.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn clear_command_purges_all_bot_messages_in_two_pages() {
    let gateway = FakeGateway::with_history((1..=150).map(|id| (id, true)));
    let h = harness(gateway, ScriptedAgent::new(Vec::new()));

    let outcome = h.router.handle(&dm("!cleardm")).await;

    assert_eq!(outcome, RouteOutcome::Purged { deleted: 150 });
    assert_eq!(h.gateway.deleted_count(), 150);
    assert_eq!(h.gateway.cursors(), vec![None, Some(51)]);
    assert_eq!(
        h.gateway.sent(),
        vec![
            notices::PURGE_STARTED.to_string(),
            notices::purge_finished(150)
        ]
    );
    assert_eq!(h.agent.calls(), 0);
    assert_eq!(h.router.cooldown().expiry_of(USER).await, None);
}

#[tokio::test(start_paused = true)]
async fn clear_command_stops_at_page_without_bot_messages() {
    // Newest page holds only user messages; older bot messages are left alone
    let history = (1..=100)
        .map(|id| (id, true))
        .chain((101..=200).map(|id| (id, false)));
    let h = harness(FakeGateway::with_history(history), ScriptedAgent::new(Vec::new()));

    let outcome = h.router.handle(&dm("!cleardm")).await;

    // A page with zero bot messages ends the purge
    assert_eq!(outcome, RouteOutcome::Purged { deleted: 0 });
    assert_eq!(h.gateway.cursors(), vec![None]);
}

#[tokio::test]
async fn long_response_is_split_at_flush_threshold() {
    let script: Vec<StreamEvent> = (0..30)
        .map(|i| StreamEvent::text(char::from(b'a' + (i % 26) as u8).to_string().repeat(100)))
        .chain(std::iter::once(StreamEvent::Finish {
            reason: Some("stop".to_string()),
        }))
        .collect();
    let expected: String = script
        .iter()
        .filter_map(|e| match e {
            StreamEvent::TextDelta { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    let h = harness(FakeGateway::default(), ScriptedAgent::new(script));

    let outcome = h.router.handle(&dm("tell me a story")).await;

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].chars().count(), 1990);
    assert_eq!(sent[1].chars().count(), 1010);
    assert_eq!(sent.concat(), expected);
    match outcome {
        RouteOutcome::Relayed(report) => {
            assert_eq!(report.messages_sent, 2);
            assert_eq!(report.chars_relayed, 3000);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn repeated_tool_is_announced_once_and_errors_do_not_stop_the_stream() {
    let script = vec![
        StreamEvent::tool_started("mcp_search"),
        StreamEvent::ToolResult {
            tool_name: "mcp_search".to_string(),
            payload: serde_json::json!({ "hits": 1 }),
        },
        StreamEvent::tool_started("mcp_search"),
        StreamEvent::Error {
            cause: "search backend down".to_string(),
        },
        StreamEvent::text("Here is what I found."),
        StreamEvent::Finish { reason: None },
    ];
    let h = harness(FakeGateway::default(), ScriptedAgent::new(script));

    let outcome = h.router.handle(&dm("look it up")).await;

    assert_eq!(
        h.gateway.sent(),
        vec![
            notices::tool_checking("search"),
            notices::TOOL_ERROR.to_string(),
            "Here is what I found.".to_string(),
        ]
    );
    assert!(matches!(outcome, RouteOutcome::Relayed(_)));
}

#[tokio::test]
async fn cooldown_blocks_then_reopens_after_period() {
    let h = harness(
        FakeGateway::default(),
        ScriptedAgent::new(vec![StreamEvent::text("hi")]),
    );

    assert!(matches!(
        h.router.handle(&dm("hello")).await,
        RouteOutcome::Relayed(_)
    ));
    assert_eq!(
        h.router.cooldown().expiry_of(USER).await,
        Some(START + 10_000)
    );

    h.clock.advance(Duration::from_millis(3_000));
    assert_eq!(
        h.router.handle(&dm("again")).await,
        RouteOutcome::CoolingDown { remaining_secs: 7 }
    );

    h.clock.advance(Duration::from_millis(7_000));
    assert!(matches!(
        h.router.handle(&dm("and again")).await,
        RouteOutcome::Relayed(_)
    ));
    assert_eq!(h.agent.calls(), 2);
}

#[tokio::test]
async fn sweep_is_idempotent_and_spares_live_entries() {
    let tracker = CooldownTracker::new(Duration::from_secs(10), 1_000);
    tracker.arm(1, START).await;
    tracker.arm(2, START + 5_000).await;

    let now = START + 10_000;
    assert_eq!(tracker.sweep(now).await, 1);
    assert_eq!(tracker.sweep(now).await, 0);
    assert_eq!(tracker.expiry_of(1).await, None);
    assert_eq!(tracker.expiry_of(2).await, Some(START + 15_000));
}
