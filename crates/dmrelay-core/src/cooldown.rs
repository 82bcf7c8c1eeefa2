//! Per-user cooldown tracking
//!
//! Keeps one expiry timestamp per user in a concurrent cache so that
//! messages from different users never contend on a shared lock. Expired
//! entries are harmless and get reaped by a periodic sweep.

use crate::gateway::UserId;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`.
    #[must_use]
    pub const fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Result of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownStatus {
    /// No live entry; the message may be processed.
    Ready,
    /// The user must wait before sending another message.
    Waiting {
        /// Whole seconds left, rounded up (always at least 1)
        remaining_secs: u64,
    },
}

impl CooldownStatus {
    /// Whether the message may be processed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Tracks the earliest time each user may send the next processed message.
#[derive(Clone)]
pub struct CooldownTracker {
    /// user id -> expiry (ms since epoch)
    entries: Cache<UserId, i64>,
    period: Duration,
}

impl CooldownTracker {
    /// Create a tracker with the given cooldown period and capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use dmrelay_core::cooldown::CooldownTracker;
    /// use std::time::Duration;
    ///
    /// let tracker = CooldownTracker::new(Duration::from_secs(10), 10_000);
    /// assert_eq!(tracker.period(), Duration::from_secs(10));
    /// ```
    #[must_use]
    pub fn new(period: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
            period,
        }
    }

    /// Check whether `user_id` may send a message at `now_ms`.
    pub async fn check(&self, user_id: UserId, now_ms: i64) -> CooldownStatus {
        match self.entries.get(&user_id).await {
            Some(expiry) if expiry > now_ms => {
                let remaining_secs = remaining_secs(expiry - now_ms);
                debug!(user_id, remaining_secs, "User is cooling down");
                CooldownStatus::Waiting { remaining_secs }
            }
            _ => CooldownStatus::Ready,
        }
    }

    /// Start the cooldown for `user_id`: expiry becomes `now_ms + period`.
    pub async fn arm(&self, user_id: UserId, now_ms: i64) {
        let period_ms = i64::try_from(self.period.as_millis()).unwrap_or(i64::MAX);
        self.entries
            .insert(user_id, now_ms.saturating_add(period_ms))
            .await;
    }

    /// Drop the entry for `user_id` so the next message is accepted at once.
    pub async fn release(&self, user_id: UserId) {
        self.entries.invalidate(&user_id).await;
    }

    /// Remove every entry whose expiry is at or before `now_ms`.
    ///
    /// Each removal re-checks the expiry atomically, so an entry re-armed
    /// while the sweep is running survives. Returns the number removed.
    pub async fn sweep(&self, now_ms: i64) -> usize {
        let candidates: Vec<UserId> = self
            .entries
            .iter()
            .filter(|(_, expiry)| *expiry <= now_ms)
            .map(|(user_id, _)| *user_id)
            .collect();

        let mut removed = 0;
        for user_id in candidates {
            let result = self
                .entries
                .entry(user_id)
                .and_compute_with(|entry| async move {
                    match entry {
                        Some(entry) if *entry.value() <= now_ms => Op::Remove,
                        _ => Op::Nop,
                    }
                })
                .await;
            if matches!(result, CompResult::Removed(_)) {
                removed += 1;
            }
        }
        removed
    }

    /// Expiry currently stored for `user_id`, live or not.
    pub async fn expiry_of(&self, user_id: UserId) -> Option<i64> {
        self.entries.get(&user_id).await
    }

    /// Approximate number of stored entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Configured cooldown period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }
}

fn remaining_secs(remaining_ms: i64) -> u64 {
    let remaining_ms = u64::try_from(remaining_ms).unwrap_or(0);
    remaining_ms.div_ceil(1000)
}

/// Run `sweep` every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    tracker: Arc<CooldownTracker>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Cooldown sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = tracker.sweep(clock.now_ms()).await;
                    if removed > 0 {
                        debug!(
                            removed,
                            remaining = tracker.entry_count(),
                            "Swept expired cooldown entries"
                        );
                    }
                }
            }
        }
    })
}
