use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{
    error::Res,
    quota::{QuotaDenial, QuotaScope, QuotaUsage},
};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::{
    admission::Admission,
    window::{Boundary, QuotaWindow},
};

/// Storage of anonymous quota windows keyed by client IP.
#[async_trait]
pub trait GuestQuotaStore: Send + Sync {
    /// Window for `ip` at `now`. A missing or elapsed window is replaced by a fresh one.
    async fn current_window(&self, ip: &str, now: DateTime<Utc>) -> Res<QuotaWindow>;

    /// Counts one extraction. Returns false when `ip` has no window.
    async fn increment(&self, ip: &str) -> Res<bool>;

    /// Drops elapsed windows and returns how many were removed.
    async fn sweep(&self, now: DateTime<Utc>) -> Res<usize>;
}

/// Process-local store. Lost on restart and not shared between instances.
pub struct InMemoryGuestStore {
    entries: DashMap<String, QuotaWindow>,
    window: Duration,
}

impl InMemoryGuestStore {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl GuestQuotaStore for InMemoryGuestStore {
    async fn current_window(&self, ip: &str, now: DateTime<Utc>) -> Res<QuotaWindow> {
        // The entry guard holds the shard lock, so lookup and reset are atomic per key.
        let mut entry = self
            .entries
            .entry(ip.to_string())
            .or_insert_with(|| QuotaWindow::open(now));
        let (window, _) = entry.advance(now, self.window, Boundary::Exceeded);
        *entry = window;
        Ok(window)
    }

    async fn increment(&self, ip: &str) -> Res<bool> {
        match self.entries.get_mut(ip) {
            Some(mut window) => {
                window.count += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Res<usize> {
        let before = self.entries.len();
        self.entries
            .retain(|_, window| !window.is_stale(now, self.window, Boundary::Exceeded));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// Daily extraction quota for callers without an account.
#[derive(Clone)]
pub struct GuestQuotaTracker {
    store: Arc<dyn GuestQuotaStore>,
    limit: i64,
    window: Duration,
}

impl GuestQuotaTracker {
    pub fn new(store: Arc<dyn GuestQuotaStore>, limit: i64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    pub async fn check_and_admit(&self, ip: &str, now: DateTime<Utc>) -> Res<Admission> {
        let window = self.store.current_window(ip, now).await?;
        let usage = QuotaUsage::limited(
            window.count,
            self.limit,
            window.hours_until_reset(now, self.window),
        );

        if window.count >= self.limit {
            log::debug!("Guest {} reached the daily limit", ip);
            return Ok(Admission::Deny(QuotaDenial {
                scope: QuotaScope::GuestLimitReached,
                message: format!(
                    "Guest limit of {} extractions per day reached. Sign in to keep extracting.",
                    self.limit
                ),
                usage,
            }));
        }

        Ok(Admission::Admit(usage))
    }

    /// Never fails: counting is advisory once the extraction succeeded.
    pub async fn increment(&self, ip: &str) {
        match self.store.increment(ip).await {
            Ok(true) => {}
            Ok(false) => log::debug!("Guest {} has no quota window to increment", ip),
            Err(error) => log::warn!("Failed to count guest extraction for {}: {}", ip, error),
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        match self.store.sweep(now).await {
            Ok(removed) => removed,
            Err(error) => {
                log::warn!("Guest quota sweep failed: {}", error);
                0
            }
        }
    }
}

/// Evicts elapsed guest windows every `every` on the Tokio runtime.
pub fn spawn_guest_sweeper(tracker: GuestQuotaTracker, every: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = tracker.sweep(Utc::now()).await;
            if removed > 0 {
                log::info!("Evicted {} stale guest quota entries", removed);
            }
        }
    })
}
