//! Fetch/cache coordinator shared by every rendering surface.
//!
//! Cached fetches are keyed by the normalized connection config, so two
//! surfaces pointed at the same database share one window of results. The
//! per-key async lock is held across the network call, which also collapses
//! concurrent refreshes into a single upstream fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::notion::NotionError;
use crate::summary::build_summary;
use crate::types::{PluginSettings, QueryConfig, SummaryUpdate, Task};

/// How long a completed fetch satisfies subsequent refreshes.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Upstream task store. The production implementation is
/// [`crate::notion::client::NotionClient`]; tests substitute their own.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_tasks(
        &self,
        config: &QueryConfig,
        for_date: NaiveDate,
    ) -> Result<Vec<Task>, NotionError>;

    async fn update_status(
        &self,
        config: &QueryConfig,
        task_id: &str,
        new_value: &str,
    ) -> Result<(), NotionError>;
}

type Listener = Arc<dyn Fn(&SummaryUpdate) + Send + Sync>;

/// Handle returned by [`TaskCoordinator::subscribe`], used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

#[derive(Default)]
struct CacheEntry {
    tasks: Vec<Task>,
    error: Option<String>,
    /// Set after every completed attempt, success or failure, so a failing
    /// upstream is not hammered on each render tick.
    fetched_at: Option<Instant>,
}

pub struct TaskCoordinator {
    source: Arc<dyn TaskSource>,
    cache: DashMap<String, Arc<AsyncMutex<CacheEntry>>>,
    subscribers: parking_lot::Mutex<Vec<(u64, Listener)>>,
    next_token: AtomicU64,
    latest: parking_lot::Mutex<SummaryUpdate>,
    freshness: Duration,
}

impl TaskCoordinator {
    pub fn new(source: Arc<dyn TaskSource>) -> Self {
        Self::with_freshness(source, FRESHNESS_WINDOW)
    }

    pub fn with_freshness(source: Arc<dyn TaskSource>, freshness: Duration) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            subscribers: parking_lot::Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            latest: parking_lot::Mutex::new(SummaryUpdate::setup()),
            freshness,
        }
    }

    /// Register a listener for summary broadcasts. The current state is
    /// delivered synchronously before this returns, so late subscribers
    /// never render stale-empty.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionToken
    where
        F: Fn(&SummaryUpdate) + Send + Sync + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.subscribers.lock().push((token, listener.clone()));
        let current = self.latest.lock().clone();
        listener(&current);
        SubscriptionToken(token)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.subscribers.lock().retain(|(id, _)| *id != token.0);
    }

    fn broadcast(&self, update: SummaryUpdate) {
        *self.latest.lock() = update.clone();
        // Listeners run outside the lock; one may subscribe or unsubscribe
        // reentrantly.
        let listeners: Vec<Listener> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&update);
        }
    }

    /// The most recently broadcast state.
    pub fn latest(&self) -> SummaryUpdate {
        self.latest.lock().clone()
    }

    /// Refresh from raw per-surface settings. Blank settings broadcast the
    /// setup state; invalid settings broadcast a descriptive error.
    pub async fn refresh_settings(
        &self,
        settings: &PluginSettings,
        for_date: NaiveDate,
        force: bool,
    ) -> SummaryUpdate {
        if settings.is_blank() {
            let update = SummaryUpdate::setup();
            self.broadcast(update.clone());
            return update;
        }
        match settings.normalize() {
            Ok(config) => self.refresh(&config, for_date, force).await,
            Err(message) => {
                let update = SummaryUpdate::error(message);
                self.broadcast(update.clone());
                update
            }
        }
    }

    /// Refresh the summary for one connection config. Returns cached data
    /// when the last fetch is inside the freshness window unless `force` is
    /// set. The summary itself is rebuilt on every call, so display-only
    /// settings take effect without a network round trip.
    pub async fn refresh(
        &self,
        config: &QueryConfig,
        for_date: NaiveDate,
        force: bool,
    ) -> SummaryUpdate {
        let slot = self.slot(&config.cache_key());
        let mut entry = slot.lock().await;

        let fresh = !force
            && entry
                .fetched_at
                .map(|at| at.elapsed() < self.freshness)
                .unwrap_or(false);
        if !fresh {
            match self.source.fetch_tasks(config, for_date).await {
                Ok(tasks) => {
                    log::debug!("refresh: fetched {} tasks", tasks.len());
                    entry.tasks = tasks;
                    entry.error = None;
                }
                Err(err) => {
                    // Keep the previous window's tasks so the display
                    // degrades instead of blanking.
                    log::warn!("refresh: fetch failed: {}", err);
                    entry.error = Some(err.to_string());
                }
            }
            entry.fetched_at = Some(Instant::now());
        }

        let summary = build_summary(
            &entry.tasks,
            &config.done_value,
            &config.meeting_priority,
            &config.metrics_order,
        );
        let update = SummaryUpdate {
            summary: Some(summary),
            error: entry.error.clone(),
        };
        drop(entry);

        self.broadcast(update.clone());
        update
    }

    /// Mark a task done upstream, then drop it from the cached window and
    /// broadcast the trimmed summary before the reconciling refresh lands.
    pub async fn mark_done(
        &self,
        config: &QueryConfig,
        task_id: &str,
        for_date: NaiveDate,
    ) -> Result<(), String> {
        if let Err(err) = self
            .source
            .update_status(config, task_id, &config.done_value)
            .await
        {
            // Surfaces other than the caller learn about the failure too;
            // the last good summary stays on display alongside the error.
            let message = err.to_string();
            log::warn!("mark_done: mutation failed: {}", message);
            let summary = self.latest.lock().summary.clone();
            self.broadcast(SummaryUpdate {
                summary,
                error: Some(message.clone()),
            });
            return Err(message);
        }

        let slot = self.slot(&config.cache_key());
        {
            let mut entry = slot.lock().await;
            entry.tasks.retain(|task| task.id != task_id);
            let summary = build_summary(
                &entry.tasks,
                &config.done_value,
                &config.meeting_priority,
                &config.metrics_order,
            );
            self.broadcast(SummaryUpdate {
                summary: Some(summary),
                error: entry.error.clone(),
            });
        }

        self.refresh(config, for_date, true).await;
        Ok(())
    }

    /// Drop all cached windows. The next refresh for any config fetches.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<CacheEntry>> {
        self.cache
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(CacheEntry::default())))
            .clone()
    }
}
