// src/poller.rs
//! Poll cycle: fetch → diff against the seen-set → deliver new notices one
//! at a time → persist the seen-set once.
//!
//! At most one cycle runs at a time. A trigger that arrives while a cycle
//! is running (timer tick or `POST /poll`) is dropped, not queued: the
//! `in_progress` flag is claimed with a compare-exchange and released by
//! [`CycleGuard`] when the cycle ends, even if it panics. The seen-set and
//! the one-shot probe flag sit behind a mutex that is only locked while the
//! flag is held, so that lock is never contended.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::ingest::{self, types::SourceAdapter};
use crate::notice::Notice;
use crate::notify::{self, Transport};
use crate::sanitize;
use crate::seen::{diff_new, SeenSet, SeenStore};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub airport_code: String,
    pub destination: String,
    /// Deliver the most recent notice once after start if nothing is new.
    pub startup_probe: bool,
    /// Pause between two deliveries of the same cycle.
    pub delivery_delay: Duration,
    /// When starting with an empty seen-set, mark the first fetch as seen
    /// without delivering it.
    pub seed_on_cold_start: bool,
    /// Deliver notices whose id is not stable (they repeat every cycle).
    pub allow_unstable_ids: bool,
}

impl PollerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            airport_code: cfg.airport_code.clone(),
            destination: cfg.destination.clone(),
            startup_probe: cfg.startup_probe,
            delivery_delay: cfg.delivery_delay,
            seed_on_cold_start: cfg.seed_on_cold_start,
            allow_unstable_ids: cfg.allow_unstable_ids,
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    /// Notices classified new (before the probe item is added).
    pub new: usize,
    /// Ids marked seen without delivery by cold-start seeding.
    pub seeded: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Whether the startup probe item was queued this cycle.
    pub probe: bool,
    pub fetch_error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Another cycle was running; nothing was done.
    Skipped,
    Completed(CycleReport),
}

impl PollOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            PollOutcome::Skipped => None,
            PollOutcome::Completed(r) => Some(r),
        }
    }
}

#[derive(Debug)]
pub enum ResetError {
    /// A cycle is running; try again once it finishes.
    Busy,
    Persist(anyhow::Error),
}

impl fmt::Display for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetError::Busy => write!(f, "a poll cycle is in progress"),
            ResetError::Persist(e) => write!(f, "clearing seen-set on disk failed: {e:#}"),
        }
    }
}

impl std::error::Error for ResetError {}

struct PollState {
    seen: SeenSet,
    probe_pending: bool,
    /// Seen-set was empty at load and no fetch has succeeded yet.
    cold_start: bool,
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct QueuedNotice {
    notice: Notice,
    probe: bool,
}

pub struct Poller {
    settings: PollerSettings,
    source: Arc<dyn SourceAdapter>,
    transport: Arc<dyn Transport>,
    store: SeenStore,
    in_progress: AtomicBool,
    state: Mutex<PollState>,
    seen_count: AtomicUsize,
    last_report: RwLock<Option<CycleReport>>,
}

impl Poller {
    pub fn new(
        settings: PollerSettings,
        source: Arc<dyn SourceAdapter>,
        transport: Arc<dyn Transport>,
        store: SeenStore,
        seen: SeenSet,
    ) -> Self {
        let count = seen.len();
        gauge!("notam_seen_ids").set(count as f64);
        Self {
            state: Mutex::new(PollState {
                cold_start: seen.is_empty(),
                probe_pending: settings.startup_probe,
                seen,
            }),
            settings,
            source,
            transport,
            store,
            in_progress: AtomicBool::new(false),
            seen_count: AtomicUsize::new(count),
            last_report: RwLock::new(None),
        }
    }

    /// Load the seen-set from `store` and build the poller.
    pub async fn start(
        settings: PollerSettings,
        source: Arc<dyn SourceAdapter>,
        transport: Arc<dyn Transport>,
        store: SeenStore,
    ) -> Self {
        let seen = store.load().await;
        Self::new(settings, source, transport, store, seen)
    }

    /// Wire source, transport and store from configuration.
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let source = ingest::build_source(&cfg.source)?;
        let transport = notify::build_transport(&cfg.transport);
        let store = SeenStore::new(cfg.seen_state_path.clone(), cfg.seen_cap);
        tracing::info!(
            airport = %cfg.airport_code,
            source = source.name(),
            transport = transport.name(),
            state = %store.path().display(),
            "poller configured"
        );
        Ok(Self::start(PollerSettings::from_config(cfg), source, transport, store).await)
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn is_polling(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn seen_count(&self) -> usize {
        self.seen_count.load(Ordering::Relaxed)
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        match self.last_report.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn try_begin(&self) -> Option<CycleGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(&self.in_progress))
    }

    /// Run one cycle, or return [`PollOutcome::Skipped`] immediately if one
    /// is already running.
    pub async fn poll(&self) -> PollOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::info!(airport = %self.settings.airport_code, "poll already in progress, skipping");
            counter!("notam_polls_skipped_total").increment(1);
            return PollOutcome::Skipped;
        };

        let mut state = self.state.lock().await;
        let report = self.run_cycle(&mut state).await;
        drop(state);

        match self.last_report.write() {
            Ok(mut g) => *g = Some(report.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(report.clone()),
        }
        PollOutcome::Completed(report)
    }

    async fn run_cycle(&self, state: &mut PollState) -> CycleReport {
        let started_at = Utc::now();
        let airport = self.settings.airport_code.as_str();

        // 1) fetch; a failed fetch is an empty fetch
        let (fetched, fetch_error) = match self.source.fetch(airport).await {
            Ok(v) => (v, None),
            Err(e) => {
                let msg = format!("{e:#}");
                tracing::warn!(airport, source = self.source.name(), error = %msg, "fetch failed, treating as empty");
                counter!("notam_fetch_errors_total").increment(1);
                (Vec::new(), Some(msg))
            }
        };

        let mut seeded = 0usize;
        if state.cold_start && fetch_error.is_none() {
            state.cold_start = false;
            if self.settings.seed_on_cold_start {
                for n in fetched.iter().filter(|n| n.is_stable()) {
                    if state.seen.mark_seen(&n.id) {
                        seeded += 1;
                    }
                }
                tracing::info!(airport, seeded, "cold start: marked current notices as seen");
            }
        }

        // 2) diff
        let mut fresh = diff_new(&fetched, &state.seen);
        let unstable = fresh.iter().filter(|n| !n.is_stable()).count();
        if unstable > 0 {
            counter!("notam_unstable_ids_total").increment(unstable as u64);
            tracing::warn!(
                airport,
                unstable,
                delivered_anyway = self.settings.allow_unstable_ids,
                "notices without a stable id will be detected as new on every poll"
            );
            if !self.settings.allow_unstable_ids {
                fresh.retain(Notice::is_stable);
            }
        }
        let new_count = fresh.len();

        let mut queue: Vec<QueuedNotice> = fresh
            .into_iter()
            .map(|notice| QueuedNotice {
                notice,
                probe: false,
            })
            .collect();

        // 3) startup probe
        let mut probe = false;
        if state.probe_pending && queue.is_empty() {
            if let Some(first) = fetched.first() {
                tracing::info!(airport, id = %first.id, "startup probe: delivering most recent notice");
                queue.push(QueuedNotice {
                    notice: first.clone(),
                    probe: true,
                });
                probe = true;
            }
        }

        // 4) deliver in fetch order
        let mut delivered = 0usize;
        let mut failed = 0usize;
        let mut attempted = 0usize;
        for item in &queue {
            let notice = &item.notice;
            if !item.probe && state.seen.contains(&notice.id) {
                tracing::debug!(airport, id = %notice.id, "duplicate within fetch, already delivered");
                continue;
            }

            if attempted > 0 && !self.settings.delivery_delay.is_zero() {
                tokio::time::sleep(self.settings.delivery_delay).await;
            }
            attempted += 1;

            let message = sanitize::clean(notice, airport);
            let report = self
                .transport
                .send(&self.settings.destination, &message)
                .await;

            if report.success {
                // Ephemeral ids never recur; keeping them would only evict real ones.
                if notice.is_stable() {
                    state.seen.mark_seen(&notice.id);
                    self.seen_count.store(state.seen.len(), Ordering::Relaxed);
                }
                delivered += 1;
                counter!("notam_delivered_total").increment(1);
                tracing::info!(airport, id = %notice.id, number = ?notice.number, probe = item.probe, "notice delivered");
            } else {
                failed += 1;
                counter!("notam_delivery_failures_total").increment(1);
                tracing::warn!(
                    airport,
                    id = %notice.id,
                    transport = self.transport.name(),
                    error = report.error.as_deref().unwrap_or("unknown"),
                    "delivery failed, will retry next poll"
                );
            }
        }

        // 5) persist once per cycle
        self.store.save(&state.seen).await;
        state.probe_pending = false;
        self.seen_count.store(state.seen.len(), Ordering::Relaxed);

        counter!("notam_polls_total").increment(1);
        gauge!("notam_seen_ids").set(state.seen.len() as f64);
        gauge!("notam_last_poll_ts").set(Utc::now().timestamp().max(0) as f64);

        tracing::info!(
            airport,
            fetched = fetched.len(),
            new = new_count,
            seeded,
            delivered,
            failed,
            probe,
            seen = state.seen.len(),
            "poll cycle finished"
        );

        CycleReport {
            started_at,
            fetched: fetched.len(),
            new: new_count,
            seeded,
            delivered,
            failed,
            probe,
            fetch_error,
        }
    }

    /// Forget every delivered id, in memory and on disk. Refused while a
    /// cycle is running. Returns how many ids were dropped.
    pub async fn reset(&self) -> Result<usize, ResetError> {
        let Some(_guard) = self.try_begin() else {
            return Err(ResetError::Busy);
        };

        let mut state = self.state.lock().await;
        let cleared = state.seen.len();
        state.seen.clear();
        self.seen_count.store(0, Ordering::Relaxed);
        gauge!("notam_seen_ids").set(0.0);
        self.store
            .try_save(&state.seen)
            .await
            .map_err(ResetError::Persist)?;

        tracing::info!(airport = %self.settings.airport_code, cleared, "seen-set reset");
        Ok(cleared)
    }
}
