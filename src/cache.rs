use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::Mutex;

use crate::fetchers::fetcher::{FetchError, Fetcher};

/// Freshness tag carried by every [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Produced by the most recent successful fetch.
    Fresh,
    /// Previously fetched value retained after a failed refresh attempt.
    Stale,
    /// Caller-supplied default, no fetch has succeeded yet.
    Placeholder,
}

/// Immutable captured value plus capture time and freshness tag.
#[derive(Debug)]
pub struct Snapshot<Data> {
    // Arc ensures that when old snapshot is swapped out, data is not dropped if it is still in use somewhere
    value: Arc<Data>,
    captured_at: SystemTime,
    validity: Validity,
}

impl<Data> Snapshot<Data> {
    fn placeholder(value: Data) -> Self {
        Snapshot {
            value: Arc::new(value),
            captured_at: SystemTime::now(),
            validity: Validity::Placeholder,
        }
    }

    fn fresh(value: Data) -> Self {
        Snapshot {
            value: Arc::new(value),
            captured_at: SystemTime::now(),
            validity: Validity::Fresh,
        }
    }

    /// Same value and capture time, downgraded after a failed refresh.
    /// A placeholder stays a placeholder; there is nothing to go stale.
    fn degraded(&self) -> Self {
        Snapshot {
            value: Arc::clone(&self.value),
            captured_at: self.captured_at,
            validity: match self.validity {
                Validity::Placeholder => Validity::Placeholder,
                _ => Validity::Stale,
            },
        }
    }

    pub fn value(&self) -> &Data {
        &self.value
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }
}

/// Rule determining when the next refresh should occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// No further refresh is ever scheduled.
    Never,
    /// One refresh, `delay` after the instant the schedule is queried.
    /// Re-armed by each completed refresh (or by
    /// [`RefreshingSnapshotCache::reset_schedule`]).
    After(Duration),
    /// Refreshes on a fixed grid anchored at the current snapshot's capture
    /// time.
    AtFixedInterval(Duration),
}

/// Cache holding exactly one current [`Snapshot`], refreshed through a
/// [`Fetcher`].
///
/// [`current`](Self::current) is lock-free and never blocks on a refresh.
/// [`refresh`](Self::refresh) performs at most one fetch at a time per
/// instance: callers arriving while a fetch is in flight observe that fetch's
/// outcome instead of issuing a duplicate remote call. Fetch failures never
/// reach the caller; the snapshot degrades to [`Validity::Stale`] and the
/// failure is recorded for observability.
pub struct RefreshingSnapshotCache<Data: Send + Sync, F: Fetcher<Data>> {
    name: String,
    fetcher: F,
    policy: RefreshPolicy,
    snapshot: ArcSwap<Snapshot<Data>>,
    refresh_lock: Mutex<()>,
    // Incremented once per completed refresh. Lets a caller that waited on
    // the lock tell whether a refresh finished in the meantime.
    refresh_epoch: AtomicU64,
    schedule_spent: AtomicBool,
    failure_count: AtomicU64,
    last_failure: ArcSwapOption<FetchError>,
}

impl<Data: Send + Sync, F: Fetcher<Data>> RefreshingSnapshotCache<Data, F> {
    /// Creates a cache seeded with `placeholder`, tagged
    /// [`Validity::Placeholder`]. `name` identifies the instance in logs.
    pub fn new(name: String, placeholder: Data, fetcher: F, policy: RefreshPolicy) -> Self {
        RefreshingSnapshotCache {
            name,
            fetcher,
            policy,
            snapshot: ArcSwap::from_pointee(Snapshot::placeholder(placeholder)),
            refresh_lock: Mutex::new(()),
            refresh_epoch: AtomicU64::new(0),
            schedule_spent: AtomicBool::new(false),
            failure_count: AtomicU64::new(0),
            last_failure: ArcSwapOption::const_empty(),
        }
    }

    /// Returns the current snapshot immediately. Never blocks, never fetches.
    pub fn current(&self) -> Arc<Snapshot<Data>> {
        self.snapshot.load_full()
    }

    /// Fetches a new value and returns the resulting snapshot.
    ///
    /// If another refresh is already in flight, waits for it and returns its
    /// outcome without invoking the fetcher again. On fetch failure the
    /// previous snapshot is kept, re-tagged [`Validity::Stale`] (a
    /// placeholder stays a placeholder), and the error is recorded; failures
    /// are never raised to the caller.
    pub async fn refresh(&self) -> Arc<Snapshot<Data>> {
        let entered_at = self.refresh_epoch.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;
        if self.refresh_epoch.load(Ordering::Acquire) != entered_at {
            // A refresh completed while we waited for the lock; its outcome
            // is the current snapshot.
            return self.snapshot.load_full();
        }

        let next = match self.fetcher.fetch().await {
            Ok(value) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(cache = %self.name, "snapshot refreshed");
                self.last_failure.store(None);
                Arc::new(Snapshot::fresh(value))
            }
            Err(error) => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                tracing::warn!(cache = %self.name, %error, "fetch failed, keeping previous snapshot");
                self.last_failure.store(Some(Arc::new(error)));
                Arc::new(self.snapshot.load().degraded())
            }
        };

        self.snapshot.store(Arc::clone(&next));
        // New refresh cycle: re-arm a one-shot After schedule.
        self.schedule_spent.store(false, Ordering::Release);
        self.refresh_epoch.fetch_add(1, Ordering::Release);
        next
    }

    /// Computes the next instant a refresh should be attempted, or `None` if
    /// the policy schedules no further refresh.
    ///
    /// [`RefreshPolicy::After`] yields an instant once per refresh cycle and
    /// `None` afterwards until re-armed. [`RefreshPolicy::AtFixedInterval`]
    /// yields the smallest grid point strictly after `from`, anchored at the
    /// current snapshot's capture time. Zero-duration policies schedule
    /// nothing.
    pub fn next_refresh_at(&self, from: SystemTime) -> Option<SystemTime> {
        match self.policy {
            RefreshPolicy::Never => None,
            RefreshPolicy::After(delay) => {
                if delay.is_zero() || self.schedule_spent.swap(true, Ordering::AcqRel) {
                    None
                } else {
                    Some(from + delay)
                }
            }
            RefreshPolicy::AtFixedInterval(interval) => {
                if interval.is_zero() {
                    return None;
                }
                let anchor = self.snapshot.load().captured_at;
                let elapsed = from
                    .duration_since(anchor)
                    .unwrap_or(Duration::ZERO)
                    .as_nanos();
                let periods = elapsed / interval.as_nanos() + 1;
                let offset = interval
                    .as_nanos()
                    .checked_mul(periods)
                    .and_then(|nanos| u64::try_from(nanos).ok())
                    .map(Duration::from_nanos)?;
                Some(anchor + offset)
            }
        }
    }

    /// Re-arms a spent [`RefreshPolicy::After`] schedule without refreshing.
    pub fn reset_schedule(&self) {
        self.schedule_spent.store(false, Ordering::Release);
    }

    /// Drives the cache from its own policy: sleeps until each
    /// [`next_refresh_at`](Self::next_refresh_at) instant and refreshes.
    /// Returns once the policy yields no further instant.
    pub async fn run_scheduled(&self) {
        loop {
            let Some(at) = self.next_refresh_at(SystemTime::now()) else {
                break;
            };
            if let Ok(delay) = at.duration_since(SystemTime::now()) {
                tokio::time::sleep(delay).await;
            }
            self.refresh().await;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Number of failed fetch attempts since creation.
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Error recorded by the most recent failed refresh, cleared by the next
    /// successful one.
    pub fn last_failure(&self) -> Option<Arc<FetchError>> {
        self.last_failure.load_full()
    }
}
