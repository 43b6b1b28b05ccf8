//! Icon cache manager
//!
//! Owns the icon store, the set of in-flight fetches and the statistics
//! counters behind one mutex, so every mutation (a commit, an eviction, a
//! clear) is observed as a single step. The lock is never held across an
//! `.await` or a filesystem call; fetches run on spawned tasks and re-acquire
//! it only to commit, and disk changes are queued on a `DiskJournal` under the
//! lock and applied after it is released.
//!
//! Concurrent requests for an identifier that is already being fetched join
//! the existing fetch instead of starting another one. `clear_cache` bumps a
//! generation counter; a fetch that started under an older generation runs to
//! completion but its result is discarded instead of committed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::disk::{DiskCache, DiskJournal, DiskOp};
use crate::cache::stats::{CacheStats, Counters};
use crate::cache::store::CacheStore;
use crate::config::{CacheConfig, FailurePolicy};
use crate::constants::ModuleConstants;
use crate::error::{CacheError, FetchError};
use crate::fetch::IconFetcher;
use crate::icon::{IconAsset, IconName};

type FetchOutcome = Result<(), FetchError>;

/// Callers waiting on one in-flight fetch
///
/// The generation a fetch was dispatched under travels with its task, not
/// with this entry: `clear_cache` drops every entry at once.
struct InFlight {
    waiters: Vec<oneshot::Sender<FetchOutcome>>,
}

impl InFlight {
    fn notify(self, outcome: &FetchOutcome) {
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// A fetch that has been committed (or rejected) but whose waiters have not
/// been told yet
struct Settled {
    flight: Option<InFlight>,
    outcome: FetchOutcome,
}

impl Settled {
    fn notify(self) {
        if let Some(flight) = self.flight {
            flight.notify(&self.outcome);
        }
    }
}

/// Everything guarded by the manager's lock
struct CacheState {
    store: CacheStore,
    in_flight: HashMap<IconName, InFlight>,
    generation: u64,
    counters: Counters,
}

struct Inner {
    config: CacheConfig,
    constants: ModuleConstants,
    fetcher: Arc<dyn IconFetcher>,
    journal: Option<DiskJournal>,
    state: Mutex<CacheState>,
}

/// Outcome of a `prefetch_icons` call
///
/// Each distinct requested identifier appears in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Identifiers that were already cached when the call was made
    pub already_cached: Vec<IconName>,
    /// Identifiers whose fetch (possibly shared with another caller) succeeded
    pub fetched: Vec<IconName>,
    /// Identifiers whose fetch failed, with the reason
    pub failed: Vec<(IconName, FetchError)>,
}

impl PrefetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Caches fetched icons under a byte capacity bound
///
/// Cloning is cheap and every clone shares the same cache.
#[derive(Clone)]
pub struct IconCacheManager {
    inner: Arc<Inner>,
}

impl IconCacheManager {
    /// Creates a manager, restoring persisted icons if a persistence directory
    /// is configured
    ///
    /// # Returns
    /// * `Ok(IconCacheManager)` ready for use
    /// * `Err(CacheError::CapacityMisconfigured)` if the capacity is zero
    /// * `Err(CacheError::Persistence)` if the persistence directory cannot be
    ///   created or listed
    pub fn new(config: CacheConfig, fetcher: Arc<dyn IconFetcher>) -> Result<Self, CacheError> {
        config.validate()?;

        let disk = config.persist_dir.clone().map(DiskCache::with_dir);
        let mut store = CacheStore::new();
        if let Some(disk) = &disk {
            restore(disk, &mut store, config.capacity_bytes)?;
        }

        let constants = ModuleConstants::from_config(&config);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                constants,
                fetcher,
                journal: disk.map(DiskJournal::new),
                state: Mutex::new(CacheState {
                    store,
                    in_flight: HashMap::new(),
                    generation: 0,
                    counters: Counters::default(),
                }),
            }),
        })
    }

    /// Makes sure every identifier in `names` is cached
    ///
    /// Duplicates are requested once. Cached identifiers count as hits and are
    /// marked as recently used; identifiers already being fetched by another
    /// caller join that fetch. Resolves once every identifier is cached or
    /// has failed.
    ///
    /// # Returns
    /// * `Ok(PrefetchReport)` listing what was cached, fetched and failed
    /// * `Err(CacheError::InvalidIdentifier)` before anything is dispatched if
    ///   any identifier is malformed
    /// * `Err(CacheError::PrefetchFailed)` if a fetch failed under
    ///   `FailurePolicy::Fatal`
    pub async fn prefetch_icons<S: AsRef<str>>(&self, names: &[S]) -> Result<PrefetchReport, CacheError> {
        let names = IconName::parse_all(names)?;

        let mut report = PrefetchReport::default();
        let mut pending = Vec::new();
        let mut dispatch = Vec::new();
        let generation;
        {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            generation = state.generation;
            let mut seen = HashSet::new();

            for name in names {
                if !seen.insert(name.clone()) {
                    continue;
                }
                if state.store.touch(&name).is_some() {
                    state.counters.hits += 1;
                    self.inner.record_access(&name);
                    report.already_cached.push(name);
                    continue;
                }
                state.counters.misses += 1;

                let (tx, rx) = oneshot::channel();
                match state.in_flight.get_mut(&name) {
                    Some(flight) => {
                        debug!(icon = %name, "joining in-flight fetch");
                        flight.waiters.push(tx);
                    }
                    None => {
                        state.in_flight.insert(
                            name.clone(),
                            InFlight { waiters: vec![tx] },
                        );
                        dispatch.push(name.clone());
                    }
                }
                pending.push((name, rx));
            }
        }

        for name in dispatch {
            self.dispatch(name, generation);
        }

        let outcomes = join_all(pending.into_iter().map(|(name, rx)| async move {
            // A dropped sender means the fetch task was torn down before reporting
            let outcome = rx.await.unwrap_or(Err(FetchError::Aborted));
            (name, outcome)
        }))
        .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => report.fetched.push(name),
                Err(e) => report.failed.push((name, e)),
            }
        }

        if self.inner.config.failure_policy == FailurePolicy::Fatal && !report.failed.is_empty() {
            return Err(CacheError::PrefetchFailed {
                failures: report.failed,
            });
        }
        Ok(report)
    }

    /// Spawns the fetch for `name`; the task commits its own result so the
    /// fetch completes even if every waiting caller goes away
    ///
    /// Waiters are notified only after the commit has reached disk.
    fn dispatch(&self, name: IconName, generation: u64) {
        debug!(icon = %name, generation, "dispatching fetch");
        let mut task = FetchTask {
            inner: Arc::clone(&self.inner),
            name,
            generation,
            reported: false,
        };
        tokio::spawn(async move {
            let result = task.inner.fetcher.fetch(&task.name).await;
            task.reported = true;
            let settled = task.inner.complete(&task.name, task.generation, result);
            task.inner.flush_journal().await;
            if let Some(settled) = settled {
                settled.notify();
            }
        });
    }

    /// Returns the cached asset for `name`, marking it as recently used
    ///
    /// Counts a hit or a miss. Never fetches; malformed identifiers yield
    /// `None` without touching the counters. With persistence on, the access
    /// time is written back when the journal is next flushed.
    pub fn get_icon(&self, name: &str) -> Option<IconAsset> {
        let name = IconName::parse(name).ok()?;
        let mut state = self.inner.lock();
        let asset = state.store.touch(&name);
        if asset.is_some() {
            state.counters.hits += 1;
            self.inner.record_access(&name);
        } else {
            state.counters.misses += 1;
        }
        asset
    }

    /// Whether `name` has a committed entry
    ///
    /// Side-effect free: no fetch, no counter or recency update.
    pub fn is_cached(&self, name: &str) -> bool {
        match IconName::parse(name) {
            Ok(name) => self.inner.lock().store.contains(&name),
            Err(_) => false,
        }
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        let state = self.inner.lock();
        CacheStats {
            count: state.store.len() as u64,
            total_bytes: state.store.total_bytes(),
            hits: state.counters.hits,
            misses: state.counters.misses,
            evictions: state.counters.evictions,
            failures: state.counters.failures,
            in_flight: state.in_flight.len() as u64,
            capacity_bytes: self.inner.config.capacity_bytes,
        }
    }

    /// Empties the cache and resets the counters
    ///
    /// In-flight fetches are not interrupted. They finish under a stale
    /// generation and are discarded; callers waiting on them are released
    /// right away with `FetchError::Cancelled`. Clearing an empty cache is a
    /// no-op apart from the generation bump. Persisted files are removed on
    /// the calling thread after the state lock is released.
    pub fn clear_cache(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        let generation = state.generation;
        let removed = state.store.len();
        let cancelled: Vec<InFlight> = state.in_flight.drain().map(|(_, flight)| flight).collect();
        state.store.clear();
        state.counters = Counters::default();
        if let Some(journal) = &self.inner.journal {
            journal.enqueue(DiskOp::Clear);
        }
        drop(state);

        info!(generation, removed, cancelled = cancelled.len(), "icon cache cleared");
        for flight in cancelled {
            flight.notify(&Err(FetchError::Cancelled));
        }
        if let Some(journal) = &self.inner.journal {
            journal.flush();
        }
    }

    /// Constants fixed when the manager was built
    pub fn constants(&self) -> &ModuleConstants {
        &self.inner.constants
    }
}

/// Owns one dispatched fetch until it reports
///
/// If the task is dropped before it reports (the fetcher panicked, or the
/// runtime shut down mid-fetch), the drop settles the fetch as
/// `FetchError::Aborted` so its waiters are released and the identifier can
/// be fetched again.
struct FetchTask {
    inner: Arc<Inner>,
    name: IconName,
    generation: u64,
    reported: bool,
}

impl Drop for FetchTask {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        if let Some(settled) = self.inner.complete(&self.name, self.generation, Err(FetchError::Aborted)) {
            settled.notify();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Mutations complete before the guard drops, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an access-time write back; called with the state lock held
    fn record_access(&self, name: &IconName) {
        if let Some(journal) = &self.journal {
            journal.enqueue(DiskOp::Touch {
                name: name.clone(),
                at: Utc::now(),
            });
        }
    }

    /// Commits a finished fetch
    ///
    /// Returns the waiters to notify, or `None` if the fetch belongs to a
    /// generation that has since been cleared. Disk changes are only queued.
    fn complete(&self, name: &IconName, generation: u64, result: Result<IconAsset, FetchError>) -> Option<Settled> {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(icon = %name, generation, current = state.generation, "discarding stale fetch");
            return None;
        }

        let flight = state.in_flight.remove(name);
        let capacity = self.config.capacity_bytes;
        let outcome = match result {
            Ok(asset) if asset.size() > capacity => Err(FetchError::TooLarge {
                size: asset.size(),
                capacity,
            }),
            Ok(asset) => {
                let cached_at = Utc::now();
                let size = asset.size();
                if let Some(journal) = &self.journal {
                    journal.enqueue(DiskOp::Write {
                        name: name.clone(),
                        asset: asset.clone(),
                        cached_at,
                    });
                }
                state.store.insert(name.clone(), asset, cached_at);

                let evicted = state.store.evict_to_fit(capacity);
                state.counters.evictions += evicted.len() as u64;
                for victim in &evicted {
                    debug!(icon = %victim, "evicted");
                    if let Some(journal) = &self.journal {
                        journal.enqueue(DiskOp::Remove(victim.clone()));
                    }
                }
                debug!(icon = %name, size, evicted = evicted.len(), "icon cached");
                Ok(())
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            state.counters.failures += 1;
            warn!(icon = %name, error = %e, "icon fetch failed");
        }
        Some(Settled { flight, outcome })
    }

    /// Applies queued disk changes on the blocking pool
    async fn flush_journal(self: &Arc<Self>) {
        let has_pending = self.journal.as_ref().is_some_and(DiskJournal::has_pending);
        if !has_pending {
            return;
        }
        let inner = Arc::clone(self);
        let flushed = tokio::task::spawn_blocking(move || {
            if let Some(journal) = &inner.journal {
                journal.flush();
            }
        })
        .await;
        if let Err(e) = flushed {
            warn!(error = %e, "disk flush task failed");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Access times queued by reads have no flush of their own
        if let Some(journal) = &self.journal {
            journal.flush();
        }
    }
}

/// Loads persisted icons into `store`, least recently accessed first, then
/// trims it to `capacity`
fn restore(disk: &DiskCache, store: &mut CacheStore, capacity: u64) -> Result<(), CacheError> {
    let persistence = |e: std::io::Error| CacheError::Persistence(format!("{}: {}", disk.dir().display(), e));

    disk.ensure_dir().map_err(persistence)?;
    let icons = disk.load().map_err(persistence)?;
    let loaded = icons.len();

    for icon in icons {
        store.insert(icon.name, icon.asset, icon.cached_at);
    }
    let trimmed = store.evict_to_fit(capacity);
    for name in &trimmed {
        if let Err(e) = disk.remove(name) {
            warn!(icon = %name, error = %e, "failed to remove persisted icon");
        }
    }

    info!(
        dir = %disk.dir().display(),
        loaded,
        trimmed = trimmed.len(),
        "restored persisted icons"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Scripted fetcher: serves `size`-byte assets, fails or panics on
    /// configured names, counts dispatches and can hold fetches until released
    #[derive(Default)]
    struct MockFetcher {
        sizes: HashMap<String, usize>,
        failing: HashSet<String>,
        panicking: HashSet<String>,
        calls: Mutex<HashMap<String, usize>>,
        started: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self::default()
        }

        fn icon(mut self, name: &str, size: usize) -> Self {
            self.sizes.insert(name.to_string(), size);
            self
        }

        fn failing(mut self, name: &str) -> Self {
            self.failing.insert(name.to_string());
            self
        }

        fn panicking(mut self, name: &str) -> Self {
            self.panicking.insert(name.to_string());
            self
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn calls(&self, name: &str) -> usize {
            self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
        }
    }

    impl IconFetcher for MockFetcher {
        fn fetch<'a>(&'a self, name: &'a IconName) -> BoxFuture<'a, Result<IconAsset, FetchError>> {
            Box::pin(async move {
                *self
                    .calls
                    .lock()
                    .unwrap()
                    .entry(name.as_str().to_string())
                    .or_default() += 1;
                self.started.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if self.panicking.contains(name.as_str()) {
                    panic!("fetcher crashed on {}", name);
                }
                if self.failing.contains(name.as_str()) {
                    return Err(FetchError::Status(500));
                }
                let size = self.sizes.get(name.as_str()).copied().unwrap_or(10);
                Ok(IconAsset::svg(vec![b'x'; size]))
            })
        }
    }

    fn persistent_config(capacity: u64, dir: &TempDir) -> CacheConfig {
        CacheConfig {
            capacity_bytes: capacity,
            persist_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    fn manager(capacity: u64, fetcher: Arc<MockFetcher>) -> IconCacheManager {
        let config = CacheConfig {
            capacity_bytes: capacity,
            ..Default::default()
        };
        IconCacheManager::new(config, fetcher).expect("manager should build")
    }

    async fn wait_for_started(fetcher: &MockFetcher, count: usize) {
        for _ in 0..200 {
            if fetcher.started.load(Ordering::SeqCst) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("fetches never started");
    }

    #[test]
    fn test_zero_capacity_refuses_to_initialize() {
        let config = CacheConfig {
            capacity_bytes: 0,
            ..Default::default()
        };
        let result = IconCacheManager::new(config, Arc::new(MockFetcher::new()));
        assert!(matches!(result, Err(CacheError::CapacityMisconfigured(0))));
    }

    #[tokio::test]
    async fn test_prefetch_caches_icons() {
        let fetcher = Arc::new(MockFetcher::new().icon("mdi:home", 100));
        let cache = manager(1000, fetcher.clone());

        let report = cache.prefetch_icons(&["mdi:home"]).await.unwrap();

        assert_eq!(report.fetched, vec![IconName::parse("mdi:home").unwrap()]);
        assert!(report.is_complete());
        assert!(cache.is_cached("mdi:home"));

        let stats = cache.get_cache_stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.total_bytes, 100);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_prefetch_deduplicates_and_skips_cached() {
        let fetcher = Arc::new(MockFetcher::new());
        let cache = manager(1000, fetcher.clone());

        cache.prefetch_icons(&["a"]).await.unwrap();
        let report = cache.prefetch_icons(&["a", "b", "b", "a"]).await.unwrap();

        assert_eq!(report.already_cached, vec![IconName::parse("a").unwrap()]);
        assert_eq!(report.fetched, vec![IconName::parse("b").unwrap()]);
        assert_eq!(fetcher.calls("a"), 1);
        assert_eq!(fetcher.calls("b"), 1);

        let stats = cache.get_cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_invalid_identifier_rejects_before_dispatch() {
        let fetcher = Arc::new(MockFetcher::new());
        let cache = manager(1000, fetcher.clone());

        let err = cache.prefetch_icons(&["ok", ""]).await.unwrap_err();

        assert_eq!(err.code(), "E_INVALID_ICON");
        assert_eq!(fetcher.calls("ok"), 0);
        let stats = cache.get_cache_stats();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_concurrent_prefetch_coalesces() {
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(MockFetcher::new().gated(gate.clone()));
        let cache = manager(1000, fetcher.clone());

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["a"]).await }
        });
        wait_for_started(&fetcher, 1).await;
        let second = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["a"]).await }
        });
        // Let the second caller register before releasing the fetch
        while cache.get_cache_stats().misses < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.get_cache_stats().in_flight, 1);
        gate.notify_one();

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(fetcher.calls("a"), 1);
        assert_eq!(first.fetched.len(), 1);
        assert_eq!(second.fetched.len(), 1);
        assert!(cache.is_cached("a"));
    }

    #[tokio::test]
    async fn test_failures_are_absorbed_in_best_effort_mode() {
        let fetcher = Arc::new(MockFetcher::new().failing("x"));
        let cache = manager(1000, fetcher);

        let report = cache.prefetch_icons(&["x", "y"]).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1, FetchError::Status(500));
        assert!(!cache.is_cached("x"));
        assert!(cache.is_cached("y"));

        let stats = cache.get_cache_stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn test_fatal_mode_rejects_batch_but_keeps_successes() {
        let config = CacheConfig {
            capacity_bytes: 1000,
            failure_policy: FailurePolicy::Fatal,
            ..Default::default()
        };
        let cache =
            IconCacheManager::new(config, Arc::new(MockFetcher::new().failing("x"))).unwrap();

        let err = cache.prefetch_icons(&["x", "y"]).await.unwrap_err();

        assert_eq!(err.code(), "E_PREFETCH_FAILED");
        assert!(cache.is_cached("y"));
    }

    #[tokio::test]
    async fn test_failed_identifier_is_retried() {
        let fetcher = Arc::new(MockFetcher::new().failing("x"));
        let cache = manager(1000, fetcher.clone());

        cache.prefetch_icons(&["x"]).await.unwrap();
        cache.prefetch_icons(&["x"]).await.unwrap();

        assert_eq!(fetcher.calls("x"), 2);
    }

    #[tokio::test]
    async fn test_panicking_fetch_releases_waiters() {
        let fetcher = Arc::new(MockFetcher::new().panicking("boom"));
        let cache = manager(1000, fetcher.clone());

        let report = tokio::time::timeout(Duration::from_secs(2), cache.prefetch_icons(&["boom", "ok"]))
            .await
            .expect("prefetch should not hang on a crashed fetch")
            .unwrap();

        assert_eq!(
            report.failed,
            vec![(IconName::parse("boom").unwrap(), FetchError::Aborted)]
        );
        assert!(cache.is_cached("ok"));
        let stats = cache.get_cache_stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.failures, 1);

        // The identifier is not stuck in flight: a retry dispatches again
        let retry = tokio::time::timeout(Duration::from_secs(2), cache.prefetch_icons(&["boom"]))
            .await
            .expect("retry should not hang")
            .unwrap();
        assert_eq!(retry.failed.len(), 1);
        assert_eq!(fetcher.calls("boom"), 2);
    }

    #[tokio::test]
    async fn test_panicking_fetch_releases_joined_waiters() {
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(MockFetcher::new().panicking("boom").gated(gate.clone()));
        let cache = manager(1000, fetcher.clone());

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["boom"]).await }
        });
        wait_for_started(&fetcher, 1).await;
        let second = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["boom"]).await }
        });
        while cache.get_cache_stats().misses < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        for handle in [first, second] {
            let report = tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("joined caller should not hang")
                .unwrap()
                .unwrap();
            assert_eq!(report.failed[0].1, FetchError::Aborted);
        }
        assert_eq!(fetcher.calls("boom"), 1);
        assert_eq!(cache.get_cache_stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_scenario() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .icon("A", 100)
                .icon("B", 100)
                .icon("C", 100)
                .icon("D", 100),
        );
        let cache = manager(300, fetcher);

        for name in ["A", "B", "C"] {
            cache.prefetch_icons(&[name]).await.unwrap();
        }
        assert!(cache.get_icon("A").is_some());
        cache.prefetch_icons(&["D"]).await.unwrap();

        assert!(!cache.is_cached("B"));
        assert!(cache.is_cached("A"));
        assert!(cache.is_cached("C"));
        assert!(cache.is_cached("D"));

        let stats = cache.get_cache_stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.total_bytes, 300);
    }

    #[tokio::test]
    async fn test_oversized_icon_is_not_admitted() {
        let fetcher = Arc::new(MockFetcher::new().icon("big", 500).icon("small", 10));
        let cache = manager(100, fetcher);

        let report = cache.prefetch_icons(&["small", "big"]).await.unwrap();

        assert_eq!(
            report.failed,
            vec![(
                IconName::parse("big").unwrap(),
                FetchError::TooLarge {
                    size: 500,
                    capacity: 100
                }
            )]
        );
        assert!(cache.is_cached("small"));
        assert_eq!(cache.get_cache_stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_is_cached_has_no_side_effects() {
        let cache = manager(1000, Arc::new(MockFetcher::new()));
        cache.prefetch_icons(&["a"]).await.unwrap();
        let before = cache.get_cache_stats();

        for _ in 0..3 {
            assert!(cache.is_cached("a"));
            assert!(!cache.is_cached("b"));
            assert!(!cache.is_cached(""));
        }

        assert_eq!(cache.get_cache_stats(), before);
    }

    #[tokio::test]
    async fn test_get_icon_counts_hits_and_misses() {
        let fetcher = Arc::new(MockFetcher::new().icon("a", 4));
        let cache = manager(1000, fetcher.clone());
        cache.prefetch_icons(&["a"]).await.unwrap();

        assert_eq!(cache.get_icon("a").unwrap().data, b"xxxx");
        assert!(cache.get_icon("b").is_none());

        let stats = cache.get_cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(fetcher.calls("b"), 0);
    }

    #[tokio::test]
    async fn test_clear_cache_resets_store_and_counters() {
        let cache = manager(1000, Arc::new(MockFetcher::new()));
        cache.prefetch_icons(&["a", "b"]).await.unwrap();

        cache.clear_cache();

        assert!(!cache.is_cached("a"));
        assert!(!cache.is_cached("b"));
        let stats = cache.get_cache_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.misses, 0);

        // Idempotent
        cache.clear_cache();
        assert_eq!(cache.get_cache_stats().count, 0);
    }

    #[tokio::test]
    async fn test_stale_fetch_is_discarded_after_clear() {
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(MockFetcher::new().gated(gate.clone()));
        let cache = manager(1000, fetcher.clone());

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["a"]).await }
        });
        wait_for_started(&fetcher, 1).await;

        cache.clear_cache();
        let report = pending.await.unwrap().unwrap();
        assert_eq!(report.failed[0].1, FetchError::Cancelled);

        // The old fetch finishes after the clear and must not resurrect "a"
        gate.notify_one();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cache.is_cached("a"));
        assert_eq!(cache.get_cache_stats().count, 0);
    }

    #[tokio::test]
    async fn test_prefetch_after_clear_dispatches_new_fetch() {
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(MockFetcher::new().gated(gate.clone()));
        let cache = manager(1000, fetcher.clone());

        let stale = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["a"]).await }
        });
        wait_for_started(&fetcher, 1).await;
        cache.clear_cache();
        stale.await.unwrap().unwrap();

        let fresh = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["a"]).await }
        });
        wait_for_started(&fetcher, 2).await;
        assert_eq!(fetcher.calls("a"), 2);

        // Release both fetches; only the fresh one commits
        gate.notify_waiters();
        let report = fresh.await.unwrap().unwrap();
        assert_eq!(report.fetched.len(), 1);
        assert!(cache.is_cached("a"));
        assert_eq!(cache.get_cache_stats().count, 1);
    }

    #[tokio::test]
    async fn test_persisted_icons_survive_restart() {
        let temp_dir = TempDir::new().unwrap();
        let config = CacheConfig {
            capacity_bytes: 1000,
            persist_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let fetcher = Arc::new(MockFetcher::new().icon("mdi:home", 50));

        let cache = IconCacheManager::new(config.clone(), fetcher.clone()).unwrap();
        cache.prefetch_icons(&["mdi:home"]).await.unwrap();
        drop(cache);

        let reopened = IconCacheManager::new(config.clone(), fetcher.clone()).unwrap();
        assert!(reopened.is_cached("mdi:home"));
        assert_eq!(reopened.get_cache_stats().total_bytes, 50);
        assert!(reopened.constants().persistent);

        reopened.clear_cache();
        drop(reopened);
        let cleared = IconCacheManager::new(config, fetcher).unwrap();
        assert!(!cleared.is_cached("mdi:home"));
    }

    #[tokio::test]
    async fn test_restart_keeps_access_recency() {
        let temp_dir = TempDir::new().unwrap();
        let config = persistent_config(300, &temp_dir);
        let fetcher = Arc::new(
            MockFetcher::new()
                .icon("A", 100)
                .icon("B", 100)
                .icon("C", 100)
                .icon("D", 100),
        );

        let cache = IconCacheManager::new(config.clone(), fetcher.clone()).unwrap();
        for name in ["A", "B", "C"] {
            cache.prefetch_icons(&[name]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(cache.get_icon("A").is_some());
        drop(cache);

        let reopened = IconCacheManager::new(config, fetcher).unwrap();
        reopened.prefetch_icons(&["D"]).await.unwrap();

        assert!(!reopened.is_cached("B"));
        assert!(reopened.is_cached("A"));
        assert!(reopened.is_cached("C"));
        assert!(reopened.is_cached("D"));
    }

    #[tokio::test]
    async fn test_prefetch_hit_refreshes_persisted_recency() {
        let temp_dir = TempDir::new().unwrap();
        let config = persistent_config(200, &temp_dir);
        let fetcher = Arc::new(MockFetcher::new().icon("A", 100).icon("B", 100).icon("C", 100));

        let cache = IconCacheManager::new(config.clone(), fetcher.clone()).unwrap();
        cache.prefetch_icons(&["A"]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.prefetch_icons(&["B"]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let report = cache.prefetch_icons(&["A"]).await.unwrap();
        assert_eq!(report.already_cached.len(), 1);
        drop(cache);

        let reopened = IconCacheManager::new(config, fetcher).unwrap();
        reopened.prefetch_icons(&["C"]).await.unwrap();

        assert!(reopened.is_cached("A"));
        assert!(!reopened.is_cached("B"));
    }

    #[tokio::test]
    async fn test_commit_is_on_disk_when_prefetch_resolves() {
        let temp_dir = TempDir::new().unwrap();
        let config = persistent_config(1000, &temp_dir);
        let cache = IconCacheManager::new(config, Arc::new(MockFetcher::new().icon("a", 7))).unwrap();

        cache.prefetch_icons(&["a"]).await.unwrap();

        // Read the directory directly while the manager is still alive
        let icons = DiskCache::with_dir(temp_dir.path().to_path_buf()).load().unwrap();
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[0].asset.size(), 7);
    }

    #[tokio::test]
    async fn test_stale_fetch_is_not_persisted_after_clear() {
        let temp_dir = TempDir::new().unwrap();
        let config = persistent_config(1000, &temp_dir);
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(MockFetcher::new().gated(gate.clone()));
        let cache = IconCacheManager::new(config.clone(), fetcher.clone()).unwrap();

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.prefetch_icons(&["a"]).await }
        });
        wait_for_started(&fetcher, 1).await;
        cache.clear_cache();
        pending.await.unwrap().unwrap();

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(cache);

        assert!(DiskCache::with_dir(temp_dir.path().to_path_buf()).load().unwrap().is_empty());
        let reopened = IconCacheManager::new(config, fetcher).unwrap();
        assert!(!reopened.is_cached("a"));
    }

    #[tokio::test]
    async fn test_restore_trims_to_smaller_capacity() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new().icon("old", 100).icon("new", 100));
        let config = CacheConfig {
            capacity_bytes: 1000,
            persist_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let cache = IconCacheManager::new(config.clone(), fetcher.clone()).unwrap();
        cache.prefetch_icons(&["old"]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.prefetch_icons(&["new"]).await.unwrap();
        drop(cache);

        let smaller = CacheConfig {
            capacity_bytes: 150,
            ..config
        };
        let reopened = IconCacheManager::new(smaller, fetcher).unwrap();

        assert!(reopened.is_cached("new"));
        assert!(!reopened.is_cached("old"));
        assert_eq!(reopened.get_cache_stats().evictions, 0);
    }
}
