//! Async memoization for virtual directories.
//!
//! A [`Loader`] combines three things per logical key: a bounded LRU cache
//! of successful results, single-flight sharing of an attempt sequence that
//! is already running, and a retry loop with per-attempt timeout and
//! exponential backoff. Failures are returned as data in [`LoadReport`].

use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::error::{BoxError, LoadError};
use crate::tree::{Resolver, Tree};
use crate::validate::validate;

/// Tunables for a [`Loader`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    pub capacity: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    /// Cached results older than this are treated as missing
    pub ttl: Option<Duration>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            capacity: 32,
            max_retries: 2,
            retry_delay: Duration::from_millis(300),
            timeout: Duration::from_secs(10),
            ttl: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Skip both the cache and any in-flight sequence
    pub force_reload: bool,
    /// Per-attempt timeout; the loader default when `None`
    pub timeout: Option<Duration>,
}

impl LoadOptions {
    pub fn force() -> Self {
        Self {
            force_reload: true,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Served from the cache without running the fetcher
    Cache,
    /// This call ran the attempt sequence
    Fetched,
    /// This call joined a sequence started by another caller
    Shared,
}

#[derive(Debug, Clone)]
pub struct LoadReport<V> {
    pub value: Result<V, LoadError>,
    /// Attempts beyond the first
    pub retries: u32,
    pub source: LoadSource,
}

impl<V> LoadReport<V> {
    pub fn is_ok(&self) -> bool {
        self.value.is_ok()
    }
}

type Check<V> = Arc<dyn Fn(&V) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
struct Outcome<V> {
    value: Result<V, LoadError>,
    retries: u32,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

struct Flight<V> {
    generation: u64,
    cell: Arc<OnceCell<Outcome<V>>>,
}

struct State<V> {
    cache: LruCache<String, CacheEntry<V>>,
    in_flight: HashMap<String, Flight<V>>,
    next_generation: u64,
}

pub struct Loader<V> {
    settings: LoaderSettings,
    check: Option<Check<V>>,
    state: Mutex<State<V>>,
}

impl<V> Loader<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(settings: LoaderSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            settings,
            check: None,
            state: Mutex::new(State {
                cache: LruCache::new(capacity),
                in_flight: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    /// Run `check` on every successful fetch before it is cached
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&V) -> Result<(), String> + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Load the value for `key`, running `fetcher` only when neither the
    /// cache nor an in-flight sequence can answer.
    pub async fn load<F, Fut>(&self, key: &str, fetcher: F, options: LoadOptions) -> LoadReport<V>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, BoxError>>,
    {
        let timeout = options.timeout.unwrap_or(self.settings.timeout);

        let (cell, generation, source) = {
            let mut state = self.lock();

            if !options.force_reload {
                if let Some(value) = Self::cached(&mut state, key, self.settings.ttl) {
                    log::debug!("loader: cache hit for {}", key);
                    return LoadReport {
                        value: Ok(value),
                        retries: 0,
                        source: LoadSource::Cache,
                    };
                }
                if let Some(flight) = state.in_flight.get(key) {
                    log::debug!("loader: joining in-flight load for {}", key);
                    (flight.cell.clone(), flight.generation, LoadSource::Shared)
                } else {
                    Self::start_flight(&mut state, key)
                }
            } else {
                log::debug!("loader: forced reload for {}", key);
                Self::start_flight(&mut state, key)
            }
        };

        let outcome = cell
            .get_or_init(|| self.run_attempts(key, &fetcher, timeout))
            .await
            .clone();
        self.settle(key, generation, &outcome);

        LoadReport {
            value: outcome.value,
            retries: outcome.retries,
            source,
        }
    }

    /// Drop the cached value for `key`
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().cache.pop(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().cache.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().cache.contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently cached, most recently used first
    pub fn cached_keys(&self) -> Vec<String> {
        self.lock().cache.iter().map(|(k, _)| k.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached(state: &mut State<V>, key: &str, ttl: Option<Duration>) -> Option<V> {
        let expired = match state.cache.get(key) {
            None => return None,
            Some(entry) => ttl.map_or(false, |ttl| entry.inserted_at.elapsed() > ttl),
        };
        if expired {
            log::debug!("loader: cached value for {} expired", key);
            state.cache.pop(key);
            return None;
        }
        state.cache.peek(key).map(|entry| entry.value.clone())
    }

    fn start_flight(state: &mut State<V>, key: &str) -> (Arc<OnceCell<Outcome<V>>>, u64, LoadSource) {
        let generation = state.next_generation;
        state.next_generation += 1;
        let cell = Arc::new(OnceCell::new());
        state.in_flight.insert(
            key.to_string(),
            Flight {
                generation,
                cell: cell.clone(),
            },
        );
        (cell, generation, LoadSource::Fetched)
    }

    /// Retire the flight and cache its value, unless a newer flight replaced it
    fn settle(&self, key: &str, generation: u64, outcome: &Outcome<V>) {
        let mut state = self.lock();
        let current = state.in_flight.get(key).map(|flight| flight.generation);
        if current != Some(generation) {
            return;
        }
        state.in_flight.remove(key);
        if let Ok(value) = &outcome.value {
            let evicted = state.cache.push(
                key.to_string(),
                CacheEntry {
                    value: value.clone(),
                    inserted_at: Instant::now(),
                },
            );
            if let Some((old_key, _)) = evicted {
                if old_key != key {
                    log::debug!("loader: evicted {}", old_key);
                }
            }
        }
    }

    async fn run_attempts<F, Fut>(&self, key: &str, fetcher: &F, timeout: Duration) -> Outcome<V>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, BoxError>>,
    {
        let attempts = self.settings.max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            log::info!("loader: {} attempt {}/{}", key, attempt + 1, attempts);
            match tokio::time::timeout(timeout, fetcher()).await {
                Ok(Ok(value)) => {
                    if let Some(check) = &self.check {
                        if let Err(message) = check(&value) {
                            log::warn!("loader: {} returned an invalid result: {}", key, message);
                            return Outcome {
                                value: Err(LoadError::invalid(key, message, attempt + 1)),
                                retries: attempt,
                            };
                        }
                    }
                    return Outcome {
                        value: Ok(value),
                        retries: attempt,
                    };
                }
                Ok(Err(e)) => {
                    log::warn!("loader: {} attempt {} failed: {}", key, attempt + 1, e);
                    last_error = Some(LoadError::fetch(key, e.to_string(), attempt + 1));
                }
                Err(_) => {
                    log::warn!("loader: {} attempt {} timed out", key, attempt + 1);
                    last_error = Some(LoadError::timeout(key, timeout, attempt + 1));
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        let error = last_error.unwrap_or_else(|| LoadError::fetch(key, "no attempt was made", 0));
        log::error!("loader: giving up on {}: {}", key, error);
        Outcome {
            value: Err(error),
            retries: attempts - 1,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .retry_delay
            .saturating_mul(1u32 << attempt.min(16))
    }
}

/// Loader specialised for virtual directory content
pub type DirectoryLoader = Loader<Arc<Tree>>;

impl DirectoryLoader {
    /// A loader that validates every resolved tree before caching it
    pub fn for_directories(settings: LoaderSettings) -> Self {
        Loader::new(settings).with_check(|tree: &Arc<Tree>| {
            let report = validate(tree);
            if report.is_valid() {
                Ok(())
            } else {
                Err(report.to_string())
            }
        })
    }

    pub async fn load_directory(
        &self,
        key: &str,
        resolver: &Resolver,
        options: LoadOptions,
    ) -> LoadReport<Arc<Tree>> {
        self.load(
            key,
            || {
                let pending = resolver.resolve();
                async move { pending.await.map(Arc::new) }
            },
            options,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadErrorKind;
    use crate::tree::Node;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> LoaderSettings {
        LoaderSettings {
            capacity: 2,
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
            ttl: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_fetch() {
        let loader: Loader<u32> = Loader::new(settings());
        let calls = AtomicUsize::new(0);
        let fetcher = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(7)
            }
        };

        let (a, b) = tokio::join!(
            loader.load("k", fetcher, LoadOptions::default()),
            loader.load("k", fetcher, LoadOptions::default())
        );
        assert_eq!(a.value, Ok(7));
        assert_eq!(b.value, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.source, LoadSource::Fetched);
        assert_eq!(b.source, LoadSource::Shared);

        let c = loader.load("k", fetcher, LoadOptions::default()).await;
        assert_eq!(c.source, LoadSource::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let d = loader.load("k", fetcher, LoadOptions::force()).await;
        assert_eq!(d.source, LoadSource::Fetched);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let loader: Loader<&'static str> = Loader::new(settings());
        let calls = AtomicUsize::new(0);
        let report = loader
            .load(
                "flaky",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err::<&'static str, BoxError>("not yet".into())
                        } else {
                            Ok("third")
                        }
                    }
                },
                LoadOptions::default(),
            )
            .await;
        assert_eq!(report.value, Ok("third"));
        assert_eq!(report.retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_retry_count_does_not_overflow() {
        let loader: Loader<u8> = Loader::new(LoaderSettings {
            max_retries: u32::MAX,
            ..settings()
        });
        let calls = AtomicUsize::new(0);
        let report = loader
            .load(
                "k",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err::<u8, BoxError>("first".into())
                        } else {
                            Ok(1)
                        }
                    }
                },
                LoadOptions::default(),
            )
            .await;
        assert_eq!(report.value, Ok(1));
        assert_eq!(report.retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_attempts() {
        let loader: Loader<u8> = Loader::new(settings());
        let start = Instant::now();
        let report = loader
            .load("down", || async { Err::<u8, BoxError>("down".into()) }, LoadOptions::default())
            .await;
        // 100ms after the first failure, 200ms after the second
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(300), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(400), "waited {:?}", waited);
        let err = report.value.unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::Fetch);
        assert_eq!(err.attempts, 3);
        assert_eq!(report.retries, 2);
        assert!(!loader.contains("down"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let loader: Loader<u8> = Loader::new(LoaderSettings {
            max_retries: 0,
            ..settings()
        });
        let report = loader
            .load(
                "slow",
                || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<u8, BoxError>(1)
                },
                LoadOptions {
                    force_reload: false,
                    timeout: Some(Duration::from_millis(10)),
                },
            )
            .await;
        assert_eq!(report.value.unwrap_err().kind, LoadErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_lru_eviction_and_promotion() {
        let loader: Loader<u8> = Loader::new(settings());
        let ok = |v: u8| move || async move { Ok::<u8, BoxError>(v) };

        loader.load("a", ok(1), LoadOptions::default()).await;
        loader.load("b", ok(2), LoadOptions::default()).await;
        // Touch "a" so "b" becomes least recently used
        assert_eq!(loader.load("a", ok(9), LoadOptions::default()).await.source, LoadSource::Cache);
        loader.load("c", ok(3), LoadOptions::default()).await;

        assert!(loader.contains("a"));
        assert!(!loader.contains("b"));
        assert!(loader.contains("c"));
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.cached_keys(), vec!["c".to_string(), "a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let loader: Loader<u8> = Loader::new(LoaderSettings {
            ttl: Some(Duration::from_secs(5)),
            ..settings()
        });
        let calls = AtomicUsize::new(0);
        let fetcher = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<u8, BoxError>(1) }
        };
        loader.load("k", fetcher, LoadOptions::default()).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        let report = loader.load("k", fetcher, LoadOptions::default()).await;
        assert_eq!(report.source, LoadSource::Fetched);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reload_ignores_superseded_flight() {
        let loader: Loader<&'static str> = Loader::new(settings());
        let slow_stale = || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, BoxError>("stale")
        };
        let fresh = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, BoxError>("fresh")
        };

        let (stale, forced) = tokio::join!(
            loader.load("k", slow_stale, LoadOptions::default()),
            loader.load("k", fresh, LoadOptions::force())
        );
        assert_eq!(stale.value, Ok("stale"));
        assert_eq!(forced.value, Ok("fresh"));

        // The superseded sequence finished last but must not replace the cache
        let cached = loader
            .load("k", || async { Ok::<_, BoxError>("refetched") }, LoadOptions::default())
            .await;
        assert_eq!(cached.source, LoadSource::Cache);
        assert_eq!(cached.value, Ok("fresh"));
    }

    #[tokio::test]
    async fn test_invalid_tree_is_not_retried_or_cached() {
        let loader = DirectoryLoader::for_directories(settings());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolver = Resolver::from_sync(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut tree = Tree::new();
            tree.insert_as("wrong", Node::noop("name"));
            Ok(tree)
        });

        let report = loader.load_directory("dir", &resolver, LoadOptions::default()).await;
        assert_eq!(report.value.unwrap_err().kind, LoadErrorKind::Invalid);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(loader.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_forces_next_fetch() {
        let loader = DirectoryLoader::for_directories(settings());
        let resolver = Resolver::from_sync(|| Ok(Tree::new().with(Node::noop("x"))));
        assert!(loader.load_directory("d", &resolver, LoadOptions::default()).await.is_ok());
        assert!(loader.invalidate("d"));
        assert!(!loader.invalidate("d"));
        let report = loader.load_directory("d", &resolver, LoadOptions::default()).await;
        assert_eq!(report.source, LoadSource::Fetched);
    }
}
