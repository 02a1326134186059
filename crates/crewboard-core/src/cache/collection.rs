//! Local mirror of a remote collection.
//!
//! A `CollectionCache` refreshes its store from the repository as soon as it
//! is constructed. Every public method waits for that refresh to finish, so
//! callers never see a half-initialized store regardless of call order.
//!
//! Initialization never fails: an authorization failure clears the store
//! (it cannot be trusted with a logged-out session), any other failure keeps
//! whatever was stored before so the application still starts offline.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{CacheKey, Cacheable, FetchCoalescer, FetchResult, KeyedStore, Result};
use crate::api::{client::REQUEST_TIMEOUT_SECS, ApiError, Repository};

// ============================================================================
// Policies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Uninitialized,
    Initializing,
    Ready,
}

/// How `update_cache` combines a fresh server record with the cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// The new record replaces the cached one.
    #[default]
    Replace,
    /// The new record wins field by field, but fields it leaves `null` or
    /// omits keep their cached value.
    MergeFields,
}

impl MergePolicy {
    pub fn apply<T: Cacheable>(&self, existing: Option<T>, incoming: T) -> T {
        let existing = match (self, existing) {
            (MergePolicy::MergeFields, Some(existing)) => existing,
            _ => return incoming,
        };

        let merged = serde_json::to_value(&existing).and_then(|mut base| {
            let update = serde_json::to_value(&incoming)?;
            if let (Some(base), serde_json::Value::Object(update)) = (base.as_object_mut(), update) {
                for (field, value) in update {
                    if !value.is_null() {
                        base.insert(field, value);
                    }
                }
            }
            serde_json::from_value(base)
        });

        match merged {
            Ok(merged) => merged,
            Err(e) => {
                warn!(collection = T::collection(), error = %e, "Field merge failed, replacing record");
                incoming
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub merge_policy: MergePolicy,
    /// Upper bound for each remote fetch.
    pub fetch_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            merge_policy: MergePolicy::Replace,
            fetch_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

// ============================================================================
// Shared machinery
// ============================================================================

/// Tracks initialization and lets any number of callers wait for it.
pub(crate) struct Readiness {
    rx: watch::Receiver<CacheState>,
}

impl Readiness {
    /// Spawn `init` on the runtime; the state becomes `Ready` when it ends.
    pub(crate) fn start<F>(init: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(CacheState::Uninitialized);
        tx.send_replace(CacheState::Initializing);
        tokio::spawn(async move {
            init.await;
            tx.send_replace(CacheState::Ready);
        });
        Self { rx }
    }

    pub(crate) fn state(&self) -> CacheState {
        *self.rx.borrow()
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.rx.clone();
        let settled = rx
            .wait_for(|state| *state == CacheState::Ready)
            .await
            .map(|_| ());
        if settled.is_err() {
            warn!("Cache initialization task ended without completing");
        }
    }
}

/// Coalesced, time-bounded access to a repository.
pub(crate) struct Fetcher<T: Cacheable, R: ?Sized> {
    repository: Arc<R>,
    lists: FetchCoalescer<Vec<T>>,
    records: FetchCoalescer<Option<T>>,
    timeout: Duration,
}

impl<T: Cacheable, R: Repository<T> + ?Sized> Fetcher<T, R> {
    pub(crate) fn new(repository: Arc<R>, timeout: Duration) -> Self {
        Self {
            repository,
            lists: FetchCoalescer::new(),
            records: FetchCoalescer::new(),
            timeout,
        }
    }

    pub(crate) fn repository(&self) -> &R {
        &self.repository
    }

    pub(crate) async fn fetch_all(&self, partition: Option<i32>) -> FetchResult<Vec<T>> {
        let tag = match partition {
            Some(p) => format!("{}_{}", T::collection(), p),
            None => T::collection().to_string(),
        };
        let repository = Arc::clone(&self.repository);
        let limit = self.timeout;
        self.lists
            .coalesce(&tag, move || async move {
                with_timeout(limit, repository.find_all(partition)).await
            })
            .await
    }

    pub(crate) async fn fetch_one(&self, key: &T::Key) -> FetchResult<Option<T>> {
        let tag = format!("{}/{}", T::collection(), key);
        let repository = Arc::clone(&self.repository);
        let key = key.clone();
        let limit = self.timeout;
        self.records
            .coalesce(&tag, move || async move {
                with_timeout(limit, repository.find_by_key(&key)).await
            })
            .await
    }
}

pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = std::result::Result<T, ApiError>>,
) -> std::result::Result<T, ApiError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(limit.as_secs())),
    }
}

/// Apply the outcome of an initial remote fetch to the store.
pub(crate) async fn apply_initial_fetch<T: Cacheable>(
    store: &dyn KeyedStore<T>,
    fetched: &FetchResult<Vec<T>>,
) {
    let name = T::collection();
    match fetched {
        Ok(records) => {
            match replace_contents(store, records).await {
                Ok(()) => info!(store = name, count = records.len(), "Cache refreshed from remote"),
                Err(e) => warn!(store = name, error = %e, "Failed to write refreshed cache"),
            }
        }
        Err(e) if e.is_auth_failure() => {
            warn!(store = name, error = %e, "Not authorized, clearing local cache");
            if let Err(e) = store.delete_all().await {
                warn!(store = name, error = %e, "Failed to clear cache");
            }
        }
        Err(e) => {
            warn!(store = name, error = %e, "Remote unavailable, serving local cache");
        }
    }
}

/// Make `store` hold exactly `records`.
///
/// New records are written before stale ones are dropped, so a failed write
/// leaves the previous content in place.
async fn replace_contents<T: Cacheable>(store: &dyn KeyedStore<T>, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return store.delete_all().await;
    }
    store.save_all(records).await?;

    let fresh: HashSet<T::Key> = records.iter().map(Cacheable::key).collect();
    for stale in store.find_all().await? {
        let key = stale.key();
        if !fresh.contains(&key) {
            store.delete_by_key(&key).await?;
        }
    }
    Ok(())
}

// ============================================================================
// CollectionCache
// ============================================================================

/// Cache for an unpartitioned collection (positions, qualifications, users).
pub struct CollectionCache<T: Cacheable, R: Repository<T> + ?Sized> {
    store: Arc<dyn KeyedStore<T>>,
    fetcher: Arc<Fetcher<T, R>>,
    policy: MergePolicy,
    readiness: Readiness,
}

impl<T: Cacheable, R: Repository<T> + ?Sized> CollectionCache<T, R> {
    /// Create the cache and start refreshing it from `repository`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn KeyedStore<T>>, repository: Arc<R>, options: CacheOptions) -> Self {
        let fetcher = Arc::new(Fetcher::new(repository, options.fetch_timeout));

        let init_store = Arc::clone(&store);
        let init_fetcher = Arc::clone(&fetcher);
        let readiness = Readiness::start(async move {
            let fetched = init_fetcher.fetch_all(None).await;
            apply_initial_fetch(init_store.as_ref(), &fetched).await;
        });

        Self {
            store,
            fetcher,
            policy: options.merge_policy,
            readiness,
        }
    }

    pub fn state(&self) -> CacheState {
        self.readiness.state()
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.policy
    }

    pub async fn wait_until_ready(&self) {
        self.readiness.wait().await;
    }

    /// Cached records, or a fresh remote fetch when the cache is empty.
    pub async fn get_all(&self) -> Result<Vec<T>> {
        self.readiness.wait().await;
        let local = self.store.find_all().await?;
        if !local.is_empty() {
            return Ok(local);
        }

        debug!(store = T::collection(), "Cache empty, fetching from remote");
        let fetched = self.fetcher.fetch_all(None).await?;
        self.store.save_all(&fetched).await?;
        Ok(fetched)
    }

    /// Cached record, or a remote lookup on miss.
    pub async fn get_by_key(&self, key: &T::Key) -> Result<Option<T>> {
        self.readiness.wait().await;
        if key.is_blank() {
            return Ok(None);
        }
        if let Some(found) = self.store.find_by_key(key).await? {
            return Ok(Some(found));
        }

        let fetched = self.fetcher.fetch_one(key).await?;
        if let Some(ref record) = fetched {
            self.cache_record(record.clone()).await?;
        }
        Ok(fetched)
    }

    /// Push a canonical server record into the cache.
    ///
    /// Ignored while the cache holds nothing, so a single record never
    /// masquerades as the whole collection.
    pub async fn update_cache(&self, record: T) -> Result<()> {
        self.readiness.wait().await;
        self.cache_record(record).await
    }

    async fn cache_record(&self, record: T) -> Result<()> {
        if self.store.count().await? == 0 {
            debug!(store = T::collection(), key = %record.key(), "Cache empty, not caching single record");
            return Ok(());
        }
        let existing = self.store.find_by_key(&record.key()).await?;
        let merged = self.policy.apply(existing, record);
        self.store.save(&merged).await?;
        Ok(())
    }

    /// Local delete only; the remote side is the caller's concern.
    pub async fn remove_from_cache(&self, key: &T::Key) -> Result<()> {
        self.readiness.wait().await;
        self.store.delete_by_key(key).await
    }

    // ===== Write-through =====

    pub async fn create_record(&self, record: &T) -> Result<T> {
        self.readiness.wait().await;
        let created = self.fetcher.repository().create(record).await?;
        self.cache_record(created.clone()).await?;
        Ok(created)
    }

    pub async fn update_record(&self, key: &T::Key, patch: &R::Patch) -> Result<T> {
        self.readiness.wait().await;
        let updated = self.fetcher.repository().update(key, patch).await?;
        self.cache_record(updated.clone()).await?;
        Ok(updated)
    }

    pub async fn delete_record(&self, key: &T::Key) -> Result<()> {
        self.readiness.wait().await;
        self.fetcher.repository().delete_by_key(key).await?;
        self.store.delete_by_key(key).await
    }
}

#[async_trait]
impl<T: Cacheable, R: Repository<T> + ?Sized> KeyedStore<T> for CollectionCache<T, R> {
    async fn count(&self) -> Result<usize> {
        self.readiness.wait().await;
        self.store.count().await
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        self.readiness.wait().await;
        self.store.find_all().await
    }

    async fn find_by_key(&self, key: &T::Key) -> Result<Option<T>> {
        self.readiness.wait().await;
        self.store.find_by_key(key).await
    }

    async fn save(&self, entity: &T) -> Result<T> {
        self.readiness.wait().await;
        self.store.save(entity).await
    }

    async fn save_all(&self, entities: &[T]) -> Result<Vec<T>> {
        self.readiness.wait().await;
        self.store.save_all(entities).await
    }

    async fn delete_by_key(&self, key: &T::Key) -> Result<()> {
        self.readiness.wait().await;
        self.store.delete_by_key(key).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.readiness.wait().await;
        self.store.delete_all().await
    }
}
