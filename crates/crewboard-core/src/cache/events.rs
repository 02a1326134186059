//! Year-partitioned cache for events.
//!
//! Events are fetched one calendar year at a time (by start date). A year
//! counts as loaded once the store holds any of its events, or once the
//! remote confirmed it has none; loaded years are served locally.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::debug;

use super::collection::{apply_initial_fetch, Fetcher, Readiness};
use super::{CacheKey, CacheOptions, CacheState, KeyedStore, Result};
use crate::api::Repository;
use crate::models::{Event, EventKey};

pub struct EventCache<R: Repository<Event> + ?Sized> {
    store: Arc<dyn KeyedStore<Event>>,
    fetcher: Arc<Fetcher<Event, R>>,
    empty_years: Arc<Mutex<HashSet<i32>>>,
    readiness: Readiness,
}

impl<R: Repository<Event> + ?Sized> EventCache<R> {
    /// Create the cache and start loading the current year.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<dyn KeyedStore<Event>>, repository: Arc<R>, options: CacheOptions) -> Self {
        let fetcher = Arc::new(Fetcher::new(repository, options.fetch_timeout));
        let empty_years = Arc::new(Mutex::new(HashSet::new()));

        let init_store = Arc::clone(&store);
        let init_fetcher = Arc::clone(&fetcher);
        let init_empty = Arc::clone(&empty_years);
        let readiness = Readiness::start(async move {
            let year = Utc::now().year();
            let fetched = init_fetcher.fetch_all(Some(year)).await;
            apply_initial_fetch(init_store.as_ref(), &fetched).await;
            if matches!(fetched, Ok(ref events) if events.is_empty()) {
                mark_empty(&init_empty, year);
            }
        });

        Self {
            store,
            fetcher,
            empty_years,
            readiness,
        }
    }

    pub fn state(&self) -> CacheState {
        self.readiness.state()
    }

    pub async fn wait_until_ready(&self) {
        self.readiness.wait().await;
    }

    fn is_marked_empty(&self, year: i32) -> bool {
        self.empty_years
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&year)
    }

    async fn local_year(&self, year: i32) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .store
            .find_all()
            .await?
            .into_iter()
            .filter(|e| e.year() == year)
            .collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.key.cmp(&b.key)));
        Ok(events)
    }

    async fn is_year_loaded(&self, year: i32) -> Result<bool> {
        if self.is_marked_empty(year) {
            return Ok(true);
        }
        Ok(!self.local_year(year).await?.is_empty())
    }

    /// Events starting in `year`, sorted by start.
    ///
    /// Served locally when the year is loaded; fetched (and cached) otherwise.
    pub async fn get_events_by_year(&self, year: i32) -> Result<Vec<Event>> {
        self.readiness.wait().await;
        let local = self.local_year(year).await?;
        if !local.is_empty() || self.is_marked_empty(year) {
            return Ok(local);
        }

        debug!(year = year, "Year not cached, fetching events");
        let fetched = self.fetcher.fetch_all(Some(year)).await?;
        self.store.save_all(&fetched).await?;
        if fetched.is_empty() {
            mark_empty(&self.empty_years, year);
        }
        self.local_year(year).await
    }

    pub async fn get_event_by_key(&self, key: &EventKey) -> Result<Option<Event>> {
        self.readiness.wait().await;
        if key.is_blank() {
            return Ok(None);
        }
        if let Some(found) = self.store.find_by_key(key).await? {
            return Ok(Some(found));
        }

        let fetched = self.fetcher.fetch_one(key).await?;
        if let Some(ref event) = fetched {
            self.cache_event(event).await?;
        }
        Ok(fetched)
    }

    /// Push a canonical server event into the cache.
    ///
    /// Ignored unless its year is already loaded, so a lone event never
    /// makes a year look complete.
    pub async fn update_cache(&self, event: Event) -> Result<()> {
        self.readiness.wait().await;
        self.cache_event(&event).await
    }

    async fn cache_event(&self, event: &Event) -> Result<()> {
        let year = event.year();
        if !self.is_year_loaded(year).await? {
            debug!(key = %event.key, year = year, "Year not loaded, not caching event");
            return Ok(());
        }
        self.store.save(event).await?;
        Ok(())
    }

    pub async fn remove_from_cache(&self, key: &EventKey) -> Result<()> {
        self.readiness.wait().await;
        self.store.delete_by_key(key).await
    }

    // ===== Write-through =====

    pub async fn create_event(&self, event: &Event) -> Result<Event> {
        self.readiness.wait().await;
        let created = self.fetcher.repository().create(event).await?;
        self.cache_event(&created).await?;
        Ok(created)
    }

    pub async fn update_event(&self, key: &EventKey, patch: &R::Patch) -> Result<Event> {
        self.readiness.wait().await;
        let updated = self.fetcher.repository().update(key, patch).await?;
        // A changed start date can move the event to a year that is not loaded.
        let loaded = self.is_year_loaded(updated.year()).await?;
        self.store.delete_by_key(key).await?;
        if loaded {
            self.store.save(&updated).await?;
        }
        Ok(updated)
    }

    pub async fn delete_event(&self, key: &EventKey) -> Result<()> {
        self.readiness.wait().await;
        self.fetcher.repository().delete_by_key(key).await?;
        self.store.delete_by_key(key).await
    }
}

fn mark_empty(years: &Mutex<HashSet<i32>>, year: i32) {
    years
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(year);
}

#[async_trait]
impl<R: Repository<Event> + ?Sized> KeyedStore<Event> for EventCache<R> {
    async fn count(&self) -> Result<usize> {
        self.readiness.wait().await;
        self.store.count().await
    }

    async fn find_all(&self) -> Result<Vec<Event>> {
        self.readiness.wait().await;
        self.store.find_all().await
    }

    async fn find_by_key(&self, key: &EventKey) -> Result<Option<Event>> {
        self.readiness.wait().await;
        self.store.find_by_key(key).await
    }

    async fn save(&self, entity: &Event) -> Result<Event> {
        self.readiness.wait().await;
        self.store.save(entity).await
    }

    async fn save_all(&self, entities: &[Event]) -> Result<Vec<Event>> {
        self.readiness.wait().await;
        self.store.save_all(entities).await
    }

    async fn delete_by_key(&self, key: &EventKey) -> Result<()> {
        self.readiness.wait().await;
        self.store.delete_by_key(key).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.readiness.wait().await;
        self.empty_years
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.store.delete_all().await
    }
}

impl<R: Repository<Event> + ?Sized> EventCache<R> {
    /// Years the remote confirmed to have no events.
    pub fn known_empty_years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self
            .empty_years
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        years.sort_unstable();
        years
    }
}
