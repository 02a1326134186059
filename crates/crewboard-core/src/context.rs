//! Application context.
//!
//! Built once at startup and passed by reference to every use case. Owns the
//! four collection caches and knows who the signed-in viewer is.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Datelike;
use tracing::{debug, info};

use crate::api::{ApiClient, Repository, RestRepository};
use crate::cache::{
    CacheOptions, CollectionCache, DurableDatabase, DurableStoreOptions, EventCache, KeyedStore,
    MemoryStore, MergePolicy, Result, SCHEMA,
};
use crate::config::{Config, StorageKind};
use crate::models::{
    Event, EventKey, EventPatch, Position, PositionKey, Qualification, User, UserKey,
};
use crate::services::{event_service, registration_service, ResolvedRegistration};

pub type EventRepository = dyn Repository<Event, Patch = EventPatch>;
pub type UserRepository = dyn Repository<User, Patch = User>;
pub type PositionRepository = dyn Repository<Position, Patch = Position>;
pub type QualificationRepository = dyn Repository<Qualification, Patch = Qualification>;

/// Remote side of every collection.
pub struct Repositories {
    pub events: Arc<EventRepository>,
    pub users: Arc<UserRepository>,
    pub positions: Arc<PositionRepository>,
    pub qualifications: Arc<QualificationRepository>,
}

impl Repositories {
    pub fn rest(api: &ApiClient) -> Self {
        Self {
            events: Arc::new(RestRepository::<Event, EventPatch>::new(api.clone())),
            users: Arc::new(RestRepository::<User>::new(api.clone())),
            positions: Arc::new(RestRepository::<Position>::new(api.clone())),
            qualifications: Arc::new(RestRepository::<Qualification>::new(api.clone())),
        }
    }
}

/// Local backing store of every collection.
pub struct Stores {
    pub events: Arc<dyn KeyedStore<Event>>,
    pub users: Arc<dyn KeyedStore<User>>,
    pub positions: Arc<dyn KeyedStore<Position>>,
    pub qualifications: Arc<dyn KeyedStore<Qualification>>,
}

impl Stores {
    pub fn memory() -> Self {
        Self {
            events: Arc::new(MemoryStore::new()),
            users: Arc::new(MemoryStore::new()),
            positions: Arc::new(MemoryStore::new()),
            qualifications: Arc::new(MemoryStore::new()),
        }
    }

    pub async fn durable(dir: &Path, options: DurableStoreOptions) -> Result<Self> {
        let db = DurableDatabase::open(dir, SCHEMA).await?;
        Ok(Self {
            events: Arc::new(db.open_store::<Event>(options).await?),
            users: Arc::new(db.open_store::<User>(options).await?),
            positions: Arc::new(db.open_store::<Position>(options).await?),
            qualifications: Arc::new(db.open_store::<Qualification>(options).await?),
        })
    }
}

pub struct AppContext {
    viewer_key: Option<UserKey>,
    pub events: EventCache<EventRepository>,
    pub users: CollectionCache<User, UserRepository>,
    pub positions: CollectionCache<Position, PositionRepository>,
    pub qualifications: CollectionCache<Qualification, QualificationRepository>,
}

impl AppContext {
    /// Wire caches to the given stores and repositories.
    ///
    /// Every cache starts initializing right away, so this must run inside a
    /// tokio runtime.
    pub fn new(
        stores: Stores,
        repositories: Repositories,
        viewer_key: Option<UserKey>,
        fetch_timeout: Duration,
    ) -> Self {
        let replace = CacheOptions {
            merge_policy: MergePolicy::Replace,
            fetch_timeout,
        };
        let merge = CacheOptions {
            merge_policy: MergePolicy::MergeFields,
            fetch_timeout,
        };

        Self {
            viewer_key,
            events: EventCache::new(stores.events, repositories.events, replace),
            users: CollectionCache::new(stores.users, repositories.users, merge),
            positions: CollectionCache::new(stores.positions, repositories.positions, replace),
            qualifications: CollectionCache::new(
                stores.qualifications,
                repositories.qualifications,
                replace,
            ),
        }
    }

    /// Build the context described by `config`, talking to the REST API.
    pub async fn from_config(config: &Config, token: Option<String>) -> anyhow::Result<Self> {
        let mut api = ApiClient::new(config.api_base_url.clone())
            .context("Failed to create API client")?;
        if let Some(token) = token {
            api.set_token(token);
        }

        let stores = match config.storage {
            StorageKind::Memory => Stores::memory(),
            StorageKind::Durable => {
                let dir = config.cache_dir()?;
                Stores::durable(&dir, config.durable_options())
                    .await
                    .with_context(|| format!("Failed to open cache in {}", dir.display()))?
            }
        };
        info!(storage = ?config.storage, api = api.base_url(), "Context ready");

        Ok(Self::new(
            stores,
            Repositories::rest(&api),
            config.last_user_key.clone(),
            config.fetch_timeout(),
        ))
    }

    pub fn viewer_key(&self) -> Option<&UserKey> {
        self.viewer_key.as_ref()
    }

    pub async fn viewer(&self) -> Result<Option<User>> {
        match self.viewer_key {
            Some(ref key) => self.users.get_by_key(key).await,
            None => Ok(None),
        }
    }

    pub async fn positions_by_key(&self) -> Result<HashMap<PositionKey, Position>> {
        Ok(self
            .positions
            .get_all()
            .await?
            .into_iter()
            .map(|p| (p.key.clone(), p))
            .collect())
    }

    /// Events of `year` (the current year when `None`) with computed values
    /// for the viewer.
    pub async fn events_for_viewer(&self, year: Option<i32>) -> Result<Vec<Event>> {
        let year = year.unwrap_or_else(|| chrono::Utc::now().year());
        let viewer = self.viewer().await?;
        let mut events = self.events.get_events_by_year(year).await?;
        for event in events.iter_mut() {
            event_service::update_computed_values(event, viewer.as_ref());
        }
        debug!(year = year, count = events.len(), "Events resolved for viewer");
        Ok(events)
    }

    /// Crew roster of an event, or `None` if the event does not exist.
    pub async fn crew_roster(&self, key: &EventKey) -> Result<Option<Vec<ResolvedRegistration>>> {
        let Some(event) = self.events.get_event_by_key(key).await? else {
            return Ok(None);
        };
        let users = self.users.get_all().await?;
        let positions = self.positions_by_key().await?;
        Ok(Some(registration_service::resolve_registrations_with_assigned_slots(
            &event, &users, &positions,
        )))
    }

    /// Waiting list of an event, or `None` if the event does not exist.
    pub async fn waiting_list(&self, key: &EventKey) -> Result<Option<Vec<ResolvedRegistration>>> {
        let Some(event) = self.events.get_event_by_key(key).await? else {
            return Ok(None);
        };
        let users = self.users.get_all().await?;
        let positions = self.positions_by_key().await?;
        Ok(Some(registration_service::resolve_registrations_on_waiting_list(
            &event, &users, &positions,
        )))
    }

    /// Drop every locally cached record. The remote side is untouched.
    pub async fn clear_local_cache(&self) -> Result<()> {
        self.events.delete_all().await?;
        self.users.delete_all().await?;
        self.positions.delete_all().await?;
        self.qualifications.delete_all().await?;
        info!("Local cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Registration, RegistrationKey, Slot};
    use crate::test_support::{FailMode, FakeRepository};
    use chrono::{Duration as ChronoDuration, Utc};

    struct Fixture {
        events: Arc<FakeRepository<Event, EventPatch>>,
        users: Arc<FakeRepository<User>>,
    }

    fn upcoming_event() -> Event {
        let start = Utc::now() + ChronoDuration::days(20);
        let mut event = Event::new("e1", "Midsummer Sail", start, start + ChronoDuration::days(1));
        event.slots = vec![
            Slot::new("s1", 1, vec![PositionKey::new("skipper")]),
            Slot::new("s2", 2, vec![PositionKey::new("deckhand")]),
        ];
        event.registrations = vec![
            Registration::for_user("r1", "u1", "skipper"),
            Registration::for_guest("r2", "Henrik", "deckhand"),
        ];
        event.slots[0].assigned_registration_key = Some(RegistrationKey::new("r1"));
        event
    }

    fn context(viewer: Option<&str>) -> (AppContext, Fixture) {
        let mut skipper = User::new("u1", "Ingrid", "Dahl");
        skipper.positions = vec![PositionKey::new("skipper")];
        let mut newcomer = User::new("u2", "Jonas", "Wirth");
        newcomer.positions = vec![PositionKey::new("deckhand")];

        let fixture = Fixture {
            events: Arc::new(FakeRepository::with_partition(
                vec![upcoming_event()],
                Some(Event::year),
            )),
            users: Arc::new(FakeRepository::new(vec![skipper, newcomer])),
        };
        let repositories = Repositories {
            events: fixture.events.clone(),
            users: fixture.users.clone(),
            positions: Arc::new(FakeRepository::new(vec![
                Position::new("skipper", "Skipper", 10),
                Position::new("deckhand", "Deckhand", 1),
            ])),
            qualifications: Arc::new(FakeRepository::new(Vec::new())),
        };

        let ctx = AppContext::new(
            Stores::memory(),
            repositories,
            viewer.map(UserKey::new),
            Duration::from_secs(5),
        );
        (ctx, fixture)
    }

    #[tokio::test]
    async fn test_events_for_viewer_computes_eligibility() {
        let (ctx, _) = context(Some("u2"));
        let year = upcoming_event().year();

        let events = ctx.events_for_viewer(Some(year)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].computed.can_signed_in_user_join);
        assert!(events[0].computed.signed_in_user_registration.is_none());

        let (ctx, _) = context(Some("u1"));
        let events = ctx.events_for_viewer(Some(year)).await.unwrap();
        assert!(events[0].computed.is_signed_in_user_assigned);
        assert!(events[0].computed.can_signed_in_user_leave);
    }

    #[tokio::test]
    async fn test_roster_and_waiting_list() {
        let (ctx, _) = context(None);
        let key = EventKey::new("e1");

        let roster = ctx.crew_roster(&key).await.unwrap().unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].name, "Ingrid Dahl");
        assert_eq!(roster[0].position.name, "Skipper");
        assert!(roster[1].is_open());

        let waiting = ctx.waiting_list(&key).await.unwrap().unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].name, "Henrik");

        assert!(ctx.crew_roster(&EventKey::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_local_cache() {
        let (ctx, fixture) = context(None);
        ctx.users.wait_until_ready().await;
        assert_eq!(ctx.users.count().await.unwrap(), 2);

        ctx.clear_local_cache().await.unwrap();
        assert_eq!(ctx.users.count().await.unwrap(), 0);
        assert_eq!(ctx.events.count().await.unwrap(), 0);
        assert_eq!(fixture.users.records().len(), 2);
    }

    #[tokio::test]
    async fn test_offline_roster_propagates_fetch_failure() {
        let (ctx, fixture) = context(None);
        ctx.clear_local_cache().await.unwrap();
        fixture.events.fail_with(FailMode::Server);

        let err = ctx.crew_roster(&EventKey::new("e1")).await.unwrap_err();
        assert!(err.api_error().is_some());
    }
}
