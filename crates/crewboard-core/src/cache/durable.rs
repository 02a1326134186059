//! Durable store backed by JSON files in the cache directory.
//!
//! A `DurableDatabase` owns one directory holding a schema manifest and one
//! file per physical store. Every write replaces a store file atomically
//! (temporary file + rename) before the in-memory view changes, so each
//! operation is its own transaction and a failed write leaves no trace.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use super::{CacheKey, Cacheable, KeyedStore, Result, StoreError, StoredRecord};

/// Manifest file name in the cache directory
const MANIFEST_FILE: &str = "schema.json";

/// Stores are cleared after this long unless configured otherwise.
pub const DEFAULT_INVALIDATE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Physical stores known to the application.
///
/// Adding a store requires bumping `version`; opening a database with a new
/// version drops every existing store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSchema {
    pub version: u32,
    pub stores: &'static [&'static str],
}

impl CacheSchema {
    pub fn declares(&self, store: &str) -> bool {
        self.stores.contains(&store)
    }
}

pub const SCHEMA: CacheSchema = CacheSchema {
    version: 3,
    stores: &["events", "users", "positions", "qualifications"],
};

#[derive(Debug, Serialize, Deserialize)]
struct SchemaManifest {
    version: u32,
    stores: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct DurableStoreOptions {
    /// Drop all records when the store is opened.
    pub invalidate_on_reload: bool,
    /// Drop all records periodically while the store is open.
    pub invalidate_on_interval: Option<Duration>,
}

impl Default for DurableStoreOptions {
    fn default() -> Self {
        Self {
            invalidate_on_reload: false,
            invalidate_on_interval: Some(DEFAULT_INVALIDATE_INTERVAL),
        }
    }
}

pub struct DurableDatabase {
    dir: PathBuf,
    schema: CacheSchema,
}

impl DurableDatabase {
    /// Open the database in `dir`, recreating all stores if the on-disk
    /// schema version differs from `schema`.
    pub async fn open(dir: impl Into<PathBuf>, schema: CacheSchema) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let db = Self { dir, schema };

        let manifest = db.read_manifest().await;
        if manifest.as_ref().map(|m| m.version) == Some(schema.version) {
            debug!(version = schema.version, "Cache schema up to date");
        } else {
            let previous: Vec<String> = manifest.map(|m| m.stores).unwrap_or_default();
            info!(version = schema.version, "Cache schema changed, recreating stores");
            db.drop_stores(previous.iter().map(String::as_str)).await?;
            db.drop_stores(schema.stores.iter().copied()).await?;
            db.write_manifest().await?;
        }

        Ok(db)
    }

    pub fn schema(&self) -> &CacheSchema {
        &self.schema
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open the store for `T::collection()`.
    ///
    /// Fails with [`StoreError::SchemaMismatch`] when the schema does not
    /// declare the store.
    pub async fn open_store<T: Cacheable>(
        &self,
        options: DurableStoreOptions,
    ) -> Result<DurableStore<T>> {
        let name = T::collection();
        if !self.schema.declares(name) {
            return Err(StoreError::SchemaMismatch {
                store: name.to_string(),
                version: self.schema.version,
            });
        }
        DurableStore::open(name, self.store_path(name), options).await
    }

    fn store_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    async fn read_manifest(&self) -> Option<SchemaManifest> {
        let contents = tokio::fs::read_to_string(self.dir.join(MANIFEST_FILE))
            .await
            .ok()?;
        match serde_json::from_str(&contents) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(error = %e, "Unreadable cache manifest");
                None
            }
        }
    }

    async fn write_manifest(&self) -> Result<()> {
        let manifest = SchemaManifest {
            version: self.schema.version,
            stores: self.schema.stores.iter().map(|s| s.to_string()).collect(),
        };
        let contents = serde_json::to_string_pretty(&manifest)?;
        write_atomic(&self.dir.join(MANIFEST_FILE), contents.as_bytes()).await
    }

    async fn drop_stores<'a>(&self, names: impl Iterator<Item = &'a str>) -> Result<()> {
        for name in names {
            match tokio::fs::remove_file(self.store_path(name)).await {
                Ok(()) => debug!(store = name, "Dropped store"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

struct StoreInner<T: Cacheable> {
    name: &'static str,
    path: PathBuf,
    records: Mutex<BTreeMap<T::Key, StoredRecord<T>>>,
}

impl<T: Cacheable> StoreInner<T> {
    async fn load(path: &Path) -> Result<BTreeMap<T::Key, StoredRecord<T>>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let records: Vec<StoredRecord<T>> = match serde_json::from_str(&contents) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable store file");
                Vec::new()
            }
        };
        Ok(records
            .into_iter()
            .map(|record| (record.value.key(), record))
            .collect())
    }

    async fn persist(&self, records: &BTreeMap<T::Key, StoredRecord<T>>) -> Result<()> {
        let values: Vec<&StoredRecord<T>> = records.values().collect();
        let contents = serde_json::to_vec(&values)?;
        write_atomic(&self.path, &contents).await
    }

    async fn clear(&self) -> Result<()> {
        let mut records = self.records.lock().await;
        let empty = BTreeMap::new();
        self.persist(&empty).await?;
        *records = empty;
        Ok(())
    }
}

pub struct DurableStore<T: Cacheable> {
    inner: Arc<StoreInner<T>>,
    invalidation: Option<JoinHandle<()>>,
}

impl<T: Cacheable> DurableStore<T> {
    async fn open(name: &'static str, path: PathBuf, options: DurableStoreOptions) -> Result<Self> {
        let records = StoreInner::<T>::load(&path).await?;
        debug!(store = name, count = records.len(), "Opened durable store");

        let inner = Arc::new(StoreInner {
            name,
            path,
            records: Mutex::new(records),
        });

        if options.invalidate_on_reload {
            info!(store = name, "Invalidating store on reload");
            inner.clear().await?;
        }

        let invalidation = options
            .invalidate_on_interval
            .filter(|period| !period.is_zero())
            .map(|period| Self::spawn_invalidation(Arc::downgrade(&inner), period));

        Ok(Self {
            inner,
            invalidation,
        })
    }

    fn spawn_invalidation(inner: Weak<StoreInner<T>>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(store) = inner.upgrade() else {
                    break;
                };
                match store.clear().await {
                    Ok(()) => info!(store = store.name, "Store invalidated after interval"),
                    Err(e) => warn!(store = store.name, error = %e, "Interval invalidation failed"),
                }
            }
        })
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

impl<T: Cacheable> Drop for DurableStore<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.invalidation.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl<T: Cacheable> KeyedStore<T> for DurableStore<T> {
    async fn count(&self) -> Result<usize> {
        Ok(self.inner.records.lock().await.len())
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        let records = self.inner.records.lock().await;
        Ok(records.values().map(|r| r.value.clone()).collect())
    }

    async fn find_by_key(&self, key: &T::Key) -> Result<Option<T>> {
        if key.is_blank() {
            return Ok(None);
        }
        let records = self.inner.records.lock().await;
        Ok(records.get(key).map(|r| r.value.clone()))
    }

    async fn save(&self, entity: &T) -> Result<T> {
        let mut records = self.inner.records.lock().await;
        let mut next = records.clone();
        next.insert(entity.key(), StoredRecord::new(entity.clone()));
        self.inner.persist(&next).await?;
        *records = next;
        Ok(entity.clone())
    }

    async fn save_all(&self, entities: &[T]) -> Result<Vec<T>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let mut records = self.inner.records.lock().await;
        let mut next = records.clone();
        for entity in entities {
            next.insert(entity.key(), StoredRecord::new(entity.clone()));
        }
        self.inner.persist(&next).await?;
        *records = next;
        Ok(entities.to_vec())
    }

    async fn delete_by_key(&self, key: &T::Key) -> Result<()> {
        let mut records = self.inner.records.lock().await;
        if !records.contains_key(key) {
            return Ok(());
        }
        let mut next = records.clone();
        next.remove(key);
        self.inner.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.inner.clear().await
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Position, PositionKey};
    use crate::test_support::Widget;

    fn no_invalidation() -> DurableStoreOptions {
        DurableStoreOptions {
            invalidate_on_reload: false,
            invalidate_on_interval: None,
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
            let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
            store.save(&Position::new("skipper", "Skipper", 10)).await.unwrap();
        }

        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
        let found = store.find_by_key(&PositionKey::new("skipper")).await.unwrap();
        assert_eq!(found.map(|p| p.name), Some("Skipper".to_string()));
    }

    #[tokio::test]
    async fn test_blank_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
        store.save(&Position::new("skipper", "Skipper", 10)).await.unwrap();

        assert!(store.find_by_key(&PositionKey::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mutating_original_does_not_change_stored_value() {
        let dir = tempfile::tempdir().unwrap();
        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let store = db.open_store::<Position>(no_invalidation()).await.unwrap();

        let mut position = Position::new("skipper", "Skipper", 10);
        store.save(&position).await.unwrap();
        position.prio = 99;

        let stored = store
            .find_by_key(&PositionKey::new("skipper"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, Position::new("skipper", "Skipper", 10));
    }

    #[tokio::test]
    async fn test_undeclared_store_is_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let result = db.open_store::<Widget>(no_invalidation()).await;
        match result {
            Err(StoreError::SchemaMismatch { store, version }) => {
                assert_eq!(store, "widgets");
                assert_eq!(version, SCHEMA.version);
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected schema mismatch"),
        }
    }

    #[tokio::test]
    async fn test_version_bump_drops_existing_stores() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
            let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
            store.save(&Position::new("skipper", "Skipper", 10)).await.unwrap();
        }

        let bumped = CacheSchema {
            version: SCHEMA.version + 1,
            stores: SCHEMA.stores,
        };
        let db = DurableDatabase::open(dir.path(), bumped).await.unwrap();
        let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_on_reload_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
            let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
            store.save(&Position::new("skipper", "Skipper", 10)).await.unwrap();
        }

        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let options = DurableStoreOptions {
            invalidate_on_reload: true,
            invalidate_on_interval: None,
        };
        let store = db.open_store::<Position>(options).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_on_interval_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let options = DurableStoreOptions {
            invalidate_on_reload: false,
            invalidate_on_interval: Some(Duration::from_millis(50)),
        };
        let store = db.open_store::<Position>(options).await.unwrap();
        store.save(&Position::new("skipper", "Skipper", 10)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_key_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
        store
            .save_all(&[
                Position::new("skipper", "Skipper", 10),
                Position::new("deckhand", "Deckhand", 1),
            ])
            .await
            .unwrap();

        store.delete_by_key(&PositionKey::new("skipper")).await.unwrap();
        store.delete_by_key(&PositionKey::new("missing")).await.unwrap();

        let remaining = store.find_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, PositionKey::new("deckhand"));
    }

    #[tokio::test]
    async fn test_save_all_empty_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = DurableDatabase::open(dir.path(), SCHEMA).await.unwrap();
        let store = db.open_store::<Position>(no_invalidation()).await.unwrap();
        assert!(store.save_all(&[]).await.unwrap().is_empty());
        assert!(!dir.path().join("positions.json").exists());
    }
}
