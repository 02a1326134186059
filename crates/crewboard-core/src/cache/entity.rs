//! Traits every cached record implements, and the persisted record envelope.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A unique, stable, comparable record key.
pub trait CacheKey:
    Debug + Display + Clone + Eq + Ord + Hash + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Blank keys never match a record: lookups return "not found".
    fn is_blank(&self) -> bool;
}

impl CacheKey for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl CacheKey for i64 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

/// A record that can live in a [`KeyedStore`](super::KeyedStore).
pub trait Cacheable: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Key: CacheKey;

    fn key(&self) -> Self::Key;

    /// Name of the physical store holding this collection.
    fn collection() -> &'static str;
}

/// Envelope written to durable storage.
///
/// `updated_at` is recorded on every write but not read back yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord<T> {
    pub key: String,
    pub updated_at: DateTime<Utc>,
    pub value: T,
}

impl<T: Cacheable> StoredRecord<T> {
    pub fn new(value: T) -> Self {
        Self {
            key: value.key().to_string(),
            updated_at: Utc::now(),
            value,
        }
    }
}
