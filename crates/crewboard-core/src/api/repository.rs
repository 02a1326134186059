//! Remote source of truth for each collection.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;

use super::{ApiClient, ApiError};
use crate::cache::Cacheable;

/// Remote CRUD contract for one collection.
///
/// Failures carry the HTTP-style status through [`ApiError`]; caches inspect
/// it to tell authorization failures apart from everything else.
#[async_trait]
pub trait Repository<T: Cacheable>: Send + Sync + 'static {
    /// Body of a partial update.
    type Patch: Serialize + Send + Sync;

    /// All records, or only those of `partition` (a year) when given.
    async fn find_all(&self, partition: Option<i32>) -> Result<Vec<T>, ApiError>;

    async fn find_by_key(&self, key: &T::Key) -> Result<Option<T>, ApiError>;

    async fn create(&self, entity: &T) -> Result<T, ApiError>;

    async fn update(&self, key: &T::Key, patch: &Self::Patch) -> Result<T, ApiError>;

    async fn delete_by_key(&self, key: &T::Key) -> Result<(), ApiError>;
}

/// REST adapter: `{base}/{collection}` with `?year=` for partitioned reads.
pub struct RestRepository<T, P = T> {
    api: ApiClient,
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<T: Cacheable, P> RestRepository<T, P> {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            _marker: PhantomData,
        }
    }

    fn collection_path() -> String {
        T::collection().to_string()
    }

    fn record_path(key: &T::Key) -> String {
        format!("{}/{}", T::collection(), key)
    }
}

#[async_trait]
impl<T, P> Repository<T> for RestRepository<T, P>
where
    T: Cacheable,
    P: Serialize + Send + Sync + 'static,
{
    type Patch = P;

    async fn find_all(&self, partition: Option<i32>) -> Result<Vec<T>, ApiError> {
        let path = Self::collection_path();
        match partition {
            Some(year) => self.api.get_with_query(&path, &[("year", year)]).await,
            None => self.api.get(&path).await,
        }
    }

    async fn find_by_key(&self, key: &T::Key) -> Result<Option<T>, ApiError> {
        self.api.get_optional(&Self::record_path(key)).await
    }

    async fn create(&self, entity: &T) -> Result<T, ApiError> {
        self.api.post(&Self::collection_path(), entity).await
    }

    async fn update(&self, key: &T::Key, patch: &P) -> Result<T, ApiError> {
        self.api.patch(&Self::record_path(key), patch).await
    }

    async fn delete_by_key(&self, key: &T::Key) -> Result<(), ApiError> {
        self.api.delete(&Self::record_path(key)).await
    }
}
