//! Fakes shared by unit tests across the crate.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, Repository};
use crate::cache::Cacheable;

/// A record type whose store is not part of the cache schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub key: String,
}

impl Cacheable for Widget {
    type Key = String;

    fn key(&self) -> String {
        self.key.clone()
    }

    fn collection() -> &'static str {
        "widgets"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Unauthorized,
    Forbidden,
    Server,
}

impl FailMode {
    fn error(self) -> ApiError {
        match self {
            FailMode::Unauthorized => ApiError::Unauthorized,
            FailMode::Forbidden => ApiError::AccessDenied("forbidden".to_string()),
            FailMode::Server => ApiError::ServerError("unavailable".to_string()),
        }
    }
}

/// In-memory `Repository` with call counters and scripted failures.
///
/// Updates overlay the non-null fields of the patch onto the stored record.
pub struct FakeRepository<T: Cacheable, P = T> {
    records: Mutex<Vec<T>>,
    partition_of: Option<fn(&T) -> i32>,
    failure: Mutex<Option<FailMode>>,
    delay: Mutex<Duration>,
    find_all_calls: AtomicUsize,
    find_by_key_calls: AtomicUsize,
    _patch: PhantomData<fn() -> P>,
}

impl<T: Cacheable> FakeRepository<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self::with_partition(records, None)
    }

    /// Serve `find_all(Some(p))` with only the records for which `f` returns `p`.
    pub fn partitioned(records: Vec<T>, f: fn(&T) -> i32) -> Self {
        Self::with_partition(records, Some(f))
    }
}

impl<T: Cacheable, P> FakeRepository<T, P> {
    pub fn with_partition(records: Vec<T>, partition_of: Option<fn(&T) -> i32>) -> Self {
        Self {
            records: Mutex::new(records),
            partition_of,
            failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            find_all_calls: AtomicUsize::new(0),
            find_by_key_calls: AtomicUsize::new(0),
            _patch: PhantomData,
        }
    }

    /// Every call fails with `mode` until `recover` is called.
    pub fn fail_with(&self, mode: FailMode) {
        *self.failure.lock().unwrap() = Some(mode);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_records(&self, records: Vec<T>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn records(&self) -> Vec<T> {
        self.records.lock().unwrap().clone()
    }

    pub fn find_all_calls(&self) -> usize {
        self.find_all_calls.load(Ordering::SeqCst)
    }

    pub fn find_by_key_calls(&self) -> usize {
        self.find_by_key_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), ApiError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.failure.lock().unwrap();
        match failure {
            Some(mode) => Err(mode.error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<T, P> Repository<T> for FakeRepository<T, P>
where
    T: Cacheable,
    P: Serialize + Send + Sync + 'static,
{
    type Patch = P;

    async fn find_all(&self, partition: Option<i32>) -> Result<Vec<T>, ApiError> {
        self.find_all_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        let records = self.records();
        Ok(match (partition, self.partition_of) {
            (Some(p), Some(f)) => records.into_iter().filter(|r| f(r) == p).collect(),
            _ => records,
        })
    }

    async fn find_by_key(&self, key: &T::Key) -> Result<Option<T>, ApiError> {
        self.find_by_key_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self.records().into_iter().find(|r| &r.key() == key))
    }

    async fn create(&self, entity: &T) -> Result<T, ApiError> {
        self.simulate().await?;
        self.records.lock().unwrap().push(entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, key: &T::Key, patch: &P) -> Result<T, ApiError> {
        self.simulate().await?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| &r.key() == key)
            .ok_or_else(|| ApiError::NotFound(key.to_string()))?;

        let mut merged = serde_json::to_value(&*record).unwrap();
        if let serde_json::Value::Object(fields) = serde_json::to_value(patch).unwrap() {
            for (field, value) in fields {
                if !value.is_null() {
                    merged[field.as_str()] = value;
                }
            }
        }
        *record = serde_json::from_value(merged).unwrap();
        Ok(record.clone())
    }

    async fn delete_by_key(&self, key: &T::Key) -> Result<(), ApiError> {
        self.simulate().await?;
        self.records.lock().unwrap().retain(|r| &r.key() != key);
        Ok(())
    }
}
