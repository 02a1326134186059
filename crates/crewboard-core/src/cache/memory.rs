//! Volatile in-process store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheKey, Cacheable, KeyedStore, Result};

pub struct MemoryStore<T: Cacheable> {
    records: RwLock<BTreeMap<T::Key, T>>,
}

impl<T: Cacheable> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Cacheable> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Cacheable> KeyedStore<T> for MemoryStore<T> {
    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn find_by_key(&self, key: &T::Key) -> Result<Option<T>> {
        if key.is_blank() {
            return Ok(None);
        }
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn save(&self, entity: &T) -> Result<T> {
        self.records
            .write()
            .await
            .insert(entity.key(), entity.clone());
        Ok(entity.clone())
    }

    async fn save_all(&self, entities: &[T]) -> Result<Vec<T>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let mut records = self.records.write().await;
        for entity in entities {
            records.insert(entity.key(), entity.clone());
        }
        Ok(entities.to_vec())
    }

    async fn delete_by_key(&self, key: &T::Key) -> Result<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Position, PositionKey};

    #[tokio::test]
    async fn test_save_then_find_returns_independent_copy() {
        let store = MemoryStore::new();
        let mut position = Position::new("skipper", "Skipper", 10);
        store.save(&position).await.unwrap();

        position.name = "Changed".to_string();

        let stored = store
            .find_by_key(&PositionKey::new("skipper"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Skipper");
    }

    #[tokio::test]
    async fn test_blank_key_is_not_found() {
        let store: MemoryStore<Position> = MemoryStore::new();
        store.save(&Position::unknown()).await.unwrap();
        assert!(store.find_by_key(&PositionKey::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_all_and_delete() {
        let store = MemoryStore::new();
        let saved = store
            .save_all(&[
                Position::new("skipper", "Skipper", 10),
                Position::new("deckhand", "Deckhand", 1),
            ])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        store.delete(&saved[0]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.delete_all().await.unwrap();
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_all_empty_is_noop() {
        let store: MemoryStore<Position> = MemoryStore::new();
        assert!(store.save_all(&[]).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
