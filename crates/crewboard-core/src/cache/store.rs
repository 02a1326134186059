use async_trait::async_trait;

use super::{Cacheable, Result};

/// Persistence contract for records identified by a unique key.
///
/// Implementations store their own copy of every record: mutating a value
/// after `save` never changes what the store holds.
#[async_trait]
pub trait KeyedStore<T: Cacheable>: Send + Sync {
    async fn count(&self) -> Result<usize>;

    async fn find_all(&self) -> Result<Vec<T>>;

    /// Blank keys resolve to `None`.
    async fn find_by_key(&self, key: &T::Key) -> Result<Option<T>>;

    async fn save(&self, entity: &T) -> Result<T>;

    /// Empty input is a no-op and touches no storage.
    async fn save_all(&self, entities: &[T]) -> Result<Vec<T>>;

    async fn delete_by_key(&self, key: &T::Key) -> Result<()>;

    async fn delete(&self, entity: &T) -> Result<()> {
        self.delete_by_key(&entity.key()).await
    }

    async fn delete_all(&self) -> Result<()>;
}
