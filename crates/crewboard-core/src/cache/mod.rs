//! Offline cache layer.
//!
//! Records live in a [`KeyedStore`], either volatile ([`MemoryStore`]) or
//! persisted across restarts ([`DurableStore`]). [`CollectionCache`] and
//! [`EventCache`] sit on top of a store and keep it in sync with the remote
//! [`Repository`](crate::api::Repository).

pub mod coalescer;
pub mod collection;
pub mod durable;
pub mod entity;
pub mod error;
pub mod events;
pub mod memory;
pub mod store;

pub use coalescer::{FetchCoalescer, FetchResult};
pub use collection::{CacheOptions, CacheState, CollectionCache, MergePolicy};
pub use durable::{
    CacheSchema, DurableDatabase, DurableStore, DurableStoreOptions, DEFAULT_INVALIDATE_INTERVAL,
    SCHEMA,
};
pub use entity::{CacheKey, Cacheable, StoredRecord};
pub use error::{Result, StoreError};
pub use events::EventCache;
pub use memory::MemoryStore;
pub use store::KeyedStore;
