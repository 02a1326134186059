//! REST API access for crewboard collections.
//!
//! `ApiClient` performs authenticated HTTP calls; `Repository` is the
//! per-collection contract the caches consume, with `RestRepository` as its
//! HTTP implementation.

pub mod client;
pub mod error;
pub mod repository;

pub use client::ApiClient;
pub use error::ApiError;
pub use repository::{Repository, RestRepository};
