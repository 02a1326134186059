//! Crewboard core library.
//!
//! Offline-first access to a sailing club's crew planning data: events with
//! their slots and registrations, users, positions and qualifications.
//!
//! - `api` - REST client and the per-collection `Repository` contract
//! - `cache` - local stores and the caches that keep them in sync
//! - `services` - slot layout, eligibility and crew resolution
//! - `context` - the application context wiring it all together

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod models;
pub mod services;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use context::AppContext;
