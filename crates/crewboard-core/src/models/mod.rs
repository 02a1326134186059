//! Data models for crewboard entities.
//!
//! - `Event` with its `Slot`s, `Location`s and `Registration`s
//! - `Position` and `Qualification` catalogs
//! - `User` accounts
//! - Typed keys for every collection

pub mod event;
pub mod keys;
pub mod position;
pub mod qualification;
pub mod user;

pub use event::{
    Event, EventComputed, EventPatch, EventSignupType, EventState, Location, Registration, Slot,
    SlotCriticality,
};
pub use keys::{EventKey, PositionKey, QualificationKey, RegistrationKey, SlotKey, UserKey};
pub use position::Position;
pub use qualification::Qualification;
pub use user::{User, UserQualification};
