//! Domain logic over cached records. No I/O happens here.

pub mod event_service;
pub mod registration_service;

pub use event_service::ValidationError;
pub use registration_service::ResolvedRegistration;
