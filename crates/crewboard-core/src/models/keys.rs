//! Strongly typed record keys.
//!
//! Every collection is keyed by an opaque server-assigned string. Wrapping
//! them keeps a `SlotKey` from ever being passed where a `RegistrationKey`
//! is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_string())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl CacheKey for $name {
            fn is_blank(&self) -> bool {
                self.0.is_empty()
            }
        }
    };
}

string_key!(
    /// Key of an [`Event`](super::Event).
    EventKey
);
string_key!(
    /// Key of a [`Slot`](super::Slot), unique within its event.
    SlotKey
);
string_key!(
    /// Key of a [`Registration`](super::Registration), unique within its event.
    RegistrationKey
);
string_key!(
    /// Key of a [`Position`](super::Position).
    PositionKey
);
string_key!(
    /// Key of a [`Qualification`](super::Qualification).
    QualificationKey
);
string_key!(
    /// Key of a [`User`](super::User).
    UserKey
);
