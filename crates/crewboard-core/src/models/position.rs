use serde::{Deserialize, Serialize};

use super::{PositionKey, QualificationKey};
use crate::cache::Cacheable;

/// A crew role such as skipper, watch leader or deckhand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub key: PositionKey,
    pub name: String,
    /// Higher values sort first in crew rosters.
    #[serde(default)]
    pub prio: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub qualification_keys: Vec<QualificationKey>,
}

impl Position {
    pub fn new(key: impl Into<PositionKey>, name: impl Into<String>, prio: i32) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            prio,
            color: None,
            qualification_keys: Vec::new(),
        }
    }

    /// Placeholder rendered for position keys that are not in the catalog.
    pub fn unknown() -> Self {
        Self::new("", "?", 0)
    }

    pub fn is_unknown(&self) -> bool {
        self.key.0.is_empty()
    }
}

impl Cacheable for Position {
    type Key = PositionKey;

    fn key(&self) -> PositionKey {
        self.key.clone()
    }

    fn collection() -> &'static str {
        "positions"
    }
}
