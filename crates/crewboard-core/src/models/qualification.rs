use serde::{Deserialize, Serialize};

use super::QualificationKey;
use crate::cache::Cacheable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Qualification {
    pub key: QualificationKey,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Whether a granted qualification has an expiry date.
    #[serde(default)]
    pub expires: bool,
    /// Qualifications implied by holding this one.
    #[serde(default)]
    pub includes: Vec<QualificationKey>,
}

impl Cacheable for Qualification {
    type Key = QualificationKey;

    fn key(&self) -> QualificationKey {
        self.key.clone()
    }

    fn collection() -> &'static str {
        "qualifications"
    }
}
