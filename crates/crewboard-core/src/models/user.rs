use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{PositionKey, QualificationKey, UserKey};
use crate::cache::Cacheable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQualification {
    pub qualification_key: QualificationKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub key: UserKey,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Positions the user may sign up for.
    #[serde(default)]
    pub positions: Vec<PositionKey>,
    #[serde(default)]
    pub qualifications: Vec<UserQualification>,
}

impl User {
    pub fn new(
        key: impl Into<UserKey>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            nickname: None,
            email: None,
            positions: Vec::new(),
            qualifications: Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Name shown in crew lists: the nickname when set, otherwise the full name.
    pub fn preferred_name(&self) -> String {
        match self.nickname.as_deref().map(str::trim) {
            Some(nick) if !nick.is_empty() => nick.to_string(),
            _ => self.full_name(),
        }
    }
}

impl Cacheable for User {
    type Key = UserKey;

    fn key(&self) -> UserKey {
        self.key.clone()
    }

    fn collection() -> &'static str {
        "users"
    }
}
