use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::{EventKey, PositionKey, RegistrationKey, SlotKey, UserKey};
use crate::cache::Cacheable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    #[default]
    Draft,
    OpenForSignup,
    Planned,
    Canceled,
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventState::Draft => write!(f, "Draft"),
            EventState::OpenForSignup => write!(f, "Open for signup"),
            EventState::Planned => write!(f, "Planned"),
            EventState::Canceled => write!(f, "Canceled"),
        }
    }
}

/// How crew members end up on an event.
///
/// `Open` events have no fixed slots: every registration is crew.
/// `Assignment` events only count a registration as crew once an
/// administrator binds it to a [`Slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSignupType {
    Open,
    #[default]
    Assignment,
}

/// Priority tier of a slot. Ordered `Optional < Important < Required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotCriticality {
    #[default]
    Optional = 0,
    Important = 1,
    Required = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub key: SlotKey,
    /// 1-based display position, contiguous across the event.
    pub order: u32,
    #[serde(default)]
    pub criticality: SlotCriticality,
    pub position_keys: Vec<PositionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_registration_key: Option<RegistrationKey>,
}

impl Slot {
    pub fn new(key: impl Into<SlotKey>, order: u32, position_keys: Vec<PositionKey>) -> Self {
        Self {
            key: key.into(),
            order,
            criticality: SlotCriticality::Optional,
            position_keys,
            assigned_registration_key: None,
        }
    }

    pub fn accepts_any(&self, positions: &[PositionKey]) -> bool {
        self.position_keys.iter().any(|p| positions.contains(p))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// 1-based, contiguous; doubles as the location's identity within the event.
    pub order: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub information: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etd: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub key: RegistrationKey,
    pub position_key: PositionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<UserKey>,
    /// Guest name; set instead of `user_key` for people without an account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Slot the registration asks to be placed in when it is updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<SlotKey>,
    #[serde(default)]
    pub confirmed: bool,
}

impl Registration {
    pub fn for_user(
        key: impl Into<RegistrationKey>,
        user_key: impl Into<UserKey>,
        position_key: impl Into<PositionKey>,
    ) -> Self {
        Self {
            key: key.into(),
            position_key: position_key.into(),
            user_key: Some(user_key.into()),
            name: None,
            slot_key: None,
            confirmed: false,
        }
    }

    pub fn for_guest(
        key: impl Into<RegistrationKey>,
        name: impl Into<String>,
        position_key: impl Into<PositionKey>,
    ) -> Self {
        Self {
            key: key.into(),
            position_key: position_key.into(),
            user_key: None,
            name: Some(name.into()),
            slot_key: None,
            confirmed: false,
        }
    }
}

/// Per-viewer state derived on every load. Never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventComputed {
    pub is_in_past: bool,
    pub days: i64,
    pub signed_in_user_registration: Option<Registration>,
    pub signed_in_user_assigned_slot: Option<Slot>,
    pub is_signed_in_user_assigned: bool,
    pub can_signed_in_user_join: bool,
    pub can_signed_in_user_leave: bool,
    pub can_signed_in_user_update_registration: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub key: EventKey,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub state: EventState,
    #[serde(default)]
    pub signup_type: EventSignupType,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub registrations: Vec<Registration>,
    #[serde(skip)]
    pub computed: EventComputed,
}

impl Event {
    pub fn new(
        key: impl Into<EventKey>,
        name: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: String::new(),
            start,
            end,
            state: EventState::Draft,
            signup_type: EventSignupType::Assignment,
            locations: Vec::new(),
            slots: Vec::new(),
            registrations: Vec::new(),
            computed: EventComputed::default(),
        }
    }

    /// Year bucket the events cache partitions by.
    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn registration(&self, key: &RegistrationKey) -> Option<&Registration> {
        self.registrations.iter().find(|r| &r.key == key)
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&Slot> {
        self.slots.iter().find(|s| &s.key == key)
    }

    /// The slot bound to a registration, if any.
    pub fn slot_of(&self, registration: &RegistrationKey) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|s| s.assigned_registration_key.as_ref() == Some(registration))
    }

    pub fn is_canceled(&self) -> bool {
        self.state == EventState::Canceled
    }

    /// Compact date range for list views: "Jun 06 - Jun 08, 2025"
    pub fn formatted_date_range(&self) -> String {
        if self.start.date_naive() == self.end.date_naive() {
            self.start.format("%b %d, %Y").to_string()
        } else {
            format!(
                "{} - {}",
                self.start.format("%b %d"),
                self.end.format("%b %d, %Y")
            )
        }
    }
}

impl Cacheable for Event {
    type Key = EventKey;

    fn key(&self) -> EventKey {
        self.key.clone()
    }

    fn collection() -> &'static str {
        "events"
    }
}

/// Partial update body for an event. Absent fields are left untouched by the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<EventState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signup_type: Option<EventSignupType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<Slot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrations: Option<Vec<Registration>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&Event> for EventPatch {
    fn from(event: &Event) -> Self {
        Self {
            name: Some(event.name.clone()),
            description: Some(event.description.clone()),
            start: Some(event.start),
            end: Some(event.end),
            state: Some(event.state),
            signup_type: Some(event.signup_type),
            locations: Some(event.locations.clone()),
            slots: Some(event.slots.clone()),
            registrations: Some(event.registrations.clone()),
        }
    }
}
