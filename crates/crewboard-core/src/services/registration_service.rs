//! Crew roster and waiting-list resolution.
//!
//! Joins an event's slots and registrations with the user and position
//! catalogs into display rows, in the order crew lists show them.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::warn;

use crate::models::{
    Event, Position, PositionKey, Registration, RegistrationKey, Slot, SlotKey, User, UserKey,
};

/// One row of a crew roster or waiting list.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRegistration {
    /// `None` on the waiting list.
    pub slot: Option<Slot>,
    /// `None` for open slots.
    pub registration: Option<Registration>,
    pub user: Option<User>,
    /// Display name; empty when neither a user nor a guest name resolves.
    pub name: String,
    pub position: Position,
    /// The registration claims a different position than the slot's first one.
    pub position_overwritten: bool,
    pub confirmed: bool,
    /// Set when the slot points at a registration the event does not have.
    pub orphaned_registration_key: Option<RegistrationKey>,
}

impl ResolvedRegistration {
    pub fn is_open(&self) -> bool {
        self.registration.is_none()
    }
}

fn position_for(positions: &HashMap<PositionKey, Position>, key: &PositionKey) -> Position {
    positions.get(key).cloned().unwrap_or_else(Position::unknown)
}

fn user_for<'a>(users: &'a [User], registration: &Registration) -> Option<&'a User> {
    let key = registration.user_key.as_ref()?;
    users.iter().find(|u| &u.key == key)
}

fn display_name(user: Option<&User>, registration: &Registration) -> String {
    match user {
        Some(user) => user.preferred_name(),
        None => registration.name.clone().unwrap_or_default(),
    }
}

/// Lexical order with empty names last.
fn compare_names(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.cmp(b),
    }
}

/// Resolve every slot of `event`, open or assigned.
///
/// Sorted by position priority (highest first), then slot order, then name.
pub fn resolve_registrations_with_assigned_slots(
    event: &Event,
    users: &[User],
    positions: &HashMap<PositionKey, Position>,
) -> Vec<ResolvedRegistration> {
    let mut resolved: Vec<ResolvedRegistration> = event
        .slots
        .iter()
        .map(|slot| {
            let slot_position = slot.position_keys.first();
            let registration = slot
                .assigned_registration_key
                .as_ref()
                .and_then(|key| event.registration(key));

            let orphaned = match (&slot.assigned_registration_key, registration) {
                (Some(key), None) => {
                    warn!(
                        event = %event.key,
                        slot = %slot.key,
                        registration = %key,
                        "Slot references a missing registration"
                    );
                    Some(key.clone())
                }
                _ => None,
            };

            match registration {
                Some(registration) => {
                    let user = user_for(users, registration);
                    ResolvedRegistration {
                        slot: Some(slot.clone()),
                        registration: Some(registration.clone()),
                        user: user.cloned(),
                        name: display_name(user, registration),
                        position: position_for(positions, &registration.position_key),
                        position_overwritten: slot_position != Some(&registration.position_key),
                        confirmed: registration.confirmed,
                        orphaned_registration_key: None,
                    }
                }
                None => ResolvedRegistration {
                    slot: Some(slot.clone()),
                    registration: None,
                    user: None,
                    name: String::new(),
                    position: slot_position
                        .map(|key| position_for(positions, key))
                        .unwrap_or_else(Position::unknown),
                    position_overwritten: false,
                    confirmed: false,
                    orphaned_registration_key: orphaned,
                },
            }
        })
        .collect();

    resolved.sort_by(|a, b| {
        b.position
            .prio
            .cmp(&a.position.prio)
            .then_with(|| slot_order(a).cmp(&slot_order(b)))
            .then_with(|| compare_names(&a.name, &b.name))
    });
    resolved
}

fn slot_order(row: &ResolvedRegistration) -> u32 {
    row.slot.as_ref().map_or(u32::MAX, |s| s.order)
}

/// Resolve the registrations no slot is bound to.
///
/// Sorted by position priority (highest first), then name.
pub fn resolve_registrations_on_waiting_list(
    event: &Event,
    users: &[User],
    positions: &HashMap<PositionKey, Position>,
) -> Vec<ResolvedRegistration> {
    let mut resolved: Vec<ResolvedRegistration> = event
        .registrations
        .iter()
        .filter(|r| event.slot_of(&r.key).is_none())
        .map(|registration| {
            let user = user_for(users, registration);
            ResolvedRegistration {
                slot: None,
                registration: Some(registration.clone()),
                user: user.cloned(),
                name: display_name(user, registration),
                position: position_for(positions, &registration.position_key),
                position_overwritten: false,
                confirmed: registration.confirmed,
                orphaned_registration_key: None,
            }
        })
        .collect();

    resolved.sort_by(|a, b| {
        b.position
            .prio
            .cmp(&a.position.prio)
            .then_with(|| compare_names(&a.name, &b.name))
    });
    resolved
}

pub fn find_registration_for_user<'a>(event: &'a Event, user: &UserKey) -> Option<&'a Registration> {
    event
        .registrations
        .iter()
        .find(|r| r.user_key.as_ref() == Some(user))
}

/// Replace (or add) a registration on `event`.
///
/// When the registration carries a `slot_key` naming a slot that is open or
/// already holds it, the registration moves into that slot and any other
/// slot it held is released. Returns the slot it ends up bound to.
pub fn apply_registration_update(event: &mut Event, registration: Registration) -> Option<SlotKey> {
    let key = registration.key.clone();
    let hint = registration.slot_key.clone();

    match event.registrations.iter_mut().find(|r| r.key == key) {
        Some(existing) => *existing = registration,
        None => event.registrations.push(registration),
    }

    if let Some(hint) = hint {
        let available = event.slot(&hint).is_some_and(|slot| {
            slot.assigned_registration_key.is_none()
                || slot.assigned_registration_key.as_ref() == Some(&key)
        });
        if available {
            for slot in event.slots.iter_mut() {
                if slot.key == hint {
                    slot.assigned_registration_key = Some(key.clone());
                } else if slot.assigned_registration_key.as_ref() == Some(&key) {
                    slot.assigned_registration_key = None;
                }
            }
        } else {
            warn!(event = %event.key, slot = %hint, registration = %key, "Requested slot is not available");
        }
    }

    event.slot_of(&key).map(|s| s.key.clone())
}
