//! Operations on a single [`Event`]: slot and location layout, open-slot
//! queries, per-viewer eligibility and field validation.
//!
//! Everything here is a plain function over event values. Structural edits
//! take `&mut Event` and leave slot and location `order` values as a
//! contiguous `1..=N` sequence.

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use thiserror::Error;

use crate::models::{
    Event, EventComputed, EventPatch, EventSignupType, Location, PositionKey, RegistrationKey,
    Slot, SlotCriticality, SlotKey, User,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum length of an event name.
pub const MAX_NAME_LENGTH: usize = 35;

/// Assigned crew may leave only while the event is more than this many days out.
pub const LEAVE_CUTOFF_DAYS: i64 = 7;

const SLOT_KEY_LENGTH: usize = 12;

// ============================================================================
// Ordering
// ============================================================================

trait Ordered {
    fn order(&self) -> u32;
    fn set_order(&mut self, order: u32);
}

impl Ordered for Slot {
    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

impl Ordered for Location {
    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

/// Sort by current order (stable) and renumber from 1.
fn normalize<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(|item| item.order());
    renumber(items);
}

fn renumber<T: Ordered>(items: &mut [T]) {
    for (i, item) in items.iter_mut().enumerate() {
        item.set_order(i as u32 + 1);
    }
}

/// Swap the item at `index` with the one `offset` places away, clamped to the ends.
fn move_item<T: Ordered>(items: &mut [T], index: usize, offset: i32) {
    if items.is_empty() {
        return;
    }
    let last = items.len() as i64 - 1;
    let target = (index as i64 + offset as i64).clamp(0, last) as usize;
    items.swap(index, target);
    renumber(items);
}

pub fn normalize_slot_order(event: &mut Event) {
    normalize(&mut event.slots);
}

pub fn normalize_location_order(event: &mut Event) {
    normalize(&mut event.locations);
}

/// Slots in display order.
pub fn sorted_slots(event: &Event) -> Vec<&Slot> {
    let mut slots: Vec<&Slot> = event.slots.iter().collect();
    slots.sort_by_key(|s| s.order);
    slots
}

// ============================================================================
// Slots
// ============================================================================

/// Move a slot `offset` places up (negative) or down (positive).
///
/// Returns false if no slot has that key.
pub fn move_slot(event: &mut Event, key: &SlotKey, offset: i32) -> bool {
    normalize(&mut event.slots);
    match event.slots.iter().position(|s| &s.key == key) {
        Some(index) => {
            move_item(&mut event.slots, index, offset);
            true
        }
        None => false,
    }
}

/// Append an open slot and return its generated key.
pub fn add_slot(
    event: &mut Event,
    position_keys: Vec<PositionKey>,
    criticality: SlotCriticality,
) -> SlotKey {
    normalize(&mut event.slots);
    let key = new_slot_key(event);
    let mut slot = Slot::new(key.clone(), event.slots.len() as u32 + 1, position_keys);
    slot.criticality = criticality;
    event.slots.push(slot);
    key
}

pub fn remove_slot(event: &mut Event, key: &SlotKey) -> Option<Slot> {
    let index = event.slots.iter().position(|s| &s.key == key)?;
    let removed = event.slots.remove(index);
    normalize(&mut event.slots);
    Some(removed)
}

/// Insert an unassigned copy of a slot right after it.
///
/// Returns the key of the copy, or `None` if the source does not exist.
pub fn duplicate_slot(event: &mut Event, key: &SlotKey) -> Option<SlotKey> {
    normalize(&mut event.slots);
    let index = event.slots.iter().position(|s| &s.key == key)?;

    let mut copy = event.slots[index].clone();
    copy.key = new_slot_key(event);
    copy.assigned_registration_key = None;
    let copy_key = copy.key.clone();

    event.slots.insert(index + 1, copy);
    renumber(&mut event.slots);
    Some(copy_key)
}

fn new_slot_key(event: &Event) -> SlotKey {
    let mut rng = rand::thread_rng();
    loop {
        let candidate: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(SLOT_KEY_LENGTH)
            .map(char::from)
            .collect();
        let key = SlotKey::new(candidate);
        if event.slot(&key).is_none() {
            return key;
        }
    }
}

/// Bind a registration to a slot, releasing any other slot it held.
///
/// Returns false if either side does not exist on the event.
pub fn assign_registration(event: &mut Event, slot: &SlotKey, registration: &RegistrationKey) -> bool {
    if event.registration(registration).is_none() || event.slot(slot).is_none() {
        return false;
    }
    for s in event.slots.iter_mut() {
        if &s.key == slot {
            s.assigned_registration_key = Some(registration.clone());
        } else if s.assigned_registration_key.as_ref() == Some(registration) {
            s.assigned_registration_key = None;
        }
    }
    true
}

/// Clear a slot's assignment and return the registration it held.
pub fn unassign_slot(event: &mut Event, slot: &SlotKey) -> Option<RegistrationKey> {
    event
        .slots
        .iter_mut()
        .find(|s| &s.key == slot)
        .and_then(|s| s.assigned_registration_key.take())
}

// ============================================================================
// Locations
// ============================================================================

/// Move the location at `order` by `offset` places. Returns false if absent.
pub fn move_location(event: &mut Event, order: u32, offset: i32) -> bool {
    normalize(&mut event.locations);
    match event.locations.iter().position(|l| l.order == order) {
        Some(index) => {
            move_item(&mut event.locations, index, offset);
            true
        }
        None => false,
    }
}

/// Append a location and return the order it was given.
pub fn add_location(event: &mut Event, mut location: Location) -> u32 {
    normalize(&mut event.locations);
    location.order = event.locations.len() as u32 + 1;
    let order = location.order;
    event.locations.push(location);
    order
}

pub fn remove_location(event: &mut Event, order: u32) -> Option<Location> {
    let index = event.locations.iter().position(|l| l.order == order)?;
    let removed = event.locations.remove(index);
    normalize(&mut event.locations);
    Some(removed)
}

// ============================================================================
// Open slots
// ============================================================================

/// A slot counts as open when nothing on the event is bound to it.
///
/// A key pointing at a registration that no longer exists leaves the slot open.
pub fn is_slot_open(event: &Event, slot: &Slot) -> bool {
    match slot.assigned_registration_key {
        None => true,
        Some(ref key) => event.registration(key).is_none(),
    }
}

/// Whether the event has an open slot of at least `min_criticality`.
///
/// `positions` restricts the check to slots accepting one of them; an empty
/// filter means no restriction. Open-signup events have unlimited optional
/// capacity but never report important or required openings.
pub fn has_open_slots(
    event: &Event,
    positions: Option<&[PositionKey]>,
    min_criticality: SlotCriticality,
) -> bool {
    if event.signup_type == EventSignupType::Open {
        return min_criticality == SlotCriticality::Optional;
    }

    let filter = positions.filter(|p| !p.is_empty());
    event.slots.iter().any(|slot| {
        slot.criticality >= min_criticality
            && is_slot_open(event, slot)
            && filter.map_or(true, |p| slot.accepts_any(p))
    })
}

pub fn has_open_important_slots(event: &Event, positions: Option<&[PositionKey]>) -> bool {
    has_open_slots(event, positions, SlotCriticality::Important)
}

pub fn has_open_required_slots(event: &Event, positions: Option<&[PositionKey]>) -> bool {
    has_open_slots(event, positions, SlotCriticality::Required)
}

// ============================================================================
// Computed values
// ============================================================================

pub fn update_computed_values(event: &mut Event, viewer: Option<&User>) {
    update_computed_values_at(event, viewer, Utc::now());
}

/// Recompute the derived, per-viewer fields of `event` as of `now`.
pub fn update_computed_values_at(event: &mut Event, viewer: Option<&User>, now: DateTime<Utc>) {
    let mut computed = EventComputed {
        is_in_past: event.end < now,
        days: (event.end.date_naive() - event.start.date_naive()).num_days(),
        ..EventComputed::default()
    };

    let upcoming = event.start > now;

    if let Some(viewer) = viewer {
        let registration = event
            .registrations
            .iter()
            .find(|r| r.user_key.as_ref() == Some(&viewer.key))
            .cloned();

        match registration {
            None => {
                computed.can_signed_in_user_join = !viewer.positions.is_empty() && upcoming;
            }
            Some(registration) => {
                let slot = event.slot_of(&registration.key).cloned();
                let assigned = event.signup_type != EventSignupType::Assignment || slot.is_some();

                if assigned {
                    computed.can_signed_in_user_update_registration = upcoming;
                    computed.can_signed_in_user_leave =
                        event.start - now > Duration::days(LEAVE_CUTOFF_DAYS);
                } else {
                    computed.can_signed_in_user_update_registration = upcoming;
                    computed.can_signed_in_user_leave = upcoming;
                }

                computed.is_signed_in_user_assigned = assigned;
                computed.signed_in_user_assigned_slot = slot;
                computed.signed_in_user_registration = Some(registration);
            }
        }
    }

    if event.is_canceled() {
        computed.can_signed_in_user_join = false;
    }

    event.computed = computed;
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name is required")]
    NameRequired,

    #[error("Name must be at most {max} characters")]
    NameTooLong { max: usize },

    #[error("Start date is required")]
    StartRequired,

    #[error("End date is required")]
    EndRequired,

    #[error("End date must be after the start date")]
    EndNotAfterStart,
}

/// Full validation of a create or replace body. Returns every violation.
pub fn validate(patch: &EventPatch) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if patch.name.is_none() {
        errors.push(ValidationError::NameRequired);
    }
    if patch.start.is_none() {
        errors.push(ValidationError::StartRequired);
    }
    if patch.end.is_none() {
        errors.push(ValidationError::EndRequired);
    }
    errors.extend(validate_partial(patch));
    errors
}

/// Validate only the fields present in `patch`.
pub fn validate_partial(patch: &EventPatch) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(ref name) = patch.name {
        let name = name.trim();
        if name.is_empty() {
            errors.push(ValidationError::NameRequired);
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.push(ValidationError::NameTooLong { max: MAX_NAME_LENGTH });
        }
    }

    if let (Some(start), Some(end)) = (patch.start, patch.end) {
        if end <= start {
            errors.push(ValidationError::EndNotAfterStart);
        }
    }

    errors
}

pub fn validate_event(event: &Event) -> Vec<ValidationError> {
    validate(&EventPatch::from(event))
}

// ============================================================================
// Diff
// ============================================================================

/// The fields of `changed` that differ from `original`.
pub fn diff(original: &Event, changed: &Event) -> EventPatch {
    fn changed_field<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
        (a != b).then(|| b.clone())
    }

    EventPatch {
        name: changed_field(&original.name, &changed.name),
        description: changed_field(&original.description, &changed.description),
        start: changed_field(&original.start, &changed.start),
        end: changed_field(&original.end, &changed.end),
        state: changed_field(&original.state, &changed.state),
        signup_type: changed_field(&original.signup_type, &changed.signup_type),
        locations: changed_field(&original.locations, &changed.locations),
        slots: changed_field(&original.slots, &changed.slots),
        registrations: changed_field(&original.registrations, &changed.registrations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventState, Registration};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    fn event_in(days: i64) -> Event {
        let start = now() + Duration::days(days);
        Event::new("e1", "Baltic Crossing", start, start + Duration::days(2))
    }

    fn pk(key: &str) -> PositionKey {
        PositionKey::new(key)
    }

    fn with_slots(keys: &[&str]) -> Event {
        let mut event = event_in(30);
        for (i, key) in keys.iter().enumerate() {
            event
                .slots
                .push(Slot::new(*key, i as u32 + 1, vec![pk("deckhand")]));
        }
        event
    }

    fn slot_keys(event: &Event) -> Vec<String> {
        sorted_slots(event).iter().map(|s| s.key.0.clone()).collect()
    }

    fn orders_are_contiguous(event: &Event) -> bool {
        let mut slots: Vec<u32> = event.slots.iter().map(|s| s.order).collect();
        slots.sort_unstable();
        let mut locations: Vec<u32> = event.locations.iter().map(|l| l.order).collect();
        locations.sort_unstable();
        slots.iter().enumerate().all(|(i, o)| *o == i as u32 + 1)
            && locations.iter().enumerate().all(|(i, o)| *o == i as u32 + 1)
    }

    fn viewer() -> User {
        let mut user = User::new("u1", "Mia", "Berg");
        user.positions = vec![pk("deckhand")];
        user
    }

    #[test]
    fn test_move_slot_swaps_and_clamps() {
        let mut event = with_slots(&["a", "b", "c"]);

        assert!(move_slot(&mut event, &SlotKey::new("a"), 1));
        assert_eq!(slot_keys(&event), vec!["b", "a", "c"]);

        assert!(move_slot(&mut event, &SlotKey::new("c"), -10));
        assert_eq!(slot_keys(&event), vec!["c", "a", "b"]);

        assert!(move_slot(&mut event, &SlotKey::new("a"), 5));
        assert_eq!(slot_keys(&event), vec!["c", "b", "a"]);

        assert!(!move_slot(&mut event, &SlotKey::new("missing"), 1));
    }

    #[test]
    fn test_duplicate_slot_is_unassigned_and_follows_source() {
        let mut event = with_slots(&["a", "b"]);
        event.registrations.push(Registration::for_user("r1", "u1", "deckhand"));
        event.slots[0].assigned_registration_key = Some(RegistrationKey::new("r1"));
        event.slots[0].criticality = SlotCriticality::Required;

        let copy = duplicate_slot(&mut event, &SlotKey::new("a")).unwrap();
        assert_ne!(copy, SlotKey::new("a"));

        let slots = sorted_slots(&event);
        assert_eq!(slots[1].key, copy);
        assert_eq!(slots[1].order, 2);
        assert!(slots[1].assigned_registration_key.is_none());
        assert_eq!(slots[1].criticality, SlotCriticality::Required);
        assert_eq!(slots[2].key, SlotKey::new("b"));
        assert!(duplicate_slot(&mut event, &SlotKey::new("missing")).is_none());
    }

    #[test]
    fn test_order_stays_contiguous_through_edits() {
        let mut event = with_slots(&["a", "b", "c", "d"]);
        event.slots[2].order = 9;
        for name in ["Harbor", "Anchorage", "Marina"] {
            add_location(
                &mut event,
                Location {
                    name: name.to_string(),
                    ..Default::default()
                },
            );
        }

        let keys = ["a", "b", "c", "d"];
        for step in 0..24 {
            let key = SlotKey::new(keys[step % keys.len()]);
            match step % 6 {
                0 => {
                    move_slot(&mut event, &key, (step as i32 % 5) - 2);
                }
                1 => {
                    duplicate_slot(&mut event, &key);
                }
                2 => {
                    remove_slot(&mut event, &key);
                }
                3 => {
                    move_location(&mut event, 1, 2);
                }
                4 => {
                    add_slot(&mut event, vec![pk("skipper")], SlotCriticality::Optional);
                }
                _ => {
                    remove_location(&mut event, 2);
                    add_location(&mut event, Location::default());
                }
            }
            assert!(orders_are_contiguous(&event), "gap after step {}", step);
        }
    }

    #[test]
    fn test_location_edits() {
        let mut event = event_in(30);
        let first = add_location(
            &mut event,
            Location {
                name: "Kiel".to_string(),
                ..Default::default()
            },
        );
        let second = add_location(
            &mut event,
            Location {
                name: "Sønderborg".to_string(),
                ..Default::default()
            },
        );
        assert_eq!((first, second), (1, 2));

        assert!(move_location(&mut event, 2, -1));
        let names: Vec<&str> = event.locations.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Sønderborg", "Kiel"]);

        let removed = remove_location(&mut event, 1).unwrap();
        assert_eq!(removed.name, "Sønderborg");
        assert_eq!(event.locations[0].order, 1);
        assert!(remove_location(&mut event, 5).is_none());
    }

    #[test]
    fn test_open_signup_events_only_report_optional_capacity() {
        let mut event = event_in(30);
        event.signup_type = EventSignupType::Open;
        assert!(has_open_slots(&event, None, SlotCriticality::Optional));
        assert!(!has_open_important_slots(&event, Some(&[][..])));
        assert!(!has_open_required_slots(&event, None));
    }

    #[test]
    fn test_has_open_slots_respects_criticality_and_filter() {
        let mut event = with_slots(&["a", "b"]);
        event.slots[0].criticality = SlotCriticality::Required;
        event.slots[0].position_keys = vec![pk("skipper")];
        event.registrations.push(Registration::for_user("r1", "u1", "deckhand"));
        event.slots[1].assigned_registration_key = Some(RegistrationKey::new("r1"));

        assert!(has_open_required_slots(&event, None));
        assert!(has_open_required_slots(&event, Some(&[][..])));
        assert!(has_open_required_slots(&event, Some(&[pk("skipper")][..])));
        assert!(!has_open_slots(&event, Some(&[pk("deckhand")][..]), SlotCriticality::Optional));

        event.slots[0].assigned_registration_key = Some(RegistrationKey::new("r1"));
        event.slots[1].assigned_registration_key = None;
        assert!(!has_open_important_slots(&event, None));
        assert!(has_open_slots(&event, None, SlotCriticality::Optional));
    }

    #[test]
    fn test_dangling_assignment_leaves_slot_open() {
        let mut event = with_slots(&["a"]);
        event.slots[0].assigned_registration_key = Some(RegistrationKey::new("gone"));
        assert!(is_slot_open(&event, &event.slots[0]));
        assert!(has_open_slots(&event, None, SlotCriticality::Optional));
    }

    #[test]
    fn test_viewer_without_registration_may_join() {
        let mut event = event_in(10);
        update_computed_values_at(&mut event, Some(&viewer()), now());
        assert!(event.computed.can_signed_in_user_join);
        assert!(!event.computed.can_signed_in_user_leave);
        assert!(!event.computed.can_signed_in_user_update_registration);
        assert_eq!(event.computed.days, 2);

        let mut no_positions = viewer();
        no_positions.positions.clear();
        update_computed_values_at(&mut event, Some(&no_positions), now());
        assert!(!event.computed.can_signed_in_user_join);

        let mut past = event_in(-5);
        update_computed_values_at(&mut past, Some(&viewer()), now());
        assert!(!past.computed.can_signed_in_user_join);
        assert!(past.computed.is_in_past);
    }

    #[test]
    fn test_canceled_event_cannot_be_joined() {
        let mut event = event_in(10);
        event.state = EventState::Canceled;
        update_computed_values_at(&mut event, Some(&viewer()), now());
        assert!(!event.computed.can_signed_in_user_join);
    }

    fn assigned_event(days: i64) -> Event {
        let mut event = event_in(days);
        event.registrations.push(Registration::for_user("r1", "u1", "deckhand"));
        event.slots.push(Slot::new("s1", 1, vec![pk("deckhand")]));
        event.slots[0].assigned_registration_key = Some(RegistrationKey::new("r1"));
        event
    }

    #[test]
    fn test_assigned_viewer_may_leave_ten_days_out() {
        let mut event = assigned_event(10);
        update_computed_values_at(&mut event, Some(&viewer()), now());
        assert!(event.computed.is_signed_in_user_assigned);
        assert!(event.computed.can_signed_in_user_leave);
        assert!(event.computed.can_signed_in_user_update_registration);
        assert!(!event.computed.can_signed_in_user_join);
        assert_eq!(
            event.computed.signed_in_user_assigned_slot.map(|s| s.key),
            Some(SlotKey::new("s1"))
        );
    }

    #[test]
    fn test_assigned_viewer_cannot_leave_three_days_out() {
        let mut event = assigned_event(3);
        update_computed_values_at(&mut event, Some(&viewer()), now());
        assert!(!event.computed.can_signed_in_user_leave);
        assert!(event.computed.can_signed_in_user_update_registration);
    }

    #[test]
    fn test_waiting_list_viewer_may_leave_until_start() {
        let mut event = assigned_event(3);
        event.slots[0].assigned_registration_key = None;
        update_computed_values_at(&mut event, Some(&viewer()), now());
        assert!(!event.computed.is_signed_in_user_assigned);
        assert!(event.computed.can_signed_in_user_leave);
        assert!(event.computed.can_signed_in_user_update_registration);

        event.signup_type = EventSignupType::Open;
        update_computed_values_at(&mut event, Some(&viewer()), now());
        assert!(event.computed.is_signed_in_user_assigned);
        assert!(!event.computed.can_signed_in_user_leave);
    }

    #[test]
    fn test_assign_and_unassign() {
        let mut event = with_slots(&["a", "b"]);
        event.registrations.push(Registration::for_guest("r1", "Ole", "deckhand"));

        assert!(assign_registration(&mut event, &SlotKey::new("a"), &RegistrationKey::new("r1")));
        assert!(assign_registration(&mut event, &SlotKey::new("b"), &RegistrationKey::new("r1")));
        assert!(event.slots[0].assigned_registration_key.is_none());
        assert!(!assign_registration(&mut event, &SlotKey::new("a"), &RegistrationKey::new("r9")));

        assert_eq!(
            unassign_slot(&mut event, &SlotKey::new("b")),
            Some(RegistrationKey::new("r1"))
        );
        assert_eq!(unassign_slot(&mut event, &SlotKey::new("b")), None);
    }

    #[test]
    fn test_validation() {
        let start = now();
        let full = EventPatch {
            name: Some("Summer Regatta".to_string()),
            start: Some(start),
            end: Some(start + Duration::hours(4)),
            ..Default::default()
        };
        assert!(validate(&full).is_empty());

        let errors = validate(&EventPatch::default());
        assert_eq!(
            errors,
            vec![
                ValidationError::NameRequired,
                ValidationError::StartRequired,
                ValidationError::EndRequired,
            ]
        );
        assert!(validate_partial(&EventPatch::default()).is_empty());

        let bad = EventPatch {
            name: Some("x".repeat(MAX_NAME_LENGTH + 1)),
            start: Some(start),
            end: Some(start),
            ..Default::default()
        };
        assert_eq!(
            validate_partial(&bad),
            vec![
                ValidationError::NameTooLong { max: MAX_NAME_LENGTH },
                ValidationError::EndNotAfterStart,
            ]
        );
        assert!(validate_event(&event_in(3)).is_empty());
    }

    #[test]
    fn test_diff_contains_only_changed_fields() {
        let original = with_slots(&["a"]);
        let mut changed = original.clone();
        changed.name = "Autumn Regatta".to_string();
        move_slot(&mut changed, &SlotKey::new("a"), 1);

        let patch = diff(&original, &changed);
        assert_eq!(patch.name.as_deref(), Some("Autumn Regatta"));
        assert!(patch.slots.is_none());
        assert!(patch.start.is_none());
        assert!(diff(&original, &original).is_empty());
    }
}
