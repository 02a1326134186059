use crewboard_core::models::{Event, SlotCriticality};
use crewboard_core::services::{event_service, ResolvedRegistration};

/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Short flags describing the viewer's options on an event.
fn viewer_flags(event: &Event) -> String {
    let computed = &event.computed;
    let mut flags = Vec::new();
    if computed.is_signed_in_user_assigned {
        flags.push("crew");
    } else if computed.signed_in_user_registration.is_some() {
        flags.push("waiting");
    }
    if computed.can_signed_in_user_join {
        flags.push("can join");
    }
    if computed.can_signed_in_user_leave {
        flags.push("can leave");
    }
    flags.join(", ")
}

pub fn event_line(event: &Event) -> String {
    let open = if event_service::has_open_required_slots(event, None) {
        "required slots open"
    } else if event_service::has_open_slots(event, None, SlotCriticality::Optional) {
        "slots open"
    } else {
        "full"
    };
    format!(
        "{:<12} {:<36} {:<24} {:<16} {:<20} {}",
        truncate_string(event.key.as_str(), 12),
        truncate_string(&event.name, 36),
        event.formatted_date_range(),
        event.state.to_string(),
        open,
        viewer_flags(event),
    )
}

pub fn roster_line(row: &ResolvedRegistration) -> String {
    let order = row
        .slot
        .as_ref()
        .map(|s| s.order.to_string())
        .unwrap_or_else(|| "-".to_string());

    let name = match (&row.registration, &row.orphaned_registration_key) {
        (Some(_), _) if row.name.is_empty() => "(unknown)".to_string(),
        (Some(_), _) => row.name.clone(),
        (None, Some(key)) => format!("(missing registration {})", key),
        (None, None) => "(open)".to_string(),
    };

    let mut notes = Vec::new();
    if row.confirmed {
        notes.push("confirmed");
    }
    if row.position_overwritten {
        notes.push("position changed");
    }

    format!(
        "{:>3}  {:<18} {:<28} {}",
        order,
        truncate_string(&row.position.name, 18),
        truncate_string(&name, 28),
        notes.join(", "),
    )
}
