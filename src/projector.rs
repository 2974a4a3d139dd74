use crate::types::{Counts, KeySnapshot, StudentSnapshot};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Clone, Copy)]
enum KeyStatus {
    Available,
    Taken,
}

/// Derive dashboard counters from the student and key collections.
///
/// `available` and `taken` follow each student's `keyStatus`. Only when no
/// student record carries a `keyStatus` string are they read from the key
/// collection's `status` instead.
///
/// Either input may be missing or of the wrong shape; it then counts as an
/// empty list. A record lacking the field a counter looks at is not counted.
pub fn project(students: Option<&Value>, keys: Option<&Value>) -> Counts {
    let mut counts = Counts::default();
    let mut saw_key_status = false;

    for student in records::<StudentSnapshot>(students) {
        if let Some(status) = student.key_status.as_ref().and_then(Value::as_str) {
            saw_key_status = true;
            tally(&mut counts, status);
        }
        if student.student_banned_status.as_ref().and_then(Value::as_bool) == Some(true) {
            counts.banned += 1;
        }
        counts.warned += warning_count(student.student_warning_status.as_ref());
    }

    if !saw_key_status {
        for key in records::<KeySnapshot>(keys) {
            if let Some(status) = key.status.as_ref().and_then(Value::as_str) {
                tally(&mut counts, status);
            }
        }
    }

    counts
}

fn tally(counts: &mut Counts, status: &str) {
    match classify(status) {
        Some(KeyStatus::Available) => counts.available += 1,
        Some(KeyStatus::Taken) => counts.taken += 1,
        None => {}
    }
}

fn classify(status: &str) -> Option<KeyStatus> {
    let status = status.trim();
    if status.eq_ignore_ascii_case("available") {
        Some(KeyStatus::Available)
    } else if status.eq_ignore_ascii_case("taken") || status.eq_ignore_ascii_case("assigned") {
        Some(KeyStatus::Taken)
    } else {
        None
    }
}

/// Accepts a bare list or `{ "data": [...] }`.
fn as_list(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => match map.get("data") {
            Some(Value::Array(items)) => items,
            _ => &[],
        },
        _ => &[],
    }
}

fn records<T: DeserializeOwned>(value: Option<&Value>) -> impl Iterator<Item = T> + '_ {
    as_list(value)
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping unreadable record {}: {}", item, e);
                None
            }
        })
}

fn warning_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::Bool(true)) => 1,
        _ => 0,
    }
}
