pub mod announcement;
pub mod effectif;
pub mod establishment;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

pub use announcement::{extract_siren, normalize_announcements};
pub use effectif::effectif_label;
pub use establishment::normalize_establishments;

/// Flatten nested objects into `parent<sep>child` keys. Arrays and scalars are leaves.
pub fn flatten(record: &Value, sep: &str) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(fields) = record {
        for (key, value) in fields {
            flatten_into(&mut out, key.clone(), value, sep);
        }
    }
    out
}

fn flatten_into(out: &mut Map<String, Value>, key: String, value: &Value, sep: &str) {
    match value {
        Value::Object(fields) if !fields.is_empty() => {
            for (child, v) in fields {
                flatten_into(out, format!("{}{}{}", key, sep, child), v, sep);
            }
        }
        other => {
            out.insert(key, other.clone());
        }
    }
}

/// Keep the allow-listed fields present in `flat`, renamed to their column.
/// Missing or null fields are simply not in the result.
pub fn project(
    flat: &Map<String, Value>,
    columns: &[(&str, &'static str)],
) -> HashMap<&'static str, String> {
    columns
        .iter()
        .filter_map(|(source, column)| flat.get(*source).and_then(cell_text).map(|v| (*column, v)))
        .collect()
}

/// Text form of a JSON leaf. Null has none.
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Lenient date parsing; anything unrecognised is `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}
