use std::collections::HashSet;

use itertools::Itertools;
use serde_json::Value;

use super::{flatten, parse_date, project};
use crate::db::AnnouncementRow;

/// BODACC field → `bodacc_procedures` column (the SIREN comes from `registre`).
pub const BODACC_COLUMNS: [(&str, &str); 3] = [
    ("familleavis_lib", "type_procedure"),
    ("dateparution", "date_procedure"),
    ("url_complete", "source"),
];

/// SIREN of an announcement. `registre` is either a string or a list whose
/// first entry is used; whitespace is removed.
pub fn extract_siren(record: &Value) -> Option<String> {
    let raw = match record.get("registre")? {
        Value::String(s) => s.as_str(),
        Value::Array(items) => items.first()?.as_str()?,
        _ => return None,
    };
    let siren: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if siren.is_empty() {
        None
    } else {
        Some(siren)
    }
}

pub fn to_row(siren: String, record: &Value) -> AnnouncementRow {
    let flat = flatten(record, "_");
    let mut cols = project(&flat, &BODACC_COLUMNS);
    AnnouncementRow {
        siren,
        type_procedure: cols.remove("type_procedure"),
        date_procedure: cols.remove("date_procedure").as_deref().and_then(parse_date),
        source: cols.remove("source"),
    }
}

/// Rows for announcements with a usable SIREN, restricted to `known` when
/// given, first occurrence of each (siren, date) kept.
pub fn normalize_announcements(
    records: &[Value],
    known: Option<&HashSet<String>>,
) -> Vec<AnnouncementRow> {
    records
        .iter()
        .filter_map(|rec| {
            let siren = extract_siren(rec)?;
            match known {
                Some(set) if !set.contains(&siren) => None,
                _ => Some(to_row(siren, rec)),
            }
        })
        .unique_by(|r| (r.siren.clone(), r.date_procedure))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn fixture() -> Vec<Value> {
        let raw = std::fs::read_to_string("tests/fixtures/bodacc_page.json").unwrap();
        let page: Value = serde_json::from_str(&raw).unwrap();
        page["results"].as_array().unwrap().clone()
    }

    #[test]
    fn siren_from_list_or_string() {
        assert_eq!(
            extract_siren(&json!({ "registre": ["123 456 789"] })).as_deref(),
            Some("123456789")
        );
        assert_eq!(
            extract_siren(&json!({ "registre": "123456789" })).as_deref(),
            Some("123456789")
        );
        assert_eq!(
            extract_siren(&json!({ "registre": "123\u{a0}456 789" })).as_deref(),
            Some("123456789")
        );
    }

    #[test]
    fn unusable_registre_is_dropped() {
        assert_eq!(extract_siren(&json!({ "registre": [] })), None);
        assert_eq!(extract_siren(&json!({ "registre": [42] })), None);
        assert_eq!(extract_siren(&json!({ "registre": "  " })), None);
        assert_eq!(extract_siren(&json!({ "registre": null })), None);
        assert_eq!(extract_siren(&json!({ "other": "x" })), None);
    }

    #[test]
    fn unfiltered_fixture() {
        let rows = normalize_announcements(&fixture(), None);
        // two notices share (417941265, 2021-03-04); one has an empty registre
        assert_eq!(rows.len(), 3);

        let first = &rows[0];
        assert_eq!(first.siren, "417941265");
        assert_eq!(first.type_procedure.as_deref(), Some("Procédures collectives"));
        assert_eq!(first.date_procedure, NaiveDate::from_ymd_opt(2021, 3, 4));
        assert!(first.source.as_deref().unwrap().ends_with("A202100451234"));
    }

    #[test]
    fn filtered_fixture_keeps_known_sirens_only() {
        let known: HashSet<String> = ["417941265", "532118904"]
            .into_iter()
            .map(String::from)
            .collect();
        let rows = normalize_announcements(&fixture(), Some(&known));
        let sirens: Vec<&str> = rows.iter().map(|r| r.siren.as_str()).collect();
        assert_eq!(sirens, vec!["417941265", "532118904"]);
    }

    #[test]
    fn same_siren_different_dates_are_kept() {
        let records = vec![
            json!({ "registre": "1", "dateparution": "2021-01-01" }),
            json!({ "registre": "1", "dateparution": "2021-01-02" }),
            json!({ "registre": "1", "dateparution": "garbage" }),
            json!({ "registre": "1" }),
        ];
        let rows = normalize_announcements(&records, None);
        // unparsable and absent dates collapse onto the same missing key
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].date_procedure, None);
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let once = normalize_announcements(&fixture(), None);
        let twice = normalize_announcements(&fixture(), None);
        assert_eq!(once, twice);
    }
}
