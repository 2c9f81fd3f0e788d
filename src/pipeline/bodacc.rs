use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

use super::{write_stage, RunReport, Stage};
use crate::config::Settings;
use crate::db::{self, AnnouncementRow};
use crate::fetch::{fetch_all, PageClient, PageQuery, Pagination};
use crate::normalize::normalize_announcements;

pub const PAGE_LIMIT: usize = 100;
pub const DEFAULT_DEPARTEMENT: &str = "Bouches-du-Rhône";

#[derive(Debug, Clone)]
pub struct BodaccQuery {
    pub since: NaiveDate,
    pub departement: String,
    /// Keep only announcements about SIRENs already in `sirene`.
    pub use_siren_filter: bool,
}

impl Default for BodaccQuery {
    fn default() -> Self {
        BodaccQuery {
            since: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            departement: DEFAULT_DEPARTEMENT.to_string(),
            use_siren_filter: true,
        }
    }
}

pub fn page_query(settings: &Settings, query: &BodaccQuery) -> PageQuery {
    PageQuery {
        url: settings.bodacc_api_url.clone(),
        params: vec![
            (
                "refine".to_string(),
                format!("departement_nom_officiel:\"{}\"", query.departement),
            ),
            (
                "where".to_string(),
                format!("dateparution>='{}'", query.since.format("%Y-%m-%d")),
            ),
        ],
        records_key: "results".to_string(),
        pagination: Pagination::Offset {
            limit: PAGE_LIMIT,
            start: 0,
        },
        delay: settings.page_delay,
    }
}

/// Two phases: load the known SIRENs (when filtering), then walk the
/// announcements and keep those that match.
pub fn ingest_bodacc<C: PageClient + ?Sized>(
    settings: &Settings,
    client: &C,
    conn: &Connection,
    query: &BodaccQuery,
) -> RunReport<AnnouncementRow> {
    let mut report = RunReport::new();

    let known = if query.use_siren_filter {
        report.stage = Stage::LoadFilter;
        let known = db::known_sirens(conn);
        if known.is_empty() {
            info!("No SIREN in sirene, nothing to ingest");
            return report;
        }
        Some(known)
    } else {
        None
    };

    report.stage = Stage::FetchLoop;
    info!(
        "Fetching BODACC announcements for {} since {}",
        query.departement, query.since
    );
    let outcome = fetch_all(client, &page_query(settings, query));
    report.pages = outcome.pages;
    report.fetched = outcome.records.len();
    report.stop = Some(outcome.stop);

    report.stage = Stage::Normalize;
    report.rows = normalize_announcements(&outcome.records, known.as_ref());
    info!(
        "{} announcements kept ({} fetched)",
        report.rows.len(),
        report.fetched
    );

    write_stage(report, Some(conn))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::EstablishmentRow;
    use crate::fetch::testing::ScriptedClient;
    use crate::fetch::StopReason;

    fn settings() -> Settings {
        Settings::new("http://sirene.test", "http://bodacc.test/records", ":memory:")
            .with_page_delay(Duration::ZERO)
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn seed(conn: &Connection, sirens: &[&str]) {
        let rows: Vec<EstablishmentRow> = sirens
            .iter()
            .enumerate()
            .map(|(i, s)| EstablishmentRow {
                siret: Some(format!("{}{:05}", s, i)),
                siren: Some(s.to_string()),
                denomination: None,
                naf_code: None,
                date_creation: None,
                effectif: None,
                adresse: None,
                code_postal: None,
                ville: None,
            })
            .collect();
        db::append(conn, &rows).unwrap();
    }

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/bodacc_page.json").unwrap()
    }

    #[test]
    fn query_parameters() {
        let q = BodaccQuery {
            since: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            ..Default::default()
        };
        let pq = page_query(&settings(), &q);
        assert_eq!(
            pq.params,
            vec![
                (
                    "refine".to_string(),
                    "departement_nom_officiel:\"Bouches-du-Rhône\"".to_string()
                ),
                ("where".to_string(), "dateparution>='2023-07-01'".to_string()),
            ]
        );
        assert_eq!(pq.pagination, Pagination::Offset { limit: 100, start: 0 });
    }

    #[test]
    fn empty_filter_skips_fetch() {
        let conn = memory_db();
        let client = ScriptedClient::new().ok(fixture());
        let report = ingest_bodacc(&settings(), &client, &conn, &BodaccQuery::default());

        assert_eq!(client.call_count(), 0);
        assert_eq!(report.stage, Stage::LoadFilter);
        assert!(report.rows.is_empty());
        assert_eq!(report.written(), 0);
    }

    #[test]
    fn unreadable_store_skips_fetch() {
        let conn = Connection::open_in_memory().unwrap();
        let client = ScriptedClient::new().ok(fixture());
        let report = ingest_bodacc(&settings(), &client, &conn, &BodaccQuery::default());
        assert_eq!(client.call_count(), 0);
        assert_eq!(report.stage, Stage::LoadFilter);
    }

    #[test]
    fn filtered_run_writes_known_sirens() {
        let conn = memory_db();
        seed(&conn, &["417941265", "532118904"]);
        let client = ScriptedClient::new().ok(fixture());
        let report = ingest_bodacc(&settings(), &client, &conn, &BodaccQuery::default());

        assert_eq!(client.param(0, "offset").as_deref(), Some("0"));
        assert_eq!(client.param(0, "limit").as_deref(), Some("100"));
        assert_eq!(report.stop, Some(StopReason::ShortPage));
        assert_eq!(report.fetched, 5);
        assert_eq!(report.written(), 2);
        assert_eq!(report.stage, Stage::End);

        let stored: Vec<(String, String)> = conn
            .prepare("SELECT siren, date_procedure FROM bodacc_procedures ORDER BY siren")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            stored,
            vec![
                ("417941265".to_string(), "2021-03-04".to_string()),
                ("532118904".to_string(), "2022-01-18".to_string()),
            ]
        );
    }

    #[test]
    fn unfiltered_run_ignores_store_contents() {
        let conn = memory_db();
        let client = ScriptedClient::new().ok(fixture());
        let query = BodaccQuery {
            use_siren_filter: false,
            ..Default::default()
        };
        let report = ingest_bodacc(&settings(), &client, &conn, &query);
        assert_eq!(report.written(), 3);
    }

    #[test]
    fn nothing_matching_writes_nothing() {
        let conn = memory_db();
        seed(&conn, &["111111111"]);
        let client = ScriptedClient::new().ok(fixture());
        let report = ingest_bodacc(&settings(), &client, &conn, &BodaccQuery::default());
        assert!(report.rows.is_empty());
        assert!(report.write.is_none());
        assert!(report.is_success());
    }

    #[test]
    fn network_failure_mid_walk_keeps_first_page() {
        let conn = memory_db();
        seed(&conn, &["417941265"]);
        let full_page = serde_json::json!({
            "results": (0..100)
                .map(|i| serde_json::json!({
                    "registre": ["417 941 265"],
                    "dateparution": format!("2021-01-{:02}", i % 28 + 1),
                    "familleavis_lib": "Dépôts des comptes"
                }))
                .collect::<Vec<_>>()
        })
        .to_string();
        let client = ScriptedClient::new().ok(full_page).fail("operation timed out");
        let report = ingest_bodacc(&settings(), &client, &conn, &BodaccQuery::default());

        assert_eq!(client.call_count(), 2);
        assert_eq!(client.param(1, "offset").as_deref(), Some("100"));
        assert!(matches!(report.stop, Some(StopReason::Network(_))));
        // 28 distinct dates for the one SIREN
        assert_eq!(report.written(), 28);
        assert!(!report.is_success());
    }
}
