use rusqlite::Connection;
use serde_json::Value;
use tracing::info;

use super::{write_stage, RunReport, Stage};
use crate::config::Settings;
use crate::db::EstablishmentRow;
use crate::fetch::{fetch_all, PageClient, PageQuery, Pagination, StopReason};
use crate::normalize::normalize_establishments;

pub const CITY_PAGE_SIZE: usize = 10_000;
pub const POSTAL_CODE_PAGE_SIZE: usize = 1_000;

/// INSEE only hands out `curseurSuivant` once a cursor has been sent.
const FIRST_CURSOR: &str = "*";

fn query(settings: &Settings, q: String, page_size: usize) -> PageQuery {
    PageQuery {
        url: settings.sirene_base_url.clone(),
        params: vec![("q".to_string(), q)],
        records_key: "etablissements".to_string(),
        pagination: Pagination::Cursor {
            page_size,
            start: Some(FIRST_CURSOR.to_string()),
        },
        delay: settings.page_delay,
    }
}

fn city_filter(ville: &str) -> String {
    format!("libelleCommuneEtablissement:{}", ville)
}

pub fn city_query(settings: &Settings, ville: &str) -> PageQuery {
    query(settings, city_filter(ville), CITY_PAGE_SIZE)
}

pub fn postal_code_query(settings: &Settings, code_postal: &str) -> PageQuery {
    query(
        settings,
        format!("codePostalEtablissement:{}", code_postal),
        POSTAL_CODE_PAGE_SIZE,
    )
}

/// All establishments of a city. With `conn` set to `None` nothing is written.
pub fn ingest_city<C: PageClient + ?Sized>(
    settings: &Settings,
    client: &C,
    conn: Option<&Connection>,
    ville: &str,
) -> RunReport<EstablishmentRow> {
    ingest_city_paged(settings, client, conn, ville, CITY_PAGE_SIZE)
}

/// [`ingest_city`] asking for `page_size` establishments per request.
pub fn ingest_city_paged<C: PageClient + ?Sized>(
    settings: &Settings,
    client: &C,
    conn: Option<&Connection>,
    ville: &str,
    page_size: usize,
) -> RunReport<EstablishmentRow> {
    info!("Fetching establishments for city {}", ville);
    let mut report = RunReport::new();
    report.stage = Stage::FetchLoop;

    let outcome = fetch_all(client, &query(settings, city_filter(ville), page_size));
    report.pages = outcome.pages;
    report.fetched = outcome.records.len();
    report.stop = Some(outcome.stop);

    normalize_and_write(report, &outcome.records, conn)
}

/// Establishments over several postal codes: one walk per code, one
/// normalize and write for the whole batch.
pub fn ingest_postal_codes<C: PageClient + ?Sized>(
    settings: &Settings,
    client: &C,
    conn: Option<&Connection>,
    codes: &[String],
) -> RunReport<EstablishmentRow> {
    let mut report = RunReport::new();
    report.stage = Stage::FetchLoop;

    let mut records = Vec::new();
    let mut failure: Option<StopReason> = None;
    let mut last = None;
    for cp in codes {
        info!("Fetching establishments for postal code {}", cp);
        let outcome = fetch_all(client, &postal_code_query(settings, cp));
        report.pages += outcome.pages;
        records.extend(outcome.records);
        info!("Postal code {} done, total = {}", cp, records.len());
        if outcome.stop.is_failure() && failure.is_none() {
            failure = Some(outcome.stop.clone());
        }
        last = Some(outcome.stop);
    }
    report.fetched = records.len();
    report.stop = failure.or(last);

    normalize_and_write(report, &records, conn)
}

fn normalize_and_write(
    mut report: RunReport<EstablishmentRow>,
    records: &[Value],
    conn: Option<&Connection>,
) -> RunReport<EstablishmentRow> {
    report.stage = Stage::Normalize;
    report.rows = normalize_establishments(records);
    info!(
        "{} establishments after dedup ({} fetched)",
        report.rows.len(),
        records.len()
    );
    write_stage(report, conn)
}
