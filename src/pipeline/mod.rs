//! Ingestion runs: (known-SIREN filter) → fetch → normalize → write.
//!
//! Entry points never fail hard. Every degradation (upstream error, empty
//! filter, rejected insert) is logged and shows up in the returned
//! [`RunReport`], which also records the last stage the run reached.

pub mod bodacc;
pub mod sirene;

use rusqlite::Connection;
use tracing::info;

use crate::db::{self, TableRow, WriteReport};
use crate::fetch::StopReason;

pub use bodacc::{ingest_bodacc, BodaccQuery};
pub use sirene::{ingest_city, ingest_city_paged, ingest_postal_codes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    LoadFilter,
    FetchLoop,
    Normalize,
    Write,
    End,
}

#[derive(Debug)]
pub struct RunReport<R> {
    pub stage: Stage,
    pub pages: usize,
    pub fetched: usize,
    pub stop: Option<StopReason>,
    pub rows: Vec<R>,
    pub write: Option<WriteReport>,
}

impl<R> RunReport<R> {
    fn new() -> Self {
        RunReport {
            stage: Stage::Start,
            pages: 0,
            fetched: 0,
            stop: None,
            rows: Vec::new(),
            write: None,
        }
    }

    pub fn written(&self) -> usize {
        self.write.as_ref().map_or(0, |w| w.written)
    }

    pub fn is_success(&self) -> bool {
        let fetch_ok = !self.stop.as_ref().is_some_and(StopReason::is_failure);
        let write_ok = self.write.as_ref().map_or(true, |w| w.error.is_none());
        fetch_ok && write_ok
    }
}

/// Append the normalized rows when a store is given. Without one the run
/// ends after normalization.
fn write_stage<R: TableRow>(mut report: RunReport<R>, conn: Option<&Connection>) -> RunReport<R> {
    if report.rows.is_empty() {
        info!("No rows for {}, nothing to write", R::TABLE);
        report.stage = Stage::End;
        return report;
    }
    let Some(conn) = conn else {
        info!("{} rows for {} not persisted (no store)", report.rows.len(), R::TABLE);
        report.stage = Stage::End;
        return report;
    };

    report.stage = Stage::Write;
    let write = db::write_rows(conn, &report.rows);
    if write.error.is_none() {
        report.stage = Stage::End;
    }
    report.write = Some(write);
    report
}
