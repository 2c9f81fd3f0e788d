//! SQLite store: schema, append-only sink, known-SIREN filter, stats.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ToSql};
use tracing::{error, info, warn};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sirene (
            siret         TEXT UNIQUE,
            siren         TEXT,
            denomination  TEXT,
            naf_code      TEXT,
            date_creation TEXT,
            effectif      TEXT,
            adresse       TEXT,
            code_postal   TEXT,
            ville         TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sirene_siren ON sirene(siren);

        CREATE TABLE IF NOT EXISTS bodacc_procedures (
            siren          TEXT NOT NULL,
            type_procedure TEXT,
            date_procedure TEXT,
            source         TEXT,
            UNIQUE(siren, date_procedure)
        );
        CREATE INDEX IF NOT EXISTS idx_bodacc_siren ON bodacc_procedures(siren);
        ",
    )?;
    Ok(())
}

// ── Rows ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishmentRow {
    pub siret: Option<String>,
    pub siren: Option<String>,
    pub denomination: Option<String>,
    pub naf_code: Option<String>,
    pub date_creation: Option<NaiveDate>,
    pub effectif: Option<String>,
    pub adresse: Option<String>,
    pub code_postal: Option<String>,
    pub ville: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementRow {
    pub siren: String,
    pub type_procedure: Option<String>,
    pub date_procedure: Option<NaiveDate>,
    pub source: Option<String>,
}

/// A row type bound to one table, with values in `COLUMNS` order.
pub trait TableRow {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<&dyn ToSql>;
}

impl TableRow for EstablishmentRow {
    const TABLE: &'static str = "sirene";
    const COLUMNS: &'static [&'static str] = &[
        "siret",
        "siren",
        "denomination",
        "naf_code",
        "date_creation",
        "effectif",
        "adresse",
        "code_postal",
        "ville",
    ];

    fn values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.siret as &dyn ToSql,
            &self.siren as &dyn ToSql,
            &self.denomination as &dyn ToSql,
            &self.naf_code as &dyn ToSql,
            &self.date_creation as &dyn ToSql,
            &self.effectif as &dyn ToSql,
            &self.adresse as &dyn ToSql,
            &self.code_postal as &dyn ToSql,
            &self.ville as &dyn ToSql,
        ]
    }
}

impl TableRow for AnnouncementRow {
    const TABLE: &'static str = "bodacc_procedures";
    const COLUMNS: &'static [&'static str] =
        &["siren", "type_procedure", "date_procedure", "source"];

    fn values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.siren as &dyn ToSql,
            &self.type_procedure as &dyn ToSql,
            &self.date_procedure as &dyn ToSql,
            &self.source as &dyn ToSql,
        ]
    }
}

// ── Sink ──

/// Insert every row in one transaction. Nothing is replaced: a constraint
/// violation fails the whole batch.
pub fn append<R: TableRow>(conn: &Connection, rows: &[R]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let placeholders: Vec<String> = (1..=R::COLUMNS.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders.join(", ")
    );

    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(&sql)?;
        for r in rows {
            count += stmt.execute(r.values().as_slice())?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub attempted: usize,
    pub written: usize,
    pub error: Option<String>,
}

/// [`append`] that logs instead of failing. `written` is 0 when the batch failed.
pub fn write_rows<R: TableRow>(conn: &Connection, rows: &[R]) -> WriteReport {
    match append(conn, rows) {
        Ok(written) => {
            info!("{} rows inserted into {}", written, R::TABLE);
            WriteReport {
                attempted: rows.len(),
                written,
                error: None,
            }
        }
        Err(e) => {
            error!("Insert into {} failed: {:#}", R::TABLE, e);
            WriteReport {
                attempted: rows.len(),
                written: 0,
                error: Some(e.to_string()),
            }
        }
    }
}

// ── Known SIRENs ──

/// Every SIREN already present in `sirene`, as exact-match strings.
/// A failed read is logged and yields an empty set.
pub fn known_sirens(conn: &Connection) -> HashSet<String> {
    match read_sirens(conn) {
        Ok(sirens) => {
            info!("{} known SIREN in sirene", sirens.len());
            sirens
        }
        Err(e) => {
            warn!("Could not read SIREN list: {:#}", e);
            HashSet::new()
        }
    }
}

fn read_sirens(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT siren FROM sirene")?;
    let rows = stmt.query_map([], |row| row.get::<_, SqlValue>(0))?;
    let mut sirens = HashSet::new();
    for value in rows {
        match value? {
            SqlValue::Text(s) => {
                sirens.insert(s);
            }
            SqlValue::Integer(i) => {
                sirens.insert(i.to_string());
            }
            SqlValue::Real(f) => {
                sirens.insert(f.to_string());
            }
            SqlValue::Null | SqlValue::Blob(_) => {}
        }
    }
    Ok(sirens)
}

// ── Stats ──

pub struct Stats {
    pub establishments: usize,
    pub companies: usize,
    pub procedures: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let establishments: usize =
        conn.query_row("SELECT COUNT(*) FROM sirene", [], |r| r.get(0))?;
    let companies: usize =
        conn.query_row("SELECT COUNT(DISTINCT siren) FROM sirene", [], |r| r.get(0))?;
    let procedures: usize =
        conn.query_row("SELECT COUNT(*) FROM bodacc_procedures", [], |r| r.get(0))?;
    Ok(Stats {
        establishments,
        companies,
        procedures,
    })
}
