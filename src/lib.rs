//! Ingestion of French company registries into SQLite.
//!
//! Establishments come from the INSEE SIRENE API (by city or postal code),
//! legal announcements from the BODACC open-data API, restricted to the
//! companies already stored.

pub mod config;
pub mod db;
pub mod fetch;
pub mod normalize;
pub mod pipeline;

pub use config::Settings;
pub use pipeline::{
    ingest_bodacc, ingest_city, ingest_city_paged, ingest_postal_codes, BodaccQuery, RunReport,
    Stage,
};
