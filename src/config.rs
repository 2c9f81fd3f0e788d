//! Runtime settings: endpoints, credentials and the database location.
//!
//! Values come from the process environment (and an optional `.env` file).
//! Nothing is validated at load time: a missing API key only shows up as an
//! upstream rejection on the first request.

use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_SIRENE_URL: &str = "https://api.insee.fr/entreprises/sirene/V3/siret";
pub const DEFAULT_BODACC_URL: &str = "https://bodacc-datadila.opendatasoft.com/api/explore/v2.1/catalog/datasets/annonces-commerciales/records";
pub const DEFAULT_DB_PATH: &str = "data/registre.sqlite";

/// Pause between two page requests of the same pagination loop.
pub const PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Deserialize)]
struct RawSettings {
    sirene_base_url: String,
    sirene_api_key: Option<String>,
    bodacc_api_url: String,
    db_path: String,
}

#[derive(Debug)]
pub struct Settings {
    pub sirene_base_url: String,
    pub sirene_api_key: Option<SecretString>,
    pub bodacc_api_url: String,
    pub db_path: PathBuf,
    pub page_delay: Duration,
}

impl Settings {
    /// Settings with explicit endpoints and no API key.
    pub fn new(
        sirene_base_url: impl Into<String>,
        bodacc_api_url: impl Into<String>,
        db_path: impl Into<PathBuf>,
    ) -> Self {
        Settings {
            sirene_base_url: sirene_base_url.into(),
            sirene_api_key: None,
            bodacc_api_url: bodacc_api_url.into(),
            db_path: db_path.into(),
            page_delay: PAGE_DELAY,
        }
    }

    /// Read `SIRENE_BASE_URL`, `SIRENE_API_KEY`, `BODACC_API_URL` and `DB_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let raw: RawSettings = Config::builder()
            .set_default("sirene_base_url", DEFAULT_SIRENE_URL)?
            .set_default("bodacc_api_url", DEFAULT_BODACC_URL)?
            .set_default("db_path", DEFAULT_DB_PATH)?
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        Ok(Settings {
            sirene_base_url: raw.sirene_base_url,
            sirene_api_key: raw
                .sirene_api_key
                .filter(|k| !k.is_empty())
                .map(|k| SecretString::new(k.into())),
            bodacc_api_url: raw.bodacc_api_url,
            db_path: PathBuf::from(raw.db_path),
            page_delay: PAGE_DELAY,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key: String = key.into();
        self.sirene_api_key = Some(SecretString::new(key.into()));
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new(DEFAULT_SIRENE_URL, DEFAULT_BODACC_URL, DEFAULT_DB_PATH)
    }
}
