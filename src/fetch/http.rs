use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::warn;

use super::{FetchError, HttpPage, PageClient};
use crate::config::Settings;

const SIRENE_KEY_HEADER: &str = "X-INSEE-Api-Key-Integration";
const BODACC_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// INSEE client: API key header, no request timeout.
    pub fn sirene(settings: &Settings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        match &settings.sirene_api_key {
            Some(key) => {
                let mut value = HeaderValue::from_str(key.expose_secret())?;
                value.set_sensitive(true);
                headers.insert(SIRENE_KEY_HEADER, value);
            }
            None => warn!("SIRENE_API_KEY is not set, requests will be sent without it"),
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(None::<Duration>)
            .build()?;
        Ok(HttpClient { client })
    }

    /// BODACC client: no auth, 10 s per request.
    pub fn bodacc() -> Result<Self, FetchError> {
        let client = Client::builder().timeout(BODACC_TIMEOUT).build()?;
        Ok(HttpClient { client })
    }
}

impl PageClient for HttpClient {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpPage, FetchError> {
        let response = self.client.get(url).query(params).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpPage { status, body })
    }
}
