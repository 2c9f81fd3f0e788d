//! Paginated fetching against the registry APIs.
//!
//! A [`Paginator`] walks one endpoint page by page and yields the raw JSON
//! records of each page. It never retries: the first transport failure,
//! non-success status or undecodable body ends the walk, and whatever pages
//! were already yielded stay with the caller.

pub mod http;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub use http::HttpClient;

/// Offset-paginated endpoints are not walked past this offset.
pub const OFFSET_CEILING: usize = 9900;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct HttpPage {
    pub status: u16,
    pub body: String,
}

impl HttpPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait PageClient {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpPage, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    Offset { limit: usize, start: usize },
    Cursor {
        page_size: usize,
        start: Option<String>,
    },
}

impl Pagination {
    fn page_size(&self) -> usize {
        match self {
            Pagination::Offset { limit, .. } => *limit,
            Pagination::Cursor { page_size, .. } => *page_size,
        }
    }
}

/// One endpoint walk: base filters, where the records live in each page, and
/// how to move to the next page.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub records_key: String,
    pub pagination: Pagination,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// No next cursor, or the same cursor handed back.
    Exhausted,
    EmptyPage,
    ShortPage,
    Ceiling,
    Status(u16),
    Network(String),
    Decode(String),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StopReason::Status(_) | StopReason::Network(_) | StopReason::Decode(_)
        )
    }
}

#[derive(Debug)]
pub struct Page {
    pub number: usize,
    pub records: Vec<Value>,
}

enum Position {
    Offset(usize),
    Cursor(Option<String>),
}

pub struct Paginator<'a, C: PageClient + ?Sized> {
    client: &'a C,
    query: &'a PageQuery,
    position: Position,
    pages: usize,
    records: usize,
    stop: Option<StopReason>,
}

impl<'a, C: PageClient + ?Sized> Paginator<'a, C> {
    pub fn new(client: &'a C, query: &'a PageQuery) -> Self {
        let position = match &query.pagination {
            Pagination::Offset { start, .. } => Position::Offset(*start),
            Pagination::Cursor { start, .. } => Position::Cursor(start.clone()),
        };
        Paginator {
            client,
            query,
            position,
            pages: 0,
            records: 0,
            stop: None,
        }
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    fn request_params(&self) -> Vec<(String, String)> {
        let mut params = self.query.params.clone();
        let size = self.query.pagination.page_size().to_string();
        match &self.position {
            Position::Offset(offset) => {
                params.push(("limit".to_string(), size));
                params.push(("offset".to_string(), offset.to_string()));
            }
            Position::Cursor(cursor) => {
                params.push(("nombre".to_string(), size));
                if let Some(c) = cursor {
                    params.push(("curseur".to_string(), c.clone()));
                }
            }
        }
        params
    }

    fn finish(&mut self, reason: StopReason) {
        if reason.is_failure() {
            warn!(
                "Pagination aborted on {} after {} pages: {:?}",
                self.query.url, self.pages, reason
            );
        } else {
            info!(
                "Pagination finished on {}: {} pages, {} records ({:?})",
                self.query.url, self.pages, self.records, reason
            );
        }
        self.stop = Some(reason);
    }

    fn advance(&mut self, received: usize, body: &Value) -> Option<StopReason> {
        let page_size = self.query.pagination.page_size();
        match &mut self.position {
            Position::Offset(offset) => {
                *offset += received;
                if received < page_size {
                    Some(StopReason::ShortPage)
                } else if *offset > OFFSET_CEILING {
                    Some(StopReason::Ceiling)
                } else {
                    None
                }
            }
            Position::Cursor(cursor) => {
                if received < page_size {
                    return Some(StopReason::ShortPage);
                }
                match next_cursor(body) {
                    None => Some(StopReason::Exhausted),
                    Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                        Some(StopReason::Exhausted)
                    }
                    Some(next) => {
                        *cursor = Some(next);
                        None
                    }
                }
            }
        }
    }
}

impl<C: PageClient + ?Sized> Iterator for Paginator<'_, C> {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        if self.stop.is_some() {
            return None;
        }
        if self.pages > 0 && !self.query.delay.is_zero() {
            std::thread::sleep(self.query.delay);
        }

        let params = self.request_params();
        let reply = match self.client.get(&self.query.url, &params) {
            Ok(reply) => reply,
            Err(e) => {
                self.finish(StopReason::Network(e.to_string()));
                return None;
            }
        };
        if !reply.is_success() {
            warn!("API error {}: {}", reply.status, truncate(&reply.body, 300));
            self.finish(StopReason::Status(reply.status));
            return None;
        }

        let mut body: Value = match serde_json::from_str(&reply.body) {
            Ok(v) => v,
            Err(e) => {
                self.finish(StopReason::Decode(e.to_string()));
                return None;
            }
        };
        let records = match body.get_mut(self.query.records_key.as_str()).map(Value::take) {
            Some(Value::Array(records)) => records,
            _ => Vec::new(),
        };
        if records.is_empty() {
            self.finish(StopReason::EmptyPage);
            return None;
        }

        self.pages += 1;
        self.records += records.len();
        info!(
            "Page {} fetched ({} records, total = {})",
            self.pages,
            records.len(),
            self.records
        );

        if let Some(reason) = self.advance(records.len(), &body) {
            self.finish(reason);
        }
        Some(Page {
            number: self.pages,
            records,
        })
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<Value>,
    pub pages: usize,
    pub stop: StopReason,
}

pub fn fetch_all<C: PageClient + ?Sized>(client: &C, query: &PageQuery) -> FetchOutcome {
    let mut pager = Paginator::new(client, query);
    let mut records = Vec::new();
    for page in pager.by_ref() {
        records.extend(page.records);
    }
    FetchOutcome {
        records,
        pages: pager.pages(),
        stop: pager.stop.take().unwrap_or(StopReason::Exhausted),
    }
}

fn next_cursor(body: &Value) -> Option<String> {
    body.pointer("/header/curseurSuivant")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
