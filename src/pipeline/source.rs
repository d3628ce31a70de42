// src/pipeline/source.rs
//
// Where report batches come from. The engine only needs "give me the
// current population"; authentication and paging are the source's business.

use crate::error::TrackingError;
use crate::types::Report;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait ReportSource: Send + Sync {
    /// One full snapshot of the live population. Order and duplicates are
    /// not guaranteed.
    async fn fetch(&self) -> Result<Vec<Report>>;
}

// ============================================================================
// HTTP JSON FEED
// ============================================================================

/// Keys under which feeds commonly wrap their report array.
const WRAPPER_KEYS: [&str; 4] = ["reports", "vehicles", "vessels", "data"];

pub struct HttpReportSource {
    http_client: reqwest::Client,
    url: String,
}

impl HttpReportSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReportSource for HttpReportSource {
    async fn fetch(&self) -> Result<Vec<Report>> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackingError::FetchFailed(format!("{} returned {}", self.url, status)).into());
        }

        let body: Value = response
            .json()
            .await
            .context("Feed response is not JSON")?;
        Ok(decode_reports(body))
    }
}

/// Decode a feed payload: a bare array, or an object wrapping one. Entries
/// that do not parse as reports are skipped so one bad record cannot sink
/// the batch.
pub fn decode_reports(body: Value) -> Vec<Report> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => WRAPPER_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        other => {
            warn!("Unexpected feed payload type: {}", type_name(&other));
            Vec::new()
        }
    };

    let total = items.len();
    let reports: Vec<Report> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Report>(item) {
            Ok(report) => Some(report),
            Err(e) => {
                debug!("Skipping undecodable report: {}", e);
                None
            }
        })
        .collect();

    if reports.len() < total {
        warn!("Skipped {} of {} feed records", total - reports.len(), total);
    }
    reports
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// SCRIPTED SOURCE
// ============================================================================

/// Replays a fixed script of batches. Each `fetch` pops the next entry; an
/// exhausted script yields empty batches. `Err` entries simulate a failed poll.
#[derive(Default)]
pub struct StaticReportSource {
    script: Mutex<VecDeque<std::result::Result<Vec<Report>, String>>>,
    delay: Option<Duration>,
}

impl StaticReportSource {
    pub fn new(batches: Vec<Vec<Report>>) -> Self {
        Self {
            script: Mutex::new(batches.into_iter().map(Ok).collect()),
            delay: None,
        }
    }

    /// Every fetch sleeps this long first, e.g. to exercise fetch timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_batch(&self, batch: Vec<Report>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(batch));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(message.into()));
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ReportSource for StaticReportSource {
    async fn fetch(&self) -> Result<Vec<Report>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(TrackingError::FetchFailed(message).into()),
            None => Ok(Vec::new()),
        }
    }
}
