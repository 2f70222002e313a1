use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::{error::StoreError, protocol::VoteRow};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// How long a cached sheet read stays valid. Fresh reads bypass the cache
/// entirely; this only bounds staleness for cached-read mode.
const READ_CACHE_TTL: Duration = Duration::from_secs(30);

/// Append-only tabular vote sink. The underlying API has full-replace write
/// semantics, so "append" is read-concat-rewrite at the call site; this
/// trait only exposes the two primitives the sync buffer needs.
///
/// There is no partial-success signaling: a write that fails after partially
/// applying leaves the remote state indeterminate, and a retry may duplicate
/// rows. Callers accept that as a documented limitation.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Reads all rows of `sheet`. `fresh` forces a read that reflects every
    /// prior write, bypassing any cached view.
    async fn read(&self, sheet: &str, fresh: bool) -> Result<Vec<VoteRow>, StoreError>;

    /// Replaces the full contents of `sheet` with `rows`.
    async fn write(&self, sheet: &str, rows: &[VoteRow]) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SheetPayload {
    rows: Vec<VoteRow>,
}

struct CachedSheet {
    rows: Vec<VoteRow>,
    fetched_at: Instant,
}

/// HTTP client for a Sheets-style tabular values API:
/// `GET/PUT {base}/sheets/{sheet}/values` with a JSON `{"rows": [...]}` body.
pub struct SheetStoreClient {
    http: Client,
    base_url: Url,
    bearer_token: Option<String>,
    read_cache: Mutex<HashMap<String, CachedSheet>>,
}

impl SheetStoreClient {
    pub fn new(base_url: Url, bearer_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            bearer_token,
            read_cache: Mutex::new(HashMap::new()),
        }
    }

    fn values_url(&self, sheet: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Malformed("store base url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["sheets", sheet, "values"]);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn map_status(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(body),
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited(body),
        other => StoreError::Unavailable(format!("status {other}: {body}")),
    }
}

fn map_transport(error: reqwest::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

#[async_trait]
impl VoteStore for SheetStoreClient {
    async fn read(&self, sheet: &str, fresh: bool) -> Result<Vec<VoteRow>, StoreError> {
        if !fresh {
            let cache = self.read_cache.lock().await;
            if let Some(cached) = cache.get(sheet) {
                if cached.fetched_at.elapsed() < READ_CACHE_TTL {
                    debug!(sheet, rows = cached.rows.len(), "serving cached sheet read");
                    return Ok(cached.rows.clone());
                }
            }
        }

        let url = self.values_url(sheet)?;
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(map_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(sheet, %status, "sheet read failed");
            return Err(map_status(status, body));
        }
        let payload: SheetPayload = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let mut cache = self.read_cache.lock().await;
        cache.insert(
            sheet.to_string(),
            CachedSheet {
                rows: payload.rows.clone(),
                fetched_at: Instant::now(),
            },
        );
        debug!(sheet, rows = payload.rows.len(), fresh, "sheet read");
        Ok(payload.rows)
    }

    async fn write(&self, sheet: &str, rows: &[VoteRow]) -> Result<(), StoreError> {
        let url = self.values_url(sheet)?;
        let response = self
            .authorize(self.http.put(url))
            .json(&SheetPayload {
                rows: rows.to_vec(),
            })
            .send()
            .await
            .map_err(map_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(sheet, %status, rows = rows.len(), "sheet write failed");
            return Err(map_status(status, body));
        }

        // Keep cached reads consistent with what we just wrote.
        let mut cache = self.read_cache.lock().await;
        cache.insert(
            sheet.to_string(),
            CachedSheet {
                rows: rows.to_vec(),
                fetched_at: Instant::now(),
            },
        );
        debug!(sheet, rows = rows.len(), "sheet written");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
