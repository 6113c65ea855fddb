//! # Lojista API Client
//!
//! HTTP client for talking to retailer storefront APIs.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        One send() Call                                   │
//! │                                                                         │
//! │  build request ──► attempt 1 ──► transient error?                      │
//! │  (bearer auth,          │              │                                │
//! │   idempotency key)      │              ▼                                │
//! │                         │        retry allowed? (GET, or key present)  │
//! │                         │              │ yes                            │
//! │                         │              ▼                                │
//! │                         │        sleep base * 2^n, jittered 50-100%    │
//! │                         │        (429 sleeps its Retry-After instead)  │
//! │                         │              │                                │
//! │                         │         attempt 2 ... attempt max_attempts   │
//! │                         ▼                                               │
//! │                   status mapping:                                       │
//! │                   2xx → ApiResponse    401/403 → Auth                   │
//! │                   429 → RateLimited    4xx → RemoteApi (permanent)      │
//! │                   5xx → RemoteApi (retryable)                           │
//! │                                                                         │
//! │  Non-GET without an idempotency key is NEVER retried: a timed-out      │
//! │  create may have landed, and a blind retry would duplicate it.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{SyncError, SyncResult};
use fabrica_core::Lojista;

/// Header carrying the idempotency key for unsafe requests.
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

// =============================================================================
// Response Types
// =============================================================================

/// A successful response from a lojista API.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// One order as reported by a lojista.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    pub order_id: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
    pub quantity: i64,
    pub amount_cents: i64,
    pub order_date: DateTime<Utc>,
}

/// A page of orders plus the cursor to continue from.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersPage {
    #[serde(default)]
    pub orders: Vec<RemoteOrder>,
    /// Opaque continuation cursor; absent when the page is the last one.
    pub cursor: Option<String>,
}

/// Remote identity of an upserted product, plus any per-part rejects the
/// retailer reported (a variation or image it refused).
#[derive(Debug, Clone)]
pub struct RemoteProduct {
    pub id: String,
    pub warnings: Vec<String>,
}

/// Stock level for one remote product.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteStock {
    pub remote_product_id: String,
    pub stock: i64,
}

#[derive(Debug, Deserialize)]
struct StockPage {
    #[serde(default)]
    levels: Vec<RemoteStock>,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for lojista storefront APIs.
///
/// One instance serves all lojistas: per-request credentials come from the
/// `Lojista` passed to each call, so the underlying connection pool is
/// shared across the whole engine.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    /// Builds a client from API settings.
    pub fn new(config: &ApiConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(concat!("fabrica-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(ApiClient {
            http,
            config: config.clone(),
        })
    }

    /// Sends one request to a lojista, with retry for transient failures.
    ///
    /// Retries apply only to GET requests or requests carrying an
    /// idempotency key; other requests get exactly one attempt.
    pub async fn send(
        &self,
        lojista: &Lojista,
        method: Method,
        path: &str,
        payload: Option<&serde_json::Value>,
        idempotency_key: Option<&str>,
    ) -> SyncResult<ApiResponse> {
        let retry_allowed = method == Method::GET || idempotency_key.is_some();
        let max_attempts = if retry_allowed {
            self.config.max_attempts
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            let result = self
                .execute_once(lojista, method.clone(), path, payload, idempotency_key)
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.backoff_delay(attempt, &err);
                    warn!(
                        lojista_id = %lojista.id,
                        path = %path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient request failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(
        &self,
        lojista: &Lojista,
        method: Method,
        path: &str,
        payload: Option<&serde_json::Value>,
        idempotency_key: Option<&str>,
    ) -> SyncResult<ApiResponse> {
        let url = format!(
            "{}/{}",
            lojista.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        debug!(lojista_id = %lojista.id, method = %method, url = %url, "Sending request");

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&lojista.api_key);

        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }
        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(self.config.timeout_secs)
            } else {
                SyncError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        match status {
            s if s.is_success() => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| SyncError::Network(e.to_string()))?;
                let body = if text.trim().is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::from_str(&text)?
                };
                Ok(ApiResponse {
                    status: s.as_u16(),
                    body,
                })
            }

            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth {
                lojista_id: lojista.id.clone(),
                message: format!("{} {}", status.as_u16(), body_excerpt(response).await),
            }),

            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(self.config.retry_base_delay_ms / 1000);
                Err(SyncError::RateLimited(retry_after))
            }

            s => Err(SyncError::RemoteApi {
                status: s.as_u16(),
                message: body_excerpt(response).await,
            }),
        }
    }

    /// Exponential backoff with 50-100% jitter; rate limits honor the
    /// server's Retry-After instead.
    fn backoff_delay(&self, attempt: u32, err: &SyncError) -> Duration {
        if let SyncError::RateLimited(secs) = err {
            return Duration::from_secs(*secs);
        }
        let base = self.config.retry_base_delay_ms.saturating_mul(1 << attempt);
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_millis((base as f64 * jitter) as u64)
    }

    // =========================================================================
    // High-Level Operations
    // =========================================================================

    /// Probes connectivity and credentials against the lojista's health
    /// endpoint.
    pub async fn probe(&self, lojista: &Lojista) -> SyncResult<()> {
        self.send(lojista, Method::GET, "api/health", None, None)
            .await?;
        Ok(())
    }

    /// Creates or updates a product on the lojista.
    ///
    /// First import (no remote id yet) POSTs with an idempotency key so a
    /// timed-out create can be retried without duplicating the product.
    /// Subsequent imports PUT against the known remote id.
    ///
    /// Returns the remote product id and any per-part warnings the
    /// retailer reported (rejected variations or images).
    pub async fn upsert_product(
        &self,
        lojista: &Lojista,
        product_id: &str,
        remote_product_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> SyncResult<RemoteProduct> {
        let response = match remote_product_id {
            Some(remote_id) => {
                let path = format!("api/products/{remote_id}");
                self.send(lojista, Method::PUT, &path, Some(payload), None)
                    .await?
            }
            None => {
                let key = format!("{}:{}", lojista.id, product_id);
                self.send(
                    lojista,
                    Method::POST,
                    "api/products",
                    Some(payload),
                    Some(&key),
                )
                .await?
            }
        };

        let warnings = response
            .body
            .get("warnings")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|w| w.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let id = match response.body.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            // An update may answer without echoing the id; keep the known one
            None => remote_product_id.map(str::to_string).ok_or_else(|| {
                SyncError::RemoteApi {
                    status: response.status,
                    message: "create response missing product id".to_string(),
                }
            })?,
        };

        Ok(RemoteProduct { id, warnings })
    }

    /// Fetches one page of orders, optionally from a continuation cursor.
    pub async fn fetch_orders(
        &self,
        lojista: &Lojista,
        cursor: Option<&str>,
    ) -> SyncResult<OrdersPage> {
        let path = match cursor {
            Some(c) => format!("api/orders?cursor={c}"),
            None => "api/orders".to_string(),
        };
        let response = self.send(lojista, Method::GET, &path, None, None).await?;
        let page: OrdersPage = serde_json::from_value(response.body)?;
        Ok(page)
    }

    /// Fetches current stock levels for the products we distributed.
    pub async fn fetch_stock_levels(&self, lojista: &Lojista) -> SyncResult<Vec<RemoteStock>> {
        let response = self
            .send(lojista, Method::GET, "api/stock_levels", None, None)
            .await?;
        let page: StockPage = serde_json::from_value(response.body)?;
        Ok(page.levels)
    }
}

async fn body_excerpt(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) if !text.is_empty() => text.chars().take(200).collect(),
        _ => "<empty body>".to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
