//! HTTP transport implementation.
//!
//! This module maps the sync endpoint onto an abstract HTTP client. The
//! actual client (reqwest, ureq, a cookie-carrying session, ...) is supplied
//! by the caller and owns authentication and timeouts.

use crate::error::{SyncError, SyncResult};
use crate::transport::DeltaTransport;
use parking_lot::RwLock;
use qbsync_protocol::Delta;
use std::sync::atomic::{AtomicBool, Ordering};

/// Path of the sync endpoint, relative to the base URL.
pub const MAINDATA_PATH: &str = "/api/v2/sync/maindata";

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a `200 OK` response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request. `Err` means no response was received at all.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based delta transport.
///
/// Uses JSON response bodies as served by the Web API.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the Web API (e.g. `http://localhost:8080`).
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Cleared by [`HttpTransport::close`].
    open: AtomicBool,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            open: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the URL requested for cursor `rid`.
    pub fn maindata_url(&self, rid: u64) -> String {
        format!("{}{}?rid={}", self.base_url, MAINDATA_PATH, rid)
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Checks if the transport is open and the client healthy.
    pub fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Closes the transport; later fetches fail with `NotConnected`.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn fail(&self, error: SyncError) -> SyncError {
        *self.last_error.write() = Some(error.to_string());
        error
    }
}

impl<C: HttpClient> DeltaTransport for HttpTransport<C> {
    fn fetch_delta(&self, rid: u64) -> SyncResult<Delta> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let response = self
            .client
            .get(&self.maindata_url(rid))
            .map_err(|e| self.fail(SyncError::transport_retryable(e)))?;

        match response.status {
            200 => {}
            401 | 403 => {
                return Err(self.fail(SyncError::AuthenticationFailed(format!(
                    "status {}",
                    response.status
                ))))
            }
            500..=599 => {
                return Err(self.fail(SyncError::ServerError(format!(
                    "status {}",
                    response.status
                ))))
            }
            status => {
                return Err(self.fail(SyncError::transport_fatal(format!(
                    "unexpected status {status}"
                ))))
            }
        }

        let delta = Delta::decode(&response.body).map_err(|e| self.fail(e.into()))?;
        *self.last_error.write() = None;
        Ok(delta)
    }
}
