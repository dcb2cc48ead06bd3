//! REST API client for the Power BI export endpoints.
//!
//! Wraps the three calls of an asynchronous export (submit, status,
//! file) using [`reqwest`]. The [`ExportApi`] trait is the seam the
//! export pipeline is written against, so it can be driven by an
//! in-memory implementation in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::messages::{ExportJobResponse, ExportRequest, ExportState};

/// Default Power BI REST base URL.
pub const DEFAULT_API_URL: &str = "https://api.powerbi.com/v1.0/myorg";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the Power BI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum PowerBiApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Power BI returned a non-2xx status code.
    #[error("Power BI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of submitting an export request.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// `202 Accepted`: the service created an export job.
    Accepted(ExportJobResponse),
    /// Any other status. No job exists and nothing should be polled.
    Rejected { status: u16, body: String },
}

/// One observation of an export job's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportStatus {
    pub export_id: String,
    pub state: ExportState,
    pub percent_complete: Option<i32>,
    /// Server hint for the next poll, from the `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl ExportStatus {
    fn from_response(response: ExportJobResponse, retry_after: Option<Duration>) -> Self {
        let state = response
            .status
            .as_deref()
            .map(ExportState::parse)
            .unwrap_or(ExportState::Undefined);
        Self {
            export_id: response.id,
            state,
            percent_complete: response.percent_complete,
            retry_after,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The three calls of an asynchronous report export.
#[async_trait]
pub trait ExportApi: Send + Sync {
    /// Submit an export job.
    async fn submit_export(&self, request: &ExportRequest)
        -> Result<SubmitOutcome, PowerBiApiError>;

    /// Fetch the current status of an export job.
    async fn export_status(&self, export_id: &str) -> Result<ExportStatus, PowerBiApiError>;

    /// Download the finished export file.
    async fn export_file(&self, export_id: &str) -> Result<Vec<u8>, PowerBiApiError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Workspace (group) and report that exports are requested from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub group_id: String,
    pub report_id: String,
}

/// HTTP client for the export endpoints of one report.
pub struct PowerBiApi {
    client: reqwest::Client,
    api_url: String,
    target: ReportTarget,
    bearer: String,
}

impl PowerBiApi {
    /// Create a new API client with its own connection pool.
    ///
    /// * `api_url` - REST base, e.g. [`DEFAULT_API_URL`].
    /// * `bearer`  - access token sent on every request.
    pub fn new(
        api_url: String,
        target: ReportTarget,
        bearer: String,
        timeout: Duration,
    ) -> Result<Self, PowerBiApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url, target, bearer))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: String,
        target: ReportTarget,
        bearer: String,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            target,
            bearer,
        }
    }

    fn report_url(&self) -> String {
        format!(
            "{}/groups/{}/reports/{}",
            self.api_url, self.target.group_id, self.target.report_id
        )
    }

    fn export_to_url(&self) -> String {
        format!("{}/exportTo", self.report_url())
    }

    fn export_url(&self, export_id: &str) -> String {
        format!("{}/exports/{}", self.report_url(), export_id)
    }

    fn file_url(&self, export_id: &str) -> String {
        format!("{}/file", self.export_url(export_id))
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`PowerBiApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PowerBiApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PowerBiApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ExportApi for PowerBiApi {
    /// `POST .../exportTo`. Only `202 Accepted` yields a job.
    async fn submit_export(
        &self,
        request: &ExportRequest,
    ) -> Result<SubmitOutcome, PowerBiApiError> {
        let response = self
            .client
            .post(self.export_to_url())
            .bearer_auth(&self.bearer)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            let job = response.json::<ExportJobResponse>().await?;
            return Ok(SubmitOutcome::Accepted(job));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Ok(SubmitOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    /// `GET .../exports/{id}`.
    async fn export_status(&self, export_id: &str) -> Result<ExportStatus, PowerBiApiError> {
        let response = self
            .client
            .get(self.export_url(export_id))
            .bearer_auth(&self.bearer)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let retry_after = parse_retry_after(response.headers());
        let job = response.json::<ExportJobResponse>().await?;
        Ok(ExportStatus::from_response(job, retry_after))
    }

    /// `GET .../exports/{id}/file`.
    async fn export_file(&self, export_id: &str) -> Result<Vec<u8>, PowerBiApiError> {
        let response = self
            .client
            .get(self.file_url(export_id))
            .bearer_auth(&self.bearer)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
