//! Single-unit export: request -> poll -> download.
//!
//! A unit moves through `Requested -> Polling -> Succeeded -> Downloaded`.
//! A submit that is not accepted produces no job and nothing is polled;
//! a failed, timed-out or cancelled job surfaces as an [`ExportError`].

use std::path::PathBuf;
use std::sync::Arc;

use pbx_core::naming::report_file_name;
use pbx_core::output::OutputDir;
use pbx_core::types::ExportUnit;
use pbx_powerbi::api::{ExportApi, SubmitOutcome};
use pbx_powerbi::messages::{ExportRequest, FilterTarget};
use pbx_powerbi::poll::{poll_until_ready, PollConfig};
use tokio_util::sync::CancellationToken;

use crate::error::ExportError;

/// An export job accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub export_id: String,
    pub unit: ExportUnit,
}

/// Answer to an export submit.
enum Submission {
    Accepted(ExportJob),
    Rejected { status: u16 },
}

/// Runs export units against an [`ExportApi`].
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Exporter {
    api: Arc<dyn ExportApi>,
    filter: FilterTarget,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl Exporter {
    pub fn new(api: Arc<dyn ExportApi>) -> Self {
        Self {
            api,
            filter: FilterTarget::default(),
            poll: PollConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_filter(mut self, filter: FilterTarget) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Submit an export for `unit`.
    ///
    /// Returns `None` when the service does not answer `202 Accepted`.
    /// Every call creates a new job; ids are never reused.
    pub async fn request_export(&self, unit: &ExportUnit) -> Result<Option<ExportJob>, ExportError> {
        match self.submit(unit).await? {
            Submission::Accepted(job) => Ok(Some(job)),
            Submission::Rejected { .. } => Ok(None),
        }
    }

    async fn submit(&self, unit: &ExportUnit) -> Result<Submission, ExportError> {
        let request = ExportRequest::for_unit(unit, &self.filter);

        match self.api.submit_export(&request).await? {
            SubmitOutcome::Accepted(job) => {
                tracing::info!(
                    business_id = %unit.business_id,
                    locale = %unit.locale,
                    batch = ?unit.batch_index(),
                    export_id = %job.id,
                    "Export requested",
                );
                Ok(Submission::Accepted(ExportJob {
                    export_id: job.id,
                    unit: unit.clone(),
                }))
            }
            SubmitOutcome::Rejected { status, body } => {
                tracing::warn!(
                    business_id = %unit.business_id,
                    batch = ?unit.batch_index(),
                    status,
                    body = %body,
                    "Export request not accepted",
                );
                Ok(Submission::Rejected { status })
            }
        }
    }

    /// Wait until `job` has succeeded on the service.
    pub async fn poll_until_ready(&self, job: &ExportJob) -> Result<(), ExportError> {
        poll_until_ready(self.api.as_ref(), &job.export_id, &self.poll, &self.cancel).await?;
        Ok(())
    }

    /// Fetch the finished file of `job`.
    pub async fn download(&self, job: &ExportJob) -> Result<Vec<u8>, ExportError> {
        let bytes = self.api.export_file(&job.export_id).await?;
        tracing::debug!(
            export_id = %job.export_id,
            bytes = bytes.len(),
            "Export downloaded",
        );
        Ok(bytes)
    }

    /// Request, poll and download `unit`, returning the PDF bytes.
    ///
    /// A submit the service does not accept is reported as
    /// [`ExportError::Rejected`], or [`ExportError::BatchRejected`] for a
    /// page batch, carrying the HTTP status.
    pub async fn export_bytes(&self, unit: &ExportUnit) -> Result<Vec<u8>, ExportError> {
        let job = match self.submit(unit).await? {
            Submission::Accepted(job) => job,
            Submission::Rejected { status } => {
                let business_id = unit.business_id.clone();
                return Err(match unit.batch_index() {
                    Some(index) => ExportError::BatchRejected {
                        business_id,
                        index,
                        status,
                    },
                    None => ExportError::Rejected {
                        business_id,
                        status,
                    },
                });
            }
        };
        self.poll_until_ready(&job).await?;
        self.download(&job).await
    }

    /// Export `unit` to `{business_id}_{locale}.pdf` inside `output`.
    ///
    /// The file name is validated before anything is submitted.
    pub async fn export_to_file(
        &self,
        unit: &ExportUnit,
        output: &OutputDir,
    ) -> Result<PathBuf, ExportError> {
        let file_name = report_file_name(&unit.business_id, &unit.locale)?;
        let bytes = self.export_bytes(unit).await?;

        let path = output.write(&file_name, &bytes).await?;
        tracing::info!(
            business_id = %unit.business_id,
            path = %path.display(),
            "Report written",
        );
        Ok(path)
    }
}
