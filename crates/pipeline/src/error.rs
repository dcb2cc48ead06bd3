use pbx_core::error::CoreError;
use pbx_powerbi::api::PowerBiApiError;
use pbx_powerbi::poll::PollError;

use crate::merge::MergeError;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] PowerBiApiError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Output error: {0}")]
    Output(#[from] CoreError),

    #[error("PDF merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("Export of {business_id} was not accepted by the service (HTTP {status})")]
    Rejected { business_id: String, status: u16 },

    #[error("Batch {index} of {business_id} was not accepted by the service (HTTP {status})")]
    BatchRejected {
        business_id: String,
        index: usize,
        status: u16,
    },

    #[error("No page batches configured")]
    NoBatches,
}

impl ExportError {
    /// True when the error stems from the run being cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Poll(PollError::Cancelled { .. }))
    }

    /// HTTP status of a submit the service did not accept.
    pub fn rejected_status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::BatchRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
