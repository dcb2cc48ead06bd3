//! Units of export work.

/// Locale used when the input does not specify one. Only Finnish reports
/// are produced at the moment.
pub const DEFAULT_LOCALE: &str = "fi-FI";

/// An ordered subset of report pages exported as one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBatch {
    /// Position of this batch in the merged document (0-based).
    pub index: usize,
    /// Report page names (`ReportSection...`) in display order.
    pub pages: Vec<String>,
}

impl PageBatch {
    pub fn new(index: usize, pages: Vec<String>) -> Self {
        Self { index, pages }
    }
}

/// One export request: a business id rendered in a locale, optionally
/// restricted to a batch of pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportUnit {
    pub business_id: String,
    pub locale: String,
    pub batch: Option<PageBatch>,
}

impl ExportUnit {
    /// Whole-report unit.
    pub fn new(business_id: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            business_id: business_id.into(),
            locale: locale.into(),
            batch: None,
        }
    }

    /// Same business id and locale, restricted to `batch`.
    pub fn with_batch(&self, batch: PageBatch) -> Self {
        Self {
            business_id: self.business_id.clone(),
            locale: self.locale.clone(),
            batch: Some(batch),
        }
    }

    /// Batch index, if this unit is part of a paginated export.
    pub fn batch_index(&self) -> Option<usize> {
        self.batch.as_ref().map(|b| b.index)
    }
}
