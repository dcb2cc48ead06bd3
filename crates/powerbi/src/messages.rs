//! Typed bodies for the Power BI `exportTo` API.
//!
//! [`ExportRequest`] is the submit payload; [`ExportJobResponse`] is the
//! export object returned by both the submit and status endpoints.

use pbx_core::types::ExportUnit;
use serde::{Deserialize, Serialize};

/// Output format requested from the service.
pub const FORMAT_PDF: &str = "PDF";

/// Default table and column the business-id filter targets.
pub const DEFAULT_FILTER_TABLE: &str = "CompanyBasicInfo";
pub const DEFAULT_FILTER_COLUMN: &str = "business_id_k";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// The report field a business-id filter is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTarget {
    pub table: String,
    pub column: String,
}

impl FilterTarget {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// OData filter expression `table/column eq 'value'`.
    ///
    /// Single quotes inside `value` are doubled as OData requires.
    pub fn equals(&self, value: &str) -> String {
        format!(
            "{}/{} eq '{}'",
            self.table,
            self.column,
            value.replace('\'', "''")
        )
    }
}

impl Default for FilterTarget {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_TABLE, DEFAULT_FILTER_COLUMN)
    }
}

/// Body of `POST .../reports/{report}/exportTo`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest {
    pub format: String,
    #[serde(rename = "powerBIReportConfiguration")]
    pub report_configuration: ReportConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfiguration {
    pub report_level_filters: Vec<ReportLevelFilter>,
    pub settings: ExportSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<PageSelector>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLevelFilter {
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSettings {
    /// Affects number formatting now, report texts later.
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSelector {
    pub page_name: String,
}

impl ExportRequest {
    /// Build the PDF export request for one unit of work.
    ///
    /// The report is filtered server-side to the unit's business id; a
    /// paginated unit additionally restricts the export to its pages.
    pub fn for_unit(unit: &ExportUnit, filter: &FilterTarget) -> Self {
        let pages = unit.batch.as_ref().map(|batch| {
            batch
                .pages
                .iter()
                .map(|p| PageSelector {
                    page_name: p.clone(),
                })
                .collect()
        });

        Self {
            format: FORMAT_PDF.to_string(),
            report_configuration: ReportConfiguration {
                report_level_filters: vec![ReportLevelFilter {
                    filter: filter.equals(&unit.business_id),
                }],
                settings: ExportSettings {
                    locale: unit.locale.clone(),
                },
                pages,
            },
        }
    }

    /// Page names this request is limited to, if any.
    pub fn page_names(&self) -> Vec<&str> {
        self.report_configuration
            .pages
            .iter()
            .flatten()
            .map(|p| p.page_name.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Export object returned by the submit and status endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobResponse {
    /// Export id; valid on the service for 24 hours.
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub percent_complete: Option<i32>,
}

/// Lifecycle state of an export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Undefined,
    /// A status string this client does not know about.
    Unknown(String),
}

impl ExportState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "NotStarted" => Self::NotStarted,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Undefined" => Self::Undefined,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Undefined => "Undefined",
            Self::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
