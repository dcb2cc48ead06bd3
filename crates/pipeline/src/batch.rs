//! Bounded fan-out of single-file exports.
//!
//! [`export_all`] runs one task per business id on a [`JoinSet`], with a
//! [`Semaphore`] capping how many jobs are in flight. A failing unit is
//! recorded in the [`BatchReport`] and does not affect the others.

use std::path::PathBuf;
use std::sync::Arc;

use pbx_core::output::OutputDir;
use pbx_core::types::ExportUnit;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ExportError;
use crate::export::Exporter;

/// Default number of exports in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 25;

/// Final state of one business id.
#[derive(Debug)]
pub enum UnitOutcome {
    /// The report was written to this path.
    Exported(PathBuf),
    /// The service did not accept the export request; HTTP status.
    Rejected(u16),
    /// The run was cancelled before this unit finished.
    Cancelled,
    /// Any other error.
    Failed(String),
}

impl UnitOutcome {
    /// Classify the result of an export.
    pub fn from_result(result: Result<PathBuf, ExportError>) -> Self {
        match result {
            Ok(path) => Self::Exported(path),
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(e) => match e.rejected_status() {
                Some(status) => Self::Rejected(status),
                None => Self::Failed(e.to_string()),
            },
        }
    }

    pub fn is_exported(&self) -> bool {
        matches!(self, Self::Exported(_))
    }
}

/// Outcome of every unit in a run, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, UnitOutcome)>,
}

impl BatchReport {
    pub fn exported(&self) -> usize {
        self.count(|o| o.is_exported())
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Rejected(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Cancelled))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed(_)))
    }

    /// Business ids that did not produce a file.
    pub fn unsuccessful_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_exported())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// True when every unit was exported.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_exported())
    }

    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    /// Emit the end-of-run summary.
    pub fn log_summary(&self) {
        tracing::info!(
            total = self.outcomes.len(),
            exported = self.exported(),
            rejected = self.rejected(),
            failed = self.failed(),
            cancelled = self.cancelled(),
            "All PDFs exported",
        );
        for (id, outcome) in &self.outcomes {
            match outcome {
                UnitOutcome::Exported(_) => {}
                UnitOutcome::Failed(reason) => {
                    tracing::error!(business_id = %id, reason = %reason, "Export failed");
                }
                UnitOutcome::Rejected(status) => {
                    tracing::warn!(business_id = %id, status, "Export request rejected");
                }
                UnitOutcome::Cancelled => {
                    tracing::warn!(business_id = %id, "Export cancelled");
                }
            }
        }
    }
}

/// Export every unit to its own file, at most `max_concurrency` at a time.
pub async fn export_all(
    exporter: Arc<Exporter>,
    units: Vec<ExportUnit>,
    output: OutputDir,
    max_concurrency: usize,
) -> BatchReport {
    let permits = max_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(permits));
    let output = Arc::new(output);
    let business_ids: Vec<String> = units.iter().map(|u| u.business_id.clone()).collect();
    let mut tasks = JoinSet::new();

    tracing::info!(
        units = units.len(),
        max_concurrency = permits,
        output = %output.path().display(),
        "Starting export batch",
    );

    for (index, unit) in units.into_iter().enumerate() {
        let exporter = Arc::clone(&exporter);
        let semaphore = Arc::clone(&semaphore);
        let output = Arc::clone(&output);

        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) if exporter.is_cancelled() => UnitOutcome::Cancelled,
                Ok(_permit) => {
                    UnitOutcome::from_result(exporter.export_to_file(&unit, &output).await)
                }
                Err(e) => UnitOutcome::Failed(e.to_string()),
            };
            (index, outcome)
        });
    }

    let mut finished: Vec<Option<UnitOutcome>> = business_ids.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => finished[index] = Some(outcome),
            Err(e) => tracing::error!(error = %e, "Export task panicked"),
        }
    }

    // A task that panicked left its slot empty.
    BatchReport {
        outcomes: business_ids
            .into_iter()
            .zip(finished)
            .map(|(id, outcome)| {
                let outcome = outcome
                    .unwrap_or_else(|| UnitOutcome::Failed("export task panicked".to_string()));
                (id, outcome)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbx_core::error::CoreError;
    use pbx_powerbi::poll::PollError;

    #[test]
    fn outcome_classification() {
        assert!(UnitOutcome::from_result(Ok(PathBuf::from("a.pdf"))).is_exported());
        assert!(matches!(
            UnitOutcome::from_result(Err(ExportError::Rejected {
                business_id: "a".into(),
                status: 400,
            })),
            UnitOutcome::Rejected(400)
        ));
        assert!(matches!(
            UnitOutcome::from_result(Err(ExportError::BatchRejected {
                business_id: "a".into(),
                index: 2,
                status: 403,
            })),
            UnitOutcome::Rejected(403)
        ));
        assert!(matches!(
            UnitOutcome::from_result(Err(ExportError::Poll(PollError::Cancelled {
                export_id: "J1".into()
            }))),
            UnitOutcome::Cancelled
        ));
        assert!(matches!(
            UnitOutcome::from_result(Err(ExportError::Output(CoreError::Validation(
                "bad".into()
            )))),
            UnitOutcome::Failed(_)
        ));
    }

    #[test]
    fn report_counts() {
        let report = BatchReport {
            outcomes: vec![
                ("a".into(), UnitOutcome::Exported("a.pdf".into())),
                ("b".into(), UnitOutcome::Rejected(400)),
                ("c".into(), UnitOutcome::Failed("boom".into())),
                ("d".into(), UnitOutcome::Exported("d.pdf".into())),
            ],
        };
        assert_eq!(report.exported(), 2);
        assert_eq!(report.rejected(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.unsuccessful_ids(), ["b", "c"]);
        assert!(!report.is_success());
        assert!(BatchReport::default().is_success());
    }
}
