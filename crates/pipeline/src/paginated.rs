//! Paginated export: several page batches of one business id, merged.
//!
//! Each batch is requested, polled and downloaded concurrently. The
//! results are gathered in batch-index order regardless of which batch
//! finishes first, and merged exactly once after all have succeeded.

use std::path::PathBuf;

use futures::future::try_join_all;
use pbx_core::naming::merged_file_name;
use pbx_core::output::OutputDir;
use pbx_core::types::{ExportUnit, PageBatch};

use crate::batch::{BatchReport, UnitOutcome};
use crate::error::ExportError;
use crate::export::Exporter;
use crate::merge::merge_pdfs;

/// Default suffix of merged report file names.
pub const DEFAULT_MERGED_SUFFIX: &str = "merged";

/// Export every batch of `unit` and write the merged document.
///
/// Writes `{business_id}_{locale}_{suffix}.pdf` into `output`. Nothing
/// is written if any batch is rejected or fails.
pub async fn export_merged(
    exporter: &Exporter,
    unit: &ExportUnit,
    batches: &[PageBatch],
    output: &OutputDir,
    suffix: &str,
) -> Result<PathBuf, ExportError> {
    if batches.is_empty() {
        return Err(ExportError::NoBatches);
    }
    let file_name = merged_file_name(&unit.business_id, &unit.locale, suffix)?;

    let mut ordered: Vec<&PageBatch> = batches.iter().collect();
    ordered.sort_by_key(|b| b.index);

    let jobs = ordered.into_iter().map(|batch| {
        let batch_unit = unit.with_batch(batch.clone());
        async move {
            let bytes = exporter.export_bytes(&batch_unit).await?;
            tracing::info!(
                business_id = %batch_unit.business_id,
                batch = batch.index,
                bytes = bytes.len(),
                "Batch downloaded",
            );
            Ok::<_, ExportError>(bytes)
        }
    });

    let buffers = try_join_all(jobs).await?;
    let merged = merge_pdfs(&buffers)?;

    let path = output.write(&file_name, &merged).await?;
    tracing::info!(
        business_id = %unit.business_id,
        batches = buffers.len(),
        path = %path.display(),
        "Merged report written",
    );
    Ok(path)
}

/// Run [`export_merged`] for each unit in turn.
pub async fn export_all_merged(
    exporter: &Exporter,
    units: Vec<ExportUnit>,
    batches: &[PageBatch],
    output: &OutputDir,
    suffix: &str,
) -> BatchReport {
    let mut report = BatchReport::default();

    for unit in units {
        let outcome = if exporter.is_cancelled() {
            UnitOutcome::Cancelled
        } else {
            UnitOutcome::from_result(export_merged(exporter, &unit, batches, output, suffix).await)
        };
        report.outcomes.push((unit.business_id, outcome));
    }

    report
}
