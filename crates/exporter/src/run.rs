//! One export run: credentials, client, pipeline, summary.

use std::sync::Arc;

use pbx_core::credentials::{CredentialError, CredentialStore, Credentials, KEY_BEARER};
use pbx_core::error::CoreError;
use pbx_core::input::read_business_ids;
use pbx_core::output::OutputDir;
use pbx_core::types::ExportUnit;
use pbx_pipeline::batch::{export_all, BatchReport};
use pbx_pipeline::export::Exporter;
use pbx_pipeline::paginated::export_all_merged;
use pbx_powerbi::api::{ExportApi, PowerBiApi, PowerBiApiError, ReportTarget};
use pbx_powerbi::auth::AzureAdTokenClient;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, ExporterConfig, Mode};

/// Errors that stop a run before any unit is exported.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("input error: {0}")]
    Input(#[from] CoreError),

    #[error("client setup failed: {0}")]
    Client(#[from] PowerBiApiError),
}

/// Resolve the workspace and report ids from the credential store keys.
pub fn report_target(
    credentials: &Credentials,
    config: &ExporterConfig,
) -> Result<ReportTarget, CredentialError> {
    Ok(ReportTarget {
        group_id: credentials.require(&config.group_id_key)?.to_string(),
        report_id: credentials.require(&config.report_id_key)?.to_string(),
    })
}

/// Load credentials, refreshing the bearer token if needed, and run the
/// export in `mode`.
pub async fn run(
    config: &ExporterConfig,
    mode: Mode,
    cancel: CancellationToken,
) -> Result<BatchReport, RunError> {
    if mode == Mode::Paginated {
        config.require_page_batches()?;
    }

    let store = CredentialStore::open(&config.credentials_file);
    let token_client =
        AzureAdTokenClient::new(config.authority_url.clone(), config.scope.clone());
    let credentials = store.load(false, &token_client).await?;

    let bearer = credentials
        .bearer_token()
        .ok_or_else(|| CredentialError::MissingKey(KEY_BEARER.into()))?
        .to_string();
    let target = report_target(&credentials, config)?;
    tracing::info!(
        group_id = %target.group_id,
        report_id = %target.report_id,
        "Credentials loaded",
    );

    let api: Arc<dyn ExportApi> = Arc::new(PowerBiApi::new(
        config.api_url.clone(),
        target,
        bearer,
        config.request_timeout,
    )?);

    let units = read_business_ids(&config.business_ids_file, &config.locale).await?;
    tracing::info!(
        units = units.len(),
        path = %config.business_ids_file.display(),
        "Business ids read",
    );

    execute(api, units, config, mode, cancel).await
}

/// Run the pipeline for `units` against an already configured `api`.
pub async fn execute(
    api: Arc<dyn ExportApi>,
    units: Vec<ExportUnit>,
    config: &ExporterConfig,
    mode: Mode,
    cancel: CancellationToken,
) -> Result<BatchReport, RunError> {
    let exporter = Exporter::new(api)
        .with_filter(config.filter.clone())
        .with_poll_config(config.poll.clone())
        .with_cancellation(cancel);
    let output = OutputDir::new(&config.output_dir);

    let report = match mode {
        Mode::Single => {
            export_all(Arc::new(exporter), units, output, config.max_concurrency).await
        }
        Mode::Paginated => {
            let batches = config.require_page_batches()?;
            export_all_merged(&exporter, units, batches, &output, &config.merged_suffix).await
        }
    };

    report.log_summary();
    Ok(report)
}
