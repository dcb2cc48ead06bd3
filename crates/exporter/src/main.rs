//! `pbx-exporter` -- exports a Power BI report as PDF for every business id.
//!
//! Usage: `pbx-exporter [single|paginated]`
//!
//! `single` (the default) writes one `<id>_<locale>.pdf` per business id.
//! `paginated` exports the configured page batches concurrently and writes
//! one merged `<id>_<locale>_<suffix>.pdf`. See
//! [`ExporterConfig::from_env`] for the environment variables.
//!
//! Exits with status 1 when setup fails or any business id was not exported.

use pbx_exporter::config::{ExporterConfig, Mode};
use pbx_exporter::run::run;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pbx_exporter=info,pbx_pipeline=info,pbx_powerbi=info,pbx_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mode = Mode::from_arg(std::env::args().nth(1).as_deref()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid arguments");
        std::process::exit(1);
    });

    let config = ExporterConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        mode = ?mode,
        credentials = %config.credentials_file.display(),
        output = %config.output_dir.display(),
        locale = %config.locale,
        "Starting pbx-exporter",
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling pending exports");
                cancel.cancel();
            }
        });
    }

    match run(&config, mode, cancel).await {
        Ok(report) if report.is_success() => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = %e, "Export run failed");
            std::process::exit(1);
        }
    }
}
