use std::path::PathBuf;
use std::time::Duration;

use pbx_core::output::DEFAULT_OUTPUT_DIR;
use pbx_core::types::{PageBatch, DEFAULT_LOCALE};
use pbx_pipeline::batch::DEFAULT_MAX_CONCURRENCY;
use pbx_pipeline::paginated::DEFAULT_MERGED_SUFFIX;
use pbx_powerbi::api::{DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
use pbx_powerbi::auth::{DEFAULT_AUTHORITY_URL, POWERBI_SCOPE};
use pbx_powerbi::messages::{FilterTarget, DEFAULT_FILTER_COLUMN, DEFAULT_FILTER_TABLE};
use pbx_powerbi::poll::PollConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("unknown mode {0:?}, expected `single` or `paginated`")]
    UnknownMode(String),

    #[error("PAGE_BATCHES is required in paginated mode")]
    MissingPageBatches,
}

/// Which export variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One file per business id.
    #[default]
    Single,
    /// Page batches exported concurrently and merged into one file.
    Paginated,
}

impl Mode {
    /// Parse the first command-line argument. No argument means [`Mode::Single`].
    pub fn from_arg(arg: Option<&str>) -> Result<Self, ConfigError> {
        match arg.map(str::trim) {
            None | Some("") | Some("single") => Ok(Self::Single),
            Some("paginated") => Ok(Self::Paginated),
            Some(other) => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Exporter configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Credential store (`key,value` lines, or JSON for `.json` paths).
    pub credentials_file: PathBuf,
    /// One business id per line.
    pub business_ids_file: PathBuf,
    pub output_dir: PathBuf,
    pub locale: String,
    pub max_concurrency: usize,
    pub poll: PollConfig,
    pub request_timeout: Duration,
    pub api_url: String,
    pub authority_url: String,
    pub scope: String,
    /// Credential store key holding the workspace id.
    pub group_id_key: String,
    /// Credential store key holding the report id.
    pub report_id_key: String,
    pub filter: FilterTarget,
    /// Page batches for paginated mode, in merge order.
    pub page_batches: Option<Vec<PageBatch>>,
    pub merged_suffix: String,
}

impl ExporterConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                                  |
    /// |--------------------------|------------------------------------------|
    /// | `CREDENTIALS_FILE`       | `ids.txt`                                |
    /// | `BUSINESS_IDS_FILE`      | `business_ids.csv`                       |
    /// | `OUTPUT_DIR`             | `downloaded_reports`                     |
    /// | `REPORT_LOCALE`          | `fi-FI`                                  |
    /// | `MAX_CONCURRENT_EXPORTS` | `25`                                     |
    /// | `POLL_INITIAL_SECS`      | `5`                                      |
    /// | `POLL_MAX_SECS`          | `30`                                     |
    /// | `POLL_TIMEOUT_SECS`      | `1800`                                   |
    /// | `REQUEST_TIMEOUT_SECS`   | `60`                                     |
    /// | `POWERBI_API_URL`        | `https://api.powerbi.com/v1.0/myorg`     |
    /// | `AUTHORITY_URL`          | `https://login.microsoftonline.com`      |
    /// | `POWERBI_SCOPE`          | Power BI `.default` scope                |
    /// | `GROUP_ID_KEY`           | `group_id_dev`                           |
    /// | `REPORT_ID_KEY`          | `report_id_pdf_dev`                      |
    /// | `FILTER_TABLE`           | `CompanyBasicInfo`                       |
    /// | `FILTER_COLUMN`          | `business_id_k`                          |
    /// | `PAGE_BATCHES`           | unset (`;` between batches, `,` pages)   |
    /// | `MERGED_SUFFIX`          | `merged`                                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(name).map(|v| v.trim().to_string()) {
                None => Ok(default),
                Some(v) if v.is_empty() => Ok(default),
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                    name,
                    expected: "non-negative integer",
                    value: v,
                }),
            }
        };

        let defaults = PollConfig::default();
        let poll = PollConfig {
            initial_interval: Duration::from_secs(number(
                "POLL_INITIAL_SECS",
                defaults.initial_interval.as_secs(),
            )?),
            max_interval: Duration::from_secs(number(
                "POLL_MAX_SECS",
                defaults.max_interval.as_secs(),
            )?),
            timeout: Duration::from_secs(number("POLL_TIMEOUT_SECS", defaults.timeout.as_secs())?),
            ..defaults
        };
        validate_poll(&poll)?;

        let page_batches = match lookup("PAGE_BATCHES") {
            Some(raw) if !raw.trim().is_empty() => Some(parse_page_batches(&raw)?),
            _ => None,
        };

        Ok(Self {
            credentials_file: var("CREDENTIALS_FILE", "ids.txt").into(),
            business_ids_file: var("BUSINESS_IDS_FILE", "business_ids.csv").into(),
            output_dir: var("OUTPUT_DIR", DEFAULT_OUTPUT_DIR).into(),
            locale: var("REPORT_LOCALE", DEFAULT_LOCALE),
            max_concurrency: number("MAX_CONCURRENT_EXPORTS", DEFAULT_MAX_CONCURRENCY as u64)?
                as usize,
            poll,
            request_timeout: Duration::from_secs(number(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )?),
            api_url: var("POWERBI_API_URL", DEFAULT_API_URL),
            authority_url: var("AUTHORITY_URL", DEFAULT_AUTHORITY_URL),
            scope: var("POWERBI_SCOPE", POWERBI_SCOPE),
            group_id_key: var("GROUP_ID_KEY", "group_id_dev"),
            report_id_key: var("REPORT_ID_KEY", "report_id_pdf_dev"),
            filter: FilterTarget::new(
                var("FILTER_TABLE", DEFAULT_FILTER_TABLE),
                var("FILTER_COLUMN", DEFAULT_FILTER_COLUMN),
            ),
            page_batches,
            merged_suffix: var("MERGED_SUFFIX", DEFAULT_MERGED_SUFFIX),
        })
    }

    /// Page batches, or an error when none are configured.
    pub fn require_page_batches(&self) -> Result<&[PageBatch], ConfigError> {
        self.page_batches
            .as_deref()
            .ok_or(ConfigError::MissingPageBatches)
    }
}

/// Polling needs a non-zero start interval no larger than the cap, and a
/// non-zero deadline.
fn validate_poll(poll: &PollConfig) -> Result<(), ConfigError> {
    let invalid = |name: &'static str, expected: &'static str, value: Duration| {
        ConfigError::Invalid {
            name,
            expected,
            value: value.as_secs().to_string(),
        }
    };
    if poll.initial_interval.is_zero() {
        return Err(invalid(
            "POLL_INITIAL_SECS",
            "positive number of seconds",
            poll.initial_interval,
        ));
    }
    if poll.max_interval < poll.initial_interval {
        return Err(invalid(
            "POLL_MAX_SECS",
            "number of seconds not below POLL_INITIAL_SECS",
            poll.max_interval,
        ));
    }
    if poll.timeout.is_zero() {
        return Err(invalid(
            "POLL_TIMEOUT_SECS",
            "positive number of seconds",
            poll.timeout,
        ));
    }
    Ok(())
}

/// Parse `PAGE_BATCHES`: batches separated by `;`, page names by `,`.
///
/// Batch indices follow declaration order. Empty batches are an error.
pub fn parse_page_batches(raw: &str) -> Result<Vec<PageBatch>, ConfigError> {
    raw.trim()
        .trim_end_matches(';')
        .split(';')
        .enumerate()
        .map(|(index, batch)| {
            let pages: Vec<String> = batch
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            if pages.is_empty() {
                return Err(ConfigError::Invalid {
                    name: "PAGE_BATCHES",
                    expected: "list of non-empty page batches",
                    value: raw.to_string(),
                });
            }
            Ok(PageBatch::new(index, pages))
        })
        .collect()
}
