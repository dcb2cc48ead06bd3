//! Exponential-backoff polling of export jobs.
//!
//! [`poll_until_ready`] queries the job status until it reaches a
//! terminal state, the deadline in [`PollConfig::timeout`] passes, or
//! the [`CancellationToken`] is triggered. A `Failed` job is reported as
//! an error instead of being polled forever.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ExportApi, ExportStatus, PowerBiApiError};
use crate::messages::ExportState;

/// Lower bound on the wait between two status requests.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tunable parameters for the polling strategy.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after the first non-terminal status.
    pub initial_interval: Duration,
    /// Upper bound on the delay between polls.
    pub max_interval: Duration,
    /// Factor by which the delay grows after each poll.
    pub multiplier: f64,
    /// Give up once the job has been polled for this long.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`PollConfig::max_interval`].
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_interval)
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Export {export_id} failed on the service")]
    Failed { export_id: String },

    #[error("Export {export_id} not ready after {elapsed:?} (last status: {last_state})")]
    TimedOut {
        export_id: String,
        elapsed: Duration,
        last_state: ExportState,
    },

    #[error("Polling of export {export_id} cancelled")]
    Cancelled { export_id: String },

    #[error(transparent)]
    Api(#[from] PowerBiApiError),
}

/// Poll `export_id` until it succeeds.
///
/// Returns the final `Succeeded` status. A server `Retry-After` hint
/// replaces the computed backoff for that round.
pub async fn poll_until_ready(
    api: &dyn ExportApi,
    export_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<ExportStatus, PollError> {
    let start = Instant::now();
    let mut delay = config.initial_interval;
    let mut attempt = 0u32;

    tracing::info!(export_id, "Generation started");

    loop {
        attempt += 1;

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled { export_id: export_id.to_string() });
            }
            result = api.export_status(export_id) => result?,
        };

        match status.state {
            ExportState::Succeeded => {
                tracing::info!(
                    export_id,
                    attempt,
                    "Report generation took: {:.2} seconds",
                    start.elapsed().as_secs_f64(),
                );
                return Ok(status);
            }
            ExportState::Failed => {
                tracing::error!(export_id, attempt, "Export job failed");
                return Err(PollError::Failed {
                    export_id: export_id.to_string(),
                });
            }
            ref pending => {
                tracing::debug!(
                    export_id,
                    attempt,
                    state = %pending,
                    percent_complete = ?status.percent_complete,
                    "Export not ready",
                );
            }
        }

        let elapsed = start.elapsed();
        let remaining = config.timeout.saturating_sub(elapsed);
        if remaining.is_zero() {
            return Err(PollError::TimedOut {
                export_id: export_id.to_string(),
                elapsed,
                last_state: status.state,
            });
        }

        let hinted = status.retry_after.filter(|d| !d.is_zero());
        let wait = hinted
            .unwrap_or(delay)
            .max(MIN_POLL_INTERVAL)
            .min(remaining);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled { export_id: export_id.to_string() });
            }
            _ = tokio::time::sleep(wait) => {}
        }

        delay = next_delay(delay, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use crate::api::SubmitOutcome;
    use crate::messages::ExportRequest;

    /// Replays a fixed sequence of states, repeating the last one.
    struct ScriptedStatus {
        states: Mutex<Vec<ExportState>>,
        calls: Mutex<u32>,
        retry_after: Option<Duration>,
    }

    impl ScriptedStatus {
        fn new(mut states: Vec<ExportState>) -> Self {
            states.reverse();
            Self {
                states: Mutex::new(states),
                calls: Mutex::new(0),
                retry_after: None,
            }
        }

        /// Send this `Retry-After` hint with every status.
        fn with_retry_after(mut self, hint: Duration) -> Self {
            self.retry_after = Some(hint);
            self
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ExportApi for ScriptedStatus {
        async fn submit_export(
            &self,
            _request: &ExportRequest,
        ) -> Result<SubmitOutcome, PowerBiApiError> {
            unreachable!("not used by polling")
        }

        async fn export_status(&self, export_id: &str) -> Result<ExportStatus, PowerBiApiError> {
            *self.calls.lock().unwrap() += 1;
            let mut states = self.states.lock().unwrap();
            let state = if states.len() > 1 {
                states.pop().unwrap()
            } else {
                states[0].clone()
            };
            Ok(ExportStatus {
                export_id: export_id.to_string(),
                state,
                percent_complete: None,
                retry_after: self.retry_after,
            })
        }

        async fn export_file(&self, _export_id: &str) -> Result<Vec<u8>, PowerBiApiError> {
            unreachable!("not used by polling")
        }
    }

    fn fast() -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            multiplier: 2.0,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn default_starts_at_five_seconds() {
        let config = PollConfig::default();
        assert_eq!(config.initial_interval, Duration::from_secs(5));
    }

    #[test]
    fn next_delay_doubles() {
        let config = PollConfig::default();
        let d = next_delay(Duration::from_secs(5), &config);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = PollConfig::default();
        let d = next_delay(Duration::from_secs(20), &config);
        assert_eq!(d, Duration::from_secs(30));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = PollConfig::default();
        let mut delay = config.initial_interval;
        let expected = [5, 10, 20, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }

    #[tokio::test]
    async fn returns_on_success() {
        let api = ScriptedStatus::new(vec![
            ExportState::NotStarted,
            ExportState::Running,
            ExportState::Succeeded,
        ]);
        let status = poll_until_ready(&api, "J1", &fast(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status.state, ExportState::Succeeded);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn failed_state_is_an_error() {
        let api = ScriptedStatus::new(vec![ExportState::Running, ExportState::Failed]);
        let result = poll_until_ready(&api, "J1", &fast(), &CancellationToken::new()).await;

        assert_matches!(result, Err(PollError::Failed { export_id }) if export_id == "J1");
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_state_keeps_polling() {
        let api = ScriptedStatus::new(vec![
            ExportState::Unknown("Queued".into()),
            ExportState::Undefined,
            ExportState::Succeeded,
        ]);
        let result = poll_until_ready(&api, "J1", &fast(), &CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn deadline_stops_polling() {
        let api = ScriptedStatus::new(vec![ExportState::Running]);
        let config = PollConfig {
            timeout: Duration::from_millis(20),
            ..fast()
        };

        let result = poll_until_ready(&api, "J1", &config, &CancellationToken::new()).await;

        assert_matches!(
            result,
            Err(PollError::TimedOut { last_state: ExportState::Running, .. })
        );
    }

    #[tokio::test]
    async fn cancellation_stops_polling() {
        let api = ScriptedStatus::new(vec![ExportState::Running]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = poll_until_ready(&api, "J1", &PollConfig::default(), &cancel).await;

        assert_matches!(result, Err(PollError::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_replaces_backoff() {
        let api = ScriptedStatus::new(vec![ExportState::Running, ExportState::Succeeded])
            .with_retry_after(Duration::from_secs(7));
        let start = Instant::now();

        poll_until_ready(&api, "J1", &PollConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(7), "waited {waited:?}");
        assert!(waited < Duration::from_millis(7100), "waited {waited:?}");
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_caps_retry_after() {
        let api = ScriptedStatus::new(vec![ExportState::Running])
            .with_retry_after(Duration::from_secs(60));
        let config = PollConfig {
            timeout: Duration::from_secs(10),
            ..PollConfig::default()
        };
        let start = Instant::now();

        let result = poll_until_ready(&api, "J1", &config, &CancellationToken::new()).await;

        assert_matches!(result, Err(PollError::TimedOut { .. }));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(10), "waited {waited:?}");
        assert!(waited < Duration::from_secs(11), "waited {waited:?}");
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retry_after_falls_back_to_backoff() {
        let api = ScriptedStatus::new(vec![ExportState::Running, ExportState::Succeeded])
            .with_retry_after(Duration::ZERO);
        let start = Instant::now();

        poll_until_ready(&api, "J1", &PollConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_floored() {
        let api = ScriptedStatus::new(vec![ExportState::Running]);
        let config = PollConfig {
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            multiplier: 2.0,
            timeout: Duration::from_secs(1),
        };

        let result = poll_until_ready(&api, "J1", &config, &CancellationToken::new()).await;

        assert_matches!(result, Err(PollError::TimedOut { .. }));
        let per_second = (Duration::from_secs(1).as_millis() / MIN_POLL_INTERVAL.as_millis()) as u32;
        assert!(api.calls() <= per_second + 1, "{} status calls", api.calls());
    }
}
