//! Shared fixtures for pipeline integration tests.
//!
//! [`MockExportApi`] stands in for the Power BI service: it hands out
//! sequential job ids (`J1`, `J2`, ...), reports `Running` for a
//! configurable number of polls before `Succeeded`, and records every
//! call so tests can assert on them.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object};
use pbx_pipeline::export::Exporter;
use pbx_powerbi::api::{ExportApi, ExportStatus, PowerBiApiError, SubmitOutcome};
use pbx_powerbi::messages::{ExportJobResponse, ExportRequest, ExportState};
use pbx_powerbi::poll::PollConfig;

/// Key used for whole-report jobs, which carry no page list.
pub const WHOLE_REPORT: &str = "";

#[derive(Default)]
struct MockState {
    next_job: u32,
    rejected: HashMap<String, u16>,
    panicking: HashSet<String>,
    failing: HashSet<String>,
    running_polls: u32,
    documents: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    jobs: HashMap<String, MockJob>,
    submits: Vec<ExportRequest>,
    status_calls: Vec<String>,
    downloads_finished: Vec<String>,
}

struct MockJob {
    business_id: String,
    first_page: String,
    polls: u32,
}

#[derive(Default)]
pub struct MockExportApi {
    state: Mutex<MockState>,
}

impl MockExportApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer submits for `business_id` with `status` instead of 202.
    pub fn reject(&self, business_id: &str, status: u16) {
        self.lock().rejected.insert(business_id.to_string(), status);
    }

    /// Submits for `business_id` panic, as a bug inside the client would.
    pub fn panic_on_submit(&self, business_id: &str) {
        self.lock().panicking.insert(business_id.to_string());
    }

    /// Jobs for `business_id` end in `Failed`.
    pub fn fail(&self, business_id: &str) {
        self.lock().failing.insert(business_id.to_string());
    }

    /// Report `Running` this many times before the terminal state.
    pub fn running_polls(&self, n: u32) {
        self.lock().running_polls = n;
    }

    /// File served for jobs whose first page is `first_page`.
    pub fn document(&self, first_page: &str, bytes: Vec<u8>) {
        self.lock().documents.insert(first_page.to_string(), bytes);
    }

    /// Delay the download of jobs whose first page is `first_page`.
    pub fn download_delay(&self, first_page: &str, delay: Duration) {
        self.lock().delays.insert(first_page.to_string(), delay);
    }

    pub fn submits(&self) -> Vec<ExportRequest> {
        self.lock().submits.clone()
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.lock().status_calls.clone()
    }

    /// First page of each job, in the order downloads completed.
    pub fn downloads_finished(&self) -> Vec<String> {
        self.lock().downloads_finished.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

fn business_id_of(request: &ExportRequest) -> String {
    let filter = &request.report_configuration.report_level_filters[0].filter;
    filter
        .split_once(" eq '")
        .map(|(_, rest)| rest.trim_end_matches('\'').to_string())
        .unwrap_or_default()
}

#[async_trait]
impl ExportApi for MockExportApi {
    async fn submit_export(
        &self,
        request: &ExportRequest,
    ) -> Result<SubmitOutcome, PowerBiApiError> {
        let business_id = business_id_of(request);
        // Checked before taking the lock for the rest of the call, so the
        // panic does not poison it for other tasks.
        let panics = self.lock().panicking.contains(&business_id);
        if panics {
            panic!("submit for {business_id} blew up");
        }

        let mut state = self.lock();
        state.submits.push(request.clone());
        if let Some(status) = state.rejected.get(&business_id) {
            return Ok(SubmitOutcome::Rejected {
                status: *status,
                body: r#"{"error":{"code":"InvalidRequest"}}"#.to_string(),
            });
        }

        state.next_job += 1;
        let id = format!("J{}", state.next_job);
        let first_page = request
            .page_names()
            .first()
            .map(|p| p.to_string())
            .unwrap_or_else(|| WHOLE_REPORT.to_string());
        state.jobs.insert(
            id.clone(),
            MockJob {
                business_id,
                first_page,
                polls: 0,
            },
        );

        let body = serde_json::json!({ "id": id, "status": "NotStarted", "percentComplete": 0 });
        Ok(SubmitOutcome::Accepted(
            serde_json::from_value::<ExportJobResponse>(body).unwrap(),
        ))
    }

    async fn export_status(&self, export_id: &str) -> Result<ExportStatus, PowerBiApiError> {
        let mut state = self.lock();
        state.status_calls.push(export_id.to_string());
        let running_polls = state.running_polls;
        let failing = state.failing.clone();

        let job = state.jobs.get_mut(export_id).ok_or(PowerBiApiError::ApiError {
            status: 404,
            body: "unknown export".into(),
        })?;
        job.polls += 1;

        let state_now = if job.polls <= running_polls {
            ExportState::Running
        } else if failing.contains(&job.business_id) {
            ExportState::Failed
        } else {
            ExportState::Succeeded
        };

        Ok(ExportStatus {
            export_id: export_id.to_string(),
            state: state_now,
            percent_complete: None,
            retry_after: None,
        })
    }

    async fn export_file(&self, export_id: &str) -> Result<Vec<u8>, PowerBiApiError> {
        let (first_page, business_id, delay, document) = {
            let state = self.lock();
            let job = state.jobs.get(export_id).ok_or(PowerBiApiError::ApiError {
                status: 404,
                body: "unknown export".into(),
            })?;
            (
                job.first_page.clone(),
                job.business_id.clone(),
                state.delays.get(&job.first_page).copied(),
                state.documents.get(&job.first_page).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.lock().downloads_finished.push(first_page);
        Ok(document.unwrap_or_else(|| format!("%PDF-1.5 {business_id}").into_bytes()))
    }
}

/// Poll settings that keep tests fast.
pub fn fast_poll() -> PollConfig {
    PollConfig {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(2),
        multiplier: 2.0,
        timeout: Duration::from_secs(10),
    }
}

pub fn exporter(api: &Arc<MockExportApi>) -> Exporter {
    let api: Arc<dyn ExportApi> = api.clone();
    Exporter::new(api).with_poll_config(fast_poll())
}

/// A minimal PDF whose pages carry a `/Marker` integer.
pub fn marked_pdf(markers: &[i64]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = markers
        .iter()
        .map(|marker| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Marker" => *marker,
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => markers.len() as i64,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// `/Marker` values of every page, in page order.
pub fn page_markers(pdf: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| {
            doc.get_object(id)
                .and_then(Object::as_dict)
                .and_then(|page| page.get(b"Marker"))
                .and_then(Object::as_i64)
                .unwrap()
        })
        .collect()
}
