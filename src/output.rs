//! Result types returned by the pipeline and the HTTP surface.

use crate::error::PipelineError;
use crate::pipeline::compose::ComposeReport;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Download location advertised to the client after a successful upload.
pub const DOWNLOAD_PATH: &str = "/download";

/// The JSON body of every `/upload` response, success or failure.
///
/// ```json
/// {"success": true, "pdfUrl": "/download"}
/// {"success": false, "message": "No data received from analyzer."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(rename = "pdfUrl", default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            pdf_url: Some(DOWNLOAD_PATH.to_string()),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            pdf_url: None,
            message: Some(message.into()),
        }
    }
}

impl From<&PipelineError> for UploadResponse {
    fn from(e: &PipelineError) -> Self {
        Self::failure(e.user_message())
    }
}

/// Wall-clock time spent in each stage of one request.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageTimings {
    pub analyzer_ms: u64,
    pub advisory_ms: u64,
    pub compose_ms: u64,
}

/// Everything the orchestrator knows about one finished request.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    pub result: Result<ComposeReport, PipelineError>,
    pub timings: StageTimings,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The client-facing response for this outcome.
    pub fn response(&self) -> UploadResponse {
        match &self.result {
            Ok(_) => UploadResponse::ok(),
            Err(e) => e.into(),
        }
    }
}
