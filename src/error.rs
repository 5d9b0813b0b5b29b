//! Error types for the facereport service.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ServiceError`] is **fatal**: the service cannot start or serve at all
//!   (invalid configuration, provider not configured, storage root cannot be
//!   created). Returned from builders and startup helpers.
//!
//! * [`PipelineError`] is **per-request**: one upload failed at some pipeline
//!   stage. It never escapes the orchestrator; it is converted into the
//!   uniform `{success: false, message}` response via
//!   [`PipelineError::user_message`].
//!
//! [`AdvisoryError`] is the failure of a single remote text-generation call.
//! Any one of them fails the whole bundle, so it is always wrapped into
//! [`PipelineError::AdvisoryGeneration`] before reaching the orchestrator.

use crate::prompts::AdvisoryKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned while configuring or starting the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the storage directories.
    #[error("Failed to prepare storage directory '{path}': {source}")]
    StorageInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not bind the HTTP listener.
    #[error("Failed to bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A failure of one upload request, at one pipeline stage.
///
/// The `Display` text carries the technical detail for logs; the short
/// client-facing text comes from [`PipelineError::user_message`].
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Invoking ──────────────────────────────────────────────────────────
    /// The analyzer process could not be started.
    #[error("Failed to launch analyzer '{program}': {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The analyzer did not close its output within the configured bound.
    #[error("Analyzer timed out after {secs}s")]
    AnalyzerTimeout { secs: u64 },

    /// The analyzer wrote nothing (or only whitespace) to stdout.
    #[error("Analyzer produced no output (exit code {exit_code:?})")]
    EmptyAnalyzerOutput { exit_code: Option<i32> },

    // ── Parsing ───────────────────────────────────────────────────────────
    /// No `{...}` span was found in the analyzer output.
    #[error("No JSON object found in analyzer output ({len} bytes)")]
    MissingJsonSubstring { len: usize },

    /// A `{...}` span was found but it does not decode to a JSON object.
    #[error("Malformed JSON in analyzer output: {detail}")]
    MalformedJson { detail: String },

    // ── Generating ────────────────────────────────────────────────────────
    /// At least one of the six advisory calls failed.
    #[error("Advisory generation failed: {0}")]
    AdvisoryGeneration(#[from] AdvisoryError),

    // ── Composing ─────────────────────────────────────────────────────────
    /// The report could not be built or written.
    #[error("Failed to write report '{path}': {detail}")]
    DocumentWrite { path: PathBuf, detail: String },

    // ── Storage ───────────────────────────────────────────────────────────
    /// Saving the uploaded photo failed before the pipeline could start.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// The short, human-readable reason returned to the client.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ProcessLaunch { .. } => "Failed to start analyzer.",
            Self::AnalyzerTimeout { .. } => "Analyzer timed out.",
            Self::EmptyAnalyzerOutput { .. } => "No data received from analyzer.",
            Self::MissingJsonSubstring { .. } => "Invalid JSON format from analyzer output.",
            Self::MalformedJson { .. } => "Failed to parse JSON from analyzer output.",
            Self::AdvisoryGeneration(_) => "Error generating text.",
            Self::DocumentWrite { .. } => "Failed to generate PDF.",
            Self::Storage(_) => "Failed to store uploaded image.",
        }
    }
}

/// Failure of a single remote text-generation call.
#[derive(Debug, Clone, Error)]
pub enum AdvisoryError {
    /// Network fault or non-success response from the remote service.
    #[error("{kind} advisory: remote call failed: {detail}")]
    Remote { kind: AdvisoryKind, detail: String },

    /// The remote call did not complete within the configured bound.
    #[error("{kind} advisory: timed out after {secs}s")]
    Timeout { kind: AdvisoryKind, secs: u64 },

    /// The service answered but the completion carried no text.
    #[error("{kind} advisory: empty completion")]
    EmptyResponse { kind: AdvisoryKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_match_client_contract() {
        let e = PipelineError::EmptyAnalyzerOutput { exit_code: Some(0) };
        assert!(e.user_message().starts_with("No data received"));

        let e = PipelineError::MalformedJson {
            detail: "expected value".into(),
        };
        assert!(e.user_message().starts_with("Failed to parse JSON"));

        let e = PipelineError::MissingJsonSubstring { len: 12 };
        assert_eq!(e.user_message(), "Invalid JSON format from analyzer output.");
    }

    #[test]
    fn advisory_error_display_names_the_kind() {
        let e = AdvisoryError::Timeout {
            kind: AdvisoryKind::Beard,
            secs: 60,
        };
        let msg = e.to_string();
        assert!(msg.contains("beard"), "got: {msg}");
        assert!(msg.contains("60s"), "got: {msg}");
    }

    #[test]
    fn advisory_error_converts_into_pipeline_error() {
        let e: PipelineError = AdvisoryError::EmptyResponse {
            kind: AdvisoryKind::Skin,
        }
        .into();
        assert_eq!(e.user_message(), "Error generating text.");
        assert!(e.to_string().contains("skin"));
    }

    #[test]
    fn launch_error_keeps_program_name() {
        let e = PipelineError::ProcessLaunch {
            program: "python3".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(e.to_string().contains("python3"));
        assert_eq!(e.user_message(), "Failed to start analyzer.");
    }
}
