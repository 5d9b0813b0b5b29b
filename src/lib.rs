//! # facereport
//!
//! Upload a face photo, get back a one-page PDF of personalised grooming
//! and skin-care suggestions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /upload (photo + identity token)
//!  │
//!  ├─ 1. Store    per-request slot under <storage>/uploads/<id>.jpg
//!  ├─ 2. Analyze  external analyzer process prints JSON on stdout
//!  ├─ 3. Parse    locate and decode the JSON object (4 known fields)
//!  ├─ 4. Advise   six concurrent LLM prompts, all-or-nothing
//!  ├─ 5. Polish   strip Markdown artefacts from each completion
//!  ├─ 6. Compose  single A4 page via lopdf (spawn_blocking)
//!  └─ 7. Cleanup  delete the photo, answer {success, pdfUrl | message}
//!
//! GET /download  →  the report once, then it is gone
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use facereport::{serve, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = ServiceConfig::builder()
//!         .jwt_secret(std::env::var("FACEREPORT_JWT_SECRET")?)
//!         .build()?;
//!     serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `facereport` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod error;
pub mod observer;
pub mod orchestrate;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{CurrentUser, RequireUser, TokenVerifier, UserIdentity};
pub use config::{AnalyzerCommand, JsonExtraction, ServiceConfig, ServiceConfigBuilder};
pub use error::{AdvisoryError, PipelineError, ServiceError};
pub use observer::{NoopObserver, PipelineObserver, Stage};
pub use orchestrate::{resolve_provider, Pipeline};
pub use output::{PipelineOutcome, StageTimings, UploadResponse};
pub use pipeline::advise::{AdvisoryBundle, AdvisoryService, LlmAdvisoryService};
pub use pipeline::analyze::{Analyzer, ProcessAnalyzer, RawAnalysis};
pub use pipeline::parse::AnalysisResult;
pub use prompts::AdvisoryKind;
pub use server::{router, serve, AppState};
pub use storage::{ReportStore, UploadSlot};
