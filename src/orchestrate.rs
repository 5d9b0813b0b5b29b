//! The per-upload state machine.
//!
//! [`Pipeline::process_upload`] drives one stored photo through every stage
//! and always ends the same way: the photo is deleted exactly once, and the
//! caller gets a [`PipelineOutcome`] it can turn into the uniform
//! `{success, ...}` response. Nothing in here returns `Err` to the HTTP layer.
//!
//! ```text
//! Received ─▶ Invoking ─▶ Parsing ─▶ Generating ─▶ Composing ─▶ Done
//!                 │           │           │             │
//!                 └───────────┴─────┬─────┴─────────────┘
//!                                   ▼
//!                                Failed      (cleanup runs on both paths)
//! ```

use crate::auth::UserIdentity;
use crate::config::{JsonExtraction, ServiceConfig};
use crate::error::{PipelineError, ServiceError};
use crate::observer::{NoopObserver, SharedObserver, Stage};
use crate::output::{PipelineOutcome, StageTimings};
use crate::pipeline::advise::{generate_bundle, AdvisoryService, LlmAdvisoryService};
use crate::pipeline::analyze::{Analyzer, ProcessAnalyzer};
use crate::pipeline::compose::{compose_report, ComposeReport};
use crate::pipeline::parse::parse_analysis;
use crate::storage::{ReportStore, UploadSlot};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Wires the stages together for every request.
pub struct Pipeline {
    analyzer: Arc<dyn Analyzer>,
    advisor: Arc<dyn AdvisoryService>,
    store: ReportStore,
    json_extraction: JsonExtraction,
    advisory_timeout: Option<Duration>,
    observer: SharedObserver,
}

impl Pipeline {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        advisor: Arc<dyn AdvisoryService>,
        store: ReportStore,
    ) -> Self {
        Self {
            analyzer,
            advisor,
            store,
            json_extraction: JsonExtraction::default(),
            advisory_timeout: None,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Production wiring: child-process analyzer and the configured LLM provider.
    pub fn from_config(config: &ServiceConfig, store: ReportStore) -> Result<Self, ServiceError> {
        let provider = resolve_provider(config)?;
        info!(
            "Advisory provider: {} / {}",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or("default")
        );
        let analyzer = ProcessAnalyzer::new(config.analyzer.clone(), config.analyzer_timeout_secs);
        let advisor = LlmAdvisoryService::new(provider, config.temperature, config.max_tokens);
        Ok(Self::new(Arc::new(analyzer), Arc::new(advisor), store)
            .with_json_extraction(config.json_extraction)
            .with_advisory_timeout(
                (config.advisory_timeout_secs > 0)
                    .then(|| Duration::from_secs(config.advisory_timeout_secs)),
            ))
    }

    pub fn with_json_extraction(mut self, mode: JsonExtraction) -> Self {
        self.json_extraction = mode;
        self
    }

    pub fn with_advisory_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.advisory_timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Run every stage for one stored upload, then delete the upload.
    pub async fn process_upload(&self, identity: &UserIdentity, slot: UploadSlot) -> PipelineOutcome {
        let id = slot.id;
        let span = info_span!("upload", request_id = %id);
        async move {
            let mut stage = Stage::Received;
            let mut timings = StageTimings::default();
            self.observer.on_stage(id, stage);
            info!("Processing upload for {:?}", identity.username);

            let result = self
                .run_stages(identity, &slot, &mut stage, &mut timings)
                .await;

            // Exactly one cleanup, whichever way the stages ended.
            let removed = self.store.remove_upload(&slot).await;
            self.observer.on_cleanup(id, removed);
            debug!("Upload cleanup: removed={}", removed);

            match &result {
                Ok(report) => {
                    self.observer.on_done(id, report.bytes);
                    info!(
                        "Report ready ({} bytes; analyzer {}ms, advisory {}ms, compose {}ms)",
                        report.bytes, timings.analyzer_ms, timings.advisory_ms, timings.compose_ms
                    );
                }
                Err(e) => {
                    self.store.discard_report(id).await;
                    self.observer.on_failed(id, stage, e.user_message());
                    error!("Upload failed while {}: {}", stage, e);
                }
            }

            PipelineOutcome {
                request_id: id,
                result,
                timings,
            }
        }
        .instrument(span)
        .await
    }

    fn enter(&self, id: Uuid, current: &mut Stage, next: Stage) {
        *current = next;
        self.observer.on_stage(id, next);
    }

    async fn run_stages(
        &self,
        identity: &UserIdentity,
        slot: &UploadSlot,
        stage: &mut Stage,
        timings: &mut StageTimings,
    ) -> Result<ComposeReport, PipelineError> {
        // ── Invoking ─────────────────────────────────────────────────────
        self.enter(slot.id, stage, Stage::Invoking);
        let start = Instant::now();
        let raw = self.analyzer.invoke(&slot.path).await?;
        timings.analyzer_ms = start.elapsed().as_millis() as u64;

        // ── Parsing ──────────────────────────────────────────────────────
        self.enter(slot.id, stage, Stage::Parsing);
        let analysis = parse_analysis(&raw.stdout, self.json_extraction)?;
        debug!("Analysis: {:?}", analysis);

        // ── Generating ───────────────────────────────────────────────────
        self.enter(slot.id, stage, Stage::Generating);
        let start = Instant::now();
        let bundle = generate_bundle(self.advisor.as_ref(), &analysis, self.advisory_timeout).await?;
        timings.advisory_ms = start.elapsed().as_millis() as u64;

        // ── Composing ────────────────────────────────────────────────────
        self.enter(slot.id, stage, Stage::Composing);
        let start = Instant::now();
        let out = self.store.report_path(slot.id);
        let report = compose_report(identity, &slot.path, &bundle, &out).await?;
        timings.compose_ms = start.elapsed().as_millis() as u64;

        *stage = Stage::Done;
        Ok(report)
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ServiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ServiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is. Tests inject
///    fakes this way.
/// 2. **Named provider + model** (`config.provider_name`), created through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both set and non-empty.
/// 4. **Gemini key present** (`GEMINI_API_KEY`), the provider the reports
///    were originally tuned on.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &ServiceConfig) -> Result<Arc<dyn LLMProvider>, ServiceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ServiceError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
