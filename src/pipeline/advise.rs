//! Advisory generation: six concurrent prompts, joined all-or-nothing.
//!
//! Each advisory is an independent remote call keyed by [`AdvisoryKind`].
//! The calls run concurrently and are joined with `try_join!`: the first
//! failure cancels the remaining in-flight calls and fails the whole bundle.
//! No partial bundle ever reaches the composer, and no field can end up
//! holding another field's text because results are bound by kind, not by
//! arrival order.
//!
//! All prompt wording lives in [`crate::prompts`]; this module only drives
//! the calls and their timeouts.

use crate::error::{AdvisoryError, PipelineError};
use crate::pipeline::parse::AnalysisResult;
use crate::pipeline::postprocess::clean_advisory;
use crate::prompts::{build_prompt, AdvisoryKind};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The six advisory texts for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvisoryBundle {
    pub hairstyle: String,
    pub beard: String,
    pub spectacles: String,
    pub acne: String,
    pub skin: String,
    pub wrinkles: String,
}

impl AdvisoryBundle {
    pub fn get(&self, kind: AdvisoryKind) -> &str {
        match kind {
            AdvisoryKind::Hairstyle => &self.hairstyle,
            AdvisoryKind::Beard => &self.beard,
            AdvisoryKind::Spectacles => &self.spectacles,
            AdvisoryKind::Acne => &self.acne,
            AdvisoryKind::Skin => &self.skin,
            AdvisoryKind::Wrinkles => &self.wrinkles,
        }
    }
}

/// Prompt in, prose out.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    /// Generate the advisory text for `kind` from `prompt`.
    async fn generate(&self, kind: AdvisoryKind, prompt: &str) -> Result<String, AdvisoryError>;
}

/// [`AdvisoryService`] backed by an edgequake-llm provider.
pub struct LlmAdvisoryService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmAdvisoryService {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl AdvisoryService for LlmAdvisoryService {
    async fn generate(&self, kind: AdvisoryKind, prompt: &str) -> Result<String, AdvisoryError> {
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| AdvisoryError::Remote {
                kind,
                detail: e.to_string(),
            })?;
        debug!(
            "{} advisory: {} input tokens, {} output tokens",
            kind, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Issue all six advisory calls concurrently and assemble the bundle.
///
/// `timeout == None` leaves the calls unbounded.
pub async fn generate_bundle(
    service: &dyn AdvisoryService,
    analysis: &AnalysisResult,
    timeout: Option<Duration>,
) -> Result<AdvisoryBundle, PipelineError> {
    let start = Instant::now();
    let call = |kind: AdvisoryKind| generate_one(service, kind, analysis, timeout);

    let (hairstyle, beard, spectacles, acne, skin, wrinkles) = futures::try_join!(
        call(AdvisoryKind::Hairstyle),
        call(AdvisoryKind::Beard),
        call(AdvisoryKind::Spectacles),
        call(AdvisoryKind::Acne),
        call(AdvisoryKind::Skin),
        call(AdvisoryKind::Wrinkles),
    )?;

    info!("Advisory bundle complete in {}ms", start.elapsed().as_millis());
    Ok(AdvisoryBundle {
        hairstyle,
        beard,
        spectacles,
        acne,
        skin,
        wrinkles,
    })
}

async fn generate_one(
    service: &dyn AdvisoryService,
    kind: AdvisoryKind,
    analysis: &AnalysisResult,
    timeout: Option<Duration>,
) -> Result<String, AdvisoryError> {
    let prompt = build_prompt(kind, analysis);
    let text = match timeout {
        Some(limit) => tokio::time::timeout(limit, service.generate(kind, &prompt))
            .await
            .map_err(|_| AdvisoryError::Timeout {
                kind,
                secs: limit.as_secs(),
            })?,
        None => service.generate(kind, &prompt).await,
    }
    .inspect_err(|e| warn!("{}", e))?;

    let cleaned = clean_advisory(&text);
    if cleaned.is_empty() {
        warn!("{} advisory: completion was empty after cleanup", kind);
        return Err(AdvisoryError::EmptyResponse { kind });
    }
    Ok(cleaned)
}
