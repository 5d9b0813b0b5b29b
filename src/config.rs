//! Configuration types for the report service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share the config across handlers and to log it at startup.
//!
//! # Design choice: builder over constructor
//! The binary sets most fields from flags, tests set two or three. The
//! builder lets each caller set only what it cares about and rely on
//! documented defaults for the rest.

use crate::error::ServiceError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for the upload → analyze → report service.
///
/// # Example
/// ```rust
/// use facereport::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .bind_addr("127.0.0.1:8080")
///     .storage_dir("/tmp/facereport")
///     .jwt_secret("change-me")
///     .build()
///     .unwrap();
/// assert_eq!(config.bind_addr, "127.0.0.1:8080");
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Listen address. Default: `0.0.0.0:5000`.
    pub bind_addr: String,

    /// Root directory for per-request upload and report slots. Default: `uploads`.
    pub storage_dir: PathBuf,

    /// External analyzer invocation. Default: `python3 ../python/script.py`.
    pub analyzer: AnalyzerCommand,

    /// Upper bound on one analyzer run in seconds; `0` disables it. Default: 300.
    ///
    /// Model loading in the analyzer dominates its runtime; five minutes is
    /// generous for CPU inference and still reclaims a hung child.
    pub analyzer_timeout_secs: u64,

    /// How the JSON object is located in analyzer output. Default: [`JsonExtraction::Balanced`].
    pub json_extraction: JsonExtraction,

    /// LLM model identifier, e.g. "gemini-1.5-flash", "gpt-4.1-nano".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for advisory completions. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens per advisory completion. Default: 1024.
    pub max_tokens: usize,

    /// Per-advisory-call timeout in seconds; `0` disables it. Default: 60.
    pub advisory_timeout_secs: u64,

    /// HS256 secret used to verify identity tokens.
    pub jwt_secret: String,

    /// Maximum accepted request body for uploads, in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Filename suggested to the client on download. Default: `Face_Detection_Result.pdf`.
    pub report_filename: String,

    /// Seconds an undownloaded report is kept; `0` keeps it until downloaded. Default: 1800.
    pub report_ttl_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            storage_dir: PathBuf::from("uploads"),
            analyzer: AnalyzerCommand::default(),
            analyzer_timeout_secs: 300,
            json_extraction: JsonExtraction::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.7,
            max_tokens: 1024,
            advisory_timeout_secs: 60,
            jwt_secret: String::new(),
            max_upload_bytes: 10 * 1024 * 1024,
            report_filename: "Face_Detection_Result.pdf".to_string(),
            report_ttl_secs: 1800,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_dir", &self.storage_dir)
            .field("analyzer", &self.analyzer)
            .field("analyzer_timeout_secs", &self.analyzer_timeout_secs)
            .field("json_extraction", &self.json_extraction)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("advisory_timeout_secs", &self.advisory_timeout_secs)
            .field("jwt_secret", &"<redacted>")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("report_filename", &self.report_filename)
            .field("report_ttl_secs", &self.report_ttl_secs)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn analyzer(mut self, command: AnalyzerCommand) -> Self {
        self.config.analyzer = command;
        self
    }

    pub fn analyzer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.analyzer_timeout_secs = secs;
        self
    }

    pub fn json_extraction(mut self, mode: JsonExtraction) -> Self {
        self.config.json_extraction = mode;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn advisory_timeout_secs(mut self, secs: u64) -> Self {
        self.config.advisory_timeout_secs = secs;
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = secret.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn report_filename(mut self, name: impl Into<String>) -> Self {
        self.config.report_filename = name.into();
        self
    }

    pub fn report_ttl_secs(mut self, secs: u64) -> Self {
        self.config.report_ttl_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ServiceError> {
        let c = &self.config;
        if c.jwt_secret.is_empty() {
            return Err(ServiceError::InvalidConfig(
                "A JWT secret is required to verify identity tokens".into(),
            ));
        }
        if c.analyzer.program.trim().is_empty() {
            return Err(ServiceError::InvalidConfig(
                "Analyzer program must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ServiceError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.report_filename.trim().is_empty()
            || c.report_filename.contains(['"', '/', '\\'])
            || c.report_filename.chars().any(char::is_control)
        {
            return Err(ServiceError::InvalidConfig(format!(
                "Report filename must not be empty or contain quotes, path separators or control characters, got {:?}",
                c.report_filename
            )));
        }
        Ok(self.config)
    }
}

// ── Analyzer command ─────────────────────────────────────────────────────

/// How to launch the external analyzer.
///
/// The process is started as `program args... <absolute-image-path>`; the
/// image path is always the last argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AnalyzerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Parse a shell-like `"program arg1 arg2"` line (whitespace separated, no quoting).
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }
}

impl Default for AnalyzerCommand {
    fn default() -> Self {
        Self::new("python3").arg("../python/script.py")
    }
}

impl fmt::Display for AnalyzerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Strategy for locating the JSON object inside the analyzer's stdout.
///
/// | Mode | Behaviour |
/// |------|-----------|
/// | `Balanced` | first balanced `{...}` span that decodes, honouring string literals and escapes (default) |
/// | `Greedy` | first `{` up to the *last* `}` in the output, across newlines |
///
/// `Greedy` reproduces the behaviour of the first deployment and fails on
/// outputs that print more than one brace-delimited chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonExtraction {
    #[default]
    Balanced,
    Greedy,
}
