//! CLI binary for facereport.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig` and starts the HTTP server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facereport::{serve, AnalyzerCommand, JsonExtraction, ServiceConfig, TokenVerifier, UserIdentity};
use std::io;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Secret used by `--dev` when none is configured. Never for production.
const DEV_SECRET: &str = "facereport-dev-secret";

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port with Gemini
  GEMINI_API_KEY=... FACEREPORT_JWT_SECRET=s3cret facereport

  # Custom analyzer and storage location
  facereport --analyzer "python3 -u /opt/face/script.py" --storage-dir /var/lib/facereport

  # Local development: fixed secret, verbose logs, and a token to test with
  facereport --dev token --username ada --gender Male
  facereport --dev -v

ENVIRONMENT VARIABLES:
  FACEREPORT_JWT_SECRET   HS256 secret for identity tokens (required without --dev)
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Face analysis upload service that returns a one-page PDF report.
#[derive(Parser, Debug)]
#[command(
    name = "facereport",
    version,
    about = "Upload a face photo, get a personalised PDF report",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Listen address.
    #[arg(long, env = "FACEREPORT_BIND", default_value = "0.0.0.0:5000", global = true)]
    bind: String,

    /// Directory for uploaded photos and generated reports.
    #[arg(long, env = "FACEREPORT_STORAGE_DIR", default_value = "uploads", global = true)]
    storage_dir: PathBuf,

    /// Analyzer command line; the image path is appended as the last argument.
    #[arg(
        long,
        env = "FACEREPORT_ANALYZER",
        default_value = "python3 ../python/script.py",
        global = true
    )]
    analyzer: String,

    /// Analyzer timeout in seconds (0 disables).
    #[arg(long, env = "FACEREPORT_ANALYZER_TIMEOUT", default_value_t = 300, global = true)]
    analyzer_timeout: u64,

    /// How to find the JSON object in analyzer output.
    #[arg(
        long,
        env = "FACEREPORT_JSON_EXTRACTION",
        value_enum,
        default_value = "balanced",
        global = true
    )]
    json_extraction: ExtractionArg,

    /// LLM model ID (e.g. gemini-1.5-flash, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL", global = true)]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", global = true)]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "FACEREPORT_TEMPERATURE", default_value_t = 0.7, global = true)]
    temperature: f32,

    /// Max output tokens per advisory.
    #[arg(long, env = "FACEREPORT_MAX_TOKENS", default_value_t = 1024, global = true)]
    max_tokens: usize,

    /// Per-advisory LLM call timeout in seconds (0 disables).
    #[arg(long, env = "FACEREPORT_ADVISORY_TIMEOUT", default_value_t = 60, global = true)]
    advisory_timeout: u64,

    /// HS256 secret for identity tokens.
    #[arg(long, env = "FACEREPORT_JWT_SECRET", hide_env_values = true, global = true)]
    jwt_secret: Option<String>,

    /// Maximum upload size in bytes.
    #[arg(long, env = "FACEREPORT_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024, global = true)]
    max_upload_bytes: usize,

    /// Seconds an undownloaded report is kept (0 keeps it until downloaded).
    #[arg(long, env = "FACEREPORT_REPORT_TTL", default_value_t = 1800, global = true)]
    report_ttl: u64,

    /// Development mode: fall back to a fixed JWT secret.
    #[arg(long, env = "FACEREPORT_DEV", global = true)]
    dev: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FACEREPORT_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FACEREPORT_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (the default).
    Serve,
    /// Print a signed identity token, for local testing.
    Token {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        /// Token lifetime in hours.
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ExtractionArg {
    Balanced,
    Greedy,
}

impl From<ExtractionArg> for JsonExtraction {
    fn from(v: ExtractionArg) -> Self {
        match v {
            ExtractionArg::Balanced => JsonExtraction::Balanced,
            ExtractionArg::Greedy => JsonExtraction::Greedy,
        }
    }
}

impl Cli {
    fn secret(&self) -> Result<String> {
        match (&self.jwt_secret, self.dev) {
            (Some(s), _) if !s.is_empty() => Ok(s.clone()),
            (_, true) => {
                warn!("--dev: using the built-in JWT secret");
                Ok(DEV_SECRET.to_string())
            }
            _ => anyhow::bail!("FACEREPORT_JWT_SECRET is required (or pass --dev)"),
        }
    }

    fn to_config(&self) -> Result<ServiceConfig> {
        let analyzer = AnalyzerCommand::parse(&self.analyzer)
            .with_context(|| format!("Invalid --analyzer command: {:?}", self.analyzer))?;
        let mut builder = ServiceConfig::builder()
            .bind_addr(&self.bind)
            .storage_dir(&self.storage_dir)
            .analyzer(analyzer)
            .analyzer_timeout_secs(self.analyzer_timeout)
            .json_extraction(self.json_extraction.clone().into())
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .advisory_timeout_secs(self.advisory_timeout)
            .jwt_secret(self.secret()?)
            .max_upload_bytes(self.max_upload_bytes)
            .report_ttl_secs(self.report_ttl);
        if let Some(ref m) = self.model {
            builder = builder.model(m);
        }
        if let Some(ref p) = self.provider {
            builder = builder.provider_name(p);
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Some(Command::Token {
            ref username,
            ref email,
            ref gender,
            ttl_hours,
        }) => {
            let identity = UserIdentity {
                username: username.clone(),
                email: email.clone(),
                gender: gender.clone(),
            };
            let token = TokenVerifier::new(&cli.secret()?)
                .issue(&identity, chrono::Duration::hours(ttl_hours))
                .context("Failed to sign token")?;
            println!("{token}");
            Ok(())
        }
        Some(Command::Serve) | None => {
            let config = cli.to_config()?;
            tracing::debug!("{:?}", config);
            serve(config).await.context("Server failed")
        }
    }
}
