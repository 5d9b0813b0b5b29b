//! External analyzer invocation.
//!
//! The facial analysis itself is an opaque program. This module only knows
//! how to start it with an image path, collect what it prints and decide
//! whether anything usable came back. The exit code is logged but never
//! used as the success signal: the analyzer is known to exit non-zero after
//! printing a perfectly good result when a model warns on shutdown.
//!
//! ## Why a trait?
//!
//! [`Analyzer`] is the seam between the orchestrator and the outside world.
//! Production uses [`ProcessAnalyzer`]; tests substitute a fixture that
//! returns canned output, so every failure branch of the pipeline can be
//! driven without Python or model weights.

use crate::config::{AnalyzerCommand, JsonExtraction};
use crate::error::PipelineError;
use crate::pipeline::parse::{parse_analysis, AnalysisResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Raw result of one analyzer run.
#[derive(Debug, Clone)]
pub struct RawAnalysis {
    /// Everything written to stdout, lossily decoded as UTF-8.
    pub stdout: String,
    /// Exit code, if the process exited normally. Informational only.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Image path in, analysis out.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Run the analyzer on `image` and return its raw stdout.
    ///
    /// Implementations must fail with [`PipelineError::EmptyAnalyzerOutput`]
    /// when nothing but whitespace was produced.
    async fn invoke(&self, image: &Path) -> Result<RawAnalysis, PipelineError>;

    /// Run the analyzer and parse its output in one step.
    async fn analyze(
        &self,
        image: &Path,
        mode: JsonExtraction,
    ) -> Result<AnalysisResult, PipelineError> {
        let raw = self.invoke(image).await?;
        parse_analysis(&raw.stdout, mode)
    }
}

/// Runs the analyzer as a child process: `program args... <image>`.
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    command: AnalyzerCommand,
    timeout: Option<Duration>,
}

impl ProcessAnalyzer {
    /// `timeout_secs == 0` disables the bound.
    pub fn new(command: AnalyzerCommand, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    async fn run(&self, image: &Path) -> Result<RawAnalysis, PipelineError> {
        let start = Instant::now();
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::ProcessLaunch {
                program: self.command.program.clone(),
                source: e,
            })?;
        debug!("Analyzer started: {} {}", self.command, image.display());

        // stderr is forwarded as it arrives and never aborts the run.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "facereport::analyzer", "{}", line);
                }
            })
        });

        let mut buf = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            if let Err(e) = stdout.read_to_end(&mut buf).await {
                warn!("Analyzer stdout read failed after {} bytes: {}", buf.len(), e);
            }
        }

        let exit_code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to reap analyzer: {}", e);
                None
            }
        };
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Analyzer exited with code {:?} after {}ms ({} bytes stdout)",
            exit_code,
            duration_ms,
            buf.len()
        );

        let stdout = String::from_utf8_lossy(&buf).into_owned();
        if stdout.trim().is_empty() {
            return Err(PipelineError::EmptyAnalyzerOutput { exit_code });
        }

        Ok(RawAnalysis {
            stdout,
            exit_code,
            duration_ms,
        })
    }
}

#[async_trait]
impl Analyzer for ProcessAnalyzer {
    async fn invoke(&self, image: &Path) -> Result<RawAnalysis, PipelineError> {
        match self.timeout {
            // Dropping the run future drops the child, and kill_on_drop reaps it.
            Some(limit) => tokio::time::timeout(limit, self.run(image))
                .await
                .map_err(|_| PipelineError::AnalyzerTimeout {
                    secs: limit.as_secs(),
                })?,
            None => self.run(image).await,
        }
    }
}
