//! Fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use facereport::observer::{PipelineObserver, Stage};
use facereport::{
    AdvisoryError, AdvisoryKind, AdvisoryService, Analyzer, Pipeline, PipelineError, RawAnalysis,
    ReportStore, UserIdentity,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const GOOD_OUTPUT: &str = r#"Loading model...
{"AcnePrediction": 0.4, "FaceShape": "Oval", "SkinType": "Oily", "Wrinkles": "None"}
"#;

// ── Analyzer ─────────────────────────────────────────────────────────────

type ErrorFactory = Box<dyn Fn() -> PipelineError + Send + Sync>;

/// Returns canned stdout, or a canned error, without spawning anything.
pub struct FixtureAnalyzer {
    outcome: Result<String, ErrorFactory>,
    /// `(path, existed)` for every invocation.
    pub seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl FixtureAnalyzer {
    pub fn stdout(out: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(out.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(make: impl Fn() -> PipelineError + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(Box::new(make)),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Analyzer for FixtureAnalyzer {
    async fn invoke(&self, image: &Path) -> Result<RawAnalysis, PipelineError> {
        self.seen
            .lock()
            .unwrap()
            .push((image.to_path_buf(), image.exists()));
        match &self.outcome {
            Ok(out) if out.trim().is_empty() => {
                Err(PipelineError::EmptyAnalyzerOutput { exit_code: Some(0) })
            }
            Ok(out) => Ok(RawAnalysis {
                stdout: out.clone(),
                exit_code: Some(0),
                duration_ms: 1,
            }),
            Err(make) => Err(make()),
        }
    }
}

// ── Advisory service ─────────────────────────────────────────────────────

/// Answers `"<kind> advice"` for every kind except those told to fail.
#[derive(Default)]
pub struct ScriptedAdvisor {
    pub fail: Vec<AdvisoryKind>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<(AdvisoryKind, String)>>,
}

impl ScriptedAdvisor {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(kind: AdvisoryKind) -> Arc<Self> {
        Arc::new(Self {
            fail: vec![kind],
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdvisoryService for ScriptedAdvisor {
    async fn generate(&self, kind: AdvisoryKind, prompt: &str) -> Result<String, AdvisoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((kind, prompt.to_string()));
        if self.fail.contains(&kind) {
            return Err(AdvisoryError::Remote {
                kind,
                detail: "503 Service Unavailable".into(),
            });
        }
        Ok(format!("**{kind} advice**"))
    }
}

// ── Observer ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Stage(Stage),
    Failed(Stage, String),
    Cleanup(bool),
    Done,
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<(Uuid, Event)>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn cleanups(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Cleanup(_)))
            .count()
    }

    pub fn failure(&self) -> Option<(Stage, String)> {
        self.events().into_iter().find_map(|e| match e {
            Event::Failed(s, m) => Some((s, m)),
            _ => None,
        })
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_stage(&self, id: Uuid, stage: Stage) {
        self.events.lock().unwrap().push((id, Event::Stage(stage)));
    }

    fn on_failed(&self, id: Uuid, stage: Stage, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((id, Event::Failed(stage, message.to_string())));
    }

    fn on_cleanup(&self, id: Uuid, removed: bool) {
        self.events.lock().unwrap().push((id, Event::Cleanup(removed)));
    }

    fn on_done(&self, id: Uuid, _report_bytes: u64) {
        self.events.lock().unwrap().push((id, Event::Done));
    }
}

// ── Builders ─────────────────────────────────────────────────────────────

pub async fn pipeline(
    root: &Path,
    analyzer: Arc<dyn Analyzer>,
    advisor: Arc<dyn AdvisoryService>,
) -> (Pipeline, Arc<RecordingObserver>) {
    let store = ReportStore::new(root).await.unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let p = Pipeline::new(analyzer, advisor, store).with_observer(observer.clone());
    (p, observer)
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(64, 48, image::Rgb([180, 140, 120]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn identity(gender: Option<&str>) -> UserIdentity {
    UserIdentity {
        username: Some("ada".into()),
        email: Some("ada@example.com".into()),
        gender: gender.map(str::to_string),
    }
}

pub fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w == needle.as_bytes())
}
