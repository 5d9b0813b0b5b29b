//! Observer trait for per-request pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::orchestrate::Pipeline::with_observer`] to watch each upload move
//! through its states:
//!
//! ```text
//! Received ─▶ Invoking ─▶ Parsing ─▶ Generating ─▶ Composing ─▶ Done
//!     └───────────┴───────────┴───────────┴────────────┴──────▶ Failed
//! ```
//!
//! Cleanup of the uploaded photo is reported separately through
//! [`PipelineObserver::on_cleanup`] and fires exactly once per request,
//! whichever terminal state was reached. The test suite relies on that.
//!
//! # Example
//!
//! ```rust
//! use facereport::observer::{PipelineObserver, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use uuid::Uuid;
//!
//! struct CountFailures(AtomicUsize);
//!
//! impl PipelineObserver for CountFailures {
//!     fn on_failed(&self, _id: Uuid, _stage: Stage, _message: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The state of one upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Received,
    Invoking,
    Parsing,
    Generating,
    Composing,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Invoking => "invoking",
            Stage::Parsing => "parsing",
            Stage::Generating => "generating",
            Stage::Composing => "composing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Called by the orchestrator as a request advances.
///
/// All methods default to no-ops. Requests run concurrently, so
/// implementations must synchronise any shared state.
pub trait PipelineObserver: Send + Sync {
    /// The request entered `stage` (never a terminal stage).
    fn on_stage(&self, id: Uuid, stage: Stage) {
        let _ = (id, stage);
    }

    /// The request failed while in `stage`.
    fn on_failed(&self, id: Uuid, stage: Stage, message: &str) {
        let _ = (id, stage, message);
    }

    /// The uploaded photo was deleted (`removed == false` if it was already gone).
    fn on_cleanup(&self, id: Uuid, removed: bool) {
        let _ = (id, removed);
    }

    /// The report is ready for download.
    fn on_done(&self, id: Uuid, report_bytes: u64) {
        let _ = (id, report_bytes);
    }
}

/// The default observer.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

pub type SharedObserver = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl PipelineObserver for Log {
        fn on_stage(&self, _id: Uuid, stage: Stage) {
            self.0.lock().unwrap().push(stage.to_string());
        }
        fn on_cleanup(&self, _id: Uuid, removed: bool) {
            self.0.lock().unwrap().push(format!("cleanup:{removed}"));
        }
    }

    #[test]
    fn defaults_are_noops() {
        let o: SharedObserver = Arc::new(NoopObserver);
        let id = Uuid::new_v4();
        o.on_stage(id, Stage::Received);
        o.on_failed(id, Stage::Parsing, "bad");
        o.on_cleanup(id, true);
        o.on_done(id, 1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let log = Log::default();
        let id = Uuid::new_v4();
        log.on_stage(id, Stage::Invoking);
        log.on_cleanup(id, false);
        log.on_done(id, 10);
        assert_eq!(*log.0.lock().unwrap(), vec!["invoking", "cleanup:false"]);
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Composing.is_terminal());
    }
}
