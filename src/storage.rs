//! Per-request file slots for uploaded photos and generated reports.
//!
//! ```text
//! <root>/
//!   uploads/<request-id>.jpg   deleted by the pipeline once the request ends
//!   reports/<request-id>.pdf   deleted by the first successful download,
//!                              by a newer upload from the same browser,
//!                              or by the sweep once older than the TTL
//! ```
//!
//! Every request gets its own [`Uuid`], so concurrent uploads never share a
//! file. The photo keeps a `.jpg` name whatever its real encoding; the
//! decoder sniffs the format from content.

use crate::error::{PipelineError, ServiceError};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPLOADS: &str = "uploads";
const REPORTS: &str = "reports";

/// Age after which an undownloaded report is swept. Default: 30 minutes.
pub const DEFAULT_REPORT_TTL: Duration = Duration::from_secs(30 * 60);

/// One stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    pub id: Uuid,
    pub path: PathBuf,
}

/// Filesystem-backed slot store.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
    report_ttl: Option<Duration>,
}

impl ReportStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let root = root.into();
        for sub in [UPLOADS, REPORTS] {
            let dir = root.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ServiceError::StorageInit {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        // Handlers pass slot paths to a child process, which may run in another cwd.
        let root = tokio::fs::canonicalize(&root)
            .await
            .map_err(|e| ServiceError::StorageInit {
                path: root.clone(),
                source: e,
            })?;
        debug!("Storage ready at {}", root.display());
        Ok(Self {
            root,
            report_ttl: Some(DEFAULT_REPORT_TTL),
        })
    }

    /// `None` keeps reports until they are downloaded.
    pub fn with_report_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.report_ttl = ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upload_path(&self, id: Uuid) -> PathBuf {
        self.root.join(UPLOADS).join(format!("{id}.jpg"))
    }

    pub fn report_path(&self, id: Uuid) -> PathBuf {
        self.root.join(REPORTS).join(format!("{id}.pdf"))
    }

    /// Persist an uploaded photo under a fresh request id.
    ///
    /// Expired reports are swept first.
    pub async fn create_upload(&self, bytes: &[u8]) -> Result<UploadSlot, PipelineError> {
        if let Some(ttl) = self.report_ttl {
            self.sweep_reports(ttl).await;
        }
        let id = Uuid::new_v4();
        let path = self.upload_path(id);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;
        debug!("Stored upload {} ({} bytes)", id, bytes.len());
        Ok(UploadSlot { id, path })
    }

    /// Delete an upload. Returns `false` if there was nothing to delete.
    ///
    /// Never fails: a leftover photo is logged, not surfaced.
    pub async fn remove_upload(&self, slot: &UploadSlot) -> bool {
        match tokio::fs::remove_file(&slot.path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to delete upload {}: {}", slot.path.display(), e);
                false
            }
        }
    }

    /// Delete a report if present.
    pub async fn discard_report(&self, id: Uuid) {
        let path = self.report_path(id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to delete report {}: {}", path.display(), e);
            }
        }
    }

    /// Delete every report (or leftover `.tmp`) last modified more than
    /// `max_age` ago. Returns how many were removed.
    pub async fn sweep_reports(&self, max_age: Duration) -> usize {
        let dir = self.root.join(REPORTS);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to list {}: {}", dir.display(), e);
                return 0;
            }
        };
        let now = SystemTime::now();
        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list {}: {}", dir.display(), e);
                    break;
                }
            };
            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            // A clock step backwards makes the file look new; keep it.
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to sweep {}: {}", entry.path().display(), e),
            }
        }
        if removed > 0 {
            info!("Swept {} expired report(s)", removed);
        }
        removed
    }

    /// Read a report and delete it. `Ok(None)` if there is no such report.
    ///
    /// Two concurrent takes of the same id may both read the file; only one
    /// delete succeeds and the loser is treated as not found.
    pub async fn take_report(&self, id: Uuid) -> io::Result<Option<Vec<u8>>> {
        let path = self.report_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("data")).await.unwrap();
        assert!(store.root().join("uploads").is_dir());
        assert!(store.root().join("reports").is_dir());
        assert!(store.root().is_absolute());
    }

    #[tokio::test]
    async fn uploads_get_distinct_slots() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path()).await.unwrap();
        let a = store.create_upload(b"one").await.unwrap();
        let b = store.create_upload(b"two").await.unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(std::fs::read(&a.path).unwrap(), b"one");

        assert!(store.remove_upload(&a).await);
        assert!(!a.path.exists());
        assert!(!store.remove_upload(&a).await);
    }

    #[tokio::test]
    async fn take_report_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path()).await.unwrap();
        let id = Uuid::new_v4();
        std::fs::write(store.report_path(id), b"%PDF-1.5").unwrap();

        assert_eq!(store.take_report(id).await.unwrap().as_deref(), Some(&b"%PDF-1.5"[..]));
        assert!(store.take_report(id).await.unwrap().is_none());
    }

    fn backdate(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path()).await.unwrap();
        let (old, fresh) = (Uuid::new_v4(), Uuid::new_v4());
        std::fs::write(store.report_path(old), b"%PDF-old").unwrap();
        std::fs::write(store.report_path(fresh), b"%PDF-new").unwrap();
        backdate(&store.report_path(old), Duration::from_secs(3600));

        assert_eq!(store.sweep_reports(Duration::from_secs(600)).await, 1);
        assert!(!store.report_path(old).exists());
        assert!(store.report_path(fresh).exists());
    }

    #[tokio::test]
    async fn create_upload_sweeps_unless_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let keep = ReportStore::new(dir.path()).await.unwrap().with_report_ttl(None);
        let id = Uuid::new_v4();
        std::fs::write(keep.report_path(id), b"%PDF").unwrap();
        backdate(&keep.report_path(id), DEFAULT_REPORT_TTL * 2);

        keep.create_upload(b"photo").await.unwrap();
        assert!(keep.report_path(id).exists());

        let sweeping = keep.with_report_ttl(Some(DEFAULT_REPORT_TTL));
        sweeping.create_upload(b"photo").await.unwrap();
        assert!(!sweeping.report_path(id).exists());
    }

    #[tokio::test]
    async fn unusable_root_is_storage_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();
        let err = ReportStore::new(&file).await.unwrap_err();
        assert!(matches!(err, ServiceError::StorageInit { .. }));
    }
}
