//! Per-run artifact layout.
//!
//! ```text
//! <artifacts_dir>/runs/<run_id>/
//! ├── meta.json
//! ├── logs/session.log
//! ├── food/{food.json, actions.ndjson}
//! ├── html/page_<pageId>.html
//! └── screenshots/<ts>_page_<pageId>.png
//! ```
//!
//! Every path a run writes is handed out here; callers never join paths
//! themselves.

use crate::error::{CaptureError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const RUNS_DIR: &str = "runs";
pub const HTML_DIR: &str = "html";
pub const SCREENSHOTS_DIR: &str = "screenshots";
pub const FOOD_DIR: &str = "food";
pub const LOGS_DIR: &str = "logs";

pub const META_FILE: &str = "meta.json";

const SCREENSHOT_TS_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Directory layout owned by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    pub root: PathBuf,
    pub html_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub food_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ArtifactPaths {
    /// Compute the layout without touching the filesystem.
    pub fn for_run(artifacts_dir: &Path, run_id: &str) -> Self {
        let root = artifacts_dir.join(RUNS_DIR).join(run_id);
        Self {
            html_dir: root.join(HTML_DIR),
            screenshots_dir: root.join(SCREENSHOTS_DIR),
            food_dir: root.join(FOOD_DIR),
            logs_dir: root.join(LOGS_DIR),
            root,
        }
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    /// Named directories in creation order, for diagnostics.
    pub fn entries(&self) -> [(&'static str, &Path); 5] {
        [
            ("run", self.root.as_path()),
            (LOGS_DIR, self.logs_dir.as_path()),
            (FOOD_DIR, self.food_dir.as_path()),
            (HTML_DIR, self.html_dir.as_path()),
            (SCREENSHOTS_DIR, self.screenshots_dir.as_path()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    paths: ArtifactPaths,
}

impl ArtifactStore {
    /// Create `<artifacts_dir>/runs/<run_id>/{html,screenshots,food,logs}`.
    ///
    /// Existing directories are accepted, so calling this twice for the same
    /// run leaves the tree and its contents untouched.
    pub fn create_layout(artifacts_dir: &Path, run_id: &str) -> Result<Self> {
        let paths = ArtifactPaths::for_run(artifacts_dir, run_id);

        for (_, dir) in paths.entries() {
            std::fs::create_dir_all(dir).map_err(|e| {
                log::error!("❌ Failed to create {}: {}", dir.display(), e);
                CaptureError::from_io(dir, e)
            })?;
        }

        log::debug!("Artifact layout ready at {}", paths.root.display());
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn html_path(&self, page_id: u32) -> PathBuf {
        self.paths.html_dir.join(format!("page_{}.html", page_id))
    }

    /// `<ts>_page_<pageId>.png`, timestamp in UTC with millisecond precision so
    /// names sort in capture order.
    pub fn screenshot_path(&self, page_id: u32, ts: DateTime<Utc>) -> PathBuf {
        self.paths.screenshots_dir.join(format!(
            "{}_page_{}.png",
            ts.format(SCREENSHOT_TS_FORMAT),
            page_id
        ))
    }

    /// Like [`screenshot_path`](Self::screenshot_path), appending `_<n>` when
    /// an earlier capture already took the name.
    pub fn unique_screenshot_path(&self, page_id: u32, ts: DateTime<Utc>) -> PathBuf {
        let base = self.screenshot_path(page_id, ts);
        if !base.exists() {
            return base;
        }
        let stem = format!("{}_page_{}", ts.format(SCREENSHOT_TS_FORMAT), page_id);
        (1..)
            .map(|n| self.paths.screenshots_dir.join(format!("{}_{}.png", stem, n)))
            .find(|candidate| !candidate.exists())
            .unwrap_or(base)
    }

    pub fn food_json_path(&self) -> PathBuf {
        self.paths.food_dir.join("food.json")
    }

    pub fn actions_log_path(&self) -> PathBuf {
        self.paths.food_dir.join("actions.ndjson")
    }

    pub fn log_path(&self) -> PathBuf {
        self.paths.logs_dir.join("session.log")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.paths.meta_path()
    }
}

/// Write `bytes` to `path` through a temporary sibling and a rename, so readers
/// see either the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(|e| CaptureError::from_io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CaptureError::from_io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_create_layout_makes_all_directories() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::create_layout(dir.path(), "20260117_120000_0001").unwrap();

        let paths = store.paths();
        assert_eq!(
            paths.root,
            dir.path().join("runs").join("20260117_120000_0001")
        );
        for (name, path) in paths.entries() {
            assert!(path.is_dir(), "{} must be a directory", name);
            let marker = path.join(".marker");
            std::fs::write(&marker, b"ok").unwrap();
            std::fs::remove_file(&marker).unwrap();
        }
    }

    #[test]
    fn test_create_layout_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::create_layout(dir.path(), "run").unwrap();
        std::fs::write(store.html_path(1), "<html></html>").unwrap();

        let again = ArtifactStore::create_layout(dir.path(), "run").unwrap();
        assert_eq!(store.paths(), again.paths());
        assert_eq!(
            std::fs::read_to_string(again.html_path(1)).unwrap(),
            "<html></html>"
        );
    }

    #[test]
    fn test_create_layout_rejects_file_in_the_way() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("runs"), "not a dir").unwrap();
        let err = ArtifactStore::create_layout(dir.path(), "run").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_artifact_paths() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::create_layout(dir.path(), "r").unwrap();
        let root = dir.path().join("runs").join("r");

        assert_eq!(store.html_path(3), root.join("html").join("page_3.html"));
        assert_eq!(store.food_json_path(), root.join("food").join("food.json"));
        assert_eq!(
            store.actions_log_path(),
            root.join("food").join("actions.ndjson")
        );
        assert_eq!(store.log_path(), root.join("logs").join("session.log"));
        assert_eq!(store.meta_path(), root.join("meta.json"));

        let ts = Utc.with_ymd_and_hms(2026, 1, 17, 12, 0, 5).unwrap();
        assert_eq!(
            store.screenshot_path(2, ts),
            root.join("screenshots")
                .join("20260117_120005_000_page_2.png")
        );
    }

    #[test]
    fn test_unique_screenshot_path_skips_taken_names() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::create_layout(dir.path(), "r").unwrap();
        let ts = Utc.with_ymd_and_hms(2026, 1, 17, 12, 0, 5).unwrap();

        let first = store.unique_screenshot_path(1, ts);
        std::fs::write(&first, b"png").unwrap();
        let second = store.unique_screenshot_path(1, ts);
        std::fs::write(&second, b"png").unwrap();
        let third = store.unique_screenshot_path(1, ts);

        assert_ne!(first, second);
        assert!(second.ends_with("20260117_120005_000_page_1_1.png"));
        assert!(third.ends_with("20260117_120005_000_page_1_2.png"));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        write_atomic(&path, b"{\"a\":1}").unwrap();
        write_atomic(&path, b"{\"a\":2}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        assert!(!dir.path().join("meta.tmp").exists());
    }
}
