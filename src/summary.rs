//! `meta.json`: the last artifact of every run.
//!
//! Written once, atomically, on every exit path. A consumer that finds a run
//! directory can always read its outcome here.

use crate::artifacts::write_atomic;
use crate::config::RunMode;
use crate::error::{CaptureError, Result};
use crate::food::SCHEMA_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the session managed before it ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub elements_count: usize,
    pub pages_count: usize,
    pub actions_count: usize,
    /// At least one element with a candidate was extracted
    pub extraction_viable: bool,
    pub fatal_error: Option<String>,
    /// Ended by an interrupt rather than running to completion
    pub interrupted: bool,
    pub warnings: Vec<String>,
}

impl RunState {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            fatal_error: Some(error.to_string()),
            ..Default::default()
        }
    }

    /// Stopped by an interrupt before anything worth keeping was captured.
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self {
            interrupted: true,
            warnings: vec![reason.into()],
            ..Default::default()
        }
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn success(&self) -> bool {
        self.extraction_viable && self.fatal_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub elements_count: usize,
    pub pages_count: usize,
    pub actions_count: usize,
    pub partial: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub url: String,
    pub mode: RunMode,
    pub headless: bool,
    pub mask_sensitive: bool,
    pub result: RunResult,
}

impl RunSummary {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| CaptureError::from_io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Holds the run-constant fields until [`finalize`](Self::finalize).
#[derive(Debug, Clone)]
pub struct RunSummaryWriter {
    pub meta_path: PathBuf,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub url: String,
    pub mode: RunMode,
    pub headless: bool,
    pub mask_sensitive: bool,
}

impl RunSummaryWriter {
    /// Build the summary from `state` and write `meta.json`.
    ///
    /// Consumes the writer, so a run can finalize only once.
    pub fn finalize(self, state: RunState) -> Result<RunSummary> {
        let success = state.success();
        let summary = RunSummary {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            url: self.url,
            mode: self.mode,
            headless: self.headless,
            mask_sensitive: self.mask_sensitive,
            result: RunResult {
                success,
                elements_count: state.elements_count,
                pages_count: state.pages_count,
                actions_count: state.actions_count,
                partial: state.interrupted,
                error: state.fatal_error,
                warnings: state.warnings,
            },
        };

        // meta.json is the last write into the run directory, session.log included
        if success {
            log::info!("✅ Run {} finished: success", summary.run_id);
        } else {
            log::error!(
                "❌ Run {} finished: failure{}",
                summary.run_id,
                summary
                    .result
                    .error
                    .as_deref()
                    .map(|e| format!(" ({})", e))
                    .unwrap_or_default()
            );
        }

        let json = serde_json::to_vec_pretty(&summary)?;
        write_atomic(&self.meta_path, &json)?;
        Ok(summary)
    }
}
