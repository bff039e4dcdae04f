use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How a run drives the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Load one page, capture it, exit
    #[default]
    Snapshot,
    /// Record a headed session until interrupted or the browser closes
    Interact,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Snapshot => "snapshot",
            RunMode::Interact => "interact",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a run needs besides the target URL.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Parent of `runs/`
    pub artifacts_dir: PathBuf,
    pub mode: RunMode,
    pub headless: bool,
    pub mask_sensitive: bool,
    /// Period of interact-mode background screenshots
    pub screenshot_interval: Duration,
    pub navigation_timeout: Duration,
    /// Pause after load in snapshot mode, for late scripts
    pub settle_delay: Duration,
    pub text_preview_len: usize,
    pub chrome_path: Option<PathBuf>,
    pub no_sandbox: bool,
    pub retry: RetryPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("./artifacts"),
            mode: RunMode::Snapshot,
            headless: false,
            mask_sensitive: true,
            screenshot_interval: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            text_preview_len: crate::extract::DEFAULT_TEXT_PREVIEW_LEN,
            chrome_path: None,
            no_sandbox: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl CaptureConfig {
    /// Interact mode always shows the browser window.
    pub fn effective_headless(&self) -> bool {
        self.headless && self.mode == RunMode::Snapshot
    }
}
