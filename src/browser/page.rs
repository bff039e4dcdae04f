//! The capability surface the capture engine needs from a browser.
//!
//! Everything under `session`, `capture` and `extract` talks to a
//! [`PageHandle`], never to Chrome directly. The Chrome driver implements it
//! for real runs; tests implement it over canned snapshots.

use crate::dom::{Attributes, DomSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Capacity of the driver → session event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Serialized document (outer HTML).
    async fn content(&self) -> Result<String>;

    /// Element tree of the current document.
    async fn dom_snapshot(&self) -> Result<DomSnapshot>;

    /// Full-page PNG written to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Wait until the document reports ready, up to `timeout`.
    async fn wait_until_ready(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Something the driver observed on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    /// A user interaction reported by the in-page recorder
    Action(RawAction),
    /// The main frame committed a new URL (full load or in-document)
    Navigated { url: String },
}

/// Interaction as reported by the page, before masking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    pub ts: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: String,

    pub url: String,

    #[serde(default)]
    pub element: Option<RawElement>,

    /// String for text fields and selects, bool for checkboxes/radios
    #[serde(default)]
    pub value: Option<serde_json::Value>,

    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawElement {
    pub tag: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub attributes: Attributes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_action_parses_recorder_payload() {
        let payload = r#"{
            "ts": "2026-01-17T12:00:00.123Z",
            "type": "input",
            "url": "http://localhost/login",
            "element": {"tag": "input", "text": "", "attributes": {"type": "password", "name": "password"}},
            "value": "hunter2"
        }"#;
        let action: RawAction = serde_json::from_str(payload).unwrap();
        assert_eq!(action.kind, "input");
        assert_eq!(action.element.as_ref().unwrap().attributes["name"], "password");
        assert_eq!(action.value, Some(serde_json::json!("hunter2")));
        assert!(action.key.is_none());
    }

    #[test]
    fn test_raw_action_without_element() {
        let payload = r#"{"ts": "2026-01-17T12:00:00Z", "type": "keydown", "url": "http://x/", "key": "Enter"}"#;
        let action: RawAction = serde_json::from_str(payload).unwrap();
        assert!(action.element.is_none());
        assert_eq!(action.key.as_deref(), Some("Enter"));
    }
}
