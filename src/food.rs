//! `food/food.json`: the element inventory handed to downstream generators.

use crate::artifacts::{write_atomic, ArtifactStore};
use crate::capture::PageVisit;
use crate::config::RunMode;
use crate::dom::PageSignals;
use crate::error::{CaptureError, Result};
use crate::extract::ElementRecord;
use crate::recorder::ActionSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodDocument {
    pub schema_version: String,
    pub run_id: String,
    pub url: String,
    pub mode: RunMode,
    pub timestamp: DateTime<Utc>,
    pub page_signals: PageSignals,
    pub pages_visited: Vec<PageVisit>,
    pub elements: Vec<ElementRecord>,

    /// Interact mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_summary: Option<ActionSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FoodDocument {
    pub fn new(run_id: &str, url: &str, mode: RunMode) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            url: url.to_string(),
            mode,
            timestamp: Utc::now(),
            page_signals: PageSignals::default(),
            pages_visited: Vec::new(),
            elements: Vec::new(),
            action_summary: None,
            error: None,
        }
    }

    /// Pretty-printed, replaced atomically.
    pub fn write(&self, store: &ArtifactStore) -> Result<()> {
        let path = store.food_json_path();
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &json)?;
        log::info!("Food saved: {} ({} elements)", path.display(), self.elements.len());
        Ok(())
    }

    pub fn read(store: &ArtifactStore) -> Result<Self> {
        let path = store.food_json_path();
        let bytes = std::fs::read(&path).map_err(|e| CaptureError::from_io(&path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::create_layout(dir.path(), "r").unwrap();
        let mut doc = FoodDocument::new("r", "http://localhost/", RunMode::Snapshot);
        doc.page_signals.has_data_testid = true;
        doc.write(&store).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.food_json_path()).unwrap()).unwrap();
        assert_eq!(raw["schema_version"], "1.0");
        assert_eq!(raw["mode"], "snapshot");
        assert!(raw.get("action_summary").is_none());

        assert_eq!(FoodDocument::read(&store).unwrap(), doc);
    }
}
