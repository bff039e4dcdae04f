//! Append-only action log (`food/actions.ndjson`).
//!
//! Each event is one JSON object on one line, written with a single
//! `write_all` under a lock and flushed before the lock is released. Readers
//! tailing the file only ever see whole lines.

use crate::browser::{RawAction, RawElement};
use crate::error::{CaptureError, Result};
use crate::mask::{truncate_chars, FieldDescriptor, SensitiveValueMasker, MASK};
use crate::selector::{attribute_candidates, SelectorStrategy};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const VALUE_PREVIEW_LEN: usize = 100;
const ELEMENT_TEXT_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    #[serde(alias = "input")]
    Fill,
    Change,
    Submit,
    Keydown,
    Navigate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Change => "change",
            ActionKind::Submit => "submit",
            ActionKind::Keydown => "keydown",
            ActionKind::Navigate => "navigate",
        }
    }

    /// Accepts the recorder script's names, `input` being a fill.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "click" => Some(ActionKind::Click),
            "fill" | "input" => Some(ActionKind::Fill),
            "change" => Some(ActionKind::Change),
            "submit" => Some(ActionKind::Submit),
            "keydown" => Some(ActionKind::Keydown),
            "navigate" => Some(ActionKind::Navigate),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionElement {
    pub tag: String,
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SelectorStrategy>,
}

/// One user interaction, already masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub ts: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: ActionKind,

    pub url: String,

    #[serde(rename = "pageId", default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ActionElement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub masked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ActionEvent {
    pub fn navigate(url: &str, page_id: u32, ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            kind: ActionKind::Navigate,
            url: url.to_string(),
            page_id: Some(page_id),
            element: None,
            value: None,
            masked: false,
            key: None,
        }
    }

    /// Convert a page-reported interaction, masking anything secret.
    ///
    /// Returns `None` for interaction kinds the recorder doesn't know.
    pub fn from_raw(raw: RawAction, page_id: Option<u32>, masker: &SensitiveValueMasker) -> Option<Self> {
        let kind = match ActionKind::parse(&raw.kind) {
            Some(kind) => kind,
            None => {
                log::debug!("Ignoring unknown action type {:?}", raw.kind);
                return None;
            }
        };

        let field = raw
            .element
            .as_ref()
            .map(|el| FieldDescriptor::from_attributes(&el.tag, &el.attributes))
            .unwrap_or_default();
        let masked = masker.should_mask(&field);

        let value = raw.value.map(|value| match value {
            serde_json::Value::String(s) => {
                serde_json::Value::String(masker.preview(&field, &s, VALUE_PREVIEW_LEN))
            }
            serde_json::Value::Null => serde_json::Value::Null,
            other if !masked => other,
            _ => serde_json::Value::String(MASK.to_string()),
        });

        Some(Self {
            ts: raw.ts,
            kind,
            url: raw.url,
            page_id,
            element: raw.element.map(|el| action_element(el, masked)),
            masked: masked && value.is_some(),
            value,
            key: raw.key,
        })
    }
}

fn action_element(el: RawElement, masked: bool) -> ActionElement {
    let best = attribute_candidates(&el.tag, &el.attributes).into_iter().next();
    let text = if masked && is_form_tag(&el.tag) {
        MASK.to_string()
    } else {
        truncate_chars(&el.text, ELEMENT_TEXT_LEN)
    };
    ActionElement {
        tag: el.tag.to_ascii_lowercase(),
        text,
        selector: best.as_ref().map(|c| c.selector.clone()),
        strategy: best.map(|c| c.strategy),
    }
}

fn is_form_tag(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "input" | "textarea" | "select"
    )
}

/// Counts gathered while recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub total_actions: usize,
    pub action_types: BTreeMap<String, usize>,
    pub urls_visited: Vec<String>,

    #[serde(default)]
    pub total_pages: usize,
}

#[derive(Debug)]
struct RecorderState {
    file: File,
    total: usize,
    action_types: BTreeMap<String, usize>,
    urls: BTreeSet<String>,
}

/// Serialized writer for `actions.ndjson`.
#[derive(Debug)]
pub struct ActionRecorder {
    path: PathBuf,
    state: Mutex<RecorderState>,
}

impl ActionRecorder {
    /// Open for appending, creating the file if needed.
    ///
    /// An existing file that ends mid-line (a writer died during an append)
    /// is cut back to its last complete line first.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| CaptureError::from_io(path, e))?;

        repair_partial_tail(&mut file).map_err(|e| CaptureError::from_io(path, e))?;

        log::info!("Recording started: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(RecorderState {
                file,
                total: 0,
                action_types: BTreeMap::new(),
                urls: BTreeSet::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a complete line.
    pub fn append(&self, event: &ActionEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut state = self.state.lock();
        state
            .file
            .write_all(line.as_bytes())
            .map_err(|e| CaptureError::from_io(&self.path, e))?;
        state
            .file
            .flush()
            .map_err(|e| CaptureError::from_io(&self.path, e))?;

        state.total += 1;
        *state
            .action_types
            .entry(event.kind.as_str().to_string())
            .or_insert(0) += 1;
        state.urls.insert(event.url.clone());
        drop(state);

        match &event.element {
            Some(el) => log::info!(
                "[{}] {} -> {}",
                event.kind,
                el.tag,
                el.selector.as_deref().map(|s| truncate_chars(s, 40)).unwrap_or_default()
            ),
            None => log::info!("[{}] {}", event.kind, event.url),
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.state.lock().total
    }

    /// Snapshot of the counters; `total_pages` is left for the caller.
    pub fn summary(&self) -> ActionSummary {
        let state = self.state.lock();
        ActionSummary {
            total_actions: state.total,
            action_types: state.action_types.clone(),
            urls_visited: state.urls.iter().cloned().collect(),
            total_pages: 0,
        }
    }

    /// Flush and sync to disk.
    pub fn finish(&self) -> Result<()> {
        let state = self.state.lock();
        state
            .file
            .sync_all()
            .map_err(|e| CaptureError::from_io(&self.path, e))?;
        log::info!("Recording finished: {} actions", state.total);
        Ok(())
    }
}

fn repair_partial_tail(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    file.seek(SeekFrom::Start(0))?;
    let mut contents = Vec::with_capacity(len as usize);
    file.read_to_end(&mut contents)?;
    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i as u64 + 1)
        .unwrap_or(0);

    log::warn!(
        "Dropping {} bytes of a partial trailing line in the action log",
        len - keep
    );
    file.set_len(keep)
}

/// Read back every event in an actions log.
pub fn read_actions(path: &Path) -> Result<Vec<ActionEvent>> {
    let file = File::open(path).map_err(|e| CaptureError::from_io(path, e))?;
    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| CaptureError::from_io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}
