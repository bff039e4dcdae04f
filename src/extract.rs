//! Element inventory for one page.

use crate::browser::PageHandle;
use crate::dom::{Attributes, DomSnapshot, PageSignals, TEST_HOOK_ATTRIBUTES};
use crate::error::{CaptureError, Result};
use crate::mask::{truncate_chars, FieldDescriptor, SensitiveValueMasker};
use crate::selector::{SelectorCandidate, SelectorCandidateGenerator};
use serde::{Deserialize, Serialize};

/// Attributes copied onto each record. `value` is deliberately absent.
pub const RECORDED_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "placeholder",
    "type",
    "href",
    "role",
    "aria-label",
];

pub const DEFAULT_TEXT_PREVIEW_LEN: usize = 50;

/// One interactive element found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub page_id: u32,
    pub tag: String,

    /// Visible text, or the field value for inputs. Masked when sensitive.
    pub text_preview: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub attrs: Attributes,

    /// Never empty; ordered best first.
    pub candidates: Vec<SelectorCandidate>,
}

impl ElementRecord {
    pub fn best(&self) -> &SelectorCandidate {
        &self.candidates[0]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub page_signals: PageSignals,
    pub elements: Vec<ElementRecord>,
    /// Interactive elements dropped because no selector could address them
    pub skipped: usize,
    /// `(inspected, total)` element counts when the snapshot hit its cap
    pub truncated: Option<(usize, usize)>,
}

impl Extraction {
    pub fn truncation_warning(&self, page_id: u32) -> Option<String> {
        self.truncated.map(|(inspected, total)| {
            format!(
                "Page {} has {} elements; only the first {} were inspected",
                page_id, total, inspected
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct ElementExtractor {
    generator: SelectorCandidateGenerator,
    masker: SensitiveValueMasker,
    preview_len: usize,
}

impl ElementExtractor {
    pub fn new(masker: SensitiveValueMasker, preview_len: usize) -> Self {
        Self {
            generator: SelectorCandidateGenerator::new(),
            masker,
            preview_len,
        }
    }

    /// Snapshot the page and build its inventory.
    ///
    /// Zero elements is reported as [`CaptureError::ExtractionEmpty`].
    pub async fn extract<P: PageHandle + ?Sized>(&self, page: &P, page_id: u32) -> Result<Extraction> {
        log::info!("🔍 Extracting interactive elements (page {})...", page_id);
        let snapshot = page.dom_snapshot().await?;
        let extraction = self.extract_snapshot(&snapshot, page_id);
        if let Some(warning) = extraction.truncation_warning(page_id) {
            log::warn!("{}", warning);
        }

        if extraction.elements.is_empty() {
            log::warn!("No interactive elements on page {} ({})", page_id, snapshot.url);
            return Err(CaptureError::ExtractionEmpty { page_id });
        }

        log::info!(
            "✓ Found {} interactive elements ({} skipped)",
            extraction.elements.len(),
            extraction.skipped
        );
        Ok(extraction)
    }

    /// Pure half of [`extract`](Self::extract). Unaddressable elements are
    /// dropped and counted, never fatal.
    pub fn extract_snapshot(&self, snapshot: &DomSnapshot, page_id: u32) -> Extraction {
        let mut extraction = Extraction {
            page_signals: snapshot.signals().clone(),
            truncated: snapshot
                .is_truncated()
                .then(|| (snapshot.len(), snapshot.total_elements())),
            ..Default::default()
        };

        for index in snapshot.interactive() {
            match self.record_for(snapshot, index, page_id) {
                Ok(record) => extraction.elements.push(record),
                Err(e) => {
                    log::debug!("Skipping element: {}", e);
                    extraction.skipped += 1;
                }
            }
        }
        extraction
    }

    fn record_for(&self, snapshot: &DomSnapshot, index: usize, page_id: u32) -> Result<ElementRecord> {
        let candidates = self.generator.candidates_for(snapshot, index)?;
        let node = snapshot
            .node(index)
            .ok_or_else(|| CaptureError::UnextractableElement(format!("node #{}", index)))?;

        let text_preview = if node.is_form_field() {
            let field = FieldDescriptor::from_attributes(&node.tag, &node.attributes);
            let raw = node.value.as_deref().unwrap_or_default();
            self.masker.preview(&field, raw, self.preview_len)
        } else {
            truncate_chars(&node.text, self.preview_len)
        };

        let attrs = RECORDED_ATTRIBUTES
            .iter()
            .chain(TEST_HOOK_ATTRIBUTES)
            .filter_map(|name| {
                node.attr(name)
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        Ok(ElementRecord {
            page_id,
            tag: node.tag.clone(),
            text_preview: (!text_preview.is_empty()).then_some(text_preview),
            label: node
                .label
                .as_deref()
                .map(|l| truncate_chars(l, self.preview_len))
                .filter(|l| !l.is_empty()),
            attrs,
            candidates,
        })
    }
}

impl Default for ElementExtractor {
    fn default() -> Self {
        Self::new(SensitiveValueMasker::default(), DEFAULT_TEXT_PREVIEW_LEN)
    }
}
