//! Flattened DOM snapshot consumed by selector generation and extraction.
//!
//! Nodes are element nodes in document order. `parent` points at an earlier
//! index (or is `None` for the document element), which keeps structural
//! walks free of cycles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Element attributes keyed by lowercase name. Ordered so every consumer sees
/// the same iteration order for the same snapshot.
pub type Attributes = BTreeMap<String, String>;

/// Explicit test-hook attributes, in the order they are consulted.
pub const TEST_HOOK_ATTRIBUTES: &[&str] = &["data-testid", "data-test-id", "data-test"];

const INTERACTIVE_TAGS: &[&str] = &["button", "input", "select", "textarea"];
const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "checkbox", "radio", "switch", "tab", "menuitem",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomNode {
    pub tag: String,

    #[serde(default)]
    pub parent: Option<usize>,

    #[serde(default)]
    pub attributes: Attributes,

    /// Trimmed text content (empty for form fields)
    #[serde(default)]
    pub text: String,

    /// Live value of form fields, unmasked. Never persisted as-is.
    #[serde(default)]
    pub value: Option<String>,

    /// Text of the `<label>` associated with a form field
    #[serde(default)]
    pub label: Option<String>,
}

impl DomNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn is_form_field(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "select" | "textarea")
    }

    /// Buttons, form fields, links, ARIA widgets, click handlers and anything
    /// carrying a test hook.
    pub fn is_interactive(&self) -> bool {
        if self.tag == "input" && self.attr("type") == Some("hidden") {
            return false;
        }
        INTERACTIVE_TAGS.contains(&self.tag.as_str())
            || (self.tag == "a" && self.attributes.contains_key("href"))
            || self
                .attr("role")
                .map(|r| INTERACTIVE_ROLES.contains(&r))
                .unwrap_or(false)
            || self.attributes.contains_key("onclick")
            || self.attr("contenteditable") == Some("true")
            || TEST_HOOK_ATTRIBUTES
                .iter()
                .any(|a| self.attributes.contains_key(*a))
    }
}

/// Page-level hints recorded next to the element inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSignals {
    pub has_data_testid: bool,
    pub has_aria_roles: bool,
    pub likely_spa: bool,
}

/// Wire shape produced by the in-page snapshot script.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDomSnapshot {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub likely_spa: bool,
    #[serde(default)]
    pub nodes: Vec<DomNode>,
    /// Elements in the document, including any cut by the node cap
    #[serde(default)]
    pub total: usize,
}

impl From<RawDomSnapshot> for DomSnapshot {
    fn from(raw: RawDomSnapshot) -> Self {
        DomSnapshot::new(raw.url, raw.title, raw.nodes, raw.likely_spa).with_total_elements(raw.total)
    }
}

#[derive(Debug, Clone)]
pub struct DomSnapshot {
    pub url: String,
    pub title: String,
    nodes: Vec<DomNode>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    signals: PageSignals,
    total_elements: usize,
}

impl DomSnapshot {
    pub fn new(url: String, title: String, mut nodes: Vec<DomNode>, likely_spa: bool) -> Self {
        let mut children = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();

        for (i, node) in nodes.iter_mut().enumerate() {
            node.tag = node.tag.to_ascii_lowercase();
            match node.parent {
                Some(p) if p < i => children[p].push(i),
                Some(_) => {
                    log::debug!("Node {} has a forward parent reference, treating as root", i);
                    node.parent = None;
                    roots.push(i);
                }
                None => roots.push(i),
            }
        }

        let signals = PageSignals {
            has_data_testid: nodes.iter().any(|n| {
                TEST_HOOK_ATTRIBUTES
                    .iter()
                    .any(|a| n.attributes.contains_key(*a))
            }),
            has_aria_roles: nodes.iter().any(|n| n.attributes.contains_key("role")),
            likely_spa,
        };

        Self {
            url,
            title,
            total_elements: nodes.len(),
            nodes,
            children,
            roots,
            signals,
        }
    }

    /// Record how many elements the document had when the snapshot was cut.
    /// Counts below the node count are ignored.
    pub fn with_total_elements(mut self, total: usize) -> Self {
        self.total_elements = total.max(self.nodes.len());
        self
    }

    pub fn builder(url: impl Into<String>) -> DomSnapshotBuilder {
        DomSnapshotBuilder {
            url: url.into(),
            title: String::new(),
            likely_spa: false,
            total_elements: 0,
            nodes: Vec::new(),
        }
    }

    /// Elements in the document, which exceeds [`len`](Self::len) when the
    /// snapshot was truncated.
    pub fn total_elements(&self) -> usize {
        self.total_elements
    }

    /// Whether elements past the cap are missing. Uniqueness checks against
    /// a truncated snapshot prove nothing about the live document.
    pub fn is_truncated(&self) -> bool {
        self.total_elements > self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&DomNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[DomNode] {
        &self.nodes
    }

    pub fn signals(&self) -> &PageSignals {
        &self.signals
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.nodes.get(index).and_then(|n| n.parent)
    }

    /// Elements sharing this node's parent (including itself), in document order.
    pub fn siblings(&self, index: usize) -> &[usize] {
        match self.parent(index) {
            Some(p) => &self.children[p],
            None => &self.roots,
        }
    }

    /// 1-based position among same-tag siblings, and how many there are.
    pub fn nth_of_type(&self, index: usize) -> Option<(usize, usize)> {
        let tag = &self.nodes.get(index)?.tag;
        let same: Vec<usize> = self
            .siblings(index)
            .iter()
            .copied()
            .filter(|&s| &self.nodes[s].tag == tag)
            .collect();
        let position = same.iter().position(|&s| s == index)? + 1;
        Some((position, same.len()))
    }

    /// Indices of interactive elements in document order.
    pub fn interactive(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_interactive())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Test-friendly way to assemble a snapshot node by node.
pub struct DomSnapshotBuilder {
    url: String,
    title: String,
    likely_spa: bool,
    total_elements: usize,
    nodes: Vec<DomNode>,
}

impl DomSnapshotBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn likely_spa(mut self, spa: bool) -> Self {
        self.likely_spa = spa;
        self
    }

    /// Pretend the live document had `total` elements.
    pub fn total_elements(mut self, total: usize) -> Self {
        self.total_elements = total;
        self
    }

    /// Append an element and return its index.
    pub fn push(&mut self, tag: &str, parent: Option<usize>, attrs: &[(&str, &str)]) -> usize {
        self.push_node(DomNode {
            tag: tag.to_string(),
            parent,
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        })
    }

    pub fn push_node(&mut self, node: DomNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node_mut(&mut self, index: usize) -> &mut DomNode {
        &mut self.nodes[index]
    }

    pub fn build(self) -> DomSnapshot {
        DomSnapshot::new(self.url, self.title, self.nodes, self.likely_spa)
            .with_total_elements(self.total_elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_snapshot() -> DomSnapshot {
        let mut b = DomSnapshot::builder("http://localhost/login").title("Login");
        let html = b.push("html", None, &[]);
        let body = b.push("body", Some(html), &[]);
        let form = b.push("form", Some(body), &[("id", "login-form")]);
        b.push("input", Some(form), &[("id", "username"), ("type", "text")]);
        b.push("input", Some(form), &[("type", "hidden"), ("name", "csrf")]);
        b.push("input", Some(form), &[("type", "password"), ("name", "password")]);
        b.push("button", Some(form), &[("data-testid", "submit-btn")]);
        b.push("a", Some(body), &[("href", "/help")]);
        b.push("a", Some(body), &[]);
        b.push("div", Some(body), &[("role", "button")]);
        b.build()
    }

    #[test]
    fn test_interactive_detection() {
        let snap = form_snapshot();
        let tags: Vec<&str> = snap
            .interactive()
            .into_iter()
            .map(|i| snap.node(i).unwrap().tag.as_str())
            .collect();
        // hidden input and href-less anchor are skipped
        assert_eq!(tags, vec!["input", "input", "button", "a", "div"]);
    }

    #[test]
    fn test_nth_of_type_counts_same_tag_siblings() {
        let snap = form_snapshot();
        assert_eq!(snap.nth_of_type(3), Some((1, 3)));
        assert_eq!(snap.nth_of_type(5), Some((3, 3)));
        assert_eq!(snap.nth_of_type(6), Some((1, 1)));
        assert_eq!(snap.nth_of_type(0), Some((1, 1)));
    }

    #[test]
    fn test_signals() {
        let snap = form_snapshot();
        assert!(snap.signals().has_data_testid);
        assert!(snap.signals().has_aria_roles);
        assert!(!snap.signals().likely_spa);
    }

    #[test]
    fn test_forward_parent_reference_becomes_root() {
        let nodes = vec![
            DomNode {
                tag: "DIV".into(),
                parent: Some(1),
                ..Default::default()
            },
            DomNode {
                tag: "span".into(),
                parent: None,
                ..Default::default()
            },
        ];
        let snap = DomSnapshot::new("u".into(), "t".into(), nodes, false);
        assert_eq!(snap.parent(0), None);
        assert_eq!(snap.node(0).unwrap().tag, "div");
        assert_eq!(snap.siblings(0), &[0, 1]);
    }

    #[test]
    fn test_raw_snapshot_deserializes() {
        let raw: RawDomSnapshot = serde_json::from_value(serde_json::json!({
            "url": "http://x/",
            "title": "X",
            "likely_spa": true,
            "nodes": [
                {"tag": "html", "parent": null, "attributes": {}},
                {"tag": "button", "parent": 0, "attributes": {"id": "go"}, "text": "Go"}
            ]
        }))
        .unwrap();
        let snap = DomSnapshot::from(raw);
        assert_eq!(snap.len(), 2);
        assert!(snap.signals().likely_spa);
        assert_eq!(snap.node(1).unwrap().attr("id"), Some("go"));
        assert!(!snap.is_truncated());
        assert_eq!(snap.total_elements(), 2);
    }

    #[test]
    fn test_truncated_snapshot_reports_total() {
        let raw: RawDomSnapshot = serde_json::from_value(serde_json::json!({
            "url": "http://x/",
            "nodes": [{"tag": "html", "parent": null}],
            "total": 7200
        }))
        .unwrap();
        let snap = DomSnapshot::from(raw);
        assert!(snap.is_truncated());
        assert_eq!(snap.total_elements(), 7200);
    }

    #[test]
    fn test_builder_flags_spa() {
        let mut b = DomSnapshot::builder("http://x/").likely_spa(true);
        b.push("html", None, &[]);
        let snap = b.build();
        assert!(snap.signals().likely_spa);
        assert!(!snap.is_truncated());
    }
}
