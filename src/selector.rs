//! Ranked selector candidates for one element.
//!
//! Strategies are inspected in a fixed order, most stable first:
//!
//! 1. `data-testid` (or `data-test-id` / `data-test`)
//! 2. `id`, when it does not look generated
//! 3. `aria-label`
//! 4. `name`
//! 5. a structural CSS path, unique within the snapshot (or, for a truncated
//!    snapshot, anchored at `:root` with a position at every level)
//!
//! Output order is the ranking order. A strategy contributes at most one
//! candidate and identical selector strings are emitted once.

use crate::dom::{Attributes, DomSnapshot, TEST_HOOK_ATTRIBUTES};
use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Segments this long made only of hex digits (with at least one digit) are
/// treated as generated.
const GENERATED_SEGMENT_MIN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorStrategy {
    DataTestid,
    Id,
    AriaLabel,
    Name,
    CssPath,
}

impl SelectorStrategy {
    /// All strategies in ranking order.
    pub const ALL: [SelectorStrategy; 5] = [
        SelectorStrategy::DataTestid,
        SelectorStrategy::Id,
        SelectorStrategy::AriaLabel,
        SelectorStrategy::Name,
        SelectorStrategy::CssPath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorStrategy::DataTestid => "data-testid",
            SelectorStrategy::Id => "id",
            SelectorStrategy::AriaLabel => "aria-label",
            SelectorStrategy::Name => "name",
            SelectorStrategy::CssPath => "css-path",
        }
    }

    /// 1 is best.
    pub fn rank(&self) -> u8 {
        *self as u8 + 1
    }
}

impl fmt::Display for SelectorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub strategy: SelectorStrategy,
    pub selector: String,
}

impl SelectorCandidate {
    pub fn new(strategy: SelectorStrategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }
}

/// Candidates derivable from attributes alone (no css-path).
///
/// Used for recorded actions, where the element arrives without its tree.
pub fn attribute_candidates(tag: &str, attrs: &Attributes) -> Vec<SelectorCandidate> {
    let tag = tag.to_ascii_lowercase();
    let mut out: Vec<SelectorCandidate> = Vec::new();

    for strategy in SelectorStrategy::ALL {
        if let Some(selector) = attribute_selector(strategy, &tag, attrs) {
            push_unique(&mut out, SelectorCandidate::new(strategy, selector));
        }
    }
    out
}

fn attribute_selector(strategy: SelectorStrategy, tag: &str, attrs: &Attributes) -> Option<String> {
    let get = |name: &str| attrs.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

    match strategy {
        SelectorStrategy::DataTestid => TEST_HOOK_ATTRIBUTES
            .iter()
            .find_map(|hook| get(hook).map(|v| format!("[{}=\"{}\"]", hook, escape_attr(v)))),
        SelectorStrategy::Id => attrs
            .get("id")
            .map(String::as_str)
            .filter(|id| is_stable_id(id))
            .map(id_selector),
        SelectorStrategy::AriaLabel => {
            get("aria-label").map(|v| format!("{}[aria-label=\"{}\"]", tag, escape_attr(v)))
        }
        SelectorStrategy::Name => get("name").map(|v| format!("{}[name=\"{}\"]", tag, escape_attr(v))),
        SelectorStrategy::CssPath => None,
    }
}

fn push_unique(out: &mut Vec<SelectorCandidate>, candidate: SelectorCandidate) {
    if !out.iter().any(|c| c.selector == candidate.selector) {
        out.push(candidate);
    }
}

/// Whether an `id` is worth anchoring a selector on.
///
/// Rejects ids that are pure digits, React `useId` output (`:r1:`), and ids
/// with a hex-looking segment of [`GENERATED_SEGMENT_MIN_LEN`]+ characters
/// containing a digit (`btn-3f2a9c1e`, UUIDs).
pub fn is_stable_id(id: &str) -> bool {
    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return false;
    }
    if id.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if id.len() > 1 && id.starts_with(':') && id.ends_with(':') {
        return false;
    }
    !id.split(|c| matches!(c, '-' | '_' | ':' | '.'))
        .any(looks_generated)
}

fn looks_generated(segment: &str) -> bool {
    segment.len() >= GENERATED_SEGMENT_MIN_LEN
        && segment.bytes().all(|b| b.is_ascii_hexdigit())
        && segment.bytes().any(|b| b.is_ascii_digit())
}

fn id_selector(id: &str) -> String {
    if is_css_identifier(id) {
        format!("#{}", id)
    } else {
        format!("[id=\"{}\"]", escape_attr(id))
    }
}

fn is_css_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    let starts_ok = first.is_ascii_alphabetic()
        || first == '_'
        || (first == '-'
            && s.chars()
                .nth(1)
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false));
    starts_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\a "),
            _ => out.push(c),
        }
    }
    out
}

/// One step of a structural path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathStep {
    Tag { tag: String, nth: Option<usize> },
    Id(String),
}

impl PathStep {
    fn matches(&self, snapshot: &DomSnapshot, index: usize) -> bool {
        let Some(node) = snapshot.node(index) else {
            return false;
        };
        match self {
            PathStep::Id(id) => node.attributes.get("id").map(String::as_str) == Some(id.as_str()),
            PathStep::Tag { tag, nth } => {
                &node.tag == tag
                    && match nth {
                        None => true,
                        Some(k) => snapshot.nth_of_type(index).map(|(pos, _)| pos) == Some(*k),
                    }
            }
        }
    }

    fn render(&self) -> String {
        match self {
            PathStep::Id(id) => id_selector(id),
            PathStep::Tag { tag, nth: None } => tag.clone(),
            PathStep::Tag { tag, nth: Some(k) } => format!("{}:nth-of-type({})", tag, k),
        }
    }
}

/// Pure selector generation over a [`DomSnapshot`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorCandidateGenerator;

impl SelectorCandidateGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Ranked candidates for the element at `index`.
    ///
    /// Fails with [`CaptureError::UnextractableElement`] only when no strategy,
    /// css-path included, can address the element.
    pub fn candidates_for(&self, snapshot: &DomSnapshot, index: usize) -> Result<Vec<SelectorCandidate>> {
        let node = snapshot
            .node(index)
            .filter(|n| !n.tag.is_empty())
            .ok_or_else(|| CaptureError::UnextractableElement(format!("node #{}", index)))?;

        let mut out = attribute_candidates(&node.tag, &node.attributes);
        if let Some(path) = self.css_path(snapshot, index) {
            push_unique(&mut out, SelectorCandidate::new(SelectorStrategy::CssPath, path));
        }

        if out.is_empty() {
            return Err(CaptureError::UnextractableElement(format!(
                "<{}> node #{}",
                node.tag, index
            )));
        }
        Ok(out)
    }

    /// Shortest child-combinator path that matches exactly this element.
    ///
    /// Walks up from the element, adding a step per ancestor until the path
    /// is unique. An ancestor with a stable `id` is tried as an anchor before
    /// its tag is added. `:nth-of-type` appears only where same-tag siblings
    /// exist.
    ///
    /// A truncated snapshot cannot prove uniqueness, so the path is spelled
    /// out from the document root instead.
    pub fn css_path(&self, snapshot: &DomSnapshot, index: usize) -> Option<String> {
        if snapshot.is_truncated() {
            return rooted_path(snapshot, index);
        }

        let mut steps: Vec<PathStep> = Vec::new();
        let mut current = index;

        for _ in 0..=snapshot.len() {
            steps.insert(0, tag_step(snapshot, current)?);
            if count_matches(snapshot, &steps) == 1 {
                return Some(render_path(&steps));
            }

            let parent = snapshot.parent(current)?;
            if let Some(id) = snapshot
                .node(parent)
                .and_then(|p| p.attr("id"))
                .filter(|id| is_stable_id(id))
            {
                let mut anchored = Vec::with_capacity(steps.len() + 1);
                anchored.push(PathStep::Id(id.to_string()));
                anchored.extend(steps.iter().cloned());
                if count_matches(snapshot, &anchored) == 1 {
                    return Some(render_path(&anchored));
                }
            }
            current = parent;
        }
        None
    }
}

/// `:root > body:nth-of-type(1) > …` down to `index`.
///
/// Ancestors and earlier siblings precede an element in document order, so
/// the positions are exact even when later nodes were cut.
fn rooted_path(snapshot: &DomSnapshot, index: usize) -> Option<String> {
    let mut steps = Vec::new();
    let mut current = index;
    while let Some(parent) = snapshot.parent(current) {
        let node = snapshot.node(current)?;
        let (position, _) = snapshot.nth_of_type(current)?;
        steps.push(format!("{}:nth-of-type({})", node.tag, position));
        current = parent;
    }
    if snapshot.node(current)?.tag != "html" {
        return None;
    }
    steps.push(":root".to_string());
    steps.reverse();
    Some(steps.join(" > "))
}

fn tag_step(snapshot: &DomSnapshot, index: usize) -> Option<PathStep> {
    let node = snapshot.node(index)?;
    let (position, count) = snapshot.nth_of_type(index)?;
    Some(PathStep::Tag {
        tag: node.tag.clone(),
        nth: (count > 1).then_some(position),
    })
}

fn render_path(steps: &[PathStep]) -> String {
    steps
        .iter()
        .map(PathStep::render)
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Number of nodes matched by `steps` (stops counting at 2).
fn count_matches(snapshot: &DomSnapshot, steps: &[PathStep]) -> usize {
    let mut count = 0;
    for index in 0..snapshot.len() {
        if path_matches(snapshot, index, steps) {
            count += 1;
            if count > 1 {
                break;
            }
        }
    }
    count
}

fn path_matches(snapshot: &DomSnapshot, index: usize, steps: &[PathStep]) -> bool {
    let mut current = Some(index);
    for step in steps.iter().rev() {
        match current {
            Some(i) if step.matches(snapshot, i) => current = snapshot.parent(i),
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::DomSnapshotBuilder;

    fn page() -> (DomSnapshotBuilder, usize) {
        let mut b = DomSnapshot::builder("http://localhost/");
        let html = b.push("html", None, &[]);
        let body = b.push("body", Some(html), &[]);
        (b, body)
    }

    fn strategies(c: &[SelectorCandidate]) -> Vec<SelectorStrategy> {
        c.iter().map(|c| c.strategy).collect()
    }

    #[test]
    fn test_full_ranking_order() {
        let (mut b, body) = page();
        let btn = b.push(
            "button",
            Some(body),
            &[
                ("data-testid", "submit-btn"),
                ("id", "submit"),
                ("aria-label", "Submit form"),
                ("name", "go"),
            ],
        );
        let snap = b.build();
        let c = SelectorCandidateGenerator::new().candidates_for(&snap, btn).unwrap();

        assert_eq!(strategies(&c), SelectorStrategy::ALL.to_vec());
        assert_eq!(c[0].selector, "[data-testid=\"submit-btn\"]");
        assert_eq!(c[1].selector, "#submit");
        assert_eq!(c[2].selector, "button[aria-label=\"Submit form\"]");
        assert_eq!(c[3].selector, "button[name=\"go\"]");
        assert_eq!(c[4].selector, "button");
    }

    #[test]
    fn test_rank_matches_declaration_order() {
        let ranks: Vec<u8> = SelectorStrategy::ALL.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            serde_json::to_string(&SelectorStrategy::DataTestid).unwrap(),
            "\"data-testid\""
        );
        assert_eq!(
            serde_json::to_string(&SelectorStrategy::CssPath).unwrap(),
            "\"css-path\""
        );
    }

    #[test]
    fn test_test_hook_variants() {
        let mut attrs = Attributes::new();
        attrs.insert("data-test".into(), "save".into());
        let c = attribute_candidates("button", &attrs);
        assert_eq!(c[0], SelectorCandidate::new(SelectorStrategy::DataTestid, "[data-test=\"save\"]"));

        attrs.insert("data-testid".into(), "save-btn".into());
        let c = attribute_candidates("button", &attrs);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].selector, "[data-testid=\"save-btn\"]");
    }

    #[test]
    fn test_only_css_path_when_no_attributes() {
        let (mut b, body) = page();
        let div = b.push("div", Some(body), &[]);
        b.push("span", Some(div), &[]);
        let target = b.push("span", Some(div), &[("onclick", "x()")]);
        let snap = b.build();

        let c = SelectorCandidateGenerator::new().candidates_for(&snap, target).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].strategy, SelectorStrategy::CssPath);
        assert_eq!(c[0].selector, "span:nth-of-type(2)");
    }

    #[test]
    fn test_css_path_walks_up_until_unique() {
        let (mut b, body) = page();
        for _ in 0..2 {
            let section = b.push("section", Some(body), &[]);
            b.push("button", Some(section), &[]);
        }
        let snap = b.build();
        let gen = SelectorCandidateGenerator::new();

        assert_eq!(
            gen.css_path(&snap, 3).as_deref(),
            Some("section:nth-of-type(1) > button")
        );
        assert_eq!(
            gen.css_path(&snap, 5).as_deref(),
            Some("section:nth-of-type(2) > button")
        );
    }

    #[test]
    fn test_css_path_anchors_on_stable_ancestor_id() {
        let (mut b, body) = page();
        let nav = b.push("nav", Some(body), &[("id", "main-nav")]);
        b.push("a", Some(nav), &[("href", "/")]);
        let other = b.push("nav", Some(body), &[]);
        b.push("a", Some(other), &[("href", "/x")]);
        let snap = b.build();

        let path = SelectorCandidateGenerator::new().css_path(&snap, 3).unwrap();
        assert_eq!(path, "#main-nav > a");
    }

    #[test]
    fn test_css_path_skips_generated_ancestor_id() {
        let (mut b, body) = page();
        let wrap = b.push("div", Some(body), &[("id", "wrap-3f2a9c1e")]);
        b.push("a", Some(wrap), &[("href", "/")]);
        let other = b.push("div", Some(body), &[]);
        b.push("a", Some(other), &[("href", "/x")]);
        let snap = b.build();

        let path = SelectorCandidateGenerator::new().css_path(&snap, 3).unwrap();
        assert_eq!(path, "div:nth-of-type(1) > a");
    }

    #[test]
    fn test_unstable_id_is_skipped() {
        let (mut b, body) = page();
        let el = b.push("input", Some(body), &[("id", ":r1:"), ("name", "q")]);
        let snap = b.build();
        let c = SelectorCandidateGenerator::new().candidates_for(&snap, el).unwrap();
        assert_eq!(
            strategies(&c),
            vec![SelectorStrategy::Name, SelectorStrategy::CssPath]
        );
    }

    #[test]
    fn test_stable_id_boundaries() {
        for id in ["username", "login-form", "a1b2c3d", "deadbeef", "item-1234567", "step_2"] {
            assert!(is_stable_id(id), "{} should be stable", id);
        }
        for id in [
            "",
            "  ",
            "1234567",
            ":r1:",
            "a1b2c3d4",
            "btn-3f2a9c1e",
            "550e8400-e29b-41d4-a716-446655440000",
            "has space",
        ] {
            assert!(!is_stable_id(id), "{:?} should be unstable", id);
        }
    }

    #[test]
    fn test_selector_values_are_escaped() {
        let mut attrs = Attributes::new();
        attrs.insert("aria-label".into(), "Say \"hi\"".into());
        attrs.insert("id".into(), "9lives".into());
        let c = attribute_candidates("button", &attrs);
        assert_eq!(c[0].selector, "[id=\"9lives\"]");
        assert_eq!(c[1].selector, "button[aria-label=\"Say \\\"hi\\\"\"]");
    }

    #[test]
    fn test_empty_attribute_values_are_ignored() {
        let mut attrs = Attributes::new();
        attrs.insert("data-testid".into(), "".into());
        attrs.insert("name".into(), "  ".into());
        assert!(attribute_candidates("input", &attrs).is_empty());
    }

    #[test]
    fn test_root_element_addressed_by_tag() {
        let (b, _) = page();
        let snap = b.build();
        let c = SelectorCandidateGenerator::new().candidates_for(&snap, 0).unwrap();
        assert_eq!(c, vec![SelectorCandidate::new(SelectorStrategy::CssPath, "html")]);
    }

    #[test]
    fn test_missing_node_is_unextractable() {
        let (b, _) = page();
        let snap = b.build();
        let err = SelectorCandidateGenerator::new()
            .candidates_for(&snap, 99)
            .unwrap_err();
        assert!(matches!(err, CaptureError::UnextractableElement(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_truncated_snapshot_anchors_path_at_root() {
        let mut b = DomSnapshot::builder("http://localhost/").total_elements(9000);
        let html = b.push("html", None, &[]);
        let body = b.push("body", Some(html), &[]);
        let main = b.push("main", Some(body), &[("id", "content")]);
        b.push("p", Some(main), &[]);
        let button = b.push("button", Some(main), &[]);
        let snap = b.build();
        let gen = SelectorCandidateGenerator::new();

        // Unique among the nodes we have, but not provably so on the page
        assert_eq!(
            gen.css_path(&snap, button).as_deref(),
            Some(":root > body:nth-of-type(1) > main:nth-of-type(1) > button:nth-of-type(1)")
        );
        assert_eq!(gen.css_path(&snap, html).as_deref(), Some(":root"));
    }

    #[test]
    fn test_css_path_is_deterministic() {
        let (mut b, body) = page();
        let ul = b.push("ul", Some(body), &[]);
        for _ in 0..3 {
            b.push("li", Some(ul), &[("role", "menuitem")]);
        }
        let snap = b.build();
        let gen = SelectorCandidateGenerator::new();
        let first = gen.candidates_for(&snap, 4).unwrap();
        let second = gen.candidates_for(&snap, 4).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].selector, "li:nth-of-type(2)");
    }
}
