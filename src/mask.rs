//! Sensitive value masking.
//!
//! A field is sensitive when its `type` is `password`, its `autocomplete`
//! hint names a password or payment-card field, or its name/id/label-ish
//! attributes contain one of [`SENSITIVE_PATTERNS`]. Sensitive values are
//! replaced wholesale by [`MASK`]; no part of the raw value survives.
//!
//! Saved page HTML goes through [`SensitiveValueMasker::scrub_html`], which
//! applies the same rule to server-rendered `value` attributes and
//! `<textarea>` bodies.

use crate::dom::Attributes;
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const MASK: &str = "***";

/// Case-insensitive substrings that mark a field as secret.
pub const SENSITIVE_PATTERNS: &[&str] = &[
    "password", "passwd", "senha", "secret", "token", "cpf", "card", "cvv",
];

const SENSITIVE_TYPES: &[&str] = &["password"];
const SENSITIVE_AUTOCOMPLETE: &[&str] = &["password", "one-time-code", "cc-"];

/// The attributes of a form field that decide whether its value is secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub tag: String,
    pub input_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub autocomplete: Option<String>,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
}

impl FieldDescriptor {
    pub fn from_attributes(tag: &str, attrs: &Attributes) -> Self {
        let get = |key: &str| attrs.get(key).cloned();
        Self {
            tag: tag.to_ascii_lowercase(),
            input_type: get("type"),
            name: get("name"),
            id: get("id"),
            autocomplete: get("autocomplete"),
            aria_label: get("aria-label"),
            placeholder: get("placeholder"),
        }
    }

    pub fn is_sensitive(&self) -> bool {
        let lower = |v: &Option<String>| v.as_deref().map(str::to_ascii_lowercase);

        if let Some(t) = lower(&self.input_type) {
            if SENSITIVE_TYPES.contains(&t.trim()) {
                return true;
            }
        }

        if let Some(hint) = lower(&self.autocomplete) {
            if SENSITIVE_AUTOCOMPLETE.iter().any(|p| hint.contains(p)) {
                return true;
            }
        }

        [
            &self.name,
            &self.id,
            &self.aria_label,
            &self.placeholder,
        ]
        .into_iter()
        .filter_map(lower)
        .any(|value| SENSITIVE_PATTERNS.iter().any(|p| value.contains(p)))
    }
}

/// Masking policy for one run. Disabled only by an explicit `--no-mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitiveValueMasker {
    enabled: bool,
}

impl Default for SensitiveValueMasker {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl SensitiveValueMasker {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `field`'s value will be redacted under this policy.
    pub fn should_mask(&self, field: &FieldDescriptor) -> bool {
        self.enabled && field.is_sensitive()
    }

    pub fn mask_if_sensitive(&self, field: &FieldDescriptor, raw: &str) -> String {
        if self.should_mask(field) {
            MASK.to_string()
        } else {
            raw.to_string()
        }
    }

    /// Preview text for persistence: the marker for secrets, otherwise the
    /// value cut to `max_chars`.
    pub fn preview(&self, field: &FieldDescriptor, raw: &str, max_chars: usize) -> String {
        if self.should_mask(field) {
            MASK.to_string()
        } else {
            truncate_chars(raw, max_chars)
        }
    }
}

impl SensitiveValueMasker {
    /// Mask the prefilled values of sensitive fields in serialized HTML.
    ///
    /// Every `value` attribute of a sensitive `<input>` and the body of a
    /// sensitive `<textarea>` become [`MASK`]. The rest of the document is
    /// copied byte for byte.
    pub fn scrub_html(&self, html: &str) -> String {
        if !self.is_enabled() {
            return html.to_string();
        }

        let mut out = String::with_capacity(html.len());
        let mut copied = 0;
        let mut pos = 0;

        while let Some(offset) = html[pos..].find('<') {
            let start = pos + offset;
            let Some(tag) = parse_field_tag(html, start) else {
                pos = start + 1;
                continue;
            };
            pos = tag.end;

            let field = FieldDescriptor::from_attributes(tag.name, &tag.attributes);
            if !self.should_mask(&field) {
                continue;
            }

            if tag.name == "textarea" {
                let body_end = find_ascii_ci(html, tag.end, "</textarea").unwrap_or(html.len());
                if body_end > tag.end {
                    out.push_str(&html[copied..tag.end]);
                    out.push_str(MASK);
                    copied = body_end;
                }
                pos = body_end;
            } else {
                for span in tag.values.into_iter().filter(|s| !s.is_empty()) {
                    out.push_str(&html[copied..span.start]);
                    out.push_str(MASK);
                    copied = span.end;
                }
            }
        }

        out.push_str(&html[copied..]);
        out
    }
}

/// Start tag of a form field that can carry a prefilled value.
struct FieldTag {
    name: &'static str,
    attributes: Attributes,
    /// Byte ranges of every `value` attribute's content
    values: Vec<Range<usize>>,
    /// Index just past the closing `>`
    end: usize,
}

fn parse_field_tag(html: &str, start: usize) -> Option<FieldTag> {
    let bytes = html.as_bytes();
    let after = &bytes[start + 1..];
    let name = ["input", "textarea"].into_iter().find(|n| {
        after.len() > n.len()
            && after[..n.len()].eq_ignore_ascii_case(n.as_bytes())
            && (after[n.len()].is_ascii_whitespace() || matches!(after[n.len()], b'/' | b'>'))
    })?;

    let mut i = start + 1 + name.len();
    let mut attributes = Attributes::new();
    let mut values = Vec::new();

    loop {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        if bytes[i] == b'>' {
            i += 1;
            break;
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let attr = html[name_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut span = i..i;
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match *bytes.get(i)? {
                quote @ (b'"' | b'\'') => {
                    let close = i + 1 + html[i + 1..].find(quote as char)?;
                    span = i + 1..close;
                    i = close + 1;
                }
                _ => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    span = value_start..i;
                }
            }
        }

        if attr == "value" {
            values.push(span.clone());
        }
        attributes
            .entry(attr)
            .or_insert_with(|| html[span].to_string());
    }

    Some(FieldTag {
        name,
        attributes,
        values,
        end: i,
    })
}

fn find_ascii_ci(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    haystack.as_bytes()[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
        .map(|p| p + from)
}

/// Trim and cut to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}
