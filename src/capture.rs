//! Page visits and their evidence on disk.
//!
//! A screenshot is taken on every navigation. HTML is saved only on the first
//! visit of a normalized URL, so `html/` holds one file per distinct page.
//! Saved HTML has the prefilled values of sensitive fields masked.

use crate::artifacts::ArtifactStore;
use crate::browser::PageHandle;
use crate::error::{CaptureError, Result};
use crate::mask::SensitiveValueMasker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One distinct URL visited in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVisit {
    #[serde(rename = "pageId")]
    pub page_id: u32,
    pub url: String,
    pub title: String,
    pub first_visit: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_sha256: Option<String>,
}

/// Assigns `pageId`s in first-visit order.
#[derive(Debug, Default)]
pub struct PageRegistry {
    by_url: HashMap<String, u32>,
    visits: Vec<PageVisit>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the page id for `url` and whether this is its first visit.
    pub fn visit(&mut self, url: &str, title: &str, now: DateTime<Utc>) -> (u32, bool) {
        let key = normalize_url(url);
        if let Some(&page_id) = self.by_url.get(&key) {
            return (page_id, false);
        }

        let page_id = self.visits.len() as u32 + 1;
        self.by_url.insert(key, page_id);
        self.visits.push(PageVisit {
            page_id,
            url: url.to_string(),
            title: title.to_string(),
            first_visit: now,
            html_sha256: None,
        });
        (page_id, true)
    }

    /// Page id already assigned to `url`'s normalized form.
    pub fn lookup(&self, url: &str) -> Option<u32> {
        self.by_url.get(&normalize_url(url)).copied()
    }

    pub fn get(&self, page_id: u32) -> Option<&PageVisit> {
        self.visits.get(page_id.checked_sub(1)? as usize)
    }

    fn get_mut(&mut self, page_id: u32) -> Option<&mut PageVisit> {
        self.visits.get_mut(page_id.checked_sub(1)? as usize)
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    pub fn visits(&self) -> &[PageVisit] {
        &self.visits
    }

    pub fn into_visits(self) -> Vec<PageVisit> {
        self.visits
    }
}

/// Key used to decide whether two URLs are the same page.
///
/// Lowercases scheme and host, drops query and fragment, maps an empty path to
/// `/` and strips a trailing slash elsewhere. Strings that don't look like
/// `scheme://…` only lose their query and fragment.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    let base = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);

    let Some((scheme, rest)) = base.split_once("://") else {
        return base.to_string();
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };

    let path = match path {
        "" | "/" => "/",
        p => p.strip_suffix('/').unwrap_or(p),
    };

    format!(
        "{}://{}{}",
        scheme.to_ascii_lowercase(),
        authority.to_ascii_lowercase(),
        path
    )
}

/// Screenshot information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotInfo {
    pub path: PathBuf,
    pub page_id: u32,
    pub taken_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Result of one navigation capture.
#[derive(Debug, Clone)]
pub struct PageCapture {
    pub page_id: u32,
    pub is_new: bool,
    pub screenshot: Option<ScreenshotInfo>,
    pub html_path: Option<PathBuf>,
}

/// Take a screenshot of the current page as `page_id`.
pub async fn capture_screenshot<P: PageHandle + ?Sized>(
    page: &P,
    store: &ArtifactStore,
    page_id: u32,
) -> Result<ScreenshotInfo> {
    let taken_at = Utc::now();
    let path = store.unique_screenshot_path(page_id, taken_at);
    log::debug!("📸 Capturing screenshot to {:?}", path);

    page.screenshot(&path).await?;

    let size_bytes = tokio::fs::metadata(&path)
        .await
        .map_err(|e| CaptureError::from_io(&path, e))?
        .len();

    log::info!(
        "✓ Screenshot saved: {}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    );
    Ok(ScreenshotInfo {
        path,
        page_id,
        taken_at,
        size_bytes,
    })
}

/// Register a navigation to the page's current URL and persist its evidence.
///
/// Filesystem failures are returned. A screenshot or HTML read that fails on
/// the browser side is logged and the capture carries on without it.
pub async fn capture_navigation<P: PageHandle + ?Sized>(
    page: &P,
    store: &ArtifactStore,
    registry: &mut PageRegistry,
    masker: &SensitiveValueMasker,
    url: &str,
) -> Result<PageCapture> {
    let title = page.title().await.unwrap_or_else(|e| {
        log::warn!("Could not read page title: {}", e);
        String::new()
    });

    let (page_id, is_new) = registry.visit(url, &title, Utc::now());
    log::info!("Page ID: {} (new: {}) {}", page_id, is_new, url);

    let screenshot = match capture_screenshot(page, store, page_id).await {
        Ok(info) => Some(info),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            log::warn!("Error saving screenshot: {}", e);
            None
        }
    };

    let mut html_path = None;
    if is_new {
        match page.content().await {
            Ok(html) => {
                let html = masker.scrub_html(&html);
                let path = store.html_path(page_id);
                write_html(&path, &html).await?;
                if let Some(visit) = registry.get_mut(page_id) {
                    visit.html_sha256 = Some(compute_string_hash(&html));
                }
                log::info!("✓ HTML saved: page_{}.html ({} KB)", page_id, html.len() / 1024);
                html_path = Some(path);
            }
            Err(e) => log::warn!("Error reading HTML for page {}: {}", page_id, e),
        }
    }

    Ok(PageCapture {
        page_id,
        is_new,
        screenshot,
        html_path,
    })
}

async fn write_html(path: &Path, html: &str) -> Result<()> {
    tokio::fs::write(path, html)
        .await
        .map_err(|e| CaptureError::from_io(path, e))
}

/// Compute SHA-256 hash of a string
pub fn compute_string_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();

    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("HTTP://Example.COM"), "http://example.com/");
        assert_eq!(normalize_url("http://example.com/"), "http://example.com/");
        assert_eq!(
            normalize_url("https://example.com/Login/?next=/home#top"),
            "https://example.com/Login"
        );
        assert_eq!(
            normalize_url("http://localhost:8080/a/b"),
            "http://localhost:8080/a/b"
        );
        assert_eq!(normalize_url("about:blank"), "about:blank");
    }

    #[test]
    fn test_registry_reuses_page_id_for_same_page() {
        let mut registry = PageRegistry::new();
        let now = Utc::now();

        assert_eq!(registry.visit("http://x/login", "Login", now), (1, true));
        assert_eq!(registry.visit("http://x/home", "Home", now), (2, true));
        assert_eq!(registry.visit("http://x/login?err=1", "Login", now), (1, false));
        assert_eq!(registry.visit("http://X/login#pw", "", now), (1, false));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(2).unwrap().title, "Home");
        assert!(registry.get(0).is_none());
        assert_eq!(registry.lookup("http://X/home/"), Some(2));
        assert_eq!(registry.lookup("http://x/other"), None);
    }

    #[test]
    fn test_first_visit_keeps_original_url() {
        let mut registry = PageRegistry::new();
        registry.visit("http://x/search?q=rust", "Search", Utc::now());
        assert_eq!(registry.visits()[0].url, "http://x/search?q=rust");
    }

    #[test]
    fn test_compute_string_hash() {
        assert_eq!(
            compute_string_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
