//! In-memory page for driving capture sessions without Chrome.
//!
//! Pages are canned [`DomSnapshot`]s keyed by URL. `goto` switches the
//! current page, screenshots write a tiny PNG so files can be counted.

#![allow(dead_code)]

use async_trait::async_trait;
use gen_food::browser::PageHandle;
use gen_food::dom::DomSnapshot;
use gen_food::error::{CaptureError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Clone)]
pub struct FakeDocument {
    pub html: String,
    pub snapshot: DomSnapshot,
}

pub struct FakePage {
    documents: HashMap<String, FakeDocument>,
    current: Mutex<String>,
    transient_failures: AtomicU32,
    gotos: AtomicU32,
    screenshots: AtomicUsize,
    goto_delay: Duration,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            current: Mutex::new("about:blank".to_string()),
            transient_failures: AtomicU32::new(0),
            gotos: AtomicU32::new(0),
            screenshots: AtomicUsize::new(0),
            goto_delay: Duration::ZERO,
        }
    }

    pub fn with_document(mut self, document: FakeDocument) -> Self {
        self.documents
            .insert(document.snapshot.url.clone(), document);
        self
    }

    /// Fail the next `n` navigations with a connection reset.
    pub fn failing_first(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Make every navigation take `delay` before it resolves.
    pub fn slow_navigation(mut self, delay: Duration) -> Self {
        self.goto_delay = delay;
        self
    }

    /// Simulate an in-page navigation (link click, history push).
    pub fn show(&self, url: &str) {
        *self.current.lock() = url.to_string();
    }

    pub fn goto_calls(&self) -> u32 {
        self.gotos.load(Ordering::SeqCst)
    }

    pub fn screenshots_taken(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }

    fn document(&self) -> Result<FakeDocument> {
        let current = self.current.lock().clone();
        self.documents
            .get(&current)
            .cloned()
            .ok_or(CaptureError::NoPage)
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.gotos.fetch_add(1, Ordering::SeqCst);
        if !self.goto_delay.is_zero() {
            tokio::time::sleep(self.goto_delay).await;
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CaptureError::NavigationFailed(
                "net::ERR_CONNECTION_RESET".to_string(),
            ));
        }
        if !self.documents.contains_key(url) {
            return Err(CaptureError::NavigationFailed(format!(
                "Navigation error: 404 for {}",
                url
            )));
        }
        self.show(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current.lock().clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.document()?.snapshot.title)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.document()?.html)
    }

    async fn dom_snapshot(&self) -> Result<DomSnapshot> {
        Ok(self.document()?.snapshot)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.document()?;
        tokio::fs::write(path, PNG_HEADER)
            .await
            .map_err(|e| CaptureError::from_io(path, e))?;
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Username, password (typed value "hunter2") and a submit button.
pub fn login_page(url: &str) -> FakeDocument {
    let mut b = DomSnapshot::builder(url).title("Login");
    let html = b.push("html", None, &[]);
    let body = b.push("body", Some(html), &[]);
    let form = b.push("form", Some(body), &[("id", "login-form")]);

    let label = b.push("label", Some(form), &[("for", "username")]);
    b.node_mut(label).text = "User name".into();

    let username = b.push(
        "input",
        Some(form),
        &[("id", "username"), ("name", "username"), ("type", "text")],
    );
    b.node_mut(username).value = Some("alice".into());
    b.node_mut(username).label = Some("User name".into());

    let password = b.push(
        "input",
        Some(form),
        &[("type", "password"), ("name", "password"), ("placeholder", "Password")],
    );
    b.node_mut(password).value = Some("hunter2".into());

    let button = b.push(
        "button",
        Some(form),
        &[("data-testid", "submit-btn"), ("type", "submit")],
    );
    b.node_mut(button).text = "Sign in".into();

    FakeDocument {
        html: r#"<!DOCTYPE html>
<html><head><title>Login</title></head>
<body>
<form id="login-form">
  <label for="username">User name</label>
  <input id="username" name="username" type="text">
  <input type="password" name="password" placeholder="Password">
  <button data-testid="submit-btn" type="submit">Sign in</button>
</form>
</body></html>"#
            .to_string(),
        snapshot: b.build(),
    }
}

/// A landing page with two navigation links.
pub fn home_page(url: &str) -> FakeDocument {
    let mut b = DomSnapshot::builder(url).title("Home");
    let html = b.push("html", None, &[]);
    let body = b.push("body", Some(html), &[]);
    let nav = b.push("nav", Some(body), &[]);
    let first = b.push("a", Some(nav), &[("href", "/orders")]);
    b.node_mut(first).text = "Orders".into();
    let second = b.push("a", Some(nav), &[("href", "/logout"), ("aria-label", "Log out")]);
    b.node_mut(second).text = "Log out".into();

    FakeDocument {
        html: r#"<!DOCTYPE html>
<html><head><title>Home</title></head>
<body><nav><a href="/orders">Orders</a><a href="/logout" aria-label="Log out">Log out</a></nav></body>
</html>"#
            .to_string(),
        snapshot: b.build(),
    }
}

/// Text only, nothing to interact with.
pub fn static_page(url: &str) -> FakeDocument {
    let mut b = DomSnapshot::builder(url).title("About");
    let html = b.push("html", None, &[]);
    let body = b.push("body", Some(html), &[]);
    let p = b.push("p", Some(body), &[]);
    b.node_mut(p).text = "Nothing to click here.".into();

    FakeDocument {
        html: "<html><body><p>Nothing to click here.</p></body></html>".to_string(),
        snapshot: b.build(),
    }
}

/// The login page as served with its fields prefilled server-side,
/// including a hidden API token.
pub fn prefilled_login_page(url: &str) -> FakeDocument {
    let mut document = login_page(url);
    document.html = r#"<!DOCTYPE html>
<html><head><title>Login</title></head>
<body>
<form id="login-form">
  <label for="username">User name</label>
  <input id="username" name="username" type="text" value="alice">
  <input type="password" name="password" placeholder="Password" value="hunter2">
  <input type="hidden" name="api_token" value="tok-SECRET-42">
  <button data-testid="submit-btn" type="submit">Sign in</button>
</form>
</body></html>"#
        .to_string();
    document
}
