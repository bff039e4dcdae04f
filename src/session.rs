//! Run orchestration for both modes.
//!
//! A [`RunContext`] carries the run's identity, artifact store and
//! configuration into every step; nothing here reads process-global state.
//! Both entry points return a [`RunState`] instead of an error so the caller
//! can always finalize `meta.json`.

use crate::artifacts::{ArtifactPaths, ArtifactStore};
use crate::browser::{BrowserEvent, PageHandle, RawAction};
use crate::capture::{capture_navigation, capture_screenshot, PageRegistry};
use crate::config::CaptureConfig;
use crate::dom::PageSignals;
use crate::error::{CaptureError, Result};
use crate::extract::{ElementExtractor, ElementRecord};
use crate::food::FoodDocument;
use crate::mask::SensitiveValueMasker;
use crate::recorder::{ActionEvent, ActionRecorder};
use crate::retry::run_with_retry;
use crate::run_id::RunIdentity;
use crate::summary::{RunState, RunSummaryWriter};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Everything one run owns.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub identity: RunIdentity,
    pub store: ArtifactStore,
    pub config: CaptureConfig,
    pub target_url: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(
        identity: RunIdentity,
        store: ArtifactStore,
        config: CaptureConfig,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            started_at: identity.created_at,
            identity,
            store,
            config,
            target_url: target_url.into(),
        }
    }

    /// Generate a run id and lay out its directories.
    ///
    /// If the layout fails after the run root was created, a failed
    /// `meta.json` is left there before the error is returned.
    pub fn create(config: CaptureConfig, target_url: impl Into<String>) -> Result<Self> {
        let identity = RunIdentity::generate()?;
        let target_url = target_url.into();
        match ArtifactStore::create_layout(&config.artifacts_dir, identity.as_str()) {
            Ok(store) => Ok(Self::new(identity, store, config, target_url)),
            Err(e) => {
                let paths = ArtifactPaths::for_run(&config.artifacts_dir, identity.as_str());
                flag_partial_layout(&paths, &identity, &config, &target_url, &e);
                Err(e)
            }
        }
    }

    pub fn run_id(&self) -> &str {
        self.identity.as_str()
    }

    pub fn masker(&self) -> SensitiveValueMasker {
        SensitiveValueMasker::new(self.config.mask_sensitive)
    }

    pub fn extractor(&self) -> ElementExtractor {
        ElementExtractor::new(self.masker(), self.config.text_preview_len)
    }

    pub fn summary_writer(&self) -> RunSummaryWriter {
        RunSummaryWriter {
            meta_path: self.store.meta_path(),
            run_id: self.run_id().to_string(),
            started_at: self.started_at,
            url: self.target_url.clone(),
            mode: self.config.mode,
            headless: self.config.effective_headless(),
            mask_sensitive: self.config.mask_sensitive,
        }
    }

    fn food_document(&self) -> FoodDocument {
        FoodDocument::new(self.run_id(), &self.target_url, self.config.mode)
    }
}

fn flag_partial_layout(
    paths: &ArtifactPaths,
    identity: &RunIdentity,
    config: &CaptureConfig,
    target_url: &str,
    error: &CaptureError,
) {
    if !paths.root.is_dir() {
        return;
    }
    let writer = RunSummaryWriter {
        meta_path: paths.meta_path(),
        run_id: identity.as_str().to_string(),
        started_at: identity.created_at,
        url: target_url.to_string(),
        mode: config.mode,
        headless: config.effective_headless(),
        mask_sensitive: config.mask_sensitive,
    };
    if let Err(e) = writer.finalize(RunState::failed(error)) {
        log::warn!("Could not flag failed run {}: {}", identity.as_str(), e);
    }
}

// ===== SNAPSHOT =====

/// Load the target once, capture it, extract, write `food.json`.
pub async fn run_snapshot<P: PageHandle + ?Sized>(ctx: &RunContext, page: &P) -> RunState {
    let mut state = RunState::default();
    if let Err(e) = snapshot_inner(ctx, page, &mut state).await {
        log::error!("❌ Snapshot error: {}", e);
        state.fatal_error = Some(e.to_string());
    }
    state
}

/// [`run_snapshot`], abandoned as soon as `shutdown` fires.
///
/// An abandoned snapshot is reported as interrupted and never successful;
/// the caller still finalizes `meta.json` from the returned state.
pub async fn run_snapshot_until<P: PageHandle + ?Sized>(
    ctx: &RunContext,
    page: &P,
    shutdown: &CancellationToken,
) -> RunState {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            log::warn!("Snapshot interrupted before it completed");
            RunState::interrupted("Interrupted before the snapshot completed")
        }
        state = run_snapshot(ctx, page) => state,
    }
}

async fn snapshot_inner<P: PageHandle + ?Sized>(
    ctx: &RunContext,
    page: &P,
    state: &mut RunState,
) -> Result<()> {
    log::info!("Starting snapshot of: {}", ctx.target_url);
    run_with_retry(&ctx.config.retry, "navigate", || page.goto(&ctx.target_url)).await?;

    if let Err(e) = page.wait_until_ready(ctx.config.navigation_timeout).await {
        log::warn!("Document not ready: {}", e);
    }
    if !ctx.config.settle_delay.is_zero() {
        tokio::time::sleep(ctx.config.settle_delay).await;
    }

    let url = page.current_url().await?;
    let mut registry = PageRegistry::new();
    let capture = capture_navigation(page, &ctx.store, &mut registry, &ctx.masker(), &url).await?;

    let mut food = ctx.food_document();
    match ctx.extractor().extract(page, capture.page_id).await {
        Ok(extraction) => {
            state.warnings.extend(extraction.truncation_warning(capture.page_id));
            food.page_signals = extraction.page_signals;
            food.elements = extraction.elements;
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e @ CaptureError::ExtractionEmpty { .. }) => state.warn(e.to_string()),
        Err(e) => state.warn(format!("Could not extract elements: {}", e)),
    }

    state.pages_count = registry.len();
    state.elements_count = food.elements.len();
    state.extraction_viable = !food.elements.is_empty();

    food.pages_visited = registry.into_visits();
    food.write(&ctx.store)
}

// ===== INTERACT =====

#[derive(Default)]
struct SessionState {
    registry: PageRegistry,
    elements: Vec<ElementRecord>,
    signals: PageSignals,
    /// Page id of the page on screen
    current: Option<u32>,
    warnings: Vec<String>,
    fatal: Option<String>,
}

struct InteractSession<P: ?Sized> {
    store: ArtifactStore,
    masker: SensitiveValueMasker,
    extractor: ElementExtractor,
    navigation_timeout: Duration,
    recorder: ActionRecorder,
    shutdown: CancellationToken,
    state: Mutex<SessionState>,
    page: Arc<P>,
}

/// Record a headed session until `shutdown` fires or the event stream ends.
///
/// Runs the periodic screenshot task beside the event consumer. On shutdown
/// the task finishes its current write, events already queued are drained
/// into the log, a closing screenshot is taken and `food.json` is written.
pub async fn run_interact<P>(
    ctx: &RunContext,
    page: Arc<P>,
    mut events: mpsc::Receiver<BrowserEvent>,
    shutdown: CancellationToken,
) -> RunState
where
    P: PageHandle + ?Sized + 'static,
{
    let recorder = match ActionRecorder::open(&ctx.store.actions_log_path()) {
        Ok(recorder) => recorder,
        Err(e) => {
            log::error!("❌ Cannot open action log: {}", e);
            return RunState::failed(e);
        }
    };

    let session = Arc::new(InteractSession {
        store: ctx.store.clone(),
        masker: ctx.masker(),
        extractor: ctx.extractor(),
        navigation_timeout: ctx.config.navigation_timeout,
        recorder,
        shutdown: shutdown.clone(),
        state: Mutex::new(SessionState::default()),
        page: Arc::clone(&page),
    });

    match run_with_retry(&ctx.config.retry, "navigate", || page.goto(&ctx.target_url)).await {
        Ok(()) => {
            let url = page
                .current_url()
                .await
                .unwrap_or_else(|_| ctx.target_url.clone());
            session.on_navigation(&url).await;
        }
        Err(e) => {
            session.state.lock().await.fatal = Some(e.to_string());
            shutdown.cancel();
        }
    }

    let tracker = TaskTracker::new();
    if !ctx.config.screenshot_interval.is_zero() {
        tracker.spawn(periodic_screenshots(
            Arc::clone(&session),
            shutdown.clone(),
            ctx.config.screenshot_interval,
        ));
    }
    tracker.close();

    log::info!("Waiting for interactions...");
    let interrupted = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break true,
            event = events.recv() => match event {
                Some(event) => session.handle(event).await,
                None => {
                    log::info!("Browser closed by user.");
                    break false;
                }
            }
        }
    };

    shutdown.cancel();
    tracker.wait().await;

    let mut drained = 0;
    while let Ok(event) = events.try_recv() {
        session.handle(event).await;
        drained += 1;
    }
    if drained > 0 {
        log::debug!("Drained {} queued events after shutdown", drained);
    }

    session.closing_screenshot().await;
    session.finish(ctx, interrupted).await
}

async fn periodic_screenshots<P>(
    session: Arc<InteractSession<P>>,
    shutdown: CancellationToken,
    period: Duration,
) where
    P: PageHandle + ?Sized + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => session.screenshot_current("Periodic screenshot").await,
        }
    }
    log::debug!("Periodic screenshots stopped");
}

fn is_internal_url(url: &str) -> bool {
    ["about:", "chrome:", "chrome-error:", "devtools:", "data:"]
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

impl<P: PageHandle + ?Sized> InteractSession<P> {
    async fn handle(&self, event: BrowserEvent) {
        match event {
            BrowserEvent::Navigated { url } => self.on_navigation(&url).await,
            BrowserEvent::Action(raw) => self.on_action(raw).await,
        }
    }

    async fn on_navigation(&self, url: &str) {
        if is_internal_url(url) {
            return;
        }

        let mut st = self.state.lock().await;
        log::info!("Navigation detected: {}", url);

        if let Err(e) = self.page.wait_until_ready(self.navigation_timeout).await {
            log::debug!("Document not ready after navigation: {}", e);
        }

        let capture = match capture_navigation(
            &*self.page,
            &self.store,
            &mut st.registry,
            &self.masker,
            url,
        )
        .await
        {
            Ok(capture) => capture,
            Err(e) => {
                self.record_error(&mut st, "Navigation capture failed", e);
                return;
            }
        };
        st.current = Some(capture.page_id);

        if capture.is_new {
            match self.extractor.extract(&*self.page, capture.page_id).await {
                Ok(extraction) => {
                    st.warnings
                        .extend(extraction.truncation_warning(capture.page_id));
                    let signals = extraction.page_signals;
                    st.signals.has_data_testid |= signals.has_data_testid;
                    st.signals.has_aria_roles |= signals.has_aria_roles;
                    st.signals.likely_spa |= signals.likely_spa;
                    st.elements.extend(extraction.elements);
                }
                Err(e) => self.record_error(&mut st, "Extraction", e),
            }
        }

        let event = ActionEvent::navigate(url, capture.page_id, Utc::now());
        if let Err(e) = self.recorder.append(&event) {
            self.record_error(&mut st, "Error recording navigation", e);
        }
    }

    async fn on_action(&self, raw: RawAction) {
        let mut st = self.state.lock().await;
        let page_id = st
            .registry
            .lookup(&raw.url)
            .or(st.current);

        if let Some(event) = ActionEvent::from_raw(raw, page_id, &self.masker) {
            if let Err(e) = self.recorder.append(&event) {
                self.record_error(&mut st, "Error recording action", e);
            }
        }
    }

    async fn screenshot_current(&self, what: &str) {
        let mut st = self.state.lock().await;
        let Some(page_id) = st.current else {
            return;
        };
        if let Err(e) = capture_screenshot(&*self.page, &self.store, page_id).await {
            if e.is_fatal() {
                self.record_error(&mut st, what, e);
            } else {
                log::warn!("{} failed: {}", what, e);
            }
        }
    }

    async fn closing_screenshot(&self) {
        log::info!("📸 Closing screenshot...");
        self.screenshot_current("Closing screenshot").await;
    }

    /// Fatal errors end the session; the rest become summary warnings.
    fn record_error(&self, st: &mut SessionState, context: &str, e: CaptureError) {
        if e.is_fatal() {
            log::error!("❌ {}: {}", context, e);
            if st.fatal.is_none() {
                st.fatal = Some(e.to_string());
            }
            self.shutdown.cancel();
        } else {
            let warning = match e {
                CaptureError::ExtractionEmpty { .. } => e.to_string(),
                _ => format!("{}: {}", context, e),
            };
            log::warn!("{}", warning);
            st.warnings.push(warning);
        }
    }

    async fn finish(&self, ctx: &RunContext, interrupted: bool) -> RunState {
        let mut st = self.state.lock().await;

        if let Err(e) = self.recorder.finish() {
            self.record_error(&mut st, "Closing action log", e);
        }

        let mut action_summary = self.recorder.summary();
        action_summary.total_pages = st.registry.len();

        let mut food = ctx.food_document();
        food.pages_visited = st.registry.visits().to_vec();
        food.page_signals = st.signals.clone();
        food.elements = std::mem::take(&mut st.elements);
        food.action_summary = Some(action_summary);
        food.error = st.fatal.clone();

        if let Err(e) = food.write(&ctx.store) {
            self.record_error(&mut st, "Writing food.json", e);
        }

        let interrupted = interrupted && st.fatal.is_none();
        RunState {
            elements_count: food.elements.len(),
            pages_count: st.registry.len(),
            actions_count: self.recorder.count(),
            extraction_viable: !food.elements.is_empty(),
            fatal_error: st.fatal.take(),
            interrupted,
            warnings: std::mem::take(&mut st.warnings),
        }
    }
}
