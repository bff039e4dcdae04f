use clap::{Parser, Subcommand};
use gen_food::browser::{ChromeDriver, EVENT_CHANNEL_CAPACITY};
use gen_food::logging::{self, LogFile};
use gen_food::retry::RetryPolicy;
use gen_food::run_id::RunIdentity;
use gen_food::session::{run_interact, run_snapshot_until, RunContext};
use gen_food::summary::RunState;
use gen_food::{ArtifactStore, CaptureConfig, RunMode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Page to capture
    #[arg(long, env = "BASE_URL")]
    url: Option<String>,

    /// Parent directory of runs/
    #[arg(long, env = "ARTIFACTS_DIR", default_value = "./artifacts")]
    artifacts_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = RunMode::Snapshot)]
    mode: RunMode,

    /// Run Chrome without a window (snapshot mode only)
    #[arg(long)]
    headless: bool,

    /// Record sensitive field values in clear text
    #[arg(long)]
    no_mask: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Launch Chrome with --no-sandbox (Linux AppArmor workaround)
    #[arg(long)]
    no_sandbox: bool,

    /// Seconds between background screenshots in interact mode (0 disables)
    #[arg(long, default_value_t = 5)]
    screenshot_interval_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the effective configuration and check that a run layout can be created
    Doctor,
}

impl Args {
    fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            artifacts_dir: self.artifacts_dir.clone(),
            mode: self.mode,
            headless: self.headless,
            mask_sensitive: !self.no_mask,
            screenshot_interval: Duration::from_secs(self.screenshot_interval_secs),
            chrome_path: self.chrome_path.clone(),
            no_sandbox: self.no_sandbox,
            retry: RetryPolicy::default(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let log_file = logging::init();
    let args = Args::parse();
    let config = args.capture_config();

    match (args.command, args.url) {
        (Some(Command::Doctor), url) => doctor(&config, url.as_deref()),
        (None, Some(url)) => capture(config, url, &log_file).await,
        (None, None) => {
            log::error!("❌ No target URL. Pass --url or set BASE_URL.");
            ExitCode::from(2)
        }
    }
}

async fn capture(config: CaptureConfig, url: String, log_file: &LogFile) -> ExitCode {
    let ctx = match RunContext::create(config, url) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("❌ Cannot start run: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // The run directory exists from here on, so an interrupt must still
    // reach finalize instead of killing the process.
    let shutdown = CancellationToken::new();
    let ctrl_c = {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, finishing run...");
                token.cancel();
            }
        })
    };

    if let Err(e) = log_file.attach(&ctx.store.log_path()) {
        log::warn!("Session log unavailable: {}", e);
    }

    log::info!("Run ID: {}", ctx.run_id());
    log::info!("Artifacts: {}", ctx.store.root().display());
    log::info!("Mode: {} | URL: {}", ctx.config.mode, ctx.target_url);

    if !ctx.config.mask_sensitive {
        log::warn!("==================================================");
        log::warn!("Sensitive value masking is DISABLED.");
        log::warn!("Passwords and tokens typed during this run will be");
        log::warn!("written to food.json and actions.ndjson in clear text.");
        log::warn!("==================================================");
    }
    if ctx.config.headless && ctx.config.mode == RunMode::Interact {
        log::warn!("Interact mode needs a visible browser; ignoring --headless");
    }

    let state = run(&ctx, &shutdown).await;
    ctrl_c.abort();

    let finalized = ctx.summary_writer().finalize(state);
    log_file.detach();
    match finalized {
        Ok(summary) if summary.result.success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("❌ Could not write run summary: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(ctx: &RunContext, shutdown: &CancellationToken) -> RunState {
    let launched = tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        launched = ChromeDriver::launch(&ctx.config) => Some(launched),
    };
    let driver = match launched {
        None => return RunState::interrupted("Interrupted while launching Chrome"),
        Some(Ok(driver)) => driver,
        Some(Err(e)) => {
            log::error!("❌ {}", e);
            return RunState::failed(e);
        }
    };

    match ctx.config.mode {
        RunMode::Snapshot => {
            let state = run_snapshot_until(ctx, &driver, shutdown).await;
            close_browser(driver).await;
            state
        }
        RunMode::Interact => interact(ctx, driver, shutdown.clone()).await,
    }
}

async fn interact(ctx: &RunContext, driver: ChromeDriver, shutdown: CancellationToken) -> RunState {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let driver = Arc::new(driver);

    let bridge = tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        bridge = driver.start_event_bridge(tx) => Some(bridge),
    };
    let state = match bridge {
        None => RunState::interrupted("Interrupted while attaching to the page"),
        Some(Ok(bridge)) => {
            log::info!("Browser is open. Interact with the page; press Ctrl+C to finish.");
            let state = run_interact(ctx, Arc::clone(&driver), rx, shutdown).await;
            bridge.abort();
            state
        }
        Some(Err(e)) => {
            log::error!("❌ Cannot attach to the page: {}", e);
            RunState::failed(e)
        }
    };

    if let Ok(driver) = Arc::try_unwrap(driver) {
        close_browser(driver).await;
    }
    state
}

async fn close_browser(driver: ChromeDriver) {
    if let Err(e) = driver.close().await {
        // Expected when the user already closed the window
        log::debug!("Browser close: {}", e);
    }
}

fn doctor(config: &CaptureConfig, url: Option<&str>) -> ExitCode {
    println!("gen-food doctor");
    println!("  url:                 {}", url.unwrap_or("(not set)"));
    println!("  artifacts_dir:       {}", config.artifacts_dir.display());
    println!("  mode:                {}", config.mode);
    println!("  headless:            {}", config.effective_headless());
    println!("  mask_sensitive:      {}", config.mask_sensitive);
    println!(
        "  screenshot_interval: {}s",
        config.screenshot_interval.as_secs()
    );
    println!(
        "  chrome_path:         {}",
        config
            .chrome_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(auto)".to_string())
    );

    let layout = RunIdentity::generate()
        .and_then(|id| ArtifactStore::create_layout(&config.artifacts_dir, id.as_str()));
    let store = match layout {
        Ok(store) => store,
        Err(e) => {
            println!("  ✗ cannot create run layout: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Run layout:");
    let mut ok = true;
    for (name, path) in store.paths().entries() {
        let exists = path.is_dir();
        ok &= exists;
        println!(
            "  {} {:<12} {}",
            if exists { "✓" } else { "✗" },
            name,
            path.display()
        );
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
