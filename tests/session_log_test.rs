//! The session log is tee'd into the run directory and closed before
//! `meta.json` lands. Kept in its own binary so it owns the global logger.

mod fake_page;

use fake_page::{login_page, FakePage};
use gen_food::logging;
use gen_food::retry::RetryPolicy;
use gen_food::session::{run_snapshot, RunContext};
use gen_food::CaptureConfig;
use std::time::Duration;
use tempfile::TempDir;

const LOGIN_URL: &str = "http://localhost:8080/login";

#[tokio::test]
async fn test_meta_is_written_after_last_log_line() -> anyhow::Result<()> {
    let log_file = logging::init();
    let artifacts = TempDir::new()?;
    let config = CaptureConfig {
        artifacts_dir: artifacts.path().to_path_buf(),
        settle_delay: Duration::ZERO,
        retry: RetryPolicy::none(),
        ..Default::default()
    };
    let ctx = RunContext::create(config, LOGIN_URL)?;
    log_file.attach(&ctx.store.log_path())?;

    let page = FakePage::new().with_document(login_page(LOGIN_URL));
    let state = run_snapshot(&ctx, &page).await;
    let summary = ctx.summary_writer().finalize(state)?;
    log_file.detach();
    assert!(summary.result.success);

    let session_log = std::fs::read_to_string(ctx.store.log_path())?;
    let last = session_log.lines().last().unwrap_or_default();
    assert!(last.contains("finished: success"), "last line was {:?}", last);

    let log_modified = std::fs::metadata(ctx.store.log_path())?.modified()?;
    let meta_modified = std::fs::metadata(ctx.store.meta_path())?.modified()?;
    assert!(log_modified <= meta_modified);

    Ok(())
}
