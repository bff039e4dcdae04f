//! Meta/Infrastructure Tests
//!
//! These tests verify that our testing infrastructure itself works correctly.
//! They test the test utilities, not the capture engine.
//!
//! - Test server functionality
//! - The in-memory page used by the session tests

mod fake_page;

use fake_page::{login_page, FakePage};
use gen_food::browser::PageHandle;
use test_server::TestServer;

/// Meta test: Verify test server starts on a random port
#[tokio::test]
async fn meta_test_server_starts() {
    let server = TestServer::start().await;
    assert!(server.addr().port() > 0);
    println!("✅ Test server running on: {}", server.url());
}

/// Meta test: Verify test server serves the login fixture
#[tokio::test]
async fn meta_test_server_serves_login_form() {
    let server = TestServer::start().await;
    server
        .wait_ready()
        .await
        .expect("Server failed to become ready");

    let body = reqwest::get(&server.url()).await.unwrap().text().await.unwrap();
    assert!(body.contains("data-testid=\"submit-btn\""));
    assert!(body.contains("type=\"password\""));

    let home = reqwest::get(format!("{}/home", server.url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(home.contains("<title>Home</title>"));
}

/// Meta test: Verify multiple test servers get different ports for isolation
#[tokio::test]
async fn meta_test_multiple_servers_different_ports() {
    let server1 = TestServer::start().await;
    let server2 = TestServer::start().await;
    assert_ne!(server1.addr().port(), server2.addr().port());
}

/// Meta test: FakePage only serves what it was given
#[tokio::test]
async fn meta_test_fake_page_navigation() {
    let page = FakePage::new().with_document(login_page("http://fake/login"));

    assert!(page.goto("http://fake/other").await.is_err());
    page.goto("http://fake/login").await.unwrap();
    assert_eq!(page.current_url().await.unwrap(), "http://fake/login");
    assert_eq!(page.title().await.unwrap(), "Login");
    assert!(page.dom_snapshot().await.unwrap().signals().has_data_testid);
    assert_eq!(page.goto_calls(), 2);
}
