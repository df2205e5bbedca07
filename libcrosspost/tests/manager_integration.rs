//! Integration tests for AutomationManager
//!
//! These drive the manager with mock adapters and a scripted launcher, so no
//! browser or network is involved.

use libcrosspost::manager::AutomationManager;
use libcrosspost::platforms::mock::{MockAdapter, MockConfig, MockOutcome};
use libcrosspost::platforms::StepError;
use libcrosspost::session::mock::{ScriptedLauncher, ScriptedPage};
use libcrosspost::types::{error_codes, AdData, Credentials, PostResult, PostStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ad() -> AdData {
    AdData::new(
        "Mid-century armchair",
        "Walnut frame, new upholstery",
        180.0,
        "furniture",
        "Phoenix, AZ",
    )
}

fn creds() -> Credentials {
    Credentials::new("seller", "hunter2")
}

fn launcher() -> Arc<ScriptedLauncher> {
    Arc::new(ScriptedLauncher::new(ScriptedPage::new()))
}

#[tokio::test]
async fn test_unknown_platform_is_reported_not_raised() {
    let launcher = launcher();
    let manager = AutomationManager::new(launcher.clone());

    let result = manager.post_to_platform("myspace", &ad(), &creds()).await;

    assert_eq!(result.status, PostStatus::Failed);
    assert_eq!(result.message.as_deref(), Some("Platform myspace not supported"));
    assert_eq!(result.error_code.as_deref(), Some(error_codes::UNSUPPORTED_PLATFORM));
    assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test]
async fn test_blocked_platform_fails_fast() {
    let launcher = launcher();
    let mut manager = AutomationManager::new(launcher.clone());
    let mock = Arc::new(MockAdapter::responding(
        "mock",
        PostResult::rate_limited(Some(Duration::from_secs(60)), "Too many listings"),
    ));
    manager.register_platform(mock.clone());

    let first = manager.post_to_platform("mock", &ad(), &creds()).await;
    assert_eq!(first.status, PostStatus::RateLimited);
    assert_eq!(first.retry_after, Some(Duration::from_secs(60)));
    assert_eq!(launcher.launch_count(), 1);

    let second = manager.post_to_platform("mock", &ad(), &creds()).await;
    assert_eq!(second.status, PostStatus::RateLimited);
    assert_eq!(second.message.as_deref(), Some("Platform is rate limited"));
    let remaining = second.retry_after.expect("blocked result carries retry_after");
    assert!(remaining > Duration::ZERO && remaining <= Duration::from_secs(60));

    // No session and no adapter call for the blocked attempt
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(mock.post_call_count(), 1);
    assert_eq!(mock.login_call_count(), 1);

    let state = manager.state("mock").unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.is_rate_limited());
}

#[tokio::test]
async fn test_state_tracks_success_and_failure() {
    let mut manager = AutomationManager::new(launcher());
    manager.register_platform(Arc::new(MockAdapter::success("good")));
    manager.register_platform(Arc::new(MockAdapter::responding(
        "bad",
        PostResult::failed("Posting failed: Price is required"),
    )));

    for _ in 0..2 {
        manager.post_to_platform("bad", &ad(), &creds()).await;
    }
    let result = manager.post_to_platform("good", &ad(), &creds()).await;
    assert!(result.is_success());
    assert_eq!(result.platform_ad_id.as_deref(), Some("good_1"));

    let good = manager.state("good").unwrap();
    assert_eq!(good.consecutive_failures, 0);
    assert!(good.last_success.is_some());
    assert!(good.blocked_until.is_none());

    let bad = manager.state("bad").unwrap();
    assert_eq!(bad.consecutive_failures, 2);
    assert_eq!(bad.version, 2);
    assert!(bad.last_success.is_none());
}

#[tokio::test]
async fn test_success_resets_failure_streak() {
    let mut manager = AutomationManager::new(launcher());
    manager.register_platform(Arc::new(MockAdapter::rejecting_login("flaky")));
    manager.post_to_platform("flaky", &ad(), &creds()).await;
    assert_eq!(manager.state("flaky").unwrap().consecutive_failures, 1);

    manager.register_platform(Arc::new(MockAdapter::success("flaky")));
    let state = manager.state("flaky").unwrap();
    assert_eq!(state.consecutive_failures, 0, "re-registration starts clean");

    manager.post_to_platform("flaky", &ad(), &creds()).await;
    assert!(manager.state("flaky").unwrap().last_success.is_some());
}

#[tokio::test]
async fn test_panic_in_one_adapter_does_not_affect_others() {
    let launcher = launcher();
    let mut manager = AutomationManager::new(launcher.clone());
    manager.register_platform(Arc::new(MockAdapter::panicking("mock-a", "selector table exploded")));
    let b = Arc::new(MockAdapter::success("mock-b"));
    manager.register_platform(b.clone());

    let platforms = vec!["mock-a".to_string(), "mock-b".to_string()];
    let mut credentials = HashMap::new();
    credentials.insert("mock-a".to_string(), creds());
    credentials.insert("mock-b".to_string(), creds());

    let results = manager
        .post_to_multiple_platforms(&platforms, &ad(), &credentials)
        .await;

    assert_eq!(results.len(), 2);
    let a = &results["mock-a"];
    assert_eq!(a.status, PostStatus::Failed);
    assert_eq!(a.error_code.as_deref(), Some(error_codes::AUTOMATION_ERROR));
    assert_eq!(
        a.message.as_deref(),
        Some("Automation error: selector table exploded")
    );
    assert!(results["mock-b"].is_success());
    assert_eq!(b.posted_titles(), vec!["Mid-century armchair".to_string()]);

    // Both sessions closed, including the one whose adapter panicked
    assert_eq!(launcher.launch_count(), 2);
    assert_eq!(launcher.total_closes(), 2);
    assert_eq!(manager.state("mock-a").unwrap().consecutive_failures, 1);
}

#[tokio::test]
async fn test_session_closed_after_every_outcome() {
    let launcher = launcher();
    let mut manager = AutomationManager::new(launcher.clone());
    manager.register_platform(Arc::new(MockAdapter::success("ok")));
    manager.register_platform(Arc::new(MockAdapter::rejecting_login("nologin")));
    manager.register_platform(Arc::new(MockAdapter::login_error(
        "twofactor",
        StepError::LoginRequired("two-factor verification required".to_string()),
    )));
    manager.register_platform(Arc::new(MockAdapter::panicking("boom", "unexpected DOM")));

    for platform in ["ok", "nologin", "twofactor", "boom"] {
        manager.post_to_platform(platform, &ad(), &creds()).await;
    }

    assert_eq!(launcher.launch_count(), 4);
    assert_eq!(launcher.total_closes(), 4);
    for log in launcher.logs() {
        assert_eq!(log.closes, 1);
    }
}

#[tokio::test]
async fn test_login_step_error_becomes_result() {
    let mut manager = AutomationManager::new(launcher());
    let mock = Arc::new(MockAdapter::login_error(
        "mock",
        StepError::LoginRequired("two-factor verification required".to_string()),
    ));
    manager.register_platform(mock.clone());

    let result = manager.post_to_platform("mock", &ad(), &creds()).await;
    assert_eq!(result.status, PostStatus::LoginRequired);
    assert_eq!(result.message.as_deref(), Some("two-factor verification required"));
    assert_eq!(mock.post_call_count(), 0);
}

#[tokio::test]
async fn test_platforms_without_credentials_are_skipped() {
    let launcher = launcher();
    let mut manager = AutomationManager::new(launcher.clone());
    manager.register_platform(Arc::new(MockAdapter::success("mock-a")));
    let b = Arc::new(MockAdapter::success("mock-b"));
    manager.register_platform(b.clone());

    let platforms = vec![
        "mock-a".to_string(),
        "mock-b".to_string(),
        "mock-a".to_string(),
    ];
    let mut credentials = HashMap::new();
    credentials.insert("mock-a".to_string(), creds());

    let results = manager
        .post_to_multiple_platforms(&platforms, &ad(), &credentials)
        .await;

    assert_eq!(results.len(), 1);
    assert!(results["mock-a"].is_success());
    assert!(!results.contains_key("mock-b"));
    assert_eq!(b.post_call_count(), 0);
    // Duplicate entries post once
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_launcher_failure_is_session_error() {
    let launcher = Arc::new(ScriptedLauncher::failing("chrome not found"));
    let mut manager = AutomationManager::new(launcher.clone());
    let mock = Arc::new(MockAdapter::success("mock"));
    manager.register_platform(mock.clone());

    let result = manager.post_to_platform("mock", &ad(), &creds()).await;

    assert_eq!(result.status, PostStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some(error_codes::SESSION_ERROR));
    assert!(result.message.unwrap().contains("chrome not found"));
    assert_eq!(mock.login_call_count(), 0);
    assert_eq!(manager.state("mock").unwrap().consecutive_failures, 1);
}

#[tokio::test]
async fn test_invalid_ad_rejected_before_launch() {
    let launcher = launcher();
    let mut manager = AutomationManager::new(launcher.clone());
    manager.register_platform(Arc::new(MockAdapter::new(MockConfig {
        name: "short".to_string(),
        outcome: MockOutcome::Succeed,
        title_limit: Some(10),
        ..Default::default()
    })));

    let result = manager.post_to_platform("short", &ad(), &creds()).await;
    assert_eq!(result.status, PostStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some(error_codes::VALIDATION_ERROR));

    let mut untitled = ad();
    untitled.title = "   ".to_string();
    let result = manager.post_to_platform("short", &untitled, &creds()).await;
    assert_eq!(result.error_code.as_deref(), Some(error_codes::VALIDATION_ERROR));

    assert_eq!(launcher.launch_count(), 0);
    assert_eq!(manager.state("short").unwrap().version, 0);
}

#[tokio::test]
async fn test_platforms_are_posted_concurrently() {
    let mut manager = AutomationManager::new(launcher());
    manager.register_platform(Arc::new(MockAdapter::with_delay("slow-a", Duration::from_millis(300))));
    manager.register_platform(Arc::new(MockAdapter::with_delay("slow-b", Duration::from_millis(300))));

    let platforms = vec!["slow-a".to_string(), "slow-b".to_string()];
    let credentials: HashMap<String, Credentials> = platforms
        .iter()
        .map(|p| (p.clone(), creds()))
        .collect();

    let start = Instant::now();
    let results = manager
        .post_to_multiple_platforms(&platforms, &ad(), &credentials)
        .await;

    assert!(results.values().all(PostResult::is_success));
    assert!(
        start.elapsed() < Duration::from_millis(550),
        "took {:?}",
        start.elapsed()
    );
}
