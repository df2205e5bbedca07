//! eBay Trading API adapter against a local HTTP responder

mod common;

use common::{fast_settings, serve, Captured, Reply};
use libcrosspost::manager::AutomationManager;
use libcrosspost::platforms::ebay::EbayAdapter;
use libcrosspost::session::mock::{ScriptedLauncher, ScriptedPage};
use libcrosspost::state::DEFAULT_RETRY_AFTER;
use libcrosspost::types::{AdData, Credentials, PostStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const OK_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AddItemResponse xmlns="urn:ebay:apis:eBLBaseComponents">
  <Timestamp>2024-05-01T12:00:00.000Z</Timestamp>
  <Ack>Success</Ack>
  <Version>967</Version>
  <ItemID>110554567890</ItemID>
</AddItemResponse>"#;

fn failure(code: &str, long_message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<AddItemResponse xmlns="urn:ebay:apis:eBLBaseComponents">
  <Ack>Failure</Ack>
  <Errors>
    <ShortMessage>Request failed</ShortMessage>
    <LongMessage>{}</LongMessage>
    <ErrorCode>{}</ErrorCode>
    <SeverityCode>Error</SeverityCode>
  </Errors>
</AddItemResponse>"#,
        long_message, code
    )
}

fn ad() -> AdData {
    AdData::new(
        "Nikon F3 film camera",
        "Body only, meter works",
        245.5,
        "electronics",
        "Tempe, AZ 85281",
    )
}

fn api_credentials() -> Credentials {
    Credentials::new("seller", "unused")
        .with_extra("app_id", "APP-123")
        .with_extra("dev_id", "DEV-456")
        .with_extra("cert_id", "CERT-789")
        .with_extra("user_token", "TOKEN&abc")
}

async fn adapter_for(reply: Reply) -> (EbayAdapter, UnboundedReceiver<Captured>, TempDir) {
    let (base, requests) = serve(move |_| reply.clone()).await;
    let temp = TempDir::new().unwrap();
    let adapter = EbayAdapter::new(fast_settings(temp.path()), format!("{}/ws/api.dll", base)).unwrap();
    (adapter, requests, temp)
}

fn manager_with(adapter: EbayAdapter) -> (AutomationManager, Arc<ScriptedLauncher>) {
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedPage::new()));
    let mut manager = AutomationManager::new(launcher.clone());
    manager.register_platform(Arc::new(adapter));
    (manager, launcher)
}

#[tokio::test]
async fn test_validate_then_add_item() {
    let (adapter, mut requests, _temp) = adapter_for(Reply::ok(OK_RESPONSE)).await;
    let (manager, launcher) = manager_with(adapter);

    let result = manager.post_to_platform("ebay", &ad(), &api_credentials()).await;

    assert_eq!(result.status, PostStatus::Success, "{:?}", result.message);
    assert_eq!(result.platform_ad_id.as_deref(), Some("110554567890"));
    assert_eq!(
        result.post_url.as_deref(),
        Some("https://www.ebay.com/itm/110554567890")
    );
    assert_eq!(
        result.message.as_deref(),
        Some("Successfully listed on eBay with ID: 110554567890")
    );
    // API adapters never open a browser
    assert_eq!(launcher.launch_count(), 0);

    let validate = requests.recv().await.unwrap();
    assert!(validate.request_line.starts_with("POST /ws/api.dll"));
    assert_eq!(validate.header("X-EBAY-API-CALL-NAME"), Some("GeteBayOfficialTime"));
    assert_eq!(validate.header("X-EBAY-API-COMPATIBILITY-LEVEL"), Some("967"));
    assert_eq!(validate.header("X-EBAY-API-SITEID"), Some("0"));
    assert_eq!(validate.header("X-EBAY-API-APP-NAME"), Some("APP-123"));
    assert!(validate.body.contains("<eBayAuthToken>TOKEN&amp;abc</eBayAuthToken>"));

    let add = requests.recv().await.unwrap();
    assert_eq!(add.header("X-EBAY-API-CALL-NAME"), Some("AddItem"));
    assert!(add.body.starts_with("<?xml"));
    assert!(add.body.contains("<AddItemRequest"));
    assert!(add.body.contains("<StartPrice currencyID=\"USD\">245.50</StartPrice>"));
    assert!(add.body.contains("<PostalCode>85281</PostalCode>"));
    assert!(add.body.contains("<ListingDuration>GTC</ListingDuration>"));
}

#[tokio::test]
async fn test_throttle_spaces_api_calls_only() {
    let (base, _requests) = serve(|_| Reply::ok(OK_RESPONSE)).await;
    let temp = TempDir::new().unwrap();
    let mut settings = fast_settings(temp.path());
    settings.requests_per_second = 2.0;
    let adapter = EbayAdapter::new(settings, format!("{}/ws/api.dll", base)).unwrap();
    let (manager, _launcher) = manager_with(adapter);

    let start = std::time::Instant::now();
    let result = manager.post_to_platform("ebay", &ad(), &api_credentials()).await;
    let elapsed = start.elapsed();

    // Two API calls at 2 req/s: one 500ms gap, no extra slot for the attempt itself
    assert_eq!(result.status, PostStatus::Success, "{:?}", result.message);
    assert!(elapsed >= Duration::from_millis(400), "finished after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(900), "finished after {:?}", elapsed);
}

#[tokio::test]
async fn test_rejected_listing_keeps_ebay_code() {
    let (adapter, _requests, _temp) =
        adapter_for(Reply::ok(failure("240", "The title may contain improper words."))).await;

    let result = adapter.add_item(&ad(), &api_credentials()).await;

    assert_eq!(result.status, PostStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some("240"));
    assert_eq!(
        result.message.as_deref(),
        Some("eBay listing failed: The title may contain improper words.")
    );
}

#[tokio::test]
async fn test_auth_error_code_requires_login() {
    let (adapter, _requests, _temp) =
        adapter_for(Reply::ok(failure("931", "Auth token is invalid."))).await;

    let result = adapter.add_item(&ad(), &api_credentials()).await;
    assert_eq!(result.status, PostStatus::LoginRequired);
}

#[tokio::test]
async fn test_http_401_rejects_credentials() {
    let (adapter, mut requests, _temp) = adapter_for(Reply::status(401)).await;
    let (manager, _) = manager_with(adapter);

    let result = manager.post_to_platform("ebay", &ad(), &api_credentials()).await;

    assert_eq!(result.status, PostStatus::LoginRequired);
    assert_eq!(result.message.as_deref(), Some("Invalid credentials"));
    let only = requests.recv().await.unwrap();
    assert_eq!(only.header("X-EBAY-API-CALL-NAME"), Some("GeteBayOfficialTime"));
    assert!(requests.try_recv().is_err(), "AddItem never sent");
}

#[tokio::test]
async fn test_http_429_honours_retry_after() {
    let (adapter, _requests, _temp) =
        adapter_for(Reply::status(429).header("Retry-After", "120")).await;
    let (manager, _) = manager_with(adapter);

    let result = manager.post_to_platform("ebay", &ad(), &api_credentials()).await;

    assert_eq!(result.status, PostStatus::RateLimited);
    assert_eq!(result.retry_after, Some(Duration::from_secs(120)));
    assert!(manager.state("ebay").unwrap().is_rate_limited());
}

#[tokio::test]
async fn test_usage_limit_without_header_uses_default_window() {
    let (adapter, _requests, _temp) =
        adapter_for(Reply::ok(failure("518", "Your application has exceeded usage limit."))).await;
    let (manager, _) = manager_with(adapter);

    let result = manager.post_to_platform("ebay", &ad(), &api_credentials()).await;

    assert_eq!(result.status, PostStatus::RateLimited);
    assert_eq!(result.retry_after, Some(DEFAULT_RETRY_AFTER));
}

#[tokio::test]
async fn test_server_error_and_garbage_body() {
    let (adapter, _requests, _temp) = adapter_for(Reply::status(500)).await;
    let result = adapter.add_item(&ad(), &api_credentials()).await;
    assert_eq!(result.status, PostStatus::Failed);
    assert_eq!(result.message.as_deref(), Some("eBay API error: HTTP 500"));

    let (adapter, _requests, _temp) = adapter_for(Reply::ok("<html>maintenance</html>")).await;
    let result = adapter.add_item(&ad(), &api_credentials()).await;
    assert_eq!(result.message.as_deref(), Some("Malformed eBay API response"));
}

#[tokio::test]
async fn test_missing_keys_never_hit_the_api() {
    let (adapter, mut requests, _temp) = adapter_for(Reply::ok(OK_RESPONSE)).await;

    let partial = Credentials::new("seller", "pw").with_extra("app_id", "APP-123");
    let result = adapter.add_item(&ad(), &partial).await;

    assert_eq!(result.status, PostStatus::LoginRequired);
    assert_eq!(
        result.message.as_deref(),
        Some("Missing eBay API credentials: dev_id, cert_id, user_token")
    );
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn test_revise_and_end_item() {
    let (adapter, mut requests, _temp) = adapter_for(Reply::ok(OK_RESPONSE)).await;

    let revised = adapter
        .revise_item("110554567890", &ad(), &api_credentials())
        .await;
    assert!(revised.is_success());
    let request = requests.recv().await.unwrap();
    assert_eq!(request.header("X-EBAY-API-CALL-NAME"), Some("ReviseItem"));
    assert!(request.body.contains("<ItemID>110554567890</ItemID>"));

    let ended = adapter.end_item("110554567890", &api_credentials()).await;
    assert!(ended.is_success());
    let request = requests.recv().await.unwrap();
    assert_eq!(request.header("X-EBAY-API-CALL-NAME"), Some("EndItem"));
    assert!(request.body.contains("<EndingReason>NotAvailable</EndingReason>"));
}
