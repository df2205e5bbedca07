//! eBay adapter (Trading API)
//!
//! Unlike the other marketplaces eBay is driven through its XML Trading API,
//! so no browser is launched: the session is a [`DetachedSession`] and
//! "login" is a cheap read-only call (`GeteBayOfficialTime`) made with the
//! API keys carried in the credentials' additional data:
//!
//! | key          | header / element        |
//! |--------------|-------------------------|
//! | `app_id`     | `X-EBAY-API-APP-NAME`   |
//! | `dev_id`     | `X-EBAY-API-DEV-NAME`   |
//! | `cert_id`    | `X-EBAY-API-CERT-NAME`  |
//! | `user_token` | `<eBayAuthToken>`       |
//!
//! Listings are fixed price, good-till-cancelled, with pictures referenced
//! by URL (eBay fetches them itself).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::steps::{map_category, StepError, StepResult};
use super::Adapter;
use crate::config::AdapterSettings;
use crate::error::{PlatformError, Result};
use crate::rate_limiter::RateLimiter;
use crate::session::{DetachedSession, Session, SessionLauncher, SessionResult};
use crate::types::{AdData, Credentials, PostResult};

pub const NAME: &str = "ebay";
pub const TITLE_LIMIT: usize = 80;

pub const SANDBOX_ENDPOINT: &str = "https://api.sandbox.ebay.com/ws/api/eBayAPI/xml";
pub const PRODUCTION_ENDPOINT: &str = "https://api.ebay.com/ws/api/eBayAPI/xml";

const API_VERSION: &str = "967";
const SITE_ID: &str = "0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POSTAL_CODE: &str = "85001";
const MAX_PICTURES: usize = 12;

const CATEGORIES: &[(&str, &str)] = &[
    ("electronics", "293"),
    ("furniture", "20081"),
    ("vehicles", "6001"),
    ("real estate", "10542"),
    ("appliances", "20710"),
    ("clothing", "11450"),
    ("sports", "888"),
    ("tools", "631"),
    ("other", "99"),
];
const FALLBACK_CATEGORY: &str = "99";

/// Invalid, expired or revoked tokens and application keys
const AUTH_ERROR_CODES: &[&str] = &["931", "932", "16110", "17470"];
/// Call usage limits
const USAGE_LIMIT_ERROR_CODES: &[&str] = &["518", "21919165"];

static ACK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Ack>\s*([^<]*?)\s*</Ack>").unwrap());
static ITEM_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<ItemID>\s*([^<]*?)\s*</ItemID>").unwrap());
static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Timestamp>\s*([^<]*?)\s*</Timestamp>").unwrap());
static ERRORS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<Errors>(.*?)</Errors>").unwrap());
static ERROR_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<ErrorCode>\s*([^<]*?)\s*</ErrorCode>").unwrap());
static SHORT_MESSAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<ShortMessage>\s*([^<]*?)\s*</ShortMessage>").unwrap());
static LONG_MESSAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<LongMessage>\s*([^<]*?)\s*</LongMessage>").unwrap());
static SEVERITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<SeverityCode>\s*([^<]*?)\s*</SeverityCode>").unwrap());
static POSTAL_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{5})\b").unwrap());

/// Trading API keys pulled from [`Credentials::additional_data`]
#[derive(Clone)]
pub struct ApiCredentials {
    pub app_id: String,
    pub dev_id: String,
    pub cert_id: String,
    pub user_token: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("app_id", &self.app_id)
            .field("dev_id", &self.dev_id)
            .field("cert_id", &"[REDACTED]")
            .field("user_token", &"[REDACTED]")
            .finish()
    }
}

impl ApiCredentials {
    /// Returns the names of the missing keys on failure
    pub fn from_credentials(credentials: &Credentials) -> std::result::Result<Self, Vec<&'static str>> {
        let get = |key| credentials.extra(key).map(str::to_string);
        match (
            get("app_id"),
            get("dev_id"),
            get("cert_id"),
            get("user_token"),
        ) {
            (Some(app_id), Some(dev_id), Some(cert_id), Some(user_token)) => Ok(Self {
                app_id,
                dev_id,
                cert_id,
                user_token,
            }),
            _ => Err(["app_id", "dev_id", "cert_id", "user_token"]
                .into_iter()
                .filter(|key| credentials.extra(key).is_none())
                .collect()),
        }
    }
}

/// One `<Errors>` entry of a Trading API response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub short_message: String,
    pub long_message: String,
    pub severity: String,
}

impl ApiError {
    fn message(&self) -> &str {
        if self.long_message.is_empty() {
            &self.short_message
        } else {
            &self.long_message
        }
    }
}

/// The parts of a Trading API response this adapter reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub ack: String,
    pub item_id: Option<String>,
    pub timestamp: Option<String>,
    pub errors: Vec<ApiError>,
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str()))
        .filter(|s| !s.is_empty())
}

impl ApiResponse {
    /// Parse a response body; `None` when it carries no `<Ack>`
    pub fn parse(xml: &str) -> Option<Self> {
        let ack = capture(&ACK_RE, xml)?;
        let errors = ERRORS_RE
            .captures_iter(xml)
            .filter_map(|c| c.get(1))
            .map(|block| {
                let block = block.as_str();
                ApiError {
                    code: capture(&ERROR_CODE_RE, block).unwrap_or_default(),
                    short_message: capture(&SHORT_MESSAGE_RE, block).unwrap_or_default(),
                    long_message: capture(&LONG_MESSAGE_RE, block).unwrap_or_default(),
                    severity: capture(&SEVERITY_RE, block).unwrap_or_default(),
                }
            })
            .collect();
        Some(Self {
            ack,
            item_id: capture(&ITEM_ID_RE, xml),
            timestamp: capture(&TIMESTAMP_RE, xml),
            errors,
        })
    }

    /// `Success` and `Warning` both mean the call went through
    pub fn is_ok(&self) -> bool {
        matches!(self.ack.as_str(), "Success" | "Warning")
    }
}

/// Why a Trading API call did not go through
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFailure {
    Auth(String),
    Throttled {
        retry_after: Option<Duration>,
        message: String,
    },
    Blocked(String),
    /// eBay refused the request; `code` is the first eBay error code
    Rejected { code: Option<String>, message: String },
    Transport(String),
}

impl ApiFailure {
    /// Classify the `<Errors>` of a failed call
    pub fn from_errors(errors: &[ApiError]) -> Self {
        let failures: Vec<&ApiError> = errors
            .iter()
            .filter(|e| !e.severity.eq_ignore_ascii_case("Warning"))
            .collect();
        let relevant = if failures.is_empty() {
            errors.iter().collect()
        } else {
            failures
        };
        let message = relevant
            .iter()
            .map(|e| e.message())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        let message = if message.is_empty() {
            "Unknown eBay API error".to_string()
        } else {
            message
        };

        let has_code = |codes: &[&str]| relevant.iter().any(|e| codes.contains(&e.code.as_str()));
        if has_code(AUTH_ERROR_CODES) {
            return ApiFailure::Auth(message);
        }
        if has_code(USAGE_LIMIT_ERROR_CODES) {
            return ApiFailure::Throttled {
                retry_after: None,
                message,
            };
        }
        let lowered = message.to_lowercase();
        if lowered.contains("suspended") || lowered.contains("restricted") {
            return ApiFailure::Blocked(message);
        }
        ApiFailure::Rejected {
            code: relevant
                .iter()
                .map(|e| e.code.clone())
                .find(|c| !c.is_empty()),
            message,
        }
    }

    fn into_step_error(self, step: &'static str) -> Option<StepError> {
        match self {
            ApiFailure::Auth(_) => None,
            ApiFailure::Throttled {
                retry_after,
                message,
            } => Some(StepError::RateLimited {
                retry_after,
                message,
            }),
            ApiFailure::Blocked(message) => Some(StepError::AccountBlocked(message)),
            ApiFailure::Rejected { message, .. } | ApiFailure::Transport(message) => {
                Some(StepError::failed(step, message))
            }
        }
    }
}

impl From<ApiFailure> for PostResult {
    fn from(failure: ApiFailure) -> Self {
        match failure {
            ApiFailure::Auth(message) => {
                PostResult::login_required(format!("eBay rejected the API credentials: {}", message))
            }
            ApiFailure::Throttled {
                retry_after,
                message,
            } => PostResult::rate_limited(retry_after, format!("eBay call limit reached: {}", message)),
            ApiFailure::Blocked(message) => {
                PostResult::account_blocked(format!("eBay account is restricted: {}", message))
            }
            ApiFailure::Rejected { code, message } => {
                let result = PostResult::failed(format!("eBay listing failed: {}", message));
                match code {
                    Some(code) => result.with_error_code(code),
                    None => result,
                }
            }
            ApiFailure::Transport(message) => PostResult::failed(message),
        }
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Wrap text in CDATA, splitting any `]]>` it contains
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

/// Postal code from `additional_data.postal_code`, a ZIP in the location,
/// or the default
pub fn postal_code(ad: &AdData) -> String {
    if let Some(code) = ad.extra_str("postal_code") {
        return code.to_string();
    }
    POSTAL_CODE_RE
        .captures(&ad.location)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_POSTAL_CODE.to_string())
}

fn request_xml(call: &str, token: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<{call}Request xmlns="urn:ebay:apis:eBLBaseComponents">
  <RequesterCredentials>
    <eBayAuthToken>{token}</eBayAuthToken>
  </RequesterCredentials>
  <Version>{API_VERSION}</Version>
  <ErrorLanguage>en_US</ErrorLanguage>
  <WarningLevel>High</WarningLevel>
{body}
</{call}Request>"#,
        token = escape_xml(token),
    )
}

/// `<Item>` element for `AddItem`
pub fn add_item_body(ad: &AdData) -> String {
    let category = map_category(CATEGORIES, &ad.category, FALLBACK_CATEGORY);
    let pictures = if ad.images.is_empty() {
        String::new()
    } else {
        let urls: String = ad
            .images
            .iter()
            .take(MAX_PICTURES)
            .map(|url| format!("\n      <PictureURL>{}</PictureURL>", escape_xml(url)))
            .collect();
        format!("\n    <PictureDetails>{}\n    </PictureDetails>", urls)
    };

    format!(
        r#"  <Item>
    <Title>{title}</Title>
    <Description>{description}</Description>
    <PrimaryCategory>
      <CategoryID>{category}</CategoryID>
    </PrimaryCategory>
    <StartPrice currencyID="USD">{price:.2}</StartPrice>
    <CategoryMappingAllowed>true</CategoryMappingAllowed>
    <Country>US</Country>
    <Currency>USD</Currency>
    <Location>{location}</Location>
    <PostalCode>{postal_code}</PostalCode>
    <DispatchTimeMax>3</DispatchTimeMax>
    <ListingDuration>GTC</ListingDuration>
    <ListingType>FixedPriceItem</ListingType>
    <Quantity>1</Quantity>{pictures}
    <ReturnPolicy>
      <ReturnsAcceptedOption>ReturnsAccepted</ReturnsAcceptedOption>
      <RefundOption>MoneyBack</RefundOption>
      <ReturnsWithinOption>Days_30</ReturnsWithinOption>
      <ShippingCostPaidByOption>Buyer</ShippingCostPaidByOption>
    </ReturnPolicy>
    <ShippingDetails>
      <ShippingType>Flat</ShippingType>
      <ShippingServiceOptions>
        <ShippingServicePriority>1</ShippingServicePriority>
        <ShippingService>USPSMedia</ShippingService>
        <ShippingServiceCost>5.99</ShippingServiceCost>
      </ShippingServiceOptions>
    </ShippingDetails>
    <Site>US</Site>
  </Item>"#,
        title = escape_xml(&ad.title),
        description = cdata(&ad.description),
        price = ad.price,
        location = escape_xml(&ad.location),
        postal_code = escape_xml(&postal_code(ad)),
    )
}

pub struct EbayAdapter {
    settings: AdapterSettings,
    limiter: RateLimiter,
    client: reqwest::Client,
    endpoint: String,
}

impl EbayAdapter {
    /// Adapter talking to `endpoint` (see [`SANDBOX_ENDPOINT`] and
    /// [`PRODUCTION_ENDPOINT`])
    pub fn new(settings: AdapterSettings, endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            limiter: RateLimiter::new(settings.requests_per_second),
            settings,
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_sandbox(&self) -> bool {
        self.endpoint.contains("sandbox")
    }

    pub fn listing_url(&self, item_id: &str) -> String {
        if self.is_sandbox() {
            format!("https://sandbox.ebay.com/itm/{}", item_id)
        } else {
            format!("https://www.ebay.com/itm/{}", item_id)
        }
    }

    /// Make one Trading API call
    pub async fn call(
        &self,
        keys: &ApiCredentials,
        call_name: &str,
        body: &str,
    ) -> std::result::Result<ApiResponse, ApiFailure> {
        self.limiter.acquire().await;
        debug!("eBay {} -> {}", call_name, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-EBAY-API-COMPATIBILITY-LEVEL", API_VERSION)
            .header("X-EBAY-API-DEV-NAME", &keys.dev_id)
            .header("X-EBAY-API-APP-NAME", &keys.app_id)
            .header("X-EBAY-API-CERT-NAME", &keys.cert_id)
            .header("X-EBAY-API-SITEID", SITE_ID)
            .header("X-EBAY-API-CALL-NAME", call_name)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(request_xml(call_name, &keys.user_token, body))
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(format!("eBay API request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ApiFailure::Auth(format!("HTTP {}", status.as_u16())));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ApiFailure::Throttled {
                retry_after,
                message: "HTTP 429".to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiFailure::Transport(format!("Failed to read eBay response: {}", e)))?;
        if !status.is_success() {
            warn!("eBay API returned HTTP {}", status);
            return Err(ApiFailure::Transport(format!(
                "eBay API error: HTTP {}",
                status.as_u16()
            )));
        }

        let parsed = ApiResponse::parse(&text)
            .ok_or_else(|| ApiFailure::Transport("Malformed eBay API response".to_string()))?;
        if !parsed.is_ok() {
            return Err(ApiFailure::from_errors(&parsed.errors));
        }
        for warning in &parsed.errors {
            debug!("eBay {} warning {}: {}", call_name, warning.code, warning.message());
        }
        Ok(parsed)
    }

    fn keys_or_result(credentials: &Credentials) -> std::result::Result<ApiCredentials, PostResult> {
        ApiCredentials::from_credentials(credentials).map_err(|missing| {
            PostResult::login_required(format!(
                "Missing eBay API credentials: {}",
                missing.join(", ")
            ))
        })
    }

    /// Create a fixed-price listing
    pub async fn add_item(&self, ad: &AdData, credentials: &Credentials) -> PostResult {
        let keys = match Self::keys_or_result(credentials) {
            Ok(keys) => keys,
            Err(result) => return result,
        };
        match self.call(&keys, "AddItem", &add_item_body(ad)).await {
            Ok(response) => match response.item_id {
                Some(item_id) => {
                    info!("Listed on eBay with id {}", item_id);
                    let url = self.listing_url(&item_id);
                    PostResult::success(
                        item_id.clone(),
                        Some(url),
                        format!("Successfully listed on eBay with ID: {}", item_id),
                    )
                }
                None => PostResult::failed("eBay accepted the listing but returned no item id"),
            },
            Err(failure) => {
                warn!("eBay AddItem failed: {:?}", failure);
                failure.into()
            }
        }
    }

    /// Update title, description and price of an existing listing
    pub async fn revise_item(&self, item_id: &str, ad: &AdData, credentials: &Credentials) -> PostResult {
        let keys = match Self::keys_or_result(credentials) {
            Ok(keys) => keys,
            Err(result) => return result,
        };
        let body = format!(
            "  <Item>\n    <ItemID>{}</ItemID>\n    <Title>{}</Title>\n    <Description>{}</Description>\n    <StartPrice>{:.2}</StartPrice>\n  </Item>",
            escape_xml(item_id),
            escape_xml(&ad.title),
            cdata(&ad.description),
            ad.price
        );
        match self.call(&keys, "ReviseItem", &body).await {
            Ok(_) => PostResult::success(
                item_id,
                Some(self.listing_url(item_id)),
                "Successfully revised eBay listing",
            ),
            Err(failure) => failure.into(),
        }
    }

    /// End a listing early with reason `NotAvailable`
    pub async fn end_item(&self, item_id: &str, credentials: &Credentials) -> PostResult {
        let keys = match Self::keys_or_result(credentials) {
            Ok(keys) => keys,
            Err(result) => return result,
        };
        let body = format!(
            "  <ItemID>{}</ItemID>\n  <EndingReason>NotAvailable</EndingReason>",
            escape_xml(item_id)
        );
        match self.call(&keys, "EndItem", &body).await {
            Ok(_) => PostResult::success(item_id, None, "Successfully ended eBay listing"),
            Err(failure) => failure.into(),
        }
    }
}

#[async_trait]
impl Adapter for EbayAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn supported_categories(&self) -> Vec<String> {
        CATEGORIES.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn title_limit(&self) -> Option<usize> {
        Some(TITLE_LIMIT)
    }

    async fn open_session(&self, _launcher: &dyn SessionLauncher) -> SessionResult<Box<dyn Session>> {
        Ok(Box::new(DetachedSession::new()))
    }

    async fn login(&self, _session: &dyn Session, credentials: &Credentials) -> StepResult<bool> {
        let keys = match ApiCredentials::from_credentials(credentials) {
            Ok(keys) => keys,
            Err(missing) => {
                warn!("eBay credentials missing {}", missing.join(", "));
                return Ok(false);
            }
        };
        match self.call(&keys, "GeteBayOfficialTime", "").await {
            Ok(response) => {
                info!(
                    "eBay API credentials validated (official time {})",
                    response.timestamp.as_deref().unwrap_or("unknown")
                );
                Ok(true)
            }
            Err(failure) => match failure.into_step_error("validate") {
                Some(step) => Err(step),
                None => Ok(false),
            },
        }
    }

    async fn post_ad(&self, _session: &dyn Session, ad: &AdData, credentials: &Credentials) -> PostResult {
        self.add_item(ad, credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostStatus;

    const ADD_ITEM_SUCCESS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AddItemResponse xmlns="urn:ebay:apis:eBLBaseComponents">
  <Timestamp>2024-05-01T12:00:00.000Z</Timestamp>
  <Ack>Warning</Ack>
  <Errors>
    <ShortMessage>Shipping advisory</ShortMessage>
    <LongMessage>Consider offering free shipping.</LongMessage>
    <ErrorCode>21917236</ErrorCode>
    <SeverityCode>Warning</SeverityCode>
  </Errors>
  <ItemID>110554567890</ItemID>
</AddItemResponse>"#;

    fn api_error(code: &str, long: &str) -> ApiError {
        ApiError {
            code: code.to_string(),
            short_message: String::new(),
            long_message: long.to_string(),
            severity: "Error".to_string(),
        }
    }

    #[test]
    fn test_parse_success_with_warning() {
        let response = ApiResponse::parse(ADD_ITEM_SUCCESS).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.item_id.as_deref(), Some("110554567890"));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].severity, "Warning");
    }

    #[test]
    fn test_parse_rejects_non_api_body() {
        assert_eq!(ApiResponse::parse("<html>Service Unavailable</html>"), None);
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            ApiFailure::from_errors(&[api_error("931", "Auth token is invalid.")]),
            ApiFailure::Auth(_)
        ));
        assert!(matches!(
            ApiFailure::from_errors(&[api_error("518", "Call usage limit has been reached.")]),
            ApiFailure::Throttled { retry_after: None, .. }
        ));
        assert!(matches!(
            ApiFailure::from_errors(&[api_error("21916284", "Your account is suspended.")]),
            ApiFailure::Blocked(_)
        ));
        assert_eq!(
            ApiFailure::from_errors(&[
                api_error("240", "The title may contain improper words."),
                api_error("37", "Input data is invalid."),
            ]),
            ApiFailure::Rejected {
                code: Some("240".to_string()),
                message: "The title may contain improper words.; Input data is invalid.".to_string(),
            }
        );
    }

    #[test]
    fn test_rejection_carries_ebay_code() {
        let result: PostResult = ApiFailure::Rejected {
            code: Some("240".to_string()),
            message: "bad title".to_string(),
        }
        .into();
        assert_eq!(result.status, PostStatus::Failed);
        assert_eq!(result.error_code.as_deref(), Some("240"));
    }

    #[test]
    fn test_add_item_body() {
        let ad = AdData::new(
            "Mac & Cheese <Bowl>",
            "Great bowl ]]> really",
            12.5,
            "Electronics",
            "Tempe, AZ 85281",
        )
        .with_images(["https://img.example.com/a.jpg?x=1&y=2"]);
        let body = add_item_body(&ad);
        assert!(body.contains("<Title>Mac &amp; Cheese &lt;Bowl&gt;</Title>"));
        assert!(body.contains("<![CDATA[Great bowl ]]]]><![CDATA[> really]]>"));
        assert!(body.contains("<CategoryID>293</CategoryID>"));
        assert!(body.contains(">12.50</StartPrice>"));
        assert!(body.contains("<PostalCode>85281</PostalCode>"));
        assert!(body.contains("<PictureURL>https://img.example.com/a.jpg?x=1&amp;y=2</PictureURL>"));
    }

    #[test]
    fn test_postal_code_sources() {
        let ad = AdData::new("t", "d", 1.0, "other", "Phoenix");
        assert_eq!(postal_code(&ad), "85001");
        let ad = ad.with_extra("postal_code", serde_json::json!("85004"));
        assert_eq!(postal_code(&ad), "85004");
    }

    #[test]
    fn test_missing_keys_reported() {
        let creds = Credentials::new("seller", "pw").with_extra("app_id", "A");
        let missing = ApiCredentials::from_credentials(&creds).unwrap_err();
        assert_eq!(missing, vec!["dev_id", "cert_id", "user_token"]);
    }

    #[test]
    fn test_listing_urls() {
        let sandbox = EbayAdapter::new(AdapterSettings::default(), SANDBOX_ENDPOINT).unwrap();
        assert_eq!(sandbox.listing_url("1"), "https://sandbox.ebay.com/itm/1");
        let live = EbayAdapter::new(AdapterSettings::default(), PRODUCTION_ENDPOINT).unwrap();
        assert_eq!(live.listing_url("1"), "https://www.ebay.com/itm/1");
    }
}
