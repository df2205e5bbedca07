//! Building blocks for adapter posting flows
//!
//! Every step returns `Result<_, StepError>`. An `Err` abandons the attempt
//! and converts directly into the terminal [`PostResult`]. Selector-variant
//! fallbacks ("try the next selector") are explicit loops here, not retries
//! driven by errors.

use std::time::Duration;
use tracing::debug;

use super::signatures::{Completion, SignatureTable};
use crate::rate_limiter::RateLimiter;
use crate::session::Session;
use crate::types::{error_codes, PostResult};

/// Why a posting flow stopped early
#[derive(Debug, Clone, PartialEq)]
pub enum StepError {
    Failed { step: &'static str, message: String },
    Captcha,
    RateLimited { retry_after: Option<Duration>, message: String },
    LoginRequired(String),
    AccountBlocked(String),
}

impl StepError {
    pub fn failed(step: &'static str, message: impl Into<String>) -> Self {
        StepError::Failed {
            step,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Failed { step, message } => write!(f, "{} failed: {}", step, message),
            StepError::Captcha => write!(f, "CAPTCHA detected"),
            StepError::RateLimited { message, .. } => write!(f, "rate limited: {}", message),
            StepError::LoginRequired(message) => write!(f, "login required: {}", message),
            StepError::AccountBlocked(message) => write!(f, "account blocked: {}", message),
        }
    }
}

impl From<StepError> for PostResult {
    fn from(error: StepError) -> Self {
        match error {
            StepError::Failed { message, .. } => PostResult::failed(message),
            StepError::Captcha => {
                PostResult::captcha_required("CAPTCHA detected - manual intervention required")
                    .with_error_code(error_codes::CAPTCHA_DETECTED)
            }
            StepError::RateLimited {
                retry_after,
                message,
            } => PostResult::rate_limited(retry_after, message),
            StepError::LoginRequired(message) => PostResult::login_required(message),
            StepError::AccountBlocked(message) => PostResult::account_blocked(message),
        }
    }
}

pub type StepResult<T = ()> = Result<T, StepError>;

/// Throttle, then navigate
pub async fn goto(session: &dyn Session, limiter: &RateLimiter, url: &str) -> StepResult {
    limiter.acquire().await;
    session
        .navigate(url)
        .await
        .map_err(|e| StepError::failed("navigate", format!("Failed to load {}: {}", url, e)))
}

/// First selector variant present on the page, waiting up to `timeout`
pub async fn first_present<'a>(
    session: &dyn Session,
    selectors: &[&'a str],
    timeout: Duration,
) -> Option<&'a str> {
    if selectors.is_empty() || !session.wait_for_element(&selectors.join(", "), timeout).await {
        return None;
    }
    for selector in selectors {
        if session.count(selector).await > 0 {
            return Some(*selector);
        }
    }
    None
}

/// Fill the first variant that accepts the text
pub async fn fill_first(
    session: &dyn Session,
    step: &'static str,
    selectors: &[&str],
    text: &str,
    timeout: Duration,
) -> StepResult {
    if first_present(session, selectors, timeout).await.is_none() {
        return Err(StepError::failed(step, format!("Could not find {} field", step)));
    }
    for selector in selectors {
        if session.count(selector).await == 0 {
            continue;
        }
        match session.fill(selector, text).await {
            Ok(()) => return Ok(()),
            Err(e) => debug!("Filling {} via {} failed: {}", step, selector, e),
        }
    }
    Err(StepError::failed(step, format!("Failed to fill {}", step)))
}

/// Fill an optional field; absence is not an error
pub async fn fill_optional(session: &dyn Session, selector: &str, text: &str, timeout: Duration) {
    if session.wait_for_element(selector, timeout).await {
        if let Err(e) = session.fill(selector, text).await {
            debug!("Optional field {} not filled: {}", selector, e);
        }
    }
}

/// Click the first variant that accepts the click
pub async fn click_first<'a>(
    session: &dyn Session,
    selectors: &[&'a str],
    timeout: Duration,
) -> Option<&'a str> {
    first_present(session, selectors, timeout).await?;
    for selector in selectors {
        if session.count(selector).await == 0 {
            continue;
        }
        match session.click(selector).await {
            Ok(()) => return Some(*selector),
            Err(e) => debug!("Click on {} failed: {}", selector, e),
        }
    }
    None
}

pub async fn ensure_no_captcha(session: &dyn Session, table: &SignatureTable) -> StepResult {
    if table.captcha_present(session).await {
        Err(StepError::Captcha)
    } else {
        Ok(())
    }
}

/// Look up a free-text category, falling back to `fallback`
pub fn map_category<'a>(table: &[(&str, &'a str)], category: &str, fallback: &'a str) -> &'a str {
    let wanted = category.trim().to_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, code)| *code)
        .unwrap_or(fallback)
}

/// `<prefix>_<unix timestamp>`, used when the platform exposes no id
pub fn surrogate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, chrono::Utc::now().timestamp())
}

/// Where a platform's listing URL can be found after posting
#[derive(Debug, Clone, Copy)]
pub struct ListingLocator<'a> {
    pub platform: &'a str,
    pub id_prefix: &'a str,
    pub marker: &'a str,
    pub link_selectors: &'a [&'a str],
    pub base_url: &'a str,
}

impl ListingLocator<'_> {
    /// Listing URL from the current page or a link on it, made absolute
    pub async fn listing_url(&self, session: &dyn Session, current: Option<String>) -> Option<String> {
        if let Some(url) = current.filter(|u| u.contains(self.marker)) {
            return Some(url);
        }
        for selector in self.link_selectors {
            if let Some(href) = session.attribute(selector, "href").await {
                if href.contains(self.marker) {
                    return Some(self.absolute(&href));
                }
            }
        }
        None
    }

    fn absolute(&self, href: &str) -> String {
        match url::Url::parse(self.base_url).and_then(|base| base.join(href)) {
            Ok(url) => url.to_string(),
            Err(_) => href.to_string(),
        }
    }

    /// Numeric listing id embedded in the URL, else a surrogate
    pub fn listing_id(&self, url: Option<&str>) -> String {
        url.and_then(numeric_id)
            .map(|id| format!("{}_{}", self.id_prefix, id))
            .unwrap_or_else(|| surrogate_id(self.id_prefix))
    }

    /// Turn a detected completion into the attempt's result
    pub async fn conclude(
        &self,
        session: &dyn Session,
        table: &SignatureTable,
        completion: Completion,
    ) -> PostResult {
        match completion {
            Completion::Success { url } => {
                let url = self.listing_url(session, url).await;
                let id = self.listing_id(url.as_deref());
                PostResult::success(
                    id,
                    url,
                    format!("Ad posted successfully to {}", self.platform),
                )
            }
            Completion::RateLimited => PostResult::rate_limited(
                Some(table.retry_after),
                format!("{} is throttling new listings", self.platform),
            ),
            Completion::AccountBlocked(reason) => PostResult::account_blocked(format!(
                "{} account is blocked: {}",
                self.platform, reason
            )),
            Completion::Captcha => StepError::Captcha.into(),
            Completion::Failed(errors) => {
                PostResult::failed(format!("Posting failed: {}", errors.join("; ")))
            }
            Completion::Unverified => {
                PostResult::failed("Posting status unknown - may require manual verification")
                    .with_error_code(error_codes::COMPLETION_UNVERIFIED)
            }
        }
    }
}

// Listing ids are long digit runs (Craigslist 10 digits, Facebook 15+).
fn numeric_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() >= 6)
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::{ScriptedPage, ScriptedSession};
    use crate::types::PostStatus;

    const LOCATOR: ListingLocator<'static> = ListingLocator {
        platform: "offerup",
        id_prefix: "ou",
        marker: "/item/",
        link_selectors: &["a[href*=\"/item/\"]"],
        base_url: "https://offerup.com",
    };

    #[test]
    fn test_map_category() {
        let table = [("electronics", "ela"), ("furniture", "fua")];
        assert_eq!(map_category(&table, " Furniture ", "foa"), "fua");
        assert_eq!(map_category(&table, "boats", "foa"), "foa");
    }

    #[test]
    fn test_surrogate_id_shape() {
        let id = surrogate_id("cl");
        let (prefix, ts) = id.split_once('_').unwrap();
        assert_eq!(prefix, "cl");
        assert!(ts.parse::<i64>().unwrap() > 1_600_000_000);
    }

    #[test]
    fn test_numeric_id_extraction() {
        assert_eq!(
            numeric_id("https://phoenix.craigslist.org/fuo/d/phoenix-couch/7712345678.html"),
            Some("7712345678".to_string())
        );
        assert_eq!(
            numeric_id("https://www.facebook.com/marketplace/item/123456789012345/?ref=x"),
            Some("123456789012345".to_string())
        );
        assert_eq!(numeric_id("https://offerup.com/item/detail/abc-def"), None);
    }

    #[tokio::test]
    async fn test_listing_url_from_relative_link() {
        let page = ScriptedPage::new()
            .at("https://offerup.com/sell/done")
            .attribute("a[href*=\"/item/\"]", "href", "/item/detail/abc-def");
        let session = ScriptedSession::new(page);
        let url = LOCATOR
            .listing_url(&session, Some("https://offerup.com/sell/done".to_string()))
            .await;
        assert_eq!(url.as_deref(), Some("https://offerup.com/item/detail/abc-def"));
    }

    #[tokio::test]
    async fn test_fill_first_skips_missing_variants() {
        let page = ScriptedPage::new().element("input[name=\"title\"]");
        let session = ScriptedSession::new(page);
        fill_first(
            &session,
            "title",
            &["[data-testid=\"title-input\"]", "input[name=\"title\"]"],
            "Bike",
            Duration::ZERO,
        )
        .await
        .unwrap();
        assert_eq!(session.snapshot().filled("input[name=\"title\"]"), Some("Bike"));
    }

    #[tokio::test]
    async fn test_fill_first_reports_step() {
        let session = ScriptedSession::new(ScriptedPage::new());
        let err = fill_first(&session, "price", &["#price"], "10", Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err, StepError::failed("price", "Could not find price field"));
    }

    #[tokio::test]
    async fn test_click_first_falls_through_broken_variant() {
        let page = ScriptedPage::new().element("#a").broken("#a").element("#b");
        let session = ScriptedSession::new(page);
        assert_eq!(click_first(&session, &["#a", "#b"], Duration::ZERO).await, Some("#b"));
    }

    #[test]
    fn test_step_error_conversion() {
        let result: PostResult = StepError::Captcha.into();
        assert_eq!(result.status, PostStatus::CaptchaRequired);
        assert_eq!(result.error_code.as_deref(), Some("CAPTCHA_DETECTED"));
        assert!(result.retry_after.is_none());

        let result: PostResult = StepError::failed("publish", "Failed to submit form").into();
        assert_eq!(result.status, PostStatus::Failed);
        assert_eq!(result.message.as_deref(), Some("Failed to submit form"));
    }
}
