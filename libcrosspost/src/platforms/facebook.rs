//! Facebook Marketplace adapter

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::signatures::{Probe, SignatureTable, COMMON_CAPTCHA};
use super::steps::{
    click_first, ensure_no_captcha, fill_first, first_present, goto, map_category, ListingLocator,
    StepError, StepResult,
};
use super::Adapter;
use crate::config::AdapterSettings;
use crate::images::{HttpImageSource, ImageSource, ImageTransfer, UploadCompletion, UploadTarget};
use crate::rate_limiter::RateLimiter;
use crate::session::Session;
use crate::types::{AdData, Credentials, PostResult};

pub const NAME: &str = "facebook";

const BASE_URL: &str = "https://www.facebook.com";
const MARKETPLACE_URL: &str = "https://www.facebook.com/marketplace";
const CREATE_URL: &str = "https://www.facebook.com/marketplace/create";

const CATEGORIES: &[(&str, &str)] = &[
    ("electronics", "ELECTRONICS"),
    ("furniture", "HOME_GARDEN"),
    ("vehicles", "VEHICLE"),
    ("real estate", "PROPERTY_RENTALS"),
    ("appliances", "HOME_GARDEN"),
    ("clothing", "APPAREL"),
    ("sports", "SPORTING_GOODS"),
    ("tools", "HOME_GARDEN"),
    ("other", "OTHER"),
];
const FALLBACK_CATEGORY: &str = "OTHER";

const COOKIE_ACCEPT: &str = "[data-testid=\"cookie-policy-manage-dialog-accept-button\"]";
const LOGIN_FORM: &str = "[data-testid=\"royal_login_form\"]";
const EMAIL_INPUT: &str = "#email";
const PASSWORD_INPUT: &str = "#pass";
const LOGIN_BUTTON: &str = "[data-testid=\"royal_login_button\"]";
const CHECKPOINT: &str = "[data-testid=\"checkpoint_title\"]";
const MARKETPLACE_MARKERS: &[&str] = &[
    "[data-testid=\"marketplace_tab\"]",
    "a[href=\"/marketplace\"]",
    "[aria-label=\"Marketplace\"]",
];

const COMPOSER_FORM: &str = "[data-testid=\"marketplace-composer-form\"]";
const TITLE_INPUT: &str = "[data-testid=\"marketplace-composer-title-input\"]";
const PRICE_INPUT: &str = "[data-testid=\"marketplace-composer-price-input\"]";
const DESCRIPTION_INPUT: &str = "[data-testid=\"marketplace-composer-description-input\"]";
const LOCATION_INPUT: &str = "[data-testid=\"marketplace-composer-location-input\"]";
const PUBLISH_BUTTON: &str = "[data-testid=\"marketplace-composer-publish-button\"]";

const UPLOAD: UploadTarget<'static> = UploadTarget {
    file_inputs: &["input[type=\"file\"][accept*=\"image\"]"],
    trigger: Some("[data-testid=\"marketplace-composer-photo-upload\"]"),
    completion: UploadCompletion::Previews {
        progress: "[role=\"progressbar\"]",
        preview: "[data-testid=\"marketplace-composer-photo-preview\"]",
    },
};

const LISTING_LINKS: &[&str] = &["a[href*=\"/marketplace/item/\"]"];

pub static SIGNATURES: SignatureTable = SignatureTable {
    captcha: COMMON_CAPTCHA,
    success: &[
        Probe::Css("[data-testid=\"marketplace-success-modal\"]"),
        Probe::Text("Your listing has been posted"),
        Probe::Text("Listing created"),
        Probe::UrlContains("/marketplace/item/"),
    ],
    errors: &[
        Probe::Css("[data-testid=\"marketplace-error-message\"]"),
        Probe::Css(".error-message"),
        Probe::Css("[role=\"alert\"]"),
        Probe::Text("There was a problem"),
    ],
    rate_limited: &[
        Probe::Text("temporarily blocked"),
        Probe::Text("going too fast"),
    ],
    account_blocked: &[
        Probe::Text("account has been disabled"),
        Probe::Text("account has been locked"),
        Probe::Text("restricted from selling"),
    ],
    retry_after: Duration::from_secs(3600),
};

pub struct FacebookAdapter {
    settings: AdapterSettings,
    limiter: RateLimiter,
    images: ImageTransfer,
}

impl FacebookAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        let source = Arc::new(HttpImageSource::new(settings.download_timeout));
        Self::with_image_source(settings, source)
    }

    pub fn with_image_source(settings: AdapterSettings, source: Arc<dyn ImageSource>) -> Self {
        Self {
            limiter: RateLimiter::new(settings.requests_per_second),
            images: ImageTransfer::new("fb", source, &settings),
            settings,
        }
    }

    async fn settle(&self, session: &dyn Session) {
        session
            .pause(Duration::from_secs(1), Duration::from_secs(3))
            .await;
    }

    async fn verify_marketplace_access(&self, session: &dyn Session) -> StepResult<bool> {
        goto(session, &self.limiter, MARKETPLACE_URL).await?;
        let found = first_present(session, MARKETPLACE_MARKERS, self.settings.element_timeout).await;
        match found {
            Some(marker) => {
                debug!("Marketplace access verified via {}", marker);
                Ok(true)
            }
            None => {
                warn!("No Facebook Marketplace access detected");
                Ok(false)
            }
        }
    }

    async fn run(&self, session: &dyn Session, ad: &AdData) -> StepResult<PostResult> {
        let timeout = self.settings.element_timeout;
        let probe = self.settings.probe_timeout;

        info!("Opening Facebook Marketplace composer");
        goto(session, &self.limiter, CREATE_URL).await?;
        self.settle(session).await;
        ensure_no_captcha(session, &SIGNATURES).await?;

        if !session.wait_for_element(COMPOSER_FORM, timeout).await {
            return Err(StepError::failed("form", "Listing form did not load"));
        }

        let category = map_category(CATEGORIES, &ad.category, FALLBACK_CATEGORY);
        let category_button = format!("[data-testid=\"marketplace-category-{}\"]", category);
        if session.wait_for_element(&category_button, probe).await {
            if let Err(e) = session.click(&category_button).await {
                debug!("Category {} not selectable: {}", category, e);
            }
        }

        fill_first(session, "title", &[TITLE_INPUT], &ad.title, timeout).await?;
        fill_first(session, "price", &[PRICE_INPUT], &ad.whole_price(), timeout).await?;
        fill_first(session, "description", &[DESCRIPTION_INPUT], &ad.description, timeout).await?;
        fill_first(session, "location", &[LOCATION_INPUT], &ad.location, timeout).await?;

        if !ad.images.is_empty() {
            let report = self.images.upload(session, &ad.images, &UPLOAD).await;
            if let Some(reason) = report.error {
                warn!("Facebook images skipped: {}", reason);
            } else if !report.completed {
                warn!("Facebook image upload did not finish, publishing anyway");
            }
        }

        ensure_no_captcha(session, &SIGNATURES).await?;
        if click_first(session, &[PUBLISH_BUTTON], timeout).await.is_none() {
            return Err(StepError::failed("publish", "Failed to submit listing"));
        }
        self.settle(session).await;

        let completion = SIGNATURES
            .detect(
                session,
                self.settings.completion_timeout,
                self.settings.poll_interval,
            )
            .await;
        let locator = ListingLocator {
            platform: NAME,
            id_prefix: "fb",
            marker: "/marketplace/item/",
            link_selectors: LISTING_LINKS,
            base_url: BASE_URL,
        };
        Ok(locator.conclude(session, &SIGNATURES, completion).await)
    }
}

#[async_trait]
impl Adapter for FacebookAdapter {
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

    async fn login(&self, session: &dyn Session, credentials: &Credentials) -> StepResult<bool> {
        let probe = self.settings.probe_timeout;

        info!("Signing in to Facebook");
        goto(session, &self.limiter, BASE_URL).await?;
        self.settle(session).await;

        if session.wait_for_element(COOKIE_ACCEPT, probe).await {
            if let Err(e) = session.click(COOKIE_ACCEPT).await {
                debug!("Cookie banner not dismissed: {}", e);
            }
        }

        if !session.wait_for_element(LOGIN_FORM, probe).await {
            debug!("No login form, reusing existing Facebook session");
            return self.verify_marketplace_access(session).await;
        }

        if session
            .fill(EMAIL_INPUT, credentials.login_identifier())
            .await
            .is_err()
            || session
                .fill(PASSWORD_INPUT, credentials.password())
                .await
                .is_err()
            || session.click(LOGIN_BUTTON).await.is_err()
        {
            return Ok(false);
        }
        self.settle(session).await;

        if session.wait_for_element(CHECKPOINT, probe).await {
            return Err(StepError::LoginRequired(
                "Facebook requires two-factor verification - manual intervention needed".to_string(),
            ));
        }

        self.verify_marketplace_access(session).await
    }

    async fn post_ad(&self, session: &dyn Session, ad: &AdData, _credentials: &Credentials) -> PostResult {
        match self.run(session, ad).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Facebook posting stopped: {}", e);
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(map_category(CATEGORIES, "Furniture", FALLBACK_CATEGORY), "HOME_GARDEN");
        assert_eq!(map_category(CATEGORIES, "vehicles", FALLBACK_CATEGORY), "VEHICLE");
        assert_eq!(map_category(CATEGORIES, "garden gnomes", FALLBACK_CATEGORY), "OTHER");
    }

    #[test]
    fn test_no_title_limit() {
        let adapter = FacebookAdapter::new(AdapterSettings::default());
        assert_eq!(adapter.title_limit(), None);
        assert_eq!(adapter.name(), "facebook");
    }
}
