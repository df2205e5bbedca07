//! OfferUp adapter
//!
//! OfferUp's markup differs between rollouts, so every field is located
//! through a list of selector variants; the first one present on the page
//! is used.

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

pub const NAME: &str = "offerup";

const BASE_URL: &str = "https://offerup.com";
const LOGIN_URL: &str = "https://offerup.com/login";
const SELL_URL: &str = "https://offerup.com/sell";

const CATEGORIES: &[(&str, &str)] = &[
    ("electronics", "electronics"),
    ("furniture", "home-garden"),
    ("vehicles", "auto-parts"),
    ("real estate", "housing"),
    ("appliances", "home-garden"),
    ("clothing", "clothing-shoes"),
    ("sports", "sporting-goods"),
    ("tools", "home-garden"),
    ("other", "everything-else"),
];
const FALLBACK_CATEGORY: &str = "everything-else";

const EMAIL_INPUTS: &[&str] = &[
    "[data-testid=\"email-input\"]",
    "input[type=\"email\"]",
    "input[name=\"email\"]",
    "#email",
];
const PASSWORD_INPUTS: &[&str] = &[
    "[data-testid=\"password-input\"]",
    "input[type=\"password\"]",
    "input[name=\"password\"]",
    "#password",
];
const LOGIN_BUTTONS: &[&str] = &[
    "[data-testid=\"login-button\"]",
    "button[type=\"submit\"]",
    "input[type=\"submit\"]",
];
const SIGNED_IN_MARKERS: &[&str] = &[
    "[data-testid=\"user-menu\"]",
    "[data-testid=\"profile-menu\"]",
    "a[href=\"/profile\"]",
    ".user-avatar",
    "[data-testid=\"sell-button\"]",
];

const SELL_FORM: &str = "[data-testid=\"sell-form\"], .sell-form, #sell-form";
const TITLE_INPUTS: &[&str] = &[
    "[data-testid=\"title-input\"]",
    "input[name=\"title\"]",
    "input[placeholder*=\"title\"]",
    ".title-input input",
];
const CATEGORY_CONTROLS: &[&str] = &[
    "[data-testid=\"category-select\"]",
    "select[name=\"category\"]",
    ".category-select",
    "[data-testid=\"category-dropdown\"]",
];
const PRICE_INPUTS: &[&str] = &[
    "[data-testid=\"price-input\"]",
    "input[name=\"price\"]",
    "input[type=\"number\"]",
    "input[placeholder*=\"price\"]",
];
const DESCRIPTION_INPUTS: &[&str] = &[
    "[data-testid=\"description-input\"]",
    "textarea[name=\"description\"]",
    "textarea[placeholder*=\"description\"]",
    ".description-input textarea",
];
const LOCATION_INPUTS: &[&str] = &[
    "[data-testid=\"location-input\"]",
    "input[name=\"location\"]",
    "input[placeholder*=\"location\"]",
    ".location-input input",
];
const LOCATION_SUGGESTIONS: &[&str] = &[
    ".location-suggestion:first-child",
    "[data-testid=\"location-suggestion\"]:first-child",
    ".suggestion-item:first-child",
];
const SUBMIT_BUTTONS: &[&str] = &[
    "[data-testid=\"submit-button\"]",
    "[data-testid=\"post-button\"]",
    "button[type=\"submit\"]",
    ".post-button",
    ".submit-button",
];

const UPLOAD: UploadTarget<'static> = UploadTarget {
    file_inputs: &[
        "[data-testid=\"image-upload\"] input[type=\"file\"]",
        ".image-upload input[type=\"file\"]",
        "input[type=\"file\"]",
    ],
    trigger: Some("[data-testid=\"photo-upload\"]"),
    completion: UploadCompletion::Previews {
        progress: "[data-testid=\"upload-progress\"]",
        preview: "[data-testid=\"photo-preview\"]",
    },
};

const LISTING_LINKS: &[&str] = &["a[href*=\"/item/\"]", "[data-testid=\"listing-link\"]"];

pub static SIGNATURES: SignatureTable = SignatureTable {
    captcha: COMMON_CAPTCHA,
    success: &[
        Probe::Text("Your item is now live"),
        Probe::Text("Successfully posted"),
        Probe::Text("Item posted"),
        Probe::Css("[data-testid=\"success-message\"]"),
        Probe::Css(".success-message"),
        Probe::Text("listed successfully"),
        Probe::UrlContains("/item/"),
    ],
    errors: &[
        Probe::Css(".error-message"),
        Probe::Css("[data-testid=\"error-message\"]"),
        Probe::Css(".alert-error"),
        Probe::Css(".validation-error"),
    ],
    rate_limited: &[
        Probe::Text("posting too often"),
        Probe::Text("try again later"),
    ],
    account_blocked: &[
        Probe::Text("account has been suspended"),
        Probe::Text("account has been banned"),
    ],
    retry_after: Duration::from_secs(1800),
};

pub struct OfferUpAdapter {
    settings: AdapterSettings,
    limiter: RateLimiter,
    images: ImageTransfer,
}

impl OfferUpAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        let source = Arc::new(HttpImageSource::new(settings.download_timeout));
        Self::with_image_source(settings, source)
    }

    pub fn with_image_source(settings: AdapterSettings, source: Arc<dyn ImageSource>) -> Self {
        Self {
            limiter: RateLimiter::new(settings.requests_per_second),
            images: ImageTransfer::new(NAME, source, &settings),
            settings,
        }
    }

    async fn settle(&self, session: &dyn Session) {
        session
            .pause(Duration::from_secs(1), Duration::from_secs(3))
            .await;
    }

    async fn verify_login(&self, session: &dyn Session) -> bool {
        if let Some(marker) =
            first_present(session, SIGNED_IN_MARKERS, self.settings.probe_timeout).await
        {
            debug!("OfferUp login verified via {}", marker);
            return true;
        }
        let still_on_login = session
            .current_url()
            .await
            .map(|url| url.to_lowercase().contains("login"))
            .unwrap_or(false);
        if still_on_login {
            warn!("Still on OfferUp login page, credentials rejected");
            return false;
        }
        true
    }

    /// Best effort: a missing category control does not stop the listing
    async fn select_category(&self, session: &dyn Session, category: &str) {
        let value = map_category(CATEGORIES, category, FALLBACK_CATEGORY);
        let Some(control) =
            first_present(session, CATEGORY_CONTROLS, self.settings.probe_timeout).await
        else {
            warn!("Could not find OfferUp category selector");
            return;
        };

        if session.select_value(control, value).await.is_ok() {
            return;
        }
        // Custom dropdowns: open, then click the option
        if let Err(e) = session.click(control).await {
            debug!("Category dropdown {} not clickable: {}", control, e);
            return;
        }
        let option = format!("[data-value=\"{}\"], [value=\"{}\"]", value, value);
        if session
            .wait_for_element(&option, self.settings.probe_timeout)
            .await
        {
            if let Err(e) = session.click(&option).await {
                debug!("Category option {} not clickable: {}", value, e);
            }
        }
    }

    async fn set_location(&self, session: &dyn Session, location: &str) {
        let probe = self.settings.probe_timeout;
        let Some(input) = first_present(session, LOCATION_INPUTS, probe).await else {
            debug!("No OfferUp location field");
            return;
        };
        if let Err(e) = session.fill(input, location).await {
            debug!("Location not filled: {}", e);
            return;
        }
        self.settle(session).await;
        if let Some(suggestion) = click_first(session, LOCATION_SUGGESTIONS, probe).await {
            debug!("Picked location suggestion {}", suggestion);
        }
    }

    async fn run(&self, session: &dyn Session, ad: &AdData) -> StepResult<PostResult> {
        let timeout = self.settings.element_timeout;
        let probe = self.settings.probe_timeout;

        info!("Opening OfferUp sell page");
        goto(session, &self.limiter, SELL_URL).await?;
        self.settle(session).await;
        ensure_no_captcha(session, &SIGNATURES).await?;

        if !session.wait_for_element(SELL_FORM, timeout).await {
            return Err(StepError::failed("form", "Sell form did not load"));
        }

        fill_first(session, "title", TITLE_INPUTS, &ad.title, probe).await?;
        self.select_category(session, &ad.category).await;
        fill_first(session, "price", PRICE_INPUTS, &ad.whole_price(), probe).await?;
        fill_first(session, "description", DESCRIPTION_INPUTS, &ad.description, probe).await?;
        self.set_location(session, &ad.location).await;

        if !ad.images.is_empty() {
            let report = self.images.upload(session, &ad.images, &UPLOAD).await;
            if let Some(reason) = report.error {
                warn!("OfferUp images skipped: {}", reason);
            }
        }

        ensure_no_captcha(session, &SIGNATURES).await?;
        if click_first(session, SUBMIT_BUTTONS, timeout).await.is_none() {
            return Err(StepError::failed("submit", "Could not find submit button"));
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
            id_prefix: "ou",
            marker: "/item/",
            link_selectors: LISTING_LINKS,
            base_url: BASE_URL,
        };
        Ok(locator.conclude(session, &SIGNATURES, completion).await)
    }
}

#[async_trait]
impl Adapter for OfferUpAdapter {
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

        info!("Signing in to OfferUp");
        goto(session, &self.limiter, LOGIN_URL).await?;
        self.settle(session).await;

        if first_present(session, EMAIL_INPUTS, self.settings.element_timeout)
            .await
            .is_none()
        {
            warn!("OfferUp login form not found");
            return Ok(false);
        }
        if fill_first(session, "email", EMAIL_INPUTS, &credentials.username, probe)
            .await
            .is_err()
            || fill_first(session, "password", PASSWORD_INPUTS, credentials.password(), probe)
                .await
                .is_err()
            || click_first(session, LOGIN_BUTTONS, probe).await.is_none()
        {
            return Ok(false);
        }
        self.settle(session).await;

        Ok(self.verify_login(session).await)
    }

    async fn post_ad(&self, session: &dyn Session, ad: &AdData, _credentials: &Credentials) -> PostResult {
        match self.run(session, ad).await {
            Ok(result) => result,
            Err(e) => {
                warn!("OfferUp posting stopped: {}", e);
                e.into()
            }
        }
    }
}
