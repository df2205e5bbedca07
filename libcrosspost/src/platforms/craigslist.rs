//! Craigslist adapter
//!
//! Craigslist posts through a multi-page wizard on a city subdomain:
//! listing type, category, the posting form, a preview page and finally
//! publish. Many areas allow anonymous posting, so a missing login form is
//! not an error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::location::select_location;
use super::signatures::{Probe, SignatureTable, COMMON_CAPTCHA};
use super::steps::{
    click_first, ensure_no_captcha, fill_first, fill_optional, goto, map_category, ListingLocator,
    StepError, StepResult,
};
use super::Adapter;
use crate::config::AdapterSettings;
use crate::images::{HttpImageSource, ImageSource, ImageTransfer, UploadCompletion, UploadTarget};
use crate::rate_limiter::RateLimiter;
use crate::session::Session;
use crate::types::{AdData, Credentials, PostResult};

pub const NAME: &str = "craigslist";
pub const TITLE_LIMIT: usize = 70;

const DEFAULT_DOMAIN: &str = "phoenix.craigslist.org";

const CITY_DOMAINS: &[(&str, &str)] = &[
    ("phoenix", "phoenix.craigslist.org"),
    ("los angeles", "losangeles.craigslist.org"),
    ("new york", "newyork.craigslist.org"),
    ("chicago", "chicago.craigslist.org"),
    ("houston", "houston.craigslist.org"),
    ("philadelphia", "philadelphia.craigslist.org"),
    ("san antonio", "sanantonio.craigslist.org"),
    ("san diego", "sandiego.craigslist.org"),
    ("dallas", "dallas.craigslist.org"),
    ("san jose", "sfbay.craigslist.org"),
];

const CATEGORIES: &[(&str, &str)] = &[
    ("electronics", "ela"),
    ("furniture", "fua"),
    ("vehicles", "cta"),
    ("real estate", "rea"),
    ("appliances", "app"),
    ("clothing", "cla"),
    ("sports", "sga"),
    ("tools", "tla"),
    ("other", "foa"),
];
const FALLBACK_CATEGORY: &str = "foa";

// Login page
const EMAIL_INPUT: &str = "input[name=\"inputEmailHandle\"]";
const PASSWORD_INPUT: &str = "input[name=\"inputPassword\"]";
const LOGIN_BUTTONS: &[&str] = &["input[type=\"submit\"][value=\"log in\"]", "button[type=\"submit\"]"];
const ACCOUNT_HOME: &str = "a[href=\"/login/home\"]";

// Posting wizard
const LISTING_TYPES: &[&str] = &["input[value=\"fso\"]", "input[value=\"sss\"]"];
const STEP_SUBMIT: &str = "button[type=\"submit\"]";
const POSTING_FORM: &str = "#postingForm";
const TITLE_INPUT: &str = "input[name=\"PostingTitle\"]";
const PRICE_INPUT: &str = "input[name=\"price\"]";
const BODY_INPUT: &str = "textarea[name=\"PostingBody\"]";
const AREA_SELECT: &str = "select[name=\"area\"]";
const CONTACT_EMAIL: &str = "input[name=\"FromEMail\"]";
const CONTACT_PHONE: &str = "input[name=\"PhoneNumber\"]";
const CONTINUE_BUTTON: &str = "input[value=\"continue\"]";
const PUBLISH_BUTTONS: &[&str] = &[
    "input[value=\"publish\"]",
    "input[value=\"PUBLISH\"]",
    "input[type=\"submit\"][value*=\"publish\"]",
];

const UPLOAD: UploadTarget<'static> = UploadTarget {
    file_inputs: &["input[type=\"file\"]"],
    trigger: None,
    completion: UploadCompletion::ButtonEnabled(CONTINUE_BUTTON),
};

const LISTING_LINKS: &[&str] = &["a[href*=\".craigslist.org\"][href*=\"/d/\"]"];

pub static SIGNATURES: SignatureTable = SignatureTable {
    captcha: COMMON_CAPTCHA,
    success: &[
        Probe::Text("Your posting is live"),
        Probe::Text("Thank you for your submission"),
        Probe::Text("Your ad has been posted"),
        Probe::Css(".posted_success"),
        Probe::UrlContains("/d/"),
    ],
    errors: &[
        Probe::Css(".error"),
        Probe::Css(".errortext"),
        Probe::Css("font[color=\"red\"]"),
        Probe::Text("prohibited"),
        Probe::Text("invalid"),
    ],
    rate_limited: &[Probe::Text("posting limit"), Probe::Text("too many postings")],
    account_blocked: &[
        Probe::Text("has been blocked"),
        Probe::Text("automatically blocked"),
    ],
    retry_after: Duration::from_secs(3600),
};

/// Craigslist subdomain serving `location`; Phoenix when no city matches
pub fn domain_for(location: &str) -> &'static str {
    let location = location.to_lowercase();
    CITY_DOMAINS
        .iter()
        .find(|(city, _)| location.contains(city))
        .map(|(_, domain)| *domain)
        .unwrap_or(DEFAULT_DOMAIN)
}

pub struct CraigslistAdapter {
    settings: AdapterSettings,
    limiter: RateLimiter,
    images: ImageTransfer,
}

impl CraigslistAdapter {
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
            .pause(Duration::from_secs(1), Duration::from_secs(2))
            .await;
    }

    /// Click a wizard choice and advance to the next page, if the choice is shown
    async fn choose(&self, session: &dyn Session, choices: &[&str]) -> bool {
        if click_first(session, choices, self.settings.probe_timeout)
            .await
            .is_none()
        {
            return false;
        }
        if session
            .wait_for_element(STEP_SUBMIT, self.settings.probe_timeout)
            .await
        {
            if let Err(e) = session.click(STEP_SUBMIT).await {
                debug!("Wizard submit not clickable: {}", e);
            }
        }
        self.settle(session).await;
        true
    }

    async fn fill_form(&self, session: &dyn Session, ad: &AdData) -> StepResult {
        let timeout = self.settings.element_timeout;
        let probe = self.settings.probe_timeout;

        if !session.wait_for_element(POSTING_FORM, timeout).await {
            return Err(StepError::failed("form", "Posting form did not load"));
        }
        self.settle(session).await;

        fill_first(session, "title", &[TITLE_INPUT], &ad.title, timeout).await?;
        if session.wait_for_element(PRICE_INPUT, probe).await {
            session
                .fill(PRICE_INPUT, &ad.whole_price())
                .await
                .map_err(|_| StepError::failed("price", "Failed to fill price"))?;
        }
        fill_first(session, "description", &[BODY_INPUT], &ad.description, timeout).await?;

        if session.wait_for_element(AREA_SELECT, probe).await {
            match select_location(session, AREA_SELECT, &ad.location).await {
                Ok(Some(area)) => debug!("Selected Craigslist area {:?}", area),
                Ok(None) => debug!("Craigslist area list is empty"),
                Err(e) => warn!("Could not select Craigslist area: {}", e),
            }
        }

        if let Some(email) = ad.contact_email() {
            fill_optional(session, CONTACT_EMAIL, email, probe).await;
        }
        if let Some(phone) = ad.contact_phone() {
            fill_optional(session, CONTACT_PHONE, phone, probe).await;
        }

        if !ad.images.is_empty() {
            let report = self.images.upload(session, &ad.images, &UPLOAD).await;
            match report.error {
                Some(reason) => warn!("Craigslist images skipped: {}", reason),
                None => info!(
                    "Attached {}/{} images to Craigslist listing",
                    report.downloaded, report.requested
                ),
            }
        }
        Ok(())
    }

    async fn run(&self, session: &dyn Session, ad: &AdData) -> StepResult<PostResult> {
        let domain = domain_for(&ad.location);
        let base_url = format!("https://{}", domain);

        info!("Posting to {}", domain);
        goto(session, &self.limiter, &format!("{}/post", base_url)).await?;
        self.settle(session).await;
        ensure_no_captcha(session, &SIGNATURES).await?;

        self.choose(session, LISTING_TYPES).await;
        let code = map_category(CATEGORIES, &ad.category, FALLBACK_CATEGORY);
        let category = format!("input[value=\"{}\"]", code);
        if !self.choose(session, &[category.as_str()]).await {
            debug!("Category page not shown, assuming {} preselected", code);
        }

        self.fill_form(session, ad).await?;
        ensure_no_captcha(session, &SIGNATURES).await?;

        if click_first(session, &[CONTINUE_BUTTON], self.settings.element_timeout)
            .await
            .is_none()
        {
            return Err(StepError::failed("continue", "Failed to submit form"));
        }
        self.settle(session).await;

        if click_first(session, PUBLISH_BUTTONS, self.settings.probe_timeout)
            .await
            .is_some()
        {
            self.settle(session).await;
        }

        let completion = SIGNATURES
            .detect(
                session,
                self.settings.completion_timeout,
                self.settings.poll_interval,
            )
            .await;
        let locator = ListingLocator {
            platform: NAME,
            id_prefix: "cl",
            marker: "/d/",
            link_selectors: LISTING_LINKS,
            base_url: &base_url,
        };
        Ok(locator.conclude(session, &SIGNATURES, completion).await)
    }
}

#[async_trait]
impl Adapter for CraigslistAdapter {
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

    async fn login(&self, session: &dyn Session, credentials: &Credentials) -> StepResult<bool> {
        let probe = self.settings.probe_timeout;
        goto(
            session,
            &self.limiter,
            &format!("https://{}/login", DEFAULT_DOMAIN),
        )
        .await?;
        self.settle(session).await;

        if !session.wait_for_element(EMAIL_INPUT, probe).await {
            info!("No Craigslist login form, posting anonymously");
            return Ok(true);
        }
        if session.fill(EMAIL_INPUT, &credentials.username).await.is_err()
            || session
                .fill(PASSWORD_INPUT, credentials.password())
                .await
                .is_err()
        {
            return Ok(false);
        }
        if click_first(session, LOGIN_BUTTONS, probe).await.is_none() {
            return Ok(false);
        }
        self.settle(session).await;

        if session.wait_for_element(ACCOUNT_HOME, probe).await {
            info!("Logged in to Craigslist");
        } else {
            warn!("Craigslist login not confirmed, continuing anonymously");
        }
        Ok(true)
    }

    async fn post_ad(&self, session: &dyn Session, ad: &AdData, _credentials: &Credentials) -> PostResult {
        match self.run(session, ad).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Craigslist posting stopped: {}", e);
                e.into()
            }
        }
    }
}
