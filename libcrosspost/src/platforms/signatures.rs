//! Page signatures used to classify what a platform showed us
//!
//! Each adapter owns a [`SignatureTable`] listing the selectors, texts and URL
//! markers that identify success, errors, throttling, blocked accounts and
//! CAPTCHAs on its pages. Marketplaces change their markup without notice,
//! so these tables are kept apart from the posting steps and are the only
//! place that needs editing when a platform redesigns.

use std::time::Duration;

use crate::session::Session;

/// One observable page feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// At least one element matches the CSS selector
    Css(&'static str),
    /// The visible page text contains this (case-insensitive)
    Text(&'static str),
    /// The current URL contains this
    UrlContains(&'static str),
}

impl Probe {
    pub async fn matches(&self, session: &dyn Session) -> bool {
        match self {
            Probe::Css(selector) => session.count(selector).await > 0,
            Probe::Text(text) => session.page_contains_text(text).await,
            Probe::UrlContains(marker) => session
                .current_url()
                .await
                .map(|url| url.contains(marker))
                .unwrap_or(false),
        }
    }

    /// Messages this probe contributes to an error report
    async fn messages(&self, session: &dyn Session) -> Vec<String> {
        match self {
            Probe::Css(selector) => session.texts(selector).await,
            Probe::Text(text) if session.page_contains_text(text).await => vec![text.to_string()],
            _ => Vec::new(),
        }
    }
}

/// Selectors commonly used by CAPTCHA widgets
pub const COMMON_CAPTCHA: &[Probe] = &[
    Probe::Css("[data-testid=\"captcha\"]"),
    Probe::Css(".g-recaptcha"),
    Probe::Css("#captcha"),
    Probe::Css("iframe[src*=\"captcha\"]"),
    Probe::Css("iframe[src*=\"recaptcha\"]"),
];

/// What a page looked like after submitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success { url: Option<String> },
    RateLimited,
    AccountBlocked(String),
    Captcha,
    /// Error texts scraped from the page
    Failed(Vec<String>),
    /// No known signature appeared before the deadline
    Unverified,
}

#[derive(Debug, Clone, Copy)]
pub struct SignatureTable {
    pub captcha: &'static [Probe],
    /// Checked in order; the first match wins
    pub success: &'static [Probe],
    pub errors: &'static [Probe],
    pub rate_limited: &'static [Probe],
    pub account_blocked: &'static [Probe],
    /// Block window applied when throttling is detected
    pub retry_after: Duration,
}

async fn any_match(probes: &[Probe], session: &dyn Session) -> Option<Probe> {
    for probe in probes {
        if probe.matches(session).await {
            return Some(*probe);
        }
    }
    None
}

impl SignatureTable {
    pub async fn captcha_present(&self, session: &dyn Session) -> bool {
        any_match(self.captcha, session).await.is_some()
    }

    /// Distinct error texts currently on the page
    pub async fn scrape_errors(&self, session: &dyn Session) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for probe in self.errors {
            for message in probe.messages(session).await {
                if !found.contains(&message) {
                    found.push(message);
                }
            }
        }
        found
    }

    /// Poll the page until one signature matches or `timeout` elapses
    pub async fn detect(&self, session: &dyn Session, timeout: Duration, poll: Duration) -> Completion {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if any_match(self.success, session).await.is_some() {
                return Completion::Success {
                    url: session.current_url().await,
                };
            }
            if let Some(probe) = any_match(self.account_blocked, session).await {
                let reason = match probe {
                    Probe::Text(text) => text.to_string(),
                    _ => "Account is blocked or restricted".to_string(),
                };
                return Completion::AccountBlocked(reason);
            }
            if any_match(self.rate_limited, session).await.is_some() {
                return Completion::RateLimited;
            }
            if self.captcha_present(session).await {
                return Completion::Captcha;
            }
            let errors = self.scrape_errors(session).await;
            if !errors.is_empty() {
                return Completion::Failed(errors);
            }

            if tokio::time::Instant::now() >= deadline {
                return Completion::Unverified;
            }
            tokio::time::sleep(poll).await;
        }
    }
}
