//! Marketplace adapters
//!
//! Every marketplace is driven by an [`Adapter`]: it logs in, maps the ad's
//! fields onto the platform's form (or API call), submits it and classifies
//! what happened. Adapters never return errors for posting problems; every
//! outcome is folded into a [`PostResult`].
//!
//! The set of built-in platforms is closed and listed in [`PlatformKind`].
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcrosspost::config::Config;
//! use libcrosspost::platforms::PlatformKind;
//! use libcrosspost::session::ChromeLauncher;
//! use libcrosspost::types::{AdData, Credentials};
//! use libcrosspost::AutomationManager;
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let config = Config::load()?;
//! let mut manager = AutomationManager::new(Arc::new(ChromeLauncher::new()));
//! manager.register_platform(PlatformKind::Craigslist.build(&config)?);
//!
//! let ad = AdData::new("Oak dining table", "Seats six", 250.0, "furniture", "Phoenix");
//! let creds = Credentials::new("seller@example.com", "secret");
//! let result = manager.post_to_platform("craigslist", &ad, &creds).await;
//! println!("{}: {:?}", result.status, result.post_url);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AdapterSettings, Config, PlatformDefaults};
use crate::error::{PlatformError, Result};
use crate::rate_limiter::RateLimiter;
use crate::session::{Session, SessionLauncher, SessionOptions, SessionResult};
use crate::types::{AdData, Credentials, PostResult};

pub mod craigslist;
pub mod ebay;
pub mod facebook;
pub mod location;
pub mod offerup;
pub mod signatures;
pub mod steps;

// Mock adapter is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use steps::{StepError, StepResult};

/// Contract implemented by every marketplace adapter
///
/// One instance lives for the whole process and may serve concurrent
/// attempts, so implementations keep no per-attempt state on `self`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Registry key, lowercase (e.g. "craigslist")
    fn name(&self) -> &str;

    fn settings(&self) -> &AdapterSettings;

    /// Throttle for this platform only, taken before every navigation or API call
    fn limiter(&self) -> &RateLimiter;

    /// Categories understood by the platform's mapping table
    fn supported_categories(&self) -> Vec<String>;

    /// Maximum title length in characters, if the platform enforces one
    fn title_limit(&self) -> Option<usize> {
        None
    }

    /// Check the ad before any session is opened
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Validation` when the ad is unusable in general
    /// or breaks a platform limit.
    fn validate_ad(&self, ad: &AdData) -> std::result::Result<(), PlatformError> {
        ad.validate()?;
        if let Some(limit) = self.title_limit() {
            let length = ad.title.chars().count();
            if length > limit {
                return Err(PlatformError::Validation(format!(
                    "Title is {} characters, {} allows at most {}",
                    length,
                    self.name(),
                    limit
                )));
            }
        }
        Ok(())
    }

    /// Open the session used for one attempt
    ///
    /// Browser-driven adapters launch a fresh, fingerprinted browser context.
    async fn open_session(&self, launcher: &dyn SessionLauncher) -> SessionResult<Box<dyn Session>> {
        launcher
            .launch(&SessionOptions::for_platform(self.name(), self.settings()))
            .await
    }

    /// Sign in within `session`
    ///
    /// `Ok(true)` also covers platforms that allow anonymous posting.
    /// `Ok(false)` means the credentials were rejected.
    async fn login(&self, session: &dyn Session, credentials: &Credentials) -> StepResult<bool>;

    /// Check credentials before posting; defaults to logging in
    async fn validate_credentials(
        &self,
        session: &dyn Session,
        credentials: &Credentials,
    ) -> StepResult<bool> {
        self.login(session, credentials).await
    }

    /// Run the posting flow. Assumes `validate_credentials` succeeded in the
    /// same session.
    async fn post_ad(&self, session: &dyn Session, ad: &AdData, credentials: &Credentials) -> PostResult;
}

/// The built-in marketplaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    Facebook,
    Craigslist,
    OfferUp,
    Ebay,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 4] = [
        PlatformKind::Facebook,
        PlatformKind::Craigslist,
        PlatformKind::OfferUp,
        PlatformKind::Ebay,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PlatformKind::Facebook => facebook::NAME,
            PlatformKind::Craigslist => craigslist::NAME,
            PlatformKind::OfferUp => offerup::NAME,
            PlatformKind::Ebay => ebay::NAME,
        }
    }

    pub fn defaults(&self) -> PlatformDefaults {
        let (requests_per_second, upload_secs) = match self {
            PlatformKind::Facebook => (0.5, 120),
            PlatformKind::Craigslist => (0.2, 60),
            PlatformKind::OfferUp => (0.3, 120),
            PlatformKind::Ebay => (0.1, 120),
        };
        PlatformDefaults {
            requests_per_second,
            upload_timeout: Duration::from_secs(upload_secs),
        }
    }

    /// Construct the adapter with settings resolved from `config`
    pub fn build(&self, config: &Config) -> Result<Arc<dyn Adapter>> {
        let settings = config.adapter_settings(self.name(), self.defaults());
        let adapter: Arc<dyn Adapter> = match self {
            PlatformKind::Facebook => Arc::new(facebook::FacebookAdapter::new(settings)),
            PlatformKind::Craigslist => Arc::new(craigslist::CraigslistAdapter::new(settings)),
            PlatformKind::OfferUp => Arc::new(offerup::OfferUpAdapter::new(settings)),
            PlatformKind::Ebay => {
                let section = config.platform(ebay::NAME);
                let endpoint = match section.and_then(|s| s.endpoint.clone()) {
                    Some(endpoint) => endpoint,
                    None if section.and_then(|s| s.sandbox).unwrap_or(true) => {
                        ebay::SANDBOX_ENDPOINT.to_string()
                    }
                    None => ebay::PRODUCTION_ENDPOINT.to_string(),
                };
                Arc::new(ebay::EbayAdapter::new(settings, endpoint)?)
            }
        };
        Ok(adapter)
    }
}

impl FromStr for PlatformKind {
    type Err = PlatformError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        PlatformKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| PlatformError::UnknownPlatform(s.to_string()))
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Build every enabled built-in adapter
pub fn create_adapters(config: &Config) -> Result<Vec<Arc<dyn Adapter>>> {
    PlatformKind::ALL
        .iter()
        .filter(|kind| config.is_enabled(kind.name()))
        .map(|kind| kind.build(config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;

    #[test]
    fn test_platform_kind_round_trip_names() {
        for kind in PlatformKind::ALL {
            assert_eq!(kind.name().parse::<PlatformKind>().unwrap(), kind);
        }
        assert_eq!(" OfferUp ".parse::<PlatformKind>().unwrap(), PlatformKind::OfferUp);
        assert!(matches!(
            "myspace".parse::<PlatformKind>(),
            Err(PlatformError::UnknownPlatform(_))
        ));
    }

    #[test]
    fn test_default_rates() {
        assert_eq!(PlatformKind::Facebook.defaults().requests_per_second, 0.5);
        assert_eq!(PlatformKind::Craigslist.defaults().requests_per_second, 0.2);
        assert_eq!(PlatformKind::OfferUp.defaults().requests_per_second, 0.3);
        assert_eq!(PlatformKind::Ebay.defaults().requests_per_second, 0.1);
    }

    #[test]
    fn test_create_adapters_skips_disabled() {
        let mut config = Config::default();
        config.platforms.insert(
            "offerup".to_string(),
            PlatformConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let adapters = create_adapters(&config).unwrap();
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["facebook", "craigslist", "ebay"]);
    }

    #[test]
    fn test_built_adapters_use_configured_rate() {
        let mut config = Config::default();
        config.platforms.insert(
            "craigslist".to_string(),
            PlatformConfig {
                requests_per_second: Some(0.05),
                ..Default::default()
            },
        );
        let adapter = PlatformKind::Craigslist.build(&config).unwrap();
        assert_eq!(adapter.limiter().requests_per_second(), 0.05);
        assert_eq!(adapter.settings().upload_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_title_limit_validation() {
        let adapter = PlatformKind::Ebay.build(&Config::default()).unwrap();
        let ad = AdData::new("x".repeat(81), "desc", 5.0, "other", "Phoenix");
        assert!(matches!(
            adapter.validate_ad(&ad),
            Err(PlatformError::Validation(_))
        ));
    }
}
