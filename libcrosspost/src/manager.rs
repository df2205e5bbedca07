//! Posting orchestration across marketplaces
//!
//! The [`AutomationManager`] owns one long-lived adapter per platform plus
//! that adapter's [`AdapterState`]. Every attempt runs inside its own
//! session, which is closed on every exit path, and every outcome
//! (including a panicking adapter) comes back as a [`PostResult`].

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::Result;
use crate::platforms::{create_adapters, Adapter};
use crate::session::{ChromeLauncher, Session, SessionLauncher};
use crate::state::{AdapterState, DEFAULT_RETRY_AFTER};
use crate::types::{error_codes, AdData, Credentials, PostResult, PostStatus};

struct Registration {
    adapter: Arc<dyn Adapter>,
    state: Mutex<AdapterState>,
}

impl Registration {
    fn state(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn automation_error(platform: &str, panic: Box<dyn Any + Send>) -> PostResult {
    let message = panic_message(panic.as_ref());
    error!("Adapter {} panicked: {}", platform, message);
    PostResult::failed(format!("Automation error: {}", message))
        .with_error_code(error_codes::AUTOMATION_ERROR)
}

/// Registry of adapters and the failure boundary for posting attempts
///
/// # Examples
///
/// ```no_run
/// use libcrosspost::config::Config;
/// use libcrosspost::types::{AdData, Credentials};
/// use libcrosspost::AutomationManager;
/// use std::collections::HashMap;
///
/// # async fn example() -> libcrosspost::Result<()> {
/// let manager = AutomationManager::from_config(&Config::load()?)?;
/// let ad = AdData::new("Road bike", "54cm frame", 400.0, "sports", "Phoenix");
///
/// let mut credentials = HashMap::new();
/// credentials.insert("craigslist".to_string(), Credentials::new("me@example.com", "pw"));
///
/// let platforms = vec!["craigslist".to_string(), "offerup".to_string()];
/// let results = manager.post_to_multiple_platforms(&platforms, &ad, &credentials).await;
/// for (platform, result) in &results {
///     println!("{}: {}", platform, result.status);
/// }
/// # Ok(())
/// # }
/// ```
pub struct AutomationManager {
    platforms: HashMap<String, Registration>,
    launcher: Arc<dyn SessionLauncher>,
}

impl AutomationManager {
    /// Empty registry using `launcher` to open browser sessions
    pub fn new(launcher: Arc<dyn SessionLauncher>) -> Self {
        Self {
            platforms: HashMap::new(),
            launcher,
        }
    }

    /// Registry with every enabled built-in adapter and a Chrome launcher
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut manager = Self::new(Arc::new(ChromeLauncher::new()));
        for adapter in create_adapters(config)? {
            manager.register_platform(adapter);
        }
        info!(
            "Registered {} platform adapter(s)",
            manager.platforms.len()
        );
        Ok(manager)
    }

    /// Add an adapter under its name; a later registration replaces an
    /// earlier one and starts from a clean state
    pub fn register_platform(&mut self, adapter: Arc<dyn Adapter>) {
        let name = adapter.name().to_string();
        if self.platforms.contains_key(&name) {
            warn!("Replacing adapter registered as {}", name);
        }
        self.platforms.insert(
            name,
            Registration {
                adapter,
                state: Mutex::new(AdapterState::new()),
            },
        );
    }

    /// Registered platform names, sorted
    pub fn registered_platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.platforms.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn adapter(&self, platform: &str) -> Option<Arc<dyn Adapter>> {
        self.platforms.get(platform).map(|r| Arc::clone(&r.adapter))
    }

    pub fn supported_categories(&self, platform: &str) -> Option<Vec<String>> {
        self.platforms
            .get(platform)
            .map(|r| r.adapter.supported_categories())
    }

    /// Snapshot of a platform's state
    pub fn state(&self, platform: &str) -> Option<AdapterState> {
        self.platforms.get(platform).map(|r| r.state().clone())
    }

    /// Post `ad` to one platform
    ///
    /// Always returns a result: unknown platforms, invalid ads, blocked
    /// adapters, session failures and adapter panics are all folded into a
    /// [`PostResult`]. Only completed attempts update the adapter's state.
    pub async fn post_to_platform(
        &self,
        platform: &str,
        ad: &AdData,
        credentials: &Credentials,
    ) -> PostResult {
        let Some(registration) = self.platforms.get(platform) else {
            warn!("Platform {} not supported", platform);
            return PostResult::failed(format!("Platform {} not supported", platform))
                .with_error_code(error_codes::UNSUPPORTED_PLATFORM);
        };
        let adapter = registration.adapter.as_ref();

        if let Err(e) = adapter.validate_ad(ad) {
            warn!("Ad rejected for {}: {}", platform, e);
            return PostResult::failed(e.to_string()).with_error_code(error_codes::VALIDATION_ERROR);
        }

        let blocked_for = registration.state().retry_after_at(Utc::now());
        if let Some(retry_after) = blocked_for {
            info!(
                "{} is rate limited for another {}s, not attempting",
                platform,
                retry_after.as_secs()
            );
            return PostResult::rate_limited(Some(retry_after), "Platform is rate limited");
        }

        let mut result = self
            .run_attempt(adapter, ad, credentials)
            .instrument(info_span!("post_attempt", platform = %platform))
            .await;

        if result.status == PostStatus::RateLimited && result.retry_after.is_none() {
            result.retry_after = Some(DEFAULT_RETRY_AFTER);
        }
        registration.state().record(&result, Utc::now());
        result
    }

    async fn run_attempt(
        &self,
        adapter: &dyn Adapter,
        ad: &AdData,
        credentials: &Credentials,
    ) -> PostResult {
        let mut session = match adapter.open_session(self.launcher.as_ref()).await {
            Ok(session) => session,
            Err(e) => {
                error!("Could not open session for {}: {}", adapter.name(), e);
                return PostResult::failed(format!("Failed to open session: {}", e))
                    .with_error_code(error_codes::SESSION_ERROR);
            }
        };

        let outcome = AssertUnwindSafe(Self::login_and_post(
            adapter,
            session.as_ref(),
            ad,
            credentials,
        ))
        .catch_unwind()
        .await;
        session.close().await;

        let result = outcome.unwrap_or_else(|panic| automation_error(adapter.name(), panic));
        if result.is_success() {
            info!(
                "Posted to {}: {}",
                adapter.name(),
                result.post_url.as_deref().unwrap_or("no listing url")
            );
        } else {
            warn!(
                "Posting to {} ended as {}: {}",
                adapter.name(),
                result.status,
                result.message.as_deref().unwrap_or("")
            );
        }
        result
    }

    async fn login_and_post(
        adapter: &dyn Adapter,
        session: &dyn Session,
        ad: &AdData,
        credentials: &Credentials,
    ) -> PostResult {
        match adapter.validate_credentials(session, credentials).await {
            Ok(true) => adapter.post_ad(session, ad, credentials).await,
            Ok(false) => PostResult::login_required("Invalid credentials"),
            Err(step) => step.into(),
        }
    }

    /// Post `ad` to several platforms concurrently
    ///
    /// Platforms without an entry in `credentials` are skipped and absent
    /// from the returned map; duplicates are posted once. A panic in one
    /// platform's attempt only affects that platform's entry.
    pub async fn post_to_multiple_platforms(
        &self,
        platforms: &[String],
        ad: &AdData,
        credentials: &HashMap<String, Credentials>,
    ) -> HashMap<String, PostResult> {
        let mut seen = HashSet::new();
        let attempts = platforms
            .iter()
            .filter(|platform| seen.insert(platform.as_str()))
            .filter_map(|platform| match credentials.get(platform) {
                Some(creds) => Some((platform, creds)),
                None => {
                    info!("Skipping {}: no credentials supplied", platform);
                    None
                }
            })
            .map(|(platform, creds)| async move {
                let result = AssertUnwindSafe(self.post_to_platform(platform, ad, creds))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| automation_error(platform, panic));
                (platform.clone(), result)
            });

        join_all(attempts).await.into_iter().collect()
    }
}
