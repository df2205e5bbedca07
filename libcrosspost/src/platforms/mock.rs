//! Mock adapter for testing
//!
//! This module provides a configurable adapter that can simulate successes,
//! classified failures, rejected credentials, panics and slow platforms. It
//! drives the session it is given (one navigation per post) so tests can
//! verify session handling in the manager without a browser or network.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use super::steps::{StepError, StepResult};
use super::Adapter;
use crate::config::AdapterSettings;
use crate::rate_limiter::RateLimiter;
use crate::session::Session;
use crate::types::{AdData, Credentials, PostResult};

/// What the mock does when asked to post
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return a success with a generated id
    Succeed,
    /// Return this result as-is
    Respond(PostResult),
    /// Panic inside `post_ad`
    Panic(String),
    /// Reject the credentials during login
    RejectLogin,
    /// Fail the login step with this error
    LoginError(StepError),
}

/// Configuration for mock adapter behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Registry name (e.g., "mock-a")
    pub name: String,

    pub outcome: MockOutcome,

    /// Delay before completing a post (simulates a slow platform)
    pub delay: Duration,

    /// Title limit enforced by `validate_ad`
    pub title_limit: Option<usize>,

    /// Number of times login has been called
    pub login_call_count: Arc<Mutex<usize>>,

    /// Number of times post_ad has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Titles of ads that were posted (for verification)
    pub posted_titles: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            outcome: MockOutcome::Succeed,
            delay: Duration::ZERO,
            title_limit: None,
            login_call_count: Arc::new(Mutex::new(0)),
            post_call_count: Arc::new(Mutex::new(0)),
            posted_titles: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock adapter for testing
pub struct MockAdapter {
    config: MockConfig,
    settings: AdapterSettings,
    limiter: RateLimiter,
}

impl MockAdapter {
    /// Create a new mock adapter with the given configuration
    pub fn new(config: MockConfig) -> Self {
        let settings = AdapterSettings {
            requests_per_second: 0.0,
            human_pacing: false,
            ..Default::default()
        };
        Self {
            config,
            limiter: RateLimiter::unlimited(),
            settings,
        }
    }

    fn with_outcome(name: &str, outcome: MockOutcome) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            outcome,
            ..Default::default()
        })
    }

    /// Create a mock adapter that always succeeds
    pub fn success(name: &str) -> Self {
        Self::with_outcome(name, MockOutcome::Succeed)
    }

    /// Create a mock adapter that returns `result` from every post
    pub fn responding(name: &str, result: PostResult) -> Self {
        Self::with_outcome(name, MockOutcome::Respond(result))
    }

    /// Create a mock adapter whose post panics
    pub fn panicking(name: &str, message: &str) -> Self {
        Self::with_outcome(name, MockOutcome::Panic(message.to_string()))
    }

    /// Create a mock adapter that rejects every login
    pub fn rejecting_login(name: &str) -> Self {
        Self::with_outcome(name, MockOutcome::RejectLogin)
    }

    /// Create a mock adapter whose login fails with `error`
    pub fn login_error(name: &str, error: StepError) -> Self {
        Self::with_outcome(name, MockOutcome::LoginError(error))
    }

    /// Create a mock adapter that succeeds after `delay`
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Get the number of times login was called
    pub fn login_call_count(&self) -> usize {
        *lock(&self.config.login_call_count)
    }

    /// Get the number of times post_ad was called
    pub fn post_call_count(&self) -> usize {
        *lock(&self.config.post_call_count)
    }

    /// Get the titles of every ad that was posted
    pub fn posted_titles(&self) -> Vec<String> {
        lock(&self.config.posted_titles).clone()
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn supported_categories(&self) -> Vec<String> {
        vec!["other".to_string()]
    }

    fn title_limit(&self) -> Option<usize> {
        self.config.title_limit
    }

    async fn login(&self, _session: &dyn Session, _credentials: &Credentials) -> StepResult<bool> {
        *lock(&self.config.login_call_count) += 1;
        match &self.config.outcome {
            MockOutcome::RejectLogin => Ok(false),
            MockOutcome::LoginError(error) => Err(error.clone()),
            _ => Ok(true),
        }
    }

    async fn post_ad(&self, session: &dyn Session, ad: &AdData, _credentials: &Credentials) -> PostResult {
        *lock(&self.config.post_call_count) += 1;

        if let Err(e) = session
            .navigate(&format!("https://{}.example/post", self.config.name))
            .await
        {
            return PostResult::failed(format!("Failed to load post page: {}", e));
        }
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        match &self.config.outcome {
            MockOutcome::Panic(message) => panic!("{}", message),
            MockOutcome::Respond(result) => result.clone(),
            _ => {
                lock(&self.config.posted_titles).push(ad.title.clone());
                let id = format!("{}_{}", self.config.name, self.post_call_count());
                PostResult::success(
                    id.clone(),
                    Some(format!("https://{}.example/item/{}", self.config.name, id)),
                    format!("Ad posted successfully to {}", self.config.name),
                )
            }
        }
    }
}
