//! Interactive automation sessions
//!
//! A [`Session`] is a single-use, isolated automation context owned by exactly
//! one posting attempt. Adapters drive it through a small set of primitives;
//! anything that can fail because the page does not look as expected returns
//! a `bool`, an `Option` or a [`SessionError`] so callers can probe optional
//! UI without aborting the flow.
//!
//! Sessions are produced by a [`SessionLauncher`]. Production code uses
//! [`browser::ChromeLauncher`]; tests use [`mock::ScriptedLauncher`].

pub mod browser;
pub mod detached;
pub mod fingerprint;
pub mod mock;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::AdapterSettings;
use crate::error::SessionError;

pub use browser::ChromeLauncher;
pub use detached::DetachedSession;
pub use fingerprint::FingerprintConfig;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Primitive operations available to adapters
///
/// Selectors are CSS selectors. Implementations must be usable through a
/// shared reference so adapters can hold `&dyn Session` while stepping.
#[async_trait]
pub trait Session: Send + Sync {
    /// Load `url` and wait for the navigation to settle
    async fn navigate(&self, url: &str) -> SessionResult<()>;

    /// Wait up to `timeout` for at least one element matching `selector`
    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> bool;

    /// Clear the field and type `text` into it
    async fn fill(&self, selector: &str, text: &str) -> SessionResult<()>;

    async fn click(&self, selector: &str) -> SessionResult<()>;

    /// Number of elements currently matching `selector`
    async fn count(&self, selector: &str) -> usize;

    async fn current_url(&self) -> Option<String>;

    /// Case-insensitive search of the visible page text
    async fn page_contains_text(&self, text: &str) -> bool;

    /// Trimmed, non-empty text of every element matching `selector`
    async fn texts(&self, selector: &str) -> Vec<String>;

    /// Trimmed text of every option of a `<select>`, blank ones included
    ///
    /// Positions line up with the indices taken by [`Session::select_option`].
    async fn option_texts(&self, select: &str) -> Vec<String>;

    async fn attribute(&self, selector: &str, name: &str) -> Option<String>;

    /// False when the element is missing or disabled
    async fn is_enabled(&self, selector: &str) -> bool;

    /// Select the option at `index` of a `<select>` element
    async fn select_option(&self, selector: &str, index: usize) -> SessionResult<()>;

    /// Select the option whose `value` attribute equals `value`
    async fn select_value(&self, selector: &str, value: &str) -> SessionResult<()>;

    /// Attach local files to a file input
    async fn set_input_files(&self, selector: &str, files: &[PathBuf]) -> SessionResult<()>;

    /// Sleep for a random duration in `[min, max]` when pacing is enabled
    async fn pause(&self, min: Duration, max: Duration);

    /// Release the context
    ///
    /// Only the first call has an effect; primitives called afterwards fail
    /// with [`SessionError::Closed`].
    async fn close(&mut self);
}

/// Creates a fresh session for each attempt
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, options: &SessionOptions) -> SessionResult<Box<dyn Session>>;
}

/// Randomized typing and idle delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub enabled: bool,
    pub keystroke_min: Duration,
    pub keystroke_max: Duration,
}

impl Pacing {
    pub fn human() -> Self {
        Self {
            enabled: true,
            keystroke_min: Duration::from_millis(50),
            keystroke_max: Duration::from_millis(150),
        }
    }

    pub fn none() -> Self {
        Self {
            enabled: false,
            keystroke_min: Duration::ZERO,
            keystroke_max: Duration::ZERO,
        }
    }

    /// Random duration in `[min, max]`, zero when pacing is off
    pub fn jitter(&self, min: Duration, max: Duration) -> Duration {
        use rand::Rng;

        if !self.enabled || max.is_zero() {
            return Duration::ZERO;
        }
        if max <= min {
            return min;
        }
        let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
        Duration::from_millis(millis as u64)
    }

    pub fn keystroke(&self) -> Duration {
        self.jitter(self.keystroke_min, self.keystroke_max)
    }
}

/// Everything a launcher needs to open a session for one platform
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub platform: String,
    pub headless: bool,
    pub fingerprint: FingerprintConfig,
    pub pacing: Pacing,
    pub navigation_timeout: Duration,
}

impl SessionOptions {
    /// Options for one attempt, with a freshly randomized fingerprint
    pub fn for_platform(platform: &str, settings: &AdapterSettings) -> Self {
        Self {
            platform: platform.to_string(),
            headless: settings.headless,
            fingerprint: FingerprintConfig::randomized(),
            pacing: if settings.human_pacing {
                Pacing::human()
            } else {
                Pacing::none()
            },
            navigation_timeout: settings.element_timeout.max(Duration::from_secs(30)),
        }
    }
}

/// JSON-encode a selector or text for interpolation into page scripts
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_none_never_waits() {
        let pacing = Pacing::none();
        assert_eq!(
            pacing.jitter(Duration::from_secs(1), Duration::from_secs(3)),
            Duration::ZERO
        );
        assert_eq!(pacing.keystroke(), Duration::ZERO);
    }

    #[test]
    fn test_pacing_jitter_stays_in_range() {
        let pacing = Pacing::human();
        for _ in 0..50 {
            let d = pacing.jitter(Duration::from_millis(500), Duration::from_millis(1500));
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1500));
        }
        assert!(pacing.keystroke() <= Duration::from_millis(150));
    }

    #[test]
    fn test_options_follow_settings() {
        let settings = AdapterSettings {
            headless: false,
            human_pacing: false,
            ..Default::default()
        };
        let options = SessionOptions::for_platform("offerup", &settings);
        assert_eq!(options.platform, "offerup");
        assert!(!options.headless);
        assert!(!options.pacing.enabled);
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(
            js_string(r#"input[name="PostingTitle"]"#),
            r#""input[name=\"PostingTitle\"]""#
        );
    }
}
