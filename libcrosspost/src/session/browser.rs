//! Chromium-backed sessions via the DevTools protocol
//!
//! Every launch starts a separate browser process with its own throwaway
//! profile directory, so concurrent attempts never share cookies or storage.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{js_string, Pacing, Session, SessionLauncher, SessionOptions, SessionResult};
use crate::error::SessionError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches one Chromium process per session
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Chrome/Chromium binary instead of auto-detection
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(path.into()),
        }
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self, options: &SessionOptions) -> SessionResult<Box<dyn Session>> {
        let session = BrowserSession::launch(options, self.executable.as_deref()).await?;
        Ok(Box::new(session))
    }
}

pub struct BrowserSession {
    platform: String,
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
    pacing: Pacing,
    navigation_timeout: Duration,
    closed: bool,
}

impl BrowserSession {
    pub async fn launch(options: &SessionOptions, executable: Option<&Path>) -> SessionResult<Self> {
        let fingerprint = &options.fingerprint;
        let profile_dir = std::env::temp_dir().join(format!(
            "crosspost-profile-{}-{}",
            options.platform,
            uuid::Uuid::new_v4()
        ));

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(&profile_dir)
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .viewport(Viewport {
                width: fingerprint.viewport_width,
                height: fingerprint.viewport_height,
                ..Default::default()
            })
            .request_timeout(options.navigation_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg(format!("--lang={}", fingerprint.locale));
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(SessionError::Launch(e.to_string()));
            }
        };

        let session = Self {
            platform: options.platform.clone(),
            browser: Some(browser),
            page,
            handler,
            profile_dir,
            pacing: options.pacing,
            navigation_timeout: options.navigation_timeout,
            closed: false,
        };
        session.apply_fingerprint(options).await?;

        debug!(
            "Opened browser session for {} ({}x{}, {})",
            session.platform,
            fingerprint.viewport_width,
            fingerprint.viewport_height,
            fingerprint.timezone
        );
        Ok(session)
    }

    async fn apply_fingerprint(&self, options: &SessionOptions) -> SessionResult<()> {
        let fingerprint = &options.fingerprint;
        let launch_err = |e: chromiumoxide::error::CdpError| SessionError::Launch(e.to_string());

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(fingerprint.user_agent.clone())
            .accept_language(fingerprint.accept_language())
            .build()
            .map_err(SessionError::Launch)?;
        self.page.execute(user_agent).await.map_err(launch_err)?;

        self.page
            .execute(SetTimezoneOverrideParams::new(fingerprint.timezone.clone()))
            .await
            .map_err(launch_err)?;

        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                fingerprint.extra_headers(),
            )))
            .await
            .map_err(launch_err)?;

        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                fingerprint.stealth_script(),
            ))
            .await
            .map_err(launch_err)?;
        Ok(())
    }

    fn page(&self) -> SessionResult<&Page> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(&self.page)
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> SessionResult<T> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| SessionError::Interaction(e.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|e| SessionError::Interaction(e.to_string()))
    }

    async fn eval_flag(&self, script: String, selector: &str) -> SessionResult<()> {
        if self.eval::<bool>(script).await? {
            Ok(())
        } else {
            Err(SessionError::ElementNotFound(selector.to_string()))
        }
    }
}

#[async_trait]
impl Session for BrowserSession {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        let page = self.page()?;
        match tokio::time::timeout(self.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Navigation(format!("{}: {}", url, e))),
            Err(_) => Err(SessionError::Timeout(url.to_string())),
        }
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count(selector).await > 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&self, selector: &str, text: &str) -> SessionResult<()> {
        let page = self.page()?;
        tokio::time::sleep(self.pacing.jitter(Duration::from_millis(300), Duration::from_millis(800))).await;

        let element = page
            .find_element(selector)
            .await
            .map_err(|_| SessionError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| SessionError::Interaction(e.to_string()))?;

        let clear = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); if ('value' in el) {{ el.value = ''; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); }} return true; }})()",
            sel = js_string(selector)
        );
        self.eval_flag(clear, selector).await?;

        if self.pacing.enabled {
            let mut buf = [0u8; 4];
            for ch in text.chars() {
                element
                    .type_str(ch.encode_utf8(&mut buf))
                    .await
                    .map_err(|e| SessionError::Interaction(e.to_string()))?;
                tokio::time::sleep(self.pacing.keystroke()).await;
            }
        } else {
            element
                .type_str(text)
                .await
                .map_err(|e| SessionError::Interaction(e.to_string()))?;
        }

        tokio::time::sleep(self.pacing.jitter(Duration::from_millis(200), Duration::from_millis(600))).await;
        Ok(())
    }

    async fn click(&self, selector: &str) -> SessionResult<()> {
        let page = self.page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| SessionError::ElementNotFound(selector.to_string()))?;
        tokio::time::sleep(self.pacing.jitter(Duration::from_millis(500), Duration::from_millis(1500))).await;
        element
            .click()
            .await
            .map_err(|e| SessionError::Interaction(e.to_string()))?;
        tokio::time::sleep(self.pacing.jitter(Duration::from_secs(1), Duration::from_secs(2))).await;
        Ok(())
    }

    async fn count(&self, selector: &str) -> usize {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        );
        self.eval::<usize>(script).await.unwrap_or(0)
    }

    async fn current_url(&self) -> Option<String> {
        self.page().ok()?.url().await.ok().flatten()
    }

    async fn page_contains_text(&self, text: &str) -> bool {
        let script = format!(
            "(document.body ? document.body.innerText : '').toLowerCase().includes({}.toLowerCase())",
            js_string(text)
        );
        self.eval::<bool>(script).await.unwrap_or(false)
    }

    async fn texts(&self, selector: &str) -> Vec<String> {
        let script = format!(
            "Array.from(document.querySelectorAll({})) \
             .filter(e => e.tagName === 'OPTION' || e.offsetParent !== null) \
             .map(e => (e.innerText || e.textContent || '').trim()) \
             .filter(t => t.length > 0)",
            js_string(selector)
        );
        self.eval::<Vec<String>>(script).await.unwrap_or_default()
    }

    async fn option_texts(&self, select: &str) -> Vec<String> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el || !el.options) return []; \
             return Array.from(el.options).map(o => (o.text || '').trim()); }})()",
            js_string(select)
        );
        self.eval::<Vec<String>>(script).await.unwrap_or_default()
    }

    async fn attribute(&self, selector: &str, name: &str) -> Option<String> {
        let element = self.page().ok()?.find_element(selector).await.ok()?;
        element.attribute(name).await.ok().flatten()
    }

    async fn is_enabled(&self, selector: &str) -> bool {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             return !!el && !el.disabled && el.getAttribute('aria-disabled') !== 'true'; }})()",
            js_string(selector)
        );
        self.eval::<bool>(script).await.unwrap_or(false)
    }

    async fn select_option(&self, selector: &str, index: usize) -> SessionResult<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el || !el.options || {idx} >= el.options.length) return false; \
             el.selectedIndex = {idx}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            sel = js_string(selector),
            idx = index
        );
        self.eval_flag(script, selector).await
    }

    async fn select_value(&self, selector: &str, value: &str) -> SessionResult<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el || !el.options) return false; \
             const i = Array.from(el.options).findIndex(o => o.value === {val}); \
             if (i < 0) return false; el.selectedIndex = i; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            sel = js_string(selector),
            val = js_string(value)
        );
        self.eval_flag(script, selector).await
    }

    async fn set_input_files(&self, selector: &str, files: &[PathBuf]) -> SessionResult<()> {
        let page = self.page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| SessionError::ElementNotFound(selector.to_string()))?;

        let params = SetFileInputFilesParams::builder()
            .files(files.iter().map(|f| f.to_string_lossy().into_owned()))
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(SessionError::Interaction)?;
        page.execute(params)
            .await
            .map_err(|e| SessionError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn pause(&self, min: Duration, max: Duration) {
        let delay = self.pacing.jitter(min, max);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.page.clone().close().await {
            debug!("Closing page for {} failed: {}", self.platform, e);
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser for {}: {}", self.platform, e);
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(
                "Could not remove profile {}: {}",
                self.profile_dir.display(),
                e
            );
        }
        debug!("Closed browser session for {}", self.platform);
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            // Browser's own Drop kills the child process.
            self.handler.abort();
            let _ = std::fs::remove_dir_all(&self.profile_dir);
        }
    }
}
