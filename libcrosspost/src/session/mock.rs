//! Scripted sessions for testing adapters and the manager
//!
//! A [`ScriptedPage`] describes what a fake page contains (elements, visible
//! text, attributes) and how it reacts to navigation, clicks and uploads.
//! [`ScriptedSession`] plays it back and records every primitive call, so a
//! test can assert both on the adapter's result and on exactly what the
//! adapter did. [`ScriptedLauncher`] hands out a fresh copy of the page for
//! each launch and keeps every session's log.
//!
//! Waits never sleep: an element is either present or it is not.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Session, SessionLauncher, SessionOptions, SessionResult};
use crate::error::SessionError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A reaction applied to the page after a navigation, click or upload
#[derive(Debug, Clone, Default)]
pub struct PageChange {
    show: Vec<(String, usize)>,
    hide: Vec<String>,
    texts: Vec<String>,
    url: Option<String>,
    enable: Vec<String>,
}

impl PageChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(self, selector: &str) -> Self {
        self.show_many(selector, 1)
    }

    pub fn show_many(mut self, selector: &str, count: usize) -> Self {
        self.show.push((selector.to_string(), count));
        self
    }

    pub fn hide(mut self, selector: &str) -> Self {
        self.hide.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.texts.push(text.to_string());
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn enable(mut self, selector: &str) -> Self {
        self.enable.push(selector.to_string());
        self
    }
}

/// Fake page contents and behaviour
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    url: String,
    elements: HashMap<String, usize>,
    body_texts: Vec<String>,
    element_texts: HashMap<String, Vec<String>>,
    attributes: HashMap<(String, String), String>,
    disabled: HashSet<String>,
    broken: HashSet<String>,
    unreachable: Vec<String>,
    on_navigate: Vec<(String, PageChange)>,
    on_click: HashMap<String, PageChange>,
    on_upload: HashMap<String, PageChange>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn element(self, selector: &str) -> Self {
        self.elements(selector, 1)
    }

    pub fn elements(mut self, selector: &str, count: usize) -> Self {
        self.elements.insert(selector.to_string(), count);
        self
    }

    /// Visible page text, matched by `page_contains_text`
    pub fn text(mut self, text: &str) -> Self {
        self.body_texts.push(text.to_string());
        self
    }

    /// Texts returned by `texts(selector)`; also marks the selector present
    pub fn element_texts(mut self, selector: &str, texts: &[&str]) -> Self {
        self.elements
            .entry(selector.to_string())
            .or_insert(texts.len().max(1));
        self.element_texts.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn attribute(mut self, selector: &str, name: &str, value: &str) -> Self {
        self.attributes
            .insert((selector.to_string(), name.to_string()), value.to_string());
        self
    }

    pub fn disabled(mut self, selector: &str) -> Self {
        self.disabled.insert(selector.to_string());
        self
    }

    /// Present, but fill and click fail with an interaction error
    pub fn broken(mut self, selector: &str) -> Self {
        self.broken.insert(selector.to_string());
        self
    }

    /// Navigation to any URL containing `fragment` fails
    pub fn unreachable(mut self, fragment: &str) -> Self {
        self.unreachable.push(fragment.to_string());
        self
    }

    pub fn on_navigate(mut self, url_fragment: &str, change: PageChange) -> Self {
        self.on_navigate.push((url_fragment.to_string(), change));
        self
    }

    pub fn on_click(mut self, selector: &str, change: PageChange) -> Self {
        self.on_click.insert(selector.to_string(), change);
        self
    }

    pub fn on_upload(mut self, selector: &str, change: PageChange) -> Self {
        self.on_upload.insert(selector.to_string(), change);
        self
    }

    fn count(&self, selector: &str) -> usize {
        if let Some(count) = self.elements.get(selector) {
            return *count;
        }
        if selector.contains(',') {
            return selector
                .split(',')
                .map(|part| self.elements.get(part.trim()).copied().unwrap_or(0))
                .sum();
        }
        0
    }

    fn apply(&mut self, change: &PageChange) {
        for (selector, count) in &change.show {
            self.elements.insert(selector.clone(), *count);
        }
        for selector in &change.hide {
            self.elements.remove(selector);
        }
        self.body_texts.extend(change.texts.iter().cloned());
        if let Some(url) = &change.url {
            self.url = url.clone();
        }
        for selector in &change.enable {
            self.disabled.remove(selector);
        }
    }
}

/// One recorded primitive call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Navigate(String),
    WaitFor(String),
    Fill(String, String),
    Click(String),
    Count(String),
    CurrentUrl,
    ContainsText(String),
    Texts(String),
    OptionTexts(String),
    Attribute(String, String),
    IsEnabled(String),
    SelectOption(String, usize),
    SelectValue(String, String),
    /// Selector, files, and whether every file existed at upload time
    SetFiles(String, Vec<PathBuf>, bool),
    Pause,
}

#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    pub calls: Vec<Call>,
    pub closes: usize,
}

impl SessionLog {
    pub fn navigations(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Navigate(url) => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clicks(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Click(sel) => Some(sel.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Value typed into `selector`, last write wins
    pub fn filled(&self, selector: &str) -> Option<&str> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Fill(sel, text) if sel == selector => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn uploads(&self) -> Vec<(&str, &[PathBuf], bool)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::SetFiles(sel, files, existed) => Some((sel.as_str(), files.as_slice(), *existed)),
                _ => None,
            })
            .collect()
    }
}

/// Plays back a [`ScriptedPage`] and records every call
pub struct ScriptedSession {
    page: Mutex<ScriptedPage>,
    log: Arc<Mutex<SessionLog>>,
    closed: bool,
}

impl ScriptedSession {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page: Mutex::new(page),
            log: Arc::new(Mutex::new(SessionLog::default())),
            closed: false,
        }
    }

    /// Shared handle to this session's log
    pub fn log(&self) -> Arc<Mutex<SessionLog>> {
        Arc::clone(&self.log)
    }

    pub fn snapshot(&self) -> SessionLog {
        lock(&self.log).clone()
    }

    fn record(&self, call: Call) {
        lock(&self.log).calls.push(call);
    }

    fn open(&self) -> SessionResult<()> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn require(&self, selector: &str) -> SessionResult<()> {
        self.open()?;
        let page = lock(&self.page);
        if page.count(selector) == 0 {
            return Err(SessionError::ElementNotFound(selector.to_string()));
        }
        if page.broken.contains(selector) {
            return Err(SessionError::Interaction(format!("{} is not interactable", selector)));
        }
        Ok(())
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn navigate(&self, url: &str) -> SessionResult<()> {
        self.record(Call::Navigate(url.to_string()));
        self.open()?;
        let mut page = lock(&self.page);
        if page.unreachable.iter().any(|f| url.contains(f.as_str())) {
            return Err(SessionError::Navigation(format!("{}: net::ERR_CONNECTION_REFUSED", url)));
        }
        page.url = url.to_string();
        let changes: Vec<PageChange> = page
            .on_navigate
            .iter()
            .filter(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, change)| change.clone())
            .collect();
        for change in &changes {
            page.apply(change);
        }
        Ok(())
    }

    async fn wait_for_element(&self, selector: &str, _timeout: Duration) -> bool {
        self.record(Call::WaitFor(selector.to_string()));
        !self.closed && lock(&self.page).count(selector) > 0
    }

    async fn fill(&self, selector: &str, text: &str) -> SessionResult<()> {
        self.record(Call::Fill(selector.to_string(), text.to_string()));
        self.require(selector)
    }

    async fn click(&self, selector: &str) -> SessionResult<()> {
        self.record(Call::Click(selector.to_string()));
        self.require(selector)?;
        let mut page = lock(&self.page);
        if let Some(change) = page.on_click.get(selector).cloned() {
            page.apply(&change);
        }
        Ok(())
    }

    async fn count(&self, selector: &str) -> usize {
        self.record(Call::Count(selector.to_string()));
        if self.closed {
            return 0;
        }
        lock(&self.page).count(selector)
    }

    async fn current_url(&self) -> Option<String> {
        self.record(Call::CurrentUrl);
        let page = lock(&self.page);
        if self.closed || page.url.is_empty() {
            None
        } else {
            Some(page.url.clone())
        }
    }

    async fn page_contains_text(&self, text: &str) -> bool {
        self.record(Call::ContainsText(text.to_string()));
        let needle = text.to_lowercase();
        !self.closed
            && lock(&self.page)
                .body_texts
                .iter()
                .any(|t| t.to_lowercase().contains(&needle))
    }

    async fn texts(&self, selector: &str) -> Vec<String> {
        self.record(Call::Texts(selector.to_string()));
        if self.closed {
            return Vec::new();
        }
        lock(&self.page)
            .element_texts
            .get(selector)
            .map(|texts| {
                texts
                    .iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    // Options are scripted as the element texts of "<select> option".
    async fn option_texts(&self, select: &str) -> Vec<String> {
        self.record(Call::OptionTexts(select.to_string()));
        if self.closed {
            return Vec::new();
        }
        lock(&self.page)
            .element_texts
            .get(&format!("{} option", select))
            .map(|texts| texts.iter().map(|t| t.trim().to_string()).collect())
            .unwrap_or_default()
    }

    async fn attribute(&self, selector: &str, name: &str) -> Option<String> {
        self.record(Call::Attribute(selector.to_string(), name.to_string()));
        lock(&self.page)
            .attributes
            .get(&(selector.to_string(), name.to_string()))
            .cloned()
    }

    async fn is_enabled(&self, selector: &str) -> bool {
        self.record(Call::IsEnabled(selector.to_string()));
        let page = lock(&self.page);
        !self.closed && page.count(selector) > 0 && !page.disabled.contains(selector)
    }

    async fn select_option(&self, selector: &str, index: usize) -> SessionResult<()> {
        self.record(Call::SelectOption(selector.to_string(), index));
        self.require(selector)?;
        let page = lock(&self.page);
        let options = format!("{} option", selector);
        match page.element_texts.get(&options) {
            Some(texts) if index >= texts.len() => Err(SessionError::Interaction(format!(
                "{} has no option {}",
                selector, index
            ))),
            _ => Ok(()),
        }
    }

    async fn select_value(&self, selector: &str, value: &str) -> SessionResult<()> {
        self.record(Call::SelectValue(selector.to_string(), value.to_string()));
        self.require(selector)
    }

    async fn set_input_files(&self, selector: &str, files: &[PathBuf]) -> SessionResult<()> {
        let existed = files.iter().all(|f| f.exists());
        self.record(Call::SetFiles(selector.to_string(), files.to_vec(), existed));
        self.require(selector)?;
        let mut page = lock(&self.page);
        if let Some(change) = page.on_upload.get(selector).cloned() {
            page.apply(&change);
        }
        Ok(())
    }

    async fn pause(&self, _min: Duration, _max: Duration) {
        self.record(Call::Pause);
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            lock(&self.log).closes += 1;
        }
    }
}

/// Launcher handing out [`ScriptedSession`]s over copies of one page
pub struct ScriptedLauncher {
    page: ScriptedPage,
    failure: Option<String>,
    launches: AtomicUsize,
    logs: Mutex<Vec<Arc<Mutex<SessionLog>>>>,
}

impl ScriptedLauncher {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            failure: None,
            launches: AtomicUsize::new(0),
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Launcher whose every launch fails with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(ScriptedPage::new())
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Snapshot of every launched session's log, in launch order
    pub fn logs(&self) -> Vec<SessionLog> {
        lock(&self.logs).iter().map(|log| lock(log).clone()).collect()
    }

    /// Total primitive calls across all sessions
    pub fn total_calls(&self) -> usize {
        self.logs().iter().map(|log| log.calls.len()).sum()
    }

    pub fn total_closes(&self) -> usize {
        self.logs().iter().map(|log| log.closes).sum()
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self, _options: &SessionOptions) -> SessionResult<Box<dyn Session>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(SessionError::Launch(message.clone()));
        }
        let session = ScriptedSession::new(self.page.clone());
        lock(&self.logs).push(session.log());
        Ok(Box::new(session))
    }
}
