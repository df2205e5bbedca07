use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::{Session, SessionResult};
use crate::error::SessionError;

/// Session stand-in for adapters that talk to an HTTP API
///
/// It keeps the manager's open/close bookkeeping uniform. Every interactive
/// primitive reports "nothing here".
#[derive(Debug, Default)]
pub struct DetachedSession {
    closed: bool,
}

impl DetachedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn unsupported<T>(&self, op: &str) -> SessionResult<T> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Err(SessionError::Unsupported(op.to_string()))
        }
    }
}

#[async_trait]
impl Session for DetachedSession {
    async fn navigate(&self, _url: &str) -> SessionResult<()> {
        self.unsupported("navigate")
    }

    async fn wait_for_element(&self, _selector: &str, _timeout: Duration) -> bool {
        false
    }

    async fn fill(&self, _selector: &str, _text: &str) -> SessionResult<()> {
        self.unsupported("fill")
    }

    async fn click(&self, _selector: &str) -> SessionResult<()> {
        self.unsupported("click")
    }

    async fn count(&self, _selector: &str) -> usize {
        0
    }

    async fn current_url(&self) -> Option<String> {
        None
    }

    async fn page_contains_text(&self, _text: &str) -> bool {
        false
    }

    async fn texts(&self, _selector: &str) -> Vec<String> {
        Vec::new()
    }

    async fn option_texts(&self, _select: &str) -> Vec<String> {
        Vec::new()
    }

    async fn attribute(&self, _selector: &str, _name: &str) -> Option<String> {
        None
    }

    async fn is_enabled(&self, _selector: &str) -> bool {
        false
    }

    async fn select_option(&self, _selector: &str, _index: usize) -> SessionResult<()> {
        self.unsupported("select_option")
    }

    async fn select_value(&self, _selector: &str, _value: &str) -> SessionResult<()> {
        self.unsupported("select_value")
    }

    async fn set_input_files(&self, _selector: &str, _files: &[PathBuf]) -> SessionResult<()> {
        self.unsupported("set_input_files")
    }

    async fn pause(&self, _min: Duration, _max: Duration) {}

    async fn close(&mut self) {
        self.closed = true;
    }
}
