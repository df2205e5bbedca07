//! Crosspost - marketplace listing automation
//!
//! This library posts one classified ad to several resale marketplaces
//! (Facebook Marketplace, Craigslist, OfferUp and eBay). Browser-driven
//! platforms go through a [`session::Session`]; eBay goes through its XML
//! Trading API. Every attempt, whatever happens inside it, ends as a
//! [`PostResult`].

pub mod config;
pub mod error;
pub mod images;
pub mod logging;
pub mod manager;
pub mod platforms;
pub mod rate_limiter;
pub mod session;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{CrosspostError, Result};
pub use manager::AutomationManager;
pub use platforms::{Adapter, PlatformKind};
pub use types::{AdData, Credentials, PostResult, PostStatus};
