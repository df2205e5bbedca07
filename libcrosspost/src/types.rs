//! Core types for Crosspost
//!
//! [`AdData`] and [`Credentials`] are supplied by the caller for each posting
//! attempt and are never mutated by the engine. [`PostResult`] is produced
//! exactly once per adapter invocation.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::PlatformError;

/// Contact details shown on listings that support them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// A single product listing to publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdData {
    pub title: String,
    pub description: String,
    pub price: f64,
    /// Free-text category, mapped per platform
    pub category: String,
    pub location: String,
    /// Image URLs in upload order
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
    #[serde(default)]
    pub additional_data: HashMap<String, serde_json::Value>,
}

impl AdData {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        price: f64,
        category: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            price,
            category: category.into(),
            location: location.into(),
            images: Vec::new(),
            contact: None,
            additional_data: HashMap::new(),
        }
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_contact(mut self, contact: ContactInfo) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.additional_data.insert(key.into(), value);
        self
    }

    /// String value from the additional-data map
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.additional_data.get(key).and_then(|v| v.as_str())
    }

    /// Price truncated to whole currency units, as most web forms expect
    pub fn whole_price(&self) -> String {
        format!("{}", self.price.trunc() as i64)
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.contact.as_ref().and_then(|c| c.email.as_deref())
    }

    pub fn contact_phone(&self) -> Option<&str> {
        self.contact.as_ref().and_then(|c| c.phone.as_deref())
    }

    /// Validate the ad independently of any platform
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Validation` for an empty title or description,
    /// or a negative / non-finite price.
    pub fn validate(&self) -> std::result::Result<(), PlatformError> {
        if self.title.trim().is_empty() {
            return Err(PlatformError::Validation("Ad title cannot be empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(PlatformError::Validation(
                "Ad description cannot be empty".to_string(),
            ));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(PlatformError::Validation(format!(
                "Ad price must be a non-negative number, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// Account credentials for one platform
///
/// The password is held as a [`SecretString`]: it is redacted from `Debug`
/// output and zeroed on drop. Credentials deserialize from caller-supplied
/// JSON but are never serialized back out.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// API-key style values (eBay app/dev/cert ids and user token)
    #[serde(default)]
    pub additional_data: HashMap<String, String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            email: None,
            phone: None,
            additional_data: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }

    /// Login identifier: email when present, username otherwise
    pub fn login_identifier(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.username)
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.additional_data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(SecretString::from(value))
}

/// Terminal classification of one posting attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Success,
    Failed,
    RateLimited,
    AccountBlocked,
    CaptchaRequired,
    LoginRequired,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RateLimited => "rate_limited",
            Self::AccountBlocked => "account_blocked",
            Self::CaptchaRequired => "captcha_required",
            Self::LoginRequired => "login_required",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error codes attached to non-success results
pub mod error_codes {
    pub const AUTOMATION_ERROR: &str = "AUTOMATION_ERROR";
    pub const UNSUPPORTED_PLATFORM: &str = "UNSUPPORTED_PLATFORM";
    pub const SESSION_ERROR: &str = "SESSION_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const COMPLETION_UNVERIFIED: &str = "COMPLETION_UNVERIFIED";
    pub const CAPTCHA_DETECTED: &str = "CAPTCHA_DETECTED";
}

/// Uniform outcome of one posting attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostResult {
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_ad_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(
        rename = "retry_after_secs",
        serialize_with = "serialize_retry_after",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_after: Option<Duration>,
}

fn serialize_retry_after<S>(value: &Option<Duration>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => serializer.serialize_some(&duration.as_secs()),
        None => serializer.serialize_none(),
    }
}

impl PostResult {
    fn with_status(status: PostStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            platform_ad_id: None,
            post_url: None,
            message: Some(message.into()),
            error_code: None,
            retry_after: None,
        }
    }

    pub fn success(
        platform_ad_id: impl Into<String>,
        post_url: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            platform_ad_id: Some(platform_ad_id.into()),
            post_url,
            ..Self::with_status(PostStatus::Success, message)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_status(PostStatus::Failed, message)
    }

    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self {
            retry_after,
            ..Self::with_status(PostStatus::RateLimited, message)
        }
    }

    pub fn account_blocked(message: impl Into<String>) -> Self {
        Self::with_status(PostStatus::AccountBlocked, message)
    }

    pub fn captcha_required(message: impl Into<String>) -> Self {
        Self::with_status(PostStatus::CaptchaRequired, message)
    }

    pub fn login_required(message: impl Into<String>) -> Self {
        Self::with_status(PostStatus::LoginRequired, message)
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PostStatus::Success
    }
}

/// Image formats recognized when naming downloaded files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect format from the path of an image URL, ignoring query and fragment
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}
