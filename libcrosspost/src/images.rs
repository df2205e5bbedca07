//! Image transfer shared by the interactive adapters
//!
//! Images are downloaded to temporary files, attached to the platform's file
//! input in one batch, and the page is polled until the upload settles.
//! Downloads retry with exponential backoff; an image that keeps failing is
//! dropped and the listing goes ahead without it. Temporary files are always
//! removed, whatever happens to the upload.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::AdapterSettings;
use crate::error::TransferError;
use crate::session::Session;
use crate::types::ImageFormat;

/// Download retry schedule: `base_delay * 2^attempt` between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// Where image bytes come from
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Write the image at `url` to `dest`, returning the byte count
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransferError>;
}

/// Streams images over HTTP straight to disk
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransferError> {
        let download_err = |reason: String| TransferError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_err(format!("HTTP {}", response.status())));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_err(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(download_err("empty response body".to_string()));
        }
        Ok(written)
    }
}

/// Downloaded files awaiting upload
///
/// Call [`cleanup`](Self::cleanup) when done; if the value is dropped
/// without it (for example while unwinding) the files are removed
/// synchronously.
#[derive(Debug)]
pub struct DownloadedImages {
    files: Vec<PathBuf>,
    failed: Vec<String>,
    cleaned: bool,
}

impl DownloadedImages {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// URLs dropped after exhausting retries
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub async fn cleanup(mut self) {
        for file in &self.files {
            if let Err(e) = tokio::fs::remove_file(file).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove temp image {}: {}", file.display(), e);
                }
            }
        }
        self.cleaned = true;
    }
}

impl Drop for DownloadedImages {
    fn drop(&mut self) {
        if !self.cleaned {
            for file in &self.files {
                let _ = std::fs::remove_file(file);
            }
        }
    }
}

/// How an upload is considered finished
#[derive(Debug, Clone, Copy)]
pub enum UploadCompletion<'a> {
    /// No progress indicator left and at least one preview per file
    Previews { progress: &'a str, preview: &'a str },
    /// A button the page keeps disabled while uploading becomes enabled
    ButtonEnabled(&'a str),
}

/// Where and how to attach files on a page
#[derive(Debug, Clone, Copy)]
pub struct UploadTarget<'a> {
    /// File input selector variants, first present wins
    pub file_inputs: &'a [&'a str],
    /// Clicked first, if present, to reveal the file input
    pub trigger: Option<&'a str>,
    pub completion: UploadCompletion<'a>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub requested: usize,
    pub downloaded: usize,
    pub attached: bool,
    /// False when the completion poll timed out
    pub completed: bool,
    pub error: Option<String>,
}

pub struct ImageTransfer {
    prefix: String,
    source: Arc<dyn ImageSource>,
    temp_dir: PathBuf,
    retry: RetryPolicy,
    probe_timeout: Duration,
    poll_interval: Duration,
    upload_timeout: Duration,
}

impl ImageTransfer {
    /// `prefix` names temp files `<prefix>_upload_<batch>_<n>.<ext>`
    pub fn new(prefix: &str, source: Arc<dyn ImageSource>, settings: &AdapterSettings) -> Self {
        Self {
            prefix: prefix.to_string(),
            source,
            temp_dir: settings.temp_dir.clone(),
            retry: settings.download_retry,
            probe_timeout: settings.probe_timeout,
            poll_interval: settings.poll_interval,
            upload_timeout: settings.upload_timeout,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Download every URL, dropping the ones that keep failing
    pub async fn download_all(&self, urls: &[String]) -> DownloadedImages {
        let mut images = DownloadedImages {
            files: Vec::new(),
            failed: Vec::new(),
            cleaned: false,
        };
        if urls.is_empty() {
            return images;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.temp_dir).await {
            warn!(
                "Cannot create image directory {}: {}",
                self.temp_dir.display(),
                e
            );
            images.failed = urls.to_vec();
            return images;
        }

        let batch = uuid::Uuid::new_v4().simple().to_string();
        for (index, url) in urls.iter().enumerate() {
            let ext = ImageFormat::from_url(url)
                .map(|f| f.extension())
                .unwrap_or("jpg");
            let path = self.temp_dir.join(format!(
                "{}_upload_{}_{}.{}",
                self.prefix,
                &batch[..8],
                index,
                ext
            ));

            if self.download_one(url, &path).await {
                images.files.push(path);
            } else {
                images.failed.push(url.clone());
            }
        }

        info!(
            "Downloaded {}/{} images for {}",
            images.files.len(),
            urls.len(),
            self.prefix
        );
        images
    }

    async fn download_one(&self, url: &str, path: &Path) -> bool {
        for attempt in 0..self.retry.max_attempts {
            match self.source.fetch(url, path).await {
                Ok(bytes) => {
                    debug!("Downloaded {} ({} bytes)", url, bytes);
                    return true;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(path).await;
                    if attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            "Image download failed (attempt {}/{}): {}. Retrying in {:?}",
                            attempt + 1,
                            self.retry.max_attempts,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(
                            "Dropping image {} after {} attempts: {}",
                            url, self.retry.max_attempts, e
                        );
                    }
                }
            }
        }
        false
    }

    /// Download, attach and wait, then remove the temp files
    pub async fn upload(
        &self,
        session: &dyn Session,
        urls: &[String],
        target: &UploadTarget<'_>,
    ) -> UploadReport {
        if urls.is_empty() {
            return UploadReport {
                completed: true,
                ..Default::default()
            };
        }

        let images = self.download_all(urls).await;
        let mut report = self.attach(session, &images, target).await;
        report.requested = urls.len();
        images.cleanup().await;
        report
    }

    async fn attach(
        &self,
        session: &dyn Session,
        images: &DownloadedImages,
        target: &UploadTarget<'_>,
    ) -> UploadReport {
        let mut report = UploadReport {
            downloaded: images.files().len(),
            ..Default::default()
        };
        if images.is_empty() {
            report.error = Some("no images could be downloaded".to_string());
            return report;
        }

        if let Some(trigger) = target.trigger {
            if session.wait_for_element(trigger, self.probe_timeout).await {
                if let Err(e) = session.click(trigger).await {
                    debug!("Upload trigger {} not clickable: {}", trigger, e);
                }
            }
        }

        let mut input = None;
        for selector in target.file_inputs {
            if session.wait_for_element(selector, self.probe_timeout).await {
                input = Some(*selector);
                break;
            }
        }
        let Some(input) = input else {
            report.error = Some("no file input found".to_string());
            return report;
        };

        if let Err(e) = session.set_input_files(input, images.files()).await {
            report.error = Some(e.to_string());
            return report;
        }
        report.attached = true;

        report.completed = self
            .wait_for_completion(session, target.completion, images.files().len())
            .await;
        if !report.completed {
            warn!(
                "Image upload for {} did not settle within {:?}",
                self.prefix, self.upload_timeout
            );
        }
        report
    }

    async fn wait_for_completion(
        &self,
        session: &dyn Session,
        completion: UploadCompletion<'_>,
        expected: usize,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + self.upload_timeout;
        loop {
            let done = match completion {
                UploadCompletion::Previews { progress, preview } => {
                    session.count(progress).await == 0 && session.count(preview).await >= expected
                }
                UploadCompletion::ButtonEnabled(selector) => session.is_enabled(selector).await,
            };
            if done {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_delay_saturates() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(u64::MAX / 2),
        };
        assert!(policy.delay_for(40) >= policy.delay_for(1));
    }

    #[tokio::test]
    async fn test_drop_removes_files_without_cleanup() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orphan.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let images = DownloadedImages {
            files: vec![path.clone()],
            failed: Vec::new(),
            cleaned: false,
        };
        drop(images);
        assert!(!path.exists());
    }
}
