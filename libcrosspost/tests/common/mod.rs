//! Shared helpers for libcrosspost integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use libcrosspost::config::AdapterSettings;
use libcrosspost::error::TransferError;
use libcrosspost::images::{ImageSource, RetryPolicy};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Settings that never wait: no pacing, no throttle, instant timeouts
pub fn fast_settings(temp_dir: &Path) -> AdapterSettings {
    AdapterSettings {
        headless: true,
        requests_per_second: 1000.0,
        element_timeout: Duration::ZERO,
        probe_timeout: Duration::ZERO,
        completion_timeout: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        download_timeout: Duration::from_secs(5),
        upload_timeout: Duration::ZERO,
        human_pacing: false,
        download_retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        },
        temp_dir: temp_dir.to_path_buf(),
    }
}

/// Image source that writes a few fixed bytes for every URL
pub struct StaticImages;

#[async_trait]
impl ImageSource for StaticImages {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, TransferError> {
        tokio::fs::write(dest, b"\xff\xd8\xff\xe0").await?;
        Ok(4)
    }
}

/// A canned HTTP response
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A captured request: request line, headers and body
#[derive(Debug, Clone)]
pub struct Captured {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Tiny HTTP/1.1 responder: `route(path)` picks the reply for each request
///
/// Returns the base URL and a receiver of captured requests. Each
/// connection serves exactly one request.
pub async fn serve<F>(route: F) -> (String, tokio::sync::mpsc::UnboundedReceiver<Captured>)
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let route = std::sync::Arc::new(route);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let route = route.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let mut lines = head.split("\r\n");
                let request_line = lines.next().unwrap_or("").to_string();
                let headers: Vec<(String, String)> = lines
                    .filter_map(|l| l.split_once(':'))
                    .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
                    .collect();
                let length = headers
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < header_end + length {
                    let n = match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body_end = buf.len().min(header_end + length);
                let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

                let path = request_line.split(' ').nth(1).unwrap_or("/").to_string();
                let reply = route(&path);
                let _ = tx.send(Captured {
                    request_line,
                    headers,
                    body,
                });

                let mut response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(&reply.body).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), rx)
}
