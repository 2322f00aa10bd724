//! Plain HTTP artifact download, used when no browser session is needed.
//!
//! Retries 5xx responses with exponential backoff and honours `Retry-After`
//! on 429.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;

use crate::error::ResolveError;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

const MAX_RETRIES: u32 = 2;

/// A downloaded artifact.
#[derive(Debug, Clone)]
pub struct Download {
    pub final_url: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn fetch(&self, url: &str) -> Result<Download> {
        let mut retries = 0u32;
        loop {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("request to {url} failed"))?;
            let status = resp.status().as_u16();

            if status >= 500 && retries < MAX_RETRIES {
                retries += 1;
                debug!(%url, status, retries, "server error, retrying");
                tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(retries - 1))).await;
                continue;
            }
            if status == 429 && retries < MAX_RETRIES {
                retries += 1;
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(2);
                tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                continue;
            }
            if !resp.status().is_success() {
                return Err(ResolveError::Fetch { status }.into());
            }

            let final_url = resp.url().to_string();
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = resp
                .bytes()
                .await
                .context("failed to read artifact body")?
                .to_vec();
            return Ok(Download {
                final_url,
                content_type,
                bytes,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/paa.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7".to_vec()),
            )
            .mount(&server)
            .await;

        let download = Downloader::new(5_000)
            .fetch(&format!("{}/docs/paa.pdf", server.uri()))
            .await
            .unwrap();
        assert_eq!(download.bytes, b"%PDF-1.7");
        assert_eq!(download.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn test_client_error_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = Downloader::new(5_000)
            .fetch(&format!("{}/missing.pdf", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::Fetch { status: 404 })
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
            .mount(&server)
            .await;

        let download = Downloader::new(5_000)
            .fetch(&format!("{}/flaky.pdf", server.uri()))
            .await
            .unwrap();
        assert_eq!(download.bytes, b"%PDF");
    }
}
