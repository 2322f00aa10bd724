//! Artifact text retrieval.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::aux_session::{fetch_in_page, AuxiliarySession};
use crate::error::ResolveError;
use crate::invoker::RetryPolicy;
use crate::renderer::RenderContext;

/// Reads the text of a resolved artifact.
#[async_trait]
pub trait ArtifactReader: Send + Sync {
    /// Text of the first pages of the artifact at `address`. `page` is the
    /// listing page the address was resolved on.
    async fn read_text(&self, page: &dyn RenderContext, address: &Url) -> Result<String>;
}

/// Extract text from the first `max_pages` pages of a PDF.
pub async fn extract_text(bytes: Vec<u8>, max_pages: usize) -> Result<String> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ResolveError::Extraction("payload is not a PDF".into()).into());
    }
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| ResolveError::Extraction(format!("extractor panicked: {e}")))?
        .map_err(|e| ResolveError::Extraction(e.to_string()))?;
    Ok(first_pages(&text, max_pages))
}

/// Pages are separated by form feeds in extracted text.
fn first_pages(text: &str, max_pages: usize) -> String {
    text.split('\x0C')
        .take(max_pages.max(1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads artifacts through the browser: `blob:` addresses in the listing
/// page itself, everything else through the auxiliary session.
pub struct BrowserArtifactReader {
    session: Arc<AuxiliarySession>,
    policy: RetryPolicy,
    max_pages: usize,
}

impl BrowserArtifactReader {
    pub fn new(session: Arc<AuxiliarySession>, policy: RetryPolicy, max_pages: usize) -> Self {
        Self {
            session,
            policy,
            max_pages,
        }
    }
}

#[async_trait]
impl ArtifactReader for BrowserArtifactReader {
    async fn read_text(&self, page: &dyn RenderContext, address: &Url) -> Result<String> {
        let bytes = if address.scheme() == "blob" {
            fetch_in_page(page, &self.policy, address).await?
        } else {
            self.session.fetch(address).await?
        };
        extract_text(bytes, self.max_pages).await
    }
}
