//! `cwcot-scout classify <path|url>`: extract and classify a single PDF.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use cwcot_scout::classify_text;

use super::output::print_json;
use crate::download::Downloader;
use crate::reader::extract_text;

/// Filename-ish hint taken from the last path segment of `source`.
fn hint_from_source(source: &str) -> String {
    let trimmed = source.split(['?', '#']).next().unwrap_or(source);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

pub async fn run(source: &str, hint: Option<&str>, pages: usize, timeout_ms: u64) -> Result<()> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        let download = Downloader::new(timeout_ms).fetch(source).await?;
        info!(
            url = %download.final_url,
            content_type = download.content_type.as_deref().unwrap_or(""),
            bytes = download.bytes.len(),
            "downloaded"
        );
        download.bytes
    } else {
        std::fs::read(Path::new(source)).with_context(|| format!("failed to read {source}"))?
    };

    let text = extract_text(bytes, pages).await?;
    let hint = hint.map(str::to_string).unwrap_or_else(|| hint_from_source(source));
    let result = classify_text(&text, &hint, "");
    print_json(&result)
}
