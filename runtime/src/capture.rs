//! Runtime capture: an in-page log of `window.open`, anchor clicks and PDF
//! object URLs.
//!
//! The capture object is registered as an init script so every new document
//! gets a fresh one, and evaluated once immediately for the current document.

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use cwcot_scout::resolve_artifact_address;

use crate::renderer::RenderContext;
use crate::scripts;

/// Mechanism that produced a capture entry, in lookup priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Open,
    Click,
    ObjectUrl,
}

const PRIORITY: [CaptureKind; 3] = [CaptureKind::Open, CaptureKind::Click, CaptureKind::ObjectUrl];

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaptureEntry {
    pub kind: CaptureKind,
    #[serde(default)]
    pub value: String,
}

/// Register the capture object for future documents and install it now.
pub async fn install(ctx: &dyn RenderContext) -> Result<()> {
    let script = scripts::capture_install();
    ctx.add_init_script(&script)
        .await
        .context("failed to register capture script")?;
    ctx.execute_js(&script)
        .await
        .context("failed to install capture object")?;
    Ok(())
}

/// Clear the log so only calls made after this point are seen.
pub async fn reset(ctx: &dyn RenderContext) -> Result<()> {
    ctx.execute_js(&scripts::capture_reset()).await?;
    Ok(())
}

/// Current log contents. Entries of unknown kinds are skipped.
pub async fn read(ctx: &dyn RenderContext) -> Result<Vec<CaptureEntry>> {
    let value = ctx.execute_js(&scripts::capture_read()).await?;
    Ok(parse_entries(value))
}

fn parse_entries(value: serde_json::Value) -> Vec<CaptureEntry> {
    let serde_json::Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// First artifact-typed value, checking `open`, then `click`, then
/// `object_url` entries.
pub fn select(entries: &[CaptureEntry], base: &Url) -> Option<Url> {
    PRIORITY.iter().find_map(|kind| {
        entries
            .iter()
            .filter(|e| e.kind == *kind)
            .find_map(|e| resolve_artifact_address(base, &e.value))
    })
}
