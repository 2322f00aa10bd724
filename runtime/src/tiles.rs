//! Document tile discovery.

use anyhow::Result;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

use cwcot_scout::DocumentTile;

use crate::error::{classify_error, ErrorClass};
use crate::invoker::{invoke, RetryPolicy};
use crate::renderer::RenderContext;
use crate::scripts;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTile {
    label: String,
    #[serde(default)]
    href: String,
    #[serde(default)]
    ordinal: u32,
    #[serde(default)]
    source_id: String,
}

impl From<RawTile> for DocumentTile {
    fn from(raw: RawTile) -> Self {
        let non_empty = |s: String| (!s.trim().is_empty()).then_some(s);
        DocumentTile {
            label: raw.label,
            href: non_empty(raw.href),
            ordinal: raw.ordinal,
            source_id: non_empty(raw.source_id),
        }
    }
}

fn parse_tiles(value: serde_json::Value) -> Result<Vec<DocumentTile>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawTile> = serde_json::from_value(value)?;
    Ok(raw.into_iter().map(DocumentTile::from).collect())
}

/// Enumerate the tiles of the document region, in discovery order.
///
/// An empty list is a valid result.
pub async fn list_tiles(ctx: &dyn RenderContext, policy: &RetryPolicy) -> Result<Vec<DocumentTile>> {
    let script = scripts::list_tiles();
    let value = invoke(ctx, policy, "list_tiles", || ctx.execute_js(&script)).await?;
    parse_tiles(value)
}

/// Poll until at least one tile has text. Returns `false` on timeout.
pub async fn wait_for_tiles_populated(
    ctx: &dyn RenderContext,
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let tiles = list_tiles(ctx, policy).await?;
        if tiles.iter().any(|t| !t.label.trim().is_empty()) {
            return Ok(true);
        }
        if Instant::now() + POLL_INTERVAL > deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Best-effort activation of a "Documents" tab or section.
pub async fn open_document_panel(ctx: &dyn RenderContext, policy: &RetryPolicy) -> Result<bool> {
    let script = scripts::open_panel();
    match invoke(ctx, policy, "open_panel", || ctx.execute_js(&script)).await {
        Ok(value) => Ok(value.as_bool().unwrap_or(false)),
        Err(err) if classify_error(&err) == ErrorClass::Other => {
            debug!("document panel not opened: {err:#}");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Rendered markup of the document region, or an empty string.
pub async fn panel_html(ctx: &dyn RenderContext, policy: &RetryPolicy) -> Result<String> {
    let script = scripts::panel_html();
    let value = invoke(ctx, policy, "panel_html", || ctx.execute_js(&script)).await?;
    Ok(value.as_str().unwrap_or_default().to_string())
}
