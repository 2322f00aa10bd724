//! Process-wide auxiliary rendering context used to fetch artifact bytes.
//!
//! The context is created lazily, checked for liveness before every use,
//! and replaced (never retried in place) once it dies.

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::ResolveError;
use crate::invoker::{invoke, RetryPolicy};
use crate::renderer::{RenderContext, Renderer};
use crate::scripts;

static GLOBAL: OnceLock<Arc<AuxiliarySession>> = OnceLock::new();

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchedArtifact {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    data: String,
}

/// Fetch `address` from inside `ctx` (page credentials included).
pub async fn fetch_in_page(
    ctx: &dyn RenderContext,
    policy: &RetryPolicy,
    address: &Url,
) -> Result<Vec<u8>> {
    let script = scripts::fetch_artifact(address.as_str());
    let value = invoke(ctx, policy, "fetch_artifact", || ctx.execute_js(&script)).await?;
    let fetched: FetchedArtifact =
        serde_json::from_value(value).context("unexpected fetch result shape")?;
    if !fetched.ok {
        return Err(ResolveError::Fetch {
            status: fetched.status,
        }
        .into());
    }
    debug!(%address, content_type = %fetched.content_type, "artifact fetched");
    base64::engine::general_purpose::STANDARD
        .decode(fetched.data.as_bytes())
        .context("artifact payload was not valid base64")
}

/// Lazily created, liveness-checked rendering context.
pub struct AuxiliarySession {
    renderer: Arc<dyn Renderer>,
    policy: RetryPolicy,
    navigation_timeout_ms: u64,
    context: Mutex<Option<Arc<dyn RenderContext>>>,
}

impl AuxiliarySession {
    pub fn new(renderer: Arc<dyn Renderer>, policy: RetryPolicy, navigation_timeout_ms: u64) -> Self {
        Self {
            renderer,
            policy,
            navigation_timeout_ms,
            context: Mutex::new(None),
        }
    }

    /// The process-wide session. The first caller's arguments create it.
    pub fn global(
        renderer: &Arc<dyn Renderer>,
        policy: &RetryPolicy,
        navigation_timeout_ms: u64,
    ) -> Arc<AuxiliarySession> {
        Arc::clone(GLOBAL.get_or_init(|| {
            Arc::new(Self::new(
                Arc::clone(renderer),
                policy.clone(),
                navigation_timeout_ms,
            ))
        }))
    }

    async fn is_alive(ctx: &dyn RenderContext) -> bool {
        !ctx.is_closed() && ctx.execute_js(&scripts::ping()).await.is_ok()
    }

    /// A live context, creating a new one if there is none or the old one died.
    async fn live_context(
        &self,
        slot: &mut Option<Arc<dyn RenderContext>>,
    ) -> Result<Arc<dyn RenderContext>> {
        if let Some(ctx) = slot.as_ref() {
            if Self::is_alive(ctx.as_ref()).await {
                return Ok(Arc::clone(ctx));
            }
            warn!("auxiliary session died, recreating");
            let _ = ctx.close().await;
            *slot = None;
        }
        let ctx: Arc<dyn RenderContext> = Arc::from(
            self.renderer
                .new_context()
                .await
                .context("failed to create auxiliary context")?,
        );
        *slot = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Fetch artifact bytes. The context is moved to the artifact's origin
    /// first so the in-page fetch is same-origin.
    pub async fn fetch(&self, address: &Url) -> Result<Vec<u8>> {
        let mut slot = self.context.lock().await;
        let ctx = self.live_context(&mut slot).await?;

        let origin = address.origin().ascii_serialization();
        let current = ctx.get_url().await.unwrap_or_default();
        let same_origin = Url::parse(&current)
            .map(|u| u.origin().ascii_serialization() == origin)
            .unwrap_or(false);
        if !same_origin {
            ctx.navigate(&format!("{origin}/"), self.navigation_timeout_ms)
                .await
                .with_context(|| format!("failed to open {origin} in auxiliary session"))?;
        }

        fetch_in_page(ctx.as_ref(), &self.policy, address).await
    }
}
