//! Per-page resolution: discover, filter, locate, classify, then fall back
//! to the legacy markup chain.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use cwcot_scout::{
    classify_label, classify_text, filename_of, is_artifact_address, ClassificationResult,
    DocumentTile, LabelCategory, ResolvedArtifact, SelectionOutcome, SelectionReason, SignalSource,
};

use crate::budget::{resolve_within, with_budget, Budgeted};
use crate::capture;
use crate::config::ResolverConfig;
use crate::error::{classify_error, is_transient, ErrorClass, ResolveError};
use crate::invoker::invoke;
use crate::legacy;
use crate::locator::{LocateTarget, Locator};
use crate::reader::ArtifactReader;
use crate::renderer::RenderContext;
use crate::tiles;

/// Resolves listing pages to a [`SelectionOutcome`].
pub struct Resolver {
    config: ResolverConfig,
    reader: Arc<dyn ArtifactReader>,
}

impl Resolver {
    pub fn new(config: ResolverConfig, reader: Arc<dyn ArtifactReader>) -> Self {
        Self { config, reader }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the listing page `ctx` is showing.
    ///
    /// Transient context loss restarts the whole attempt, reloading the last
    /// known listing address in between. Other errors propagate at once.
    pub async fn resolve(&self, ctx: &dyn RenderContext, base_url: &str) -> Result<SelectionOutcome> {
        let base = Url::parse(base_url).with_context(|| format!("invalid page address {base_url}"))?;
        let attempts = self.config.page_attempts.max(1);
        let mut last_known = base.clone();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!(attempt, url = %last_known, "reloading page");
                if let Err(err) = ctx
                    .navigate(last_known.as_str(), self.config.navigation_timeout_ms)
                    .await
                {
                    if ctx.is_closed() {
                        return Err(err.context(ResolveError::PageClosed));
                    }
                    if !is_transient(&err) {
                        return Err(err);
                    }
                    warn!(attempt, "reload failed: {err:#}");
                    last_error = format!("{err:#}");
                    continue;
                }
            }

            if let Some(current) = listing_address(ctx).await {
                last_known = current;
            }

            match self.attempt(ctx, &base).await {
                Ok(outcome) => {
                    info!(
                        url = %base,
                        reason = %outcome.selection_reason,
                        matched = outcome.is_match(),
                        attempt,
                        "page resolved"
                    );
                    return Ok(outcome);
                }
                Err(err) if ctx.is_closed() => return Err(err.context(ResolveError::PageClosed)),
                Err(err) if is_transient(&err) => {
                    warn!(attempt, url = %base, "context lost during resolution: {err:#}");
                    last_error = format!("{err:#}");
                }
                Err(err) => return Err(err),
            }
        }

        Err(ResolveError::AttemptsExhausted {
            attempts,
            last: last_error,
        }
        .into())
    }

    /// Resolve with the configured budget; the placeholder is returned when
    /// the budget lapses.
    pub async fn resolve_budgeted(
        self: Arc<Self>,
        ctx: Arc<dyn RenderContext>,
        base_url: &str,
    ) -> Result<Budgeted> {
        let budget = self.config.budget();
        let url = base_url.to_string();
        let task = async move { self.resolve(ctx.as_ref(), &url).await };
        with_budget(task, budget, base_url).await
    }

    /// Resolve with the configured budget and one extension.
    pub async fn resolve_within_budget(
        self: Arc<Self>,
        ctx: Arc<dyn RenderContext>,
        base_url: &str,
    ) -> Result<SelectionOutcome> {
        let (budget, extension) = (self.config.budget(), self.config.extension());
        let url = base_url.to_string();
        let task = async move { self.resolve(ctx.as_ref(), &url).await };
        resolve_within(task, budget, extension, base_url).await
    }

    async fn attempt(&self, ctx: &dyn RenderContext, base: &Url) -> Result<SelectionOutcome> {
        let policy = &self.config.retry;

        if let Err(err) = capture::install(ctx).await {
            if classify_error(&err) != ErrorClass::Other {
                return Err(err);
            }
            warn!("runtime capture unavailable: {err:#}");
        }

        tiles::open_document_panel(ctx, policy).await?;
        if !tiles::wait_for_tiles_populated(ctx, policy, self.config.tile_wait()).await? {
            debug!("document region did not populate");
        }

        let all_tiles = tiles::list_tiles(ctx, policy).await?;
        let candidates: Vec<&DocumentTile> = all_tiles
            .iter()
            .filter(|t| classify_label(&t.label) == LabelCategory::TargetAddendum)
            .collect();
        info!(tiles = all_tiles.len(), candidates = candidates.len(), "tiles discovered");

        let locator = Locator {
            ctx,
            base,
            config: &self.config.locator,
            policy,
            navigation_timeout_ms: self.config.navigation_timeout_ms,
        };

        let mut first_classified: Option<(ResolvedArtifact, ClassificationResult)> = None;
        let mut first_unreadable: Option<ResolvedArtifact> = None;

        for tile in candidates {
            let Some(artifact) = locator.locate(LocateTarget::Tile(tile)).await? else {
                debug!(label = %tile.label, ordinal = tile.ordinal, "no artifact for candidate");
                continue;
            };

            let classification = match self.classify(ctx, &artifact).await {
                Ok(classification) => classification,
                Err(err) if classify_error(&err) == ErrorClass::Closed => return Err(err),
                Err(err) => {
                    warn!(label = %tile.label, address = %artifact.address, "artifact unreadable: {err:#}");
                    first_unreadable.get_or_insert(artifact);
                    continue;
                }
            };

            if classification.is_match {
                return Ok(SelectionOutcome::resolved(
                    SelectionReason::ConfirmedMatch,
                    base.as_str(),
                    &artifact,
                    classification,
                )
                .with_tiles(&all_tiles));
            }
            first_classified.get_or_insert((artifact, classification));
        }

        if let Some((artifact, classification)) = first_classified {
            return Ok(SelectionOutcome::resolved(
                SelectionReason::ResolvedNoMatch,
                base.as_str(),
                &artifact,
                classification,
            )
            .with_tiles(&all_tiles));
        }
        if let Some(artifact) = first_unreadable {
            let classification = unread(&artifact);
            return Ok(SelectionOutcome::resolved(
                SelectionReason::ResolvedNoMatch,
                base.as_str(),
                &artifact,
                classification,
            )
            .with_tiles(&all_tiles));
        }

        match self.legacy_chain(ctx, base, &locator).await? {
            Some((reason, artifact)) => {
                let classification = match self.classify(ctx, &artifact).await {
                    Ok(classification) => classification,
                    Err(err) => {
                        warn!(address = %artifact.address, "legacy artifact unreadable: {err:#}");
                        unread(&artifact)
                    }
                };
                Ok(
                    SelectionOutcome::resolved(reason, base.as_str(), &artifact, classification)
                        .with_tiles(&all_tiles),
                )
            }
            None => Ok(SelectionOutcome::not_found(base.as_str(), &all_tiles)),
        }
    }

    /// Panel anchors, then hydration data, then one interactive locate.
    async fn legacy_chain(
        &self,
        ctx: &dyn RenderContext,
        base: &Url,
        locator: &Locator<'_>,
    ) -> Result<Option<(SelectionReason, ResolvedArtifact)>> {
        let policy = &self.config.retry;

        let panel = match tiles::panel_html(ctx, policy).await {
            Ok(html) => html,
            Err(err) if classify_error(&err) == ErrorClass::Other => {
                debug!("panel markup unavailable: {err:#}");
                String::new()
            }
            Err(err) => return Err(err),
        };
        if let Some(link) = legacy::scan_panel(&panel, base) {
            debug!(label = %link.label, address = %link.address, "panel link");
            let artifact = legacy_artifact(link.label, link.address, SignalSource::PanelLink);
            return Ok(Some((SelectionReason::PanelLink, artifact)));
        }

        let markup = invoke(ctx, policy, "get_html", || ctx.get_html()).await?;
        if let Some(address) = legacy::scan_hydration(&markup, base) {
            debug!(%address, "hydration link");
            let artifact = legacy_artifact(String::new(), address, SignalSource::HydrationLink);
            return Ok(Some((SelectionReason::HydrationLink, artifact)));
        }

        if let Some(artifact) = locator.locate(LocateTarget::FirstTarget).await? {
            return Ok(Some((SelectionReason::LegacyInteractive, artifact)));
        }
        Ok(None)
    }

    async fn classify(
        &self,
        ctx: &dyn RenderContext,
        artifact: &ResolvedArtifact,
    ) -> Result<ClassificationResult> {
        let text = self.reader.read_text(ctx, &artifact.address).await?;
        let hint = filename_of(&artifact.address).unwrap_or_default();
        Ok(classify_text(&text, &hint, &artifact.tile.label))
    }
}

fn legacy_artifact(label: String, address: Url, source: SignalSource) -> ResolvedArtifact {
    ResolvedArtifact {
        tile: DocumentTile {
            label,
            href: Some(address.to_string()),
            ordinal: 0,
            source_id: None,
        },
        address,
        signal_source: source,
    }
}

/// Classification for an artifact whose text could not be read.
fn unread(artifact: &ResolvedArtifact) -> ClassificationResult {
    ClassificationResult {
        source_label: artifact.tile.label.clone(),
        ..ClassificationResult::default()
    }
}

/// The page's current address when it is a listing page rather than an
/// artifact the page navigated to.
async fn listing_address(ctx: &dyn RenderContext) -> Option<Url> {
    let current = Url::parse(&ctx.get_url().await.ok()?).ok()?;
    (matches!(current.scheme(), "http" | "https") && !is_artifact_address(&current))
        .then_some(current)
}
