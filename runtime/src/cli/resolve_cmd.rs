//! `cwcot-scout resolve <url>`: resolve one listing page in a fresh browser.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::output::print_json;
use crate::aux_session::AuxiliarySession;
use crate::config::ResolverConfig;
use crate::orchestrator::Resolver;
use crate::reader::BrowserArtifactReader;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{RenderContext, Renderer};

pub struct ResolveArgs<'a> {
    pub url: &'a str,
    pub config_path: Option<&'a Path>,
    pub budget_ms: Option<u64>,
    pub extension_ms: Option<u64>,
    pub headless: bool,
}

pub async fn run(args: ResolveArgs<'_>) -> Result<()> {
    let mut config = ResolverConfig::load(args.config_path)?;
    if let Some(ms) = args.budget_ms {
        config.budget_ms = ms;
    }
    if let Some(ms) = args.extension_ms {
        config.extension_ms = ms;
    }

    let renderer: Arc<dyn Renderer> = Arc::new(ChromiumRenderer::new(args.headless).await?);
    let page: Arc<dyn RenderContext> = Arc::from(renderer.new_context().await?);
    let nav = page
        .navigate(args.url, config.navigation_timeout_ms)
        .await
        .with_context(|| format!("failed to open {}", args.url))?;
    info!(url = %nav.final_url, load_ms = nav.load_time_ms, "listing page loaded");

    let session = AuxiliarySession::global(&renderer, &config.retry, config.navigation_timeout_ms);
    let reader = BrowserArtifactReader::new(session, config.retry.clone(), config.extract_pages);
    let resolver = Arc::new(Resolver::new(config, Arc::new(reader)));

    let result = resolver
        .resolve_within_budget(Arc::clone(&page), &nav.final_url)
        .await;

    let _ = page.close().await;
    renderer.shutdown().await?;

    print_json(&result?)
}
