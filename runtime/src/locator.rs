//! Artifact location for a single document tile.
//!
//! Observers are armed before the tile is activated. Each observer reports
//! into its own [`SignalSlot`]; after activation the slots and in-page
//! sources are polled in a fixed order and the first artifact-typed address
//! wins.

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use cwcot_scout::{
    normalize_label, resolve_artifact_address, resolve_observed_address, DocumentTile,
    ResolvedArtifact, SignalSource,
};

use crate::capture;
use crate::error::{classify_error, ErrorClass};
use crate::invoker::{invoke, RetryPolicy};
use crate::renderer::{NetworkChannel, PageSignal, RenderContext, SignalStream};
use crate::scripts;

/// Timing knobs for a single locate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// How long a secondary window may take to settle on its address.
    pub popup_wait_ms: u64,
    /// Pause after activation before polling.
    pub settle_ms: u64,
    /// Wait for each observer slot while polling.
    pub signal_wait_ms: u64,
    pub timeline_rounds: u32,
    pub timeline_interval_ms: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            popup_wait_ms: 7_000,
            settle_ms: 800,
            signal_wait_ms: 1_500,
            timeline_rounds: 6,
            timeline_interval_ms: 250,
        }
    }
}

/// Single-assignment slot. The first offer wins; later offers are no-ops.
pub struct SignalSlot<T> {
    value: OnceLock<T>,
    notify: Notify,
}

impl<T> Default for SignalSlot<T> {
    fn default() -> Self {
        Self {
            value: OnceLock::new(),
            notify: Notify::new(),
        }
    }
}

impl<T> SignalSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` if the slot is empty. Returns whether it was stored.
    pub fn offer(&self, value: T) -> bool {
        let stored = self.value.set(value).is_ok();
        if stored {
            self.notify.notify_waiters();
        }
        stored
    }

    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Wait up to `timeout` for a value.
    pub async fn wait(&self, timeout: Duration) -> Option<&T> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if let Some(value) = self.value.get() {
            return Some(value);
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.value.get()
    }
}

#[derive(Default)]
struct Slots {
    popup: SignalSlot<Url>,
    response: SignalSlot<Url>,
    request: SignalSlot<Url>,
}

/// Armed observers for one activation. Dropping aborts the observer task.
struct Observers {
    slots: Arc<Slots>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Observers {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn route_signals(mut stream: SignalStream, base: Url, slots: Arc<Slots>) {
    while let Some(signal) = stream.next().await {
        match signal {
            PageSignal::Popup { url } => {
                if let Some(address) = resolve_artifact_address(&base, &url) {
                    if slots.popup.offer(address) {
                        debug!(%url, "popup signal");
                    }
                }
            }
            PageSignal::Network {
                channel,
                url,
                mime_type,
            } => {
                let Some(address) = resolve_observed_address(&base, &url, mime_type.as_deref())
                else {
                    continue;
                };
                let slot = match channel {
                    NetworkChannel::Response => &slots.response,
                    NetworkChannel::Request => &slots.request,
                };
                if slot.offer(address) {
                    debug!(?channel, %url, "network signal");
                }
            }
        }
    }
}

/// What to activate.
#[derive(Debug, Clone, Copy)]
pub enum LocateTarget<'a> {
    /// A discovered tile.
    Tile(&'a DocumentTile),
    /// The first control in the page naming the target addendum.
    FirstTarget,
}

#[derive(Debug, Default, Deserialize)]
struct TargetProbe {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    label: String,
    #[serde(default)]
    href: String,
}

/// Treat anything but context loss or closure as "no signal".
fn no_signal_on_error<T>(result: Result<Option<T>>, source: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if classify_error(&err) == ErrorClass::Other => {
            debug!(source, "no signal: {err:#}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Locates artifacts on one listing page.
pub struct Locator<'a> {
    pub ctx: &'a dyn RenderContext,
    pub base: &'a Url,
    pub config: &'a LocatorConfig,
    pub policy: &'a RetryPolicy,
    pub navigation_timeout_ms: u64,
}

impl<'a> Locator<'a> {
    /// Resolve the artifact behind `target`. `None` is a normal outcome.
    pub async fn locate(&self, target: LocateTarget<'_>) -> Result<Option<ResolvedArtifact>> {
        let tile = match target {
            LocateTarget::Tile(tile) => tile.clone(),
            LocateTarget::FirstTarget => match self.probe_first_target().await? {
                Some(tile) => tile,
                None => return Ok(None),
            },
        };

        if let Some(address) = tile
            .href
            .as_deref()
            .and_then(|href| resolve_artifact_address(self.base, href))
        {
            debug!(label = %tile.label, %address, "direct reference");
            return Ok(Some(self.resolved(&tile, address, SignalSource::DirectHref)));
        }

        let observers = self.arm().await?;
        let timeline_before = no_signal_on_error(
            self.timeline_entries().await.map(Some),
            "performance-timeline",
        )?
        .unwrap_or_default();

        let activated = match target {
            LocateTarget::Tile(tile) => self.activate_tile(tile).await?,
            LocateTarget::FirstTarget => self.activate_first_target().await?,
        };
        if !activated {
            debug!(label = %tile.label, ordinal = tile.ordinal, "tile not activated");
            return Ok(None);
        }

        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        let found = self.poll(&observers, &timeline_before).await?;
        drop(observers);
        self.restore_base().await?;

        Ok(found.map(|(address, source)| {
            debug!(label = %tile.label, ordinal = tile.ordinal, ?source, %address, "artifact resolved");
            self.resolved(&tile, address, source)
        }))
    }

    fn resolved(&self, tile: &DocumentTile, address: Url, source: SignalSource) -> ResolvedArtifact {
        ResolvedArtifact {
            tile: tile.clone(),
            address,
            signal_source: source,
        }
    }

    async fn arm(&self) -> Result<Observers> {
        let stream = self
            .ctx
            .observe(self.config.popup_wait_ms)
            .await
            .context("failed to arm page observers")?;
        let slots = Arc::new(Slots::default());
        let task = tokio::spawn(route_signals(stream, self.base.clone(), Arc::clone(&slots)));
        no_signal_on_error(
            capture::reset(self.ctx).await.map(Some),
            "capture-reset",
        )?;
        Ok(Observers {
            slots,
            tasks: vec![task],
        })
    }

    async fn probe_first_target(&self) -> Result<Option<DocumentTile>> {
        let script = scripts::first_target(false);
        let value = invoke(self.ctx, self.policy, "first_target", || {
            self.ctx.execute_js(&script)
        })
        .await?;
        let probe: TargetProbe = serde_json::from_value(value).unwrap_or_default();
        if !probe.found {
            return Ok(None);
        }
        Ok(Some(DocumentTile {
            label: probe.label,
            href: (!probe.href.is_empty()).then_some(probe.href),
            ordinal: 0,
            source_id: None,
        }))
    }

    async fn activate_first_target(&self) -> Result<bool> {
        let script = scripts::first_target(true);
        let value = invoke(self.ctx, self.policy, "activate_first_target", || {
            self.ctx.execute_js(&script)
        })
        .await?;
        Ok(value.get("found").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    /// In-page match by label and ordinal, then the clickable snapshot.
    async fn activate_tile(&self, tile: &DocumentTile) -> Result<bool> {
        let (key, ordinal) = tile.identity();
        let script = scripts::activate_tile(&key, ordinal);
        let value = invoke(self.ctx, self.policy, "activate_tile", || {
            self.ctx.execute_js(&script)
        })
        .await?;
        if clicked(&value) {
            return Ok(true);
        }

        debug!(label = %tile.label, ordinal, "in-page activation missed, using snapshot");
        let snapshot = scripts::clickables();
        let value = invoke(self.ctx, self.policy, "clickables", || {
            self.ctx.execute_js(&snapshot)
        })
        .await?;
        let labels: Vec<String> = serde_json::from_value(value).unwrap_or_default();
        let Some(index) = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| normalize_label(label) == key)
            .nth(ordinal as usize)
            .map(|(i, _)| i)
        else {
            return Ok(false);
        };

        let script = scripts::click_index(index);
        let value = invoke(self.ctx, self.policy, "click_index", || {
            self.ctx.execute_js(&script)
        })
        .await?;
        Ok(clicked(&value))
    }

    async fn poll(
        &self,
        observers: &Observers,
        timeline_before: &HashSet<String>,
    ) -> Result<Option<(Url, SignalSource)>> {
        let wait = Duration::from_millis(self.config.signal_wait_ms);
        let slots = &observers.slots;

        if let Some(address) = no_signal_on_error(self.navigation().await, "navigation")? {
            return Ok(Some((address, SignalSource::Navigation)));
        }

        if let Some(address) = slots.popup.wait(wait).await {
            return Ok(Some((address.clone(), SignalSource::PopupWindow)));
        }

        let network = tokio::select! {
            biased;
            Some(address) = slots.response.wait(wait) => Some(address.clone()),
            Some(address) = slots.request.wait(wait) => Some(address.clone()),
            else => None,
        };
        if let Some(address) = network {
            return Ok(Some((address, SignalSource::NetworkResponse)));
        }

        for round in 0..self.config.timeline_rounds {
            if round > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.timeline_interval_ms)).await;
            }
            let hit = no_signal_on_error(
                self.timeline_hit(timeline_before).await,
                "performance-timeline",
            )?;
            if let Some(address) = hit {
                return Ok(Some((address, SignalSource::PerformanceTimeline)));
            }
        }

        let captured = no_signal_on_error(
            capture::read(self.ctx)
                .await
                .map(|entries| capture::select(&entries, self.base)),
            "runtime-capture",
        )?;
        if let Some(address) = captured {
            return Ok(Some((address, SignalSource::RuntimeCapture)));
        }

        // Late observer reports.
        let late = slots
            .popup
            .get()
            .map(|a| (a.clone(), SignalSource::PopupWindow))
            .or_else(|| {
                slots
                    .response
                    .get()
                    .or_else(|| slots.request.get())
                    .map(|a| (a.clone(), SignalSource::NetworkResponse))
            });
        Ok(late)
    }

    /// Artifact address the main frame navigated to, if any. Only a move
    /// onto an artifact sends the page back to the base address; other moves
    /// leave the page alone so in-page sources stay intact.
    async fn navigation(&self) -> Result<Option<Url>> {
        let current = self.ctx.get_url().await?;
        if !self.moved_off_base(&current) {
            return Ok(None);
        }
        let Some(address) = resolve_artifact_address(self.base, &current) else {
            debug!(%current, "page moved to a non-artifact address");
            return Ok(None);
        };
        debug!(%current, "page navigated to an artifact, restoring");
        self.ctx
            .navigate(self.base.as_str(), self.navigation_timeout_ms)
            .await?;
        Ok(Some(address))
    }

    /// Send the page back to the base address once polling is over, so the
    /// next candidate starts from the listing.
    async fn restore_base(&self) -> Result<()> {
        let current = self.ctx.get_url().await?;
        if self.moved_off_base(&current) {
            debug!(%current, "restoring listing page");
            self.ctx
                .navigate(self.base.as_str(), self.navigation_timeout_ms)
                .await?;
        }
        Ok(())
    }

    /// Whether `current` differs from the base address by more than its
    /// fragment.
    fn moved_off_base(&self, current: &str) -> bool {
        let Ok(mut current) = Url::parse(current) else {
            return false;
        };
        let mut base = self.base.clone();
        current.set_fragment(None);
        base.set_fragment(None);
        current != base
    }

    async fn timeline_entries(&self) -> Result<HashSet<String>> {
        let value = self.ctx.execute_js(&scripts::timeline()).await?;
        Ok(serde_json::from_value::<Vec<String>>(value)
            .unwrap_or_default()
            .into_iter()
            .collect())
    }

    async fn timeline_hit(&self, before: &HashSet<String>) -> Result<Option<Url>> {
        let value = self.ctx.execute_js(&scripts::timeline()).await?;
        let entries: Vec<String> = serde_json::from_value(value).unwrap_or_default();
        Ok(entries
            .iter()
            .filter(|name| !before.contains(*name))
            .find_map(|name| resolve_artifact_address(self.base, name)))
    }
}

fn clicked(value: &serde_json::Value) -> bool {
    value
        .get("clicked")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
