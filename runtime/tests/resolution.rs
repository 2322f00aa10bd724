//! End-to-end resolution against scripted listing pages.

use anyhow::{anyhow, Result};
use assert_json_diff::assert_json_include;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use cwcot_scout::{SelectionReason, SignalSource};
use scout_runtime::budget::Budgeted;
use scout_runtime::config::ResolverConfig;
use scout_runtime::error::{classify_error, ErrorClass, ResolveError};
use scout_runtime::invoker::RetryPolicy;
use scout_runtime::locator::LocatorConfig;
use scout_runtime::reader::ArtifactReader;
use scout_runtime::renderer::{NetworkChannel, PageSignal, RenderContext};
use scout_runtime::scripts::marker;
use scout_runtime::testing::ScriptedPage;
use scout_runtime::Resolver;

const BASE: &str = "https://listing.example.com/property/42";

/// Serves canned text per address; unknown addresses fail extraction.
#[derive(Default)]
struct CannedReader {
    texts: HashMap<String, String>,
    delay: Duration,
}

impl CannedReader {
    fn with(mut self, address: &str, text: &str) -> Self {
        self.texts.insert(address.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl ArtifactReader for CannedReader {
    async fn read_text(&self, _page: &dyn RenderContext, address: &Url) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        self.texts
            .get(address.as_str())
            .cloned()
            .ok_or_else(|| ResolveError::Extraction("unreadable artifact".into()).into())
    }
}

fn fast_config() -> ResolverConfig {
    ResolverConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            backoff_base_ms: 1,
        },
        page_attempts: 3,
        tile_wait_ms: 30,
        navigation_timeout_ms: 1_000,
        budget_ms: 5_000,
        extension_ms: 5_000,
        extract_pages: 3,
        locator: LocatorConfig {
            popup_wait_ms: 50,
            settle_ms: 1,
            signal_wait_ms: 20,
            timeline_rounds: 1,
            timeline_interval_ms: 1,
        },
    }
}

fn resolver(reader: CannedReader) -> Resolver {
    Resolver::new(fast_config(), Arc::new(reader))
}

fn listing(tiles: serde_json::Value) -> ScriptedPage {
    let page = ScriptedPage::new(BASE).with_html("<html><body><p>Listing</p></body></html>");
    page.respond(marker::LIST_TILES, tiles);
    page
}

#[tokio::test]
async fn scenario_a_single_target_tile_confirms_match() {
    let page = listing(json!([
        { "label": "Photos", "ordinal": 0 },
        { "label": "Purchase Agreement Addendum", "href": "/docs/paa.pdf", "ordinal": 0 },
    ]));
    let reader = CannedReader::default().with(
        "https://listing.example.com/docs/paa.pdf",
        "Property is sold under CWCOT terms. Rev. 3.14.24",
    );

    let outcome = resolver(reader).resolve(&page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::ConfirmedMatch);
    assert!(outcome.classification.is_match);
    assert_eq!(outcome.classification.matched_rules, vec!["CWCOT".to_string()]);
    assert_eq!(outcome.classification.revision_tag.as_deref(), Some("3.14.24"));
    assert_eq!(outcome.tiles_seen, 2);

    assert_json_include!(
        actual: serde_json::to_value(&outcome).unwrap(),
        expected: json!({
            "selection_reason": "confirmed-match",
            "source_url": BASE,
            "address": "https://listing.example.com/docs/paa.pdf",
            "filename": "paa.pdf",
            "signal_source": "direct_href",
            "classification": {
                "is_match": true,
                "matched_rules": ["CWCOT"],
                "source_label": "Purchase Agreement Addendum",
            },
            "tile_labels": ["Photos", "Purchase Agreement Addendum"],
        })
    );
}

#[tokio::test]
async fn scenario_b_no_tiles_is_not_found() {
    let page = listing(json!([]));
    let outcome = resolver(CannedReader::default())
        .resolve(&page, BASE)
        .await
        .unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::NotFound);
    assert_eq!(outcome.address, None);
    assert!(!outcome.is_match());
    assert_eq!(outcome.tiles_seen, 0);
}

#[tokio::test]
async fn scenario_c_prohibited_only_falls_through_to_not_found() {
    let page = listing(json!([
        { "label": "Prohibited Sales Addendum", "href": "/docs/psa.pdf", "ordinal": 0 },
    ]));
    page.respond(
        marker::PANEL_HTML,
        json!(r#"<div class="documents"><a href="/docs/psa.pdf">Prohibited Sales Addendum</a></div>"#),
    );

    let outcome = resolver(CannedReader::default())
        .resolve(&page, BASE)
        .await
        .unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::NotFound);
    assert_eq!(outcome.address, None);
    assert_eq!(outcome.tile_labels, vec!["Prohibited Sales Addendum".to_string()]);
    assert_eq!(page.calls(marker::ACTIVATE_TILE), 0);
    assert_eq!(page.calls(marker::FIRST_TARGET), 1);
}

#[tokio::test]
async fn network_signal_after_activation() {
    let page = listing(json!([{ "label": "Addendum to Purchase Agreement", "ordinal": 0 }]));
    page.on(marker::ACTIVATE_TILE, |page, _| {
        page.emit(PageSignal::Network {
            channel: NetworkChannel::Response,
            url: "https://files.example.com/stream/8812".into(),
            mime_type: Some("application/pdf".into()),
        });
        Ok(json!({ "clicked": true }))
    });
    let reader = CannedReader::default().with(
        "https://files.example.com/stream/8812",
        "Claims Without Conveyance of Title addendum",
    );

    let outcome = resolver(reader).resolve(&page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::ConfirmedMatch);
    assert_eq!(outcome.signal_source, Some(SignalSource::NetworkResponse));
    assert!(outcome
        .classification
        .matched_rules
        .contains(&"Claims Without Conveyance of Title".to_string()));
}

#[tokio::test]
async fn resolved_without_match_keeps_first_candidate() {
    let page = listing(json!([
        { "label": "Purchase Agreement Addendum", "href": "/docs/first.pdf", "ordinal": 0 },
        { "label": "Purchase Agreement Addendum", "href": "/docs/second.pdf", "ordinal": 1 },
    ]));
    let reader = CannedReader::default()
        .with("https://listing.example.com/docs/first.pdf", "Standard terms apply.")
        .with("https://listing.example.com/docs/second.pdf", "Buyer pays closing costs.");

    let outcome = resolver(reader).resolve(&page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::ResolvedNoMatch);
    assert_eq!(
        outcome.address.as_deref(),
        Some("https://listing.example.com/docs/first.pdf")
    );
    assert!(!outcome.is_match());
    assert_eq!(outcome.classification.sample_text, "Standard terms apply.");
}

#[tokio::test]
async fn extraction_failure_advances_to_next_candidate() {
    let page = listing(json!([
        { "label": "Purchase Agreement Addendum", "href": "/docs/broken.pdf", "ordinal": 0 },
        { "label": "Purchase Agreement Addendum", "href": "/docs/good.pdf", "ordinal": 1 },
    ]));
    let reader = CannedReader::default().with(
        "https://listing.example.com/docs/good.pdf",
        "Post foreclosure sale under the second chance program",
    );

    let outcome = resolver(reader).resolve(&page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::ConfirmedMatch);
    assert_eq!(outcome.filename.as_deref(), Some("good.pdf"));
}

#[tokio::test]
async fn panel_link_from_legacy_chain() {
    let page = listing(json!([]));
    page.respond(
        marker::PANEL_HTML,
        json!(r#"<ul><li><a href="/files/add.pdf">Purchase Agreement Addendum</a></li></ul>"#),
    );
    let reader = CannedReader::default().with(
        "https://listing.example.com/files/add.pdf",
        "CWCOT addendum",
    );

    let outcome = resolver(reader).resolve(&page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::PanelLink);
    assert_eq!(outcome.signal_source, Some(SignalSource::PanelLink));
    assert!(outcome.is_match());
}

#[tokio::test]
async fn hydration_link_is_classified_best_effort() {
    let page = ScriptedPage::new(BASE).with_html(
        r#"<html><script id="__NEXT_DATA__">{"documents":[{"title":"Purchase Agreement Addendum","src":"\/static\/docs\/paa-77.pdf"}]}</script></html>"#,
    );

    let outcome = resolver(CannedReader::default())
        .resolve(&page, BASE)
        .await
        .unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::HydrationLink);
    assert_eq!(
        outcome.address.as_deref(),
        Some("https://listing.example.com/static/docs/paa-77.pdf")
    );
    assert!(!outcome.is_match());
}

#[tokio::test]
async fn interactive_first_target_is_last_legacy_stage() {
    let page = listing(json!([]));
    page.on(marker::FIRST_TARGET, |page, script| {
        if script.contains("if (true) __cwcotActivate(el);") {
            page.emit(PageSignal::Network {
                channel: NetworkChannel::Response,
                url: "https://files.example.com/render/3301".into(),
                mime_type: Some("application/pdf".into()),
            });
        }
        Ok(json!({ "found": true, "label": "Purchase Agreement Addendum", "href": "" }))
    });
    let reader = CannedReader::default().with(
        "https://files.example.com/render/3301",
        "This sale is a CWCOT transaction.",
    );

    let outcome = resolver(reader).resolve(&page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::LegacyInteractive);
    assert_eq!(outcome.signal_source, Some(SignalSource::NetworkResponse));
    assert_eq!(
        outcome.address.as_deref(),
        Some("https://files.example.com/render/3301")
    );
    assert!(outcome.is_match());
    assert_eq!(page.calls(marker::FIRST_TARGET), 2);
}

#[tokio::test]
async fn context_loss_retries_whole_attempt() {
    let page = listing(json!([]));
    let calls = AtomicU32::new(0);
    page.on(marker::LIST_TILES, move |_, _| {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(anyhow!("Execution context was destroyed, most likely because of a navigation"))
        } else {
            Ok(json!([{ "label": "Purchase Agreement Addendum", "href": "/docs/paa.pdf", "ordinal": 0 }]))
        }
    });
    let reader = CannedReader::default().with(
        "https://listing.example.com/docs/paa.pdf",
        "CWCOT",
    );

    let outcome = resolver(reader).resolve(&page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::ConfirmedMatch);
    assert_eq!(page.navigations(), vec![BASE.to_string()]);
}

#[tokio::test]
async fn persistent_context_loss_exhausts_attempts() {
    let page = listing(json!([]));
    page.on(marker::LIST_TILES, |_, _| Err(anyhow!("Cannot find context with specified id")));

    let err = resolver(CannedReader::default())
        .resolve(&page, BASE)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ResolveError>(),
        Some(ResolveError::AttemptsExhausted { attempts: 3, .. })
    ));
    assert_eq!(page.navigations().len(), 2);
}

#[tokio::test]
async fn closed_page_is_not_retried() {
    let page = listing(json!([]));
    page.close().await.unwrap();

    let err = resolver(CannedReader::default())
        .resolve(&page, BASE)
        .await
        .unwrap_err();

    assert_eq!(classify_error(&err), ErrorClass::Closed);
    assert!(page.navigations().is_empty());
}

#[tokio::test]
async fn slow_resolution_is_slow_confirmed() {
    let page: Arc<dyn RenderContext> = Arc::new(listing(json!([
        { "label": "Purchase Agreement Addendum", "href": "/docs/paa.pdf", "ordinal": 0 },
    ])));
    let reader = CannedReader {
        delay: Duration::from_millis(150),
        ..CannedReader::default()
    }
    .with("https://listing.example.com/docs/paa.pdf", "CWCOT");
    let config = ResolverConfig {
        budget_ms: 10,
        ..fast_config()
    };
    let resolver = Arc::new(Resolver::new(config, Arc::new(reader)));

    let Budgeted::Pending(pending) = resolver.resolve_budgeted(page, BASE).await.unwrap() else {
        panic!("expected the budget to lapse");
    };
    assert_eq!(
        pending.placeholder().selection_reason,
        SelectionReason::TimeoutPending
    );

    let outcome = pending.extend(Duration::from_secs(5)).await;
    assert_eq!(outcome.selection_reason, SelectionReason::SlowConfirmed);
    assert_eq!(outcome.original_reason, Some(SelectionReason::ConfirmedMatch));
    assert!(outcome.is_match());
}

#[tokio::test]
async fn fast_resolution_keeps_its_reason() {
    let page: Arc<dyn RenderContext> = Arc::new(listing(json!([])));
    let resolver = Arc::new(resolver(CannedReader::default()));

    let outcome = resolver.resolve_within_budget(page, BASE).await.unwrap();

    assert_eq!(outcome.selection_reason, SelectionReason::NotFound);
    assert_eq!(outcome.original_reason, None);
}
