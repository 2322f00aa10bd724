//! Core data types shared by the resolver and its consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::label::normalize_label;

/// A document entry discovered in a listing page's document region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTile {
    /// Visible label text, whitespace-collapsed.
    pub label: String,
    /// Hyperlink reference carried by the tile, if any (may be relative).
    #[serde(default)]
    pub href: Option<String>,
    /// Position among tiles sharing the same normalized label.
    pub ordinal: u32,
    /// Element id or test id of the tile, if any.
    #[serde(default)]
    pub source_id: Option<String>,
}

impl DocumentTile {
    /// Identity of the tile: `(normalized label, ordinal)`.
    pub fn identity(&self) -> (String, u32) {
        (normalize_label(&self.label), self.ordinal)
    }
}

/// Semantic category of a tile label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCategory {
    TargetAddendum,
    ProhibitedAddendum,
    AsIsAddendum,
    GenericAddendum,
    PurchaseAgreement,
    Other,
}

impl LabelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetAddendum => "target_addendum",
            Self::ProhibitedAddendum => "prohibited_addendum",
            Self::AsIsAddendum => "as_is_addendum",
            Self::GenericAddendum => "generic_addendum",
            Self::PurchaseAgreement => "purchase_agreement",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for LabelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which mechanism revealed an artifact's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// The tile's own hyperlink.
    DirectHref,
    /// The main frame navigated to the artifact after activation.
    Navigation,
    /// A secondary window opened by page script.
    PopupWindow,
    /// A network response or request observed after activation.
    NetworkResponse,
    /// A resource-timing entry recorded by the page.
    PerformanceTimeline,
    /// The in-page capture of `window.open`, anchor clicks or object URLs.
    RuntimeCapture,
    /// An anchor embedded in the rendered document panel.
    PanelLink,
    /// An address embedded in page markup or hydration data.
    HydrationLink,
}

/// An artifact address resolved for a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub tile: DocumentTile,
    pub address: Url,
    pub signal_source: SignalSource,
}

/// Result of scoring an artifact's text against the CWCOT rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_match: bool,
    pub matched_rules: Vec<String>,
    #[serde(default)]
    pub revision_tag: Option<String>,
    pub sample_text: String,
    pub source_label: String,
}

/// Terminal tag describing how a per-page outcome was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    ConfirmedMatch,
    ResolvedNoMatch,
    PanelLink,
    HydrationLink,
    LegacyInteractive,
    NotFound,
    TimeoutPending,
    SlowConfirmed,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmedMatch => "confirmed-match",
            Self::ResolvedNoMatch => "resolved-no-match",
            Self::PanelLink => "panel-link",
            Self::HydrationLink => "hydration-link",
            Self::LegacyInteractive => "legacy-interactive",
            Self::NotFound => "not-found",
            Self::TimeoutPending => "timeout-pending",
            Self::SlowConfirmed => "slow-confirmed",
        }
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a selection reason tag.
#[derive(Debug, thiserror::Error)]
#[error("unknown selection reason: {0}")]
pub struct UnknownReason(pub String);

impl FromStr for SelectionReason {
    type Err = UnknownReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reason = match s.trim() {
            "confirmed-match" => Self::ConfirmedMatch,
            "resolved-no-match" => Self::ResolvedNoMatch,
            "panel-link" => Self::PanelLink,
            "hydration-link" => Self::HydrationLink,
            "legacy-interactive" => Self::LegacyInteractive,
            "not-found" => Self::NotFound,
            "timeout-pending" => Self::TimeoutPending,
            "slow-confirmed" => Self::SlowConfirmed,
            other => return Err(UnknownReason(other.to_string())),
        };
        Ok(reason)
    }
}

/// Final per-page record handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub selection_reason: SelectionReason,
    /// Reason the resolver reported before a late result was retagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_reason: Option<SelectionReason>,
    pub source_url: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub signal_source: Option<SignalSource>,
    pub classification: ClassificationResult,
    pub tiles_seen: u32,
    pub tile_labels: Vec<String>,
    pub resolved_at: DateTime<Utc>,
}

impl SelectionOutcome {
    /// An outcome with no address and default classification.
    pub fn empty(reason: SelectionReason, source_url: &str) -> Self {
        Self {
            selection_reason: reason,
            original_reason: None,
            source_url: source_url.to_string(),
            address: None,
            filename: None,
            signal_source: None,
            classification: ClassificationResult::default(),
            tiles_seen: 0,
            tile_labels: Vec::new(),
            resolved_at: Utc::now(),
        }
    }

    /// `not-found` outcome, keeping what discovery saw.
    pub fn not_found(source_url: &str, tiles: &[DocumentTile]) -> Self {
        Self::empty(SelectionReason::NotFound, source_url).with_tiles(tiles)
    }

    /// Placeholder returned when the budget lapses before resolution.
    pub fn timeout_pending(source_url: &str) -> Self {
        Self::empty(SelectionReason::TimeoutPending, source_url)
    }

    /// Outcome for a resolved artifact and its classification.
    pub fn resolved(
        reason: SelectionReason,
        source_url: &str,
        artifact: &ResolvedArtifact,
        classification: ClassificationResult,
    ) -> Self {
        Self {
            address: Some(artifact.address.to_string()),
            filename: crate::artifact::filename_of(&artifact.address),
            signal_source: Some(artifact.signal_source),
            classification,
            ..Self::empty(reason, source_url)
        }
    }

    /// Record the tiles seen during discovery.
    pub fn with_tiles(mut self, tiles: &[DocumentTile]) -> Self {
        self.tiles_seen = tiles.len() as u32;
        self.tile_labels = tiles.iter().map(|t| t.label.clone()).collect();
        self
    }

    /// Whether the artifact text matched the program rules.
    pub fn is_match(&self) -> bool {
        self.classification.is_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    fn tile(label: &str, ordinal: u32) -> DocumentTile {
        DocumentTile {
            label: label.to_string(),
            href: None,
            ordinal,
            source_id: None,
        }
    }

    #[test]
    fn test_tile_identity_normalizes_label() {
        let a = tile("  Purchase   Agreement Addendum ", 0);
        let b = tile("purchase agreement addendum", 0);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), tile("purchase agreement addendum", 1).identity());
    }

    #[test]
    fn test_reason_round_trips_through_str() {
        for reason in [
            SelectionReason::ConfirmedMatch,
            SelectionReason::ResolvedNoMatch,
            SelectionReason::NotFound,
            SelectionReason::TimeoutPending,
            SelectionReason::SlowConfirmed,
        ] {
            assert_eq!(reason.as_str().parse::<SelectionReason>().unwrap(), reason);
        }
        assert!("done".parse::<SelectionReason>().is_err());
    }

    #[test]
    fn test_outcome_wire_shape() {
        let artifact = ResolvedArtifact {
            tile: tile("Purchase Agreement Addendum", 0),
            address: Url::parse("https://cdn.example.com/docs/PA-Addendum.pdf").unwrap(),
            signal_source: SignalSource::NetworkResponse,
        };
        let classification = ClassificationResult {
            is_match: true,
            matched_rules: vec!["CWCOT".to_string()],
            revision_tag: None,
            sample_text: "CWCOT".to_string(),
            source_label: "Purchase Agreement Addendum".to_string(),
        };
        let outcome = SelectionOutcome::resolved(
            SelectionReason::ConfirmedMatch,
            "https://listing.example.com/details/1",
            &artifact,
            classification,
        )
        .with_tiles(std::slice::from_ref(&artifact.tile));

        let value = serde_json::to_value(&outcome).unwrap();
        assert_json_include!(
            actual: value,
            expected: json!({
                "selection_reason": "confirmed-match",
                "address": "https://cdn.example.com/docs/PA-Addendum.pdf",
                "filename": "PA-Addendum.pdf",
                "signal_source": "network_response",
                "tiles_seen": 1,
                "classification": { "is_match": true, "matched_rules": ["CWCOT"] }
            })
        );
        assert!(value.get("original_reason").is_none());
    }

    #[test]
    fn test_not_found_is_all_empty() {
        let outcome = SelectionOutcome::not_found("https://listing.example.com/x", &[]);
        assert_eq!(outcome.selection_reason, SelectionReason::NotFound);
        assert!(outcome.address.is_none());
        assert!(!outcome.is_match());
        assert_eq!(outcome.tiles_seen, 0);
    }
}
