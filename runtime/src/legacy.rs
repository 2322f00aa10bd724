//! Markup scans used when no discovered tile resolves.
//!
//! Both scans return the first artifact-typed address that sits next to
//! text naming the target addendum and not the prohibited variant.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use cwcot_scout::{is_target_label, resolve_artifact_address};

/// Characters of context inspected before and after a hydration address.
const CONTEXT_BEFORE: usize = 240;
const CONTEXT_AFTER: usize = 80;

/// A target anchor in the rendered document panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLink {
    pub label: String,
    pub address: Url,
}

/// Scan the document panel markup for an anchor labelled as the target
/// addendum whose href is artifact-typed.
pub fn scan_panel(html: &str, base: &Url) -> Option<PanelLink> {
    if html.trim().is_empty() {
        return None;
    }
    let fragment = Html::parse_fragment(html);
    let anchors = Selector::parse("a[href]").ok()?;

    fragment.select(&anchors).find_map(|anchor| {
        let text = anchor.text().collect::<Vec<_>>().join(" ");
        let attrs = anchor.value();
        let label = [Some(text.as_str()), attrs.attr("title"), attrs.attr("aria-label")]
            .into_iter()
            .flatten()
            .find(|candidate| is_target_label(candidate))?;
        let address = resolve_artifact_address(base, attrs.attr("href")?)?;
        Some(PanelLink {
            label: label.split_whitespace().collect::<Vec<_>>().join(" "),
            address,
        })
    })
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)(?:https?://|/)[^\s"'<>\\]+?\.pdf(?:\?[^\s"'<>\\]*)?"#)
            .expect("valid regex")
    })
}

/// Undo the JSON and HTML escaping hydration payloads apply to addresses.
fn unescape_markup(markup: &str) -> String {
    markup
        .replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\u0026", "&")
        .replace("\\/", "/")
        .replace("&amp;", "&")
}

fn floor_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Context around an address, cut at the braces of the object holding it so
/// sibling entries do not lend their labels.
fn entry_window(text: &str, start: usize, end: usize) -> &str {
    let from = floor_boundary(text, start.saturating_sub(CONTEXT_BEFORE));
    let to = ceil_boundary(text, end + CONTEXT_AFTER);
    let from = text[from..start]
        .rfind(['{', '}'])
        .map_or(from, |i| from + i + 1);
    let to = text[end..to].find(['{', '}']).map_or(to, |i| end + i);
    &text[from..to]
}

/// Scan full page markup, including script and hydration payloads, for an
/// artifact address whose own entry names the target addendum.
pub fn scan_hydration(markup: &str, base: &Url) -> Option<Url> {
    let text = unescape_markup(markup);
    address_pattern().find_iter(&text).find_map(|m| {
        let window = entry_window(&text, m.start(), m.end()).replace(m.as_str(), " ");
        if !is_target_label(&window) {
            return None;
        }
        resolve_artifact_address(base, m.as_str())
    })
}
