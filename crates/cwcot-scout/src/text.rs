//! Addendum text classification.
//!
//! Every rule is evaluated; the result records the union of matches rather
//! than the first hit.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::ClassificationResult;

/// Maximum length, in characters, of `ClassificationResult::sample_text`.
pub const SAMPLE_TEXT_LIMIT: usize = 600;

/// Rule id appended when the artifact's filename names the program.
pub const FILENAME_RULE: &str = "filename:CWCOT";

struct TextRule {
    id: &'static str,
    pattern: Regex,
}

fn text_rules() -> &'static [TextRule] {
    static RULES: OnceLock<Vec<TextRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            ("CWCOT", r"\bcwcot\b"),
            (
                "Claims Without Conveyance of Title",
                r"claims\s+without\s+conveyance\s+of\s+title",
            ),
            ("CWCOT Addendum Title", r"\bcwcot\s+(?:sales?\s+)?addendum"),
            ("Second Chance", r"\bsecond\s+chance\b"),
            ("Post-Foreclosure Sale", r"\bpost[\s-]?foreclosure\s+sales?\b"),
        ]
        .into_iter()
        .map(|(id, pattern)| TextRule {
            id,
            pattern: Regex::new(pattern).expect("valid regex"),
        })
        .collect()
    })
}

fn revision_pattern() -> &'static Regex {
    static REV: OnceLock<Regex> = OnceLock::new();
    REV.get_or_init(|| {
        Regex::new(r"(?i)\brev\.?\s*(\d+\.\d+(?:\.\d+)?)").expect("valid regex")
    })
}

/// Strip soft hyphens, unify dash variants, and collapse whitespace.
///
/// Case is preserved; callers fold case when matching.
fn collapse(text: &str) -> String {
    let unified: String = text
        .chars()
        .filter(|c| *c != '\u{00AD}')
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FE63}' | '\u{FF0D}' => '-',
            c => c,
        })
        .collect();
    unified.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize text for matching: collapse, then case-fold.
pub fn normalize_text(text: &str) -> String {
    collapse(text).to_lowercase()
}

/// Extract a `rev <n>.<n>[.<n>]` revision tag, if present.
pub fn extract_revision(text: &str) -> Option<String> {
    revision_pattern()
        .captures(&collapse(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Score artifact text against the CWCOT rule set.
///
/// `filename_hint` is the artifact's filename or address; when it names the
/// program a synthetic rule is appended. `source_label` is carried through to
/// the result for diagnostics.
pub fn classify_text(text: &str, filename_hint: &str, source_label: &str) -> ClassificationResult {
    let collapsed = collapse(text);
    let folded = collapsed.to_lowercase();

    let mut matched_rules: Vec<String> = text_rules()
        .iter()
        .filter(|rule| rule.pattern.is_match(&folded))
        .map(|rule| rule.id.to_string())
        .collect();

    if filename_hint.to_lowercase().contains("cwcot") {
        matched_rules.push(FILENAME_RULE.to_string());
    }

    let revision_tag = extract_revision(&collapsed);

    ClassificationResult {
        is_match: !matched_rules.is_empty(),
        matched_rules,
        revision_tag,
        sample_text: collapsed.chars().take(SAMPLE_TEXT_LIMIT).collect(),
        source_label: source_label.to_string(),
    }
}
