//! Tile label classification.
//!
//! Rules are checked in a fixed order and the first match wins. The
//! prohibited-sales rule must precede the target rule: its text also
//! satisfies the generic addendum pattern.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::LabelCategory;

/// Labels that name a purchase agreement rather than an addendum.
const PURCHASE_AGREEMENT_PHRASES: &[&str] = &[
    "review purchase agreement",
    "purchase and sale agreement",
    "auction purchase agreement",
    "occupied psa",
];

struct LabelRules {
    prohibited: Regex,
    as_is: Regex,
    target: Regex,
}

fn rules() -> &'static LabelRules {
    static RULES: OnceLock<LabelRules> = OnceLock::new();
    RULES.get_or_init(|| LabelRules {
        prohibited: Regex::new(r"prohibited\s+sales?\s+addendum").expect("valid regex"),
        as_is: Regex::new(r"\bas[\s-]?is\b.*\baddend").expect("valid regex"),
        target: Regex::new(
            r"purchase\s+agreement\s+addendum|addendum\s+to\s+(?:the\s+)?purchase\s+agreement",
        )
        .expect("valid regex"),
    })
}

/// Lowercase, unify dash variants, and collapse whitespace.
pub fn normalize_label(label: &str) -> String {
    let unified: String = label
        .chars()
        .filter(|c| *c != '\u{00AD}')
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            c => c,
        })
        .collect();
    unified
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Map a tile label to its category.
pub fn classify_label(label: &str) -> LabelCategory {
    let text = normalize_label(label);
    let rules = rules();

    if rules.prohibited.is_match(&text) {
        return LabelCategory::ProhibitedAddendum;
    }
    if rules.as_is.is_match(&text) {
        return LabelCategory::AsIsAddendum;
    }
    if rules.target.is_match(&text) {
        return LabelCategory::TargetAddendum;
    }
    if text.contains("addendum") {
        return LabelCategory::GenericAddendum;
    }
    if PURCHASE_AGREEMENT_PHRASES.iter().any(|p| text.contains(p)) {
        return LabelCategory::PurchaseAgreement;
    }
    LabelCategory::Other
}

/// True when the text names the target addendum and not the prohibited variant.
///
/// Used on free text (anchor titles, surrounding markup) where the as-is
/// rule does not apply.
pub fn is_target_label(text: &str) -> bool {
    let text = normalize_label(text);
    let rules = rules();
    rules.target.is_match(&text) && !rules.prohibited.is_match(&text)
}

/// True when the text names the prohibited sales addendum.
pub fn is_prohibited_label(text: &str) -> bool {
    rules().prohibited.is_match(&normalize_label(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prohibited_precedes_generic() {
        assert_eq!(
            classify_label("Prohibited Sales Addendum"),
            LabelCategory::ProhibitedAddendum
        );
    }

    #[test]
    fn test_target_variants() {
        assert_eq!(
            classify_label("Purchase Agreement Addendum"),
            LabelCategory::TargetAddendum
        );
        assert_eq!(
            classify_label("Addendum to Purchase Agreement"),
            LabelCategory::TargetAddendum
        );
        assert_eq!(
            classify_label("  ADDENDUM   to the\npurchase agreement (PDF)"),
            LabelCategory::TargetAddendum
        );
    }

    #[test]
    fn test_as_is_variants() {
        assert_eq!(classify_label("As-Is Addendum"), LabelCategory::AsIsAddendum);
        assert_eq!(
            classify_label("AS IS Property Condition Addendum"),
            LabelCategory::AsIsAddendum
        );
        assert_eq!(
            classify_label("As\u{2013}Is Addendum"),
            LabelCategory::AsIsAddendum
        );
    }

    #[test]
    fn test_generic_and_purchase_agreement() {
        assert_eq!(
            classify_label("Lead Paint Addendum"),
            LabelCategory::GenericAddendum
        );
        assert_eq!(
            classify_label("Review Purchase Agreement"),
            LabelCategory::PurchaseAgreement
        );
        assert_eq!(
            classify_label("Occupied PSA - Florida"),
            LabelCategory::PurchaseAgreement
        );
        assert_eq!(classify_label("Title Report"), LabelCategory::Other);
        assert_eq!(classify_label(""), LabelCategory::Other);
    }

    #[test]
    fn test_target_helpers_exclude_prohibited() {
        assert!(is_target_label("Download Purchase Agreement Addendum"));
        assert!(!is_target_label("Prohibited Sales Addendum"));
        assert!(is_prohibited_label("prohibited   sales addendum.pdf"));
        assert!(!is_prohibited_label("Purchase Agreement Addendum"));
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(
            normalize_label("  Purchase\u{00AD} Agreement\t Addendum "),
            "purchase agreement addendum"
        );
    }
}
