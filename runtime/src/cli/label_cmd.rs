//! `cwcot-scout label <text>`: classify a tile label.

use anyhow::Result;
use serde_json::json;

use cwcot_scout::{classify_label, normalize_label};

use super::output::print_json;

pub async fn run(text: &str) -> Result<()> {
    let category = classify_label(text);
    print_json(&json!({
        "label": text,
        "normalized": normalize_label(text),
        "category": category,
    }))
}
