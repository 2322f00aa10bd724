//! Stdout output. Logs go to stderr, so stdout carries only results.

use anyhow::Result;
use serde::Serialize;

/// Print `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
