//! Environment readiness check.

use anyhow::Result;
use std::path::Path;

use crate::config::{ResolverConfig, BUDGET_ENV, CONFIG_ENV, DEFAULT_CONFIG_FILE, EXTENSION_ENV};
use crate::renderer::chromium::find_chromium;

/// Check Chromium availability and the effective configuration.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    println!("CWCOT Scout Doctor");
    println!("==================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Set CWCOT_SCOUT_CHROMIUM_PATH or install Chrome."
        ),
    }

    let source = match (config_path, std::env::var(CONFIG_ENV).ok()) {
        (Some(path), _) => format!("--config {}", path.display()),
        (None, Some(path)) if !path.trim().is_empty() => format!("{CONFIG_ENV}={path}"),
        _ if Path::new(DEFAULT_CONFIG_FILE).exists() => format!("./{DEFAULT_CONFIG_FILE}"),
        _ => "built-in defaults".to_string(),
    };
    let config_ok = match ResolverConfig::load(config_path) {
        Ok(config) => {
            println!("[OK] Config loaded from {source}");
            println!(
                "     budget {}ms, extension {}ms, {} page attempts",
                config.budget_ms, config.extension_ms, config.page_attempts
            );
            true
        }
        Err(e) => {
            println!("[!!] Config from {source} is invalid: {e:#}");
            false
        }
    };
    for name in [BUDGET_ENV, EXTENSION_ENV] {
        if let Ok(value) = std::env::var(name) {
            println!("     {name}={value}");
        }
    }

    println!();
    if chromium_path.is_some() && config_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}
