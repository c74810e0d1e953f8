//! `sigil phases`

use std::path::Path;

use anyhow::Result;
use sigil_core::config::PathsConfig;
use sigil_engine::Phase;

use super::EXIT_OK;

pub fn run(signatures: Option<&Path>, rules: Option<&Path>) -> Result<i32> {
    let paths = PathsConfig::from_env();
    let catalog = super::load_catalog(&paths, signatures, rules)?;

    println!("{:<22} {:<17} {:>6} {:>10}  DETECTS", "PHASE", "SLUG", "WEIGHT", "SIGNATURES");
    for phase in Phase::ALL {
        println!(
            "{:<22} {:<17} {:>5}x {:>10}  {}",
            phase.name(),
            phase.slug(),
            phase.multiplier(),
            catalog.phase_count(phase),
            phase.detects()
        );
    }
    println!(
        "\n{} signatures loaded (catalog {}, digest {})",
        catalog.len(),
        catalog.version().unwrap_or("builtin"),
        &catalog.digest()[..12.min(catalog.digest().len())]
    );
    Ok(EXIT_OK)
}
