//! `canvas normalize` command: print the normalized artifact for a buffer.

use anyhow::{Context, Result};

use canvas_core::normalize::CodeNormalizer;
use canvas_core::SessionConfig;

pub fn run_normalize(config: &SessionConfig, buffer: &str, json: bool) -> Result<()> {
    let normalizer = CodeNormalizer::new(config.normalizer.clone());
    let artifact = normalizer.normalize(buffer, config.framework);

    if json {
        let out = serde_json::to_string_pretty(&artifact).context("failed to serialize artifact")?;
        println!("{out}");
        return Ok(());
    }

    if artifact.is_void() {
        eprintln!("No previewable code in input ({}).", config.framework);
        return Ok(());
    }

    println!("{}", artifact.source);
    for degradation in &artifact.degradations {
        eprintln!("  degraded [{}]: {}", degradation.step, degradation.reason);
    }
    if !artifact.executable {
        eprintln!("  ({} output is shown read-only)", config.framework);
    }
    Ok(())
}
