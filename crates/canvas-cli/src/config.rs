//! Configuration file management for canvas.
//!
//! Provides a TOML-based config file at `~/.config/canvas/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use canvas_core::framework::Framework;
use canvas_core::SessionConfig;

/// Environment variable selecting the target framework.
pub const FRAMEWORK_ENV: &str = "CANVAS_FRAMEWORK";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub session: SessionConfig,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the canvas config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/canvas` or `~/.config/canvas`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("canvas");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("canvas")
}

/// Return the path to the canvas config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse a config file. Returns an error if it does not exist.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write a config file, creating parent dirs as needed.
pub fn save_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Resolve the session configuration.
///
/// - Framework: `cli_framework` > `CANVAS_FRAMEWORK` env > config file > default
/// - Everything else: config file > default
///
/// A missing config file is not an error; an unreadable or invalid one is.
pub fn resolve(cli_framework: Option<&str>) -> Result<SessionConfig> {
    let path = config_path();
    let file = if path.exists() {
        Some(load_config(&path)?)
    } else {
        None
    };
    let env = std::env::var(FRAMEWORK_ENV).ok();
    resolve_from(cli_framework, env.as_deref(), file)
}

/// Pure part of [`resolve`].
pub fn resolve_from(
    cli_framework: Option<&str>,
    env_framework: Option<&str>,
    file: Option<ConfigFile>,
) -> Result<SessionConfig> {
    let mut config = file.map(|f| f.session).unwrap_or_default();

    if let Some(value) = cli_framework {
        config.framework = parse_framework(value, "--framework")?;
    } else if let Some(value) = env_framework {
        config.framework = parse_framework(value, FRAMEWORK_ENV)?;
    }

    Ok(config)
}

fn parse_framework(value: &str, source: &str) -> Result<Framework> {
    value
        .parse::<Framework>()
        .with_context(|| format!("invalid framework from {source}"))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
