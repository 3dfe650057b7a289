mod config;
mod normalize_cmd;
mod preview_cmd;
mod replay_cmd;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use config::ConfigFile;

#[derive(Parser)]
#[command(name = "canvas", about = "Live preview pipeline for AI-generated UI code")]
struct Cli {
    /// Target framework: html, react-like, framework-component, vue-like
    /// (overrides CANVAS_FRAMEWORK env var and the config file)
    #[arg(long, global = true)]
    framework: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default canvas config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print the normalized artifact for a code buffer
    Normalize {
        /// Input file, or `-` for stdin
        input: String,
        /// Print the full artifact as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay a recorded backend stream through a generation session
    Replay {
        /// Recorded stream file, or `-` for stdin
        input: String,
        /// Bytes per transport chunk
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Render a code buffer in the preview sandbox
    Preview {
        /// Input file, or `-` for stdin
        input: String,
        /// Output file path (defaults to stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Execute the `canvas init` command: write config file.
fn cmd_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = ConfigFile::default();
    config::save_config(path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  session.framework = {}", cfg.session.framework);
    println!(
        "  session.sandbox.host_primitives = {}",
        cfg.session.sandbox.host_primitives.join(", ")
    );
    Ok(())
}

/// Read a file, or stdin for `-`.
fn read_input(input: &str) -> anyhow::Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(input).with_context(|| format!("failed to read {input}"))
}

fn read_text(input: &str) -> anyhow::Result<String> {
    let bytes = read_input(input)?;
    String::from_utf8(bytes).with_context(|| format!("{input} is not valid UTF-8"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(&config::config_path(), force)?;
        }
        Commands::Normalize { input, json } => {
            let session = config::resolve(cli.framework.as_deref())?;
            let buffer = read_text(&input)?;
            normalize_cmd::run_normalize(&session, &buffer, json)?;
        }
        Commands::Replay {
            input,
            chunk_size,
            json,
        } => {
            let session = config::resolve(cli.framework.as_deref())?;
            let recording = read_input(&input)?;
            replay_cmd::run_replay(session, recording, chunk_size, json).await?;
        }
        Commands::Preview { input, output } => {
            let session = config::resolve(cli.framework.as_deref())?;
            let buffer = read_text(&input)?;
            preview_cmd::run_preview(&session, &buffer, output.as_deref()).await?;
        }
    }

    Ok(())
}
