//! `canvas preview` command: normalize and execute a buffer in the preview
//! sandbox and write what the preview surface would show.

use std::path::Path;

use anyhow::{Context, Result, bail};

use canvas_core::normalize::CodeNormalizer;
use canvas_core::sandbox::{PreviewDisplay, PreviewSandbox};
use canvas_core::stream::{PayloadKind, StreamClassifier};
use canvas_core::SessionConfig;

pub async fn run_preview(config: &SessionConfig, input: &str, output: Option<&Path>) -> Result<()> {
    // Recorded streams may still carry their marker.
    let classification = StreamClassifier::classify(input);
    let buffer = match (classification.kind, classification.marker) {
        (PayloadKind::Code, Some(_)) => classification.remainder,
        (PayloadKind::Chat, Some(_)) => bail!("input is a chat reply, not code"),
        _ => input,
    };

    let artifact = CodeNormalizer::new(config.normalizer.clone()).normalize(buffer, config.framework);
    if artifact.is_void() {
        bail!("nothing to preview: no markup found for {}", config.framework);
    }

    let mut sandbox = PreviewSandbox::new(&config.sandbox);
    let outcome = sandbox.execute(&artifact).await;
    let surface = sandbox.surface().clone();
    sandbox.release();

    if let Some(err) = &surface.compile_error {
        bail!("preview failed to compile: {err}");
    }
    if let Some(err) = &surface.render_error {
        eprintln!("render error: {err}");
    }
    tracing::debug!(outcome = ?outcome, "preview executed");

    let content = match surface.display {
        PreviewDisplay::Document(srcdoc) => srcdoc,
        PreviewDisplay::Rendered(html) | PreviewDisplay::Fallback(html) => html,
        PreviewDisplay::ReadOnly(source) => source,
        PreviewDisplay::Empty => bail!("preview produced no output"),
    };

    match output {
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("failed to write preview to {}", path.display()))?;
            println!("Preview written to {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}
