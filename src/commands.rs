use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::backends::formats_for;
use crate::config::Config;
use crate::transcribe::backend::BackendKind;
use crate::transcribe::dispatcher::BatchReport;
use crate::transcribe::facade::TranscriptionFacade;

/// Transcribe `files` and print the per-file accounting.
///
/// Returns whether every file produced a transcript.
pub async fn run_transcribe(
    config: &Config,
    files: Vec<PathBuf>,
    backend: Option<BackendKind>,
    dest: Option<PathBuf>,
    chunk_size: Option<usize>,
) -> Result<bool> {
    let mut config = config.clone();
    if let Some(kind) = backend {
        config.transcription.backend = kind;
    }
    if let Some(size) = chunk_size {
        config.dispatch.chunk_size = size;
    }

    let mut facade = TranscriptionFacade::from_config(&config)
        .with_context(|| format!("Failed to set up the {} backend", config.transcription.backend))?;
    if let Some(dest) = dest {
        facade.set_destination(dest)?;
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("Interrupted, cancelling outstanding jobs");
        handler_token.cancel();
    }) {
        tracing::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let report = facade
        .transcribe_with_cancel(files, &cancel)
        .await
        .context("Batch aborted")?;
    print!("{}", format_report(&report));
    Ok(report.all_succeeded())
}

pub fn format_report(report: &BatchReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(path) => out.push_str(&format!(
                "  ok      {} -> {}\n",
                outcome.source.display(),
                path.display()
            )),
            Err(e) => out.push_str(&format!("  failed  {}: {}\n", outcome.source.display(), e)),
        }
    }
    let failed = report.failed().count();
    out.push_str(&format!(
        "{}: {} succeeded, {} failed ({} chunks)\n",
        report.backend,
        report.outcomes.len() - failed,
        failed,
        report.chunks
    ));
    out
}

/// List every backend with its accepted inputs.
pub fn list_backends(config: &Config) -> Result<()> {
    println!("Backends:");
    for kind in BackendKind::ALL {
        let formats = formats_for(kind);
        let marker = if kind == config.transcription.backend {
            "*"
        } else {
            " "
        };
        let configured = if config.backends.is_configured(kind) {
            "configured"
        } else {
            "not configured"
        };
        println!(
            " {} {:<9} {:<15} {}-{} Hz  [{}]",
            marker,
            kind.to_string(),
            configured,
            formats.sample_rates.min_hz,
            formats.sample_rates.max_hz,
            formats.extensions().join(", ")
        );
    }
    Ok(())
}

/// Write the commented default config to `path` or the platform location.
pub fn init_config(path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => Config::platform_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };

    if target.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            target.display()
        );
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&target, Config::generate_default_commented())
        .with_context(|| format!("Failed to write {}", target.display()))?;
    println!("Wrote config: {}", target.display());
    Ok(target)
}
