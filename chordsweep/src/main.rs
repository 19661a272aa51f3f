// Chordsweep CLI entry point.
//
// Builds the template catalog, then renders every progression of the
// requested length to MIDI using the bounded dispatcher. Configuration comes
// from defaults, then an optional JSON file (`--config`), then flags.
//
// Usage:
//   cargo run --release -p chordsweep -- [--num-chords N] [--output-dir DIR]
//     [--max-workers N] [--batch-size N] [--low-note N] [--high-note N]
//     [--spelling mixed|flats|sharps] [--on-collision error|skip|overwrite]
//     [--retries N] [--tempo BPM] [--chord-beats N] [--config FILE]
//     [--no-progress] [--verbose]
//
// Logging goes to stderr, above the progress bar, and honors RUST_LOG.
// Ctrl+C stops submitting new work, lets in-flight files finish, and still
// prints the summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chordsweep::catalog::duplicate_names;
use chordsweep::config::GeneratorConfig;
use chordsweep::dispatch::{CancelToken, generate_all};
use chordsweep::pitch::Spelling;
use chordsweep::product::total_combinations;
use chordsweep::progress::{BarProgress, LogWriter, ProgressSink, SilentProgress};
use chordsweep::render::CollisionPolicy;

/// Render every major/minor triad progression of a given length to MIDI.
#[derive(Parser, Debug)]
#[command(name = "chordsweep")]
#[command(version)]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chords per progression [default: 4]
    #[arg(long)]
    num_chords: Option<u32>,

    /// Destination directory [default: chord_progressions]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Worker threads [default: 8]
    #[arg(long)]
    max_workers: Option<usize>,

    /// Maximum in-flight work units [default: 1000]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Lowest template root as a MIDI note [default: 48]
    #[arg(long)]
    low_note: Option<u8>,

    /// Highest template root as a MIDI note [default: 59]
    #[arg(long)]
    high_note: Option<u8>,

    /// Accidental spelling in file names
    #[arg(long, value_enum)]
    spelling: Option<Spelling>,

    /// What to do when a file already exists
    #[arg(long = "on-collision", value_enum)]
    collision: Option<CollisionPolicy>,

    /// Extra attempts after transient write errors [default: 0]
    #[arg(long)]
    retries: Option<u32>,

    /// Tempo written into each file [default: 120]
    #[arg(long)]
    tempo: Option<u16>,

    /// Quarter notes per chord [default: 1]
    #[arg(long)]
    chord_beats: Option<u16>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Defaults, then the config file, then explicit flags.
    fn resolve(&self) -> Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::load(path)?,
            None => GeneratorConfig::default(),
        };

        if let Some(v) = self.num_chords {
            config.num_chords = v;
        }
        if let Some(v) = &self.output_dir {
            config.output_dir = v.clone();
        }
        if let Some(v) = self.max_workers {
            config.max_workers = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.low_note {
            config.low_note = v;
        }
        if let Some(v) = self.high_note {
            config.high_note = v;
        }
        if let Some(v) = self.spelling {
            config.spelling = v;
        }
        if let Some(v) = self.collision {
            config.collision = v;
        }
        if let Some(v) = self.retries {
            config.retries = v;
        }
        if let Some(v) = self.tempo {
            config.midi.tempo_bpm = v;
        }
        if let Some(v) = self.chord_beats {
            config.midi.chord_beats = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve().context("invalid configuration")?;
    let catalog = config.catalog()?;

    let total = total_combinations(catalog.len(), config.num_chords).unwrap_or(u64::MAX);
    let bar = (!cli.no_progress).then(|| BarProgress::new(total));
    let log_writer = bar
        .as_ref()
        .map_or_else(LogWriter::stderr, BarProgress::log_writer);
    init_logging(cli.verbose, log_writer);

    let duplicates = duplicate_names(&catalog, config.spelling);
    if !duplicates.is_empty() {
        warn!(
            count = duplicates.len(),
            names = ?duplicates,
            policy = ?config.collision,
            "pitch range spans more than an octave; some progressions share a file name"
        );
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install Ctrl+C handler")?;

    let progress: &dyn ProgressSink = match &bar {
        Some(bar) => bar,
        None => &SilentProgress,
    };

    let summary = generate_all(
        &catalog,
        &config.dispatch(),
        Arc::new(config.renderer()),
        progress,
        &cancel,
    )
    .with_context(|| format!("cannot generate into {}", config.output_dir.display()))?;

    if summary.failed > 0 {
        info!(failed = summary.failed, "some progressions could not be written; see warnings above");
    }
    println!("{summary}");
    Ok(())
}

/// Log to stderr through `writer`, honoring RUST_LOG.
fn init_logging(verbose: bool, writer: LogWriter) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(writer)
        .init();
}
