// Error types for the generator.
//
// Errors fall into two tiers. `SetupError` (and the `CatalogError` /
// `ConfigError` it wraps) is fatal and is raised before any work unit is
// submitted. `RenderError` belongs to a single work unit: the dispatcher
// counts it as a failed unit and keeps going.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid pitch range for the template catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("low note {low} is above high note {high}")]
    EmptyRange { low: u8, high: u8 },

    #[error("high note {high} puts template notes above MIDI 127")]
    OutOfMidiRange { high: u8 },
}

/// Problems loading or validating a `GeneratorConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Fatal errors that abort a run before any work is submitted.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("progression length must be at least 1")]
    ZeroLength,

    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("in-flight cap must be at least 1")]
    ZeroBatch,

    #[error("template catalog is empty")]
    EmptyCatalog,

    #[error("{catalog_len}^{num_chords} combinations does not fit in 64 bits")]
    TooManyCombinations { catalog_len: usize, num_chords: u32 },

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of a single work unit. Never aborts the run.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("notes {notes:?} are neither a major nor a minor triad")]
    UnknownShape { notes: Vec<u8> },

    #[error("MIDI encoding failed: {0}")]
    Encode(String),

    #[error("{path} already exists")]
    Collision { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("render panicked: {0}")]
    Panicked(String),
}
