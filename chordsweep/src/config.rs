// Generator configuration.
//
// `GeneratorConfig` gathers every tunable of a run: the enumeration shape
// (progression length, pitch range), the dispatcher limits, naming and
// collision behavior, and the MIDI playback options. It can be loaded from a
// JSON file; any field the file omits takes its default, so a config file
// only needs the values it changes. The CLI applies its flags on top.
//
// Defaults reproduce the classic sweep: 4-chord progressions over the
// major and minor triads rooted on C3..B3 (MIDI 48..59), 8 workers, at most
// 1000 units in flight, written to `chord_progressions/`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{ChordTemplate, build_catalog};
use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;
use crate::midi::MidiOptions;
use crate::pitch::Spelling;
use crate::render::{CollisionPolicy, MAX_FILE_NAME_BYTES, MidiRenderer, longest_file_name};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Chords per progression.
    pub num_chords: u32,
    pub output_dir: PathBuf,
    pub max_workers: usize,
    /// In-flight cap for submitted work units.
    pub batch_size: usize,
    /// Lowest template root (MIDI note).
    pub low_note: u8,
    /// Highest template root (MIDI note), inclusive.
    pub high_note: u8,
    pub spelling: Spelling,
    pub collision: CollisionPolicy,
    /// Extra attempts after transient write errors.
    pub retries: u32,
    pub midi: MidiOptions,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let dispatch = DispatchConfig::default();
        Self {
            num_chords: dispatch.num_chords,
            output_dir: dispatch.output_dir,
            max_workers: dispatch.max_workers,
            batch_size: dispatch.batch_size,
            low_note: 48,
            high_note: 59,
            spelling: Spelling::default(),
            collision: CollisionPolicy::default(),
            retries: 0,
            midi: MidiOptions::default(),
        }
    }
}

impl GeneratorConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings that cannot produce a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_chords == 0 {
            return Err(ConfigError::Invalid("num_chords must be at least 1".into()));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.midi.tempo_bpm == 0 {
            return Err(ConfigError::Invalid("tempo_bpm must be at least 1".into()));
        }
        if self.midi.chord_beats == 0 {
            return Err(ConfigError::Invalid("chord_beats must be at least 1".into()));
        }
        let catalog = build_catalog(self.low_note, self.high_note)?;
        let longest = longest_file_name(&catalog, self.spelling, self.num_chords);
        if longest > MAX_FILE_NAME_BYTES {
            return Err(ConfigError::Invalid(format!(
                "{} chords per progression give file names up to {longest} bytes \
                 (limit {MAX_FILE_NAME_BYTES})",
                self.num_chords
            )));
        }
        Ok(())
    }

    /// The template catalog for this pitch range.
    pub fn catalog(&self) -> Result<Vec<ChordTemplate>, ConfigError> {
        build_catalog(self.low_note, self.high_note).map_err(ConfigError::from)
    }

    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            num_chords: self.num_chords,
            output_dir: self.output_dir.clone(),
            max_workers: self.max_workers,
            batch_size: self.batch_size,
        }
    }

    pub fn renderer(&self) -> MidiRenderer {
        MidiRenderer {
            spelling: self.spelling,
            collision: self.collision,
            midi: self.midi.clone(),
            retries: self.retries,
        }
    }
}
