// Rendering one progression to one file.
//
// `Renderer` is the seam between the dispatcher and the filesystem: the
// dispatcher hands it a progression and an output directory and gets back a
// `Result`. `MidiRenderer` is the real implementation; tests substitute
// their own.
//
// File names are the chord names joined with `-` plus `.mid`, e.g.
// `C_major-Eb_minor-G_major-A_minor.mid`. Two different progressions can map
// to the same name when the catalog spans more than an octave, so writes go
// through a `CollisionPolicy` instead of blindly truncating.
//
// Bytes are staged in a temporary file inside the output directory and moved
// onto the final name only once they are complete. A failed write leaves
// nothing under the final name, so neither a retry nor a later `skip` run can
// mistake a partial file for a finished one.

use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{ChordTemplate, chord_name};
use crate::error::RenderError;
use crate::midi::{MidiOptions, encode_progression};
use crate::pitch::Spelling;

/// File extension for rendered progressions.
pub const EXTENSION: &str = "mid";

/// Separator between chord names in a file name.
pub const SEPARATOR: &str = "-";

/// Longest file name most filesystems accept, in bytes.
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// Prefix of staged files; they never end in `.mid`.
const STAGING_PREFIX: &str = ".chordsweep-";

/// What happened to a successfully handled unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Written(PathBuf),
    /// A file with this name already existed and `CollisionPolicy::Skip` kept it.
    Skipped(PathBuf),
}

/// Renders a single progression into `output_dir`.
///
/// Implementations are shared across worker threads.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        progression: &[ChordTemplate],
        output_dir: &Path,
    ) -> Result<RenderOutcome, RenderError>;
}

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[derive(clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail the unit and leave the existing file alone.
    #[default]
    Error,
    /// Keep the existing file and count the unit as skipped.
    Skip,
    /// Replace the existing file.
    Overwrite,
}

/// `Chord1-Chord2-...-ChordN`, the file name without its extension.
pub fn progression_title(
    progression: &[ChordTemplate],
    spelling: Spelling,
) -> Result<String, RenderError> {
    let names = progression
        .iter()
        .map(|chord| chord_name(&chord.notes(), spelling))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.join(SEPARATOR))
}

/// `Chord1-Chord2-...-ChordN.mid`
pub fn progression_file_name(
    progression: &[ChordTemplate],
    spelling: Spelling,
) -> Result<String, RenderError> {
    Ok(format!("{}.{EXTENSION}", progression_title(progression, spelling)?))
}

/// Length in bytes of the longest file name a progression of `num_chords`
/// templates from `catalog` can get. Saturates instead of overflowing.
pub fn longest_file_name(
    catalog: &[ChordTemplate],
    spelling: Spelling,
    num_chords: u32,
) -> usize {
    let widest = catalog
        .iter()
        .map(|template| template.name(spelling).len())
        .max()
        .unwrap_or(0);
    let chords = num_chords as usize;
    widest
        .saturating_mul(chords)
        .saturating_add(SEPARATOR.len().saturating_mul(chords.saturating_sub(1)))
        .saturating_add(EXTENSION.len() + 1)
}

/// Writes progressions as Standard MIDI Files.
#[derive(Debug, Clone, Default)]
pub struct MidiRenderer {
    pub spelling: Spelling,
    pub collision: CollisionPolicy,
    pub midi: MidiOptions,
    /// Extra attempts after a transient I/O error.
    pub retries: u32,
}

impl MidiRenderer {
    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.write_staged(path, |file| file.write_all(bytes))
    }

    /// Fill a temporary file next to `path`, then move it onto `path`. The
    /// temporary file is removed on every error path.
    fn write_staged<F>(&self, path: &Path, fill: F) -> io::Result<()>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(dir)?;
        fill(staged.as_file_mut())?;
        let persisted = match self.collision {
            CollisionPolicy::Overwrite => staged.persist(path),
            CollisionPolicy::Error | CollisionPolicy::Skip => staged.persist_noclobber(path),
        };
        persisted.map(drop).map_err(|e| e.error)
    }

    /// Run `write` until it succeeds, retrying transient errors up to
    /// `self.retries` extra times, and map the result onto the collision
    /// policy.
    fn write_with_retries<F>(
        &self,
        path: PathBuf,
        mut write: F,
    ) -> Result<RenderOutcome, RenderError>
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let mut attempt = 0;
        loop {
            match write(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "wrote progression");
                    return Ok(RenderOutcome::Written(path));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    return match self.collision {
                        CollisionPolicy::Skip => Ok(RenderOutcome::Skipped(path)),
                        _ => Err(RenderError::Collision { path }),
                    };
                }
                Err(e) if is_transient(e.kind()) && attempt < self.retries => {
                    attempt += 1;
                    debug!(path = %path.display(), attempt, error = %e, "retrying write");
                }
                Err(source) => return Err(RenderError::Io { path, source }),
            }
        }
    }
}

impl Renderer for MidiRenderer {
    fn render(
        &self,
        progression: &[ChordTemplate],
        output_dir: &Path,
    ) -> Result<RenderOutcome, RenderError> {
        let title = progression_title(progression, self.spelling)?;
        let bytes = encode_progression(progression, &title, &self.midi)?;
        let path = output_dir.join(format!("{title}.{EXTENSION}"));
        self.write_with_retries(path, |path| self.write_file(path, &bytes))
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}
