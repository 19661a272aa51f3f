// Chord templates and the catalog they are enumerated from.
//
// A template is a root-position triad at a fixed transposition: three MIDI
// notes whose intervals above the lowest note are either [0, 4, 7] (major) or
// [0, 3, 7] (minor). The catalog holds every major and every minor template
// whose root lies in an inclusive range of MIDI notes, so it always has
// exactly `2 * (high - low + 1)` entries.
//
// Catalog order is all majors (ascending root) followed by all minors. The
// order only decides which progressions are enumerated first; nothing else
// depends on it.
//
// Chord naming (`chord_name`) works on raw note slices rather than on
// `ChordTemplate` so that it can reject shapes the catalog would never
// produce. The name drops the octave, which means two templates an octave
// apart share a name; `duplicate_names` reports those ahead of a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, RenderError};
use crate::pitch::{Spelling, ascii_accidentals, pitch_name};

/// Triad quality. Only the two qualities the generator enumerates exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 2] = [ChordQuality::Major, ChordQuality::Minor];

    /// Semitones above the root, in ascending order.
    pub fn intervals(self) -> [u8; 3] {
        match self {
            ChordQuality::Major => [0, 4, 7],
            ChordQuality::Minor => [0, 3, 7],
        }
    }

    /// Lowercase label used in chord names.
    pub fn label(self) -> &'static str {
        match self {
            ChordQuality::Major => "major",
            ChordQuality::Minor => "minor",
        }
    }

    /// Recognize a quality from sorted intervals above the lowest note.
    pub fn from_intervals(intervals: &[u8]) -> Option<ChordQuality> {
        ChordQuality::ALL
            .into_iter()
            .find(|q| q.intervals().as_slice() == intervals)
    }
}

/// Highest root whose fifth is still a MIDI note.
pub const MAX_ROOT: u8 = 127 - 7;

/// One transposed triad. Every note of a constructed template is in 0..=127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChordTemplate {
    root: u8,
    quality: ChordQuality,
}

impl ChordTemplate {
    pub fn new(root: u8, quality: ChordQuality) -> Result<Self, CatalogError> {
        if root > MAX_ROOT {
            return Err(CatalogError::OutOfMidiRange { high: root });
        }
        Ok(ChordTemplate { root, quality })
    }

    /// MIDI note of the root (the lowest note).
    pub fn root(&self) -> u8 {
        self.root
    }

    pub fn quality(&self) -> ChordQuality {
        self.quality
    }

    /// The three MIDI notes of the chord, lowest first.
    pub fn notes(&self) -> [u8; 3] {
        self.quality.intervals().map(|iv| self.root + iv)
    }

    /// Name such as `C_major` or `Eb_minor`.
    pub fn name(&self, spelling: Spelling) -> String {
        format_name(self.root, self.quality, spelling)
    }
}

/// Build every major and minor template with a root in `low..=high`.
pub fn build_catalog(low: u8, high: u8) -> Result<Vec<ChordTemplate>, CatalogError> {
    if low > high {
        return Err(CatalogError::EmptyRange { low, high });
    }
    if high > MAX_ROOT {
        return Err(CatalogError::OutOfMidiRange { high });
    }

    let catalog = ChordQuality::ALL
        .into_iter()
        .flat_map(|quality| (low..=high).map(move |root| ChordTemplate { root, quality }))
        .collect();
    Ok(catalog)
}

/// Name a chord from its notes: `<PitchName>_<quality>`.
///
/// The root is the lowest note. Fails if the intervals above the root are not
/// exactly a major or a minor triad, including any note count other than 3.
pub fn chord_name(notes: &[u8], spelling: Spelling) -> Result<String, RenderError> {
    let unknown = || RenderError::UnknownShape {
        notes: notes.to_vec(),
    };
    let root = *notes.iter().min().ok_or_else(unknown)?;
    let mut intervals: Vec<u8> = notes.iter().map(|&n| n - root).collect();
    intervals.sort_unstable();

    let quality = ChordQuality::from_intervals(&intervals).ok_or_else(unknown)?;
    Ok(format_name(root, quality, spelling))
}

fn format_name(root: u8, quality: ChordQuality, spelling: Spelling) -> String {
    format!(
        "{}_{}",
        ascii_accidentals(pitch_name(root, spelling)),
        quality.label()
    )
}

/// Chord names shared by more than one template in the catalog, sorted.
///
/// Empty whenever the root range spans at most an octave.
pub fn duplicate_names(catalog: &[ChordTemplate], spelling: Spelling) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for template in catalog {
        *counts.entry(template.name(spelling)).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|&(_, count)| count > 1)
        .map(|(name, _)| name)
        .collect()
}
