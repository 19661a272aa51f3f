// Pitch naming for human-readable file names.
//
// Maps a MIDI note number to the name of its pitch class ("C", "Eb", "F#").
// Octave numbers are deliberately omitted: chord names in file names identify
// a root and a quality, not a register.
//
// Three spellings are available. `Mixed` is the conventional default (sharps
// for C#/F#/G#, flats for Eb/Bb) and is what the generator uses unless told
// otherwise. Every name produced here is plain ASCII so it is safe in a path
// on any filesystem; `ascii_accidentals` exists for names that come from
// elsewhere and may carry notation-style markers.

use serde::{Deserialize, Serialize};

const NAMES_MIXED: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "G#", "A", "Bb", "B",
];
const NAMES_FLATS: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];
const NAMES_SHARPS: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// How black-key pitch classes are spelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Spelling {
    /// C# Eb F# G# Bb.
    #[default]
    Mixed,
    /// Db Eb Gb Ab Bb.
    Flats,
    /// C# D# F# G# A#.
    Sharps,
}

impl Spelling {
    fn table(self) -> &'static [&'static str; 12] {
        match self {
            Spelling::Mixed => &NAMES_MIXED,
            Spelling::Flats => &NAMES_FLATS,
            Spelling::Sharps => &NAMES_SHARPS,
        }
    }
}

/// Name of the pitch class of a MIDI note, e.g. 48 -> "C", 51 -> "Eb".
pub fn pitch_name(midi: u8, spelling: Spelling) -> &'static str {
    spelling.table()[(midi % 12) as usize]
}

/// Replace notation-style accidental markers with ASCII equivalents.
///
/// Handles the Unicode flat/sharp/natural signs and the `-` flat marker some
/// notation libraries emit after the letter (`E-` for E flat). A leading `-`
/// is left alone since it cannot be an accidental.
pub fn ascii_accidentals(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, ch) in name.chars().enumerate() {
        match ch {
            '\u{266D}' => out.push('b'),
            '\u{266F}' => out.push('#'),
            '\u{266E}' => {}
            '-' if i > 0 => out.push('b'),
            _ => out.push(ch),
        }
    }
    out
}
