// MIDI output for chord progressions.
//
// Converts a progression into a Standard MIDI File (SMF). Track 0 holds the
// tempo and the progression's name; track 1 holds the chords on a single
// channel. Every chord sounds for the same length and chords follow each
// other without gaps, so the file is a plain block-chord rendering with no
// voicing applied beyond the template's own notes.
//
// Uses the `midly` crate for MIDI writing. Output is SMF Format 1 (multi-track).

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use serde::{Deserialize, Serialize};

use crate::catalog::ChordTemplate;
use crate::error::RenderError;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

const CHANNEL: u8 = 0;

/// Playback parameters baked into each file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiOptions {
    pub tempo_bpm: u16,
    /// Length of each chord in quarter notes.
    pub chord_beats: u16,
    /// Note-on velocity (clamped to 1..=127).
    pub velocity: u8,
    /// General MIDI program (clamped to 0..=127). 0 is acoustic grand piano.
    pub program: u8,
}

impl Default for MidiOptions {
    fn default() -> Self {
        Self {
            tempo_bpm: 120,
            chord_beats: 1,
            velocity: 90,
            program: 0,
        }
    }
}

/// Convert a progression to an in-memory SMF.
///
/// `title` ends up in the tempo track's name event and borrows from the caller.
pub fn progression_to_smf<'a>(
    progression: &[ChordTemplate],
    title: &'a str,
    options: &MidiOptions,
) -> Smf<'a> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo track
    let mut tempo_track: Track<'a> = Vec::new();
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(title.as_bytes())),
    });
    let tempo_microseconds = 60_000_000 / u32::from(options.tempo_bpm.max(1));
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    // Track 1: the chords
    let channel = u4::new(CHANNEL);
    let velocity = u7::new(options.velocity.clamp(1, 127));
    let chord_ticks = u32::from(TICKS_PER_QUARTER) * u32::from(options.chord_beats.max(1));

    let mut track: Track<'a> = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(options.program.min(127)),
            },
        },
    });

    for chord in progression {
        let notes = chord.notes();
        for key in notes {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(key),
                        vel: velocity,
                    },
                },
            });
        }
        // The first note-off carries the chord's duration; the rest release
        // on the same tick.
        for (i, key) in notes.into_iter().enumerate() {
            let delta = if i == 0 { chord_ticks } else { 0 };
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(key),
                        vel: u7::new(0),
                    },
                },
            });
        }
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    smf
}

/// Encode a progression as SMF bytes.
pub fn encode_progression(
    progression: &[ChordTemplate],
    title: &str,
    options: &MidiOptions,
) -> Result<Vec<u8>, RenderError> {
    let smf = progression_to_smf(progression, title, options);
    let mut buf = Vec::new();
    smf.write(&mut buf)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChordQuality;

    fn progression() -> Vec<ChordTemplate> {
        vec![
            ChordTemplate::new(48, ChordQuality::Major).unwrap(),
            ChordTemplate::new(57, ChordQuality::Minor).unwrap(),
        ]
    }

    #[test]
    fn test_progression_to_smf_tracks() {
        let smf = progression_to_smf(&progression(), "C_major-A_minor", &MidiOptions::default());
        // 1 tempo track + 1 chord track
        assert_eq!(smf.tracks.len(), 2);

        let note_ons: Vec<u8> = smf.tracks[1]
            .iter()
            .filter_map(|ev| match ev.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some(key.as_int()),
                _ => None,
            })
            .collect();
        assert_eq!(note_ons, vec![48, 52, 55, 57, 60, 64]);
    }

    #[test]
    fn test_chord_duration_in_ticks() {
        let options = MidiOptions {
            chord_beats: 2,
            ..Default::default()
        };
        let smf = progression_to_smf(&progression(), "", &options);
        let total_ticks: u32 = smf.tracks[1].iter().map(|ev| ev.delta.as_int()).sum();
        assert_eq!(total_ticks, 2 * 2 * u32::from(TICKS_PER_QUARTER));
    }

    #[test]
    fn test_encoded_bytes_parse_back() {
        let bytes = encode_progression(&progression(), "C_major-A_minor", &MidiOptions::default())
            .unwrap();
        assert_eq!(&bytes[..4], b"MThd");

        let parsed = Smf::parse(&bytes).unwrap();
        assert_eq!(parsed.header.format, Format::Parallel);
        assert_eq!(parsed.tracks.len(), 2);
        // program change + 2 chords * (3 on + 3 off) + end of track
        assert_eq!(parsed.tracks[1].len(), 1 + 12 + 1);
    }
}
