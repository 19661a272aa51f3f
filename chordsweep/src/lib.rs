// Chordsweep: exhaustive triad progression generator.
//
// Enumerates every sequence of N chords drawn from a catalog of major and
// minor triads and writes each sequence to its own Standard MIDI File. The
// product is astronomically large for ordinary settings (24 templates and
// 4 chords already give 331,776 files), so enumeration is lazy and the
// number of pending work units is capped.
//
// Architecture:
// - pitch.rs: MIDI note -> ASCII pitch-class name, with selectable spelling
// - catalog.rs: chord templates, the catalog builder, and chord naming
// - product.rs: lazy odometer-style Cartesian power over the catalog
// - midi.rs: progression -> SMF conversion via `midly`
// - render.rs: the `Renderer` seam, file naming, collision policy, retries
// - progress.rs: progress observers (indicatif bar, silent)
// - dispatch.rs: bounded concurrent dispatcher and run summary
// - config.rs: JSON-loadable run configuration
// - error.rs: setup and per-unit error types
//
// Enumeration order and naming are deterministic, so the same configuration
// always produces the same set of file names.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod midi;
pub mod pitch;
pub mod product;
pub mod progress;
pub mod render;
