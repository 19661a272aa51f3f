// Bounded concurrent dispatcher.
//
// Enumerates every progression of the catalog lazily and renders each one as
// an independent work unit on a fixed-size worker pool.
//
// Architecture: one coordinator thread (the caller) and a `rayon` pool of
// exactly `max_workers` threads.
//
// - **Coordinator**: pulls progressions from `Progressions`, spawns a unit per
//   progression, and owns all bookkeeping: the in-flight count, the
//   `RunSummary`, and progress reporting.
// - **Workers**: run `Renderer::render` for one progression and send the
//   result back over an `mpsc` channel. Workers share no mutable state and
//   write to distinct paths.
//
// Backpressure: a unit is in flight from submission until the coordinator
// receives its completion. Before each submission, if `batch_size` units are
// in flight, the coordinator blocks for one completion and then takes any
// others that are already waiting. The in-flight count therefore never
// exceeds `batch_size`, and pending state stays bounded no matter how large
// the product is.
//
// A failed unit (render error or panic) is counted and logged; it never stops
// the run. Only setup problems (bad configuration, output directory, pool
// creation) abort, and they do so before anything is submitted.
//
// Cancellation: `CancelToken` is checked before each submission. Once set, no
// further units are submitted and the units already in flight are drained.

use std::any::Any;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::catalog::ChordTemplate;
use crate::error::{RenderError, SetupError};
use crate::product::{Progressions, total_combinations};
use crate::progress::ProgressSink;
use crate::render::{RenderOutcome, Renderer};

/// Parameters of one enumeration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Chords per progression.
    pub num_chords: u32,
    pub output_dir: PathBuf,
    /// Worker pool size.
    pub max_workers: usize,
    /// Maximum number of submitted-but-unresolved units.
    pub batch_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            num_chords: 4,
            output_dir: PathBuf::from("chord_progressions"),
            max_workers: 8,
            batch_size: 1000,
        }
    }
}

/// Shared stop flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Expected number of progressions (`catalog_len ^ num_chords`).
    pub total: u64,
    pub submitted: u64,
    /// Units resolved either way. Equals `written + skipped + failed`.
    pub processed: u64,
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Failed units whose file name was already taken. Included in `failed`.
    pub collisions: u64,
    /// Highest in-flight count observed by the coordinator.
    pub peak_in_flight: usize,
    pub cancelled: bool,
    pub output_dir: PathBuf,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, completion: Completion, progress: &dyn ProgressSink) {
        self.processed += 1;
        match completion.result {
            Ok(RenderOutcome::Written(_)) => self.written += 1,
            Ok(RenderOutcome::Skipped(path)) => {
                self.skipped += 1;
                debug!(path = %path.display(), "kept existing file");
            }
            Err(RenderError::Collision { path }) => {
                self.failed += 1;
                self.collisions += 1;
                debug!(unit = completion.index, path = %path.display(), "file name already taken");
            }
            Err(error) => {
                self.failed += 1;
                warn!(unit = completion.index, %error, "work unit failed");
            }
        }
        progress.advance(1);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Generated {} of {} MIDI files in {} ({} skipped, {} failed, {:.1}s)",
            self.written,
            self.total,
            self.output_dir.display(),
            self.skipped,
            self.failed,
            self.elapsed.as_secs_f64(),
        )?;
        if self.cancelled {
            write!(f, "; cancelled after {} submissions", self.submitted)?;
        }
        Ok(())
    }
}

/// Result of one work unit, sent from a worker to the coordinator.
struct Completion {
    /// Position of the progression in enumeration order.
    index: u64,
    result: Result<RenderOutcome, RenderError>,
}

/// Render every length-`num_chords` progression of `catalog` into
/// `config.output_dir`.
///
/// Returns once every submitted unit has resolved. Per-unit failures are
/// reported in the summary; only setup errors are returned as `Err`.
pub fn generate_all<R>(
    catalog: &[ChordTemplate],
    config: &DispatchConfig,
    renderer: Arc<R>,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<RunSummary, SetupError>
where
    R: Renderer + ?Sized + 'static,
{
    let total = validate(catalog, config)?;

    fs::create_dir_all(&config.output_dir).map_err(|source| SetupError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.max_workers)
        .thread_name(|i| format!("render-{i}"))
        .build()?;

    info!(
        total,
        catalog = catalog.len(),
        num_chords = config.num_chords,
        workers = config.max_workers,
        batch_size = config.batch_size,
        output_dir = %config.output_dir.display(),
        "starting generation"
    );

    let started = Instant::now();
    let output_dir: Arc<Path> = Arc::from(config.output_dir.as_path());
    let mut summary = RunSummary {
        total,
        output_dir: config.output_dir.clone(),
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel::<Completion>();
    let mut in_flight: usize = 0;

    // Zipping with `0..total` caps submissions at `total` even if the
    // product were to yield more.
    let progressions = Progressions::new(catalog, config.num_chords as usize);
    for (index, progression) in (0..total).zip(progressions) {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            info!(submitted = summary.submitted, in_flight, "cancelled; draining in-flight units");
            break;
        }

        if in_flight >= config.batch_size {
            in_flight -= drain_some(&rx, &mut summary, progress);
        }

        let tx = tx.clone();
        let renderer = Arc::clone(&renderer);
        let output_dir = Arc::clone(&output_dir);
        pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                renderer.render(&progression, &output_dir)
            }))
            .unwrap_or_else(|payload| Err(RenderError::Panicked(panic_message(&*payload))));
            // The coordinator holds the receiver until every unit reports.
            let _ = tx.send(Completion { index, result });
        });

        summary.submitted += 1;
        in_flight += 1;
        summary.peak_in_flight = summary.peak_in_flight.max(in_flight);
    }

    // Each unit holds a sender clone, so the receiver ends exactly when the
    // last in-flight unit has reported.
    drop(tx);
    for completion in rx {
        summary.record(completion, progress);
    }
    progress.finish();

    if summary.collisions > 0 {
        warn!(
            collisions = summary.collisions,
            "progressions were not written because their file names were already taken"
        );
    }
    summary.elapsed = started.elapsed();
    info!(
        written = summary.written,
        skipped = summary.skipped,
        failed = summary.failed,
        processed = summary.processed,
        elapsed_s = summary.elapsed.as_secs_f64(),
        "generation finished"
    );
    Ok(summary)
}

/// Check the configuration and compute the expected unit count.
fn validate(catalog: &[ChordTemplate], config: &DispatchConfig) -> Result<u64, SetupError> {
    if config.num_chords == 0 {
        return Err(SetupError::ZeroLength);
    }
    if config.max_workers == 0 {
        return Err(SetupError::ZeroWorkers);
    }
    if config.batch_size == 0 {
        return Err(SetupError::ZeroBatch);
    }
    if catalog.is_empty() {
        return Err(SetupError::EmptyCatalog);
    }
    total_combinations(catalog.len(), config.num_chords).ok_or(SetupError::TooManyCombinations {
        catalog_len: catalog.len(),
        num_chords: config.num_chords,
    })
}

/// Block for one completion, then take whatever else has already arrived.
/// Returns the number of completions recorded.
fn drain_some(
    rx: &Receiver<Completion>,
    summary: &mut RunSummary,
    progress: &dyn ProgressSink,
) -> usize {
    let Ok(first) = rx.recv() else {
        return 0;
    };
    summary.record(first, progress);
    let mut drained = 1;
    while let Ok(next) = rx.try_recv() {
        summary.record(next, progress);
        drained += 1;
    }
    drained
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ChordQuality, build_catalog};
    use crate::progress::SilentProgress;
    use std::sync::atomic::AtomicU64;

    /// Counts calls and pretends to write.
    #[derive(Default)]
    struct CountingRenderer {
        calls: AtomicU64,
    }

    impl Renderer for CountingRenderer {
        fn render(
            &self,
            progression: &[ChordTemplate],
            output_dir: &Path,
        ) -> Result<RenderOutcome, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RenderOutcome::Written(
                output_dir.join(format!("{}.mid", progression.len())),
            ))
        }
    }

    /// Progress sink whose count workers can observe.
    #[derive(Default, Clone)]
    struct SharedProgress {
        advanced: Arc<AtomicU64>,
    }

    impl ProgressSink for SharedProgress {
        fn advance(&self, n: u64) {
            self.advanced.fetch_add(n, Ordering::SeqCst);
        }
    }

    /// Measures how far renders run ahead of resolved completions.
    struct InFlightGauge {
        started: AtomicU64,
        advanced: Arc<AtomicU64>,
        max_ahead: AtomicU64,
    }

    impl Renderer for InFlightGauge {
        fn render(
            &self,
            _progression: &[ChordTemplate],
            output_dir: &Path,
        ) -> Result<RenderOutcome, RenderError> {
            let started = self.started.fetch_add(1, Ordering::SeqCst) + 1;
            let advanced = self.advanced.load(Ordering::SeqCst);
            self.max_ahead
                .fetch_max(started.saturating_sub(advanced), Ordering::SeqCst);
            std::thread::sleep(Duration::from_micros(200));
            Ok(RenderOutcome::Written(output_dir.to_path_buf()))
        }
    }

    /// Fails (or panics) for exactly one progression.
    struct FailOn {
        target: Vec<ChordTemplate>,
        panic: bool,
    }

    impl Renderer for FailOn {
        fn render(
            &self,
            progression: &[ChordTemplate],
            output_dir: &Path,
        ) -> Result<RenderOutcome, RenderError> {
            if progression == self.target.as_slice() {
                if self.panic {
                    panic!("boom");
                }
                return Err(RenderError::Encode("injected".into()));
            }
            Ok(RenderOutcome::Written(output_dir.to_path_buf()))
        }
    }

    /// Cancels the run from inside a worker after a number of calls.
    struct CancelAfter {
        calls: AtomicU64,
        after: u64,
        token: CancelToken,
    }

    impl Renderer for CancelAfter {
        fn render(
            &self,
            _progression: &[ChordTemplate],
            output_dir: &Path,
        ) -> Result<RenderOutcome, RenderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.token.cancel();
            }
            Ok(RenderOutcome::Written(output_dir.to_path_buf()))
        }
    }

    fn config(dir: &Path, num_chords: u32, max_workers: usize, batch_size: usize) -> DispatchConfig {
        DispatchConfig {
            num_chords,
            output_dir: dir.to_path_buf(),
            max_workers,
            batch_size,
        }
    }

    #[test]
    fn test_single_chord_renders_whole_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = build_catalog(48, 59).unwrap();
        let renderer = Arc::new(CountingRenderer::default());

        let summary = generate_all(
            &catalog,
            &config(dir.path(), 1, 4, 10),
            Arc::clone(&renderer),
            &SilentProgress,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(summary.total, 24);
        assert_eq!(summary.processed, 24);
        assert_eq!(summary.written, 24);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 24);
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_in_flight_never_exceeds_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = build_catalog(48, 59).unwrap();
        let progress = SharedProgress::default();
        let renderer = Arc::new(InFlightGauge {
            started: AtomicU64::new(0),
            advanced: Arc::clone(&progress.advanced),
            max_ahead: AtomicU64::new(0),
        });

        let summary = generate_all(
            &catalog,
            &config(dir.path(), 2, 3, 5),
            Arc::clone(&renderer),
            &progress,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(summary.processed, 576);
        assert_eq!(summary.peak_in_flight, 5);
        assert!(renderer.max_ahead.load(Ordering::SeqCst) <= 5);
        assert_eq!(progress.advanced.load(Ordering::SeqCst), 576);
    }

    #[test]
    fn test_one_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = build_catalog(48, 49).unwrap();
        let target = vec![
            ChordTemplate::new(49, ChordQuality::Minor).unwrap(),
            ChordTemplate::new(48, ChordQuality::Major).unwrap(),
        ];

        for panic in [false, true] {
            let renderer = Arc::new(FailOn {
                target: target.clone(),
                panic,
            });
            let summary = generate_all(
                &catalog,
                &config(dir.path(), 2, 2, 2),
                renderer,
                &SilentProgress,
                &CancelToken::new(),
            )
            .unwrap();

            assert_eq!(summary.total, 16);
            assert_eq!(summary.processed, 16);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.written, 15);
        }
    }

    #[test]
    fn test_cancel_before_start_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = build_catalog(48, 59).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let summary = generate_all(
            &catalog,
            &config(dir.path(), 4, 2, 10),
            Arc::new(CountingRenderer::default()),
            &SilentProgress,
            &token,
        )
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.total, 331_776);
    }

    #[test]
    fn test_cancel_mid_run_drains_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = build_catalog(48, 59).unwrap();
        let token = CancelToken::new();
        let renderer = Arc::new(CancelAfter {
            calls: AtomicU64::new(0),
            after: 10,
            token: token.clone(),
        });

        let summary = generate_all(
            &catalog,
            &config(dir.path(), 4, 1, 4),
            renderer,
            &SilentProgress,
            &token,
        )
        .unwrap();

        assert!(summary.cancelled);
        assert!(summary.submitted >= 10);
        assert!(summary.submitted < summary.total);
        assert_eq!(summary.processed, summary.submitted);
    }

    #[test]
    fn test_setup_errors() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = build_catalog(48, 59).unwrap();
        let run = |catalog: &[ChordTemplate], config: DispatchConfig| {
            generate_all(
                catalog,
                &config,
                Arc::new(CountingRenderer::default()),
                &SilentProgress,
                &CancelToken::new(),
            )
        };

        assert!(matches!(
            run(&catalog, config(dir.path(), 0, 1, 1)),
            Err(SetupError::ZeroLength)
        ));
        assert!(matches!(
            run(&catalog, config(dir.path(), 1, 0, 1)),
            Err(SetupError::ZeroWorkers)
        ));
        assert!(matches!(
            run(&catalog, config(dir.path(), 1, 1, 0)),
            Err(SetupError::ZeroBatch)
        ));
        assert!(matches!(
            run(&[], config(dir.path(), 1, 1, 1)),
            Err(SetupError::EmptyCatalog)
        ));
        assert!(matches!(
            run(&catalog, config(dir.path(), 20, 1, 1)),
            Err(SetupError::TooManyCombinations { .. })
        ));

        // A regular file where the output directory should go.
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        assert!(matches!(
            run(&catalog, config(&blocker.join("out"), 1, 1, 1)),
            Err(SetupError::OutputDir { .. })
        ));
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            total: 16,
            submitted: 16,
            processed: 16,
            written: 15,
            failed: 1,
            output_dir: PathBuf::from("out"),
            ..Default::default()
        };
        assert_eq!(
            summary.to_string(),
            "Generated 15 of 16 MIDI files in out (0 skipped, 1 failed, 0.0s)"
        );

        let cancelled = RunSummary {
            cancelled: true,
            submitted: 3,
            ..summary
        };
        assert!(cancelled.to_string().ends_with("; cancelled after 3 submissions"));
    }

    #[test]
    fn test_panic_message() {
        let from_str: Box<dyn Any + Send> = Box::new("static");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*from_str), "static");
        assert_eq!(panic_message(&*from_string), "owned");
        assert_eq!(panic_message(&*other), "unknown panic payload");
    }
}
