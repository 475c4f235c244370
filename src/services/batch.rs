//! Batch orchestration: one file at a time, failures isolated per file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::db::OrderSink;
use crate::error::{ExtractError, PersistenceError};
use crate::excel;
use crate::metadata::file_name;
use crate::normalizer::NormalizationEngine;
use crate::pdf;
use crate::services::discovery::DocumentKind;
use crate::types::{ExtractionBatchResult, FailedFile, OrderRecord, Severity};

/// Receives batch events. Both methods default to no-ops.
pub trait BatchObserver {
    /// Human-readable status line.
    fn log(&mut self, _message: &str, _severity: Severity) {}

    /// Called after each file, `done` never decreasing.
    fn progress(&mut self, _done: usize, _total: usize) {}
}

/// An observer that ignores everything.
pub struct NullObserver;
impl BatchObserver for NullObserver {}

/// Forwards batch events to `tracing`.
pub struct TracingObserver;

impl BatchObserver for TracingObserver {
    fn log(&mut self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!("{message}"),
            Severity::Warning => warn!("{message}"),
            Severity::Error => error!("{message}"),
        }
    }

    fn progress(&mut self, done: usize, total: usize) {
        debug!(done, total, "batch progress");
    }
}

/// Cooperative cancel request, checked before each file.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct ProgressInner {
    done: AtomicUsize,
    total: AtomicUsize,
}

/// `(files_done, files_total)` shared with whoever watches the worker.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<ProgressInner>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&self, total: usize) {
        self.0.done.store(0, Ordering::Release);
        self.0.total.store(total, Ordering::Release);
    }

    fn advance(&self) -> usize {
        self.0.done.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.0.done.load(Ordering::Acquire),
            self.0.total.load(Ordering::Acquire),
        )
    }
}

/// Route one file to its extractor.
pub fn extract_file(
    path: &Path,
    engine: &mut NormalizationEngine,
) -> Result<Vec<OrderRecord>, ExtractError> {
    match DocumentKind::from_path(path) {
        Some(DocumentKind::Workbook) => excel::extract_workbook(path, engine),
        Some(DocumentKind::Pdf) => pdf::extract_pdf(path, engine),
        Some(DocumentKind::PageText) => pdf::extract_text_dump(path, engine),
        None => Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Drives extraction over a file list. Owns the normalization engine for
/// the duration of the run; take it back with [`BatchRunner::into_engine`].
pub struct BatchRunner {
    engine: NormalizationEngine,
    cancel: CancelFlag,
    progress: ProgressCounter,
}

impl BatchRunner {
    pub fn new(engine: NormalizationEngine) -> Self {
        Self {
            engine,
            cancel: CancelFlag::new(),
            progress: ProgressCounter::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCounter) -> Self {
        self.progress = progress;
        self
    }

    pub fn engine(&self) -> &NormalizationEngine {
        &self.engine
    }

    pub fn into_engine(self) -> NormalizationEngine {
        self.engine
    }

    /// Extract every file in order and append each file's records to `sink`.
    ///
    /// Extraction failures are counted and the run continues. A sink failure
    /// aborts the run and is returned.
    pub fn run<S: OrderSink>(
        &mut self,
        files: &[PathBuf],
        sink: &mut S,
        observer: &mut dyn BatchObserver,
    ) -> Result<ExtractionBatchResult, PersistenceError> {
        let total = files.len();
        let mut result = ExtractionBatchResult {
            files_total: total,
            ..Default::default()
        };
        self.progress.start(total);
        observer.progress(0, total);
        observer.log(&format!("Found {total} file(s) to process"), Severity::Info);

        for path in files {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                let (done, _) = self.progress.snapshot();
                observer.log(
                    &format!("Cancelled after {done}/{total} file(s)"),
                    Severity::Warning,
                );
                break;
            }

            let name = file_name(path);
            observer.log(&format!("Processing {name}"), Severity::Info);
            match extract_file(path, &mut self.engine) {
                Ok(records) if records.is_empty() => {
                    result.files_skipped_empty += 1;
                    observer.log(&format!("{name}: no orders found"), Severity::Warning);
                }
                Ok(records) => {
                    sink.append_records(&records)?;
                    result.files_processed += 1;
                    result.records_extracted += records.len();
                    observer.log(
                        &format!("{name}: {} record(s) extracted", records.len()),
                        Severity::Success,
                    );
                }
                Err(e) => {
                    result.files_errored += 1;
                    observer.log(&format!("{name}: {e}"), Severity::Error);
                    result.failures.push(FailedFile {
                        file_path: path.display().to_string(),
                        file_name: name,
                        error: e.to_string(),
                    });
                }
            }

            let done = self.progress.advance();
            observer.progress(done, total);
        }

        observer.log(
            &format!(
                "Batch finished: {} processed, {} empty, {} failed, {} record(s)",
                result.files_processed,
                result.files_skipped_empty,
                result.files_errored,
                result.records_extracted
            ),
            Severity::Info,
        );
        Ok(result)
    }

    pub fn summary(&self, result: ExtractionBatchResult) -> BatchSummary {
        BatchSummary {
            result,
            consolidation_report: self.engine.report(),
        }
    }
}

/// Final counters plus the normalization report.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub result: ExtractionBatchResult,
    pub consolidation_report: String,
}

impl BatchSummary {
    pub fn lines(&self) -> Vec<String> {
        let r = &self.result;
        let mut lines = vec![
            format!("Files: {}", r.files_total),
            format!("Processed: {}", r.files_processed),
            format!("Without orders: {}", r.files_skipped_empty),
            format!("Errors: {}", r.files_errored),
            format!("Records extracted: {}", r.records_extracted),
        ];
        for failure in &r.failures {
            lines.push(format!("  {}: {}", failure.file_name, failure.error));
        }
        if r.cancelled {
            lines.push("Run cancelled before all files were read".to_string());
        }
        lines.push(String::new());
        lines.extend(self.consolidation_report.lines().map(str::to_string));
        lines
    }
}

/// What the worker thread hands back.
pub struct BatchOutcome<S> {
    pub runner: BatchRunner,
    pub sink: S,
    pub result: Result<ExtractionBatchResult, PersistenceError>,
}

/// Run the whole batch on one background thread. The runner, sink and
/// result come back through the join handle.
pub fn spawn_batch<S, O>(
    mut runner: BatchRunner,
    files: Vec<PathBuf>,
    mut sink: S,
    mut observer: O,
) -> std::io::Result<JoinHandle<BatchOutcome<S>>>
where
    S: OrderSink + Send + 'static,
    O: BatchObserver + Send + 'static,
{
    thread::Builder::new()
        .name("meal-orders-batch".to_string())
        .spawn(move || {
            let result = runner.run(&files, &mut sink, &mut observer);
            BatchOutcome {
                runner,
                sink,
                result,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[derive(Default)]
    struct Recorder {
        messages: Vec<(String, Severity)>,
        progress: Vec<(usize, usize)>,
    }

    impl BatchObserver for Recorder {
        fn log(&mut self, message: &str, severity: Severity) {
            self.messages.push((message.to_string(), severity));
        }

        fn progress(&mut self, done: usize, total: usize) {
            self.progress.push((done, total));
        }
    }

    struct FailingSink;

    impl OrderSink for FailingSink {
        fn append_records(&mut self, _records: &[OrderRecord]) -> Result<(), PersistenceError> {
            Err(PersistenceError::Poisoned)
        }

        fn close(self) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn five_files(dir: &Path) -> Vec<PathBuf> {
        vec![
            write(dir, "a.txt", b"ECOLE : Pasteur\nStandard 1 2 0 0"),
            write(dir, "b.txt", b"ECOLE : Ferry\nHalal 0 0 3 0"),
            write(dir, "c.pdf", b"%PDF-1.4 truncated"),
            write(dir, "d.txt", b"ECOLE : Ste Anne\nSans porc 1 1 1 1"),
            write(dir, "e.txt", b"ECOLE : Moulin\nStandard 0 0 0 5"),
        ]
    }

    #[test]
    fn malformed_file_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        let mut runner = BatchRunner::new(NormalizationEngine::new());
        let mut sink: Vec<OrderRecord> = Vec::new();
        let mut observer = Recorder::default();

        let result = runner.run(&files, &mut sink, &mut observer).unwrap();

        assert_eq!(result.files_total, 5);
        assert_eq!(result.files_processed, 4);
        assert_eq!(result.files_errored, 1);
        assert_eq!(result.records_extracted, 2 + 1 + 4 + 1);
        assert_eq!(sink.len(), result.records_extracted);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].file_name, "c.pdf");
        assert!(observer
            .messages
            .iter()
            .any(|(m, s)| *s == Severity::Error && m.starts_with("c.pdf")));
    }

    #[test]
    fn progress_is_monotonic_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        let counter = ProgressCounter::new();
        let mut runner =
            BatchRunner::new(NormalizationEngine::new()).with_progress(counter.clone());
        let mut observer = Recorder::default();

        runner.run(&files, &mut Vec::new(), &mut observer).unwrap();

        let done: Vec<usize> = observer.progress.iter().map(|(d, _)| *d).collect();
        assert_eq!(done, vec![0, 1, 2, 3, 4, 5]);
        assert!(observer.progress.iter().all(|(_, t)| *t == 5));
        assert_eq!(counter.snapshot(), (5, 5));
    }

    #[test]
    fn empty_file_is_a_warning_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write(dir.path(), "blank.txt", b"Menu de la semaine\n")];
        let mut runner = BatchRunner::new(NormalizationEngine::new());
        let mut observer = Recorder::default();

        let result = runner.run(&files, &mut Vec::new(), &mut observer).unwrap();

        assert_eq!(result.files_skipped_empty, 1);
        assert_eq!(result.files_errored, 0);
        assert!(observer
            .messages
            .iter()
            .any(|(m, s)| *s == Severity::Warning && m.contains("no orders")));
    }

    #[test]
    fn unsupported_extension_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write(dir.path(), "notes.docx", b"x")];
        let mut runner = BatchRunner::new(NormalizationEngine::new());

        let result = runner.run(&files, &mut Vec::new(), &mut NullObserver).unwrap();

        assert_eq!(result.files_errored, 1);
        assert!(result.failures[0].error.contains("unsupported"));
    }

    #[test]
    fn cancel_stops_before_next_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut runner = BatchRunner::new(NormalizationEngine::new()).with_cancel(cancel);
        let mut sink = Vec::new();

        let result = runner.run(&files, &mut sink, &mut NullObserver).unwrap();

        assert!(result.cancelled);
        assert_eq!(result.files_processed + result.files_errored, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn sink_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        let mut runner = BatchRunner::new(NormalizationEngine::new());

        let err = runner.run(&files, &mut FailingSink, &mut NullObserver).unwrap_err();
        assert!(matches!(err, PersistenceError::Poisoned));
    }

    #[test]
    fn summary_includes_consolidation_report() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "a.txt", b"ECOLE : Ste Anne mat\nStandard 1 0 0 0"),
            write(dir.path(), "b.txt", b"ECOLE : SAINTE ANNE MATERNELLE\nStandard 1 0 0 0"),
        ];
        let mut runner = BatchRunner::new(NormalizationEngine::new());
        let result = runner.run(&files, &mut Vec::new(), &mut NullObserver).unwrap();

        let lines = runner.summary(result).lines();
        assert!(lines.contains(&"Processed: 2".to_string()));
        assert!(lines.iter().any(|l| l == "SAINTE ANNE MATERNELLE:"));
    }

    #[test]
    fn spawned_batch_returns_engine_and_sink() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        let counter = ProgressCounter::new();
        let runner = BatchRunner::new(NormalizationEngine::new()).with_progress(counter.clone());

        let handle = spawn_batch(runner, files, Vec::new(), NullObserver).unwrap();
        let outcome = handle.join().unwrap();

        let result = outcome.result.unwrap();
        assert_eq!(result.files_processed, 4);
        assert_eq!(outcome.sink.len(), result.records_extracted);
        assert_eq!(outcome.runner.engine().found_schools().len(), 4);
        assert_eq!(counter.snapshot(), (5, 5));
    }
}
