//! Batch driver: every report in a directory to month CSVs and a master CSV.
//!
//! Documents are fanned out to a pool of worker threads over a task
//! channel; workers report back over an event channel. Closing the task
//! channel tells idle workers to exit. A document that fails or panics is
//! reported and skipped, the others still reach the master table.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use regex::Regex;

use crate::detect::discover_pdfs;
use crate::error::{Error, Result};
use crate::model::{MasterTable, MonthTable};
use crate::parser::{DocumentLoader, ExtractOptions};
use crate::pipeline::{extract_document, Extraction};
use crate::render::{read_month_csv, write_master_csv, write_month_csv};

fn report_file_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^P223_(\D+)(\d+)\.pdf$").expect("valid file name pattern"))
}

/// Reporting month (`YYYY-MM`) of a `P223_<Mon><YY>.pdf` file.
///
/// ```
/// assert_eq!(p223::month_from_filename("input/P223_Sep24.pdf").unwrap(), "2024-09");
/// ```
pub fn month_from_filename<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let invalid = || Error::InvalidFileName(path.display().to_string());

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let caps = report_file_name().captures(name).ok_or_else(invalid)?;
    let date = NaiveDate::parse_from_str(&format!("01 {} {}", &caps[1], &caps[2]), "%d %b %y")
        .map_err(|_| invalid())?;
    Ok(date.format("%Y-%m").to_string())
}

/// Batch configuration.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Directory holding the report PDFs
    pub input_dir: PathBuf,
    /// Directory receiving one `<YYYY-MM>.csv` per report
    pub output_dir: PathBuf,
    /// Path of the combined CSV
    pub master_path: PathBuf,
    /// Number of worker threads
    pub workers: usize,
    /// Reuse month CSVs left by an earlier run
    pub skip_existing: bool,
    /// Give up on outstanding documents when no worker reports for this long
    pub stall_timeout: Option<Duration>,
    /// Per-document extraction options
    pub extract: ExtractOptions,
}

impl BatchOptions {
    /// Create batch options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the input directory.
    pub fn with_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = dir.into();
        self
    }

    /// Set the month CSV directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the master CSV path.
    pub fn with_master_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.master_path = path.into();
        self
    }

    /// Set the number of workers (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Enable or disable reuse of existing month CSVs.
    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Set the stall timeout.
    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the per-document extraction options.
    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract = options;
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output/p223/month"),
            master_path: PathBuf::from("output/p223/all.csv"),
            workers: 8,
            skip_existing: false,
            stall_timeout: None,
            extract: ExtractOptions::default(),
        }
    }
}

/// One report to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTask {
    /// Report PDF
    pub pdf: PathBuf,
    /// Reporting month, `YYYY-MM`
    pub month: String,
    /// Month CSV to write
    pub output: PathBuf,
}

/// Something that happened during a batch run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// The run started with this many progress steps.
    Started { total: usize },
    /// A document was opened.
    Loaded { pdf: PathBuf },
    /// A document was extracted and its month CSV written.
    Extracted {
        pdf: PathBuf,
        output: PathBuf,
        rows: usize,
        diagnostics: usize,
    },
    /// An existing month CSV was used instead of extracting.
    Reused { pdf: PathBuf, output: PathBuf },
    /// A document was skipped.
    Failed { pdf: PathBuf, error: String },
    /// The master CSV was written.
    MasterWritten { path: PathBuf, rows: usize },
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchEvent::Started { total } => write!(f, "started ({} steps)", total),
            BatchEvent::Loaded { pdf } => write!(f, "loaded {}", pdf.display()),
            BatchEvent::Extracted {
                pdf,
                output,
                rows,
                diagnostics,
            } => write!(
                f,
                "extracted {} to {} ({} rows, {} warnings)",
                pdf.display(),
                output.display(),
                rows,
                diagnostics
            ),
            BatchEvent::Reused { pdf, output } => {
                write!(f, "reused {} for {}", output.display(), pdf.display())
            }
            BatchEvent::Failed { pdf, error } => write!(f, "failed {}: {}", pdf.display(), error),
            BatchEvent::MasterWritten { path, rows } => {
                write!(f, "wrote {} ({} rows)", path.display(), rows)
            }
        }
    }
}

/// Receives batch events with the number of completed steps.
pub trait ProgressSink {
    /// Called once per event; `completed` never decreases.
    fn on_event(&mut self, event: &BatchEvent, completed: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: FnMut(&BatchEvent, usize, usize),
{
    fn on_event(&mut self, event: &BatchEvent, completed: usize, total: usize) {
        self(event, completed, total)
    }
}

/// Progress sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_event(&mut self, event: &BatchEvent, completed: usize, total: usize) {
        log::info!("[{}/{}] {}", completed, total, event);
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Documents planned
    pub documents: usize,
    /// Documents extracted in this run
    pub extracted: usize,
    /// Documents whose month CSV was reused
    pub reused: usize,
    /// Documents skipped, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Diagnostics raised while extracting
    pub diagnostics: usize,
    /// Rows in the master CSV; `None` when nothing was written
    pub master_rows: Option<usize>,
}

impl BatchSummary {
    /// Whether every document made it into the master table.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.master_rows.is_some()
    }
}

/// Messages from workers to the driver.
enum WorkerMessage {
    Loaded(usize),
    Extracted(usize, Box<Extraction>),
    Failed(usize, Error),
}

/// Counts progress steps: two per document, one for the master table.
struct Progress<'a> {
    sink: &'a mut dyn ProgressSink,
    completed: usize,
    total: usize,
}

impl Progress<'_> {
    fn report(&mut self, event: BatchEvent, steps: usize) {
        self.completed = (self.completed + steps).min(self.total);
        self.sink.on_event(&event, self.completed, self.total);
    }
}

/// A planned batch run.
#[derive(Debug, Clone)]
pub struct Batch {
    tasks: Vec<DocumentTask>,
    options: BatchOptions,
}

impl Batch {
    /// Discover the reports in `options.input_dir`.
    ///
    /// Fails before any work starts if a file name carries no month.
    pub fn plan(options: BatchOptions) -> Result<Self> {
        let pdfs = discover_pdfs(&options.input_dir)?;
        Self::from_paths(pdfs, options)
    }

    /// Plan a run over explicit report paths.
    pub fn from_paths(pdfs: impl IntoIterator<Item = PathBuf>, options: BatchOptions) -> Result<Self> {
        let mut tasks = pdfs
            .into_iter()
            .map(|pdf| {
                let month = month_from_filename(&pdf)?;
                let output = options.output_dir.join(format!("{}.csv", month));
                Ok(DocumentTask { pdf, month, output })
            })
            .collect::<Result<Vec<_>>>()?;
        tasks.sort_by(|a, b| a.month.cmp(&b.month).then_with(|| a.pdf.cmp(&b.pdf)));
        Ok(Self { tasks, options })
    }

    /// Planned documents, ordered by month.
    pub fn tasks(&self) -> &[DocumentTask] {
        &self.tasks
    }

    /// Progress steps of the run.
    pub fn total_steps(&self) -> usize {
        2 * self.tasks.len() + 1
    }

    /// Extract every document and write the master CSV.
    pub fn run(
        &self,
        loader: Arc<dyn DocumentLoader>,
        sink: &mut dyn ProgressSink,
    ) -> Result<BatchSummary> {
        let mut progress = Progress {
            sink,
            completed: 0,
            total: self.total_steps(),
        };
        progress.report(
            BatchEvent::Started {
                total: progress.total,
            },
            0,
        );

        let mut summary = BatchSummary {
            documents: self.tasks.len(),
            ..BatchSummary::default()
        };
        let mut months: Vec<MonthTable> = Vec::new();

        let mut pending = Vec::new();
        for task in &self.tasks {
            match self.reuse(task) {
                Some(table) => {
                    summary.reused += 1;
                    months.push(table);
                    progress.report(
                        BatchEvent::Reused {
                            pdf: task.pdf.clone(),
                            output: task.output.clone(),
                        },
                        2,
                    );
                }
                None => pending.push(task.clone()),
            }
        }

        self.extract_all(loader, pending, &mut progress, &mut summary, &mut months);

        if months.is_empty() {
            log::warn!("no document produced a table; master CSV not written");
            return Ok(summary);
        }
        let master = MasterTable::from_months(months);
        write_master_csv(&master, &self.options.master_path)?;
        summary.master_rows = Some(master.row_count());
        progress.report(
            BatchEvent::MasterWritten {
                path: self.options.master_path.clone(),
                rows: master.row_count(),
            },
            1,
        );
        Ok(summary)
    }

    /// Month table of an earlier run, when reuse is enabled and possible.
    fn reuse(&self, task: &DocumentTask) -> Option<MonthTable> {
        if !self.options.skip_existing || !task.output.is_file() {
            return None;
        }
        match read_month_csv(&task.output, &task.month) {
            Ok(table) => Some(table),
            Err(e) => {
                log::warn!(
                    "cannot reuse {}, extracting again: {}",
                    task.output.display(),
                    e
                );
                None
            }
        }
    }

    fn extract_all(
        &self,
        loader: Arc<dyn DocumentLoader>,
        tasks: Vec<DocumentTask>,
        progress: &mut Progress<'_>,
        summary: &mut BatchSummary,
        months: &mut Vec<MonthTable>,
    ) {
        if tasks.is_empty() {
            return;
        }

        let (task_tx, task_rx) = unbounded::<(usize, DocumentTask)>();
        let (event_tx, event_rx) = unbounded::<WorkerMessage>();
        for (index, task) in tasks.iter().enumerate() {
            // The receiver is alive until the workers are spawned
            let _ = task_tx.send((index, task.clone()));
        }
        drop(task_tx);

        let options = Arc::new(self.options.extract.clone());
        let workers = self.options.workers.clamp(1, tasks.len());
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let task_rx = task_rx.clone();
                let event_tx = event_tx.clone();
                let loader = Arc::clone(&loader);
                let options = Arc::clone(&options);
                thread::spawn(move || {
                    while let Ok((index, task)) = task_rx.recv() {
                        let message = run_task(index, &task, loader.as_ref(), &options, &event_tx);
                        if event_tx.send(message).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(event_tx);

        let mut loaded = vec![false; tasks.len()];
        let mut finished = vec![false; tasks.len()];
        let mut remaining = tasks.len();
        let mut stalled = None;

        while remaining > 0 {
            let message = match self.options.stall_timeout {
                Some(timeout) => match event_rx.recv_timeout(timeout) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        stalled = Some(Error::Stalled(timeout));
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match event_rx.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            match message {
                WorkerMessage::Loaded(index) => {
                    loaded[index] = true;
                    progress.report(
                        BatchEvent::Loaded {
                            pdf: tasks[index].pdf.clone(),
                        },
                        1,
                    );
                }
                WorkerMessage::Extracted(index, extraction) => {
                    finished[index] = true;
                    remaining -= 1;
                    summary.extracted += 1;
                    summary.diagnostics += extraction.diagnostics.len();
                    progress.report(
                        BatchEvent::Extracted {
                            pdf: tasks[index].pdf.clone(),
                            output: tasks[index].output.clone(),
                            rows: extraction.table.row_count(),
                            diagnostics: extraction.diagnostics.len(),
                        },
                        if loaded[index] { 1 } else { 2 },
                    );
                    months.push(extraction.table);
                }
                WorkerMessage::Failed(index, error) => {
                    finished[index] = true;
                    remaining -= 1;
                    fail(progress, summary, &tasks[index], loaded[index], &error);
                }
            }
        }

        let abandoned = stalled.unwrap_or_else(|| Error::Other("worker exited".to_string()));
        for (index, task) in tasks.iter().enumerate().filter(|(i, _)| !finished[*i]) {
            fail(progress, summary, task, loaded[index], &abandoned);
        }

        if remaining == 0 {
            for handle in handles {
                if handle.join().is_err() {
                    log::error!("worker thread panicked");
                }
            }
        }
        // Otherwise stalled workers are left detached
    }
}

fn fail(
    progress: &mut Progress<'_>,
    summary: &mut BatchSummary,
    task: &DocumentTask,
    loaded: bool,
    error: &Error,
) {
    log::error!("skipping {}: {}", task.pdf.display(), error);
    summary.failed.push((task.pdf.clone(), error.to_string()));
    progress.report(
        BatchEvent::Failed {
            pdf: task.pdf.clone(),
            error: error.to_string(),
        },
        if loaded { 1 } else { 2 },
    );
}

/// Extract one document on a worker, containing errors and panics.
fn run_task(
    index: usize,
    task: &DocumentTask,
    loader: &dyn DocumentLoader,
    options: &ExtractOptions,
    events: &Sender<WorkerMessage>,
) -> WorkerMessage {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Extraction> {
        let backend = loader.load(&task.pdf)?;
        let _ = events.send(WorkerMessage::Loaded(index));
        let extraction = extract_document(backend.as_ref(), &task.pdf, &task.month, options)?;
        write_month_csv(&extraction.table, &task.output)?;
        Ok(extraction)
    }));

    match outcome {
        Ok(Ok(extraction)) => WorkerMessage::Extracted(index, Box::new(extraction)),
        Ok(Err(error)) => WorkerMessage::Failed(index, error),
        Err(payload) => WorkerMessage::Failed(index, Error::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
