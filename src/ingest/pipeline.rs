//! Batch driver: discover → digest → skip-check → read → extract → aggregate
//! → commit → relocate → snapshot, one file at a time by default.
//!
//! Per-file failures never abort the batch; the failing file stays in the
//! intake directory for the next run. Relocation only happens after the
//! commit returns, so a crash in between leaves a committed file in intake,
//! which the next run recognises by digest and moves without re-parsing.

use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};

use super::db_writer::{commit_file, CommitOutcome};
use super::extractor::{MeasurementRow, ProfileExtractor};
use super::ledger::{self, digest_of};
use super::readers::{ReaderRegistry, CANDIDATE_EXTENSIONS};
use super::snapshot::write_snapshot;
use super::summary::summarize_all;
use super::walker::{discover_files, SourceFile};
use crate::config::Config;
use crate::db::Db;
use crate::error::{IngestError, Result};

/// Directories and tuning for one run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub intake_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// `None` disables snapshots
    pub snapshot_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub workers: usize,
    pub surface_depth: f64,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            intake_dir: config.paths.intake_dir.clone(),
            processed_dir: config.paths.processed_dir.clone(),
            snapshot_dir: config
                .pipeline
                .write_snapshots
                .then(|| config.paths.snapshot_dir.clone()),
            batch_size: config.pipeline.batch_size,
            workers: config.pipeline.workers,
            surface_depth: config.pipeline.surface_depth,
        }
    }
}

/// What happened to one file that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Ingested { rows: usize, summaries: usize },
    /// Digest already in the ledger; nothing was parsed or written
    AlreadyProcessed,
}

/// Per-file result, including the best-effort steps after the commit
#[derive(Debug)]
pub struct FileReport {
    pub file_name: String,
    pub result: Result<FileOutcome>,
    pub relocated: bool,
    pub snapshot_failed: bool,
}

/// A file that stays in intake
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub file_name: String,
    pub error: String,
    /// Storage-side failure; the same bytes may succeed on a later run
    pub transient: bool,
}

/// Totals for one run
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    pub discovered: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub rows_inserted: usize,
    pub summaries_inserted: usize,
    pub relocation_failures: usize,
    pub snapshot_failures: usize,
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record(&mut self, report: FileReport) {
        match report.result {
            Ok(FileOutcome::Ingested { rows, summaries }) => {
                self.ingested += 1;
                self.rows_inserted += rows;
                self.summaries_inserted += summaries;
                log::info!(
                    "✓ {} ({} rows, {} summaries; {} rows so far)",
                    report.file_name, rows, summaries, self.rows_inserted
                );
            }
            Ok(FileOutcome::AlreadyProcessed) => {
                self.skipped += 1;
            }
            Err(e) => {
                log::error!("✗ {}: {}", report.file_name, e);
                self.failures.push(FileFailure {
                    file_name: report.file_name,
                    transient: e.is_transient(),
                    error: e.to_string(),
                });
                return;
            }
        }

        if !report.relocated {
            self.relocation_failures += 1;
        }
        if report.snapshot_failed {
            self.snapshot_failures += 1;
        }
    }

    pub fn log_summary(&self) {
        log::info!("=== Ingestion Complete ===");
        log::info!("Files discovered: {}", self.discovered);
        log::info!("  Ingested: {}", self.ingested);
        log::info!("  Already processed (skipped): {}", self.skipped);
        log::info!("  Failed: {}", self.failures.len());
        log::info!("Rows inserted: {}", self.rows_inserted);
        log::info!("Summaries inserted: {}", self.summaries_inserted);
        if self.relocation_failures > 0 {
            log::warn!(
                "{} committed file(s) could not be moved out of intake; they will be moved on the next run",
                self.relocation_failures
            );
        }
        if self.snapshot_failures > 0 {
            log::warn!("{} snapshot(s) could not be written", self.snapshot_failures);
        }
        for failure in &self.failures {
            log::warn!(
                "Left in intake: {} ({}{})",
                failure.file_name,
                failure.error,
                if failure.transient { ", will retry" } else { "" }
            );
        }
    }
}

/// Runs the ingestion pipeline over the intake directory
pub struct PipelineDriver {
    db: Db,
    options: PipelineOptions,
    readers: ReaderRegistry,
    extractor: ProfileExtractor,
}

impl PipelineDriver {
    pub fn new(db: Db, options: PipelineOptions) -> Self {
        let extractor = ProfileExtractor::new(options.surface_depth);
        Self {
            db,
            options,
            readers: ReaderRegistry::new(),
            extractor,
        }
    }

    /// Process every file currently in intake and report totals
    pub async fn run(&self) -> Result<RunReport> {
        let intake_dir = self.options.intake_dir.clone();
        let processed_dir = self.options.processed_dir.clone();
        let files = blocking(move || {
            let files = discover_files(&intake_dir, CANDIDATE_EXTENSIONS)?;
            std::fs::create_dir_all(&processed_dir)?;
            Ok(files)
        })
        .await?;

        let total = files.len();
        let mut report = RunReport { discovered: total, ..Default::default() };

        if files.is_empty() {
            log::info!("No files in {}", self.options.intake_dir.display());
            return Ok(report);
        }

        let mut results = stream::iter(files.iter().enumerate())
            .map(|(idx, file)| {
                log::info!(
                    "[{}/{}] Processing: {} ({} bytes)",
                    idx + 1, total, file.name, file.file_size
                );
                self.process_file(file)
            })
            .buffered(self.options.workers.max(1));

        while let Some(file_report) = results.next().await {
            report.record(file_report);
        }

        Ok(report)
    }

    /// Run one file through the pipeline
    pub async fn process_file(&self, file: &SourceFile) -> FileReport {
        let mut report = FileReport {
            file_name: file.name.clone(),
            result: Ok(FileOutcome::AlreadyProcessed),
            relocated: false,
            snapshot_failed: false,
        };

        let ingested = self.ingest(file).await;
        let Committed { outcome, snapshot_rows } = match ingested {
            Ok(committed) => committed,
            Err(e) => {
                report.result = Err(e);
                return report;
            }
        };

        let source = file.path.clone();
        let processed_dir = self.options.processed_dir.clone();
        let name = file.name.clone();
        report.relocated = match blocking(move || relocate(&source, &processed_dir, &name)).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("{} committed but not moved: {}", file.name, e);
                false
            }
        };

        if let (Some(dir), Some(rows)) = (self.options.snapshot_dir.clone(), snapshot_rows) {
            let name = file.name.clone();
            if let Err(e) = blocking(move || write_snapshot(&dir, &name, &rows)).await {
                log::warn!("Snapshot for {} failed: {}", file.name, e);
                report.snapshot_failed = true;
            }
        }

        report.result = Ok(outcome);
        report
    }

    /// Everything up to and including the commit
    async fn ingest(&self, file: &SourceFile) -> Result<Committed> {
        let path = file.path.clone();
        let bytes = blocking(move || Ok(std::fs::read(&path)?)).await?;
        let digest = digest_of(&bytes);

        if ledger::is_processed(&self.db, &file.name, &digest).await? {
            log::info!(" - Skipping {} (already processed)", file.name);
            return Ok(Committed { outcome: FileOutcome::AlreadyProcessed, snapshot_rows: None });
        }

        let dataset = self.readers.read(&bytes, &file.path)?;
        drop(bytes);

        let extraction = self.extractor.extract(&dataset, &file.name)?;
        let summaries = summarize_all(&file.name, &extraction);
        if extraction.rows.is_empty() {
            log::info!(" - {} has no valid rows", file.name);
        }

        let snapshot_rows = self.options.snapshot_dir.as_ref().map(|_| extraction.rows.clone());
        let outcome = commit_file(
            &self.db,
            &file.name,
            &digest,
            extraction.rows,
            summaries,
            self.options.batch_size,
        )
        .await?;

        Ok(match outcome {
            CommitOutcome::Committed { rows, summaries } => Committed {
                outcome: FileOutcome::Ingested { rows, summaries },
                snapshot_rows,
            },
            CommitOutcome::AlreadyCommitted => Committed {
                outcome: FileOutcome::AlreadyProcessed,
                snapshot_rows: None,
            },
        })
    }
}

struct Committed {
    outcome: FileOutcome,
    snapshot_rows: Option<Vec<MeasurementRow>>,
}

/// Run filesystem work on the blocking pool so concurrent files don't stall
/// the runtime workers
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IngestError::Task(e.to_string()))?
}

/// Move a committed file into the processed directory. A source that is
/// already gone is a no-op.
pub fn relocate(source: &Path, processed_dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    if !source.exists() {
        log::warn!("{} is no longer in intake, nothing to move", source.display());
        return Ok(None);
    }

    std::fs::create_dir_all(processed_dir)?;
    let target = processed_dir.join(file_name);

    if let Err(rename_err) = std::fs::rename(source, &target) {
        // rename fails across filesystems; fall back to copy + remove
        std::fs::copy(source, &target).map_err(|_| IngestError::Io(rename_err))?;
        std::fs::remove_file(source)?;
    }

    Ok(Some(target))
}
