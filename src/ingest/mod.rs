//! Profile ingestion: reading float files, flattening them into measurement
//! rows and per-profile summaries, and committing each file exactly once.

pub mod dataset;
pub mod readers;
pub mod time;
pub mod walker;
pub mod extractor;
pub mod summary;
pub mod ledger;
pub mod db_writer;
pub mod snapshot;
pub mod pipeline;

pub use dataset::{Dataset, Values, Variable};
pub use readers::{DatasetReader, ReaderRegistry, CANDIDATE_EXTENSIONS};
pub use time::{decode_times, TimeStrategy};
pub use walker::{discover_files, SourceFile};
pub use extractor::{Extraction, MeasurementRow, ProfileExtractor, ProfileLevels};
pub use summary::{summarize, summarize_all, ProfileSummary};
pub use ledger::{digest_of, ContentDigest, LedgerEntry};
pub use db_writer::{commit_file, CommitOutcome};
pub use snapshot::write_snapshot;
pub use pipeline::{FileOutcome, PipelineDriver, PipelineOptions, RunReport};
