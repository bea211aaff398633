pub mod config;
pub mod error;
pub mod db;
pub mod ingest;

pub use config::Config;
pub use error::{IngestError, Result};
