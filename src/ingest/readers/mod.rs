pub mod json;
#[cfg(feature = "netcdf")]
pub mod netcdf_reader;

use std::path::Path;

use super::dataset::Dataset;
use crate::error::{IngestError, Result};

/// Extensions the walker picks up from the intake directory. `nc` is always
/// discovered so that a build without NetCDF support reports those files as
/// failures instead of silently ignoring them.
pub const CANDIDATE_EXTENSIONS: &[&str] = &["nc", "json"];

/// Decodes one input file into a [`Dataset`]
pub trait DatasetReader: Send + Sync {
    /// Check if this reader can handle the given file extension
    fn can_read(&self, extension: &str) -> bool;

    /// Decode the file. `bytes` is the exact content that was digested;
    /// `path` is its location for readers that need a file handle.
    fn read(&self, bytes: &[u8], path: &Path) -> Result<Dataset>;
}

/// Reader registry that selects the appropriate reader by extension
pub struct ReaderRegistry {
    readers: Vec<Box<dyn DatasetReader>>,
}

impl ReaderRegistry {
    /// Create a registry with all built-in readers
    pub fn new() -> Self {
        let mut registry = Self { readers: Vec::new() };

        registry.register(Box::new(json::JsonDatasetReader));
        #[cfg(feature = "netcdf")]
        registry.register(Box::new(netcdf_reader::NetcdfReader));

        registry
    }

    pub fn register(&mut self, reader: Box<dyn DatasetReader>) {
        self.readers.push(reader);
    }

    pub fn find_reader(&self, extension: &str) -> Option<&dyn DatasetReader> {
        self.readers
            .iter()
            .find(|r| r.can_read(extension))
            .map(|r| r.as_ref())
    }

    /// Decode a file with the reader registered for its extension
    pub fn read(&self, bytes: &[u8], path: &Path) -> Result<Dataset> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let reader = self.find_reader(&extension).ok_or_else(|| {
            IngestError::MalformedInput(format!(
                "no reader for .{} files in this build (NetCDF needs the `netcdf` feature)",
                extension
            ))
        })?;

        reader.read(bytes, path)
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_selects_by_extension() {
        let registry = ReaderRegistry::new();
        assert!(registry.find_reader("json").is_some());
        assert!(registry.find_reader("txt").is_none());
        #[cfg(feature = "netcdf")]
        assert!(registry.find_reader("nc").is_some());
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_netcdf_without_feature_is_malformed_input() {
        let registry = ReaderRegistry::new();
        let err = registry.read(b"CDF\x01", Path::new("intake/R6901234_001.nc")).unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
        assert!(err.to_string().contains("netcdf"));
    }
}
