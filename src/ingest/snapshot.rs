//! Per-file CSV snapshot of measurement rows for downstream analytics.
//! Written after the file is committed; failures are reported, never fatal.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::extractor::MeasurementRow;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct SnapshotRecord<'a> {
    float_id: &'a str,
    profile_index: usize,
    cycle: Option<i64>,
    time: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    depth: f64,
    temperature: Option<f64>,
    salinity: Option<f64>,
    qc: Option<&'a str>,
    source_file: &'a str,
}

/// `<snapshot_dir>/<file name>.csv`. The full name is kept so files that
/// share a stem (`R1.json`, `R1.nc`) never share a snapshot.
pub fn snapshot_path(snapshot_dir: &Path, file_name: &str) -> PathBuf {
    snapshot_dir.join(format!("{}.csv", file_name))
}

/// Write the rows of one source file, replacing any earlier snapshot of it.
/// The file is written under a temporary name and renamed into place.
pub fn write_snapshot(snapshot_dir: &Path, file_name: &str, rows: &[MeasurementRow]) -> Result<PathBuf> {
    std::fs::create_dir_all(snapshot_dir)?;

    let path = snapshot_path(snapshot_dir, file_name);
    let partial = snapshot_dir.join(format!("{}.csv.partial", file_name));

    let mut writer = csv::Writer::from_path(&partial)?;
    for row in rows {
        writer.serialize(SnapshotRecord {
            float_id: &row.float_id,
            profile_index: row.profile_index,
            cycle: row.cycle,
            time: row.time.to_rfc3339(),
            latitude: row.latitude,
            longitude: row.longitude,
            depth: row.depth,
            temperature: row.temperature,
            salinity: row.salinity,
            qc: row.qc.as_deref(),
            source_file: &row.source_file,
        })?;
    }
    writer.flush()?;
    drop(writer);

    std::fs::rename(&partial, &path)?;
    Ok(path)
}
