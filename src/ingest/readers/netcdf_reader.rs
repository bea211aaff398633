//! NetCDF reader backed by the `netcdf` crate (libnetcdf/HDF5).
//!
//! The library needs a file handle, so the file is opened from its intake
//! path rather than from the digested bytes.

use std::path::Path;

use super::DatasetReader;
use crate::error::{IngestError, Result};
use crate::ingest::dataset::{Dataset, Variable};

/// Variables the extractor looks at; everything else in the file is skipped.
const WANTED: &[&str] = &[
    "PRES", "TEMP", "PSAL", "PLATFORM_NUMBER", "LATITUDE", "LONGITUDE", "JULD",
    "CYCLE_NUMBER", "TEMP_QC",
];

pub struct NetcdfReader;

impl DatasetReader for NetcdfReader {
    fn can_read(&self, extension: &str) -> bool {
        extension == "nc"
    }

    fn read(&self, _bytes: &[u8], path: &Path) -> Result<Dataset> {
        let file = netcdf::open(path).map_err(|e| {
            IngestError::MalformedInput(format!("Failed to open NetCDF {}: {}", path.display(), e))
        })?;

        let mut dataset = Dataset::new();
        for name in WANTED {
            if let Some(var) = file.variable(name) {
                dataset.insert(*name, read_variable(name, &var)?);
            }
        }

        Ok(dataset)
    }
}

fn read_variable(name: &str, var: &netcdf::Variable) -> Result<Variable> {
    let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let units = string_attr(var, "units");

    let variable = match var.get_values::<f64, _>(..) {
        Ok(raw) => {
            let fill = f64_attr(var, "_FillValue");
            let values = raw
                .into_iter()
                .map(|v| {
                    let is_fill = fill.map(|f| (v - f).abs() <= f64::EPSILON * f.abs().max(1.0));
                    if v.is_nan() || is_fill.unwrap_or(false) {
                        None
                    } else {
                        Some(v)
                    }
                })
                .collect();
            Variable::numeric(dims, values)
        }
        Err(_) => {
            // Char arrays: the innermost dimension is the string length.
            let raw = var.get_raw_values(..).map_err(|e| {
                IngestError::MalformedInput(format!("Failed to read {}: {}", name, e))
            })?;
            let width = dims.last().copied().unwrap_or(1).max(1);
            let values = raw
                .chunks(width)
                .map(|chunk| {
                    String::from_utf8_lossy(chunk)
                        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                        .to_string()
                })
                .collect();
            let shape = dims[..dims.len().saturating_sub(1)].to_vec();
            Variable::text(shape, values)
        }
    };

    Ok(Variable { units, ..variable })
}

fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}

fn string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
