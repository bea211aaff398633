//! JSON input: a CF-JSON style document with one entry per variable.

use std::path::Path;

use serde_json::Value as JsonValue;

use super::DatasetReader;
use crate::error::{IngestError, Result};
use crate::ingest::dataset::{Dataset, Variable};

/// CF-JSON style reader.
///
/// ```text
/// {
///   "attributes": { ... },
///   "variables": {
///     "PRES": { "data": [[5.0, 10.0, null]], "attributes": { "_FillValue": 99999.0 } },
///     "JULD": { "data": [20000.5], "attributes": { "units": "days since 1950-01-01 00:00:00 UTC" } },
///     "PLATFORM_NUMBER": { "data": ["6901234"] }
///   }
/// }
/// ```
///
/// The rank of a variable is the nesting depth of `data`; nested arrays must be
/// rectangular. `null` and values equal to `_FillValue` are missing.
pub struct JsonDatasetReader;

impl DatasetReader for JsonDatasetReader {
    fn can_read(&self, extension: &str) -> bool {
        extension == "json"
    }

    fn read(&self, bytes: &[u8], path: &Path) -> Result<Dataset> {
        let root: JsonValue = serde_json::from_slice(bytes).map_err(|e| {
            IngestError::MalformedInput(format!("JSON parse error in {}: {}", path.display(), e))
        })?;

        let variables = root
            .get("variables")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| {
                IngestError::MalformedInput(format!("{} has no \"variables\" object", path.display()))
            })?;

        let mut dataset = Dataset::new();
        for (name, body) in variables {
            let variable = decode_variable(name, body)?;
            dataset.insert(name.clone(), variable);
        }

        Ok(dataset)
    }
}

fn decode_variable(name: &str, body: &JsonValue) -> Result<Variable> {
    let data = body
        .get("data")
        .ok_or_else(|| IngestError::MalformedInput(format!("variable {} has no data", name)))?;
    let attributes = body.get("attributes");

    let shape = infer_shape(data);
    let mut leaves = Vec::new();
    collect_leaves(name, data, &shape, 0, &mut leaves)?;

    let units = attributes
        .and_then(|a| a.get("units"))
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let is_text = leaves.iter().any(|v| v.is_string());
    let mut variable = if is_text {
        let values = leaves
            .iter()
            .map(|v| match v {
                JsonValue::String(s) => Ok(s.trim().to_string()),
                JsonValue::Null => Ok(String::new()),
                other => Err(IngestError::MalformedInput(format!(
                    "variable {} mixes text and {}",
                    name, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Variable::text(shape, values)
    } else {
        let fill = attributes
            .and_then(|a| a.get("_FillValue"))
            .and_then(JsonValue::as_f64);
        let values = leaves
            .iter()
            .map(|v| match v {
                JsonValue::Null => Ok(None),
                JsonValue::Number(n) => Ok(n.as_f64().filter(|x| !is_fill(*x, fill))),
                other => Err(IngestError::MalformedInput(format!(
                    "variable {} has non-numeric value {}",
                    name, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Variable::numeric(shape, values)
    };

    variable.units = units;
    Ok(variable)
}

fn is_fill(value: f64, fill: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match fill {
        Some(fill) => (value - fill).abs() <= f64::EPSILON * fill.abs().max(1.0),
        None => false,
    }
}

/// Shape from the first element at each nesting level
fn infer_shape(data: &JsonValue) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut current = data;
    while let JsonValue::Array(items) = current {
        shape.push(items.len());
        match items.first() {
            Some(first) => current = first,
            None => break,
        }
    }
    shape
}

fn collect_leaves<'a>(
    name: &str,
    value: &'a JsonValue,
    shape: &[usize],
    depth: usize,
    out: &mut Vec<&'a JsonValue>,
) -> Result<()> {
    if depth == shape.len() {
        if value.is_array() {
            return Err(ragged(name));
        }
        out.push(value);
        return Ok(());
    }

    match value {
        JsonValue::Array(items) if items.len() == shape[depth] => {
            for item in items {
                collect_leaves(name, item, shape, depth + 1, out)?;
            }
            Ok(())
        }
        _ => Err(ragged(name)),
    }
}

fn ragged(name: &str) -> IngestError {
    IngestError::MalformedInput(format!("variable {} is not a rectangular array", name))
}
