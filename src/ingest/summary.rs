//! Per-profile aggregates: depth bounds over every level, means over retained
//! levels, and near-surface means at or above the configured threshold.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::extractor::{Extraction, ProfileLevels};

/// Channels every summary reports
pub const SUMMARY_VARIABLES: &[&str] = &["temperature", "salinity"];

/// Per-profile aggregate, unique by `profile_key`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub profile_key: String,
    pub float_id: String,
    pub time: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub n_levels: usize,
    pub min_depth: f64,
    pub max_depth: f64,
    pub mean_temperature: Option<f64>,
    pub mean_salinity: Option<f64>,
    pub surface_temperature: Option<f64>,
    pub surface_salinity: Option<f64>,
    pub variables: Vec<String>,
    pub metadata: serde_json::Value,
}

/// `"<filename>:<profile_index>"`
pub fn profile_key(file_name: &str, profile_index: usize) -> String {
    format!("{}:{}", file_name, profile_index)
}

/// Summaries for every profile that kept at least one level
pub fn summarize_all(file_name: &str, extraction: &Extraction) -> Vec<ProfileSummary> {
    extraction
        .profiles
        .iter()
        .filter_map(|levels| summarize(file_name, levels))
        .map(|mut s| {
            s.metadata["time_encoding"] = serde_json::json!(extraction.time_strategy.as_str());
            s
        })
        .collect()
}

/// Aggregate one profile. `None` when the profile kept no levels.
pub fn summarize(file_name: &str, levels: &ProfileLevels) -> Option<ProfileSummary> {
    if levels.retained_levels == 0 {
        return None;
    }

    // Bounds span the instrument range, not just the retained levels.
    let (min_depth, max_depth) = levels
        .depths
        .iter()
        .flatten()
        .fold(None, |acc: Option<(f64, f64)>, &d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })?;

    Some(ProfileSummary {
        profile_key: profile_key(file_name, levels.profile_index),
        float_id: levels.float_id.clone(),
        time: levels.time,
        latitude: levels.latitude,
        longitude: levels.longitude,
        n_levels: levels.retained_levels,
        min_depth,
        max_depth,
        mean_temperature: mean(&levels.temperatures),
        mean_salinity: mean(&levels.salinities),
        surface_temperature: mean(&levels.surface_temperatures),
        surface_salinity: mean(&levels.surface_salinities),
        variables: SUMMARY_VARIABLES.iter().map(|v| v.to_string()).collect(),
        metadata: serde_json::json!({ "levels_total": levels.depths.len() }),
    })
}

/// Arithmetic mean; zero is a value like any other
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
