//! Turns a decoded [`Dataset`] into flat measurement rows plus the per-profile
//! working sets the summary aggregator needs.
//!
//! PRES, TEMP and PSAL are either rank 1 (one profile) or rank 2
//! (profile × level). Rank-1 input is normalized to `[1, N]` before any
//! per-level iteration. A level is kept only when its depth is present and at
//! least one of temperature or salinity is present.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::dataset::{Dataset, Values, Variable};
use super::time::{decode_times, TimeStrategy};
use crate::error::{IngestError, Result};

/// Default near-surface threshold, inclusive
pub const SURFACE_DEPTH: f64 = 10.0;

/// One retained vertical level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRow {
    pub float_id: String,
    pub profile_index: usize,
    pub cycle: Option<i64>,
    pub time: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub depth: f64,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
    pub qc: Option<String>,
    pub source_file: String,
    pub metadata: serde_json::Value,
}

/// Per-profile values carried from extraction to aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileLevels {
    pub profile_index: usize,
    pub float_id: String,
    pub cycle: Option<i64>,
    pub time: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Every level's depth, including levels dropped for missing temperature
    /// and salinity. Bounds are computed over this.
    pub depths: Vec<Option<f64>>,
    pub retained_levels: usize,
    /// Present values on retained levels
    pub temperatures: Vec<f64>,
    pub salinities: Vec<f64>,
    /// Present values on retained levels at or above the surface threshold
    pub surface_temperatures: Vec<f64>,
    pub surface_salinities: Vec<f64>,
}

/// Everything extracted from one file
#[derive(Debug, Clone)]
pub struct Extraction {
    pub rows: Vec<MeasurementRow>,
    /// Only profiles with at least one retained level
    pub profiles: Vec<ProfileLevels>,
    pub time_strategy: TimeStrategy,
}

/// Normalizes raw profile arrays into rows
#[derive(Debug, Clone)]
pub struct ProfileExtractor {
    surface_depth: f64,
}

impl Default for ProfileExtractor {
    fn default() -> Self {
        Self::new(SURFACE_DEPTH)
    }
}

impl ProfileExtractor {
    pub fn new(surface_depth: f64) -> Self {
        Self { surface_depth }
    }

    pub fn extract(&self, dataset: &Dataset, file_name: &str) -> Result<Extraction> {
        let pres = LevelGrid::from_dataset(dataset, "PRES")?;
        let temp = LevelGrid::from_dataset(dataset, "TEMP")?;
        let psal = LevelGrid::from_dataset(dataset, "PSAL")?;

        for other in [&temp, &psal] {
            if other.shape() != pres.shape() {
                return Err(IngestError::MalformedInput(format!(
                    "{} has shape {:?} but PRES has shape {:?}",
                    other.name,
                    other.shape(),
                    pres.shape()
                )));
            }
        }

        let n_prof = pres.n_prof;
        let float_ids = float_ids(dataset, n_prof)?;
        let latitudes = per_profile_numeric(dataset, "LATITUDE", n_prof)?;
        let longitudes = per_profile_numeric(dataset, "LONGITUDE", n_prof)?;

        let juld = dataset.required("JULD")?;
        check_profile_len("JULD", juld, n_prof)?;
        let decoded = decode_times(juld)?;

        let cycles = optional_cycles(dataset, n_prof);
        let qc_flags = optional_qc(dataset, n_prof, pres.n_levels);

        let mut rows = Vec::new();
        let mut profiles = Vec::new();

        for p in 0..n_prof {
            let mut levels = ProfileLevels {
                profile_index: p,
                float_id: float_ids[p].clone(),
                cycle: cycles.as_ref().and_then(|c| c[p]),
                time: decoded.times[p],
                latitude: latitudes[p],
                longitude: longitudes[p],
                depths: pres.profile(p).to_vec(),
                retained_levels: 0,
                temperatures: Vec::new(),
                salinities: Vec::new(),
                surface_temperatures: Vec::new(),
                surface_salinities: Vec::new(),
            };

            for i in 0..pres.n_levels {
                let Some(depth) = pres.at(p, i) else {
                    continue;
                };
                let temperature = temp.at(p, i);
                let salinity = psal.at(p, i);
                if temperature.is_none() && salinity.is_none() {
                    continue;
                }

                rows.push(MeasurementRow {
                    float_id: levels.float_id.clone(),
                    profile_index: p,
                    cycle: levels.cycle,
                    time: levels.time,
                    latitude: levels.latitude,
                    longitude: levels.longitude,
                    depth,
                    temperature,
                    salinity,
                    qc: qc_flags.as_ref().and_then(|q| q[p].get(i).cloned().flatten()),
                    source_file: file_name.to_string(),
                    metadata: serde_json::json!({}),
                });

                levels.retained_levels += 1;
                let near_surface = depth <= self.surface_depth;
                if let Some(t) = temperature {
                    levels.temperatures.push(t);
                    if near_surface {
                        levels.surface_temperatures.push(t);
                    }
                }
                if let Some(s) = salinity {
                    levels.salinities.push(s);
                    if near_surface {
                        levels.surface_salinities.push(s);
                    }
                }
            }

            if levels.retained_levels > 0 {
                profiles.push(levels);
            } else {
                log::debug!("{}: profile {} has no usable levels", file_name, p);
            }
        }

        Ok(Extraction { rows, profiles, time_strategy: decoded.strategy })
    }
}

/// A level variable viewed as `[n_prof, n_levels]`
struct LevelGrid<'a> {
    name: &'a str,
    n_prof: usize,
    n_levels: usize,
    values: &'a [Option<f64>],
}

impl<'a> LevelGrid<'a> {
    fn from_dataset(dataset: &'a Dataset, name: &'a str) -> Result<Self> {
        let var = dataset.required(name)?;
        let values = numeric_values(name, var)?;

        let (n_prof, n_levels) = match var.shape.as_slice() {
            [n_levels] => (1, *n_levels),
            [n_prof, n_levels] => (*n_prof, *n_levels),
            other => {
                return Err(IngestError::MalformedInput(format!(
                    "{} must be rank 1 or 2, got shape {:?}",
                    name, other
                )))
            }
        };

        if values.len() != n_prof * n_levels {
            return Err(IngestError::MalformedInput(format!(
                "{} holds {} values but its shape is {:?}",
                name,
                values.len(),
                var.shape
            )));
        }

        Ok(Self { name, n_prof, n_levels, values })
    }

    fn shape(&self) -> (usize, usize) {
        (self.n_prof, self.n_levels)
    }

    fn profile(&self, p: usize) -> &'a [Option<f64>] {
        &self.values[p * self.n_levels..(p + 1) * self.n_levels]
    }

    fn at(&self, p: usize, i: usize) -> Option<f64> {
        self.values[p * self.n_levels + i]
    }
}

fn numeric_values<'a>(name: &str, var: &'a Variable) -> Result<&'a [Option<f64>]> {
    match &var.values {
        Values::Numeric(v) => Ok(v),
        Values::Text(_) => Err(IngestError::MalformedInput(format!("{} must be numeric", name))),
    }
}

fn check_profile_len(name: &str, var: &Variable, n_prof: usize) -> Result<()> {
    if var.values.len() != n_prof {
        return Err(IngestError::MalformedInput(format!(
            "{} has {} values for {} profiles",
            name,
            var.values.len(),
            n_prof
        )));
    }
    Ok(())
}

fn per_profile_numeric<'a>(dataset: &'a Dataset, name: &str, n_prof: usize) -> Result<&'a [Option<f64>]> {
    let var = dataset.required(name)?;
    check_profile_len(name, var, n_prof)?;
    numeric_values(name, var)
}

fn float_ids(dataset: &Dataset, n_prof: usize) -> Result<Vec<String>> {
    let var = dataset.required("PLATFORM_NUMBER")?;
    check_profile_len("PLATFORM_NUMBER", var, n_prof)?;

    let ids: Vec<Option<String>> = match &var.values {
        Values::Text(v) => v
            .iter()
            .map(|s| Some(s.trim().to_string()).filter(|s| !s.is_empty()))
            .collect(),
        Values::Numeric(v) => v
            .iter()
            .map(|n| {
                n.map(|n| {
                    if n.fract() == 0.0 {
                        format!("{}", n as i64)
                    } else {
                        n.to_string()
                    }
                })
            })
            .collect(),
    };

    ids.into_iter()
        .enumerate()
        .map(|(p, id)| {
            id.ok_or_else(|| {
                IngestError::MalformedInput(format!("PLATFORM_NUMBER[{}] is missing", p))
            })
        })
        .collect()
}

fn optional_cycles(dataset: &Dataset, n_prof: usize) -> Option<Vec<Option<i64>>> {
    let var = dataset.get("CYCLE_NUMBER")?;
    match &var.values {
        Values::Numeric(v) if v.len() == n_prof => {
            Some(v.iter().map(|c| c.map(|c| c as i64)).collect())
        }
        _ => {
            log::warn!("Ignoring CYCLE_NUMBER with shape {:?}", var.shape);
            None
        }
    }
}

/// TEMP_QC: one string per profile, one flag character per level
fn optional_qc(dataset: &Dataset, n_prof: usize, n_levels: usize) -> Option<Vec<Vec<Option<String>>>> {
    let var = dataset.get("TEMP_QC")?;
    match &var.values {
        Values::Text(v) if v.len() == n_prof => Some(
            v.iter()
                .map(|flags| {
                    let mut per_level: Vec<Option<String>> = flags
                        .chars()
                        .map(|c| Some(c.to_string()).filter(|_| !c.is_whitespace()))
                        .collect();
                    per_level.resize(n_levels, None);
                    per_level
                })
                .collect(),
        ),
        _ => {
            log::warn!("Ignoring TEMP_QC with shape {:?}", var.shape);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| if v.is_nan() { None } else { Some(*v) }).collect()
    }

    /// One profile shaped either [N] or [1, N]
    fn single_profile(
        shape: Vec<usize>,
        pres: Vec<Option<f64>>,
        temp: Vec<Option<f64>>,
        psal: Vec<Option<f64>>,
    ) -> Dataset {
        Dataset::new()
            .with("PRES", Variable::numeric(shape.clone(), pres))
            .with("TEMP", Variable::numeric(shape.clone(), temp))
            .with("PSAL", Variable::numeric(shape, psal))
            .with("PLATFORM_NUMBER", Variable::text(vec![1], vec!["6901234".into()]))
            .with("LATITUDE", Variable::numeric(vec![1], vec![Some(-12.5)]))
            .with("LONGITUDE", Variable::numeric(vec![1], vec![Some(74.25)]))
            .with("JULD", Variable::numeric(vec![1], vec![Some(20000.0)]))
    }

    #[test]
    fn test_level_filtering() {
        let ds = single_profile(
            vec![4],
            num(&[5.0, 10.0, f64::NAN, 20.0]),
            vec![Some(12.0), None, Some(9.0), Some(8.0)],
            vec![None, None, None, Some(35.0)],
        );

        let out = ProfileExtractor::default().extract(&ds, "a.json").unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].depth, 5.0);
        assert_eq!(out.rows[0].temperature, Some(12.0));
        assert_eq!(out.rows[0].salinity, None);
        assert_eq!(out.rows[1].depth, 20.0);
        assert_eq!(out.rows[1].salinity, Some(35.0));

        let profile = &out.profiles[0];
        assert_eq!(profile.retained_levels, 2);
        assert_eq!(profile.depths.len(), 4);
        assert_eq!(profile.temperatures, vec![12.0, 8.0]);
        assert_eq!(profile.salinities, vec![35.0]);
        assert_eq!(profile.surface_temperatures, vec![12.0]);
        assert!(profile.surface_salinities.is_empty());
    }

    #[test]
    fn test_rank_one_matches_rank_two() {
        let pres = num(&[1.0, 5.0, 50.0]);
        let temp = num(&[20.0, 19.5, 10.0]);
        let psal = num(&[35.1, 35.2, f64::NAN]);

        let rank1 = single_profile(vec![3], pres.clone(), temp.clone(), psal.clone());
        let rank2 = single_profile(vec![1, 3], pres, temp, psal);

        let extractor = ProfileExtractor::default();
        let a = extractor.extract(&rank1, "f.json").unwrap();
        let b = extractor.extract(&rank2, "f.json").unwrap();
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.profiles, b.profiles);
        assert_eq!(a.rows.len(), 3);
    }

    #[test]
    fn test_multi_profile_rows_and_empty_profile_excluded() {
        let ds = Dataset::new()
            .with("PRES", Variable::numeric(vec![2, 2], num(&[5.0, 15.0, 5.0, 15.0])))
            .with("TEMP", Variable::numeric(vec![2, 2], num(&[10.0, 9.0, f64::NAN, f64::NAN])))
            .with("PSAL", Variable::numeric(vec![2, 2], num(&[35.0, 35.5, f64::NAN, f64::NAN])))
            .with("PLATFORM_NUMBER", Variable::numeric(vec![2], vec![Some(6901234.0), Some(6901235.0)]))
            .with("LATITUDE", Variable::numeric(vec![2], vec![Some(1.0), None]))
            .with("LONGITUDE", Variable::numeric(vec![2], vec![Some(2.0), None]))
            .with("JULD", Variable::text(vec![2], vec!["2005-03-17T04:22:36Z".into(), "2005-03-27T04:22:36Z".into()]))
            .with("CYCLE_NUMBER", Variable::numeric(vec![2], vec![Some(7.0), Some(8.0)]))
            .with("TEMP_QC", Variable::text(vec![2], vec!["14".into(), "  ".into()]));

        let out = ProfileExtractor::default().extract(&ds, "multi.json").unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.profiles.len(), 1);
        assert_eq!(out.time_strategy, TimeStrategy::CalendarText);

        let row = &out.rows[1];
        assert_eq!(row.float_id, "6901234");
        assert_eq!(row.profile_index, 0);
        assert_eq!(row.cycle, Some(7));
        assert_eq!(row.qc.as_deref(), Some("4"));
        assert_eq!(row.source_file, "multi.json");
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut ds = single_profile(vec![2], num(&[1.0, 2.0]), num(&[1.0, 2.0]), num(&[1.0, 2.0]));
        ds.insert("TEMP", Variable::numeric(vec![3], num(&[1.0, 2.0, 3.0])));
        let err = ProfileExtractor::default().extract(&ds, "bad.json").unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
        assert!(err.to_string().contains("TEMP"));
    }

    #[test]
    fn test_rank_three_rejected() {
        let values = vec![Some(1.0); 8];
        let ds = single_profile(vec![2, 2, 2], values.clone(), values.clone(), values);
        let err = ProfileExtractor::default().extract(&ds, "bad.json").unwrap_err();
        assert!(err.to_string().contains("rank"));
    }

    #[test]
    fn test_missing_required_variable_rejected() {
        let ds = Dataset::new().with("PRES", Variable::numeric(vec![1], vec![Some(1.0)]));
        let err = ProfileExtractor::default().extract(&ds, "bad.json").unwrap_err();
        assert!(err.to_string().contains("TEMP"));
    }

    #[test]
    fn test_unparseable_time_rejects_file() {
        let mut ds = single_profile(vec![1], num(&[1.0]), num(&[1.0]), num(&[1.0]));
        ds.insert("JULD", Variable::text(vec![1], vec!["yesterday".into()]));
        let err = ProfileExtractor::default().extract(&ds, "bad.json").unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
    }
}
