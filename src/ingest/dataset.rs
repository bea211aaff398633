//! In-memory view of one input file: named variables with a shape and a flat,
//! row-major value buffer. Readers build it; the extractor consumes it.

use std::collections::BTreeMap;

use crate::error::{IngestError, Result};

/// Flat values of one variable. Missing numeric values are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Numeric(Vec<Option<f64>>),
    Text(Vec<String>),
}

impl Values {
    pub(crate) fn len(&self) -> usize {
        match self {
            Values::Numeric(v) => v.len(),
            Values::Text(v) => v.len(),
        }
    }
}

/// One named variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Dimension lengths, outermost first. Empty for a scalar.
    pub shape: Vec<usize>,
    pub values: Values,
    /// CF `units` attribute, if the file carried one
    pub units: Option<String>,
}

impl Variable {
    pub fn numeric(shape: Vec<usize>, values: Vec<Option<f64>>) -> Self {
        Self { shape, values: Values::Numeric(values), units: None }
    }

    pub fn text(shape: Vec<usize>, values: Vec<String>) -> Self {
        Self { shape, values: Values::Text(values), units: None }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

/// All variables of one file, by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    variables: BTreeMap<String, Variable>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, variable: Variable) {
        self.variables.insert(name.into(), variable);
    }

    /// Builder-style insert, mostly for tests and readers
    pub fn with(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.insert(name, variable);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// A variable the file must carry
    pub fn required(&self, name: &str) -> Result<&Variable> {
        self.get(name).ok_or_else(|| {
            IngestError::MalformedInput(format!("required variable {} is missing", name))
        })
    }
}
