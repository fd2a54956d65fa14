//! Row-wise validation of training data
//!
//! Every row of the loaded frame is checked against the property schema:
//! required fields present, numbers finite and in range, counts whole,
//! categories non-empty (and optionally from an allowed vocabulary), and a
//! positive price. Invalid rows are dropped and counted; too many of them
//! aborts the run.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::error::ValidationError;
use crate::schema::{FieldRanges, PropertyRecord, TrainingTable, TARGET};

/// Declared constraints for the validation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Highest tolerated `rejected / total` ratio
    pub max_rejection_rate: f64,
    /// Numeric ranges per feature
    pub ranges: FieldRanges,
    /// Accepted building types; `None` accepts any non-empty value
    pub allowed_types: Option<BTreeSet<String>>,
    /// Accepted sectors; `None` accepts any non-empty value
    pub allowed_sectors: Option<BTreeSet<String>>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            max_rejection_rate: 0.1,
            ranges: FieldRanges::default(),
            allowed_types: None,
            allowed_sectors: None,
        }
    }
}

impl ValidationRules {
    pub fn with_max_rejection_rate(mut self, rate: f64) -> Self {
        self.max_rejection_rate = rate;
        self
    }

    fn vocabulary(&self, field: &str) -> Option<&BTreeSet<String>> {
        match field {
            "type" => self.allowed_types.as_ref(),
            "sector" => self.allowed_sectors.as_ref(),
            _ => None,
        }
    }
}

/// Outcome counts of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
    /// Rejected rows keyed by the first offending column
    pub rejections: BTreeMap<String, usize>,
}

impl ValidationReport {
    pub fn rejection_rate(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        self.rejected_rows as f64 / self.total_rows as f64
    }
}

/// Rows that passed validation, plus the report
#[derive(Debug, Clone)]
pub struct ValidatedTable {
    pub table: TrainingTable,
    pub report: ValidationReport,
}

/// Applies [`ValidationRules`] to a loaded frame
pub struct Validator {
    rules: ValidationRules,
}

/// Columns extracted once per frame
struct Columns {
    categorical: Vec<(&'static str, Vec<Option<String>>)>,
    numeric: Vec<(&'static str, Vec<Option<f64>>)>,
    target: Vec<Option<f64>>,
}

impl Validator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Keep valid rows, or fail when too many are rejected
    pub fn validate(&self, frame: &DataFrame) -> Result<ValidatedTable, ValidationError> {
        let columns = extract_columns(frame)?;
        let total_rows = frame.height();

        let mut report = ValidationReport {
            total_rows,
            ..Default::default()
        };
        let mut records = Vec::with_capacity(total_rows);
        let mut prices = Vec::with_capacity(total_rows);

        for row in 0..total_rows {
            match self.check_row(&columns, row) {
                Ok((record, price)) => {
                    records.push(record);
                    prices.push(price);
                }
                Err(column) => {
                    *report.rejections.entry(column.to_string()).or_insert(0) += 1;
                    report.rejected_rows += 1;
                }
            }
        }
        report.accepted_rows = records.len();

        let rate = report.rejection_rate();
        if rate > self.rules.max_rejection_rate {
            warn!(
                rejected = report.rejected_rows,
                total = report.total_rows,
                reasons = ?report.rejections,
                "Validation rejection rate above threshold"
            );
            return Err(ValidationError::RejectionRateExceeded {
                rejected: report.rejected_rows,
                total: report.total_rows,
                rate,
                threshold: self.rules.max_rejection_rate,
            });
        }

        if records.is_empty() {
            return Err(ValidationError::NoValidRows);
        }

        info!(
            accepted = report.accepted_rows,
            rejected = report.rejected_rows,
            reasons = ?report.rejections,
            "Validated training data"
        );

        let table = TrainingTable::new(records, prices)
            .ok_or_else(|| ValidationError::Frame("feature and target lengths differ".to_string()))?;
        Ok(ValidatedTable { table, report })
    }

    /// Build the row or name the first column that disqualifies it
    fn check_row(&self, columns: &Columns, row: usize) -> Result<(PropertyRecord, f64), &'static str> {
        let mut categorical = BTreeMap::new();
        for (field, values) in &columns.categorical {
            let value = values[row].as_deref().map(str::trim).unwrap_or_default();
            if value.is_empty() {
                return Err(*field);
            }
            if let Some(vocabulary) = self.rules.vocabulary(field) {
                if !vocabulary.contains(value) {
                    return Err(*field);
                }
            }
            categorical.insert(*field, value.to_string());
        }

        let mut numeric = BTreeMap::new();
        for (field, values) in &columns.numeric {
            let value = values[row].ok_or(*field)?;
            if self.rules.ranges.violation(field, value).is_some() {
                return Err(*field);
            }
            numeric.insert(*field, value);
        }

        let price = columns.target[row].ok_or(TARGET)?;
        if !price.is_finite() || price <= 0.0 {
            return Err(TARGET);
        }

        let record = PropertyRecord {
            property_type: categorical.remove("type").unwrap_or_default(),
            sector: categorical.remove("sector").unwrap_or_default(),
            net_usable_area: numeric["net_usable_area"],
            net_area: numeric["net_area"],
            n_rooms: numeric["n_rooms"] as u32,
            n_bathroom: numeric["n_bathroom"] as u32,
            year_built: numeric["year_built"] as u32,
        };
        Ok((record, price))
    }
}

fn extract_columns(frame: &DataFrame) -> Result<Columns, ValidationError> {
    let present: BTreeSet<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let missing: Vec<String> = PropertyRecord::FEATURES
        .iter()
        .chain(std::iter::once(&TARGET))
        .filter(|name| !present.contains(**name))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing));
    }

    let categorical = PropertyRecord::CATEGORICAL
        .iter()
        .map(|&name| Ok((name, string_column(frame, name)?)))
        .collect::<Result<Vec<_>, ValidationError>>()?;
    let numeric = PropertyRecord::NUMERIC
        .iter()
        .map(|&name| Ok((name, float_column(frame, name)?)))
        .collect::<Result<Vec<_>, ValidationError>>()?;
    let target = float_column(frame, TARGET)?;

    Ok(Columns {
        categorical,
        numeric,
        target,
    })
}

fn frame_error(e: PolarsError) -> ValidationError {
    ValidationError::Frame(e.to_string())
}

/// Values that cannot be read as numbers come back as `None`
fn float_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, ValidationError> {
    let series = frame
        .column(name)
        .and_then(|s| s.cast(&DataType::Float64))
        .map_err(frame_error)?;
    let values = series.f64().map_err(frame_error)?;
    Ok(values.into_iter().collect())
}

fn string_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<String>>, ValidationError> {
    let series = frame
        .column(name)
        .and_then(|s| s.cast(&DataType::String))
        .map_err(frame_error)?;
    let values = series.str().map_err(frame_error)?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}
