//! Property schema shared by training and serving

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Name of the regression target column
pub const TARGET: &str = "price";

/// One row of input features
///
/// Deserialization is strict: every field is required, unknown fields are
/// rejected and numbers are never parsed from strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyRecord {
    /// Building type (categorical)
    #[serde(rename = "type")]
    pub property_type: String,
    /// City sector or neighbourhood (categorical)
    pub sector: String,
    /// Net usable area in square metres
    pub net_usable_area: f64,
    /// Net built area in square metres
    pub net_area: f64,
    /// Number of bedrooms
    pub n_rooms: u32,
    /// Number of bathrooms
    pub n_bathroom: u32,
    /// Year of construction
    pub year_built: u32,
}

impl PropertyRecord {
    /// Feature names in model column order
    pub const FEATURES: [&'static str; 7] = [
        "type",
        "sector",
        "net_usable_area",
        "net_area",
        "n_rooms",
        "n_bathroom",
        "year_built",
    ];

    /// Features encoded from a learned vocabulary
    pub const CATEGORICAL: [&'static str; 2] = ["type", "sector"];

    /// Features read as numbers
    pub const NUMERIC: [&'static str; 5] = [
        "net_usable_area",
        "net_area",
        "n_rooms",
        "n_bathroom",
        "year_built",
    ];

    /// Features that must hold whole counts
    pub const INTEGRAL: [&'static str; 3] = ["n_rooms", "n_bathroom", "year_built"];

    pub fn feature_names() -> Vec<String> {
        Self::FEATURES.iter().map(|f| f.to_string()).collect()
    }

    /// Value of a categorical feature by name
    pub fn categorical(&self, field: &str) -> Option<&str> {
        match field {
            "type" => Some(&self.property_type),
            "sector" => Some(&self.sector),
            _ => None,
        }
    }

    /// Value of a numeric feature by name
    pub fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            "net_usable_area" => Some(self.net_usable_area),
            "net_area" => Some(self.net_area),
            "n_rooms" => Some(f64::from(self.n_rooms)),
            "n_bathroom" => Some(f64::from(self.n_bathroom)),
            "year_built" => Some(f64::from(self.year_built)),
            _ => None,
        }
    }

    /// Check structural invariants and declared ranges
    pub fn check(&self, ranges: &FieldRanges) -> Result<(), InferenceError> {
        for field in Self::CATEGORICAL {
            if self.categorical(field).map_or(true, |v| v.trim().is_empty()) {
                return Err(InferenceError::InvalidRecord(format!(
                    "field '{}' must not be empty",
                    field
                )));
            }
        }

        for field in Self::NUMERIC {
            let value = self.numeric(field).unwrap_or(f64::NAN);
            if let Some(reason) = ranges.violation(field, value) {
                return Err(InferenceError::InvalidRecord(format!(
                    "field '{}' {}",
                    field, reason
                )));
            }
        }

        Ok(())
    }
}

/// Inclusive bounds for a numeric feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Declared numeric ranges per feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRanges {
    pub area: Range,
    pub rooms: Range,
    pub bathrooms: Range,
    pub year_built: Range,
}

impl Default for FieldRanges {
    fn default() -> Self {
        Self {
            area: Range::new(0.0, 100_000.0),
            rooms: Range::new(0.0, 100.0),
            bathrooms: Range::new(0.0, 50.0),
            year_built: Range::new(1800.0, 2100.0),
        }
    }
}

impl FieldRanges {
    pub fn for_field(&self, field: &str) -> Option<Range> {
        match field {
            "net_usable_area" | "net_area" => Some(self.area),
            "n_rooms" => Some(self.rooms),
            "n_bathroom" => Some(self.bathrooms),
            "year_built" => Some(self.year_built),
            _ => None,
        }
    }

    /// Reason a numeric value is not acceptable, if any
    pub fn violation(&self, field: &str, value: f64) -> Option<String> {
        if !value.is_finite() {
            return Some("must be finite".to_string());
        }
        if value < 0.0 {
            return Some("must be non-negative".to_string());
        }
        if PropertyRecord::INTEGRAL.contains(&field) && value.fract() != 0.0 {
            return Some("must be a whole number".to_string());
        }
        match self.for_field(field) {
            Some(range) if !range.contains(value) => Some(format!(
                "must be within [{}, {}], got {}",
                range.min, range.max, value
            )),
            _ => None,
        }
    }
}

/// Single-value prediction payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceOutput {
    /// Estimated market value
    pub price: f64,
}

impl PriceOutput {
    pub fn from_prediction(price: f64) -> Self {
        Self { price }
    }
}

/// Validated feature rows with their prices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingTable {
    records: Vec<PropertyRecord>,
    prices: Vec<f64>,
}

impl TrainingTable {
    /// Pair records with prices; lengths must match
    pub fn new(records: Vec<PropertyRecord>, prices: Vec<f64>) -> Option<Self> {
        (records.len() == prices.len()).then_some(Self { records, prices })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn mean_price(&self) -> Option<f64> {
        if self.prices.is_empty() {
            return None;
        }
        Some(self.prices.iter().sum::<f64>() / self.prices.len() as f64)
    }

    /// Rows at the given positions, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
            prices: indices.iter().map(|&i| self.prices[i]).collect(),
        }
    }

    /// Row positions shuffled with a fixed seed
    pub fn shuffled_indices(&self, seed: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        indices
    }

    /// Seeded shuffle split into `(train, holdout)`
    ///
    /// The holdout gets `ceil(len * test_size)` rows, but at least one row
    /// always stays in the training part.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> (Self, Self) {
        let indices = self.shuffled_indices(seed);
        let n_test = ((self.len() as f64) * test_size).ceil() as usize;
        let n_test = n_test.min(self.len().saturating_sub(1));
        let (test, train) = indices.split_at(n_test);
        (self.select(train), self.select(test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> PropertyRecord {
        PropertyRecord {
            property_type: "house".to_string(),
            sector: "north".to_string(),
            net_usable_area: 120.0,
            net_area: 140.0,
            n_rooms: 3,
            n_bathroom: 2,
            year_built: 1995,
        }
    }

    #[test]
    fn test_deserialize_uses_type_key() {
        let json = r#"{"type":"house","sector":"north","net_usable_area":120.0,
            "net_area":140.0,"n_rooms":3,"n_bathroom":2,"year_built":1995}"#;
        let record: PropertyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record, sample_record());
    }

    #[test]
    fn test_deserialize_rejects_missing_field() {
        let json = r#"{"type":"house","sector":"north","net_usable_area":120.0,
            "net_area":140.0,"n_rooms":3,"n_bathroom":2}"#;
        assert!(serde_json::from_str::<PropertyRecord>(json).is_err());
    }

    #[test]
    fn test_deserialize_does_not_coerce_strings() {
        let json = r#"{"type":"house","sector":"north","net_usable_area":"120",
            "net_area":140.0,"n_rooms":3,"n_bathroom":2,"year_built":1995}"#;
        assert!(serde_json::from_str::<PropertyRecord>(json).is_err());
    }

    #[test]
    fn test_deserialize_rejects_unknown_field() {
        let json = r#"{"type":"house","sector":"north","net_usable_area":120.0,
            "net_area":140.0,"n_rooms":3,"n_bathroom":2,"year_built":1995,"pool":true}"#;
        assert!(serde_json::from_str::<PropertyRecord>(json).is_err());
    }

    #[test]
    fn test_check_ranges() {
        let ranges = FieldRanges::default();
        assert!(sample_record().check(&ranges).is_ok());

        let mut negative = sample_record();
        negative.net_area = -1.0;
        assert!(negative.check(&ranges).is_err());

        let mut blank = sample_record();
        blank.sector = "  ".to_string();
        assert!(blank.check(&ranges).is_err());

        let mut ancient = sample_record();
        ancient.year_built = 1200;
        assert!(ancient.check(&ranges).is_err());
    }

    #[test]
    fn test_train_test_split_is_seeded_and_disjoint() {
        let records: Vec<PropertyRecord> = (0..10)
            .map(|i| {
                let mut r = sample_record();
                r.n_rooms = i;
                r
            })
            .collect();
        let prices: Vec<f64> = (0..10).map(|i| 1000.0 * f64::from(i)).collect();
        let table = TrainingTable::new(records, prices).unwrap();

        let (train, test) = table.train_test_split(0.2, 7);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        for r in test.records() {
            assert!(!train.records().contains(r));
        }

        let (train_again, _) = table.train_test_split(0.2, 7);
        assert_eq!(train, train_again);
    }

    #[test]
    fn test_table_rejects_length_mismatch() {
        assert!(TrainingTable::new(vec![sample_record()], vec![]).is_none());
    }

    #[test]
    fn test_violation_flags_fractional_counts() {
        let ranges = FieldRanges::default();
        assert!(ranges.violation("n_rooms", 2.5).is_some());
        assert!(ranges.violation("net_area", 2.5).is_none());
        assert!(ranges.violation("net_area", f64::INFINITY).is_some());
    }
}
