//! Target encoding for categorical features
//!
//! Each category is replaced by a blend of its mean price and the global
//! mean, weighted by how many rows back it. The blend weight follows a
//! logistic curve in the category count, so rare categories lean on the
//! prior.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::InferenceError;
use crate::schema::PropertyRecord;

/// Smoothing knobs for [`TargetEncoder`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderParams {
    /// Category count at which own mean and prior weigh equally
    pub min_samples_leaf: usize,
    /// Steepness of the transition; larger is smoother
    pub smoothing: f64,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            min_samples_leaf: 20,
            smoothing: 10.0,
        }
    }
}

/// Learned category → encoded value tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEncoder {
    params: EncoderParams,
    prior: f64,
    mappings: BTreeMap<String, BTreeMap<String, f64>>,
}

impl TargetEncoder {
    /// Learn encodings for every categorical feature
    pub fn fit(records: &[PropertyRecord], prices: &[f64], params: EncoderParams) -> Self {
        let prior = if prices.is_empty() {
            0.0
        } else {
            prices.iter().sum::<f64>() / prices.len() as f64
        };

        let mut mappings = BTreeMap::new();
        for field in PropertyRecord::CATEGORICAL {
            let mut stats: BTreeMap<String, (usize, f64)> = BTreeMap::new();
            for (record, &price) in records.iter().zip(prices) {
                if let Some(value) = record.categorical(field) {
                    let entry = stats.entry(value.to_string()).or_insert((0, 0.0));
                    entry.0 += 1;
                    entry.1 += price;
                }
            }

            let encoded = stats
                .into_iter()
                .map(|(category, (count, sum))| {
                    let value = blend(prior, sum / count as f64, count, &params);
                    (category, value)
                })
                .collect();
            mappings.insert(field.to_string(), encoded);
        }

        Self {
            params,
            prior,
            mappings,
        }
    }

    /// Encoded value for a category seen during fit
    pub fn encode(&self, field: &str, value: &str) -> Result<f64, InferenceError> {
        self.mappings
            .get(field)
            .and_then(|mapping| mapping.get(value))
            .copied()
            .ok_or_else(|| InferenceError::UnseenCategory {
                field: field.to_string(),
                value: value.to_string(),
            })
    }

    /// Categories learned for `field`
    pub fn vocabulary(&self, field: &str) -> Vec<&str> {
        self.mappings
            .get(field)
            .map(|mapping| mapping.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn params(&self) -> EncoderParams {
        self.params
    }

    pub fn prior(&self) -> f64 {
        self.prior
    }
}

fn blend(prior: f64, mean: f64, count: usize, params: &EncoderParams) -> f64 {
    // A single observation carries no usable signal
    if count <= 1 {
        return prior;
    }
    let offset = count as f64 - params.min_samples_leaf as f64;
    let weight = 1.0 / (1.0 + (-offset / params.smoothing.max(f64::EPSILON)).exp());
    prior * (1.0 - weight) + mean * weight
}
