//! Product feature definitions and per-customer overrides.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// How a feature's value is interpreted by the licensed product.
///
/// Stored as the integer column codes 0, 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[serde(rename_all = "lowercase")]
#[repr(i64)]
pub enum FeatureType {
    Integer = 0,
    String = 1,
    /// One of a fixed list of allowed values.
    Values = 2,
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeatureType::Integer => "integer",
            FeatureType::String => "string",
            FeatureType::Values => "values",
        };
        write!(f, "{s}")
    }
}

/// A feature a product exposes, with its default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
pub struct FeatureDefinition {
    pub feature_id: i64,
    pub product_id: i64,
    pub feature_name: String,
    pub feature_type: FeatureType,
    pub allowed_values: String,
    pub default_value: String,
}

/// A sparse per-customer value replacing a feature's default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
pub struct FeatureOverride {
    pub customer_id: i64,
    pub product_id: i64,
    pub feature_id: i64,
    pub feature_value: String,
}

/// Effective feature values keyed by feature name, iterated in name order.
pub type MergedFeatures = BTreeMap<String, String>;

/// Overlay customer overrides onto product defaults.
///
/// Produces exactly one entry per definition. Overrides whose `feature_id`
/// matches no definition (e.g. the feature was deleted) are dropped.
pub fn merge_with_overrides(
    definitions: &[FeatureDefinition],
    overrides: &[FeatureOverride],
) -> MergedFeatures {
    let by_id: HashMap<i64, &str> = overrides
        .iter()
        .map(|o| (o.feature_id, o.feature_value.as_str()))
        .collect();

    definitions
        .iter()
        .map(|def| {
            let value = by_id
                .get(&def.feature_id)
                .map(|v| v.to_string())
                .unwrap_or_else(|| def.default_value.clone());
            (def.feature_name.clone(), value)
        })
        .collect()
}
