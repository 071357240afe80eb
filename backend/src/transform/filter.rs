//! Filter predicates over normalized records.
//!
//! A filter is a list of [`Criterion`]s combined with logical AND. Each
//! criterion is either an exact match on a categorical column or an
//! inclusive range on a derived numeric column.

use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::models::NormalizedRecord;

/// Literal used by the dashboard for "no restriction".
pub const WILDCARD: &str = "All";

/// Categorical columns that can be matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalField {
    Status,
    FederalState,
    Owner,
    NetworkOperator,
    Technology,
    PowerCategory,
    CapacityCategory,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 7] = [
        Self::Status,
        Self::FederalState,
        Self::Owner,
        Self::NetworkOperator,
        Self::Technology,
        Self::PowerCategory,
        Self::CapacityCategory,
    ];

    /// The record's value for this column, `None` when missing.
    pub fn value_of(&self, record: &NormalizedRecord) -> Option<String> {
        match self {
            Self::Status => record.operating_status.clone(),
            Self::FederalState => record.federal_state.clone(),
            Self::Owner => record.owner.clone(),
            Self::NetworkOperator => record.network_operator.clone(),
            Self::Technology => Some(record.technology_name.clone()),
            Self::PowerCategory => record.power_category.map(|c| c.label()),
            Self::CapacityCategory => record.capacity_category.map(|c| c.label()),
        }
    }
}

/// Derived numeric columns that can be range-filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    PowerMw,
    CapacityMwh,
    DurationHours,
}

impl NumericField {
    pub const ALL: [NumericField; 3] = [Self::PowerMw, Self::CapacityMwh, Self::DurationHours];

    pub fn value_of(&self, record: &NormalizedRecord) -> Option<f64> {
        match self {
            Self::PowerMw => record.power_mw,
            Self::CapacityMwh => record.capacity_mwh,
            Self::DurationHours => Some(record.duration_hours),
        }
    }
}

/// Categorical selection: a concrete value or the wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Value(String),
}

impl Selection {
    /// Parse a user-facing selection; `"All"` is the wildcard.
    pub fn parse(raw: &str) -> Self {
        if raw == WILDCARD {
            Self::All
        } else {
            Self::Value(raw.to_string())
        }
    }
}

/// A single filter test.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Exact match on a categorical column.
    Equals {
        field: CategoricalField,
        selection: Selection,
    },
    /// Inclusive range on a numeric column. Open bounds are `None`.
    Range {
        field: NumericField,
        min: Option<f64>,
        max: Option<f64>,
    },
}

impl Criterion {
    pub fn equals(field: CategoricalField, value: impl Into<String>) -> Self {
        Self::Equals {
            field,
            selection: Selection::Value(value.into()),
        }
    }

    pub fn range(field: NumericField, min: f64, max: f64) -> Self {
        Self::Range {
            field,
            min: Some(min),
            max: Some(max),
        }
    }

    /// Evaluate against one record.
    ///
    /// A missing value never satisfies a concrete selection or a range.
    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        match self {
            Criterion::Equals { selection: Selection::All, .. } => true,
            Criterion::Equals { field, selection: Selection::Value(expected) } => {
                field.value_of(record).as_deref() == Some(expected.as_str())
            }
            Criterion::Range { field, min, max } => match field.value_of(record) {
                Some(value) => {
                    min.map_or(true, |lo| value >= lo) && max.map_or(true, |hi| value <= hi)
                }
                None => false,
            },
        }
    }
}

/// True when the record satisfies every criterion.
pub fn matches_all(record: &NormalizedRecord, criteria: &[Criterion]) -> bool {
    criteria.iter().all(|c| c.matches(record))
}

/// Keep the records that satisfy every criterion, in input order.
pub fn apply_filters<'a>(
    records: &'a [NormalizedRecord],
    criteria: &[Criterion],
) -> Vec<&'a NormalizedRecord> {
    records.iter().filter(|r| matches_all(r, criteria)).collect()
}

/// Flat, optional form of the dashboard's sidebar filters.
///
/// Used as HTTP query string and CLI arguments. Every field left unset (or
/// set to `"All"`) imposes no restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, clap::Args)]
#[serde(default)]
pub struct FilterQuery {
    /// Operating status (BetriebsStatusName)
    #[arg(long)]
    pub status: Option<String>,

    /// Federal state (Bundesland)
    #[arg(long)]
    pub bundesland: Option<String>,

    /// Owner (AnlagenbetreiberName)
    #[arg(long)]
    pub owner: Option<String>,

    /// Network operator (NetzbetreiberNamen)
    #[arg(long)]
    pub network_operator: Option<String>,

    /// Battery technology name
    #[arg(long)]
    pub technology: Option<String>,

    /// Power category label, e.g. "1-10 MW"
    #[arg(long)]
    pub power_category: Option<String>,

    /// Capacity category label, e.g. "10-100 MWh"
    #[arg(long)]
    pub capacity_category: Option<String>,

    /// Minimum power in MW
    #[arg(long)]
    pub power_min: Option<f64>,

    /// Maximum power in MW
    #[arg(long)]
    pub power_max: Option<f64>,

    /// Minimum capacity in MWh
    #[arg(long)]
    pub capacity_min: Option<f64>,

    /// Maximum capacity in MWh
    #[arg(long)]
    pub capacity_max: Option<f64>,

    /// Minimum duration in hours
    #[arg(long)]
    pub duration_min: Option<f64>,

    /// Maximum duration in hours
    #[arg(long)]
    pub duration_max: Option<f64>,
}

impl FilterQuery {
    /// Convert to criteria. Unset fields and wildcards produce nothing.
    pub fn to_criteria(&self) -> Vec<Criterion> {
        let categorical = [
            (CategoricalField::Status, &self.status),
            (CategoricalField::FederalState, &self.bundesland),
            (CategoricalField::Owner, &self.owner),
            (CategoricalField::NetworkOperator, &self.network_operator),
            (CategoricalField::Technology, &self.technology),
            (CategoricalField::PowerCategory, &self.power_category),
            (CategoricalField::CapacityCategory, &self.capacity_category),
        ];
        let numeric = [
            (NumericField::PowerMw, self.power_min, self.power_max),
            (NumericField::CapacityMwh, self.capacity_min, self.capacity_max),
            (NumericField::DurationHours, self.duration_min, self.duration_max),
        ];

        let mut criteria = Vec::new();
        for (field, value) in categorical {
            if let Some(value) = value {
                if let Selection::Value(v) = Selection::parse(value) {
                    criteria.push(Criterion::equals(field, v));
                }
            }
        }
        for (field, min, max) in numeric {
            if min.is_some() || max.is_some() {
                criteria.push(Criterion::Range { field, min, max });
            }
        }
        criteria
    }

    pub fn is_empty(&self) -> bool {
        self.to_criteria().is_empty()
    }

    /// Reject non-finite bounds and ranges whose minimum exceeds the maximum.
    pub fn validate(&self) -> Result<(), FilterError> {
        let ranges = [
            (("power_min", self.power_min), ("power_max", self.power_max)),
            (("capacity_min", self.capacity_min), ("capacity_max", self.capacity_max)),
            (("duration_min", self.duration_min), ("duration_max", self.duration_max)),
        ];

        for ((min_field, min), (max_field, max)) in ranges {
            for (field, bound) in [(min_field, min), (max_field, max)] {
                if bound.is_some_and(|v| !v.is_finite()) {
                    return Err(FilterError::NonFinite { field });
                }
            }
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(FilterError::InvertedRange { min_field, max_field, min, max });
                }
            }
        }
        Ok(())
    }
}
