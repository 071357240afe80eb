//! Domain models for the battery storage pipeline.
//!
//! - [`RawRecord`] - One registry entry exactly as received from MaStR
//! - [`NormalizedRecord`] - Typed, unit-converted, bucketed entry
//! - [`BatteryTechnology`] - Fixed table of battery technology codes
//! - [`SizeCategory`] - Power / capacity size bucket with its unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

// =============================================================================
// Field names
// =============================================================================

/// Registry field names as they appear in the MaStR JSON.
pub mod fields {
    pub const LAST_UPDATE: &str = "DatumLetzteAktualisierung";
    pub const REGISTRATION_DATE: &str = "EinheitRegistrierungsdatum";
    pub const COMMISSIONING_DATE: &str = "InbetriebnahmeDatum";
    pub const PLANNED_COMMISSIONING_DATE: &str = "GeplantesInbetriebnahmeDatum";

    pub const GROSS_POWER: &str = "Bruttoleistung";
    pub const NET_RATED_POWER: &str = "Nettonennleistung";
    pub const USABLE_CAPACITY: &str = "NutzbareSpeicherkapazitaet";
    pub const LATITUDE: &str = "Breitengrad";
    pub const LONGITUDE: &str = "Laengengrad";

    pub const BATTERY_TECHNOLOGY: &str = "Batterietechnologie";

    pub const UNIT_NAME: &str = "EinheitName";
    pub const OWNER: &str = "AnlagenbetreiberName";
    pub const OPERATING_STATUS: &str = "BetriebsStatusName";
    pub const FEDERAL_STATE: &str = "Bundesland";
    pub const MUNICIPALITY: &str = "Gemeinde";
    pub const NETWORK_OPERATOR: &str = "NetzbetreiberNamen";
    pub const MASTR_NUMBER: &str = "MaStRNummer";

    /// Date-bearing fields in `/Date(<ms>)/` form.
    pub const DATE_FIELDS: [&str; 4] = [
        LAST_UPDATE,
        REGISTRATION_DATE,
        COMMISSIONING_DATE,
        PLANNED_COMMISSIONING_DATE,
    ];

    /// Fields coerced to floating point.
    pub const NUMERIC_FIELDS: [&str; 5] =
        [GROSS_POWER, NET_RATED_POWER, USABLE_CAPACITY, LATITUDE, LONGITUDE];

    /// Free-text identifiers carried through verbatim.
    pub const TEXT_FIELDS: [&str; 7] = [
        UNIT_NAME,
        OWNER,
        OPERATING_STATUS,
        FEDERAL_STATE,
        MUNICIPALITY,
        NETWORK_OPERATOR,
        MASTR_NUMBER,
    ];
}

// =============================================================================
// Raw record
// =============================================================================

/// One registry entry as received from the API.
///
/// Every key is preserved, including the ones the normalizer does not know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

// =============================================================================
// Battery technology
// =============================================================================

/// Label used for codes outside the technology table.
pub const UNKNOWN_TECHNOLOGY: &str = "Unbekannt";

/// Battery technology category as coded by MaStR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatteryTechnology {
    Lithium,
    LeadAcid,
    RedoxFlow,
    HighTemperature,
    NickelCadmium,
    Other,
}

impl BatteryTechnology {
    /// Look up a registry code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            727 => Some(Self::Lithium),
            728 => Some(Self::LeadAcid),
            729 => Some(Self::RedoxFlow),
            730 => Some(Self::HighTemperature),
            731 => Some(Self::NickelCadmium),
            732 => Some(Self::Other),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Lithium => 727,
            Self::LeadAcid => 728,
            Self::RedoxFlow => 729,
            Self::HighTemperature => 730,
            Self::NickelCadmium => 731,
            Self::Other => 732,
        }
    }

    /// German category label used in the registry UI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lithium => "Lithium-Batterie",
            Self::LeadAcid => "Blei-Batterie",
            Self::RedoxFlow => "Redox-Flow-Batterie",
            Self::HighTemperature => "Hochtemperaturbatterie",
            Self::NickelCadmium => "Nickel-Cadmium- / Nickel-Metallhydridbatterie",
            Self::Other => "Sonstige Batterie",
        }
    }

    /// Name for an optional code, falling back to [`UNKNOWN_TECHNOLOGY`].
    pub fn name_for(code: Option<i64>) -> &'static str {
        code.and_then(Self::from_code)
            .map(|t| t.name())
            .unwrap_or(UNKNOWN_TECHNOLOGY)
    }

    /// Code carried by a JSON value.
    ///
    /// Only JSON numbers with an integral value count; a code sent as a
    /// string is treated as absent.
    pub fn code_of(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            _ => None,
        }
    }

    pub fn is_battery_code(code: i64) -> bool {
        Self::from_code(code).is_some()
    }
}

// =============================================================================
// Size categories
// =============================================================================

/// One of five size buckets with boundaries `{0, 1, 10, 100, 1000, ∞}`.
///
/// Bins are closed on the right: `(0, 1]`, `(1, 10]`, `(10, 100]`,
/// `(100, 1000]`, `(1000, ∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeBucket {
    UpTo1,
    UpTo10,
    UpTo100,
    UpTo1000,
    Above1000,
}

impl SizeBucket {
    /// Place a value into a bucket. Zero, negative and non-finite values
    /// fall outside every bin.
    pub fn classify(value: f64) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let bucket = if value <= 1.0 {
            Self::UpTo1
        } else if value <= 10.0 {
            Self::UpTo10
        } else if value <= 100.0 {
            Self::UpTo100
        } else if value <= 1000.0 {
            Self::UpTo1000
        } else {
            Self::Above1000
        };
        Some(bucket)
    }

    pub fn range_label(&self) -> &'static str {
        match self {
            Self::UpTo1 => "<1",
            Self::UpTo10 => "1-10",
            Self::UpTo100 => "10-100",
            Self::UpTo1000 => "100-1000",
            Self::Above1000 => ">1000",
        }
    }
}

/// Unit suffix of a size category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeUnit {
    Megawatt,
    MegawattHour,
}

impl SizeUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Megawatt => "MW",
            Self::MegawattHour => "MWh",
        }
    }
}

/// A bucket labelled with its unit, e.g. `"1-10 MW"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeCategory {
    pub bucket: SizeBucket,
    pub unit: SizeUnit,
}

impl SizeCategory {
    pub fn power(value_mw: Option<f64>) -> Option<Self> {
        Self::classify(value_mw, SizeUnit::Megawatt)
    }

    pub fn capacity(value_mwh: Option<f64>) -> Option<Self> {
        Self::classify(value_mwh, SizeUnit::MegawattHour)
    }

    fn classify(value: Option<f64>, unit: SizeUnit) -> Option<Self> {
        value
            .and_then(SizeBucket::classify)
            .map(|bucket| Self { bucket, unit })
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.bucket.range_label(), self.unit.symbol())
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.bucket.range_label(), self.unit.symbol())
    }
}

impl Serialize for SizeCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// Normalized record
// =============================================================================

/// Write a date back in the registry's `/Date(<ms>)/` encoding.
fn serialize_registry_date<S: Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(dt) => serializer.serialize_str(&crate::transform::dates::format_registry_date(dt)),
        None => serializer.serialize_none(),
    }
}

/// A registry entry after cleaning.
///
/// `None` is the explicit "missing" marker for every coerced field. Source
/// fields keep their German names and dates their `/Date(<ms>)/` encoding
/// when serialized, so a serialized record can be normalized again and
/// yields the same values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    #[serde(rename = "DatumLetzteAktualisierung", serialize_with = "serialize_registry_date")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(rename = "EinheitRegistrierungsdatum", serialize_with = "serialize_registry_date")]
    pub registration_date: Option<DateTime<Utc>>,
    #[serde(rename = "InbetriebnahmeDatum", serialize_with = "serialize_registry_date")]
    pub commissioning_date: Option<DateTime<Utc>>,
    #[serde(rename = "GeplantesInbetriebnahmeDatum", serialize_with = "serialize_registry_date")]
    pub planned_commissioning_date: Option<DateTime<Utc>>,

    /// Gross power in kW.
    #[serde(rename = "Bruttoleistung")]
    pub gross_power_kw: Option<f64>,
    /// Net rated power in kW.
    #[serde(rename = "Nettonennleistung")]
    pub net_rated_power_kw: Option<f64>,
    /// Usable storage capacity in kWh.
    #[serde(rename = "NutzbareSpeicherkapazitaet")]
    pub usable_capacity_kwh: Option<f64>,
    #[serde(rename = "Breitengrad")]
    pub latitude: Option<f64>,
    #[serde(rename = "Laengengrad")]
    pub longitude: Option<f64>,

    #[serde(rename = "Batterietechnologie")]
    pub technology_code: Option<i64>,

    #[serde(rename = "EinheitName")]
    pub unit_name: Option<String>,
    #[serde(rename = "AnlagenbetreiberName")]
    pub owner: Option<String>,
    #[serde(rename = "BetriebsStatusName")]
    pub operating_status: Option<String>,
    #[serde(rename = "Bundesland")]
    pub federal_state: Option<String>,
    #[serde(rename = "Gemeinde")]
    pub municipality: Option<String>,
    #[serde(rename = "NetzbetreiberNamen")]
    pub network_operator: Option<String>,
    #[serde(rename = "MaStRNummer")]
    pub mastr_number: Option<String>,

    #[serde(rename = "Power_MW")]
    pub power_mw: Option<f64>,
    #[serde(rename = "Capacity_MWh")]
    pub capacity_mwh: Option<f64>,
    /// Capacity over power; `0` when no duration applies.
    #[serde(rename = "Duration_hours")]
    pub duration_hours: f64,
    #[serde(rename = "BatteryTechnologyName")]
    pub technology_name: String,
    #[serde(rename = "Power_Category")]
    pub power_category: Option<SizeCategory>,
    #[serde(rename = "Capacity_Category")]
    pub capacity_category: Option<SizeCategory>,

    /// Raw fields the normalizer does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NormalizedRecord {
    /// Both coordinates present, i.e. the record can be placed on a map.
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technology_lookup() {
        assert_eq!(BatteryTechnology::name_for(Some(727)), "Lithium-Batterie");
        assert_eq!(BatteryTechnology::name_for(Some(732)), "Sonstige Batterie");
        assert_eq!(BatteryTechnology::name_for(Some(733)), UNKNOWN_TECHNOLOGY);
        assert_eq!(BatteryTechnology::name_for(None), UNKNOWN_TECHNOLOGY);
    }

    #[test]
    fn test_technology_codes_are_consistent() {
        for code in 727..=732 {
            let tech = BatteryTechnology::from_code(code).unwrap();
            assert_eq!(tech.code(), code);
        }
        assert!(BatteryTechnology::from_code(733).is_none());
    }

    #[test]
    fn test_code_must_be_a_json_number() {
        assert_eq!(BatteryTechnology::code_of(&serde_json::json!(727)), Some(727));
        assert_eq!(BatteryTechnology::code_of(&serde_json::json!(729.0)), Some(729));
        assert_eq!(BatteryTechnology::code_of(&serde_json::json!(727.5)), None);
        assert_eq!(BatteryTechnology::code_of(&serde_json::json!("727")), None);
        assert_eq!(BatteryTechnology::code_of(&Value::Null), None);
    }

    #[test]
    fn test_dates_serialize_in_registry_encoding() {
        use chrono::TimeZone;

        let record = crate::transform::normalize::normalize_record(&RawRecord::new(
            serde_json::json!({ "InbetriebnahmeDatum": "/Date(1704067200000)/" })
                .as_object()
                .cloned()
                .unwrap(),
        ));
        assert_eq!(
            record.commissioning_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["InbetriebnahmeDatum"], "/Date(1704067200000)/");
        assert_eq!(json["GeplantesInbetriebnahmeDatum"], Value::Null);
    }

    #[test]
    fn test_bucket_boundaries_are_right_closed() {
        assert_eq!(SizeBucket::classify(0.5), Some(SizeBucket::UpTo1));
        assert_eq!(SizeBucket::classify(1.0), Some(SizeBucket::UpTo1));
        assert_eq!(SizeBucket::classify(1.0001), Some(SizeBucket::UpTo10));
        assert_eq!(SizeBucket::classify(10.0), Some(SizeBucket::UpTo10));
        assert_eq!(SizeBucket::classify(1000.0), Some(SizeBucket::UpTo1000));
        assert_eq!(SizeBucket::classify(1500.0), Some(SizeBucket::Above1000));
    }

    #[test]
    fn test_zero_and_negative_are_uncategorized() {
        assert_eq!(SizeBucket::classify(0.0), None);
        assert_eq!(SizeBucket::classify(-3.0), None);
        assert_eq!(SizeBucket::classify(f64::NAN), None);
        assert_eq!(SizeCategory::power(None), None);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(SizeCategory::power(Some(5.0)).unwrap().label(), "1-10 MW");
        assert_eq!(SizeCategory::capacity(Some(20.0)).unwrap().label(), "10-100 MWh");
        assert_eq!(SizeCategory::capacity(Some(0.2)).unwrap().label(), "<1 MWh");
        assert_eq!(SizeCategory::power(Some(2000.0)).unwrap().label(), ">1000 MW");
    }

    #[test]
    fn test_category_serializes_as_label() {
        let category = SizeCategory::power(Some(50.0)).unwrap();
        assert_eq!(serde_json::to_value(category).unwrap(), "10-100 MW");
    }
}
