//! Raw registry records to typed, derived records.
//!
//! Each record is handled on its own: coercion, unit conversion, duration,
//! technology lookup and size bucketing. Output order equals input order and
//! nothing is dropped; a field that cannot be coerced becomes `None`.

use serde_json::{Map, Value};

use crate::models::{fields, BatteryTechnology, NormalizedRecord, RawRecord, SizeCategory};
use super::dates::coerce_date;

const KILO: f64 = 1000.0;

/// Normalize a sequence of raw records, preserving order 1:1.
pub fn normalize_records(records: &[RawRecord]) -> Vec<NormalizedRecord> {
    records.iter().map(normalize_record).collect()
}

/// Normalize values straight from a parsed JSON array.
///
/// Elements that are not objects are normalized as empty records so the
/// 1:1 correspondence with the input still holds.
pub fn normalize_values(values: &[Value]) -> Vec<NormalizedRecord> {
    values
        .iter()
        .map(|value| {
            let raw = value.as_object().cloned().map(RawRecord::new).unwrap_or_default();
            normalize_record(&raw)
        })
        .collect()
}

/// Normalize a single raw record.
pub fn normalize_record(raw: &RawRecord) -> NormalizedRecord {
    let gross_power_kw = coerce_number(raw.get(fields::GROSS_POWER));
    let usable_capacity_kwh = coerce_number(raw.get(fields::USABLE_CAPACITY));
    let technology_code = raw.get(fields::BATTERY_TECHNOLOGY).and_then(BatteryTechnology::code_of);

    let power_mw = gross_power_kw.map(|kw| kw / KILO);
    let capacity_mwh = usable_capacity_kwh.map(|kwh| kwh / KILO);

    NormalizedRecord {
        last_update: coerce_date(raw.get(fields::LAST_UPDATE)),
        registration_date: coerce_date(raw.get(fields::REGISTRATION_DATE)),
        commissioning_date: coerce_date(raw.get(fields::COMMISSIONING_DATE)),
        planned_commissioning_date: coerce_date(raw.get(fields::PLANNED_COMMISSIONING_DATE)),

        gross_power_kw,
        net_rated_power_kw: coerce_number(raw.get(fields::NET_RATED_POWER)),
        usable_capacity_kwh,
        latitude: coerce_number(raw.get(fields::LATITUDE)),
        longitude: coerce_number(raw.get(fields::LONGITUDE)),

        technology_code,

        unit_name: coerce_text(raw.get(fields::UNIT_NAME)),
        owner: coerce_text(raw.get(fields::OWNER)),
        operating_status: coerce_text(raw.get(fields::OPERATING_STATUS)),
        federal_state: coerce_text(raw.get(fields::FEDERAL_STATE)),
        municipality: coerce_text(raw.get(fields::MUNICIPALITY)),
        network_operator: coerce_text(raw.get(fields::NETWORK_OPERATOR)),
        mastr_number: coerce_text(raw.get(fields::MASTR_NUMBER)),

        power_mw,
        capacity_mwh,
        duration_hours: duration_hours(capacity_mwh, power_mw),
        technology_name: BatteryTechnology::name_for(technology_code).to_string(),
        power_category: SizeCategory::power(power_mw),
        capacity_category: SizeCategory::capacity(capacity_mwh),

        extra: uninterpreted_fields(raw),
    }
}

/// Hours of discharge at rated power.
///
/// Resolves to `0` whenever the ratio is undefined: power missing or zero,
/// capacity missing.
pub fn duration_hours(capacity_mwh: Option<f64>, power_mw: Option<f64>) -> f64 {
    match (capacity_mwh, power_mw) {
        (Some(capacity), Some(power)) if power != 0.0 => {
            let hours = capacity / power;
            if hours.is_finite() {
                hours
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Parse a JSON number or numeric string. Non-finite results count as missing.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Raw keys that are neither source fields nor previously derived columns.
fn uninterpreted_fields(raw: &RawRecord) -> Map<String, Value> {
    const DERIVED: [&str; 6] = [
        "Power_MW",
        "Capacity_MWh",
        "Duration_hours",
        "BatteryTechnologyName",
        "Power_Category",
        "Capacity_Category",
    ];

    raw.fields()
        .iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            !fields::DATE_FIELDS.contains(&key)
                && !fields::NUMERIC_FIELDS.contains(&key)
                && !fields::TEXT_FIELDS.contains(&key)
                && key != fields::BATTERY_TECHNOLOGY
                && !DERIVED.contains(&key)
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
