//! Summary statistics over a (filtered) record sequence.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::NormalizedRecord;

/// Value → count.
pub type Frequencies = BTreeMap<String, usize>;

/// Dashboard headline numbers and breakdowns.
///
/// On empty input every number is `0` and every breakdown is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_units: usize,
    pub total_power_mw: f64,
    pub total_capacity_mwh: f64,
    pub average_power_mw: f64,
    pub average_capacity_mwh: f64,
    pub average_duration_hours: f64,
    pub status_breakdown: Frequencies,
    /// Keyed by the raw technology code.
    pub technology_breakdown: Frequencies,
    pub technology_name_breakdown: Frequencies,
    pub bundesland_breakdown: Frequencies,
}

/// Compute the summary for a sequence of records.
///
/// Sums and means skip missing values; a mean over no values is `0`.
pub fn summarize<'a, I>(records: I) -> Summary
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    let mut summary = Summary::default();
    let mut power = Accumulator::default();
    let mut capacity = Accumulator::default();
    let mut duration = Accumulator::default();

    for record in records {
        summary.total_units += 1;
        power.add(record.power_mw);
        capacity.add(record.capacity_mwh);
        duration.add(Some(record.duration_hours));

        count(&mut summary.status_breakdown, record.operating_status.as_deref());
        count(
            &mut summary.technology_breakdown,
            record.technology_code.map(|c| c.to_string()).as_deref(),
        );
        count(&mut summary.technology_name_breakdown, Some(&record.technology_name));
        count(&mut summary.bundesland_breakdown, record.federal_state.as_deref());
    }

    summary.total_power_mw = power.sum;
    summary.total_capacity_mwh = capacity.sum;
    summary.average_power_mw = power.mean();
    summary.average_capacity_mwh = capacity.mean();
    summary.average_duration_hours = duration.mean();
    summary
}

fn count(table: &mut Frequencies, value: Option<&str>) {
    if let Some(value) = value {
        *table.entry(value.to_string()).or_insert(0) += 1;
    }
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    n: usize,
}

impl Accumulator {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.n += 1;
        }
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }
}
