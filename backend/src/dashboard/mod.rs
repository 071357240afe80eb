//! Display-time views over filtered records.
//!
//! These are the shapes a dashboard needs, independent of how it is drawn:
//!
//! - [`map_points`] - records that can be placed on a map
//! - [`table_rows`] - the detail table with rounded numbers
//! - [`chart_data`] - distributions and the duration histogram
//! - [`filter_options`] - choices and bounds for the filter controls
//! - [`export_csv`] - the detail table as CSV

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::error::ExportError;
use crate::models::NormalizedRecord;
use crate::transform::aggregate::{summarize, Frequencies};
use crate::transform::filter::{CategoricalField, NumericField};

/// Number of Bundesländer shown in the ranking chart.
pub const TOP_BUNDESLAENDER: usize = 10;

/// Number of bins in the duration histogram.
pub const DURATION_BINS: usize = 20;

// =============================================================================
// Map
// =============================================================================

/// A storage unit with valid coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub power_mw: Option<f64>,
    pub capacity_mwh: Option<f64>,
    pub duration_hours: f64,
    pub status: Option<String>,
    pub bundesland: Option<String>,
    pub owner: Option<String>,
    pub municipality: Option<String>,
    pub technology: String,
}

/// Records with both coordinates, in input order.
///
/// This is the only place records are dropped for lack of coordinates.
pub fn map_points<'a, I>(records: I) -> Vec<MapPoint>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    records
        .into_iter()
        .filter_map(|r| {
            Some(MapPoint {
                latitude: r.latitude?,
                longitude: r.longitude?,
                name: r.unit_name.clone(),
                power_mw: r.power_mw,
                capacity_mwh: r.capacity_mwh,
                duration_hours: r.duration_hours,
                status: r.operating_status.clone(),
                bundesland: r.federal_state.clone(),
                owner: r.owner.clone(),
                municipality: r.municipality.clone(),
                technology: r.technology_name.clone(),
            })
        })
        .collect()
}

// =============================================================================
// Table
// =============================================================================

/// One row of the detail table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub status: Option<String>,
    pub power_mw: Option<f64>,
    pub capacity_mwh: Option<f64>,
    pub duration_hours: f64,
    pub bundesland: Option<String>,
    pub municipality: Option<String>,
    pub technology: String,
    pub network_operator: Option<String>,
    pub planned_commissioning: Option<String>,
}

impl TableRow {
    /// Column headers, in field order.
    pub const HEADERS: [&'static str; 11] = [
        "EinheitName",
        "AnlagenbetreiberName",
        "BetriebsStatusName",
        "Power (MW)",
        "Capacity (MWh)",
        "Duration (h)",
        "Bundesland",
        "Gemeinde",
        "BatteryTechnologyName",
        "NetzbetreiberNamen",
        "GeplantesInbetriebnahmeDatum",
    ];

    /// Cells as strings, missing values empty.
    pub fn cells(&self) -> [String; 11] {
        fn text(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }
        fn number(value: Option<f64>) -> String {
            value.map(|v| format!("{:.2}", v)).unwrap_or_default()
        }

        [
            text(&self.name),
            text(&self.owner),
            text(&self.status),
            number(self.power_mw),
            number(self.capacity_mwh),
            number(Some(self.duration_hours)),
            text(&self.bundesland),
            text(&self.municipality),
            self.technology.clone(),
            text(&self.network_operator),
            text(&self.planned_commissioning),
        ]
    }
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn table_rows<'a, I>(records: I) -> Vec<TableRow>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    records
        .into_iter()
        .map(|r| TableRow {
            name: r.unit_name.clone(),
            owner: r.owner.clone(),
            status: r.operating_status.clone(),
            power_mw: r.power_mw.map(round2),
            capacity_mwh: r.capacity_mwh.map(round2),
            duration_hours: round2(r.duration_hours),
            bundesland: r.federal_state.clone(),
            municipality: r.municipality.clone(),
            technology: r.technology_name.clone(),
            network_operator: r.network_operator.clone(),
            planned_commissioning: r
                .planned_commissioning_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
        })
        .collect()
}

/// Write rows as CSV with a header line.
pub fn export_csv<W: Write>(rows: &[TableRow], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(TableRow::HEADERS)?;
    for row in rows {
        wtr.write_record(row.cells())?;
    }
    wtr.flush()?;
    Ok(())
}

// =============================================================================
// Charts
// =============================================================================

/// One labelled bar or slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountEntry {
    pub label: String,
    pub count: usize,
}

/// One histogram bin `[start, end)`; the last bin is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Series for the dashboard charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub status: Vec<CountEntry>,
    pub technology: Vec<CountEntry>,
    pub top_bundeslaender: Vec<CountEntry>,
    pub duration_histogram: Vec<HistogramBin>,
}

pub fn chart_data(records: &[&NormalizedRecord]) -> ChartData {
    if records.is_empty() {
        return ChartData::default();
    }

    let summary = summarize(records.iter().copied());
    let mut top = ranked(&summary.bundesland_breakdown);
    top.truncate(TOP_BUNDESLAENDER);

    let durations: Vec<f64> = records.iter().map(|r| r.duration_hours).collect();

    ChartData {
        status: ranked(&summary.status_breakdown),
        technology: ranked(&summary.technology_name_breakdown),
        top_bundeslaender: top,
        duration_histogram: histogram(&durations, DURATION_BINS),
    }
}

/// Count descending, label ascending on ties.
pub fn ranked(table: &Frequencies) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = table
        .iter()
        .map(|(label, count)| CountEntry {
            label: label.clone(),
            count: *count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    entries
}

/// Equal-width histogram between the smallest and largest value.
///
/// All values equal gives a single bin holding everything.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max == min {
        return vec![HistogramBin {
            start: min,
            end: max,
            count: finite.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in &finite {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + width * i as f64,
            end: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

// =============================================================================
// Filter options
// =============================================================================

/// Smallest and largest present value of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// Choices and slider bounds for the filter controls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// Distinct values per categorical column, sorted.
    pub categorical: BTreeMap<CategoricalField, Vec<String>>,
    /// Bounds per numeric column; absent when no record has a value.
    pub numeric: BTreeMap<NumericField, Bounds>,
}

pub fn filter_options(records: &[NormalizedRecord]) -> FilterOptions {
    let mut options = FilterOptions::default();

    for field in CategoricalField::ALL {
        let values: BTreeSet<String> = records.iter().filter_map(|r| field.value_of(r)).collect();
        options.categorical.insert(field, values.into_iter().collect());
    }

    for field in NumericField::ALL {
        let bounds = records
            .iter()
            .filter_map(|r| field.value_of(r))
            .fold(None, |acc: Option<Bounds>, v| {
                Some(match acc {
                    None => Bounds { min: v, max: v },
                    Some(b) => Bounds {
                        min: b.min.min(v),
                        max: b.max.max(v),
                    },
                })
            });
        if let Some(bounds) = bounds {
            options.numeric.insert(field, bounds);
        }
    }

    options
}
