//! Record transformation.
//!
//! - Dates: `/Date(ms)/` parsing
//! - Normalize: raw registry record → typed record with derived fields
//! - Filter: AND-combined criteria over normalized records
//! - Aggregate: headline numbers and breakdowns
//! - Pipeline: snapshot file → dataset → filtered view

pub mod aggregate;
pub mod dates;
pub mod filter;
pub mod normalize;
pub mod pipeline;

pub use aggregate::{summarize, Frequencies, Summary};
pub use dates::{coerce_date, parse_registry_date};
pub use filter::{apply_filters, matches_all, CategoricalField, Criterion, FilterQuery, NumericField, Selection, WILDCARD};
pub use normalize::{duration_hours, normalize_record, normalize_records, normalize_values};
pub use pipeline::{build_view, load_dataset, load_latest, Dataset, View};
