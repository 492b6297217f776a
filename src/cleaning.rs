//! Row-level cleaning: duplicates, missing countries, timestamps and the
//! column pre-flight check.

use std::collections::{BTreeSet, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{Dataset, EnrichedTransaction, PipelineEvent, PipelineObserver, RowKey};

pub const UNKNOWN_COUNTRY: &str = "Unknown";

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupReport {
    pub original: usize,
    pub retained: usize,
    pub removed: usize,
}

/// Outcome of the column pre-flight check. Missing columns are data, not an
/// error; callers decide whether to abort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCheck {
    pub missing: BTreeSet<String>,
}

impl ColumnCheck {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Removes exact duplicate rows, keeping the first occurrence in input order.
pub fn drop_duplicates<T>(
    rows: &[T],
    dataset: Dataset,
    observer: &dyn PipelineObserver,
) -> (Vec<T>, DedupReport)
where
    T: RowKey + Clone,
{
    let mut seen = HashSet::with_capacity(rows.len());
    let kept: Vec<T> = rows
        .iter()
        .filter(|row| seen.insert(row.row_key()))
        .cloned()
        .collect();

    let report = DedupReport {
        original: rows.len(),
        retained: kept.len(),
        removed: rows.len() - kept.len(),
    };
    observer.on_event(&PipelineEvent::DuplicatesRemoved {
        dataset,
        original: report.original,
        removed: report.removed,
    });

    (kept, report)
}

/// Replaces unresolved countries with [`UNKNOWN_COUNTRY`]; returns how many
/// rows were filled.
pub fn fill_missing_country(
    records: &[EnrichedTransaction],
    observer: &dyn PipelineObserver,
) -> (Vec<EnrichedTransaction>, usize) {
    let mut filled = 0usize;
    let out = records
        .iter()
        .map(|record| {
            let mut out = record.clone();
            if out.country.is_none() {
                out.country = Some(UNKNOWN_COUNTRY.to_string());
                filled += 1;
            }
            out
        })
        .collect();

    observer.on_event(&PipelineEvent::CountryFilled { count: filled });
    (out, filled)
}

/// Parses a timestamp, returning `None` for anything unparsable.
pub fn coerce_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub fn validate_columns<S: AsRef<str>>(columns: &[S], required: &[&str]) -> ColumnCheck {
    let present: HashSet<&str> = columns.iter().map(|column| column.as_ref()).collect();
    ColumnCheck {
        missing: required
            .iter()
            .filter(|column| !present.contains(**column))
            .map(|column| column.to_string())
            .collect(),
    }
}
