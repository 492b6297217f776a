//! IP-range geolocation: an interval index over `(lower, upper, country)`
//! entries and an as-of style batch resolver.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    encode, EnrichedTransaction, IpCodecError, IpRangeRecord, PipelineEvent, PipelineObserver,
    IP_SENTINEL,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    pub lower: i64,
    pub upper: i64,
    pub country: String,
}

impl IpRange {
    pub fn contains(&self, ip: i64) -> bool {
        self.lower <= ip && ip <= self.upper
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Resolved { country: String },
    Unresolved { reason: UnresolvedReason },
}

impl Resolution {
    pub fn country(&self) -> Option<&str> {
        match self {
            Self::Resolved { country } => Some(country),
            Self::Unresolved { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnresolvedReason {
    /// The query was the sentinel (or otherwise negative).
    MissingAddress,
    /// No range contains the query: below the first range or inside a gap.
    OutsideRanges,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeIndexReport {
    pub input_ranges: usize,
    pub indexed_ranges: usize,
    pub skipped_ranges: usize,
    pub overlapping_pairs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub matched: usize,
    pub missing_address: usize,
    pub outside_ranges: usize,
}

/// Ranges sorted by `(lower, upper)`.
///
/// A query lands on the last range in that order whose lower bound does not
/// exceed it, so among ranges sharing a lower bound the widest one wins. The
/// landing range must still contain the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeIndex {
    ranges: Vec<IpRange>,
}

impl RangeIndex {
    pub fn from_ranges(mut ranges: Vec<IpRange>) -> Self {
        ranges.sort_by(|a, b| (a.lower, a.upper).cmp(&(b.lower, b.upper)));
        Self { ranges }
    }

    /// Encodes raw range bounds and builds the index. Entries whose bounds
    /// are missing or inverted are skipped and counted.
    pub fn build(
        records: &[IpRangeRecord],
        observer: &dyn PipelineObserver,
    ) -> Result<(Self, RangeIndexReport), IpCodecError> {
        let mut ranges = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in records {
            let lower = encode(&record.lower_bound_ip_address)?;
            let upper = encode(&record.upper_bound_ip_address)?;
            if lower == IP_SENTINEL || upper == IP_SENTINEL || lower < 0 || lower > upper {
                skipped += 1;
                continue;
            }
            ranges.push(IpRange {
                lower,
                upper,
                country: record.country.clone(),
            });
        }

        let index = Self::from_ranges(ranges);
        let report = RangeIndexReport {
            input_ranges: records.len(),
            indexed_ranges: index.len(),
            skipped_ranges: skipped,
            overlapping_pairs: index.overlapping_pairs(),
        };

        if report.skipped_ranges > 0 {
            observer.on_event(&PipelineEvent::RangesSkipped {
                count: report.skipped_ranges,
            });
        }
        if report.overlapping_pairs > 0 {
            observer.on_event(&PipelineEvent::OverlappingRanges {
                count: report.overlapping_pairs,
            });
        }

        Ok((index, report))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[IpRange] {
        &self.ranges
    }

    /// Number of adjacent pairs (in sort order) that share at least one address.
    pub fn overlapping_pairs(&self) -> usize {
        self.ranges
            .windows(2)
            .filter(|pair| pair[1].lower <= pair[0].upper)
            .count()
    }

    pub fn lookup(&self, ip: i64) -> Resolution {
        if ip < 0 {
            return Resolution::Unresolved {
                reason: UnresolvedReason::MissingAddress,
            };
        }

        let after = self.ranges.partition_point(|range| range.lower <= ip);
        match after.checked_sub(1).map(|idx| &self.ranges[idx]) {
            Some(range) if range.contains(ip) => Resolution::Resolved {
                country: range.country.clone(),
            },
            _ => Resolution::Unresolved {
                reason: UnresolvedReason::OutsideRanges,
            },
        }
    }

    /// Resolves every query, returning results in query order.
    pub fn resolve_batch(&self, ips: &[i64]) -> Vec<Resolution> {
        ips.iter().map(|ip| self.lookup(*ip)).collect()
    }
}

/// Attaches a country to every transaction, keeping the input row order.
/// Unmatched rows keep `country = None`.
pub fn merge_country_by_ip(
    records: &[EnrichedTransaction],
    index: &RangeIndex,
    observer: &dyn PipelineObserver,
) -> (Vec<EnrichedTransaction>, MergeReport) {
    let queries: Vec<i64> = records.iter().map(|record| record.ip_int).collect();
    let resolutions = resolve_unique(index, &queries);

    let mut report = MergeReport::default();
    let merged = records
        .iter()
        .zip(resolutions)
        .map(|(record, resolution)| {
            let mut out = record.clone();
            out.country = match resolution {
                Resolution::Resolved { country } => {
                    report.matched += 1;
                    Some(country)
                }
                Resolution::Unresolved {
                    reason: UnresolvedReason::MissingAddress,
                } => {
                    report.missing_address += 1;
                    None
                }
                Resolution::Unresolved {
                    reason: UnresolvedReason::OutsideRanges,
                } => {
                    report.outside_ranges += 1;
                    None
                }
            };
            out
        })
        .collect();

    observer.on_event(&PipelineEvent::CountryMerged {
        matched: report.matched,
        missing_address: report.missing_address,
        outside_ranges: report.outside_ranges,
    });

    (merged, report)
}

/// Searches each distinct address once and re-expands in query order.
fn resolve_unique(index: &RangeIndex, queries: &[i64]) -> Vec<Resolution> {
    let mut cache: HashMap<i64, Resolution> = HashMap::with_capacity(queries.len());
    queries
        .iter()
        .map(|ip| {
            cache
                .entry(*ip)
                .or_insert_with(|| index.lookup(*ip))
                .clone()
        })
        .collect()
}
