//! Structured data-quality events emitted by pipeline stages.
//!
//! Stages never touch process-wide logging state directly; they report to a
//! caller-supplied [`PipelineObserver`].

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dataset {
    Fraud,
    IpCountry,
    CreditCard,
}

impl Dataset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fraud => "fraud",
            Self::IpCountry => "ip_country",
            Self::CreditCard => "creditcard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    RowsLoaded {
        dataset: Dataset,
        rows: usize,
        columns: usize,
    },
    UnparsableTimestamps {
        dataset: Dataset,
        column: String,
        count: usize,
    },
    DuplicatesRemoved {
        dataset: Dataset,
        original: usize,
        removed: usize,
    },
    RangesSkipped {
        count: usize,
    },
    OverlappingRanges {
        count: usize,
    },
    CountryMerged {
        matched: usize,
        missing_address: usize,
        outside_ranges: usize,
    },
    CountryFilled {
        count: usize,
    },
    TimeFeaturesAdded {
        dataset: Dataset,
        rows: usize,
        missing_timestamps: usize,
    },
    ColumnsScaled {
        columns: Vec<String>,
    },
    ColumnsEncoded {
        columns: Vec<String>,
        produced: usize,
    },
    Resampled {
        strategy: String,
        before: usize,
        after: usize,
    },
}

impl PipelineEvent {
    /// Stable dotted name used as the `event` field in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RowsLoaded { .. } => "dataset.load.finish",
            Self::UnparsableTimestamps { .. } => "dataset.load.unparsable_timestamps",
            Self::DuplicatesRemoved { .. } => "cleaning.dedup.finish",
            Self::RangesSkipped { .. } => "geolocation.index.ranges_skipped",
            Self::OverlappingRanges { .. } => "geolocation.index.overlap_detected",
            Self::CountryMerged { .. } => "geolocation.merge.finish",
            Self::CountryFilled { .. } => "cleaning.country.filled",
            Self::TimeFeaturesAdded { .. } => "temporal.features.added",
            Self::ColumnsScaled { .. } => "preprocess.scale.finish",
            Self::ColumnsEncoded { .. } => "preprocess.encode.finish",
            Self::Resampled { .. } => "resample.finish",
        }
    }
}

pub trait PipelineObserver {
    fn on_event(&self, event: &PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(PipelineEvent::name).collect()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
