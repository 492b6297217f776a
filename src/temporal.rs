//! Time-derived features for both datasets.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{
    CreditCardFeatures, CreditCardTransaction, Dataset, EnrichedTransaction, PipelineEvent,
    PipelineObserver,
};

const SECONDS_PER_HOUR: f64 = 3_600.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    UserId,
    DeviceId,
}

impl EntityKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserId => "user_id",
            Self::DeviceId => "device_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalConfig {
    pub window_hours: u32,
    pub entity: EntityKey,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            entity: EntityKey::UserId,
        }
    }
}

impl TemporalConfig {
    pub fn window(&self) -> ChronoDuration {
        ChronoDuration::hours(i64::from(self.window_hours))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityId {
    User(u64),
    Device(String),
}

/// Adds purchase hour, weekday (Monday = 0), signup-to-purchase hours and the
/// trailing-window transaction count per entity.
pub fn add_time_features_fraud(
    records: &[EnrichedTransaction],
    cfg: &TemporalConfig,
    observer: &dyn PipelineObserver,
) -> Vec<EnrichedTransaction> {
    let entities: Vec<EntityId> = records
        .iter()
        .map(|record| match cfg.entity {
            EntityKey::UserId => EntityId::User(record.txn.user_id),
            EntityKey::DeviceId => EntityId::Device(record.txn.device_id.clone()),
        })
        .collect();
    let times: Vec<Option<NaiveDateTime>> = records
        .iter()
        .map(|record| record.txn.purchase_time)
        .collect();
    let counts = trailing_window_counts(&entities, &times, cfg.window());

    let mut missing_timestamps = 0usize;
    let out: Vec<EnrichedTransaction> = records
        .iter()
        .zip(counts)
        .map(|(record, count)| {
            let mut out = record.clone();
            let purchase = record.txn.purchase_time;
            if purchase.is_none() || record.txn.signup_time.is_none() {
                missing_timestamps += 1;
            }
            out.purchase_hour = purchase.map(|ts| ts.hour());
            out.purchase_dayofweek = purchase.map(|ts| ts.weekday().num_days_from_monday());
            out.time_since_signup_hours = hours_between(record.txn.signup_time, purchase);
            out.transactions_last_24h = count;
            out
        })
        .collect();

    observer.on_event(&PipelineEvent::TimeFeaturesAdded {
        dataset: Dataset::Fraud,
        rows: out.len(),
        missing_timestamps,
    });

    out
}

/// For each event, counts earlier events of the same entity at `s` with
/// `t - window <= s < t`. Events without a timestamp get `None` and are not
/// counted for anyone else.
pub fn trailing_window_counts<K: Hash + Eq>(
    entities: &[K],
    times: &[Option<NaiveDateTime>],
    window: ChronoDuration,
) -> Vec<Option<u32>> {
    let mut groups: HashMap<&K, Vec<(NaiveDateTime, usize)>> = HashMap::new();
    for (idx, (entity, time)) in entities.iter().zip(times).enumerate() {
        if let Some(ts) = time {
            groups.entry(entity).or_default().push((*ts, idx));
        }
    }

    let mut counts = vec![None; times.len()];
    for events in groups.values_mut() {
        events.sort_unstable();

        let mut window_start = 0usize;
        let mut ties_start = 0usize;
        for (pos, (ts, idx)) in events.iter().enumerate() {
            // A window reaching past the calendar's start covers everything.
            if let Some(horizon) = ts.checked_sub_signed(window) {
                while events[window_start].0 < horizon {
                    window_start += 1;
                }
            }
            while events[ties_start].0 < *ts {
                ties_start += 1;
            }
            debug_assert!(ties_start <= pos);
            counts[*idx] = Some((ties_start - window_start) as u32);
        }
    }

    counts
}

/// Adds `hour_of_day` and `day_of_week` from seconds elapsed since the first
/// transaction. These form a synthetic cycle, not wall-clock time.
pub fn add_time_features_creditcard(
    records: &[CreditCardTransaction],
    observer: &dyn PipelineObserver,
) -> Vec<CreditCardFeatures> {
    let out: Vec<CreditCardFeatures> = records
        .iter()
        .map(|txn| CreditCardFeatures {
            hour_of_day: elapsed_hour_of_day(txn.time),
            day_of_week: elapsed_day_of_week(txn.time),
            txn: txn.clone(),
        })
        .collect();

    observer.on_event(&PipelineEvent::TimeFeaturesAdded {
        dataset: Dataset::CreditCard,
        rows: out.len(),
        missing_timestamps: 0,
    });

    out
}

pub fn elapsed_hour_of_day(elapsed_seconds: f64) -> i64 {
    ((elapsed_seconds / SECONDS_PER_HOUR).floor() as i64).rem_euclid(24)
}

pub fn elapsed_day_of_week(elapsed_seconds: f64) -> i64 {
    ((elapsed_seconds / SECONDS_PER_DAY).floor() as i64).rem_euclid(7)
}

fn hours_between(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Option<f64> {
    let delta = end? - start?;
    Some(delta.num_milliseconds() as f64 / 3_600_000.0)
}
