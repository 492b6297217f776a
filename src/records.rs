//! Typed rows of the three source datasets and their enriched forms.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{IpKey, IpRepr};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudTransaction {
    pub user_id: u64,
    pub signup_time: Option<NaiveDateTime>,
    pub purchase_time: Option<NaiveDateTime>,
    /// Source text of `signup_time` when it failed to parse.
    #[serde(default)]
    pub unparsed_signup_time: Option<String>,
    /// Source text of `purchase_time` when it failed to parse.
    #[serde(default)]
    pub unparsed_purchase_time: Option<String>,
    pub purchase_value: f64,
    pub device_id: String,
    pub source: String,
    pub browser: String,
    pub sex: String,
    pub age: u32,
    pub ip_address: IpRepr,
    pub class: u8,
}

/// A fraud transaction plus the fields derived by the enrichment stages.
/// Derived fields start as `None` and are filled by exactly one stage each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    pub txn: FraudTransaction,
    pub ip_int: i64,
    pub country: Option<String>,
    pub purchase_hour: Option<u32>,
    pub purchase_dayofweek: Option<u32>,
    pub time_since_signup_hours: Option<f64>,
    pub transactions_last_24h: Option<u32>,
}

impl EnrichedTransaction {
    pub fn new(txn: FraudTransaction, ip_int: i64) -> Self {
        Self {
            txn,
            ip_int,
            country: None,
            purchase_hour: None,
            purchase_dayofweek: None,
            time_since_signup_hours: None,
            transactions_last_24h: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpRangeRecord {
    pub lower_bound_ip_address: IpRepr,
    pub upper_bound_ip_address: IpRepr,
    pub country: String,
}

impl IpRangeRecord {
    pub fn new(
        lower: impl Into<IpRepr>,
        upper: impl Into<IpRepr>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            lower_bound_ip_address: lower.into(),
            upper_bound_ip_address: upper.into(),
            country: country.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCardTransaction {
    /// Seconds elapsed since the first transaction in the dataset.
    pub time: f64,
    pub features: Vec<f64>,
    pub amount: f64,
    pub class: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCardFeatures {
    pub txn: CreditCardTransaction,
    pub hour_of_day: i64,
    pub day_of_week: i64,
}

/// Identity of a row for exact-duplicate detection.
pub trait RowKey {
    type Key: std::hash::Hash + Eq;

    fn row_key(&self) -> Self::Key;
}

type FraudKey = (
    (
        u64,
        Option<NaiveDateTime>,
        Option<NaiveDateTime>,
        Option<String>,
        Option<String>,
        u64,
        String,
        String,
        String,
        String,
    ),
    (u32, IpKey, u8),
);

impl RowKey for FraudTransaction {
    type Key = FraudKey;

    fn row_key(&self) -> Self::Key {
        (
            (
                self.user_id,
                self.signup_time,
                self.purchase_time,
                self.unparsed_signup_time.clone(),
                self.unparsed_purchase_time.clone(),
                float_key(self.purchase_value),
                self.device_id.clone(),
                self.source.clone(),
                self.browser.clone(),
                self.sex.clone(),
            ),
            (self.age, self.ip_address.key(), self.class),
        )
    }
}

impl RowKey for CreditCardTransaction {
    type Key = (u64, Vec<u64>, u64, u8);

    fn row_key(&self) -> Self::Key {
        (
            float_key(self.time),
            self.features.iter().copied().map(float_key).collect(),
            float_key(self.amount),
            self.class,
        )
    }
}

/// Bit pattern of a float with both zeros and every NaN folded together.
fn float_key(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn enriched_rows_round_trip_through_json() {
        let signup = NaiveDate::from_ymd_opt(2015, 2, 24).and_then(|d| d.and_hms_opt(22, 55, 49));
        let txn = FraudTransaction {
            user_id: 22_058,
            signup_time: signup,
            purchase_time: None,
            unparsed_signup_time: None,
            unparsed_purchase_time: Some("not-a-date".to_string()),
            purchase_value: 34.0,
            device_id: "QVPSPJUOCKZAR".to_string(),
            source: "SEO".to_string(),
            browser: "Chrome".to_string(),
            sex: "M".to_string(),
            age: 39,
            ip_address: IpRepr::Float(732_758_368.5),
            class: 0,
        };
        let mut enriched = EnrichedTransaction::new(txn, 732_758_368);
        enriched.country = Some("Japan".to_string());

        let json = serde_json::to_string(&enriched).unwrap();
        let back: EnrichedTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, enriched);
    }
}
