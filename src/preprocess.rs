//! Feature tables, standard scaling and one-hot encoding.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{CreditCardFeatures, EnrichedTransaction, PipelineEvent, PipelineObserver};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const FRAUD_NUMERIC_COLUMNS: [&str; 6] = [
    "purchase_value",
    "age",
    "time_since_signup_hours",
    "purchase_hour",
    "purchase_dayofweek",
    "transactions_last_24h",
];
pub const FRAUD_CATEGORICAL_COLUMNS: [&str; 4] = ["source", "browser", "sex", "country"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    /// `NaN` marks a missing value.
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Categorical(values) => values.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<FeatureColumn>,
    pub labels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub columns: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub columns: Vec<String>,
    /// Sorted categories per column; the first one is dropped on output.
    pub categories: Vec<Vec<String>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("column {0} is not numeric")]
    NotNumeric(String),
    #[error("column {0} is not categorical")]
    NotCategorical(String),
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    #[error("column {column} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("categorical columns must be encoded before building a matrix: {0:?}")]
    CategoricalColumnsRemain(Vec<String>),
}

impl FeatureTable {
    pub fn new(labels: Vec<u8>) -> Self {
        Self {
            columns: Vec::new(),
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn push_numeric(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), PreprocessError> {
        self.push(name.into(), ColumnData::Numeric(values))
    }

    pub fn push_categorical(
        &mut self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<(), PreprocessError> {
        self.push(name.into(), ColumnData::Categorical(values))
    }

    fn push(&mut self, name: String, data: ColumnData) -> Result<(), PreprocessError> {
        if self.column(&name).is_some() {
            return Err(PreprocessError::DuplicateColumn(name));
        }
        if data.len() != self.len() {
            return Err(PreprocessError::LengthMismatch {
                column: name,
                expected: self.len(),
                actual: data.len(),
            });
        }
        self.columns.push(FeatureColumn { name, data });
        Ok(())
    }

    pub fn into_matrix(self) -> Result<FeatureMatrix, PreprocessError> {
        let categorical: Vec<String> = self
            .columns
            .iter()
            .filter(|column| matches!(column.data, ColumnData::Categorical(_)))
            .map(|column| column.name.clone())
            .collect();
        if !categorical.is_empty() {
            return Err(PreprocessError::CategoricalColumnsRemain(categorical));
        }

        let mut rows = vec![Vec::with_capacity(self.columns.len()); self.len()];
        let mut names = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            if let ColumnData::Numeric(values) = column.data {
                for (row, value) in rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
            names.push(column.name);
        }

        Ok(FeatureMatrix {
            columns: names,
            rows,
            labels: self.labels,
        })
    }

    fn numeric(&self, name: &str) -> Result<&[f64], PreprocessError> {
        match self.column(name).map(|column| &column.data) {
            Some(ColumnData::Numeric(values)) => Ok(values.as_slice()),
            Some(ColumnData::Categorical(_)) => Err(PreprocessError::NotNumeric(name.to_string())),
            None => Err(PreprocessError::UnknownColumn(name.to_string())),
        }
    }

    fn categorical(&self, name: &str) -> Result<&[String], PreprocessError> {
        match self.column(name).map(|column| &column.data) {
            Some(ColumnData::Categorical(values)) => Ok(values.as_slice()),
            Some(ColumnData::Numeric(_)) => {
                Err(PreprocessError::NotCategorical(name.to_string()))
            }
            None => Err(PreprocessError::UnknownColumn(name.to_string())),
        }
    }
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn class_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema {
            version: FEATURE_SCHEMA_VERSION,
            fingerprint: schema_fingerprint(FEATURE_SCHEMA_VERSION, &self.columns),
            columns: self.columns.clone(),
        }
    }
}

impl StandardScaler {
    /// Fits per-column mean and population standard deviation, ignoring
    /// `NaN`. Constant or empty columns get scale `1`.
    pub fn fit(table: &FeatureTable, columns: &[&str]) -> Result<Self, PreprocessError> {
        let mut means = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());

        for name in columns {
            let present: Vec<f64> = table
                .numeric(name)?
                .iter()
                .copied()
                .filter(|value| !value.is_nan())
                .collect();
            if present.is_empty() {
                means.push(0.0);
                scales.push(1.0);
                continue;
            }
            let n = present.len() as f64;
            let mean = present.iter().sum::<f64>() / n;
            let variance = present
                .iter()
                .map(|value| {
                    let d = value - mean;
                    d * d
                })
                .sum::<f64>()
                / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std > 0.0 { std } else { 1.0 });
        }

        Ok(Self {
            columns: columns.iter().map(|name| name.to_string()).collect(),
            means,
            scales,
        })
    }

    pub fn transform(&self, table: &FeatureTable) -> Result<FeatureTable, PreprocessError> {
        let mut out = table.clone();
        for ((name, mean), scale) in self.columns.iter().zip(&self.means).zip(&self.scales) {
            let scaled: Vec<f64> = table
                .numeric(name)?
                .iter()
                .map(|value| (value - mean) / scale)
                .collect();
            if let Some(column) = out.columns.iter_mut().find(|column| &column.name == name) {
                column.data = ColumnData::Numeric(scaled);
            }
        }
        Ok(out)
    }
}

impl OneHotEncoder {
    pub fn fit(table: &FeatureTable, columns: &[&str]) -> Result<Self, PreprocessError> {
        let mut categories = Vec::with_capacity(columns.len());
        for name in columns {
            let distinct: BTreeSet<&str> = table
                .categorical(name)?
                .iter()
                .map(String::as_str)
                .collect();
            categories.push(distinct.into_iter().map(str::to_string).collect());
        }
        Ok(Self {
            columns: columns.iter().map(|name| name.to_string()).collect(),
            categories,
        })
    }

    /// Output column names, `"{column}_{category}"`, first category dropped.
    pub fn feature_names_out(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.categories)
            .flat_map(|(name, cats)| cats.iter().skip(1).map(move |cat| format!("{name}_{cat}")))
            .collect()
    }

    /// Removes the encoded columns and appends the indicator columns after the
    /// remaining ones. Unseen categories encode to all zeros.
    pub fn transform(&self, table: &FeatureTable) -> Result<FeatureTable, PreprocessError> {
        let mut indicators: Vec<FeatureColumn> = Vec::new();
        for (name, cats) in self.columns.iter().zip(&self.categories) {
            let values = table.categorical(name)?;
            for cat in cats.iter().skip(1) {
                indicators.push(FeatureColumn {
                    name: format!("{name}_{cat}"),
                    data: ColumnData::Numeric(
                        values
                            .iter()
                            .map(|value| if value == cat { 1.0 } else { 0.0 })
                            .collect(),
                    ),
                });
            }
        }

        let mut out = FeatureTable::new(table.labels.clone());
        for column in &table.columns {
            if !self.columns.contains(&column.name) {
                out.push(column.name.clone(), column.data.clone())?;
            }
        }
        for column in indicators {
            out.push(column.name, column.data)?;
        }
        Ok(out)
    }
}

pub fn scale_numeric(
    table: &FeatureTable,
    columns: &[&str],
    observer: &dyn PipelineObserver,
) -> Result<(FeatureTable, StandardScaler), PreprocessError> {
    let scaler = StandardScaler::fit(table, columns)?;
    let scaled = scaler.transform(table)?;
    observer.on_event(&PipelineEvent::ColumnsScaled {
        columns: scaler.columns.clone(),
    });
    Ok((scaled, scaler))
}

pub fn encode_categorical(
    table: &FeatureTable,
    columns: &[&str],
    observer: &dyn PipelineObserver,
) -> Result<(FeatureTable, OneHotEncoder), PreprocessError> {
    let encoder = OneHotEncoder::fit(table, columns)?;
    let encoded = encoder.transform(table)?;
    observer.on_event(&PipelineEvent::ColumnsEncoded {
        columns: encoder.columns.clone(),
        produced: encoder.feature_names_out().len(),
    });
    Ok((encoded, encoder))
}

pub fn fraud_feature_table(records: &[EnrichedTransaction]) -> FeatureTable {
    fn opt<T: Into<f64> + Copy>(value: Option<T>) -> f64 {
        value.map(Into::into).unwrap_or(f64::NAN)
    }

    let mut table = FeatureTable::new(records.iter().map(|r| r.txn.class).collect());
    let numeric: [(&str, Vec<f64>); 6] = [
        (
            FRAUD_NUMERIC_COLUMNS[0],
            records.iter().map(|r| r.txn.purchase_value).collect(),
        ),
        (
            FRAUD_NUMERIC_COLUMNS[1],
            records.iter().map(|r| f64::from(r.txn.age)).collect(),
        ),
        (
            FRAUD_NUMERIC_COLUMNS[2],
            records.iter().map(|r| opt(r.time_since_signup_hours)).collect(),
        ),
        (
            FRAUD_NUMERIC_COLUMNS[3],
            records.iter().map(|r| opt(r.purchase_hour)).collect(),
        ),
        (
            FRAUD_NUMERIC_COLUMNS[4],
            records.iter().map(|r| opt(r.purchase_dayofweek)).collect(),
        ),
        (
            FRAUD_NUMERIC_COLUMNS[5],
            records.iter().map(|r| opt(r.transactions_last_24h)).collect(),
        ),
    ];
    let categorical: [(&str, Vec<String>); 4] = [
        (
            FRAUD_CATEGORICAL_COLUMNS[0],
            records.iter().map(|r| r.txn.source.clone()).collect(),
        ),
        (
            FRAUD_CATEGORICAL_COLUMNS[1],
            records.iter().map(|r| r.txn.browser.clone()).collect(),
        ),
        (
            FRAUD_CATEGORICAL_COLUMNS[2],
            records.iter().map(|r| r.txn.sex.clone()).collect(),
        ),
        (
            FRAUD_CATEGORICAL_COLUMNS[3],
            records
                .iter()
                .map(|r| r.country.clone().unwrap_or_default())
                .collect(),
        ),
    ];

    for (name, values) in numeric {
        table.columns.push(FeatureColumn {
            name: name.to_string(),
            data: ColumnData::Numeric(values),
        });
    }
    for (name, values) in categorical {
        table.columns.push(FeatureColumn {
            name: name.to_string(),
            data: ColumnData::Categorical(values),
        });
    }
    table
}

/// Credit-card features in header order, then `Amount`, `hour_of_day`,
/// `day_of_week`.
pub fn creditcard_feature_table(
    records: &[CreditCardFeatures],
    feature_names: &[String],
) -> Result<FeatureTable, PreprocessError> {
    let mut table = FeatureTable::new(records.iter().map(|r| r.txn.class).collect());
    for (pos, name) in feature_names.iter().enumerate() {
        let values = records
            .iter()
            .map(|r| r.txn.features.get(pos).copied().unwrap_or(f64::NAN))
            .collect();
        table.push_numeric(name.clone(), values)?;
    }
    table.push_numeric("Amount", records.iter().map(|r| r.txn.amount).collect())?;
    table.push_numeric(
        "hour_of_day",
        records.iter().map(|r| r.hour_of_day as f64).collect(),
    )?;
    table.push_numeric(
        "day_of_week",
        records.iter().map(|r| r.day_of_week as f64).collect(),
    )?;
    Ok(table)
}

fn schema_fingerprint(version: u32, columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
