//! Stage composition for both datasets.
//!
//! Every stage borrows its input snapshot and returns a new one, so
//! intermediate results can be inspected between steps.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::{
    add_time_features_creditcard, add_time_features_fraud, creditcard_feature_names,
    creditcard_feature_table, drop_duplicates, encode, encode_categorical, fill_missing_country,
    fraud_feature_table, load_creditcard, load_fraud_data, load_ip_country, merge_country_by_ip,
    resample, scale_numeric, CreditCardFeatures, CreditCardTransaction, Dataset, DatasetError,
    DedupReport, EnrichedTransaction, FeatureMatrix, FeatureSchema, FeatureTable, FraudTransaction,
    IpCodecError, IpRangeRecord, MergeReport, OneHotEncoder, PipelineConfig, PipelineObserver,
    PreprocessError, RangeIndex, RangeIndexReport, ResampleError, ResamplingConfig,
    StandardScaler, TemporalConfig, FRAUD_CATEGORICAL_COLUMNS, FRAUD_NUMERIC_COLUMNS,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("row {row}: {source}")]
    IpAddress {
        row: usize,
        #[source]
        source: IpCodecError,
    },
    #[error("ip range table: {0}")]
    RangeTable(#[source] IpCodecError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FraudPrepReport {
    pub dedup: DedupReport,
    pub ranges: RangeIndexReport,
    pub merge: MergeReport,
    pub countries_filled: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FraudPrepared {
    pub records: Vec<EnrichedTransaction>,
    pub report: FraudPrepReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditCardPrepared {
    pub records: Vec<CreditCardFeatures>,
    pub dedup: DedupReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub matrix: FeatureMatrix,
    pub schema: FeatureSchema,
    pub scaler: StandardScaler,
    pub encoder: OneHotEncoder,
    pub class_counts_before: BTreeMap<u8, usize>,
}

/// Encodes every transaction's IP. A malformed dotted address aborts with
/// its row position; everything else degrades to the sentinel.
pub fn add_ip_integer(
    records: &[FraudTransaction],
) -> Result<Vec<EnrichedTransaction>, PipelineError> {
    records
        .iter()
        .enumerate()
        .map(|(row, txn)| {
            let ip_int =
                encode(&txn.ip_address).map_err(|source| PipelineError::IpAddress { row, source })?;
            Ok(EnrichedTransaction::new(txn.clone(), ip_int))
        })
        .collect()
}

/// dedup → ip integer → country merge → "Unknown" fill → time features.
pub fn prepare_fraud_transactions(
    raw: &[FraudTransaction],
    ranges: &[IpRangeRecord],
    cfg: &TemporalConfig,
    observer: &dyn PipelineObserver,
) -> Result<FraudPrepared, PipelineError> {
    let (deduped, dedup) = drop_duplicates(raw, Dataset::Fraud, observer);
    let with_ip = add_ip_integer(&deduped)?;

    let (index, range_report) =
        RangeIndex::build(ranges, observer).map_err(PipelineError::RangeTable)?;
    let (merged, merge) = merge_country_by_ip(&with_ip, &index, observer);
    let (filled, countries_filled) = fill_missing_country(&merged, observer);
    let records = add_time_features_fraud(&filled, cfg, observer);

    Ok(FraudPrepared {
        records,
        report: FraudPrepReport {
            dedup,
            ranges: range_report,
            merge,
            countries_filled,
        },
    })
}

/// dedup → elapsed-time cycle features.
pub fn prepare_creditcard_transactions(
    raw: &[CreditCardTransaction],
    observer: &dyn PipelineObserver,
) -> CreditCardPrepared {
    let (deduped, dedup) = drop_duplicates(raw, Dataset::CreditCard, observer);
    CreditCardPrepared {
        records: add_time_features_creditcard(&deduped, observer),
        dedup,
    }
}

/// One-hot encodes `categorical`, standardises `numeric`, flattens to a
/// matrix and balances classes per `cfg`.
pub fn build_training_set(
    table: &FeatureTable,
    categorical: &[&str],
    numeric: &[&str],
    cfg: &ResamplingConfig,
    observer: &dyn PipelineObserver,
) -> Result<TrainingSet, PipelineError> {
    let (encoded, encoder) = encode_categorical(table, categorical, observer)?;
    let (scaled, scaler) = scale_numeric(&encoded, numeric, observer)?;
    let matrix = scaled.into_matrix()?;
    let class_counts_before = matrix.class_counts();
    let matrix = resample(&matrix, cfg, observer)?;

    Ok(TrainingSet {
        schema: matrix.schema(),
        matrix,
        scaler,
        encoder,
        class_counts_before,
    })
}

/// Loads the e-commerce and range tables from `cfg.data_dir` and runs them
/// through to a balanced training set.
pub fn run_fraud_pipeline(
    cfg: &PipelineConfig,
    observer: &dyn PipelineObserver,
) -> Result<(FraudPrepared, TrainingSet), PipelineError> {
    let fraud = load_fraud_data(&cfg.fraud_path(), observer)?;
    let ranges = load_ip_country(&cfg.ip_country_path(), observer)?;
    let prepared = prepare_fraud_transactions(&fraud.rows, &ranges.rows, &cfg.temporal, observer)?;

    let table = fraud_feature_table(&prepared.records);
    let training = build_training_set(
        &table,
        &FRAUD_CATEGORICAL_COLUMNS,
        &FRAUD_NUMERIC_COLUMNS,
        &cfg.resampling,
        observer,
    )?;
    Ok((prepared, training))
}

/// Credit-card counterpart of [`run_fraud_pipeline`]. Every column is
/// numeric, so nothing is encoded.
pub fn run_creditcard_pipeline(
    cfg: &PipelineConfig,
    observer: &dyn PipelineObserver,
) -> Result<(CreditCardPrepared, TrainingSet), PipelineError> {
    let raw = load_creditcard(&cfg.creditcard_path(), observer)?;
    let prepared = prepare_creditcard_transactions(&raw.rows, observer);

    let feature_names = creditcard_feature_names(&raw.columns);
    let table = creditcard_feature_table(&prepared.records, &feature_names)?;
    let numeric = table.column_names();
    let training = build_training_set(&table, &[], &numeric, &cfg.resampling, observer)?;
    Ok((prepared, training))
}
