//! Fraud-detection data preparation.
//!
//! Current implemented scope:
//! - IP codec: dotted, numeric and missing addresses to a 32-bit integer
//! - IP range index and country resolution
//! - temporal features and the per-entity trailing window count
//! - cleaning, loading, preprocessing and class resampling for the
//!   e-commerce and credit-card datasets

mod cleaning;
mod config;
mod events;
mod geolocation;
mod ip_codec;
mod loader;
mod observability;
mod pipeline;
mod preprocess;
mod records;
mod resample;
mod temporal;

pub use cleaning::{
    coerce_timestamp, drop_duplicates, fill_missing_country, validate_columns, ColumnCheck,
    DedupReport, UNKNOWN_COUNTRY,
};
pub use config::{pipeline_config_from_env, PipelineConfig};
pub use events::{Dataset, NoopObserver, PipelineEvent, PipelineObserver, RecordingObserver};
pub use geolocation::{
    merge_country_by_ip, IpRange, MergeReport, RangeIndex, RangeIndexReport, Resolution,
    UnresolvedReason,
};
pub use ip_codec::{encode, render_dotted, IpCodecError, IpKey, IpRepr, IP_SENTINEL};
pub use loader::{
    creditcard_feature_names, load_creditcard, load_datasets, load_fraud_data, load_ip_country,
    DatasetError, Loaded, RawDatasets, CREDITCARD_COLUMNS, FRAUD_COLUMNS, IP_COUNTRY_COLUMNS,
};
pub use observability::{
    init_logging, log_pipeline_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError, TracingObserver,
};
pub use pipeline::{
    add_ip_integer, build_training_set, prepare_creditcard_transactions,
    prepare_fraud_transactions, run_creditcard_pipeline, run_fraud_pipeline, CreditCardPrepared,
    FraudPrepReport, FraudPrepared, PipelineError, TrainingSet,
};
pub use preprocess::{
    creditcard_feature_table, encode_categorical, fraud_feature_table, scale_numeric, ColumnData,
    FeatureColumn, FeatureMatrix, FeatureSchema, FeatureTable, OneHotEncoder, PreprocessError,
    StandardScaler, FEATURE_SCHEMA_VERSION, FRAUD_CATEGORICAL_COLUMNS, FRAUD_NUMERIC_COLUMNS,
};
pub use records::{
    CreditCardFeatures, CreditCardTransaction, EnrichedTransaction, FraudTransaction,
    IpRangeRecord, RowKey,
};
pub use resample::{
    resample, resample_smote, resample_undersample, ResampleError, ResampleStrategy,
    ResamplingConfig,
};
pub use temporal::{
    add_time_features_creditcard, add_time_features_fraud, elapsed_day_of_week,
    elapsed_hour_of_day, trailing_window_counts, EntityKey, TemporalConfig,
};
