use std::path::PathBuf;

use fraudprep::{
    fraud_feature_table, load_fraud_data, load_ip_country, prepare_fraud_transactions,
    run_fraud_pipeline, EntityKey, PipelineConfig, PipelineEvent, RecordingObserver,
    ResampleStrategy, ResamplingConfig, TemporalConfig, FRAUD_NUMERIC_COLUMNS, UNKNOWN_COUNTRY,
};
use regex::Regex;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> PipelineConfig {
    PipelineConfig {
        data_dir: fixtures_dir(),
        ..PipelineConfig::default()
    }
}

#[test]
fn fixture_loads_with_counted_timestamp_failures() {
    let observer = RecordingObserver::new();
    let loaded = load_fraud_data(&fixture_config().fraud_path(), &observer)
        .expect("fraud fixture should load");

    assert_eq!(loaded.rows.len(), 10);
    assert_eq!(loaded.unparsable_timestamps, 1);
    assert!(observer.events().contains(&PipelineEvent::UnparsableTimestamps {
        dataset: fraudprep::Dataset::Fraud,
        column: "purchase_time".to_string(),
        count: 1,
    }));
}

#[test]
fn prepared_transactions_keep_input_order_with_countries_and_windows() {
    let cfg = fixture_config();
    let observer = RecordingObserver::new();
    let fraud = load_fraud_data(&cfg.fraud_path(), &observer).expect("fraud fixture");
    let ranges = load_ip_country(&cfg.ip_country_path(), &observer).expect("range fixture");

    let prepared =
        prepare_fraud_transactions(&fraud.rows, &ranges.rows, &TemporalConfig::default(), &observer)
            .expect("fixture should prepare");

    let countries: Vec<&str> = prepared
        .records
        .iter()
        .map(|r| r.country.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(
        countries,
        vec![
            "Australia",
            "China",
            "Japan",
            UNKNOWN_COUNTRY,
            UNKNOWN_COUNTRY,
            "Japan",
            "Japan",
            UNKNOWN_COUNTRY,
            "Australia",
        ]
    );
    assert_eq!(prepared.report.dedup.removed, 1);
    assert_eq!(prepared.report.merge.matched, 6);
    assert_eq!(prepared.report.merge.missing_address, 1);
    assert_eq!(prepared.report.merge.outside_ranges, 2);
    assert_eq!(prepared.report.countries_filled, 3);
    assert_eq!(prepared.report.ranges.indexed_ranges, 4);

    let windows: Vec<Option<u32>> = prepared
        .records
        .iter()
        .map(|r| r.transactions_last_24h)
        .collect();
    assert_eq!(
        windows,
        vec![
            Some(0),
            Some(0),
            Some(0),
            Some(0),
            Some(0),
            Some(1),
            Some(1),
            None,
            Some(0),
        ]
    );

    let quick = &prepared.records[2];
    assert_eq!(quick.purchase_hour, Some(18));
    // 2015-01-01 was a Thursday.
    assert_eq!(quick.purchase_dayofweek, Some(3));
    let hours = quick.time_since_signup_hours.expect("both timestamps present");
    assert!((hours - 1.0 / 3600.0).abs() < 1e-12);

    let unparsable = &prepared.records[7];
    assert_eq!(unparsable.purchase_hour, None);
    assert_eq!(unparsable.time_since_signup_hours, None);
}

#[test]
fn device_entity_counts_match_user_counts_on_fixture() {
    let cfg = fixture_config();
    let observer = RecordingObserver::new();
    let fraud = load_fraud_data(&cfg.fraud_path(), &observer).expect("fraud fixture");
    let ranges = load_ip_country(&cfg.ip_country_path(), &observer).expect("range fixture");

    let by_device = TemporalConfig {
        entity: EntityKey::DeviceId,
        ..TemporalConfig::default()
    };
    let users = prepare_fraud_transactions(&fraud.rows, &ranges.rows, &TemporalConfig::default(), &observer)
        .expect("user window");
    let devices = prepare_fraud_transactions(&fraud.rows, &ranges.rows, &by_device, &observer)
        .expect("device window");

    let counts = |records: &[fraudprep::EnrichedTransaction]| {
        records
            .iter()
            .map(|r| r.transactions_last_24h)
            .collect::<Vec<_>>()
    };
    assert_eq!(counts(&users.records), counts(&devices.records));
}

#[test]
fn full_run_produces_balanced_encoded_matrix() {
    let observer = RecordingObserver::new();
    let (prepared, training) =
        run_fraud_pipeline(&fixture_config(), &observer).expect("fixture pipeline should run");

    assert_eq!(prepared.records.len(), 9);
    assert_eq!(training.class_counts_before.get(&0), Some(&6));
    assert_eq!(training.class_counts_before.get(&1), Some(&3));
    assert_eq!(training.matrix.class_counts().get(&0), Some(&6));
    assert_eq!(training.matrix.class_counts().get(&1), Some(&6));

    let expected_tail = [
        "source_Direct",
        "source_SEO",
        "browser_FireFox",
        "browser_IE",
        "browser_Opera",
        "browser_Safari",
        "sex_M",
        "country_China",
        "country_Japan",
        "country_Unknown",
    ];
    assert_eq!(&training.matrix.columns[..6], &FRAUD_NUMERIC_COLUMNS.map(String::from));
    assert_eq!(&training.matrix.columns[6..], &expected_tail.map(String::from));
    assert!(Regex::new("^[0-9a-f]{64}$")
        .expect("valid regex")
        .is_match(&training.schema.fingerprint));

    let names = observer.names();
    assert_eq!(names.first(), Some(&"dataset.load.unparsable_timestamps"));
    assert_eq!(names.last(), Some(&"resample.finish"));
}

#[test]
fn undersampling_run_is_reproducible() {
    let cfg = PipelineConfig {
        resampling: ResamplingConfig {
            strategy: ResampleStrategy::Undersample,
            seed: 7,
            ..ResamplingConfig::default()
        },
        ..fixture_config()
    };

    let (_, first) = run_fraud_pipeline(&cfg, &RecordingObserver::new()).expect("first run");
    let (_, second) = run_fraud_pipeline(&cfg, &RecordingObserver::new()).expect("second run");

    assert_eq!(first.matrix.len(), 6);
    assert_eq!(first.matrix.rows.len(), second.matrix.rows.len());
    for (a, b) in first.matrix.rows.iter().zip(&second.matrix.rows) {
        for (x, y) in a.iter().zip(b) {
            assert!(x == y || (x.is_nan() && y.is_nan()));
        }
    }
}

#[test]
fn feature_table_carries_nan_for_missing_timestamps() {
    let cfg = fixture_config();
    let observer = RecordingObserver::new();
    let fraud = load_fraud_data(&cfg.fraud_path(), &observer).expect("fraud fixture");
    let ranges = load_ip_country(&cfg.ip_country_path(), &observer).expect("range fixture");
    let prepared =
        prepare_fraud_transactions(&fraud.rows, &ranges.rows, &TemporalConfig::default(), &observer)
            .expect("fixture should prepare");

    let table = fraud_feature_table(&prepared.records);
    let column = table.column("purchase_hour").expect("purchase_hour column");
    match &column.data {
        fraudprep::ColumnData::Numeric(values) => {
            assert!(values[7].is_nan());
            assert_eq!(values[2], 18.0);
        }
        other => panic!("expected numeric column, got {other:?}"),
    }
}

#[test]
fn all_three_tables_load_from_the_data_dir() {
    let observer = RecordingObserver::new();
    let raw = fraudprep::load_datasets(&fixture_config(), &observer).expect("fixtures load");

    assert_eq!(raw.fraud.rows.len(), 10);
    assert_eq!(raw.ip_country.rows.len(), 4);
    assert_eq!(raw.creditcard.rows.len(), 8);
    let loaded: Vec<&str> = observer
        .names()
        .into_iter()
        .filter(|name| *name == "dataset.load.finish")
        .collect();
    assert_eq!(loaded.len(), 3);
}

#[test]
fn rows_differing_only_in_unparsable_timestamps_survive_dedup() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("Fraud_Data.csv");
    std::fs::write(
        &path,
        "user_id,signup_time,purchase_time,purchase_value,device_id,source,browser,sex,age,ip_address,class\n\
         9,2015-01-01 00:00:00,garbage-A,10,DEV,SEO,Chrome,M,30,1.0.0.5,0\n\
         9,2015-01-01 00:00:00,garbage-B,10,DEV,SEO,Chrome,M,30,1.0.0.5,0\n\
         9,2015-01-01 00:00:00,garbage-A,10,DEV,SEO,Chrome,M,30,1.0.0.5,0\n",
    )
    .expect("write fraud csv");

    let observer = RecordingObserver::new();
    let fraud = load_fraud_data(&path, &observer).expect("fraud csv loads");
    let ranges = load_ip_country(&fixture_config().ip_country_path(), &observer).expect("range fixture");
    let prepared =
        prepare_fraud_transactions(&fraud.rows, &ranges.rows, &TemporalConfig::default(), &observer)
            .expect("rows prepare");

    assert_eq!(fraud.unparsable_timestamps, 3);
    assert_eq!(prepared.report.dedup.removed, 1);
    assert_eq!(prepared.records.len(), 2);
}
