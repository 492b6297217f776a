//! Loading of the three source tables from `.csv` files or `.zip` archives
//! holding a single CSV entry.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

use crate::{
    coerce_timestamp, validate_columns, CreditCardTransaction, Dataset, FraudTransaction,
    IpRangeRecord, IpRepr, PipelineConfig, PipelineEvent, PipelineObserver,
};

pub const FRAUD_COLUMNS: [&str; 11] = [
    "user_id",
    "signup_time",
    "purchase_time",
    "purchase_value",
    "device_id",
    "source",
    "browser",
    "sex",
    "age",
    "ip_address",
    "class",
];
pub const IP_COUNTRY_COLUMNS: [&str; 3] = [
    "lower_bound_ip_address",
    "upper_bound_ip_address",
    "country",
];
pub const CREDITCARD_COLUMNS: [&str; 3] = ["Time", "Amount", "Class"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("archive at {path} has no CSV entry")]
    MissingCsvEntry { path: PathBuf },
    #[error("{dataset} table is missing required columns: {missing:?}")]
    MissingColumns {
        dataset: &'static str,
        missing: BTreeSet<String>,
    },
    #[error("line {line}: failed to parse field {field} value '{value}'")]
    ParseField {
        line: usize,
        field: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loaded<T> {
    pub columns: Vec<String>,
    pub rows: Vec<T>,
    pub unparsable_timestamps: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDatasets {
    pub fraud: Loaded<FraudTransaction>,
    pub ip_country: Loaded<IpRangeRecord>,
    pub creditcard: Loaded<CreditCardTransaction>,
}

pub fn load_fraud_data(
    path: &Path,
    observer: &dyn PipelineObserver,
) -> Result<Loaded<FraudTransaction>, DatasetError> {
    let table = read_table(path, Dataset::Fraud, &FRAUD_COLUMNS)?;
    let mut unparsable_signup = 0usize;
    let mut unparsable_purchase = 0usize;
    let mut rows = Vec::with_capacity(table.records.len());

    for (idx, record) in table.records.iter().enumerate() {
        let row = Row::new(&table, record, idx);
        let signup_text = row.text("signup_time");
        let purchase_text = row.text("purchase_time");
        let signup_time = coerce_timestamp(signup_text);
        let purchase_time = coerce_timestamp(purchase_text);
        if signup_time.is_none() {
            unparsable_signup += 1;
        }
        if purchase_time.is_none() {
            unparsable_purchase += 1;
        }

        rows.push(FraudTransaction {
            user_id: row.parse("user_id")?,
            signup_time,
            purchase_time,
            unparsed_signup_time: signup_time.is_none().then(|| signup_text.to_string()),
            unparsed_purchase_time: purchase_time.is_none().then(|| purchase_text.to_string()),
            purchase_value: row.parse("purchase_value")?,
            device_id: row.text("device_id").to_string(),
            source: row.text("source").to_string(),
            browser: row.text("browser").to_string(),
            sex: row.text("sex").to_string(),
            age: row.whole_number("age")?,
            ip_address: IpRepr::infer(row.text("ip_address")),
            class: row.whole_number("class")?,
        });
    }

    for (column, count) in [
        ("signup_time", unparsable_signup),
        ("purchase_time", unparsable_purchase),
    ] {
        if count > 0 {
            observer.on_event(&PipelineEvent::UnparsableTimestamps {
                dataset: Dataset::Fraud,
                column: column.to_string(),
                count,
            });
        }
    }

    finish(
        Dataset::Fraud,
        table.columns,
        rows,
        unparsable_signup + unparsable_purchase,
        observer,
    )
}

pub fn load_ip_country(
    path: &Path,
    observer: &dyn PipelineObserver,
) -> Result<Loaded<IpRangeRecord>, DatasetError> {
    let table = read_table(path, Dataset::IpCountry, &IP_COUNTRY_COLUMNS)?;
    let rows = table
        .records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let row = Row::new(&table, record, idx);
            IpRangeRecord {
                lower_bound_ip_address: IpRepr::infer(row.text("lower_bound_ip_address")),
                upper_bound_ip_address: IpRepr::infer(row.text("upper_bound_ip_address")),
                country: row.text("country").to_string(),
            }
        })
        .collect();

    finish(Dataset::IpCountry, table.columns, rows, 0, observer)
}

pub fn load_creditcard(
    path: &Path,
    observer: &dyn PipelineObserver,
) -> Result<Loaded<CreditCardTransaction>, DatasetError> {
    let table = read_table(path, Dataset::CreditCard, &CREDITCARD_COLUMNS)?;
    let feature_names = creditcard_feature_names(&table.columns);
    let mut rows = Vec::with_capacity(table.records.len());

    for (idx, record) in table.records.iter().enumerate() {
        let row = Row::new(&table, record, idx);
        let features = feature_names
            .iter()
            .map(|name| row.parse::<f64>(name))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(CreditCardTransaction {
            time: row.parse("Time")?,
            features,
            amount: row.parse("Amount")?,
            class: row.whole_number("Class")?,
        });
    }

    finish(Dataset::CreditCard, table.columns, rows, 0, observer)
}

/// Loads all three tables from the configured data directory.
pub fn load_datasets(
    cfg: &PipelineConfig,
    observer: &dyn PipelineObserver,
) -> Result<RawDatasets, DatasetError> {
    Ok(RawDatasets {
        fraud: load_fraud_data(&cfg.fraud_path(), observer)?,
        ip_country: load_ip_country(&cfg.ip_country_path(), observer)?,
        creditcard: load_creditcard(&cfg.creditcard_path(), observer)?,
    })
}

/// Anonymised feature columns of the credit-card table, in header order.
pub fn creditcard_feature_names(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|name| !CREDITCARD_COLUMNS.contains(&name.as_str()))
        .cloned()
        .collect()
}

struct Table {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    records: Vec<StringRecord>,
}

struct Row<'a> {
    table: &'a Table,
    record: &'a StringRecord,
    line: usize,
}

impl<'a> Row<'a> {
    fn new(table: &'a Table, record: &'a StringRecord, idx: usize) -> Self {
        // Header is line 1.
        Self {
            table,
            record,
            line: idx + 2,
        }
    }

    fn text(&self, column: &str) -> &'a str {
        self.table
            .positions
            .get(column)
            .and_then(|pos| self.record.get(*pos))
            .unwrap_or_default()
    }

    fn parse<T: std::str::FromStr>(&self, column: &str) -> Result<T, DatasetError> {
        let raw = self.text(column);
        raw.parse::<T>().map_err(|_| self.parse_error(column, raw))
    }

    /// Integer field that may have been exported as a float (`"39.0"`).
    fn whole_number<T: TryFrom<i64>>(&self, column: &str) -> Result<T, DatasetError> {
        let raw = self.text(column);
        let value = raw
            .parse::<i64>()
            .ok()
            .or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.fract() == 0.0 && v.abs() < 9.0e15)
                    .map(|v| v as i64)
            })
            .ok_or_else(|| self.parse_error(column, raw))?;
        T::try_from(value).map_err(|_| self.parse_error(column, raw))
    }

    fn parse_error(&self, column: &str, raw: &str) -> DatasetError {
        DatasetError::ParseField {
            line: self.line,
            field: column.to_string(),
            value: raw.to_string(),
        }
    }
}

fn read_table(path: &Path, dataset: Dataset, required: &[&str]) -> Result<Table, DatasetError> {
    let bytes = read_source_bytes(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(Cursor::new(bytes));

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let check = validate_columns(&columns, required);
    if !check.is_ok() {
        return Err(DatasetError::MissingColumns {
            dataset: dataset.as_str(),
            missing: check.missing,
        });
    }

    let positions = columns
        .iter()
        .enumerate()
        .map(|(pos, name)| (name.clone(), pos))
        .collect();
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;

    debug!(
        component = "loader",
        event = "dataset.load.read",
        dataset = dataset.as_str(),
        path = %path.display(),
        records = records.len()
    );

    Ok(Table {
        columns,
        positions,
        records,
    })
}

fn read_source_bytes(path: &Path) -> Result<Vec<u8>, DatasetError> {
    let is_zip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if !is_zip {
        return Ok(fs::read(path)?);
    }

    let file = fs::File::open(path)?;
    let mut zip = ZipArchive::new(file)?;
    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".csv") {
            continue;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        return Ok(buf);
    }

    Err(DatasetError::MissingCsvEntry {
        path: path.to_path_buf(),
    })
}

fn finish<T>(
    dataset: Dataset,
    columns: Vec<String>,
    rows: Vec<T>,
    unparsable_timestamps: usize,
    observer: &dyn PipelineObserver,
) -> Result<Loaded<T>, DatasetError> {
    observer.on_event(&PipelineEvent::RowsLoaded {
        dataset,
        rows: rows.len(),
        columns: columns.len(),
    });
    Ok(Loaded {
        columns,
        rows,
        unparsable_timestamps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoopObserver, RecordingObserver};
    use std::io::Write;
    use tempfile::tempdir;

    const FRAUD_CSV: &str = "user_id,signup_time,purchase_time,purchase_value,device_id,source,browser,sex,age,ip_address,class\n\
22058,2015-02-24 22:55:49,2015-04-18 02:47:11,34,QVPSPJUOCKZAR,SEO,Chrome,M,39,732758368.79972,0\n\
333320,2015-06-07 20:39:50,not-a-date,16,EOGFQPIZPYXFZ,Ads,Chrome,F,53.0,350311387.865908,0\n";

    #[test]
    fn fraud_rows_parse_with_lenient_timestamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Fraud_Data.csv");
        fs::write(&path, FRAUD_CSV).unwrap();

        let observer = RecordingObserver::new();
        let loaded = load_fraud_data(&path, &observer).unwrap();

        assert_eq!(loaded.rows.len(), 2);
        assert_eq!(loaded.unparsable_timestamps, 1);
        assert_eq!(loaded.rows[0].user_id, 22_058);
        assert_eq!(loaded.rows[0].ip_address, IpRepr::Float(732_758_368.79972));
        assert_eq!(loaded.rows[1].age, 53);
        assert!(loaded.rows[1].purchase_time.is_none());
        assert_eq!(loaded.rows[1].unparsed_purchase_time.as_deref(), Some("not-a-date"));
        assert_eq!(loaded.rows[1].unparsed_signup_time, None);
        assert_eq!(loaded.rows[0].unparsed_purchase_time, None);
        assert_eq!(
            observer.names(),
            vec!["dataset.load.unparsable_timestamps", "dataset.load.finish"]
        );
    }

    #[test]
    fn missing_columns_abort_before_parsing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip.csv");
        fs::write(&path, "lower_bound_ip_address,country\n1,X\n").unwrap();

        let err = load_ip_country(&path, &NoopObserver).unwrap_err();
        match err {
            DatasetError::MissingColumns { dataset, missing } => {
                assert_eq!(dataset, "ip_country");
                assert_eq!(
                    missing.into_iter().collect::<Vec<_>>(),
                    vec!["upper_bound_ip_address".to_string()]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_numeric_field_reports_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("creditcard.csv");
        fs::write(&path, "Time,V1,Amount,Class\n0,1.5,2.0,0\n1,oops,3.0,1\n").unwrap();

        let err = load_creditcard(&path, &NoopObserver).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::ParseField { line: 3, ref field, .. } if field == "V1"
        ));
    }

    #[test]
    fn zip_archives_are_read_from_first_csv_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("creditcard.zip");
        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("README.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"not data").unwrap();
        zip.start_file("creditcard.csv", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"Time,V1,V2,Amount,Class\n0,1,2,9.5,0\n86400,3,4,1.0,\"1\"\n")
            .unwrap();
        zip.finish().unwrap();

        let loaded = load_creditcard(&path, &NoopObserver).unwrap();
        assert_eq!(creditcard_feature_names(&loaded.columns), vec!["V1", "V2"]);
        assert_eq!(loaded.rows[1].features, vec![3.0, 4.0]);
        assert_eq!(loaded.rows[1].class, 1);
    }

    #[test]
    fn zip_without_csv_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.zip");
        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("notes.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"nothing").unwrap();
        zip.finish().unwrap();

        assert!(matches!(
            load_creditcard(&path, &NoopObserver).unwrap_err(),
            DatasetError::MissingCsvEntry { .. }
        ));
    }
}
