//! Loading, validating, splitting and writing labelled expense CSV files.
//!
//! Every file handled here has a header row with a `description` and a
//! `category` column. Raw files carry category names; the train/test splits
//! carry the integer codes produced by the [`LabelEncoder`](crate::LabelEncoder).

use std::fs::{self, OpenOptions};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::artifacts::write_atomic;
use crate::classifier::ClassifierError;

pub const DESCRIPTION_COLUMN: &str = "description";
pub const CATEGORY_COLUMN: &str = "category";

/// One observed purchase and the spending category it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub description: String,
    pub category: String,
}

impl ExpenseRecord {
    pub fn new(description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
        }
    }
}

/// A record whose category has been replaced by its label-encoder code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedRecord {
    pub description: String,
    pub category: usize,
}

/// Finds the positions of the required columns, failing with a message naming
/// whichever one is absent.
fn required_columns(headers: &StringRecord, path: &Path) -> Result<(usize, usize), ClassifierError> {
    let find = |name: &str| {
        headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
            ClassifierError::ValidationError(format!(
                "{:?} is missing the required column '{}' (found: {})",
                path,
                name,
                headers.iter().collect::<Vec<_>>().join(", ")
            ))
        })
    };
    Ok((find(DESCRIPTION_COLUMN)?, find(CATEGORY_COLUMN)?))
}

fn read_rows(path: &Path) -> Result<Vec<(usize, String, String)>, ClassifierError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let (desc_idx, cat_idx) = required_columns(&headers, path)?;

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        // +2: 1-indexed plus the header row
        let line = i + 2;
        let record = result.map_err(|e| {
            ClassifierError::DataError(format!("Failed to parse CSV line {} in {:?}: {}", line, path, e))
        })?;
        let description = record.get(desc_idx).unwrap_or("").trim().to_string();
        let category = record.get(cat_idx).unwrap_or("").trim().to_string();
        if description.is_empty() {
            return Err(ClassifierError::ValidationError(format!(
                "Empty description on line {} of {:?}", line, path
            )));
        }
        if category.is_empty() {
            return Err(ClassifierError::ValidationError(format!(
                "Empty category on line {} of {:?}", line, path
            )));
        }
        rows.push((line, description, category));
    }
    Ok(rows)
}

/// Reads labelled expenses with category names.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<ExpenseRecord>, ClassifierError> {
    let path = path.as_ref();
    let records: Vec<ExpenseRecord> = read_rows(path)?
        .into_iter()
        .map(|(_, description, category)| ExpenseRecord { description, category })
        .collect();
    info!("Loaded {} records from {:?}", records.len(), path);
    Ok(records)
}

/// Like [`load_records`], but a missing file yields an empty list.
pub fn load_records_or_empty<P: AsRef<Path>>(path: P) -> Result<Vec<ExpenseRecord>, ClassifierError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("{:?} does not exist yet, starting from an empty record set", path);
        return Ok(Vec::new());
    }
    load_records(path)
}

/// Reads a train/test split whose category column holds encoded integers.
pub fn load_encoded<P: AsRef<Path>>(path: P) -> Result<Vec<EncodedRecord>, ClassifierError> {
    let path = path.as_ref();
    read_rows(path)?
        .into_iter()
        .map(|(line, description, category)| {
            let category = category.parse::<usize>().map_err(|_| {
                ClassifierError::DataError(format!(
                    "Line {} of {:?}: category '{}' is not an encoded label",
                    line, path, category
                ))
            })?;
            Ok(EncodedRecord { description, category })
        })
        .collect()
}

fn to_csv_bytes<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, ClassifierError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record([DESCRIPTION_COLUMN, CATEGORY_COLUMN])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().map_err(|e| ClassifierError::IoError(e.into_error()))
}

pub fn write_records<P: AsRef<Path>>(path: P, records: &[ExpenseRecord]) -> Result<(), ClassifierError> {
    write_atomic(path.as_ref(), &to_csv_bytes(records)?)?;
    info!("Wrote {} records to {:?}", records.len(), path.as_ref());
    Ok(())
}

pub fn write_encoded<P: AsRef<Path>>(path: P, records: &[EncodedRecord]) -> Result<(), ClassifierError> {
    write_atomic(path.as_ref(), &to_csv_bytes(records)?)?;
    info!("Wrote {} encoded records to {:?}", records.len(), path.as_ref());
    Ok(())
}

/// Appends one record, writing the header first if the file is new or empty.
pub fn append_record<P: AsRef<Path>>(path: P, record: &ExpenseRecord) -> Result<(), ClassifierError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer.write_record([DESCRIPTION_COLUMN, CATEGORY_COLUMN])?;
    }
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

/// Rejects batches that cannot be trained on.
pub fn validate_batch(records: &[ExpenseRecord]) -> Result<(), ClassifierError> {
    if records.is_empty() {
        return Err(ClassifierError::ValidationError("Input batch is empty".into()));
    }
    if let Some(pos) = records.iter().position(|r| r.description.trim().is_empty()) {
        return Err(ClassifierError::ValidationError(format!(
            "Record {} has an empty description", pos + 1
        )));
    }
    if let Some(pos) = records.iter().position(|r| r.category.trim().is_empty()) {
        return Err(ClassifierError::ValidationError(format!(
            "Record {} has an empty category", pos + 1
        )));
    }
    Ok(())
}

/// Shuffles with a fixed seed and splits off `ceil(n * test_size)` records for testing.
///
/// Returns `(train, test)`. Both are non-empty, disjoint, and together contain
/// every input record.
pub fn train_test_split<T>(
    mut records: Vec<T>,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>), ClassifierError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ClassifierError::ValidationError(format!(
            "test_size must be between 0 and 1 (exclusive), got {}", test_size
        )));
    }
    if records.len() < 2 {
        return Err(ClassifierError::ValidationError(format!(
            "Need at least 2 records to split into train and test sets, got {}", records.len()
        )));
    }

    let n = records.len();
    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);

    let mut rng = StdRng::seed_from_u64(seed);
    records.shuffle(&mut rng);
    let test = records.split_off(n - n_test);
    debug!("Split {} records into {} train / {} test", n, records.len(), test.len());
    Ok((records, test))
}
