//! Columnar staging snapshot codec.
//!
//! One parquet file per run with an explicit non-null schema. Reads refuse
//! to infer anything: every column is looked up by name and downcast to its
//! expected arrow type, so a mistyped identity key, rating, or timestamp is
//! an error rather than a silent coercion.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, Int16Array, Int32Array, RecordBatch, StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use revin_core::ReviewRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Parquet(String),
    #[error("snapshot column {0:?} missing or mistyped")]
    Column(&'static str),
    #[error("snapshot timestamp {0} out of range")]
    Timestamp(i64),
}

pub fn snapshot_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("author", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("rating", DataType::Int16, false),
        Field::new("helpfulness_count", DataType::Int32, false),
        Field::new(
            "submitted_at",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("source_version", DataType::Utf8, false),
    ]))
}

pub fn write_snapshot(path: &Path, records: &[ReviewRecord]) -> Result<(), SnapshotError> {
    let schema = snapshot_schema();

    let ids = StringArray::from(records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>());
    let authors = StringArray::from(records.iter().map(|r| r.author.as_str()).collect::<Vec<_>>());
    let contents =
        StringArray::from(records.iter().map(|r| r.content.as_str()).collect::<Vec<_>>());
    let ratings = Int16Array::from(records.iter().map(|r| r.rating).collect::<Vec<_>>());
    let helpfulness =
        Int32Array::from(records.iter().map(|r| r.helpfulness_count).collect::<Vec<_>>());
    let submitted = TimestampMicrosecondArray::from(
        records
            .iter()
            .map(|r| r.submitted_at.and_utc().timestamp_micros())
            .collect::<Vec<_>>(),
    );
    let versions = StringArray::from(
        records
            .iter()
            .map(|r| r.source_version.as_str())
            .collect::<Vec<_>>(),
    );

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        Arc::new(authors),
        Arc::new(contents),
        Arc::new(ratings),
        Arc::new(helpfulness),
        Arc::new(submitted),
        Arc::new(versions),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| SnapshotError::Parquet(e.to_string()))?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)
        .map_err(|e| SnapshotError::Parquet(e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| SnapshotError::Parquet(e.to_string()))?;
    writer
        .close()
        .map_err(|e| SnapshotError::Parquet(e.to_string()))?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<Vec<ReviewRecord>, SnapshotError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| SnapshotError::Parquet(e.to_string()))?
        .build()
        .map_err(|e| SnapshotError::Parquet(e.to_string()))?;

    let mut records = Vec::new();

    for batch_result in reader {
        let batch = batch_result.map_err(|e| SnapshotError::Parquet(e.to_string()))?;

        let ids = string_column(&batch, "id")?;
        let authors = string_column(&batch, "author")?;
        let contents = string_column(&batch, "content")?;
        let ratings = typed_column::<Int16Array>(&batch, "rating")?;
        let helpfulness = typed_column::<Int32Array>(&batch, "helpfulness_count")?;
        let submitted = typed_column::<TimestampMicrosecondArray>(&batch, "submitted_at")?;
        let versions = string_column(&batch, "source_version")?;

        for row in 0..batch.num_rows() {
            let micros = submitted.value(row);
            let submitted_at = DateTime::from_timestamp_micros(micros)
                .ok_or(SnapshotError::Timestamp(micros))?
                .naive_utc();

            records.push(ReviewRecord {
                id: ids.value(row).to_string(),
                author: authors.value(row).to_string(),
                content: contents.value(row).to_string(),
                rating: ratings.value(row),
                helpfulness_count: helpfulness.value(row),
                submitted_at,
                source_version: versions.value(row).to_string(),
            });
        }
    }

    Ok(records)
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<&'a StringArray, SnapshotError> {
    typed_column::<StringArray>(batch, name)
}

fn typed_column<'a, T: 'static>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<&'a T, SnapshotError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<T>())
        .ok_or(SnapshotError::Column(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: &str, rating: i16) -> ReviewRecord {
        ReviewRecord {
            id: id.to_string(),
            author: "pat".to_string(),
            content: "does what it says".to_string(),
            rating,
            helpfulness_count: 7,
            submitted_at: NaiveDate::from_ymd_opt(2026, 7, 1)
                .expect("date")
                .and_hms_micro_opt(10, 30, 0, 250_000)
                .expect("time"),
            source_version: "3.1.0".to_string(),
        }
    }

    #[test]
    fn round_trips_typed_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.parquet");
        let records = vec![record("a", 5), record("b", 1)];

        write_snapshot(&path, &records).expect("write");
        let read_back = read_snapshot(&path).expect("read");

        assert_eq!(read_back, records);
    }

    #[test]
    fn rejects_snapshot_missing_a_required_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("partial.parquet");

        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Utf8, false)]));
        let ids: ArrayRef = Arc::new(StringArray::from(vec!["a"]));
        let batch = RecordBatch::try_new(schema.clone(), vec![ids]).expect("batch");
        let file = File::create(&path).expect("create");
        let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
        writer.write(&batch).expect("write");
        writer.close().expect("close");

        let err = read_snapshot(&path).expect_err("read should fail");
        assert!(matches!(err, SnapshotError::Column("author")));
    }
}
