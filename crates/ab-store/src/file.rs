//! Parquet table files.
//!
//! A table file is one Parquet file holding one table. The table name lives in
//! the Arrow schema's key-value metadata under [`META_KEY_TABLE`]; files written
//! by other tools usually lack it and then hold a single anonymous table that
//! answers to any name.
//!
//! Schema evolution is done by rewriting: the table is loaded as one Arrow
//! [`RecordBatch`], appended columns are added to that batch, and
//! [`TableMut::commit`] writes a sibling temporary file which is renamed over
//! the existing file. Columns the tool does not understand (strings, lists, ...) are
//! carried through untouched.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, ArrowPrimitiveType, AsArray, PrimitiveArray};
use arrow::buffer::{NullBuffer, ScalarBuffer};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema, UInt32Type,
    UInt64Type,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use ab_core::{
    check_append, Column, ColumnData, ColumnWriter, Error, Result, ScalarType, Table, TableMut,
};

/// Schema metadata key holding the table name.
pub const META_KEY_TABLE: &str = "addbranch.table";

/// How a table file was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; commits are refused.
    Read,
    /// Columns may be appended and committed.
    Update,
}

/// An opened Parquet table file.
#[derive(Debug)]
pub struct TableFile {
    path: PathBuf,
    mode: OpenMode,
    batch: RecordBatch,
}

impl TableFile {
    /// Open `path` read-only.
    pub fn open_for_read(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path.as_ref(), OpenMode::Read)
    }

    /// Open `path` for appending columns.
    pub fn open_for_update(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)
            .map_err(|e| Error::Storage(format!("failed to open {}: {e}", path.display())))?;
        if meta.permissions().readonly() {
            return Err(Error::Storage(format!("{} is read-only", path.display())));
        }
        Self::open(path, OpenMode::Update)
    }

    fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let batch = read_batch(path)?;
        tracing::debug!(
            path = %path.display(),
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            ?mode,
            "opened table file"
        );
        Ok(Self { path: path.to_path_buf(), mode, batch })
    }

    /// Stored table name, `None` for an anonymous table.
    pub fn table_name(&self) -> Option<&str> {
        self.batch.schema_ref().metadata().get(META_KEY_TABLE).map(String::as_str)
    }

    /// Take the table called `name` out of the file.
    pub fn table(self, name: &str) -> Result<ParquetTable> {
        match self.table_name() {
            Some(stored) if stored != name => {
                return Err(Error::TableNotFound {
                    path: self.path.display().to_string(),
                    table: name.to_string(),
                });
            }
            Some(_) => {}
            None => tracing::debug!(
                path = %self.path.display(),
                table = name,
                "file has no table name, using its only table"
            ),
        }
        Ok(ParquetTable {
            path: self.path,
            name: name.to_string(),
            mode: self.mode,
            batch: self.batch,
            pending: 0,
        })
    }
}

/// A table backed by a Parquet file.
#[derive(Debug)]
pub struct ParquetTable {
    path: PathBuf,
    name: String,
    mode: OpenMode,
    batch: RecordBatch,
    pending: usize,
}

impl ParquetTable {
    /// Current contents, appended columns included.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }
}

impl Table for ParquetTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    fn field_names(&self) -> Vec<String> {
        self.batch.schema_ref().fields().iter().map(|f| f.name().clone()).collect()
    }

    fn field_type(&self, field: &str) -> Option<ScalarType> {
        let idx = self.batch.schema_ref().index_of(field).ok()?;
        scalar_type_of(self.batch.column(idx).data_type())
    }

    fn has_field(&self, field: &str) -> bool {
        self.batch.schema_ref().index_of(field).is_ok()
    }

    fn read_column(&self, field: &str) -> Result<Column> {
        let idx = self.batch.schema_ref().index_of(field).map_err(|_| Error::MissingField {
            table: self.name.clone(),
            field: field.to_string(),
        })?;
        array_to_column(field, self.batch.column(idx))
    }
}

impl TableMut for ParquetTable {
    fn append_column(&mut self, writer: ColumnWriter) -> Result<()> {
        check_append(self, &writer)?;
        let (name, column) = writer.finish();
        let array = column_to_array(column);

        let schema = self.batch.schema();
        let mut fields: Vec<Arc<Field>> = schema.fields().iter().cloned().collect();
        fields.push(Arc::new(Field::new(&name, array.data_type().clone(), true)));
        let schema = Arc::new(Schema::new(fields).with_metadata(schema.metadata().clone()));

        let mut arrays: Vec<ArrayRef> = self.batch.columns().to_vec();
        arrays.push(array);

        self.batch = RecordBatch::try_new(schema, arrays)
            .map_err(|e| Error::Storage(format!("failed to append column '{name}': {e}")))?;
        self.pending += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.mode == OpenMode::Read {
            return Err(Error::Storage(format!(
                "table '{}' in {} was opened read-only",
                self.name,
                self.path.display()
            )));
        }
        let batch = with_table_name(&self.batch, &self.name)?;
        let tmp = temp_path(&self.path);
        if let Err(e) = write_batch(&tmp, &batch) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            Error::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        tracing::info!(
            path = %self.path.display(),
            table = %self.name,
            new_columns = self.pending,
            "committed table"
        );
        self.batch = batch;
        self.pending = 0;
        Ok(())
    }

    fn pending(&self) -> usize {
        self.pending
    }
}

/// Write `batch` as table `name` to a new Parquet file at `path`.
pub fn write_table(path: impl AsRef<Path>, name: &str, batch: &RecordBatch) -> Result<()> {
    let batch = with_table_name(batch, name)?;
    write_batch(path.as_ref(), &batch)
}

fn with_table_name(batch: &RecordBatch, name: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut metadata: HashMap<String, String> = schema.metadata().clone();
    metadata.insert(META_KEY_TABLE.to_string(), name.to_string());
    let schema = Arc::new(Schema::new(schema.fields().clone()).with_metadata(metadata));
    batch
        .clone()
        .with_schema(schema)
        .map_err(|e| Error::Storage(format!("failed to tag table '{name}': {e}")))
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{file_name}.addbranch-tmp"))
}

fn read_batch(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path)
        .map_err(|e| Error::Storage(format!("failed to open {}: {e}", path.display())))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
        Error::Storage(format!("failed to read Parquet {}: {e}", path.display()))
    })?;

    // Capture the Arrow schema (with key-value metadata) before building the reader.
    let schema = builder.schema().clone();

    let reader = builder
        .build()
        .map_err(|e| Error::Storage(format!("failed to build Parquet reader: {e}")))?;
    let batches: std::result::Result<Vec<_>, _> = reader.collect();
    let batches = batches.map_err(|e| {
        Error::Storage(format!("failed to read Parquet batches from {}: {e}", path.display()))
    })?;

    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    arrow::compute::concat_batches(&schema, &batches)
        .map_err(|e| Error::Storage(format!("failed to concat batches: {e}")))
}

fn write_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::Storage(format!("failed to create {}: {e}", path.display())))?;
    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| Error::Storage(format!("failed to create Parquet writer: {e}")))?;
    writer.write(batch).map_err(|e| Error::Storage(format!("failed to write Parquet: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::Storage(format!("failed to close Parquet writer: {e}")))?;
    Ok(())
}

fn scalar_type_of(dt: &DataType) -> Option<ScalarType> {
    match dt {
        DataType::Float32 => Some(ScalarType::F32),
        DataType::Float64 => Some(ScalarType::F64),
        DataType::Int32 => Some(ScalarType::I32),
        DataType::Int64 => Some(ScalarType::I64),
        DataType::UInt32 => Some(ScalarType::U32),
        DataType::UInt64 => Some(ScalarType::U64),
        _ => None,
    }
}

fn array_to_column(field: &str, arr: &ArrayRef) -> Result<Column> {
    let data = match arr.data_type() {
        DataType::Float32 => ColumnData::F32(arr.as_primitive::<Float32Type>().values().to_vec()),
        DataType::Float64 => ColumnData::F64(arr.as_primitive::<Float64Type>().values().to_vec()),
        DataType::Int32 => ColumnData::I32(arr.as_primitive::<Int32Type>().values().to_vec()),
        DataType::Int64 => ColumnData::I64(arr.as_primitive::<Int64Type>().values().to_vec()),
        DataType::UInt32 => ColumnData::U32(arr.as_primitive::<UInt32Type>().values().to_vec()),
        DataType::UInt64 => ColumnData::U64(arr.as_primitive::<UInt64Type>().values().to_vec()),
        other => {
            return Err(Error::UnsupportedType {
                field: field.to_string(),
                found: other.to_string(),
            });
        }
    };
    match arr.nulls() {
        Some(nulls) if arr.null_count() > 0 => Column::with_validity(data, nulls.iter().collect()),
        _ => Ok(Column::new(data)),
    }
}

fn primitive<T: ArrowPrimitiveType>(
    values: Vec<T::Native>,
    validity: Option<Vec<bool>>,
) -> ArrayRef {
    let nulls = validity.map(NullBuffer::from);
    Arc::new(PrimitiveArray::<T>::new(ScalarBuffer::from(values), nulls))
}

fn column_to_array(column: Column) -> ArrayRef {
    let (data, validity) = column.into_parts();
    match data {
        ColumnData::F32(v) => primitive::<Float32Type>(v, validity),
        ColumnData::F64(v) => primitive::<Float64Type>(v, validity),
        ColumnData::I32(v) => primitive::<Int32Type>(v, validity),
        ColumnData::I64(v) => primitive::<Int64Type>(v, validity),
        ColumnData::U32(v) => primitive::<UInt32Type>(v, validity),
        ColumnData::U64(v) => primitive::<UInt64Type>(v, validity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::Scalar;
    use arrow::array::{Float32Array, StringArray, UInt64Array};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("addbranch_store_{}_{}_{}.parquet", std::process::id(), nanos, name));
        p
    }

    fn skim_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("EventNumber", DataType::UInt64, false),
            Field::new("tauH_mass", DataType::Float32, false),
            Field::new("sample", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(UInt64Array::from(vec![100, 101, 50])),
                Arc::new(Float32Array::from(vec![120.0, 90.5, 130.25])),
                Arc::new(StringArray::from(vec!["ggF", "ggF", "TT"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_append_and_commit_roundtrip() {
        let path = tmp_path("roundtrip");
        write_table(&path, "HTauTauTree", &skim_batch()).unwrap();

        let mut t = TableFile::open_for_update(&path).unwrap().table("HTauTauTree").unwrap();
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.field_type("sample"), None);
        assert!(t.has_field("sample"));

        let mut w = t.declare_column("hbtresdnn", ScalarType::F32).unwrap();
        w.set(0, Scalar::F64(9.5)).unwrap();
        w.set(2, Scalar::F64(3.2)).unwrap();
        t.append_column(w).unwrap();
        assert_eq!(t.pending(), 1);
        t.commit().unwrap();
        assert_eq!(t.pending(), 0);

        let t = TableFile::open_for_read(&path).unwrap().table("HTauTauTree").unwrap();
        assert_eq!(
            t.field_names(),
            vec!["EventNumber", "tauH_mass", "sample", "hbtresdnn"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        let col = t.read_column("hbtresdnn").unwrap();
        assert_eq!(col.get(0), Some(Scalar::F32(9.5)));
        assert_eq!(col.get(1), None);
        assert_eq!(col.get(2), Some(Scalar::F32(3.2)));

        // Untouched columns survive the rewrite.
        let sample = t.batch().column(2).as_string::<i32>();
        assert_eq!(sample.value(2), "TT");
        let events = t.read_column("EventNumber").unwrap();
        assert_eq!(events.data(), &ColumnData::U64(vec![100, 101, 50]));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_table_name_mismatch() {
        let path = tmp_path("name");
        write_table(&path, "hbtres", &skim_batch()).unwrap();
        let f = TableFile::open_for_read(&path).unwrap();
        assert_eq!(f.table_name(), Some("hbtres"));
        assert!(matches!(f.table("evaluation"), Err(Error::TableNotFound { .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_read_only_commit_is_refused() {
        let path = tmp_path("ro");
        write_table(&path, "hbtres", &skim_batch()).unwrap();
        let mut t = TableFile::open_for_read(&path).unwrap().table("hbtres").unwrap();
        let w = t.declare_column("x", ScalarType::F64).unwrap();
        t.append_column(w).unwrap();
        assert!(matches!(t.commit(), Err(Error::Storage(_))));

        // File on disk is unchanged.
        let t = TableFile::open_for_read(&path).unwrap().table("hbtres").unwrap();
        assert!(!t.has_field("x"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_storage_error() {
        let path = tmp_path("missing");
        assert!(matches!(TableFile::open_for_read(&path), Err(Error::Storage(_))));
        assert!(matches!(TableFile::open_for_update(&path), Err(Error::Storage(_))));
    }

    #[test]
    fn test_unsupported_type_is_reported() {
        let path = tmp_path("unsupported");
        write_table(&path, "t", &skim_batch()).unwrap();
        let t = TableFile::open_for_read(&path).unwrap().table("t").unwrap();
        assert!(matches!(t.read_column("sample"), Err(Error::UnsupportedType { .. })));
        assert!(matches!(t.cursor("nope", ScalarType::F32), Err(Error::MissingField { .. })));
        let _ = std::fs::remove_file(&path);
    }
}
