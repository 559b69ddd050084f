//! Parquet trip files -> filtered, enriched trip documents.
//!
//! The file is opened with the fixed schema check up front; rows are then
//! decoded lazily one record batch at a time. Per row, in order:
//! (a) trip_distance > 0 and total_amount > 0,
//! (b) dropoff > pickup (whole seconds),
//! (c) projection to the eight base columns,
//! (d) derived fields.
//! Nulls in any filtered column fail the filter.

use crate::app::ports::TransformerPort;
use crate::constants::*;
use crate::domain::{TripDocument, TripRecord};
use crate::error::{EtlError, Result};
use crate::metrics::transform as transform_metrics;
use crate::pipeline::schema::{self, find_field};
use arrow::array::{Array, ArrayRef, AsArray, PrimitiveArray};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use std::fs::File;
use std::ops::AddAssign;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

const DEFAULT_BATCH_SIZE: usize = 64 * 1024;
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Row counts for one transformed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub rows_read: u64,
    pub rows_kept: u64,
    /// Failed filter (a): distance or total not strictly positive.
    pub dropped_amounts: u64,
    /// Failed filter (b): dropoff not after pickup.
    pub dropped_timing: u64,
}

impl TransformStats {
    pub fn rows_dropped(&self) -> u64 {
        self.dropped_amounts + self.dropped_timing
    }
}

impl AddAssign<&TransformStats> for TransformStats {
    fn add_assign(&mut self, other: &TransformStats) {
        self.rows_read += other.rows_read;
        self.rows_kept += other.rows_kept;
        self.dropped_amounts += other.dropped_amounts;
        self.dropped_timing += other.dropped_timing;
    }
}

/// The materialized relation for one file plus timings.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub documents: Vec<TripDocument>,
    pub stats: TransformStats,
    pub read_secs: f64,
    pub transform_secs: f64,
}

pub struct ParquetTransformer {
    batch_size: usize,
}

impl Default for ParquetTransformer {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE }
    }
}

impl ParquetTransformer {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    /// Open and schema-check a file. Rows are decoded as the stream is pulled.
    pub fn open(&self, path: &Path) -> Result<TripStream> {
        let file_label = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let file = File::open(path).map_err(|e| EtlError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            EtlError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: format!("not a readable parquet file: {e}"),
            }
        })?;

        let resolved = schema::resolve(builder.schema(), &file_label)?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), resolved.projection());
        let reader = builder
            .with_projection(mask)
            .with_batch_size(self.batch_size)
            .build()
            .map_err(|e| EtlError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        debug!(file = %file_label, "Opened trip file");
        Ok(TripStream {
            reader,
            file: file_label,
            pending: Vec::new().into_iter(),
            stats: TransformStats::default(),
            done: false,
        })
    }
}

impl TransformerPort for ParquetTransformer {
    fn transform(&self, path: &Path) -> Result<TransformOutput> {
        let t_read = Instant::now();
        let mut stream = self.open(path)?;
        let read_secs = t_read.elapsed().as_secs_f64();

        let t_transform = Instant::now();
        let mut documents = Vec::new();
        for doc in stream.by_ref() {
            documents.push(doc?);
        }
        let transform_secs = t_transform.elapsed().as_secs_f64();

        let stats = stream.stats().clone();
        transform_metrics::record_rows(&stats);
        Ok(TransformOutput { documents, stats, read_secs, transform_secs })
    }
}

/// Lazy sequence of enriched trips from one file.
pub struct TripStream {
    reader: ParquetRecordBatchReader,
    file: String,
    pending: std::vec::IntoIter<TripDocument>,
    stats: TransformStats,
    done: bool,
}

impl TripStream {
    /// Counts so far; final once the stream is exhausted.
    pub fn stats(&self) -> &TransformStats {
        &self.stats
    }

    fn decode(&mut self, batch: &RecordBatch) -> Result<Vec<TripDocument>> {
        let vendor = column_as(batch, COL_VENDOR_ID, &DataType::Int64, &self.file)?;
        let pickup = column_as(batch, COL_PICKUP, &micros(), &self.file)?;
        let dropoff = column_as(batch, COL_DROPOFF, &micros(), &self.file)?;
        let distance = column_as(batch, COL_TRIP_DISTANCE, &DataType::Float64, &self.file)?;
        let pu = column_as(batch, COL_PU_LOCATION, &DataType::Int64, &self.file)?;
        let dof = column_as(batch, COL_DO_LOCATION, &DataType::Int64, &self.file)?;
        let tip = column_as(batch, COL_TIP_AMOUNT, &DataType::Float64, &self.file)?;
        let total = column_as(batch, COL_TOTAL_AMOUNT, &DataType::Float64, &self.file)?;

        let vendor = primitive::<Int64Type>(&vendor, COL_VENDOR_ID)?;
        let pickup = primitive::<TimestampMicrosecondType>(&pickup, COL_PICKUP)?;
        let dropoff = primitive::<TimestampMicrosecondType>(&dropoff, COL_DROPOFF)?;
        let distance = primitive::<Float64Type>(&distance, COL_TRIP_DISTANCE)?;
        let pu = primitive::<Int64Type>(&pu, COL_PU_LOCATION)?;
        let dof = primitive::<Int64Type>(&dof, COL_DO_LOCATION)?;
        let tip = primitive::<Float64Type>(&tip, COL_TIP_AMOUNT)?;
        let total = primitive::<Float64Type>(&total, COL_TOTAL_AMOUNT)?;

        let mut docs = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            self.stats.rows_read += 1;

            // (a)
            let (Some(trip_distance), Some(total_amount)) = (value(distance, i), value(total, i)) else {
                self.stats.dropped_amounts += 1;
                continue;
            };
            if !(trip_distance > 0.0 && total_amount > 0.0) {
                self.stats.dropped_amounts += 1;
                continue;
            }

            // (b)
            let (Some(pu_us), Some(do_us)) = (value(pickup, i), value(dropoff, i)) else {
                self.stats.dropped_timing += 1;
                continue;
            };
            if do_us.div_euclid(MICROS_PER_SECOND) <= pu_us.div_euclid(MICROS_PER_SECOND) {
                self.stats.dropped_timing += 1;
                continue;
            }
            let (Some(pickup_at), Some(dropoff_at)) = (naive(pu_us), naive(do_us)) else {
                self.stats.dropped_timing += 1;
                continue;
            };

            // (c) + (d)
            let record = TripRecord {
                vendor_id: value(vendor, i),
                pickup: pickup_at,
                dropoff: dropoff_at,
                trip_distance,
                pu_location_id: value(pu, i),
                do_location_id: value(dof, i),
                tip_amount: value(tip, i),
                total_amount,
            };
            docs.push(record.enrich()?);
            self.stats.rows_kept += 1;
        }
        Ok(docs)
    }
}

impl Iterator for TripStream {
    type Item = Result<TripDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.pending.next() {
                return Some(Ok(doc));
            }
            if self.done {
                return None;
            }
            let batch = match self.reader.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(EtlError::SourceUnavailable {
                        path: self.file.clone().into(),
                        reason: format!("failed to decode record batch: {e}"),
                    }));
                }
                Some(Ok(batch)) => batch,
            };
            match self.decode(&batch) {
                Ok(docs) => self.pending = docs.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn micros() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

/// Look up a projected column by name and cast it to the working type.
fn column_as(batch: &RecordBatch, name: &str, to: &DataType, file: &str) -> Result<ArrayRef> {
    let idx = find_field(batch.schema_ref(), name).ok_or_else(|| EtlError::Schema {
        file: file.to_string(),
        message: format!("column {name} missing from record batch"),
    })?;
    let column = batch.column(idx);
    if column.data_type() == to {
        return Ok(column.clone());
    }
    arrow::compute::cast(column.as_ref(), to).map_err(|e| EtlError::Schema {
        file: file.to_string(),
        message: format!("cannot read {name} as {to}: {e}"),
    })
}

fn primitive<'a, T: ArrowPrimitiveType>(array: &'a ArrayRef, name: &str) -> Result<&'a PrimitiveArray<T>> {
    array
        .as_primitive_opt::<T>()
        .ok_or_else(|| EtlError::Transform(format!("column {name} has unexpected layout {}", array.data_type())))
}

fn value<T: ArrowPrimitiveType>(array: &PrimitiveArray<T>, i: usize) -> Option<T::Native> {
    array.is_valid(i).then(|| array.value(i))
}

fn naive(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}
