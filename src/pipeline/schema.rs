//! Fixed typed schema for trip-record files.

use crate::constants::*;
use crate::error::{EtlError, Result};
use arrow::datatypes::{DataType, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Double,
    Timestamp,
    Utf8,
}

impl ColumnKind {
    /// Whether a physical Arrow type can be read as this kind.
    pub fn accepts(&self, dt: &DataType) -> bool {
        match self {
            ColumnKind::Integer | ColumnKind::Double => dt.is_numeric() || *dt == DataType::Null,
            ColumnKind::Timestamp => {
                matches!(dt, DataType::Timestamp(_, _) | DataType::Date64 | DataType::Null)
            }
            ColumnKind::Utf8 => match dt {
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => true,
                DataType::Dictionary(_, value) => {
                    matches!(value.as_ref(), DataType::Utf8 | DataType::LargeUtf8)
                }
                _ => false,
            },
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Double => "double",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::Utf8 => "string",
        }
    }
}

pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

/// The 19 columns every trip file must carry.
pub static TRIP_COLUMNS: [ColumnSpec; 19] = [
    col(COL_VENDOR_ID, ColumnKind::Integer),
    col(COL_PICKUP, ColumnKind::Timestamp),
    col(COL_DROPOFF, ColumnKind::Timestamp),
    col(COL_PASSENGER_COUNT, ColumnKind::Integer),
    col(COL_TRIP_DISTANCE, ColumnKind::Double),
    col(COL_RATECODE_ID, ColumnKind::Integer),
    col(COL_STORE_AND_FWD, ColumnKind::Utf8),
    col(COL_PU_LOCATION, ColumnKind::Integer),
    col(COL_DO_LOCATION, ColumnKind::Integer),
    col(COL_PAYMENT_TYPE, ColumnKind::Integer),
    col(COL_FARE_AMOUNT, ColumnKind::Double),
    col(COL_EXTRA, ColumnKind::Double),
    col(COL_MTA_TAX, ColumnKind::Double),
    col(COL_TIP_AMOUNT, ColumnKind::Double),
    col(COL_TOLLS_AMOUNT, ColumnKind::Double),
    col(COL_IMPROVEMENT_SURCHARGE, ColumnKind::Double),
    col(COL_TOTAL_AMOUNT, ColumnKind::Double),
    col(COL_CONGESTION_SURCHARGE, ColumnKind::Double),
    col(COL_AIRPORT_FEE, ColumnKind::Double),
];

/// Columns kept by the projection step, in output order.
pub static PROJECTED_COLUMNS: [&str; 8] = [
    COL_VENDOR_ID,
    COL_PICKUP,
    COL_DROPOFF,
    COL_TRIP_DISTANCE,
    COL_PU_LOCATION,
    COL_DO_LOCATION,
    COL_TIP_AMOUNT,
    COL_TOTAL_AMOUNT,
];

/// Case-insensitive field lookup. Published files are not consistent about
/// `Airport_fee` vs `airport_fee`.
pub fn find_field(schema: &Schema, name: &str) -> Option<usize> {
    schema
        .fields()
        .iter()
        .position(|f| f.name() == name)
        .or_else(|| {
            schema
                .fields()
                .iter()
                .position(|f| f.name().eq_ignore_ascii_case(name))
        })
}

/// Positions of the fixed columns inside a file schema.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    indices: Vec<usize>,
}

impl ResolvedSchema {
    /// Index in the file schema of a fixed column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        TRIP_COLUMNS
            .iter()
            .position(|c| c.name == name)
            .map(|i| self.indices[i])
    }

    /// File-schema indices of the projected columns.
    pub fn projection(&self) -> Vec<usize> {
        PROJECTED_COLUMNS
            .iter()
            .filter_map(|name| self.index_of(name))
            .collect()
    }
}

/// Check a file schema against the fixed columns. Extra columns are ignored.
pub fn resolve(schema: &Schema, file: &str) -> Result<ResolvedSchema> {
    let mut indices = Vec::with_capacity(TRIP_COLUMNS.len());
    let mut missing = Vec::new();
    let mut mismatched = Vec::new();

    for spec in TRIP_COLUMNS.iter() {
        match find_field(schema, spec.name) {
            Some(idx) => {
                let dt = schema.field(idx).data_type();
                if !spec.kind.accepts(dt) {
                    mismatched.push(format!("{} is {} (expected {})", spec.name, dt, spec.kind.label()));
                }
                indices.push(idx);
            }
            None => missing.push(spec.name),
        }
    }

    if !missing.is_empty() {
        return Err(EtlError::Schema {
            file: file.to_string(),
            message: format!("missing required columns: {}", missing.join(", ")),
        });
    }
    if !mismatched.is_empty() {
        return Err(EtlError::Schema {
            file: file.to_string(),
            message: format!("incompatible column types: {}", mismatched.join("; ")),
        });
    }
    Ok(ResolvedSchema { indices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    fn field_for(spec: &ColumnSpec) -> Field {
        let dt = match spec.kind {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Double => DataType::Float64,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnKind::Utf8 => DataType::Utf8,
        };
        Field::new(spec.name, dt, true)
    }

    fn full_schema() -> Vec<Field> {
        TRIP_COLUMNS.iter().map(field_for).collect()
    }

    #[test]
    fn full_schema_resolves_with_projection_of_eight() {
        let schema = Schema::new(full_schema());
        let resolved = resolve(&schema, "f.parquet").unwrap();
        assert_eq!(resolved.projection().len(), 8);
        assert_eq!(resolved.index_of(COL_TOTAL_AMOUNT), Some(16));
    }

    #[test]
    fn lower_case_airport_fee_and_extra_columns_are_fine() {
        let mut fields: Vec<Field> = full_schema()
            .into_iter()
            .map(|f| {
                if f.name() == COL_AIRPORT_FEE {
                    Field::new("airport_fee", f.data_type().clone(), true)
                } else {
                    f
                }
            })
            .collect();
        fields.push(Field::new("cbd_congestion_fee", DataType::Float64, true));
        assert!(resolve(&Schema::new(fields), "f.parquet").is_ok());
    }

    #[test]
    fn missing_column_is_schema_error() {
        let fields: Vec<Field> = full_schema()
            .into_iter()
            .filter(|f| f.name() != COL_TIP_AMOUNT)
            .collect();
        let err = resolve(&Schema::new(fields), "f.parquet").unwrap_err();
        match err {
            EtlError::Schema { message, .. } => assert!(message.contains("tip_amount")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn string_in_numeric_column_is_schema_error() {
        let fields: Vec<Field> = full_schema()
            .into_iter()
            .map(|f| {
                if f.name() == COL_TRIP_DISTANCE {
                    Field::new(COL_TRIP_DISTANCE, DataType::Utf8, true)
                } else {
                    f
                }
            })
            .collect();
        assert!(matches!(
            resolve(&Schema::new(fields), "f.parquet"),
            Err(EtlError::Schema { .. })
        ));
    }

    #[test]
    fn integer_columns_accept_floats_and_nanosecond_timestamps_are_fine() {
        let fields: Vec<Field> = full_schema()
            .into_iter()
            .map(|f| match f.name().as_str() {
                COL_PASSENGER_COUNT => Field::new(COL_PASSENGER_COUNT, DataType::Float64, true),
                COL_PICKUP => Field::new(COL_PICKUP, DataType::Timestamp(TimeUnit::Nanosecond, None), true),
                _ => f,
            })
            .collect();
        assert!(resolve(&Schema::new(fields), "f.parquet").is_ok());
    }
}
