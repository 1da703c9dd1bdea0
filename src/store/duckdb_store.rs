//! DuckDB-backed implementation of the data-store boundary. All database
//! work runs on blocking tasks; the pool hands out one connection per task.

use super::{Cell, ColumnDef, DataStore, ResultSet, SchemaCatalog, StoreError};
use crate::synth::QueryPlan;
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
    Int8Array, Int16Array, Int32Array, Int64Array, LargeStringArray, StringArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray, UInt8Array, UInt16Array, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::collections::BTreeMap;
use tracing::debug;

pub struct DuckDbConnectionManager {
    connection_string: String,
}

impl DuckDbConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }
}

impl ManageConnection for DuckDbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::open(&self.connection_string)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub struct DuckDbStore {
    pool: Pool<DuckDbConnectionManager>,
}

impl DuckDbStore {
    pub fn new(connection_string: String, pool_size: usize) -> Result<Self, StoreError> {
        let manager = DuckDbConnectionManager::new(connection_string);
        let pool = Pool::builder()
            .max_size(pool_size as u32)
            .build(manager)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    fn run_query(conn: &Connection, sql: &str) -> Result<ResultSet, StoreError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // Get result as an Arrow batch; names and types come from its schema.
        let arrow_batch = stmt
            .query_arrow([])
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let schema = arrow_batch.get_schema();
        let record_batches = arrow_batch.collect::<Vec<RecordBatch>>();

        let names = schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect::<Vec<String>>();

        let mut data: Vec<Vec<Cell>> = Vec::new();
        for batch in &record_batches {
            for row in 0..batch.num_rows() {
                let cells = batch
                    .columns()
                    .iter()
                    .map(|column| cell_at(column, row))
                    .collect();
                data.push(cells);
            }
        }

        Ok(ResultSet::from_rows(names, data))
    }
}

#[async_trait]
impl DataStore for DuckDbStore {
    async fn execute(&self, plan: &QueryPlan) -> Result<ResultSet, StoreError> {
        let pool = self.pool.clone();
        let sql = plan.sql.clone();
        debug!(%sql, "executing plan");

        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Connection(e.to_string()))?;
            DuckDbStore::run_query(&conn, &sql)
        })
        .await
        .map_err(|e| StoreError::Query(format!("execution task failed: {e}")))?
    }

    async fn schema(&self) -> Result<SchemaCatalog, StoreError> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Connection(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    "SELECT table_schema, table_name, column_name, data_type, is_nullable \
                     FROM information_schema.columns \
                     WHERE table_schema NOT IN ('information_schema', 'pg_catalog') \
                     ORDER BY table_schema, table_name, ordinal_position",
                )
                .map_err(|e| StoreError::Query(e.to_string()))?;

            let column_iter = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)? == "YES",
                    ))
                })
                .map_err(|e| StoreError::Query(e.to_string()))?;

            let mut objects: BTreeMap<String, Vec<ColumnDef>> = BTreeMap::new();
            for entry in column_iter.filter_map(Result::ok) {
                let (schema, table, column, data_type, nullable) = entry;
                let object = if schema == "main" {
                    table
                } else {
                    format!("{schema}.{table}")
                };
                objects.entry(object).or_default().push(ColumnDef {
                    name: column,
                    data_type,
                    nullable,
                });
            }

            Ok(SchemaCatalog { objects })
        })
        .await
        .map_err(|e| StoreError::Query(format!("schema task failed: {e}")))?
    }

    async fn distinct_values(&self, object: &str, column: &str) -> Result<Vec<String>, StoreError> {
        // identifiers come from the schema catalog, not from user input
        let sql = format!(
            "SELECT DISTINCT \"{column}\" FROM {object} WHERE \"{column}\" IS NOT NULL ORDER BY 1"
        );
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::Connection(e.to_string()))?;
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| StoreError::Query(e.to_string()))?;
            let values = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::Query(e.to_string()))?
                .filter_map(Result::ok)
                .collect();
            Ok(values)
        })
        .await
        .map_err(|e| StoreError::Query(format!("lookup task failed: {e}")))?
    }
}

/// Maps one Arrow value to a result cell. Unsupported types come back as
/// null rather than failing the whole result.
fn cell_at(column: &ArrayRef, row: usize) -> Cell {
    if column.is_null(row) {
        return Cell::Null;
    }

    macro_rules! int_cell {
        ($ty:ty) => {
            column
                .as_any()
                .downcast_ref::<$ty>()
                .map(|a| Cell::Int(a.value(row) as i64))
        };
    }

    let cell = match column.data_type() {
        DataType::Boolean => column
            .as_any()
            .downcast_ref::<BooleanArray>()
            .map(|a| Cell::Bool(a.value(row))),
        DataType::Int8 => int_cell!(Int8Array),
        DataType::Int16 => int_cell!(Int16Array),
        DataType::Int32 => int_cell!(Int32Array),
        DataType::Int64 => int_cell!(Int64Array),
        DataType::UInt8 => int_cell!(UInt8Array),
        DataType::UInt16 => int_cell!(UInt16Array),
        DataType::UInt32 => int_cell!(UInt32Array),
        DataType::UInt64 => int_cell!(UInt64Array),
        DataType::Float32 => column
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| Cell::Float(f64::from(a.value(row)))),
        DataType::Float64 => column
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| Cell::Float(a.value(row))),
        // DECIMAL and HUGEINT both arrive as Decimal128
        DataType::Decimal128(_, _) => column
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .map(|a| Cell::Float(a.value_as_string(row).parse().unwrap_or(f64::NAN))),
        DataType::Utf8 => column
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| Cell::Text(a.value(row).to_string())),
        DataType::LargeUtf8 => column
            .as_any()
            .downcast_ref::<LargeStringArray>()
            .map(|a| Cell::Text(a.value(row).to_string())),
        DataType::Date32 => column
            .as_any()
            .downcast_ref::<Date32Array>()
            .map(|a| Cell::Temporal(format_date(a.value(row)))),
        DataType::Timestamp(unit, _) => timestamp_micros(column, *unit, row)
            .map(|micros| Cell::Temporal(format_micros(micros))),
        _ => None,
    };
    cell.unwrap_or(Cell::Null)
}

fn timestamp_micros(column: &ArrayRef, unit: TimeUnit, row: usize) -> Option<i64> {
    match unit {
        TimeUnit::Second => column
            .as_any()
            .downcast_ref::<TimestampSecondArray>()
            .map(|a| a.value(row).saturating_mul(1_000_000)),
        TimeUnit::Millisecond => column
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .map(|a| a.value(row).saturating_mul(1_000)),
        TimeUnit::Microsecond => column
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .map(|a| a.value(row)),
        TimeUnit::Nanosecond => column
            .as_any()
            .downcast_ref::<TimestampNanosecondArray>()
            .map(|a| a.value(row) / 1_000),
    }
}

fn format_micros(micros: i64) -> String {
    chrono::DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.naive_utc().to_string())
        .unwrap_or_else(|| micros.to_string())
}

fn format_date(days: i32) -> String {
    chrono::DateTime::from_timestamp(i64::from(days) * 86_400, 0)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|| days.to_string())
}
