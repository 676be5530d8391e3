// Writes the table to a DuckDB file instead of Postgres.  Handy for looking
// at a run locally, and the tests use it with an in-memory database.

use async_trait::async_trait;
use duckdb::{params_from_iter, types::Value, DuckdbConnectionManager};
use itertools::Itertools;
use log::{debug, info};

use super::{column_names, create_table_sql, qualified_name, quote_ident, DbError, Sink};
use crate::table::{PriceRow, PriceTable};

const ROW_PLACEHOLDER: &str = "(CAST(? AS DATE), ?, ?)";

pub struct LocalDuckDb {
    pool: r2d2::Pool<DuckdbConnectionManager>,
}

impl LocalDuckDb {
    pub fn open(duckdb_path: &str) -> Result<LocalDuckDb, DbError> {
        info!("opening duckdb file {} ...", duckdb_path);
        LocalDuckDb::with_manager(DuckdbConnectionManager::file(duckdb_path)?)
    }

    pub fn in_memory() -> Result<LocalDuckDb, DbError> {
        LocalDuckDb::with_manager(DuckdbConnectionManager::memory()?)
    }

    fn with_manager(manager: DuckdbConnectionManager) -> Result<LocalDuckDb, DbError> {
        let pool = r2d2::Pool::builder()
            .max_size(2)
            .test_on_check_out(true)
            .build(manager)?;
        Ok(LocalDuckDb { pool })
    }

    #[cfg(test)]
    pub(crate) fn count(&self, schema: &str, table: &str) -> Result<usize, DbError> {
        let conn = self.pool.get()?;
        let n: i64 = conn.query_row(
            &format!("SELECT count(*) FROM {}", qualified_name(schema, table)),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// The given columns of `schema.table` as text, in insertion order.
    #[cfg(test)]
    pub(crate) fn dump(
        &self,
        schema: &str,
        table: &str,
        columns: &[&str],
    ) -> Result<Vec<Vec<String>>, DbError> {
        let conn = self.pool.get()?;
        let select = columns
            .iter()
            .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(c)))
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {}",
            select,
            qualified_name(schema, table)
        ))?;
        let rows = stmt.query_map([], |row| {
            (0..columns.len())
                .map(|i| row.get::<_, Option<String>>(i).map(|v| v.unwrap_or_default()))
                .collect::<Result<Vec<String>, _>>()
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn to_values(row: &PriceRow) -> [Value; 3] {
    [
        Value::Text(row.date.to_string()),
        Value::Double(row.close),
        Value::Text(row.symbol.clone()),
    ]
}

#[async_trait]
impl Sink for LocalDuckDb {
    async fn ping(&self) -> Result<(), DbError> {
        let conn = self.pool.get()?;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    async fn replace_table(
        &self,
        schema: &str,
        table: &str,
        data: &PriceTable,
        batch_size: usize,
    ) -> Result<usize, DbError> {
        let target = qualified_name(schema, table);
        let conn = self.pool.get()?;
        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {};\nDROP TABLE IF EXISTS {};\n{};",
            quote_ident(schema),
            target,
            create_table_sql(schema, table, data)
        ))?;

        let columns = column_names(data).iter().map(|c| quote_ident(c)).join(", ");
        let mut inserted = 0;
        for chunk in data.rows().chunks(batch_size.max(1)) {
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                target,
                columns,
                std::iter::repeat(ROW_PLACEHOLDER).take(chunk.len()).join(", ")
            );
            let values: Vec<Value> = chunk.iter().flat_map(to_values).collect();
            inserted += conn.execute(&sql, params_from_iter(values.iter()))?;
            debug!("inserted {} rows into {}", inserted, target);
        }
        Ok(inserted)
    }
}
