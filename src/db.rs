pub mod local_duckdb;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::table::PriceTable;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Where the final table goes.
#[async_trait]
pub trait Sink {
    /// Cheap round trip to check the database is reachable.
    async fn ping(&self) -> Result<(), DbError>;

    /// Drop `schema.table`, recreate it with the header of `data` and insert
    /// all the rows, `batch_size` rows per statement.  The batches don't share
    /// a transaction.  Returns the number of rows inserted.
    async fn replace_table(
        &self,
        schema: &str,
        table: &str,
        data: &PriceTable,
        batch_size: usize,
    ) -> Result<usize, DbError>;
}

#[async_trait]
impl<T: Sink + Send + Sync + ?Sized> Sink for Box<T> {
    async fn ping(&self) -> Result<(), DbError> {
        (**self).ping().await
    }

    async fn replace_table(
        &self,
        schema: &str,
        table: &str,
        data: &PriceTable,
        batch_size: usize,
    ) -> Result<usize, DbError> {
        (**self).replace_table(schema, table, data, batch_size).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Date,
    Double,
    Text,
}

/// Column types of the date, close and symbol columns.
pub const COLUMN_TYPES: [SqlType; 3] = [SqlType::Date, SqlType::Double, SqlType::Text];

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Date => write!(f, "DATE"),
            SqlType::Double => write!(f, "DOUBLE PRECISION"),
            SqlType::Text => write!(f, "TEXT"),
        }
    }
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Column names of `data`, as they go in the database.
pub fn column_names(data: &PriceTable) -> Vec<String> {
    data.header().iter().map(|l| l.to_string()).collect()
}

pub fn create_table_sql(schema: &str, table: &str, data: &PriceTable) -> String {
    let columns = column_names(data)
        .iter()
        .zip(COLUMN_TYPES.iter())
        .map(|(name, t)| format!("{} {}", quote_ident(name), t))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE {} ({})",
        qualified_name(schema, table),
        columns
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::normalize::normalize;

    #[test]
    fn quoting() {
        assert_eq!(qualified_name("public", "commodities"), r#""public"."commodities""#);
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn create_statement() {
        let data = normalize(PriceTable::new(vec![])).unwrap();
        assert_eq!(
            create_table_sql("public", "commodities", &data),
            r#"CREATE TABLE "public"."commodities" ("date" DATE, "close" DOUBLE PRECISION, "symbol" TEXT)"#
        );
    }
}
