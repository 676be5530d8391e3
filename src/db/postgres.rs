use async_trait::async_trait;
use log::{debug, info, warn};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Postgres, QueryBuilder,
};

use super::{column_names, create_table_sql, qualified_name, quote_ident, DbError, Sink, COLUMN_TYPES};
use crate::{
    config::DbConfig,
    table::{PriceRow, PriceTable},
};

/// Most bind parameters Postgres accepts in one statement.
pub const MAX_BIND_PARAMS: usize = 65535;

pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Open a small pool.  Connections are checked before they are handed out.
    pub async fn connect(config: &DbConfig) -> Result<PostgresSink, DbError> {
        info!("connecting to {} ...", config);
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .test_before_acquire(true)
            .connect_with(options)
            .await?;
        Ok(PostgresSink { pool })
    }
}

/// Rows per `INSERT` so that a statement stays under [`MAX_BIND_PARAMS`].
pub fn rows_per_statement(batch_size: usize, num_columns: usize) -> usize {
    let limit = (MAX_BIND_PARAMS / num_columns.max(1)).max(1);
    batch_size.clamp(1, limit)
}

/// Build one multi-row `INSERT` for a batch of rows.  Values are bound as
/// parameters and cast to the column type.
pub fn insert_batch<'a>(
    target: &str,
    columns: &[String],
    rows: &'a [PriceRow],
) -> QueryBuilder<'a, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        target,
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    let [date_t, close_t, symbol_t] = COLUMN_TYPES;
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.date.to_string())
            .push_unseparated(format!("::{}", date_t));
        b.push_bind(row.close)
            .push_unseparated(format!("::{}", close_t));
        b.push_bind(row.symbol.as_str())
            .push_unseparated(format!("::{}", symbol_t));
    });
    builder
}

#[async_trait]
impl Sink for PostgresSink {
    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
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
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", target))
            .execute(&self.pool)
            .await?;
        sqlx::query(&create_table_sql(schema, table, data))
            .execute(&self.pool)
            .await?;

        let columns = column_names(data);
        let chunk_size = rows_per_statement(batch_size, columns.len());
        if chunk_size != batch_size {
            warn!(
                "batch size {} doesn't fit in one statement, using {} rows",
                batch_size, chunk_size
            );
        }
        let mut inserted = 0;
        for chunk in data.rows().chunks(chunk_size) {
            let mut builder = insert_batch(&target, &columns, chunk);
            let res = builder.build().execute(&self.pool).await?;
            inserted += res.rows_affected() as usize;
            debug!("inserted {} rows into {}", inserted, target);
        }
        Ok(inserted)
    }
}
