pub mod fetch;
pub mod merge;
pub mod normalize;

use std::{fmt, future::Future};

use log::info;
use thiserror::Error;

use crate::{
    config::{ConfigError, DbConfig, DEFAULT_SCHEMA, DEFAULT_SYMBOLS, DESTINATION_TABLE},
    db::{qualified_name, DbError, Sink, DEFAULT_BATCH_SIZE},
    table::{PriceTable, TableError},
};
use fetch::{HistoryRequest, PriceSource};

#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to connect to the database: {0}")]
    Connect(DbError),
    #[error("no data was collected for any symbol")]
    NoData,
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub symbols: Vec<String>,
    pub request: HistoryRequest,
    pub schema: String,
    pub table: String,
    pub batch_size: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            request: HistoryRequest::default(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: DESTINATION_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub symbols_requested: usize,
    pub symbols_loaded: Vec<String>,
    pub rows_written: usize,
    pub destination: String,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} symbols loaded ({}), {} rows written to {}",
            self.symbols_loaded.len(),
            self.symbols_requested,
            self.symbols_loaded.join(", "),
            self.rows_written,
            self.destination
        )
    }
}

/// Fetch, merge and normalize the prices for all the symbols.
pub async fn extract<S: PriceSource + ?Sized>(
    source: &S,
    settings: &RunSettings,
) -> Result<(PriceTable, Vec<String>), EtlError> {
    let (merged, loaded) = merge::fetch_all(source, &settings.symbols, &settings.request).await?;
    Ok((normalize::normalize(merged)?, loaded))
}

/// Extract, then replace the destination table.
pub async fn run<S, W>(source: &S, sink: &W, settings: &RunSettings) -> Result<RunSummary, EtlError>
where
    S: PriceSource + ?Sized,
    W: Sink + ?Sized,
{
    let (table, loaded) = extract(source, settings).await?;
    let destination = format!("{}.{}", settings.schema, settings.table);
    info!(
        "writing {} rows to {} ...",
        table.num_rows(),
        qualified_name(&settings.schema, &settings.table)
    );
    let rows_written = sink
        .replace_table(&settings.schema, &settings.table, &table, settings.batch_size)
        .await?;
    info!("data saved to table {}", destination);
    Ok(RunSummary {
        symbols_requested: settings.symbols.len(),
        symbols_loaded: loaded,
        rows_written,
        destination,
    })
}

/// The whole daily job.  Nothing is requested from the provider and no
/// connection is opened unless the configuration loaded; nothing is
/// requested from the provider unless the database answers a ping.
/// The destination schema comes from the configuration.
pub async fn job<S, W, F, Fut>(
    config: Result<DbConfig, ConfigError>,
    source: &S,
    connect: F,
    mut settings: RunSettings,
) -> Result<RunSummary, EtlError>
where
    S: PriceSource + ?Sized,
    W: Sink,
    F: FnOnce(DbConfig) -> Fut,
    Fut: Future<Output = Result<W, DbError>>,
{
    let config = config?;
    settings.schema = config.schema.clone();
    let sink = connect(config).await.map_err(EtlError::Connect)?;
    sink.ping().await.map_err(EtlError::Connect)?;
    info!("database connection established");
    run(source, &sink, &settings).await
}
