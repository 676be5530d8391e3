use std::{path::Path, process::ExitCode};

use clap::Parser;
use commodities::{
    api::yahoo_chart::YahooChart,
    config::{DbConfig, DEFAULT_SYMBOLS},
    db::{local_duckdb::LocalDuckDb, postgres::PostgresSink, DbError, Sink, DEFAULT_BATCH_SIZE},
    etl::{self, fetch::HistoryRequest, RunSettings},
};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Replace the commodities table with the latest daily closes", long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod.  Settings are read from `.env/<env>.env`
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Symbols to load, separated by ','
    #[arg(short, long, value_delimiter = ',', default_values_t = DEFAULT_SYMBOLS.map(String::from))]
    symbols: Vec<String>,

    /// Lookback window, e.g. 5d, 1mo
    #[arg(long, default_value = "5d")]
    period: String,

    /// Sampling interval, e.g. 1d, 1wk
    #[arg(long, default_value = "1d")]
    interval: String,

    /// Rows per insert statement
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Write to this DuckDB file instead of Postgres
    #[arg(long)]
    duckdb: Option<String>,

    /// Fetch and print the table, don't touch the database
    #[arg(long)]
    dry_run: bool,
}

async fn connect(duckdb: Option<String>, config: DbConfig) -> Result<Box<dyn Sink + Send + Sync>, DbError> {
    let sink: Box<dyn Sink + Send + Sync> = match duckdb {
        Some(path) => Box::new(LocalDuckDb::open(&path)?),
        None => Box::new(PostgresSink::connect(&config).await?),
    };
    Ok(sink)
}

/// Run this job once a day after the settlement prices are published.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = DbConfig::load(Path::new(env!("CARGO_MANIFEST_DIR")), &args.env);

    let settings = RunSettings {
        symbols: args.symbols.clone(),
        request: HistoryRequest {
            period: args.period.clone(),
            interval: args.interval.clone(),
        },
        batch_size: args.batch_size,
        ..RunSettings::default()
    };

    let source = match YahooChart::new() {
        Ok(source) => source,
        Err(e) => {
            error!("failed to build the http client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.dry_run {
        if let Err(e) = config {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
        return match etl::extract(&source, &settings).await {
            Ok((table, _)) => {
                println!("{}", table.to_ascii());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let duckdb = args.duckdb.clone();
    match etl::job(config, &source, |config| connect(duckdb, config), settings).await {
        Ok(summary) => {
            info!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
