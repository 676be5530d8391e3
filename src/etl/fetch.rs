use std::fmt;

use async_trait::async_trait;
use jiff::civil::Date;
use log::{info, warn};
use thiserror::Error;

use crate::table::{PriceRow, PriceTable};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Lookback window and sampling granularity, in the provider's notation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub period: String,
    pub interval: String,
}

impl Default for HistoryRequest {
    fn default() -> Self {
        HistoryRequest {
            period: "5d".to_string(),
            interval: "1d".to_string(),
        }
    }
}

/// One session as the provider reports it.  Any field can be missing,
/// e.g. the close of a session that hasn't settled yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: Date,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

/// A source of daily price history.  `Ok(None)` means the provider had
/// nothing for this symbol.
#[async_trait]
pub trait PriceSource {
    async fn history(
        &self,
        symbol: &str,
        request: &HistoryRequest,
    ) -> Result<Option<Vec<DailyBar>>, FetchError>;
}

#[derive(Debug)]
pub enum FetchOutcome {
    Data(PriceTable),
    Empty,
    Failed(FetchError),
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Data(t) => write!(f, "{} rows", t.num_rows()),
            FetchOutcome::Empty => write!(f, "no data"),
            FetchOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Keep the closing price and tag each row with the symbol.  Bars without a
/// close are dropped, the rest are put in chronological order.
pub fn shape_history(bars: Vec<DailyBar>, symbol: &str) -> PriceTable {
    let mut rows: Vec<PriceRow> = bars
        .into_iter()
        .filter_map(|bar| {
            bar.close.map(|close| PriceRow {
                date: bar.date,
                close,
                symbol: symbol.to_string(),
            })
        })
        .collect();
    rows.sort_by_key(|r| r.date);
    PriceTable::new(rows)
}

/// Get the recent history for one symbol.  Never fails: problems are logged
/// and reported as [`FetchOutcome::Empty`] or [`FetchOutcome::Failed`].
pub async fn fetch_symbol<S: PriceSource + ?Sized>(
    source: &S,
    symbol: &str,
    request: &HistoryRequest,
) -> FetchOutcome {
    info!(
        "fetching {} history for {} at {} interval ...",
        request.period, symbol, request.interval
    );
    let bars = match source.history(symbol, request).await {
        Ok(Some(bars)) if !bars.is_empty() => bars,
        Ok(_) => {
            warn!("no data returned for {}", symbol);
            return FetchOutcome::Empty;
        }
        Err(e) => {
            warn!("failed to fetch data for {}: {}", symbol, e);
            return FetchOutcome::Failed(e);
        }
    };
    let table = shape_history(bars, symbol);
    if table.is_empty() {
        warn!("no closing prices returned for {}", symbol);
        return FetchOutcome::Empty;
    }
    FetchOutcome::Data(table)
}
