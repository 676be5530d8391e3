use log::info;

use super::{
    fetch::{fetch_symbol, FetchOutcome, HistoryRequest, PriceSource},
    EtlError,
};
use crate::table::PriceTable;

/// Fetch every symbol, one after the other in list order, and stack the
/// results.  Symbols without data are skipped.  If none of them returned
/// anything the whole run has failed.
pub async fn fetch_all<S: PriceSource + ?Sized>(
    source: &S,
    symbols: &[String],
    request: &HistoryRequest,
) -> Result<(PriceTable, Vec<String>), EtlError> {
    let mut tables: Vec<PriceTable> = Vec::new();
    let mut loaded: Vec<String> = Vec::new();
    for symbol in symbols {
        match fetch_symbol(source, symbol, request).await {
            FetchOutcome::Data(table) => {
                info!("got {} rows for {}", table.num_rows(), symbol);
                tables.push(table);
                loaded.push(symbol.clone());
            }
            FetchOutcome::Empty | FetchOutcome::Failed(_) => {}
        }
    }
    Ok((merge(tables)?, loaded))
}

/// Concatenate the per-symbol tables in order.
pub fn merge(tables: Vec<PriceTable>) -> Result<PriceTable, EtlError> {
    let tables: Vec<PriceTable> = tables.into_iter().filter(|t| !t.is_empty()).collect();
    if tables.is_empty() {
        return Err(EtlError::NoData);
    }
    Ok(PriceTable::concat(tables)?)
}
