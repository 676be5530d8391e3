// Daily price history from the Yahoo Finance chart API.
// https://query1.finance.yahoo.com/v8/finance/chart/CL=F?range=5d&interval=1d

use async_trait::async_trait;
use jiff::{
    tz::{Offset, TimeZone},
    Timestamp,
};
use log::debug;
use serde::Deserialize;

use crate::etl::fetch::{DailyBar, FetchError, HistoryRequest, PriceSource};

pub const BASE_URL: &str = "https://query1.finance.yahoo.com";

// The API refuses requests without a browser-like user agent.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
pub struct ChartError {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    pub meta: Meta,
    pub timestamp: Option<Vec<i64>>,
    pub indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub symbol: Option<String>,
    pub exchange_timezone_name: Option<String>,
    pub gmtoffset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
    pub adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Quote {
    pub open: Option<Vec<Option<f64>>>,
    pub high: Option<Vec<Option<f64>>>,
    pub low: Option<Vec<Option<f64>>>,
    pub close: Option<Vec<Option<f64>>>,
    pub volume: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
pub struct AdjClose {
    pub adjclose: Option<Vec<Option<f64>>>,
}

pub struct YahooChart {
    client: reqwest::Client,
    base_url: String,
}

impl YahooChart {
    pub fn new() -> Result<YahooChart, reqwest::Error> {
        YahooChart::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<YahooChart, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(YahooChart {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, symbol: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.base_url, symbol)
    }

    /// Raw response body for one symbol.  Prices are not adjusted for
    /// dividends or splits, pre/post market sessions are excluded.
    pub async fn get_body(
        &self,
        symbol: &str,
        request: &HistoryRequest,
    ) -> Result<(u16, String), FetchError> {
        let resp = self
            .client
            .get(self.url(symbol))
            .query(&[
                ("range", request.period.as_str()),
                ("interval", request.interval.as_str()),
                ("includePrePost", "false"),
                ("events", "div,splits"),
            ])
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        debug!("{} returned HTTP {} ({} bytes)", symbol, status, body.len());
        Ok((status, body))
    }
}

#[async_trait]
impl PriceSource for YahooChart {
    async fn history(
        &self,
        symbol: &str,
        request: &HistoryRequest,
    ) -> Result<Option<Vec<DailyBar>>, FetchError> {
        let (status, body) = self.get_body(symbol, request).await?;
        parse_chart(status, &body)
    }
}

/// The chart API reports unknown or delisted symbols as a "Not Found" error.
fn is_no_data(error: &ChartError) -> bool {
    error.code == "Not Found" || error.description.to_lowercase().contains("no data found")
}

/// One bar per timestamp, dated in the exchange's time zone.
/// Returns `None` when the provider has no data for the symbol.
pub fn parse_chart(status: u16, body: &str) -> Result<Option<Vec<DailyBar>>, FetchError> {
    let response: ChartResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(_) if !(200..300).contains(&status) => {
            return Err(FetchError::Status {
                status,
                body: body.chars().take(200).collect(),
            })
        }
        Err(e) => return Err(FetchError::Malformed(e.to_string())),
    };
    if let Some(error) = response.chart.error {
        if is_no_data(&error) {
            return Ok(None);
        }
        return Err(FetchError::Provider {
            code: error.code,
            description: error.description,
        });
    }
    if !(200..300).contains(&status) {
        return Err(FetchError::Status {
            status,
            body: body.chars().take(200).collect(),
        });
    }
    let result = match response.chart.result.and_then(|rs| rs.into_iter().next()) {
        Some(r) => r,
        None => return Ok(None),
    };
    let timestamps = match result.timestamp {
        Some(ts) if !ts.is_empty() => ts,
        _ => return Ok(None),
    };
    let n = timestamps.len();

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .and_then(|a| a.adjclose);
    let series = |values: Option<Vec<Option<f64>>>| -> Result<Vec<Option<f64>>, FetchError> {
        let values = values.unwrap_or_else(|| vec![None; n]);
        if values.len() != n {
            return Err(FetchError::Malformed(format!(
                "expected {} values, got {}",
                n,
                values.len()
            )));
        }
        Ok(values)
    };
    let open = series(quote.open)?;
    let high = series(quote.high)?;
    let low = series(quote.low)?;
    let close = series(quote.close)?;
    let volume = series(quote.volume)?;
    // Unadjusted request: without an adjclose series the close is used.
    let adj_close = match adjclose {
        Some(v) => series(Some(v))?,
        None => close.clone(),
    };

    let tz = exchange_tz(&result.meta);
    let mut bars = Vec::with_capacity(n);
    for (i, ts) in timestamps.into_iter().enumerate() {
        let date = Timestamp::from_second(ts)
            .map_err(|e| FetchError::Malformed(format!("bad timestamp {}: {}", ts, e)))?
            .to_zoned(tz.clone())
            .date();
        bars.push(DailyBar {
            date,
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            adj_close: adj_close[i],
            volume: volume[i].map(|v| v.round() as i64),
        });
    }
    Ok(Some(bars))
}

fn exchange_tz(meta: &Meta) -> TimeZone {
    if let Some(name) = &meta.exchange_timezone_name {
        if let Ok(tz) = TimeZone::get(name) {
            return tz;
        }
    }
    meta.gmtoffset
        .and_then(|s| Offset::from_seconds(s).ok())
        .map(TimeZone::fixed)
        .unwrap_or(TimeZone::UTC)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use jiff::civil::date;

    use super::*;
    use crate::etl::fetch::{fetch_symbol, FetchOutcome};

    const CL_F: &str = r#"{"chart":{"result":[{
        "meta":{"currency":"USD","symbol":"CL=F","exchangeName":"NYM",
                "exchangeTimezoneName":"America/New_York","gmtoffset":-14400,
                "dataGranularity":"1d","range":"5d"},
        "timestamp":[1741582800,1741669200,1741755600],
        "indicators":{
            "quote":[{"open":[67.1,66.0,66.3],"high":[67.9,66.8,67.8],
                      "low":[65.5,65.2,66.0],"close":[66.03,66.25,null],
                      "volume":[231000,245000,null]}],
            "adjclose":[{"adjclose":[66.03,66.25,null]}]}}],
        "error":null}}"#;

    const NOT_FOUND: &str = r#"{"chart":{"result":null,"error":{"code":"Not Found",
        "description":"No data found, symbol may be delisted"}}}"#;

    #[test]
    fn parse_history() {
        let bars = parse_chart(200, CL_F).unwrap().unwrap();
        assert_eq!(bars.len(), 3);
        // 1741582800 is 2025-03-10 01:00 in New York
        assert_eq!(bars[0].date, date(2025, 3, 10));
        assert_eq!(bars[2].date, date(2025, 3, 12));
        assert_eq!(bars[0].close, Some(66.03));
        assert_eq!(bars[0].high, Some(67.9));
        assert_eq!(bars[0].volume, Some(231000));
        assert_eq!(bars[2].close, None);
        assert_eq!(bars[2].volume, None);
    }

    #[tokio::test]
    async fn parse_and_shape() {
        struct Canned;
        #[async_trait]
        impl PriceSource for Canned {
            async fn history(
                &self,
                _symbol: &str,
                _request: &HistoryRequest,
            ) -> Result<Option<Vec<DailyBar>>, FetchError> {
                parse_chart(200, CL_F)
            }
        }
        match fetch_symbol(&Canned, "CL=F", &HistoryRequest::default()).await {
            FetchOutcome::Data(t) => {
                assert_eq!(t.num_rows(), 2);
                assert_eq!(t.rows()[1].close, 66.25);
                assert_eq!(t.rows()[1].symbol, "CL=F");
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn unknown_symbol_is_empty() {
        assert!(parse_chart(404, NOT_FOUND).unwrap().is_none());
    }

    #[test]
    fn no_timestamps_is_empty() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"SI=F"},
            "indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse_chart(200, body).unwrap().is_none());
    }

    #[test]
    fn provider_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request",
            "description":"Invalid input - interval=7x is not supported"}}}"#;
        assert!(matches!(
            parse_chart(400, body),
            Err(FetchError::Provider { .. })
        ));
        assert!(matches!(
            parse_chart(429, "Too Many Requests"),
            Err(FetchError::Status { status: 429, .. })
        ));
        assert!(matches!(
            parse_chart(200, "<html>"),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn ragged_series_is_malformed() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"GC=F"},
            "timestamp":[1741582800,1741669200],
            "indicators":{"quote":[{"close":[2900.5]}]}}],"error":null}}"#;
        assert!(matches!(
            parse_chart(200, body),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn request_url() {
        let api = YahooChart::with_base_url("http://localhost:8080/").unwrap();
        assert_eq!(api.url("GC=F"), "http://localhost:8080/v8/finance/chart/GC=F");
    }

    #[ignore]
    #[tokio::test]
    async fn live_history() -> Result<(), Box<dyn Error>> {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .is_test(true)
            .try_init();
        let api = YahooChart::new()?;
        let t = api.history("CL=F", &HistoryRequest::default()).await?;
        println!("{:?}", t);
        assert!(t.is_some());
        Ok(())
    }
}
