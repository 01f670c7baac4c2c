use async_trait::async_trait;
use chrono::{DateTime, Utc};
use esg_core::{EsgScores, MarketDataProvider, PriceBar, ProviderError, ProviderSnapshot};
use serde_json::Value;
use std::time::Duration;

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SUMMARY_MODULES: &str = "price,financialData,assetProfile,esgScores";

#[derive(Clone)]
pub struct YahooFinanceClient {
    client: reqwest::Client,
    timeout: Duration,
}

/// Summary fields pulled from the quoteSummary endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryFields {
    pub market_cap: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub profit_margin: Option<f64>,
    pub sector: Option<String>,
    pub esg: Option<EsgScores>,
}

impl YahooFinanceClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, timeout }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if status.as_u16() == 404 {
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    /// Get daily bars between two instants
    pub async fn get_history(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let url = format!("{}/{}", CHART_URL, symbol);
        let json = self
            .get_json(
                &url,
                &[
                    ("period1", from.timestamp().to_string()),
                    ("period2", to.timestamp().to_string()),
                    ("interval", "1d".to_string()),
                ],
            )
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(_) => ProviderError::NotFound(symbol.to_string()),
                other => other,
            })?;

        parse_chart(symbol, &json)
    }

    /// Get market cap, profitability ratios, sector and (rarely) ESG scores
    pub async fn get_summary(&self, symbol: &str) -> Result<SummaryFields, ProviderError> {
        let url = format!("{}/{}", SUMMARY_URL, symbol);
        let json = self
            .get_json(&url, &[("modules", SUMMARY_MODULES.to_string())])
            .await?;
        parse_summary(symbol, &json)
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    async fn fetch_snapshot(
        &self,
        identifier: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ProviderSnapshot, ProviderError> {
        let bars = self.get_history(identifier, from, to).await?;

        // History proves the listing exists; summary data is best-effort
        let summary = match self.get_summary(identifier).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::debug!("Summary unavailable for {}: {}", identifier, e);
                SummaryFields::default()
            }
        };

        Ok(ProviderSnapshot {
            identifier: identifier.to_string(),
            bars,
            market_cap: summary.market_cap,
            return_on_assets: summary.return_on_assets,
            return_on_equity: summary.return_on_equity,
            profit_margin: summary.profit_margin,
            sector: summary.sector,
            esg: summary.esg,
        })
    }

    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }
}

/// Parse a chart response into bars, skipping rows with null fields.
pub fn parse_chart(symbol: &str, json: &Value) -> Result<Vec<PriceBar>, ProviderError> {
    let chart = json
        .get("chart")
        .ok_or_else(|| ProviderError::InvalidResponse("missing chart".to_string()))?;

    if let Some(description) = chart
        .get("error")
        .and_then(|e| e.get("description"))
        .and_then(|d| d.as_str())
    {
        return Err(ProviderError::NotFound(format!("{}: {}", symbol, description)));
    }

    let result = chart
        .get("result")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))?;

    // A listed-but-idle symbol has no timestamps at all
    let timestamps = match result.get("timestamp").and_then(|v| v.as_array()) {
        Some(ts) => ts,
        None => return Ok(Vec::new()),
    };

    let quotes = result
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| ProviderError::InvalidResponse("no quote data found".to_string()))?;

    let opens = series(quotes, "open")?;
    let highs = series(quotes, "high")?;
    let lows = series(quotes, "low")?;
    let closes = series(quotes, "close")?;
    let volumes = series(quotes, "volume")?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let row = (
            ts.as_i64(),
            opens.get(i).and_then(Value::as_f64),
            highs.get(i).and_then(Value::as_f64),
            lows.get(i).and_then(Value::as_f64),
            closes.get(i).and_then(Value::as_f64),
            volumes.get(i).and_then(Value::as_f64),
        );
        if let (Some(ts), Some(open), Some(high), Some(low), Some(close), Some(volume)) = row {
            let timestamp = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| ProviderError::InvalidResponse(format!("invalid timestamp {}", ts)))?;
            bars.push(PriceBar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    Ok(bars)
}

fn series<'a>(quotes: &'a Value, name: &str) -> Result<&'a Vec<Value>, ProviderError> {
    quotes
        .get(name)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse(format!("no {} series", name)))
}

fn raw_value(module: Option<&Value>, field: &str) -> Option<f64> {
    let value = module?.get(field)?;
    value
        .get("raw")
        .and_then(Value::as_f64)
        .or_else(|| value.as_f64())
}

/// Parse a quoteSummary response. Missing modules simply leave fields empty.
pub fn parse_summary(symbol: &str, json: &Value) -> Result<SummaryFields, ProviderError> {
    let result = json
        .get("quoteSummary")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))?;

    let price = result.get("price");
    let financial = result.get("financialData");
    let profile = result.get("assetProfile");
    let esg = result.get("esgScores");

    let market_cap = raw_value(price, "marketCap")
        .or_else(|| raw_value(price, "enterpriseValue"))
        .filter(|v| *v > 0.0);

    let esg = match (
        raw_value(esg, "environmentScore"),
        raw_value(esg, "socialScore"),
        raw_value(esg, "governanceScore"),
    ) {
        (Some(e), Some(s), Some(g)) => Some(EsgScores::new(e, s, g)),
        _ => None,
    };

    Ok(SummaryFields {
        market_cap,
        return_on_assets: raw_value(financial, "returnOnAssets"),
        return_on_equity: raw_value(financial, "returnOnEquity"),
        profit_margin: raw_value(financial, "profitMargins"),
        sector: profile
            .and_then(|p| p.get("sector"))
            .and_then(Value::as_str)
            .map(str::to_string),
        esg,
    })
}
