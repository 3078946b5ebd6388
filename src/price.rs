//! Best-effort USD pricing for classified tokens
//!
//! One batched lookup per run: the unique symbol set rides a single
//! comma-separated query, and results map back case-insensitively.
//! Every failure mode (missing credential, unreachable API, unknown
//! symbol, zero or negative price) degrades to "no price available";
//! downstream USD fields default to zero.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::PriceError;

/// Configuration for the price-quote API
#[derive(Debug, Clone)]
pub struct PriceConfig {
    /// API credential; absence silently disables pricing
    pub api_key: Option<String>,
    /// Quote endpoint, overridable for tests and self-hosted gateways
    pub base_url: String,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("PRICE_API_KEY").ok(),
            base_url: "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest"
                .to_string(),
        }
    }
}

/// Client for the batched symbol-quote endpoint
#[derive(Debug, Clone)]
pub struct PriceClient {
    http: reqwest::Client,
    config: PriceConfig,
}

impl PriceClient {
    /// Creates a client over the given configuration
    pub fn new(config: PriceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// USD prices for a symbol set, keyed by uppercased symbol
    ///
    /// Never fails the run: any error returns an empty map and logs.
    pub async fn usd_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        match self.fetch(symbols).await {
            Ok(prices) => prices,
            Err(PriceError::NoCredential) => {
                debug!("price lookup skipped, no API credential configured");
                HashMap::new()
            }
            Err(err) => {
                warn!(%err, "price lookup failed, USD fields will be zero");
                HashMap::new()
            }
        }
    }

    async fn fetch(&self, symbols: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(PriceError::NoCredential)?;

        let mut unique: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        unique.sort();
        unique.dedup();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let response = self
            .http
            .get(&self.config.base_url)
            .query(&[("symbol", unique.join(","))])
            .header("X-CMC_PRO_API_KEY", api_key)
            .send()
            .await
            .map_err(|e| PriceError::RequestFailed(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| PriceError::DecodeFailed(e.to_string()))?;
        parse_quotes(&body)
    }
}

/// Pulls per-symbol USD prices out of a quote response
///
/// Tolerates both object and array entries per symbol; non-positive and
/// unreadable prices count as misses, not errors.
fn parse_quotes(body: &Value) -> Result<HashMap<String, f64>, PriceError> {
    let data = body
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| PriceError::DecodeFailed("missing data section".to_string()))?;

    let mut prices = HashMap::new();
    for (symbol, entry) in data {
        // some API versions wrap each symbol's quotes in an array
        let entry = entry.as_array().and_then(|a| a.first()).unwrap_or(entry);
        let price = entry
            .get("quote")
            .and_then(|q| q.get("USD"))
            .and_then(|usd| usd.get("price"))
            .and_then(Value::as_f64);
        match price {
            Some(price) if price > 0.0 => {
                prices.insert(symbol.to_uppercase(), price);
            }
            _ => {
                debug!(symbol, "no usable price in quote response");
            }
        }
    }
    Ok(prices)
}
