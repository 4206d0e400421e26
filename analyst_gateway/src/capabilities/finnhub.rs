//! Finnhub REST client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::market::{Candles, CompanyProfile, MarketData, NewsItem, PriceTarget, Quote};
use crate::error::GatewayError;
use crate::models::ChartData;
use crate::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

pub struct FinnhubClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        if self.api_key.is_empty() {
            return Err(GatewayError::Config("FINNHUB_API_KEY not configured".to_string()));
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "Calling Finnhub");

        let response = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!("Finnhub request failed: {}", e);
                GatewayError::MarketData(format!("Finnhub request failed for {}: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, path = %path, "Finnhub error response");
            return Err(GatewayError::MarketData(format!(
                "Finnhub returned {} for {}: {}",
                status, path, body
            )));
        }

        response.json::<T>().await.map_err(|e| {
            GatewayError::MarketData(format!("Invalid Finnhub response for {}: {}", path, e))
        })
    }
}

#[async_trait]
impl MarketData for FinnhubClient {
    async fn quote(&self, ticker: &str) -> Result<Quote> {
        self.get_json("/quote", &[("symbol", ticker.to_string())]).await
    }

    async fn profile(&self, ticker: &str) -> Result<Option<CompanyProfile>> {
        let profile: CompanyProfile = self
            .get_json("/stock/profile2", &[("symbol", ticker.to_string())])
            .await?;
        // Unknown symbols come back as `{}`.
        Ok((!profile.ticker.is_empty() || !profile.name.is_empty()).then_some(profile))
    }

    async fn price_target(&self, ticker: &str) -> Result<Option<PriceTarget>> {
        let target: PriceTarget = self
            .get_json("/stock/price-target", &[("symbol", ticker.to_string())])
            .await?;
        Ok(target.target_mean.is_some().then_some(target))
    }

    async fn company_news(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<NewsItem>> {
        self.get_json(
            "/company-news",
            &[
                ("symbol", ticker.to_string()),
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
            ],
        )
        .await
    }

    async fn market_news(&self) -> Result<Vec<NewsItem>> {
        self.get_json("/news", &[("category", "general".to_string())]).await
    }

    async fn daily_candles(&self, ticker: &str, days: u32) -> Result<Option<ChartData>> {
        let to = Utc::now().timestamp();
        let from = to - i64::from(days) * 86_400;
        let candles: Candles = self
            .get_json(
                "/stock/candle",
                &[
                    ("symbol", ticker.to_string()),
                    ("resolution", "D".to_string()),
                    ("from", from.to_string()),
                    ("to", to.to_string()),
                ],
            )
            .await?;
        Ok(candles.into_chart(ticker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = FinnhubClient::new(String::new()).unwrap();
        let err = client.quote("AAPL").await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_base_url_override() {
        let client = FinnhubClient::new("k".to_string())
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(client.base_url, "http://localhost:9000");
    }
}
