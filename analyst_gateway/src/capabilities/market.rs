//! Market data provider interface
//!
//! Shapes follow the Finnhub v1 JSON responses so the HTTP client can
//! deserialize straight into them.

use crate::models::ChartData;
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Real-time quote. Finnhub answers unknown symbols with all-zero fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Current price
    #[serde(rename = "c", default)]
    pub current: f64,
    #[serde(rename = "d", default)]
    pub change: Option<f64>,
    #[serde(rename = "dp", default)]
    pub percent_change: Option<f64>,
    #[serde(rename = "h", default)]
    pub high: f64,
    #[serde(rename = "l", default)]
    pub low: f64,
    #[serde(rename = "o", default)]
    pub open: f64,
    #[serde(rename = "pc", default)]
    pub previous_close: f64,
}

impl Quote {
    pub fn is_empty(&self) -> bool {
        self.current == 0.0 && self.previous_close == 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub finnhub_industry: String,
    /// Millions of `currency`
    #[serde(default)]
    pub market_capitalization: f64,
    #[serde(default)]
    pub weburl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTarget {
    #[serde(default)]
    pub symbol: String,
    pub target_high: Option<f64>,
    pub target_low: Option<f64>,
    pub target_mean: Option<f64>,
    pub target_median: Option<f64>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub category: String,
    /// Unix seconds
    #[serde(default)]
    pub datetime: i64,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub related: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
}

/// Daily candles as returned by `/stock/candle`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candles {
    #[serde(default)]
    pub c: Vec<f64>,
    #[serde(default)]
    pub t: Vec<i64>,
    /// "ok" or "no_data"
    #[serde(default)]
    pub s: String,
}

impl Candles {
    pub fn into_chart(self, ticker: &str) -> Option<ChartData> {
        if self.s != "ok" {
            return None;
        }
        let len = self.c.len().min(self.t.len());
        let chart = ChartData {
            ticker: ticker.to_string(),
            t: self.t.into_iter().take(len).collect(),
            c: self.c.into_iter().take(len).collect(),
        };
        (!chart.is_empty()).then_some(chart)
    }
}

/// Stock data provider
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn quote(&self, ticker: &str) -> Result<Quote>;

    /// `None` when the provider does not know the symbol
    async fn profile(&self, ticker: &str) -> Result<Option<CompanyProfile>>;

    async fn price_target(&self, ticker: &str) -> Result<Option<PriceTarget>>;

    async fn company_news(&self, ticker: &str, from: NaiveDate, to: NaiveDate)
        -> Result<Vec<NewsItem>>;

    async fn market_news(&self) -> Result<Vec<NewsItem>>;

    /// Close prices for the last `days` days
    async fn daily_candles(&self, ticker: &str, days: u32) -> Result<Option<ChartData>>;
}

/// Fixed-data provider for development & testing
#[derive(Debug, Clone, Default)]
pub struct MockMarketData {
    quotes: HashMap<String, Quote>,
    profiles: HashMap<String, CompanyProfile>,
    targets: HashMap<String, PriceTarget>,
    news: HashMap<String, Vec<NewsItem>>,
    charts: HashMap<String, ChartData>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol with a price and (optionally) an analyst target mean
    pub fn with_symbol(mut self, ticker: &str, name: &str, price: f64, target_mean: Option<f64>) -> Self {
        self.quotes.insert(
            ticker.to_string(),
            Quote {
                current: price,
                change: Some(0.0),
                percent_change: Some(0.0),
                high: price,
                low: price,
                open: price,
                previous_close: price,
            },
        );
        self.profiles.insert(
            ticker.to_string(),
            CompanyProfile {
                name: name.to_string(),
                ticker: ticker.to_string(),
                currency: "USD".to_string(),
                ..Default::default()
            },
        );
        if target_mean.is_some() {
            self.targets.insert(
                ticker.to_string(),
                PriceTarget {
                    symbol: ticker.to_string(),
                    target_mean,
                    ..Default::default()
                },
            );
        }
        self
    }

    pub fn with_news(mut self, ticker: &str, headline: &str) -> Self {
        self.news.entry(ticker.to_string()).or_default().push(NewsItem {
            category: "company".to_string(),
            datetime: 1_700_000_000,
            headline: headline.to_string(),
            related: ticker.to_string(),
            source: "mock".to_string(),
            summary: format!("{} summary", headline),
            url: String::new(),
        });
        self
    }

    pub fn with_chart(mut self, chart: ChartData) -> Self {
        self.charts.insert(chart.ticker.clone(), chart);
        self
    }
}

#[async_trait]
impl MarketData for MockMarketData {
    async fn quote(&self, ticker: &str) -> Result<Quote> {
        Ok(self.quotes.get(ticker).cloned().unwrap_or_default())
    }

    async fn profile(&self, ticker: &str) -> Result<Option<CompanyProfile>> {
        Ok(self.profiles.get(ticker).cloned())
    }

    async fn price_target(&self, ticker: &str) -> Result<Option<PriceTarget>> {
        Ok(self.targets.get(ticker).cloned())
    }

    async fn company_news(&self, ticker: &str, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<NewsItem>> {
        Ok(self.news.get(ticker).cloned().unwrap_or_default())
    }

    async fn market_news(&self) -> Result<Vec<NewsItem>> {
        Ok(self.news.values().flatten().cloned().collect())
    }

    async fn daily_candles(&self, ticker: &str, _days: u32) -> Result<Option<ChartData>> {
        Ok(self.charts.get(ticker).cloned())
    }
}
