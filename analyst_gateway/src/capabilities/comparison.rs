//! Quote comparator
//!
//! Builds a markdown table of price, daily change, analyst target mean and
//! implied upside for each entity, plus a price chart for the first one.

use super::market::MarketData;
use super::{Comparator, Comparison};
use crate::error::GatewayError;
use crate::symbols::SymbolResolver;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const CHART_DAYS: u32 = 30;

#[derive(Debug, Clone)]
struct Row {
    name: String,
    ticker: String,
    price: f64,
    change_pct: Option<f64>,
    target_mean: Option<f64>,
}

impl Row {
    fn upside_pct(&self) -> Option<f64> {
        let target = self.target_mean?;
        (self.price > 0.0).then(|| (target - self.price) / self.price * 100.0)
    }
}

pub struct QuoteComparator {
    market: Arc<dyn MarketData>,
    resolver: SymbolResolver,
}

impl QuoteComparator {
    pub fn new(market: Arc<dyn MarketData>, resolver: SymbolResolver) -> Self {
        Self { market, resolver }
    }

    async fn row(&self, name: &str, ticker: &str) -> Result<Row> {
        let quote = self.market.quote(ticker).await?;
        if quote.is_empty() {
            return Err(GatewayError::MarketData(format!("no quote for {}", ticker)));
        }

        // Price targets are a premium endpoint on some plans.
        let target_mean = match self.market.price_target(ticker).await {
            Ok(target) => target.and_then(|t| t.target_mean),
            Err(e) => {
                warn!(ticker = %ticker, "Price target unavailable: {}", e);
                None
            }
        };

        Ok(Row {
            name: name.to_string(),
            ticker: ticker.to_string(),
            price: quote.current,
            change_pct: quote.percent_change,
            target_mean,
        })
    }
}

#[async_trait]
impl Comparator for QuoteComparator {
    async fn compare(&self, names: &[String]) -> Result<Comparison> {
        let mut resolved: Vec<(String, String)> = Vec::new();
        for name in names {
            let ticker = self.resolver.resolve(name).ok_or_else(|| {
                GatewayError::MarketData(format!("could not resolve '{}' to a ticker", name))
            })?;
            if !resolved.iter().any(|(_, t)| *t == ticker) {
                resolved.push((name.clone(), ticker));
            }
        }

        if resolved.is_empty() {
            return Err(GatewayError::MarketData("nothing to compare".to_string()));
        }

        let mut rows = Vec::with_capacity(resolved.len());
        for (name, ticker) in &resolved {
            rows.push(self.row(name, ticker).await?);
        }
        debug!(entities = rows.len(), "Comparison rows fetched");

        let chart = match self.market.daily_candles(&rows[0].ticker, CHART_DAYS).await {
            Ok(chart) => chart,
            Err(e) => {
                warn!(ticker = %rows[0].ticker, "Chart unavailable: {}", e);
                None
            }
        };

        Ok(Comparison {
            text: render_table(&rows),
            chart,
        })
    }
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    value
        .map(|v| format!("{:.2}{}", v, suffix))
        .unwrap_or_else(|| "—".into())
}

fn render_table(rows: &[Row]) -> String {
    let mut out = String::new();
    out.push_str("| Company | Ticker | Price | Change % | Target Mean | Upside % |\n");
    out.push_str("|---------|--------|-------|----------|-------------|----------|\n");

    for row in rows {
        out.push_str(&format!(
            "| {} | {} | {:.2} | {} | {} | {} |\n",
            row.name,
            row.ticker,
            row.price,
            fmt_opt(row.change_pct, "%"),
            fmt_opt(row.target_mean, ""),
            fmt_opt(row.upside_pct(), "%"),
        ));
    }

    let best = rows
        .iter()
        .filter_map(|r| r.upside_pct().map(|u| (r, u)))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    if rows.len() > 1 {
        if let Some((row, upside)) = best {
            out.push_str(&format!(
                "\nHighest analyst upside: **{} ({})** at {:.2}%.\n",
                row.name, row.ticker, upside
            ));
        }
    }

    out
}
