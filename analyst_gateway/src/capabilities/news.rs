//! Market-news retriever
//!
//! Grounds answers in recent headlines: company news for every ticker the
//! query mentions, general market news otherwise.

use super::market::{MarketData, NewsItem};
use super::{RetrievedDocument, Retriever};
use crate::symbols::SymbolResolver;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

const SNIPPET_CHARS: usize = 400;

pub struct MarketNewsRetriever {
    market: Arc<dyn MarketData>,
    resolver: SymbolResolver,
    lookback_days: i64,
}

impl MarketNewsRetriever {
    pub fn new(market: Arc<dyn MarketData>, resolver: SymbolResolver) -> Self {
        Self {
            market,
            resolver,
            lookback_days: 7,
        }
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days.max(1);
        self
    }
}

fn to_document(item: NewsItem) -> RetrievedDocument {
    let snippet: String = item.summary.chars().take(SNIPPET_CHARS).collect();
    RetrievedDocument {
        title: item.headline,
        source: item.source,
        snippet,
        url: Some(item.url).filter(|u| !u.is_empty()),
        published_at: DateTime::<Utc>::from_timestamp(item.datetime, 0),
    }
}

#[async_trait]
impl Retriever for MarketNewsRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedDocument>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let tickers = self.resolver.resolve_mentions(query);
        if tickers.is_empty() {
            let news = self.market.market_news().await?;
            return Ok(news.into_iter().take(limit).map(to_document).collect());
        }

        let to = Utc::now().date_naive();
        let from = to - Duration::days(self.lookback_days);
        let per_ticker = (limit / tickers.len()).max(1);

        let mut documents = Vec::new();
        for ticker in &tickers {
            match self.market.company_news(ticker, from, to).await {
                Ok(news) => documents.extend(news.into_iter().take(per_ticker).map(to_document)),
                Err(e) => warn!(ticker = %ticker, "Company news unavailable: {}", e),
            }
        }
        documents.truncate(limit);

        debug!(tickers = ?tickers, documents = documents.len(), "Retrieved news");
        Ok(documents)
    }
}
