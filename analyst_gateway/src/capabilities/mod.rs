//! Downstream capabilities the orchestrator dispatches to
//!
//! Each capability is an async trait so the gateway can be wired with real
//! adapters (Gemini, Finnhub, Postgres) or with the mocks at the bottom of
//! this file.

pub mod comparison;
pub mod finnhub;
pub mod gemini;
pub mod market;
pub mod news;
pub mod report;
pub mod watchlist;

pub use comparison::QuoteComparator;
pub use finnhub::FinnhubClient;
pub use gemini::{GeminiAnalyst, GeminiClient};
pub use market::{MarketData, MockMarketData};
pub use news::MarketNewsRetriever;
pub use report::MarkdownReportGenerator;
pub use watchlist::{WatchlistEntry, WatchlistRegistrar};

use crate::models::{ChartData, ReportKind, ReportPayload, ReportType};
use crate::symbols::SymbolResolver;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

//
// ================= Capability Outputs =================
//

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub chart: Option<ChartData>,
}

impl Answer {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chart: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationAck {
    /// Name as the user typed it
    pub name: String,
    pub ticker: String,
    pub already_tracked: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub text: String,
    pub chart: Option<ChartData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub payload: ReportPayload,
    pub report_type: ReportType,
}

/// A document returned by a retriever for grounding an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub title: String,
    pub source: String,
    pub snippet: String,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

//
// ================= Capability Traits =================
//

/// Free-form analyst answers
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, context: &str, use_rag: bool) -> Result<Answer>;
}

/// Adds an entity to the tracked set
#[async_trait]
pub trait EntityRegistrar: Send + Sync {
    async fn register(&self, name: &str) -> Result<RegistrationAck>;
}

/// Side-by-side analysis of one or more entities
#[async_trait]
pub trait Comparator: Send + Sync {
    async fn compare(&self, names: &[String]) -> Result<Comparison>;
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn build(&self, kind: ReportKind, content: &str) -> Result<ReportArtifact>;
}

/// Document retrieval used by answer generators when `use_rag` is set
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedDocument>>;
}

/// The set of collaborators an orchestrator is built with
#[derive(Clone)]
pub struct Capabilities {
    pub answers: Arc<dyn AnswerGenerator>,
    pub registrar: Arc<dyn EntityRegistrar>,
    pub comparator: Arc<dyn Comparator>,
    pub reports: Arc<dyn ReportGenerator>,
}

impl Capabilities {
    /// Offline collaborators, no network access
    pub fn mock() -> Self {
        Self {
            answers: Arc::new(MockAnswerGenerator),
            registrar: Arc::new(MockRegistrar::default()),
            comparator: Arc::new(MockComparator),
            reports: Arc::new(MarkdownReportGenerator::new()),
        }
    }
}

//
// ================= Mocks =================
//

/// Mock answer generator for development & testing
pub struct MockAnswerGenerator;

#[async_trait]
impl AnswerGenerator for MockAnswerGenerator {
    async fn generate(&self, query: &str, context: &str, use_rag: bool) -> Result<Answer> {
        let turns = context.lines().filter(|l| !l.trim().is_empty()).count();
        Ok(Answer::text(format!(
            "[mock analyst] {} (context turns: {}, rag: {})",
            query, turns, use_rag
        )))
    }
}

/// Mock registrar: resolves names locally and always succeeds for known ones
#[derive(Default)]
pub struct MockRegistrar {
    resolver: SymbolResolver,
}

#[async_trait]
impl EntityRegistrar for MockRegistrar {
    async fn register(&self, name: &str) -> Result<RegistrationAck> {
        let ticker = self.resolver.resolve(name).ok_or_else(|| {
            crate::error::GatewayError::Registration(format!("unknown entity: {}", name))
        })?;

        Ok(RegistrationAck {
            name: name.to_string(),
            message: format!("Now tracking {} ({}).", name, ticker),
            ticker,
            already_tracked: false,
        })
    }
}

/// Mock comparator for development & testing
pub struct MockComparator;

#[async_trait]
impl Comparator for MockComparator {
    async fn compare(&self, names: &[String]) -> Result<Comparison> {
        let mut text = String::from("| Entity |\n|--------|\n");
        for name in names {
            text.push_str(&format!("| {} |\n", name));
        }
        Ok(Comparison { text, chart: None })
    }
}
