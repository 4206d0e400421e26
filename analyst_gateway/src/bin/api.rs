use analyst_gateway::{
    api::start_server,
    capabilities::{
        AnswerGenerator, Capabilities, Comparator, FinnhubClient, GeminiAnalyst, GeminiClient,
        MarketData, MarketNewsRetriever, MarkdownReportGenerator, MockAnswerGenerator,
        MockComparator, QuoteComparator, WatchlistRegistrar,
    },
    config::{GatewayConfig, ServiceConfig},
    orchestrator::Orchestrator,
    symbols::SymbolResolver,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    config.validate()?;
    let service = ServiceConfig::from_env()?;

    info!("🚀 Analyst Gateway - API Server");
    info!("📍 Port: {}", service.port);
    info!(
        strict_mode = config.strict_mode,
        max_warnings = config.max_warnings,
        rate_window_secs = config.rate_limit.window.as_secs(),
        rate_max_requests = config.rate_limit.max_requests,
        "Gateway configuration"
    );

    let resolver = SymbolResolver::new();

    let market: Option<Arc<dyn MarketData>> = match &service.finnhub_api_key {
        Some(key) => Some(Arc::new(FinnhubClient::new(key.clone())?)),
        None => {
            warn!("⚠️  FINNHUB_API_KEY not set; comparisons and charts use mock data");
            None
        }
    };

    let watchlist = Arc::new(WatchlistRegistrar::from_database_url(
        service.database_url.as_deref(),
        resolver.clone(),
        market.clone(),
    ));

    let answers: Arc<dyn AnswerGenerator> = match &service.gemini_api_key {
        Some(key) => {
            let mut analyst = GeminiAnalyst::new(GeminiClient::new(key.clone())?);
            if let Some(market) = &market {
                analyst = analyst
                    .with_retriever(Arc::new(MarketNewsRetriever::new(
                        market.clone(),
                        resolver.clone(),
                    )))
                    .with_market_data(market.clone());
            }
            Arc::new(analyst)
        }
        None => {
            warn!("⚠️  GEMINI_API_KEY not set; answers come from the mock analyst");
            warn!("📌 See .env.example for setup instructions");
            Arc::new(MockAnswerGenerator)
        }
    };

    let comparator: Arc<dyn Comparator> = match &market {
        Some(market) => Arc::new(QuoteComparator::new(market.clone(), resolver.clone())),
        None => Arc::new(MockComparator),
    };

    let capabilities = Capabilities {
        answers,
        registrar: watchlist.clone(),
        comparator,
        reports: Arc::new(MarkdownReportGenerator::new()),
    };

    let orchestrator = Arc::new(Orchestrator::from_config(config, capabilities));
    info!("✅ Orchestrator initialized");

    if orchestrator.config().session_idle_ttl.is_some() {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
            loop {
                ticker.tick().await;
                orchestrator.evict_idle().await;
            }
        });
    }

    info!("📡 Starting API server...");
    start_server(orchestrator, Some(watchlist), service.port).await?;

    Ok(())
}
