use analyst_gateway::{
    capabilities::{
        Capabilities, FinnhubClient, GeminiAnalyst, GeminiClient, MarketData, MockAnswerGenerator,
        QuoteComparator, WatchlistRegistrar,
    },
    config::{GatewayConfig, ServiceConfig},
    models::ChatRequest,
    orchestrator::Orchestrator,
    symbols::SymbolResolver,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing (stderr, so the chat stays readable)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = GatewayConfig::from_env()?;
    config.validate()?;
    let service = ServiceConfig::from_env()?;

    let resolver = SymbolResolver::new();
    let mut capabilities = Capabilities::mock();

    let market: Option<Arc<dyn MarketData>> = match &service.finnhub_api_key {
        Some(key) => Some(Arc::new(FinnhubClient::new(key.clone())?)),
        None => None,
    };

    if let Some(market) = &market {
        capabilities.comparator = Arc::new(QuoteComparator::new(market.clone(), resolver.clone()));
        capabilities.registrar = Arc::new(WatchlistRegistrar::in_memory(
            resolver.clone(),
            Some(market.clone()),
        ));
    }

    capabilities.answers = match &service.gemini_api_key {
        Some(key) => {
            let mut analyst = GeminiAnalyst::new(GeminiClient::new(key.clone())?);
            if let Some(market) = &market {
                analyst = analyst.with_market_data(market.clone());
            }
            Arc::new(analyst)
        }
        None => Arc::new(MockAnswerGenerator),
    };

    let orchestrator = Orchestrator::from_config(config, capabilities);
    let mut session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, "CLI session started");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(b"Analyst Gateway CLI. Commands: /info, /clear, /new, /quit\n")
        .await?;

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/info" => {
                let info = orchestrator.get_session_info(&session_id).await;
                let text = format!(
                    "session {}: messages={} warnings={} blocked={}\n",
                    session_id, info.message_count, info.warnings, info.is_blocked
                );
                stdout.write_all(text.as_bytes()).await?;
            }
            "/clear" => {
                orchestrator.clear_session(&session_id).await;
                stdout.write_all(b"Session cleared.\n").await?;
            }
            "/new" => {
                session_id = Uuid::new_v4().to_string();
                stdout
                    .write_all(format!("New session {}\n", session_id).as_bytes())
                    .await?;
            }
            message => {
                let response = orchestrator
                    .process_message(ChatRequest::new(session_id.clone(), message))
                    .await?;

                let mut out = String::new();
                if let Some(code) = response.error_code {
                    out.push_str(&format!("[{}] ", code));
                }
                out.push_str(&response.content);
                out.push('\n');
                if let Some(warning) = &response.warning {
                    out.push_str(&format!("⚠️  {}\n", warning));
                }
                if let Some(chart) = &response.chart_data {
                    out.push_str(&format!("📈 chart: {} ({} points)\n", chart.ticker, chart.c.len()));
                }
                if let Some(report) = &response.report {
                    out.push_str(&format!(
                        "📄 report ({}, {} bytes)\n",
                        response.report_type,
                        report.as_bytes().len()
                    ));
                }
                stdout.write_all(out.as_bytes()).await?;
            }
        }
    }

    Ok(())
}
