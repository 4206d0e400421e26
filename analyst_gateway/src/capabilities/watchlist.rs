//! Watchlist registrar
//!
//! Resolves a user-supplied company name to a ticker, checks it against the
//! market-data provider when one is configured, and stores it in the tracked
//! set. The set is global to the process (or shared through Postgres).

use super::market::MarketData;
use super::{EntityRegistrar, RegistrationAck};
use crate::error::GatewayError;
use crate::symbols::SymbolResolver;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub ticker: String,
    pub display_name: String,
    pub added_at: DateTime<Utc>,
}

enum WatchlistBackend {
    InMemory {
        entries: Arc<RwLock<BTreeMap<String, WatchlistEntry>>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

pub struct WatchlistRegistrar {
    backend: WatchlistBackend,
    resolver: SymbolResolver,
    market: Option<Arc<dyn MarketData>>,
}

impl WatchlistRegistrar {
    pub fn in_memory(resolver: SymbolResolver, market: Option<Arc<dyn MarketData>>) -> Self {
        Self {
            backend: WatchlistBackend::InMemory {
                entries: Arc::new(RwLock::new(BTreeMap::new())),
            },
            resolver,
            market,
        }
    }

    /// Postgres-backed watchlist; falls back to in-memory if the URL is unusable
    pub fn from_database_url(
        database_url: Option<&str>,
        resolver: SymbolResolver,
        market: Option<Arc<dyn MarketData>>,
    ) -> Self {
        if let Some(url) = database_url {
            match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(url)
            {
                Ok(pool) => {
                    info!("Watchlist backend: postgres");
                    return Self {
                        backend: WatchlistBackend::Postgres {
                            pool,
                            schema_ready: Arc::new(OnceCell::new()),
                        },
                        resolver,
                        market,
                    };
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres watchlist, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("Watchlist backend: in-memory");
        Self::in_memory(resolver, market)
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let WatchlistBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS watchlist (
                      ticker TEXT PRIMARY KEY,
                      display_name TEXT NOT NULL,
                      added_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                GatewayError::DatabaseError(format!("Failed to initialize watchlist schema: {}", e))
            })?;

        Ok(())
    }

    /// Tracked entities ordered by ticker
    pub async fn list(&self) -> Result<Vec<WatchlistEntry>> {
        self.ensure_schema_if_needed().await?;

        match &self.backend {
            WatchlistBackend::InMemory { entries } => {
                Ok(entries.read().await.values().cloned().collect())
            }
            WatchlistBackend::Postgres { pool, .. } => {
                let rows = sqlx::query(
                    "SELECT ticker, display_name, added_at FROM watchlist ORDER BY ticker",
                )
                .fetch_all(pool)
                .await?;

                rows.into_iter()
                    .map(|row| {
                        Ok(WatchlistEntry {
                            ticker: row.try_get("ticker")?,
                            display_name: row.try_get("display_name")?,
                            added_at: row.try_get("added_at")?,
                        })
                    })
                    .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
                    .map_err(GatewayError::from)
            }
        }
    }

    /// Returns false if the ticker was already tracked
    async fn insert(&self, entry: WatchlistEntry) -> Result<bool> {
        self.ensure_schema_if_needed().await?;

        match &self.backend {
            WatchlistBackend::InMemory { entries } => {
                let mut locked = entries.write().await;
                if locked.contains_key(&entry.ticker) {
                    return Ok(false);
                }
                locked.insert(entry.ticker.clone(), entry);
                Ok(true)
            }
            WatchlistBackend::Postgres { pool, .. } => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO watchlist (ticker, display_name, added_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (ticker) DO NOTHING
                    "#,
                )
                .bind(&entry.ticker)
                .bind(&entry.display_name)
                .bind(entry.added_at)
                .execute(pool)
                .await?;
                Ok(result.rows_affected() > 0)
            }
        }
    }

    /// Provider's company name, or an error if the provider does not know the symbol
    async fn verify(&self, ticker: &str) -> Result<Option<String>> {
        let Some(market) = &self.market else {
            return Ok(None);
        };

        if let Some(profile) = market.profile(ticker).await? {
            return Ok(Some(profile.name).filter(|n| !n.is_empty()));
        }
        if market.quote(ticker).await?.is_empty() {
            return Err(GatewayError::Registration(format!(
                "{} is not a listed symbol",
                ticker
            )));
        }
        Ok(None)
    }
}

#[async_trait]
impl EntityRegistrar for WatchlistRegistrar {
    async fn register(&self, name: &str) -> Result<RegistrationAck> {
        let ticker = self.resolver.resolve(name).ok_or_else(|| {
            GatewayError::Registration(format!("could not resolve '{}' to a ticker", name))
        })?;

        let company = self.verify(&ticker).await?;
        let display_name = company.unwrap_or_else(|| name.to_string());

        let inserted = self
            .insert(WatchlistEntry {
                ticker: ticker.clone(),
                display_name: display_name.clone(),
                added_at: Utc::now(),
            })
            .await?;

        info!(ticker = %ticker, inserted, "Watchlist registration");

        let message = if inserted {
            format!("{} ({}) has been added to the watchlist.", display_name, ticker)
        } else {
            format!("{} ({}) is already on the watchlist.", display_name, ticker)
        };

        Ok(RegistrationAck {
            name: name.to_string(),
            ticker,
            already_tracked: !inserted,
            message,
        })
    }
}
