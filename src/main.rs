// src/main.rs
mod api;
mod auth;
mod config;
mod db;
mod error;
mod holdings;
mod memory;
mod models;
mod portfolio;
mod quote;
mod trade;
mod validate;

use crate::api::AppState;
use crate::auth::{AuthService, TokenIssuer};
use crate::config::{Config, LedgerBackend};
use crate::db::{LedgerStore, ScyllaLedgerStore};
use crate::memory::MemoryLedgerStore;
use crate::portfolio::PortfolioService;
use crate::quote::{AlphaVantageProvider, QuoteProvider};
use crate::trade::TradeExecutor;
use env_logger::{Builder, Env};
use log::{error, info, warn};
use reqwest::Client;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let store: Arc<dyn LedgerStore> = match config.backend {
        LedgerBackend::Scylla => match ScyllaLedgerStore::connect(&config.scylla_node).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                return;
            }
        },
        LedgerBackend::Memory => {
            warn!("Using the in-memory ledger; trades will not survive a restart.");
            Arc::new(MemoryLedgerStore::new())
        }
    };
    info!("Connected to ledger store...");

    let quotes: Arc<dyn QuoteProvider> =
        Arc::new(AlphaVantageProvider::new(Client::new(), config.api_key.clone()));
    let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl);

    let state = Arc::new(AppState {
        auth: AuthService::new(store.clone(), tokens, config.starting_cash),
        executor: TradeExecutor::new(store.clone(), quotes.clone()),
        portfolio: PortfolioService::new(store, quotes),
    });

    info!("Starting the stock trading simulator...");
    let api = api::app(state);

    info!("Server running on http://{}", config.listen_addr);
    warp::serve(api).run(config.listen_addr).await;
}
