// src/portfolio.rs
use crate::db::LedgerStore;
use crate::error::TradeError;
use crate::holdings::holdings;
use crate::models::{HoldingValue, Portfolio, Quote, TradeRecord};
use crate::quote::QuoteProvider;
use crate::validate::normalize_symbol;
use log::warn;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct PortfolioService {
    store: Arc<dyn LedgerStore>,
    quotes: Arc<dyn QuoteProvider>,
}

impl PortfolioService {
    pub fn new(store: Arc<dyn LedgerStore>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self { store, quotes }
    }

    /// Values every positive holding at a freshly fetched price. A held symbol
    /// the provider no longer knows is valued at its last traded price.
    pub async fn get_portfolio(&self, user_id: &str) -> Result<Portfolio, TradeError> {
        let cash = self.store.read_balance(user_id).await?;
        let positions = holdings(self.store.as_ref(), user_id).await?;

        let mut rows = Vec::new();
        for position in positions {
            let (name, price) = match self.quotes.lookup(&position.symbol).await? {
                Some(quote) => (quote.name, quote.price),
                None => {
                    warn!(
                        "No quote for held symbol {}, valuing at last trade price",
                        position.symbol
                    );
                    let price = self.last_trade_price(user_id, &position.symbol).await?;
                    (position.symbol.clone(), price)
                }
            };
            rows.push(HoldingValue {
                value: price * Decimal::from(position.shares),
                symbol: position.symbol,
                name,
                shares: position.shares,
                price,
            });
        }

        let total_value = cash + rows.iter().map(|h| h.value).sum::<Decimal>();
        Ok(Portfolio {
            cash,
            holdings: rows,
            total_value,
        })
    }

    pub async fn get_history(&self, user_id: &str) -> Result<Vec<TradeRecord>, TradeError> {
        let mut trades = self.store.read_trades(user_id, None).await?;
        trades.sort_by_key(|t| t.timestamp);
        Ok(trades)
    }

    async fn last_trade_price(&self, user_id: &str, symbol: &str) -> Result<Decimal, TradeError> {
        let trades = self.store.read_trades(user_id, Some(symbol)).await?;
        Ok(trades
            .iter()
            .max_by_key(|t| t.timestamp)
            .map_or(Decimal::ZERO, |t| t.price))
    }

    pub async fn quote(&self, symbol: &str) -> Result<Quote, TradeError> {
        let symbol = normalize_symbol(symbol)?;
        match self.quotes.lookup(&symbol).await? {
            Some(quote) => Ok(quote),
            None => Err(TradeError::UnknownSymbol(symbol)),
        }
    }
}
