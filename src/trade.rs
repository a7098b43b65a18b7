// src/trade.rs
use crate::db::LedgerStore;
use crate::error::TradeError;
use crate::holdings::holding;
use crate::models::{Quote, TradeRecord};
use crate::quote::QuoteProvider;
use crate::validate::{ensure_positive, normalize_symbol};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Per-user mutexes serializing trade execution. Each Execute call holds its
/// user's lock from the balance read through the commit.
#[derive(Default)]
pub struct UserLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn get(&self, user_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(user_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Hands out strictly increasing millisecond timestamps, so ledger order
/// survives storage that keys trades by time.
#[derive(Default)]
pub struct LedgerClock {
    last_millis: AtomicI64,
}

impl LedgerClock {
    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        let previous = self
            .last_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        let millis = wall.max(previous + 1);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or_else(Utc::now)
    }
}

pub struct TradeExecutor {
    store: Arc<dyn LedgerStore>,
    quotes: Arc<dyn QuoteProvider>,
    locks: UserLocks,
    clock: LedgerClock,
}

impl TradeExecutor {
    pub fn new(store: Arc<dyn LedgerStore>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self {
            store,
            quotes,
            locks: UserLocks::default(),
            clock: LedgerClock::default(),
        }
    }

    pub async fn buy(
        &self,
        user_id: &str,
        symbol: &str,
        shares: i64,
    ) -> Result<TradeRecord, TradeError> {
        let shares = ensure_positive(shares)?;
        let quote = self.resolve(symbol).await?;

        let lock = self.locks.get(user_id).await;
        let _guard = lock.lock().await;

        let cash = self.store.read_balance(user_id).await?;
        let cost = quote.price * Decimal::from(shares);
        // A purchase must leave a strictly positive balance.
        if cash - cost <= Decimal::ZERO {
            warn!(
                "User {} cannot afford {} x {} (cost {}, cash {})",
                user_id, shares, quote.symbol, cost, cash
            );
            return Err(TradeError::InsufficientFunds { cost, cash });
        }

        let trade = new_record(user_id, &quote, shares, self.clock.now());
        self.store.apply_trade(cash - cost, &trade).await?;
        info!(
            "User {} bought {} x {} @ {}",
            user_id, shares, quote.symbol, quote.price
        );
        Ok(trade)
    }

    pub async fn sell(
        &self,
        user_id: &str,
        symbol: &str,
        shares: i64,
    ) -> Result<TradeRecord, TradeError> {
        let shares = ensure_positive(shares)?;
        let quote = self.resolve(symbol).await?;

        let lock = self.locks.get(user_id).await;
        let _guard = lock.lock().await;

        let held = holding(self.store.as_ref(), user_id, &quote.symbol).await?;
        if held <= 0 {
            return Err(TradeError::NotOwned(quote.symbol));
        }
        if shares > held {
            return Err(TradeError::InsufficientShares {
                symbol: quote.symbol,
                requested: shares,
                held,
            });
        }

        let cash = self.store.read_balance(user_id).await?;
        let proceeds = quote.price * Decimal::from(shares);
        let trade = new_record(user_id, &quote, -shares, self.clock.now());
        self.store.apply_trade(cash + proceeds, &trade).await?;
        info!(
            "User {} sold {} x {} @ {}",
            user_id, shares, quote.symbol, quote.price
        );
        Ok(trade)
    }

    /// The one quote fetch of an Execute call; its price is used for both the
    /// checks and the committed record.
    async fn resolve(&self, symbol: &str) -> Result<Quote, TradeError> {
        let symbol = normalize_symbol(symbol)?;
        match self.quotes.lookup(&symbol).await? {
            Some(quote) => Ok(quote),
            None => Err(TradeError::UnknownSymbol(symbol)),
        }
    }
}

fn new_record(
    user_id: &str,
    quote: &Quote,
    signed_shares: i64,
    timestamp: DateTime<Utc>,
) -> TradeRecord {
    TradeRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        timestamp,
        symbol: quote.symbol.clone(),
        shares: signed_shares,
        price: quote.price,
    }
}
