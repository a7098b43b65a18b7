// src/memory.rs
use crate::db::LedgerStore;
use crate::error::StorageError;
use crate::models::{TradeRecord, User};
use async_trait::async_trait;
use log::info;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    ids_by_name: HashMap<String, String>,
    trades: Vec<TradeRecord>,
}

/// Process-local ledger. Every operation runs under one lock, so
/// `apply_trade` is trivially all-or-nothing.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        cash: Decimal,
    ) -> Result<Option<User>, StorageError> {
        let mut state = self.state.lock().await;
        if state.ids_by_name.contains_key(username) {
            return Ok(None);
        }
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            cash,
        };
        state
            .ids_by_name
            .insert(username.to_string(), user.id.clone());
        state.users.insert(user.id.clone(), user.clone());
        Ok(Some(user))
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .ids_by_name
            .get(username)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn read_balance(&self, user_id: &str) -> Result<Decimal, StorageError> {
        let state = self.state.lock().await;
        state
            .users
            .get(user_id)
            .map(|u| u.cash)
            .ok_or_else(|| StorageError::UserNotFound(user_id.to_string()))
    }

    async fn read_trades(
        &self,
        user_id: &str,
        symbol: Option<&str>,
    ) -> Result<Vec<TradeRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .trades
            .iter()
            .filter(|t| t.user_id == user_id)
            .filter(|t| symbol.map_or(true, |s| s == t.symbol))
            .cloned()
            .collect())
    }

    async fn apply_trade(
        &self,
        new_balance: Decimal,
        trade: &TradeRecord,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&trade.user_id)
            .ok_or_else(|| StorageError::UserNotFound(trade.user_id.clone()))?;
        user.cash = new_balance;
        state.trades.push(trade.clone());
        info!(
            "Recorded trade {} for user {}: {} x {} @ {}",
            trade.id, trade.user_id, trade.shares, trade.symbol, trade.price
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn trade(user_id: &str, symbol: &str, shares: i64) -> TradeRecord {
        TradeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            shares,
            price: dec!(10),
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = MemoryLedgerStore::new();
        assert!(store
            .create_user("alice", "hash", dec!(100))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .create_user("alice", "other", dec!(100))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn apply_trade_updates_balance_and_ledger_together() {
        let store = MemoryLedgerStore::new();
        let user = store
            .create_user("bob", "hash", dec!(100))
            .await
            .unwrap()
            .unwrap();

        store
            .apply_trade(dec!(80), &trade(&user.id, "AAPL", 2))
            .await
            .unwrap();

        assert_eq!(store.read_balance(&user.id).await.unwrap(), dec!(80));
        assert_eq!(store.read_trades(&user.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn apply_trade_for_unknown_user_writes_nothing() {
        let store = MemoryLedgerStore::new();
        let err = store
            .apply_trade(dec!(80), &trade("ghost", "AAPL", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UserNotFound(_)));
        assert!(store.read_trades("ghost", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_trades_filters_by_user_and_symbol() {
        let store = MemoryLedgerStore::new();
        let a = store.create_user("a", "h", dec!(100)).await.unwrap().unwrap();
        let b = store.create_user("b", "h", dec!(100)).await.unwrap().unwrap();
        store.apply_trade(dec!(90), &trade(&a.id, "AAPL", 1)).await.unwrap();
        store.apply_trade(dec!(80), &trade(&a.id, "MSFT", 1)).await.unwrap();
        store.apply_trade(dec!(90), &trade(&b.id, "AAPL", 1)).await.unwrap();

        let all = store.read_trades(&a.id, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].symbol, "AAPL");
        assert_eq!(all[1].symbol, "MSFT");

        let msft = store.read_trades(&a.id, Some("MSFT")).await.unwrap();
        assert_eq!(msft.len(), 1);
        assert_eq!(msft[0].user_id, a.id);
    }
}
