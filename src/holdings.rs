// src/holdings.rs
use crate::db::LedgerStore;
use crate::error::StorageError;
use crate::models::{Holding, TradeRecord};
use std::collections::BTreeMap;

/// Folds signed share counts per symbol. Symbols whose net is zero or below
/// are dropped. Output is ordered by symbol.
pub fn net_positions(trades: &[TradeRecord]) -> Vec<Holding> {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for trade in trades {
        *totals.entry(trade.symbol.as_str()).or_insert(0) += trade.shares;
    }
    totals
        .into_iter()
        .filter(|(_, shares)| *shares > 0)
        .map(|(symbol, shares)| Holding {
            symbol: symbol.to_string(),
            shares,
        })
        .collect()
}

pub async fn holdings(
    store: &dyn LedgerStore,
    user_id: &str,
) -> Result<Vec<Holding>, StorageError> {
    let trades = store.read_trades(user_id, None).await?;
    Ok(net_positions(&trades))
}

/// Net shares of one symbol, 0 when none are held.
pub async fn holding(
    store: &dyn LedgerStore,
    user_id: &str,
    symbol: &str,
) -> Result<i64, StorageError> {
    let trades = store.read_trades(user_id, Some(symbol)).await?;
    Ok(net_positions(&trades)
        .into_iter()
        .find(|h| h.symbol == symbol)
        .map_or(0, |h| h.shares))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedgerStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn trade(symbol: &str, shares: i64) -> TradeRecord {
        TradeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "u1".to_string(),
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            shares,
            price: dec!(1),
        }
    }

    #[test]
    fn sums_signed_shares_per_symbol() {
        let trades = vec![
            trade("MSFT", 4),
            trade("AAPL", 10),
            trade("AAPL", -3),
            trade("MSFT", 1),
        ];
        assert_eq!(
            net_positions(&trades),
            vec![
                Holding {
                    symbol: "AAPL".to_string(),
                    shares: 7
                },
                Holding {
                    symbol: "MSFT".to_string(),
                    shares: 5
                },
            ]
        );
    }

    #[test]
    fn fully_sold_symbols_are_dropped_not_zeroed() {
        let trades = vec![trade("AAPL", 5), trade("AAPL", -5), trade("TSLA", 2)];
        let positions = net_positions(&trades);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "TSLA");
    }

    #[test]
    fn holdings_match_ledger_sums() {
        let trades = vec![
            trade("A", 3),
            trade("B", 2),
            trade("A", -1),
            trade("C", 1),
            trade("B", -2),
            trade("C", 4),
        ];
        let positions = net_positions(&trades);
        for symbol in ["A", "B", "C"] {
            let sum: i64 = trades
                .iter()
                .filter(|t| t.symbol == symbol)
                .map(|t| t.shares)
                .sum();
            let held = positions.iter().find(|h| h.symbol == symbol);
            if sum > 0 {
                assert_eq!(held.map(|h| h.shares), Some(sum));
            } else {
                assert!(held.is_none());
            }
        }
    }

    #[test]
    fn empty_ledger_has_no_holdings() {
        assert!(net_positions(&[]).is_empty());
    }

    #[tokio::test]
    async fn reads_through_the_store() {
        let store = MemoryLedgerStore::new();
        let user = store
            .create_user("carol", "h", dec!(1000))
            .await
            .unwrap()
            .unwrap();
        let mut buy = trade("IBM", 6);
        buy.user_id = user.id.clone();
        store.apply_trade(dec!(994), &buy).await.unwrap();
        let mut sell = trade("IBM", -2);
        sell.user_id = user.id.clone();
        store.apply_trade(dec!(996), &sell).await.unwrap();

        assert_eq!(holding(&store, &user.id, "IBM").await.unwrap(), 4);
        assert_eq!(holding(&store, &user.id, "AAPL").await.unwrap(), 0);
        assert_eq!(holdings(&store, &user.id).await.unwrap().len(), 1);
    }
}
