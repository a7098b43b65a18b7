// src/db.rs
use crate::error::StorageError;
use crate::models::{TradeRecord, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use rust_decimal::Decimal;
use scylla::batch::Batch;
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{query::Query, Session, SessionBuilder};
use std::str::FromStr;

/// Durable storage for users, cash balances and the append-only trade ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates a user with the given starting cash. Returns `None` when the
    /// username is already taken.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        cash: Decimal,
    ) -> Result<Option<User>, StorageError>;

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn read_balance(&self, user_id: &str) -> Result<Decimal, StorageError>;

    /// Trade records for the user in chronological order, optionally
    /// restricted to one symbol.
    async fn read_trades(
        &self,
        user_id: &str,
        symbol: Option<&str>,
    ) -> Result<Vec<TradeRecord>, StorageError>;

    /// Writes the user's new balance and appends `trade` as one unit: either
    /// both are applied or neither is.
    async fn apply_trade(&self, new_balance: Decimal, trade: &TradeRecord)
        -> Result<(), StorageError>;
}

pub struct ScyllaLedgerStore {
    session: Session,
}

impl ScyllaLedgerStore {
    pub async fn connect(node: &str) -> Result<Self, StorageError> {
        let session = SessionBuilder::new()
            .known_node(node)
            .build()
            .await
            .map_err(StorageError::query)?;

        session.query("CREATE KEYSPACE IF NOT EXISTS stock_sim WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await.map_err(StorageError::query)?;
        session.query("CREATE TABLE IF NOT EXISTS stock_sim.users (user_id TEXT PRIMARY KEY, username TEXT, cash TEXT)", &[]).await.map_err(StorageError::query)?;
        session.query("CREATE TABLE IF NOT EXISTS stock_sim.users_by_name (username TEXT PRIMARY KEY, user_id TEXT, hash TEXT)", &[]).await.map_err(StorageError::query)?;
        session.query("CREATE TABLE IF NOT EXISTS stock_sim.trades (user_id TEXT, traded_at TIMESTAMP, trade_id TEXT, symbol TEXT, shares BIGINT, price TEXT, PRIMARY KEY (user_id, traded_at, trade_id)) WITH CLUSTERING ORDER BY (traded_at ASC, trade_id ASC)", &[]).await.map_err(StorageError::query)?;

        info!("Successfully connected to ScyllaDB at {}.", node);
        Ok(Self { session })
    }

    async fn first_row(&self, query: Query, key: &str) -> Result<Option<Row>, StorageError> {
        let result = self
            .session
            .query(query, (key,))
            .await
            .map_err(StorageError::query)?;
        Ok(result.rows.and_then(|rows| rows.into_iter().next()))
    }
}

#[async_trait]
impl LedgerStore for ScyllaLedgerStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        cash: Decimal,
    ) -> Result<Option<User>, StorageError> {
        let user_id = uuid::Uuid::new_v4().to_string();

        // Claim the username first so a taken name writes nothing else.
        let claim = Query::new(
            "INSERT INTO stock_sim.users_by_name (username, user_id, hash) VALUES (?, ?, ?) IF NOT EXISTS",
        );
        let result = self
            .session
            .query(claim, (username, user_id.as_str(), password_hash))
            .await
            .map_err(StorageError::query)?;
        if !claim_applied(result.rows.and_then(|rows| rows.into_iter().next())) {
            info!("Username {} already registered.", username);
            return Ok(None);
        }

        let insert =
            Query::new("INSERT INTO stock_sim.users (user_id, username, cash) VALUES (?, ?, ?)");
        if let Err(e) = self
            .session
            .query(insert, (user_id.as_str(), username, cash.to_string()))
            .await
        {
            error!("Failed to create user row for {}: {}", username, e);
            let release = Query::new(
                "DELETE FROM stock_sim.users_by_name WHERE username = ? IF user_id = ?",
            );
            if let Err(release_err) = self
                .session
                .query(release, (username, user_id.as_str()))
                .await
            {
                error!("Failed to release username {}: {}", username, release_err);
            }
            return Err(StorageError::query(e));
        }

        Ok(Some(User {
            id: user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            cash,
        }))
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, StorageError> {
        let query =
            Query::new("SELECT user_id, hash FROM stock_sim.users_by_name WHERE username = ?");
        let row = match self.first_row(query, username).await? {
            Some(row) => row,
            None => return Ok(None),
        };
        let user_id = text_column(&row, 0)?;
        let password_hash = text_column(&row, 1)?;
        let cash = self.read_balance(&user_id).await?;
        Ok(Some(User {
            id: user_id,
            username: username.to_string(),
            password_hash,
            cash,
        }))
    }

    async fn read_balance(&self, user_id: &str) -> Result<Decimal, StorageError> {
        let query = Query::new("SELECT cash FROM stock_sim.users WHERE user_id = ?");
        match self.first_row(query, user_id).await? {
            Some(row) => decimal_column(&row, 0),
            None => Err(StorageError::UserNotFound(user_id.to_string())),
        }
    }

    async fn read_trades(
        &self,
        user_id: &str,
        symbol: Option<&str>,
    ) -> Result<Vec<TradeRecord>, StorageError> {
        let query = Query::new(
            "SELECT trade_id, traded_at, symbol, shares, price FROM stock_sim.trades WHERE user_id = ?",
        );
        let result = self
            .session
            .query(query, (user_id,))
            .await
            .map_err(StorageError::query)?;

        let mut trades = Vec::new();
        for row in result.rows.unwrap_or_default() {
            let trade = match trade_from_row(user_id, &row) {
                Ok(trade) => trade,
                Err(e) => {
                    error!("Unreadable trade row for user {}: {}", user_id, e);
                    return Err(e);
                }
            };
            if symbol.map_or(true, |s| s == trade.symbol) {
                trades.push(trade);
            }
        }
        Ok(trades)
    }

    async fn apply_trade(
        &self,
        new_balance: Decimal,
        trade: &TradeRecord,
    ) -> Result<(), StorageError> {
        // Batch::default() is a LOGGED batch, so both statements land together.
        let mut batch = Batch::default();
        batch.append_statement(Query::new(
            "UPDATE stock_sim.users SET cash = ? WHERE user_id = ?",
        ));
        batch.append_statement(Query::new(
            "INSERT INTO stock_sim.trades (user_id, traded_at, trade_id, symbol, shares, price) VALUES (?, ?, ?, ?, ?, ?)",
        ));

        let values = (
            (new_balance.to_string(), trade.user_id.as_str()),
            (
                trade.user_id.as_str(),
                trade.timestamp.timestamp_millis(),
                trade.id.as_str(),
                trade.symbol.as_str(),
                trade.shares,
                trade.price.to_string(),
            ),
        );
        self.session
            .batch(&batch, values)
            .await
            .map_err(StorageError::query)?;
        info!(
            "Recorded trade {} for user {}: {} x {} @ {}",
            trade.id, trade.user_id, trade.shares, trade.symbol, trade.price
        );
        Ok(())
    }
}

/// Reads the `[applied]` flag a lightweight transaction reports first.
fn claim_applied(row: Option<Row>) -> bool {
    row.and_then(|row| row.columns.into_iter().next().flatten())
        .and_then(|v| v.as_boolean())
        .unwrap_or(false)
}

fn column(row: &Row, idx: usize) -> Result<&CqlValue, StorageError> {
    row.columns
        .get(idx)
        .and_then(|c| c.as_ref())
        .ok_or_else(|| StorageError::Malformed(format!("column {} is null", idx)))
}

fn text_column(row: &Row, idx: usize) -> Result<String, StorageError> {
    column(row, idx)?
        .as_text()
        .cloned()
        .ok_or_else(|| StorageError::Malformed(format!("column {} is not text", idx)))
}

fn decimal_column(row: &Row, idx: usize) -> Result<Decimal, StorageError> {
    let raw = text_column(row, idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| StorageError::Malformed(format!("amount '{}': {}", raw, e)))
}

fn timestamp_column(row: &Row, idx: usize) -> Result<DateTime<Utc>, StorageError> {
    match column(row, idx)? {
        CqlValue::Timestamp(ts) => DateTime::<Utc>::from_timestamp_millis(ts.num_milliseconds())
            .ok_or_else(|| StorageError::Malformed(format!("timestamp {:?} out of range", ts))),
        other => Err(StorageError::Malformed(format!(
            "column {} is not a timestamp: {:?}",
            idx, other
        ))),
    }
}

fn trade_from_row(user_id: &str, row: &Row) -> Result<TradeRecord, StorageError> {
    let shares = column(row, 3)?
        .as_bigint()
        .ok_or_else(|| StorageError::Malformed("shares is not a bigint".to_string()))?;
    Ok(TradeRecord {
        id: text_column(row, 0)?,
        user_id: user_id.to_string(),
        timestamp: timestamp_column(row, 1)?,
        symbol: text_column(row, 2)?,
        shares,
        price: decimal_column(row, 4)?,
    })
}
