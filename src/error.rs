// src/error.rs
use rust_decimal::Decimal;
use std::fmt::Display;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote provider returned HTTP {0}")]
    Status(u16),

    #[error("quote provider throttled the request: {0}")]
    Throttled(String),

    #[error("malformed quote response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("ledger query failed: {0}")]
    Query(String),

    #[error("malformed ledger row: {0}")]
    Malformed(String),

    #[error("user {0} not found")]
    UserNotFound(String),
}

impl StorageError {
    pub fn query<E: Display>(err: E) -> Self {
        StorageError::Query(err.to_string())
    }
}

/// Rejections produced by trade execution and portfolio reads.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("share count must be a positive integer")]
    InvalidQuantity,

    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),

    #[error("insufficient funds: purchase of {cost} must leave a positive balance (cash {cash})")]
    InsufficientFunds { cost: Decimal, cash: Decimal },

    #[error("no shares of {0} owned")]
    NotOwned(String),

    #[error("cannot sell {requested} shares of {symbol}, only {held} held")]
    InsufficientShares {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("quote lookup failed: {0}")]
    ExternalLookupFailure(#[from] QuoteError),

    #[error("storage failure: {0}")]
    StorageFailure(#[from] StorageError),
}

impl TradeError {
    pub fn code(&self) -> &'static str {
        match self {
            TradeError::InvalidQuantity => "invalid_quantity",
            TradeError::UnknownSymbol(_) => "unknown_symbol",
            TradeError::InsufficientFunds { .. } => "insufficient_funds",
            TradeError::NotOwned(_) => "not_owned",
            TradeError::InsufficientShares { .. } => "insufficient_shares",
            TradeError::ExternalLookupFailure(_) => "external_lookup_failure",
            TradeError::StorageFailure(_) => "storage_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TradeError::ExternalLookupFailure(_) => StatusCode::BAD_GATEWAY,
            TradeError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("must provide username")]
    MissingUsername,

    #[error("must provide password")]
    MissingPassword,

    #[error("passwords don't match")]
    PasswordMismatch,

    #[error("username already exists")]
    UsernameTaken,

    #[error("invalid username and/or password")]
    InvalidCredentials,

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("authentication failure: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingUsername => "missing_username",
            AuthError::MissingPassword => "missing_password",
            AuthError::PasswordMismatch => "password_mismatch",
            AuthError::UsernameTaken => "username_taken",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Internal(_) => "auth_failure",
            AuthError::Storage(_) => "storage_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingUsername
            | AuthError::MissingPassword
            | AuthError::PasswordMismatch => StatusCode::BAD_REQUEST,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) | AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Error carried through warp's rejection machinery.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Trade(e) => e.code(),
            ApiError::Auth(e) => e.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Trade(e) => e.status(),
            ApiError::Auth(e) => e.status(),
        }
    }
}

impl Reject for ApiError {}
