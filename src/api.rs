// src/api.rs
use crate::auth::AuthService;
use crate::error::{ApiError, AuthError};
use crate::models::{LoginRequest, RegisterRequest, TradeRequest};
use crate::portfolio::PortfolioService;
use crate::trade::TradeExecutor;
use crate::validate::parse_quantity;
use log::{error, info, warn};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub struct AppState {
    pub auth: AuthService,
    pub executor: TradeExecutor,
    pub portfolio: PortfolioService,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// All routes with rejections rendered as JSON error bodies.
pub fn app(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    routes(state).recover(handle_rejection)
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let register = warp::path("register")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(register_handler);

    let login = warp::path("login")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(login_handler);

    let quote = warp::path!("quote" / String)
        .and(warp::get())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(quote_handler);

    let portfolio = warp::path("portfolio")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(portfolio_handler);

    let history = warp::path("history")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(history_handler);

    let buy = warp::path("buy")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .and_then(buy_handler);

    let sell = warp::path("sell")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_user(state.clone()))
        .and(with_state(state))
        .and(warp::body::json())
        .and_then(sell_handler);

    register
        .or(login)
        .or(quote)
        .or(portfolio)
        .or(history)
        .or(buy)
        .or(sell)
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the bearer token to the user id passed explicitly to handlers.
fn with_user(state: Arc<AppState>) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|header: Option<String>, state: Arc<AppState>| async move {
            let token = header
                .as_deref()
                .and_then(|value| value.strip_prefix("Bearer "))
                .ok_or_else(|| reject(AuthError::Unauthorized))?;
            state.auth.tokens().verify(token.trim()).map_err(reject)
        })
}

fn reject<E: Into<ApiError>>(err: E) -> Rejection {
    warp::reject::custom(err.into())
}

async fn register_handler(
    state: Arc<AppState>,
    request: RegisterRequest,
) -> Result<impl Reply, Rejection> {
    match state.auth.register(request).await {
        Ok(response) => {
            info!("User {} registered.", response.user_id);
            Ok(warp::reply::with_status(
                warp::reply::json(&response),
                StatusCode::CREATED,
            ))
        }
        Err(e) => {
            warn!("Registration failed: {}", e);
            Err(reject(e))
        }
    }
}

async fn login_handler(
    state: Arc<AppState>,
    request: LoginRequest,
) -> Result<impl Reply, Rejection> {
    match state.auth.login(request).await {
        Ok(response) => Ok(warp::reply::json(&response)),
        Err(e) => {
            warn!("Login failed: {}", e);
            Err(reject(e))
        }
    }
}

async fn quote_handler(
    symbol: String,
    _user_id: String,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    match state.portfolio.quote(&symbol).await {
        Ok(quote) => Ok(warp::reply::json(&quote)),
        Err(e) => {
            error!("Failed to quote {}: {}", symbol, e);
            Err(reject(e))
        }
    }
}

async fn portfolio_handler(user_id: String, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    match state.portfolio.get_portfolio(&user_id).await {
        Ok(portfolio) => {
            info!("Portfolio retrieved for {}.", user_id);
            Ok(warp::reply::json(&portfolio))
        }
        Err(e) => {
            error!("Failed to retrieve portfolio for {}: {}", user_id, e);
            Err(reject(e))
        }
    }
}

async fn history_handler(user_id: String, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    match state.portfolio.get_history(&user_id).await {
        Ok(history) => Ok(warp::reply::json(&history)),
        Err(e) => {
            error!("Failed to retrieve history for {}: {}", user_id, e);
            Err(reject(e))
        }
    }
}

async fn buy_handler(
    user_id: String,
    state: Arc<AppState>,
    request: TradeRequest,
) -> Result<impl Reply, Rejection> {
    let shares = parse_quantity(&request.shares).map_err(reject)?;
    match state.executor.buy(&user_id, &request.symbol, shares).await {
        Ok(trade) => Ok(warp::reply::json(&trade)),
        Err(e) => {
            warn!("Buy of {} by {} rejected: {}", request.symbol, user_id, e);
            Err(reject(e))
        }
    }
}

async fn sell_handler(
    user_id: String,
    state: Arc<AppState>,
    request: TradeRequest,
) -> Result<impl Reply, Rejection> {
    let shares = parse_quantity(&request.shares).map_err(reject)?;
    match state.executor.sell(&user_id, &request.symbol, shares).await {
        Ok(trade) => Ok(warp::reply::json(&trade)),
        Err(e) => {
            warn!("Sell of {} by {} rejected: {}", request.symbol, user_id, e);
            Err(reject(e))
        }
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if let Some(e) = err.find::<ApiError>() {
        (e.status(), e.code(), e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "invalid_body", e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { code, message }),
        status,
    ))
}
