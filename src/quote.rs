// src/quote.rs
use crate::error::QuoteError;
use crate::models::Quote;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

const ALPHAVANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Source of point-in-time prices. `Ok(None)` means the symbol is unknown.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>, QuoteError>;
}

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
}

#[derive(Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<SymbolMatch>,
}

#[derive(Deserialize)]
struct SymbolMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
}

pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        function: &str,
        param: (&str, &str),
    ) -> Result<T, QuoteError> {
        let response = self
            .client
            .get(ALPHAVANTAGE_URL)
            .query(&[
                ("function", function),
                param,
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status().as_u16()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn display_name(&self, symbol: &str) -> String {
        match self
            .fetch::<SymbolSearchResponse>("SYMBOL_SEARCH", ("keywords", symbol))
            .await
        {
            Ok(search) => match_name(&search, symbol),
            Err(e) => {
                warn!("Name lookup for {} failed, using symbol: {}", symbol, e);
                symbol.to_string()
            }
        }
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>, QuoteError> {
        let body = self
            .fetch::<GlobalQuoteResponse>("GLOBAL_QUOTE", ("symbol", symbol))
            .await?;
        let (symbol, price) = match parse_global_quote(body)? {
            Some(found) => found,
            None => {
                info!("No quote found for {}", symbol);
                return Ok(None);
            }
        };
        let name = self.display_name(&symbol).await;
        info!("Quoted {} at {}", symbol, price);
        Ok(Some(Quote {
            symbol,
            name,
            price,
        }))
    }
}

fn parse_global_quote(body: GlobalQuoteResponse) -> Result<Option<(String, Decimal)>, QuoteError> {
    if let Some(note) = body.note.or(body.information) {
        return Err(QuoteError::Throttled(note));
    }
    if body.error_message.is_some() {
        return Ok(None);
    }
    let quote = match body.global_quote {
        Some(GlobalQuote {
            symbol: Some(symbol),
            price: Some(price),
        }) => (symbol, price),
        _ => return Ok(None),
    };
    let price = Decimal::from_str(quote.1.trim())
        .map_err(|e| QuoteError::Malformed(format!("price '{}': {}", quote.1, e)))?;
    if price <= Decimal::ZERO {
        return Err(QuoteError::Malformed(format!(
            "non-positive price {} for {}",
            price, quote.0
        )));
    }
    Ok(Some((quote.0.to_ascii_uppercase(), price)))
}

fn match_name(search: &SymbolSearchResponse, symbol: &str) -> String {
    search
        .best_matches
        .iter()
        .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
        .map(|m| m.name.clone())
        .unwrap_or_else(|| symbol.to_string())
}
