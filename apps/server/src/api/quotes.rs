use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use stonks_core::constants::DEFAULT_LAST;
use stonks_core::quotes::{Quote, QuoteBatch};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

#[derive(Deserialize)]
pub struct StockQuery {
    last: Option<String>,
}

#[derive(Deserialize)]
pub struct StocksQuery {
    symbols: Option<String>,
    last: Option<String>,
}

fn parse_last(raw: Option<&str>) -> ApiResult<i64> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(DEFAULT_LAST),
        Some(value) => value
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid 'last' value: {}", value))),
    }
}

fn parse_symbols(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn get_stock(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<StockQuery>,
) -> ApiResult<Json<Vec<Quote>>> {
    let last = parse_last(query.last.as_deref())?;
    let quotes = state.store.query(&symbol, last)?;
    Ok(Json(quotes))
}

pub async fn get_stocks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StocksQuery>,
) -> ApiResult<Json<QuoteBatch>> {
    let last = parse_last(query.last.as_deref())?;
    let symbols = parse_symbols(query.symbols.as_deref());
    let batch = state.store.query_batch(&symbols, last)?;
    Ok(Json(batch))
}
