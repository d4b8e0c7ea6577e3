//! Cart seeding for the demo cart store.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::{Cart, CartLine};
use common::{Currency, Money};
use inventory::InventoryLedger;
use orders::OrderLedger;
use serde::{Deserialize, Serialize};

use super::orders::{AppState, parse_user_id};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PutCartRequest {
    pub currency: Option<String>,
    pub lines: Vec<CartLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CartLineRequest {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub currency: String,
    pub line_count: usize,
    pub total_cents: i64,
}

/// PUT /carts/{user_id}: replace the user's cart.
#[tracing::instrument(skip(state, req))]
pub async fn put<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Path(user_id): Path<String>,
    Json(req): Json<PutCartRequest>,
) -> Result<Json<CartResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let currency = match req.currency.as_deref() {
        Some(code) => Currency::new(code).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => Currency::usd(),
    };
    if let Some(line) = req.lines.iter().find(|l| l.quantity == 0 || l.unit_price_cents < 0) {
        return Err(ApiError::BadRequest(format!(
            "Invalid line for product {}",
            line.product_id
        )));
    }

    let lines = req
        .lines
        .into_iter()
        .map(|l| {
            CartLine::new(
                l.product_id,
                l.product_name,
                l.quantity,
                Money::from_cents(l.unit_price_cents),
            )
        })
        .collect();
    let cart = Cart {
        user_id,
        currency,
        lines,
    };
    let total = cart
        .total()
        .ok_or_else(|| ApiError::BadRequest("Cart total is out of range".to_string()))?;

    let response = CartResponse {
        user_id: user_id.to_string(),
        currency: cart.currency.to_string(),
        line_count: cart.lines.len(),
        total_cents: total.cents(),
    };
    state.carts.put_cart(cart);
    Ok(Json(response))
}
