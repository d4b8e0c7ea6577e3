//! Stock level endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use inventory::InventoryLedger;
use orders::OrderLedger;
use serde::{Deserialize, Serialize};

use super::orders::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub quantity: u32,
}

/// GET /inventory/{product_id}: units currently available.
#[tracing::instrument(skip(state))]
pub async fn get<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Path(product_id): Path<String>,
) -> Result<Json<StockResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let id = ProductId::new(product_id);
    let quantity = state
        .inventory
        .stock_level(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    Ok(Json(StockResponse {
        product_id: id.into_inner(),
        quantity,
    }))
}

/// PUT /inventory/{product_id}: set the available units.
#[tracing::instrument(skip(state))]
pub async fn put<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Path(product_id): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let id = ProductId::new(product_id);
    state.inventory.set_stock(&id, req.quantity).await?;

    Ok(Json(StockResponse {
        product_id: id.into_inner(),
        quantity: req.quantity,
    }))
}
