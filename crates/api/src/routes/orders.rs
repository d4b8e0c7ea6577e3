//! Checkout and order management endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use checkout::{
    CancellationOutcome, CheckoutOrchestrator, CheckoutRequest, InMemoryCartProvider,
    InMemoryPaymentGateway, Recipient, RefundOutcome, StubShippingQuoter,
};
use common::{Address, OrderId, PageRequest, UserId};
use inventory::InventoryLedger;
use orders::{
    Order, OrderDetails, OrderItem, OrderLedger, OrderLookup, OrderStatus, OrderStatusHistory,
    StatusUpdate,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Orchestrator wired to the demo collaborators.
pub type AppCheckout<I, L> =
    CheckoutOrchestrator<InMemoryCartProvider, I, StubShippingQuoter, InMemoryPaymentGateway, L>;

/// Shared application state accessible from all handlers.
pub struct AppState<I, L>
where
    I: InventoryLedger,
    L: OrderLedger,
{
    pub checkout: AppCheckout<I, L>,
    pub carts: InMemoryCartProvider,
    pub inventory: I,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub shipping_address: Address,
    pub payment_method_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: String,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub note: String,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub currency: String,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub shipping_address: Address,
    pub payment_method_id: Option<String>,
    pub transaction_id: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct StatusHistoryResponse {
    pub status: OrderStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: OrderSummaryResponse,
    pub items: Vec<OrderItemResponse>,
    pub history: Vec<StatusHistoryResponse>,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderSummaryResponse>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
}

#[derive(Serialize)]
pub struct CancelOrderResponse {
    pub order: OrderSummaryResponse,
    pub refund: RefundOutcome,
    pub restocked_units: u64,
}

impl From<Order> for OrderSummaryResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            status: order.status,
            currency: order.currency.to_string(),
            subtotal_cents: order.subtotal.cents(),
            shipping_cents: order.shipping.cents(),
            tax_cents: order.tax.cents(),
            total_cents: order.total.cents(),
            shipping_address: order.shipping_address,
            payment_method_id: order.payment_method_id,
            transaction_id: order.transaction_id,
            tracking_number: order.tracking_number,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id.into_inner(),
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            line_total_cents: item.line_total.cents(),
        }
    }
}

impl From<OrderStatusHistory> for StatusHistoryResponse {
    fn from(entry: OrderStatusHistory) -> Self {
        Self {
            status: entry.status,
            note: entry.note,
            created_at: entry.created_at,
        }
    }
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            order: details.order.into(),
            items: details.items.into_iter().map(Into::into).collect(),
            history: details.history.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<CancellationOutcome> for CancelOrderResponse {
    fn from(outcome: CancellationOutcome) -> Self {
        Self {
            order: outcome.order.into(),
            refund: outcome.refund,
            restocked_units: outcome.restocked_units,
        }
    }
}

// -- Handlers --

/// POST /orders: check out the user's cart.
#[tracing::instrument(skip(state, req))]
pub async fn create<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let user_id = parse_user_id(&req.user_id)?;
    let recipient = match (req.email, req.first_name) {
        (Some(email), first_name) if !email.trim().is_empty() => Some(Recipient {
            email,
            first_name: first_name.unwrap_or_default(),
        }),
        _ => None,
    };

    let details = state
        .checkout
        .create_order(CheckoutRequest {
            user_id,
            shipping_address: req.shipping_address,
            payment_method_id: req.payment_method_id,
            recipient,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(details.into())))
}

/// GET /orders/{id}?user_id=: load an order with items and history.
#[tracing::instrument(skip(state))]
pub async fn get<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<OrderResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let user_id = parse_user_id(&query.user_id)?;

    let details = state
        .checkout
        .get_order(&OrderLookup::Id(order_id), user_id)
        .await?;
    Ok(Json(details.into()))
}

/// GET /orders/tracking/{number}?user_id=: load an order by tracking number.
#[tracing::instrument(skip(state))]
pub async fn get_by_tracking_number<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Path(number): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<OrderResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let user_id = parse_user_id(&query.user_id)?;

    let details = state
        .checkout
        .get_order(&OrderLookup::TrackingNumber(number), user_id)
        .await?;
    Ok(Json(details.into()))
}

/// GET /orders?user_id=&page=&page_size=&status=: newest first.
#[tracing::instrument(skip(state, query))]
pub async fn list<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let user_id = parse_user_id(&query.user_id)?;
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match parse_status(raw)? {
            OrderStatus::Unspecified => None,
            status => Some(status),
        },
    };
    let request = PageRequest::new(query.page.unwrap_or(1), query.page_size.unwrap_or(0));

    let page = state.checkout.list_orders(user_id, request, status).await?;

    Ok(Json(OrderListResponse {
        page: page.page,
        page_size: page.page_size,
        total_count: page.total_count,
        total_pages: page.total_pages,
        orders: page.items.into_iter().map(Into::into).collect(),
    }))
}

/// PUT /orders/{id}/status: record a status change.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderSummaryResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let mut update = StatusUpdate::new(parse_status(&req.status)?, req.note);
    if let Some(tracking_number) = req.tracking_number.filter(|t| !t.trim().is_empty()) {
        update = update.with_tracking_number(tracking_number);
    }

    let order = state.checkout.update_order_status(order_id, update).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel: cancel, refund and restock.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<I, L>(
    State(state): State<Arc<AppState<I, L>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<CancelOrderResponse>, ApiError>
where
    I: InventoryLedger + Clone + 'static,
    L: OrderLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let user_id = parse_user_id(&req.user_id)?;

    let outcome = state
        .checkout
        .cancel_order(order_id, user_id, &req.reason)
        .await?;
    Ok(Json(outcome.into()))
}

pub(crate) fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    UserId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid user_id: {e}")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}
