//! Order routes, served by the in-process contracter.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::WithRejection;
use fftb_models::{AddOrderRequest, CancelRequest, Order, OrderId};
use serde::Serialize;

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// An order with its share of finished segments.
#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub progress: f64,
}

pub async fn add_order(
    State(state): State<AppState>,
    Caller(publisher): Caller,
    WithRejection(Json(request), _): WithRejection<Json<AddOrderRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = state.contracter.add_order_to_queue(&publisher, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Orders of the calling publisher.
pub async fn list_orders(State(state): State<AppState>, Caller(publisher): Caller) -> ApiResult<Json<Vec<Order>>> {
    let orders = state
        .contracter
        .get_all_orders()
        .await?
        .into_iter()
        .filter(|order| order.publisher == publisher)
        .collect();

    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    Caller(publisher): Caller,
    Path(id): Path<OrderId>,
) -> ApiResult<Json<OrderView>> {
    let order = state.contracter.get_order_by_id(&id).await?;
    order.ensure_publisher(&publisher)?;

    let segments = state
        .registry
        .find_segments_by_order_id(&id)
        .await
        .map_err(fftb_models::DealerError::from)?;
    let progress = order.progress(&segments);

    Ok(Json(OrderView { order, progress }))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Caller(publisher): Caller,
    Path(id): Path<OrderId>,
    body: Option<Json<CancelRequest>>,
) -> ApiResult<Json<Order>> {
    let order = state.contracter.get_order_by_id(&id).await?;
    order.ensure_publisher(&publisher)?;

    let reason = body.and_then(|Json(request)| request.reason);
    let order = state
        .contracter
        .cancel_order_by_id(&id, reason.as_deref().filter(|r| !r.is_empty()))
        .await?;

    Ok(Json(order))
}
