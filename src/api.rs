//! Handlers for the purchases REST API.
//!
//! Orders are submitted by a browser extension running on the storefront's
//! origin, so every route is served with permissive CORS (see
//! [build_router](crate::build_router)).

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{AppState, models::Order, stores::OrderStore};

/// The query parameters for [search_orders].
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// The free-text query. A price or amount when numeric, a substring of
    /// the card label, item texts, or date otherwise.
    pub q: Option<String>,
}

/// Handler for saving a scraped order.
///
/// `PUT` because re-submitting an order is expected (the extension retries):
/// the response is 201 when the order was seen for the first time, 200 when
/// it replaced an existing order, and 400 when the ID in the path does not
/// match the one in the body.
pub async fn save_order<O>(
    State(state): State<AppState<O>>,
    Path(id): Path<String>,
    Json(order): Json<Order>,
) -> Response
where
    O: OrderStore + Clone + Send + Sync + 'static,
{
    if order.id != id {
        return (
            StatusCode::BAD_REQUEST,
            "The order ID in the path does not match the one in the body",
        )
            .into_response();
    }

    match state.store.save(&order) {
        Ok(true) => StatusCode::CREATED.into_response(),
        Ok(false) => StatusCode::OK.into_response(),
        Err(error) => {
            tracing::error!("Error saving order {id}: {error}");
            error.into_response()
        }
    }
}

/// Handler for fetching a single order by its ID.
pub async fn get_order<O>(State(state): State<AppState<O>>, Path(id): Path<String>) -> Response
where
    O: OrderStore + Clone + Send + Sync + 'static,
{
    match state.store.load(&id) {
        Ok(order) => Json(order).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Handler for searching saved orders.
///
/// Always returns a JSON array; no matches is an empty array, not an error.
pub async fn search_orders<O>(
    State(state): State<AppState<O>>,
    Query(params): Query<SearchParams>,
) -> Response
where
    O: OrderStore + Clone + Send + Sync + 'static,
{
    let query = params.q.unwrap_or_default();

    match state.store.search(&query) {
        Ok(orders) => Json(orders).into_response(),
        Err(error) => error.into_response(),
    }
}
