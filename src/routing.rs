//! Application router configuration.

use axum::{
    Router,
    http::Method,
    routing::{get, put},
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    AppState,
    api::{get_order, save_order, search_orders},
    endpoints,
    reconcile::{get_reconciliation, post_approvals},
    stores::OrderStore,
};

/// Return a router with all the app's routes.
///
/// Every route allows cross-origin requests: orders are submitted by a
/// browser extension running on the storefront's origin.
pub fn build_router<O>(state: AppState<O>) -> Router
where
    O: OrderStore + Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(endpoints::PURCHASES, get(search_orders::<O>))
        .route(
            endpoints::PURCHASE,
            put(save_order::<O>).get(get_order::<O>),
        )
        .route(
            endpoints::RECONCILE,
            get(get_reconciliation::<O>).post(post_approvals::<O>),
        )
        .layer(cors)
        .with_state(state)
}
