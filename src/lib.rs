//! Receipteur is a web service for archiving purchase receipts scraped from
//! an e-commerce account and reconciling them against your budget.
//!
//! This library provides a JSON REST API over a SQLite archive of orders.
//! Orders are submitted by a browser extension, searched by price, paid
//! amount, card, item text, or date, and cross-referenced against the
//! unapproved transactions of a budgeting service (YNAB) for manual
//! categorization.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

pub mod api;
mod app_state;
pub mod endpoints;
mod error;
pub mod models;
pub mod reconcile;
mod routing;
pub mod stores;
pub mod ynab;

pub use app_state::{AppState, SqliteAppState};
pub use error::Error;
pub use routing::build_router;
pub use stores::{OrderStore, SqliteOrderStore};

/// An async task that waits for either the ctrl+c or terminate signal,
/// whichever comes first, and then signals the server to shut down
/// gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
