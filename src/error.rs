//! Defines the app level error type and its mapping to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested record could not be found.
    ///
    /// For HTTP request handlers, the client should check that the order ID
    /// is correct and that the order has been saved.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("record not found")]
    NotFound,

    /// A line item could not be added to the item table during a save.
    #[error("item not inserted: {0}")]
    ItemNotInserted(rusqlite::Error),

    /// The links of the order being replaced could not be removed.
    #[error("existing purchase items not deleted: {0}")]
    StaleLinksNotDeleted(rusqlite::Error),

    /// The row of the order being replaced could not be removed.
    #[error("existing purchase not deleted: {0}")]
    StalePurchaseNotDeleted(rusqlite::Error),

    /// The order row could not be inserted during a save.
    #[error("purchase not inserted: {0}")]
    PurchaseNotInserted(rusqlite::Error),

    /// An order to item link could not be inserted during a save.
    #[error("purchase item not inserted: {0}")]
    PurchaseItemNotInserted(rusqlite::Error),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// The budgeting service could not be reached.
    ///
    /// Carries the transport error as a string for logging on the server.
    #[error("budget service request failed: {0}")]
    YnabRequest(String),

    /// The budgeting service rejected a request.
    #[error("budget service returned status {0}")]
    YnabStatus(u16),

    /// The budgeting service sent a response this application cannot read.
    #[error("could not parse budget service response: {0}")]
    YnabPayload(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            // Any errors that are not handled above are not intended to be
            // shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::Error;

    #[test]
    fn no_rows_maps_to_not_found() {
        let error = Error::from(rusqlite::Error::QueryReturnedNoRows);

        assert_eq!(error, Error::NotFound);
    }

    #[test]
    fn not_found_renders_as_404() {
        let response = Error::NotFound.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_errors_render_as_500() {
        let response = Error::YnabStatus(401).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
