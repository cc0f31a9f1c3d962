//! Implements a struct that holds the state of the REST server.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    stores::SqliteOrderStore,
    ynab::{YnabCache, YnabClient},
};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState<O> {
    /// The order store.
    pub store: O,

    /// The budgeting service client, when a token was configured.
    pub ynab: Option<Arc<YnabClient>>,

    /// Cached budgeting service reads, shared across requests.
    pub ynab_cache: Arc<Mutex<YnabCache>>,
}

/// An alias for an [AppState] that uses SQLite for the backend.
pub type SqliteAppState = AppState<SqliteOrderStore>;

impl<O> AppState<O> {
    /// Create a new [AppState] over `store`.
    ///
    /// Reconciliation endpoints respond with 503 when `ynab` is [None];
    /// saving and searching orders works either way.
    pub fn new(store: O, ynab: Option<YnabClient>) -> Self {
        Self {
            store,
            ynab: ynab.map(Arc::new),
            ynab_cache: Arc::new(Mutex::new(YnabCache::default())),
        }
    }
}
