//! Contains the trait and implementation for objects that store orders.

mod sqlite;

pub use sqlite::SqliteOrderStore;

use crate::{Error, models::Order};

/// Handles the persistence and retrieval of orders.
pub trait OrderStore {
    /// Save `order`, replacing any previously saved order with the same ID.
    ///
    /// Returns `true` when the order was seen for the first time and `false`
    /// when it replaced an existing order.
    fn save(&self, order: &Order) -> Result<bool, Error>;

    /// Retrieve the order with `id` from the store.
    fn load(&self, id: &str) -> Result<Order, Error>;

    /// Retrieve the orders matching the free-text `query`.
    fn search(&self, query: &str) -> Result<Vec<Order>, Error>;
}
