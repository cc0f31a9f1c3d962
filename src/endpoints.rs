//! The API endpoint URIs.

/// The route to search saved purchases.
pub const PURCHASES: &str = "/api/purchases";
/// The route to save or fetch a single purchase.
pub const PURCHASE: &str = "/api/purchases/{id}";
/// The route to cross-reference unapproved budget transactions with
/// purchases, and to approve their categorizations.
pub const RECONCILE: &str = "/api/reconcile";
