//! This module defines the domain data types.

pub(crate) mod budget;
mod order;

pub use budget::{
    Budget, BudgetId, Category, CategoryGroup, CategoryId, TransactionId, TransactionUpdate,
    UnapprovedTransaction,
};
pub use order::{Charge, ChargeDate, Order};
