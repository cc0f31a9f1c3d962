//! Domain types for the budgeting service that orders are reconciled against.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// The ID of a budget in the budgeting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetId(pub String);

impl Display for BudgetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ID of a spending category in the budgeting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ID of a transaction in the budgeting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A budget the user maintains in the budgeting service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    /// The budget's ID.
    pub id: BudgetId,
    /// The budget's display name.
    pub name: String,
    /// When the budget was last modified.
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

/// A named group of spending categories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    /// The group's display name, e.g. "Monthly Bills".
    pub name: String,
    /// The visible categories in the group.
    pub categories: Vec<Category>,
}

/// A spending category that transactions can be filed under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    /// The category's ID.
    pub id: CategoryId,
    /// The category's display name.
    pub name: String,
}

/// A transaction the user has not yet approved in the budgeting service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnapprovedTransaction {
    /// The transaction's ID.
    pub id: TransactionId,
    /// The transaction amount in the account's currency (outflows negative).
    pub amount: f64,
    /// The date the transaction was made.
    #[serde(with = "iso_date")]
    pub date: Date,
    /// The payee name reported by the account import.
    pub payee: String,
}

/// A categorization to apply to a transaction when approving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    /// The category to file the transaction under.
    pub category_id: CategoryId,
    /// The category's display name.
    pub category_name: String,
    /// The payee name to record.
    pub payee: String,
}

/// (De)serializes a [Date] as "YYYY-MM-DD", the budgeting service's wire
/// format.
pub(crate) mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::Error as _};
    use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

    const FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        let text = date.format(&FORMAT).map_err(S::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let text = String::deserialize(deserializer)?;
        Date::parse(&text, &FORMAT).map_err(D::Error::custom)
    }
}
