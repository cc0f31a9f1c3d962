//! A thin client for the budgeting service's REST API (YNAB).
//!
//! The client itself is stateless; budgets and categories are cached in an
//! explicit [YnabCache] that callers own and pass in, so cache lifetime and
//! invalidation are visible at the call site instead of hiding in process
//! wide state.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    Error,
    models::{
        Budget, BudgetId, Category, CategoryGroup, CategoryId, TransactionId, TransactionUpdate,
        UnapprovedTransaction,
    },
};

/// The public API server, used when no other server is configured.
pub const DEFAULT_SERVER: &str = "https://api.ynab.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the budgeting service.
#[derive(Debug, Clone)]
pub struct YnabConfig {
    /// The personal access token sent as a bearer token.
    pub token: String,
    /// The base URL of the API, e.g. [DEFAULT_SERVER].
    pub server: String,
}

/// Cached budgeting service reads.
///
/// Budgets and categories change rarely, so repeat reads within a cache's
/// lifetime are served locally. Call [YnabCache::invalidate] to force the
/// next read to hit the service again.
#[derive(Debug, Default)]
pub struct YnabCache {
    budgets: Option<Vec<Budget>>,
    categories: HashMap<BudgetId, Vec<CategoryGroup>>,
}

impl YnabCache {
    /// Drop everything cached so the next read fetches fresh data.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

/// Calls the budgeting service's REST API.
pub struct YnabClient {
    http: reqwest::Client,
    token: String,
    server: String,
}

impl YnabClient {
    /// Create a client for the service at `config.server`.
    ///
    /// # Errors
    /// Returns an [Error::YnabRequest] if the underlying HTTP client could
    /// not be built.
    pub fn new(config: YnabConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| Error::YnabRequest(error.to_string()))?;

        Ok(Self {
            http,
            token: config.token,
            server: config.server,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = format!("{}{}", self.server, path);
        tracing::debug!("ynab GET {url}");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|error| Error::YnabRequest(error.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::YnabStatus(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|error| Error::YnabPayload(error.to_string()))
    }

    /// The user's budgets, most recently modified first.
    ///
    /// Budgets the service reports without a modification time are skipped.
    pub async fn budgets(&self, cache: &mut YnabCache) -> Result<Vec<Budget>, Error> {
        if let Some(budgets) = &cache.budgets {
            return Ok(budgets.clone());
        }

        let payload: BudgetsResponse = self.get("/budgets").await?;
        let budgets = budgets_from_payload(payload);

        cache.budgets = Some(budgets.clone());
        Ok(budgets)
    }

    /// The visible category groups of `budget_id`.
    ///
    /// Hidden and deleted groups and categories are dropped, as are groups
    /// left with no categories.
    pub async fn categories(
        &self,
        budget_id: &BudgetId,
        cache: &mut YnabCache,
    ) -> Result<Vec<CategoryGroup>, Error> {
        if let Some(groups) = cache.categories.get(budget_id) {
            return Ok(groups.clone());
        }

        let payload: CategoriesResponse = self.get(&format!("/budgets/{budget_id}/categories")).await?;
        let groups = groups_from_payload(payload);

        cache.categories.insert(budget_id.clone(), groups.clone());
        Ok(groups)
    }

    /// The transactions of `budget_id` awaiting approval.
    ///
    /// Never cached: the whole point is seeing what is new.
    pub async fn unapproved(
        &self,
        budget_id: &BudgetId,
    ) -> Result<Vec<UnapprovedTransaction>, Error> {
        let payload: TransactionsResponse = self
            .get(&format!("/budgets/{budget_id}/transactions?type=unapproved"))
            .await?;

        Ok(transactions_from_payload(payload))
    }

    /// Approve each transaction in `updates` with its categorization.
    ///
    /// An empty update set is a no-op, not an error.
    ///
    /// # Errors
    /// Returns an [Error::YnabStatus] if the service rejects the update, or
    /// an [Error::YnabRequest] if it could not be reached.
    pub async fn approve(
        &self,
        budget_id: &BudgetId,
        updates: &HashMap<TransactionId, TransactionUpdate>,
    ) -> Result<(), Error> {
        if updates.is_empty() {
            return Ok(());
        }

        let body = SaveTransactionsBody {
            transactions: updates
                .iter()
                .map(|(id, update)| SaveTransactionPayload {
                    id: id.clone(),
                    approved: true,
                    category_id: update.category_id.clone(),
                    payee_name: update.payee.clone(),
                })
                .collect(),
        };

        let url = format!("{}/budgets/{budget_id}/transactions", self.server);
        tracing::debug!("ynab PATCH {url}");

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|error| Error::YnabRequest(error.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::YnabStatus(response.status().as_u16()));
        }

        Ok(())
    }
}

// The service's wire format. Only the fields this application reads are
// declared; serde ignores the rest.

#[derive(Debug, Deserialize)]
struct BudgetsResponse {
    data: BudgetsData,
}

#[derive(Debug, Deserialize)]
struct BudgetsData {
    budgets: Vec<BudgetPayload>,
}

#[derive(Debug, Deserialize)]
struct BudgetPayload {
    id: String,
    name: String,
    last_modified_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    data: CategoriesData,
}

#[derive(Debug, Deserialize)]
struct CategoriesData {
    category_groups: Vec<CategoryGroupPayload>,
}

#[derive(Debug, Deserialize)]
struct CategoryGroupPayload {
    name: String,
    hidden: bool,
    deleted: bool,
    categories: Vec<CategoryPayload>,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    id: String,
    name: String,
    hidden: bool,
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    data: TransactionsData,
}

#[derive(Debug, Deserialize)]
struct TransactionsData {
    transactions: Vec<TransactionPayload>,
}

#[derive(Debug, Deserialize)]
struct TransactionPayload {
    id: String,
    #[serde(with = "crate::models::budget::iso_date")]
    date: Date,
    /// Milliunits: one thousandth of the currency unit.
    amount: i64,
    payee_name: Option<String>,
    import_payee_name: Option<String>,
    import_payee_name_original: Option<String>,
}

#[derive(Debug, Serialize)]
struct SaveTransactionsBody {
    transactions: Vec<SaveTransactionPayload>,
}

#[derive(Debug, Serialize)]
struct SaveTransactionPayload {
    id: TransactionId,
    approved: bool,
    category_id: CategoryId,
    payee_name: String,
}

fn budgets_from_payload(payload: BudgetsResponse) -> Vec<Budget> {
    let mut budgets: Vec<Budget> = payload
        .data
        .budgets
        .into_iter()
        .filter_map(|budget| {
            let raw_modified = budget.last_modified_on?;
            let last_modified = match OffsetDateTime::parse(&raw_modified, &Rfc3339) {
                Ok(last_modified) => last_modified,
                Err(error) => {
                    tracing::warn!(
                        "skipping budget {}, bad modification time {raw_modified:?}: {error}",
                        budget.id
                    );
                    return None;
                }
            };

            Some(Budget {
                id: BudgetId(budget.id),
                name: budget.name,
                last_modified,
            })
        })
        .collect();

    budgets.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

    budgets
}

fn groups_from_payload(payload: CategoriesResponse) -> Vec<CategoryGroup> {
    payload
        .data
        .category_groups
        .into_iter()
        .filter(|group| !group.hidden && !group.deleted)
        .filter_map(|group| {
            let categories: Vec<Category> = group
                .categories
                .into_iter()
                .filter(|category| !category.hidden && !category.deleted)
                .map(|category| Category {
                    id: CategoryId(category.id),
                    name: category.name,
                })
                .collect();

            if categories.is_empty() {
                return None;
            }

            Some(CategoryGroup {
                name: group.name,
                categories,
            })
        })
        .collect()
}

fn transactions_from_payload(payload: TransactionsResponse) -> Vec<UnapprovedTransaction> {
    payload
        .data
        .transactions
        .into_iter()
        .map(|transaction| UnapprovedTransaction {
            id: TransactionId(transaction.id),
            amount: transaction.amount as f64 / 1000.0,
            date: transaction.date,
            payee: transaction
                .import_payee_name
                .or(transaction.import_payee_name_original)
                .or(transaction.payee_name)
                .unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod payload_tests {
    use time::{Date, Month};

    use super::{
        BudgetsResponse, CategoriesResponse, TransactionsResponse, budgets_from_payload,
        groups_from_payload, transactions_from_payload,
    };

    #[test]
    fn budgets_are_sorted_most_recently_modified_first() {
        let payload: BudgetsResponse = serde_json::from_str(
            r#"{"data": {"budgets": [
                {"id": "a", "name": "Old", "last_modified_on": "2023-06-01T10:00:00+00:00"},
                {"id": "b", "name": "Current", "last_modified_on": "2024-02-01T10:00:00+00:00"},
                {"id": "c", "name": "Unsaved", "last_modified_on": null}
            ]}}"#,
        )
        .unwrap();

        let budgets = budgets_from_payload(payload);

        let names: Vec<&str> = budgets.iter().map(|budget| budget.name.as_str()).collect();
        assert_eq!(names, vec!["Current", "Old"]);
    }

    #[test]
    fn hidden_and_deleted_categories_are_dropped() {
        let payload: CategoriesResponse = serde_json::from_str(
            r#"{"data": {"category_groups": [
                {"name": "Bills", "hidden": false, "deleted": false, "categories": [
                    {"id": "c1", "name": "Power", "hidden": false, "deleted": false},
                    {"id": "c2", "name": "Retired", "hidden": true, "deleted": false}
                ]},
                {"name": "Hidden Group", "hidden": true, "deleted": false, "categories": [
                    {"id": "c3", "name": "Invisible", "hidden": false, "deleted": false}
                ]},
                {"name": "Emptied", "hidden": false, "deleted": false, "categories": [
                    {"id": "c4", "name": "Gone", "hidden": false, "deleted": true}
                ]}
            ]}}"#,
        )
        .unwrap();

        let groups = groups_from_payload(payload);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Bills");
        assert_eq!(groups[0].categories.len(), 1);
        assert_eq!(groups[0].categories[0].name, "Power");
    }

    #[test]
    fn transaction_amounts_are_scaled_from_milliunits() {
        let payload: TransactionsResponse = serde_json::from_str(
            r#"{"data": {"transactions": [
                {"id": "t1", "date": "2024-01-15", "amount": -21990,
                 "payee_name": "Card Payment", "import_payee_name": null,
                 "import_payee_name_original": null}
            ]}}"#,
        )
        .unwrap();

        let transactions = transactions_from_payload(payload);

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].amount, -21.99);
        assert_eq!(
            transactions[0].date,
            Date::from_calendar_date(2024, Month::January, 15).unwrap()
        );
    }

    #[test]
    fn payee_prefers_import_names() {
        let payload: TransactionsResponse = serde_json::from_str(
            r#"{"data": {"transactions": [
                {"id": "t1", "date": "2024-01-15", "amount": -1000,
                 "payee_name": "Cleaned Up Name", "import_payee_name": "AMZN Mktp",
                 "import_payee_name_original": "AMZN MKTP US*1A2B3C"},
                {"id": "t2", "date": "2024-01-16", "amount": -2000,
                 "payee_name": "Cleaned Up Name", "import_payee_name": null,
                 "import_payee_name_original": "AMZN MKTP US*4D5E6F"},
                {"id": "t3", "date": "2024-01-17", "amount": -3000,
                 "payee_name": "Cleaned Up Name", "import_payee_name": null,
                 "import_payee_name_original": null}
            ]}}"#,
        )
        .unwrap();

        let transactions = transactions_from_payload(payload);

        let payees: Vec<&str> = transactions
            .iter()
            .map(|transaction| transaction.payee.as_str())
            .collect();
        assert_eq!(
            payees,
            vec!["AMZN Mktp", "AMZN MKTP US*4D5E6F", "Cleaned Up Name"]
        );
    }
}
