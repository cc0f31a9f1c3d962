//! Cross-references unapproved budgeting service transactions with stored
//! orders so the user can categorize their spending.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    models::{
        Budget, BudgetId, CategoryGroup, CategoryId, Order, TransactionId, TransactionUpdate,
        UnapprovedTransaction,
    },
    stores::OrderStore,
    ynab::YnabClient,
};

/// Orders charged within this many days of a transaction (exclusive) are
/// candidate matches for it.
const MATCH_WINDOW_DAYS: i32 = 3;

/// The orders that plausibly explain `transaction`: those whose charge date
/// falls within [MATCH_WINDOW_DAYS] days of the transaction date.
///
/// Orders with unparseable charge dates are logged and never matched.
pub fn orders_near(transaction: &UnapprovedTransaction, orders: &[Order]) -> Vec<Order> {
    orders
        .iter()
        .filter(|order| match order.charge.date.date() {
            Some(date) => {
                (date.to_julian_day() - transaction.date.to_julian_day()).abs() < MATCH_WINDOW_DAYS
            }
            None => {
                tracing::info!("ignoring order {}, bad date {}", order.id, order.charge.date);
                false
            }
        })
        .cloned()
        .collect()
}

/// One unapproved transaction with its candidate orders.
#[derive(Debug, Serialize)]
pub struct ReconcileEntry {
    /// The transaction awaiting approval.
    pub transaction: UnapprovedTransaction,
    /// Stored orders that match the transaction's amount and date.
    pub orders: Vec<Order>,
}

/// Everything the client needs to categorize a budget's unapproved
/// transactions.
#[derive(Debug, Serialize)]
pub struct ReconciliationPage {
    /// The budget the transactions belong to.
    pub budget_id: BudgetId,
    /// All of the user's budgets, most recently modified first.
    pub budgets: Vec<Budget>,
    /// The visible categories of the budget.
    pub categories: Vec<CategoryGroup>,
    /// The unapproved transactions with their candidate orders.
    pub transactions: Vec<ReconcileEntry>,
}

/// The query parameters for [get_reconciliation].
#[derive(Debug, Deserialize)]
pub struct ReconcileParams {
    /// The budget to reconcile. Defaults to the most recently modified one.
    pub budget_id: Option<String>,
}

/// Handler for fetching the unapproved transactions of a budget along with
/// the stored orders that plausibly explain each one.
pub async fn get_reconciliation<O>(
    State(state): State<AppState<O>>,
    Query(params): Query<ReconcileParams>,
) -> Response
where
    O: OrderStore + Clone + Send + Sync + 'static,
{
    let Some(ynab) = state.ynab.clone() else {
        return budgeting_unconfigured();
    };

    match build_page(&state, &ynab, params.budget_id.map(BudgetId)).await {
        Ok(page) => Json(page).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn build_page<O>(
    state: &AppState<O>,
    ynab: &Arc<YnabClient>,
    requested_budget: Option<BudgetId>,
) -> Result<ReconciliationPage, Error>
where
    O: OrderStore + Clone + Send + Sync + 'static,
{
    let mut cache = state.ynab_cache.lock().await;

    let budgets = ynab.budgets(&mut cache).await?;
    let budget_id = match requested_budget {
        Some(id) => id,
        None => budgets
            .first()
            .map(|budget| budget.id.clone())
            .ok_or(Error::NotFound)?,
    };
    let categories = ynab.categories(&budget_id, &mut cache).await?;
    drop(cache);

    let unapproved = ynab.unapproved(&budget_id).await?;

    let mut transactions = Vec::with_capacity(unapproved.len());
    for transaction in unapproved {
        let candidates = state
            .store
            .search(&format!("{:.2}", transaction.amount.abs()))?;

        transactions.push(ReconcileEntry {
            orders: orders_near(&transaction, &candidates),
            transaction,
        });
    }

    Ok(ReconciliationPage {
        budget_id,
        budgets,
        categories,
        transactions,
    })
}

/// The body for approving categorized transactions.
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    /// The budget the transactions belong to.
    pub budget_id: BudgetId,
    /// The categorizations to apply.
    pub updates: Vec<ApproveEntry>,
}

/// One transaction to approve with its chosen category.
#[derive(Debug, Deserialize)]
pub struct ApproveEntry {
    /// The transaction to approve.
    pub transaction_id: TransactionId,
    /// The category to file it under. Entries left uncategorized (an empty
    /// ID or the "-1" sentinel) are skipped.
    pub category_id: CategoryId,
    /// The category's display name.
    pub category_name: String,
    /// The payee name to record.
    pub payee: String,
}

/// Handler for approving categorized transactions in the budgeting service.
pub async fn post_approvals<O>(
    State(state): State<AppState<O>>,
    Json(request): Json<ApproveRequest>,
) -> Response
where
    O: OrderStore + Clone + Send + Sync + 'static,
{
    let Some(ynab) = state.ynab.clone() else {
        return budgeting_unconfigured();
    };

    let updates: HashMap<TransactionId, TransactionUpdate> = request
        .updates
        .into_iter()
        .filter(|entry| !entry.category_id.0.is_empty() && entry.category_id.0 != "-1")
        .map(|entry| {
            (
                entry.transaction_id,
                TransactionUpdate {
                    category_id: entry.category_id,
                    category_name: entry.category_name,
                    payee: entry.payee,
                },
            )
        })
        .collect();

    match ynab.approve(&request.budget_id, &updates).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

fn budgeting_unconfigured() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "The budgeting service is not configured",
    )
        .into_response()
}
