use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use wabiz_core::{ApiResponse, PageRequest};
use wabiz_worker::{PaymentOutcome, Wallet, WalletTransaction};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::Payload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub order_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResult {
    pub transaction: WalletTransaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Wallet>,
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Wallet> {
    Ok(Json(ApiResponse::ok("Wallet", state.worker.wallet(&user).await?)))
}

pub async fn transactions(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Vec<WalletTransaction>> {
    let page = state.worker.list_transactions(&user, page).await?;
    Ok(Json(ApiResponse::paged("Transactions", page)))
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Payload(req): Payload<OrderRequest>,
) -> ApiResult<WalletTransaction> {
    let tx = state.worker.create_order(&user, &req.order_id, req.amount).await?;
    Ok(Json(ApiResponse::ok("Order created", tx)))
}

/// Called by the payment provider, not by API clients.
pub async fn payment_callback(
    State(state): State<AppState>,
    Payload(callback): Payload<PaymentCallback>,
) -> ApiResult<PaymentResult> {
    let outcome = state
        .worker
        .reconcile_payment(&callback.order_id, &callback.payment_id, &callback.signature)
        .await?;

    let (message, result) = match outcome {
        PaymentOutcome::Completed { transaction, wallet } => (
            "Payment credited",
            PaymentResult {
                transaction,
                wallet: Some(wallet),
            },
        ),
        PaymentOutcome::AlreadyHandled(transaction) => (
            "Payment already processed",
            PaymentResult {
                transaction,
                wallet: None,
            },
        ),
    };
    Ok(Json(ApiResponse::ok(message, result)))
}
