//! Read-only transaction endpoints.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use crowdgate_domain::transaction::Transaction;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/:transaction_id", get(get_transaction))
        .route("/payments/booking/:booking_id", get(list_for_booking))
        .route("/payments/user/:user_id", get(list_for_user))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction = state
        .payments
        .get(transaction_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transaction not found: {}", transaction_id)))?;
    Ok(Json(transaction))
}

async fn list_for_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let transactions = state.payments.list_for_booking(booking_id).await?;
    Ok(Json(transactions))
}

async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let transactions = state.payments.list_for_user(&user_id).await?;
    Ok(Json(transactions))
}
