//! Booking lifecycle endpoints, delegating to the saga.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use crowdgate_domain::booking::Booking;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingRequest {
    user_id: String,
    event_id: i64,
    seat_ids: Vec<String>,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking).delete(cancel_booking))
        .route("/bookings/user/:user_id", get(list_user_bookings))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    if req.seat_ids.is_empty() {
        return Err(ApiError::Validation("No seats provided".to_string()));
    }

    let booking = state
        .saga
        .create_booking(&req.user_id, req.event_id, req.seat_ids, req.amount)
        .await?;

    info!("Booking created: bookingId={}", booking.id);
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state.saga.get(booking_id, &query.user_id).await?;
    Ok(Json(booking))
}

async fn list_user_bookings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state.saga.list_for_user(&user_id).await?;
    Ok(Json(bookings))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, ApiError> {
    state.saga.cancel(booking_id, &query.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
