//! Seat locking and Tatkal inventory endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockRequest {
    event_id: i64,
    seat_id: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockManyRequest {
    event_id: i64,
    seat_ids: Vec<String>,
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LockResponse {
    success: bool,
    message: String,
    event_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seat_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeatCheckResponse {
    event_id: i64,
    seat_id: String,
    locked: bool,
    owner: Option<String>,
    ttl_seconds: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InventoryStatusResponse {
    event_id: i64,
    locked_seats_count: usize,
    locked_seats: Vec<String>,
    tatkal_remaining: i64,
    tatkal_sold_out: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TatkalInitQuery {
    total_seats: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TatkalResponse {
    success: bool,
    message: String,
    event_id: i64,
    remaining_seats: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inventory/lock", post(lock_seat))
        .route("/inventory/lock-multiple", post(lock_many))
        .route("/inventory/release", post(release_seat))
        .route("/inventory/check/:event_id/:seat_id", get(check_seat))
        .route("/inventory/status/:event_id", get(status))
        .route("/inventory/tatkal/init/:event_id", post(tatkal_init))
        .route("/inventory/tatkal/reserve/:event_id", post(tatkal_reserve))
        .route("/inventory/tatkal/release/:event_id", post(tatkal_release))
        .route("/inventory/force-release/:event_id", post(force_release))
}

async fn lock_seat(
    State(state): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Result<Json<LockResponse>, ApiError> {
    info!(
        "Lock seat request: event={}, seat={}, user={}",
        req.event_id, req.seat_id, req.user_id
    );

    let locked = state
        .seat_locks
        .try_lock(req.event_id, &req.seat_id, &req.user_id)
        .await?;

    if locked {
        let ttl = state.seat_locks.ttl(req.event_id, &req.seat_id).await?;
        Ok(Json(LockResponse {
            success: true,
            message: "Seat locked successfully".to_string(),
            event_id: req.event_id,
            seat_id: Some(req.seat_id),
            seat_ids: None,
            owner: Some(req.user_id),
            ttl_seconds: Some(ttl),
        }))
    } else {
        let owner = state.seat_locks.owner(req.event_id, &req.seat_id).await?;
        Ok(Json(LockResponse {
            success: false,
            message: "Seat already locked by another user".to_string(),
            event_id: req.event_id,
            seat_id: Some(req.seat_id),
            seat_ids: None,
            owner,
            ttl_seconds: None,
        }))
    }
}

async fn lock_many(
    State(state): State<AppState>,
    Json(req): Json<LockManyRequest>,
) -> Result<Json<LockResponse>, ApiError> {
    info!(
        "Lock multiple seats request: event={}, seats={:?}, user={}",
        req.event_id, req.seat_ids, req.user_id
    );

    if req.seat_ids.is_empty() {
        return Err(ApiError::Validation("No seats provided".to_string()));
    }

    let locked = state
        .seat_locks
        .try_lock_many(req.event_id, &req.seat_ids, &req.user_id)
        .await?;

    Ok(Json(LockResponse {
        success: locked,
        message: if locked {
            "All seats locked successfully".to_string()
        } else {
            "Failed to lock all seats".to_string()
        },
        event_id: req.event_id,
        seat_id: None,
        seat_ids: Some(req.seat_ids),
        owner: None,
        ttl_seconds: None,
    }))
}

async fn release_seat(
    State(state): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Result<Json<LockResponse>, ApiError> {
    info!(
        "Release seat request: event={}, seat={}, user={}",
        req.event_id, req.seat_id, req.user_id
    );

    let released = state
        .seat_locks
        .release(req.event_id, &req.seat_id, &req.user_id)
        .await?;

    Ok(Json(LockResponse {
        success: released,
        message: if released {
            "Seat released successfully".to_string()
        } else {
            "Failed to release seat".to_string()
        },
        event_id: req.event_id,
        seat_id: Some(req.seat_id),
        seat_ids: None,
        owner: None,
        ttl_seconds: None,
    }))
}

async fn check_seat(
    State(state): State<AppState>,
    Path((event_id, seat_id)): Path<(i64, String)>,
) -> Result<Json<SeatCheckResponse>, ApiError> {
    let view = state.seat_locks.inspect(event_id, &seat_id).await?;
    Ok(Json(SeatCheckResponse {
        event_id,
        seat_id,
        locked: view.locked,
        owner: view.owner,
        ttl_seconds: view.ttl_seconds,
    }))
}

async fn status(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<InventoryStatusResponse>, ApiError> {
    let locked_seats = state.seat_locks.locked_seats(event_id).await?;
    let tatkal_remaining = state.tatkal.remaining(event_id).await?;
    let tatkal_sold_out = state.tatkal.is_sold_out(event_id).await?;

    Ok(Json(InventoryStatusResponse {
        event_id,
        locked_seats_count: locked_seats.len(),
        locked_seats,
        tatkal_remaining,
        tatkal_sold_out,
    }))
}

async fn tatkal_init(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Query(query): Query<TatkalInitQuery>,
) -> Result<Json<TatkalResponse>, ApiError> {
    info!(
        "Initialize Tatkal inventory: event={}, seats={}",
        event_id, query.total_seats
    );

    if query.total_seats < 0 {
        return Err(ApiError::Validation(
            "totalSeats must not be negative".to_string(),
        ));
    }

    state.tatkal.initialize(event_id, query.total_seats).await?;
    Ok(Json(TatkalResponse {
        success: true,
        message: "Inventory initialized".to_string(),
        event_id,
        remaining_seats: query.total_seats,
    }))
}

async fn tatkal_reserve(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<TatkalResponse>, ApiError> {
    let reserved = state.tatkal.try_reserve(event_id).await?;
    let remaining = state.tatkal.remaining(event_id).await?;

    Ok(Json(TatkalResponse {
        success: reserved,
        message: if reserved {
            "Seat reserved".to_string()
        } else {
            "Sold out".to_string()
        },
        event_id,
        remaining_seats: remaining,
    }))
}

async fn tatkal_release(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<TatkalResponse>, ApiError> {
    state.tatkal.release(event_id).await?;
    let remaining = state.tatkal.remaining(event_id).await?;

    Ok(Json(TatkalResponse {
        success: true,
        message: "Seat released".to_string(),
        event_id,
        remaining_seats: remaining,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForceReleaseResponse {
    event_id: i64,
    released: u64,
}

async fn force_release(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<ForceReleaseResponse>, ApiError> {
    let released = state.seat_locks.force_release_all(event_id).await?;
    Ok(Json(ForceReleaseResponse { event_id, released }))
}
