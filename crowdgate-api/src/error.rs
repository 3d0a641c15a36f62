use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crowdgate_booking::SagaError;
use crowdgate_core::repository::RepositoryError;
use crowdgate_payment::PaymentError;
use crowdgate_reservation::ReservationError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => {
                tracing::error!("Dependency unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        // Only hard store unavailability surfaces as a 5xx
        ApiError::Unavailable(err.to_string())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(msg) => ApiError::Unavailable(msg),
            RepositoryError::Decode(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::SeatsNotOwned => ApiError::Validation(
                "Seats are not locked by this user. Please lock seats first.".to_string(),
            ),
            SagaError::BookingNotFound(id) => {
                ApiError::NotFound(format!("Booking not found: {}", id))
            }
            SagaError::NotBookingOwner(id) => {
                ApiError::Forbidden(format!("Booking {} does not belong to this user", id))
            }
            SagaError::CannotCancelConfirmed(_) => {
                ApiError::Conflict("Cannot cancel confirmed booking".to_string())
            }
            SagaError::Repository(err) => err.into(),
            SagaError::Reservation(err) => err.into(),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Repository(err) => err.into(),
            PaymentError::Serialization(e) => ApiError::Internal(e.to_string()),
        }
    }
}
