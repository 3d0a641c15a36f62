use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use crowdgate_domain::keys;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod inventory;
pub mod payments;
pub mod state;
pub mod workers;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route("/health", get(health))
        .merge(inventory::routes())
        .merge(bookings::routes())
        .merge(payments::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "UP",
        "service": "crowdgate-api",
    }))
}

/// Fixed-window limiter on the lock store: INCR per client address, EXPIRE
/// on the first hit of the window. Fails open when the store is down so a
/// store outage degrades to unthrottled rather than unavailable.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().cloned()
    else {
        // No connection info (e.g. in-process tests); nothing to key on
        return Ok(next.run(req).await);
    };

    let key = keys::rate_limit(&addr.ip().to_string());
    match state.lock_store.incr(&key).await {
        Ok(count) => {
            if count == 1 {
                let _ = state
                    .lock_store
                    .expire(&key, Duration::from_secs(60))
                    .await;
            }
            if count > state.rate_limit_per_minute {
                return Err((
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    "Rate limit exceeded",
                ));
            }
            Ok(next.run(req).await)
        }
        Err(_) => Ok(next.run(req).await),
    }
}
