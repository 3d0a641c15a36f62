use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowdgate_core::repository::{BookingRepository, RepositoryError};
use crowdgate_domain::booking::{Booking, BookingStatus, NewBooking};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::db_err;

#[derive(Clone)]
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn booking_from_row(row: &PgRow) -> Result<Booking, RepositoryError> {
    let status_text: String = row.try_get("status").map_err(db_err)?;
    let status = BookingStatus::parse(&status_text)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown booking status '{}'", status_text)))?;

    Ok(Booking {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        event_id: row.try_get("event_id").map_err(db_err)?,
        seat_ids: row.try_get("seat_ids").map_err(db_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        status,
        created_at: row.try_get("created_at").map_err(db_err)?,
        confirmed_at: row.try_get("confirmed_at").map_err(db_err)?,
        expires_at: row.try_get("expires_at").map_err(db_err)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, event_id, seat_ids, amount, status, created_at, confirmed_at, expires_at";

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create(&self, new_booking: NewBooking) -> Result<Booking, RepositoryError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bookings (user_id, event_id, seat_ids, amount, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&new_booking.user_id)
        .bind(new_booking.event_id)
        .bind(&new_booking.seat_ids)
        .bind(new_booking.amount)
        .bind(BookingStatus::Pending.as_str())
        .bind(new_booking.created_at)
        .bind(new_booking.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Booking {
            id,
            user_id: new_booking.user_id,
            event_id: new_booking.event_id,
            seat_ids: new_booking.seat_ids,
            amount: new_booking.amount,
            status: BookingStatus::Pending,
            created_at: new_booking.created_at,
            confirmed_at: None,
            expires_at: new_booking.expires_at,
        })
    }

    async fn find(&self, booking_id: i64) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn find_for_user(
        &self,
        booking_id: i64,
        user_id: &str,
    ) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bookings WHERE id = $1 AND user_id = $2",
            SELECT_COLUMNS
        ))
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY id DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(booking_from_row).collect()
    }

    async fn transition(
        &self,
        booking_id: i64,
        from: BookingStatus,
        to: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        // Status guard in the WHERE clause makes this a per-row CAS; the
        // expiry sweep and payment handlers may race and exactly one wins.
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, confirmed_at = COALESCE($2, confirmed_at)
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(confirmed_at)
        .bind(booking_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings WHERE status = $1 AND expires_at < $2 ORDER BY id",
            SELECT_COLUMNS
        ))
        .bind(BookingStatus::Pending.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(booking_from_row).collect()
    }
}
