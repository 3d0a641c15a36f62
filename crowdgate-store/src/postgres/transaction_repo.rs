use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowdgate_core::repository::{
    NewOutboxRecord, OutboxRecord, OutboxRepository, RepositoryError, TransactionRepository,
};
use crowdgate_domain::transaction::{Transaction, TransactionStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use super::db_err;

#[derive(Clone)]
pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, RepositoryError> {
    let status_text: String = row.try_get("status").map_err(db_err)?;
    let status = TransactionStatus::parse(&status_text).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown transaction status '{}'", status_text))
    })?;

    Ok(Transaction {
        transaction_id: row.try_get("transaction_id").map_err(db_err)?,
        booking_id: row.try_get("booking_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        currency: row.try_get("currency").map_err(db_err)?,
        status,
        gateway_reference: row.try_get("gateway_reference").map_err(db_err)?,
        failure_reason: row.try_get("failure_reason").map_err(db_err)?,
        idempotency_key: row.try_get("idempotency_key").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

const SELECT_COLUMNS: &str = "transaction_id, booking_id, user_id, amount, currency, status, \
     gateway_reference, failure_reason, idempotency_key, created_at, updated_at";

async fn enqueue_outbox(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    outbox: &NewOutboxRecord,
    created_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbox (topic, partition_key, payload, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&outbox.topic)
    .bind(&outbox.partition_key)
    .bind(&outbox.payload)
    .bind(created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn insert_pending(&self, transaction: &Transaction) -> Result<bool, RepositoryError> {
        // The unique index on idempotency_key decides duplicate races; the
        // loser sees zero rows affected and re-reads the winner.
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
                (transaction_id, booking_id, user_id, amount, currency, status,
                 idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(transaction.transaction_id)
        .bind(transaction.booking_id)
        .bind(&transaction.user_id)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.status.as_str())
        .bind(&transaction.idempotency_key)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE idempotency_key = $1",
            SELECT_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn find(&self, transaction_id: Uuid) -> Result<Option<Transaction>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE transaction_id = $1",
            SELECT_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_for_booking(
        &self,
        booking_id: i64,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE booking_id = $1 ORDER BY created_at",
            SELECT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Transaction>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn mark_success(
        &self,
        transaction_id: Uuid,
        gateway_reference: &str,
        updated_at: DateTime<Utc>,
        outbox: NewOutboxRecord,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1, gateway_reference = $2, updated_at = $3
            WHERE transaction_id = $4
            "#,
        )
        .bind(TransactionStatus::Success.as_str())
        .bind(gateway_reference)
        .bind(updated_at)
        .bind(transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        enqueue_outbox(&mut tx, &outbox, updated_at)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn mark_failed(
        &self,
        transaction_id: Uuid,
        failure_reason: &str,
        updated_at: DateTime<Utc>,
        outbox: NewOutboxRecord,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1, failure_reason = $2, updated_at = $3
            WHERE transaction_id = $4
            "#,
        )
        .bind(TransactionStatus::Failed.as_str())
        .bind(failure_reason)
        .bind(updated_at)
        .bind(transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        enqueue_outbox(&mut tx, &outbox, updated_at)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn find_stalled(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE status = $1 AND updated_at < $2 ORDER BY created_at",
            SELECT_COLUMNS
        ))
        .bind(TransactionStatus::Pending.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(transaction_from_row).collect()
    }
}

/// Postgres outbox drained by the publisher task.
#[derive(Clone)]
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxRecord, RepositoryError> {
    Ok(OutboxRecord {
        id: row.try_get("id").map_err(db_err)?,
        topic: row.try_get("topic").map_err(db_err)?,
        partition_key: row.try_get("partition_key").map_err(db_err)?,
        payload: row.try_get("payload").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        published_at: row.try_get("published_at").map_err(db_err)?,
    })
}

#[async_trait]
impl OutboxRepository for PgOutbox {
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, partition_key, payload, created_at, published_at
            FROM outbox
            WHERE published_at IS NULL
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_published(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE outbox SET published_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
