//! SQL operations over the `messages` table.
//!
//! Every operation is scoped by `tenant_id`; no query can see another
//! tenant's rows. The claim is a single conditional `UPDATE ... RETURNING`,
//! which is the mutual-exclusion point for concurrent dispatcher runs.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tokio_stream::StreamExt;

use crate::{
    error::Error,
    message::{MessageRecord, MessageStatus, NewMessage, QueueStats, DEFAULT_PRIORITY},
};

impl MessageRecord {
    pub async fn insert(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        new: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<i64, Error> {
        if new.recipient_phone.trim().is_empty() {
            return Err(Error::missing_parameter("recipient_phone"));
        }
        if new.body.trim().is_empty() {
            return Err(Error::missing_parameter("body"));
        }

        let id: i64 = sqlx::query_scalar(
            "
            INSERT INTO messages (
                tenant_id, recipient_phone, body,
                template_id, client_id, invoice_id,
                priority, scheduled_at, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $9)
            RETURNING id
            ",
        )
        .bind(tenant_id.as_ref())
        .bind(&new.recipient_phone)
        .bind(&new.body)
        .bind(new.template_id)
        .bind(new.client_id)
        .bind(new.invoice_id)
        .bind(new.priority.unwrap_or(DEFAULT_PRIORITY))
        .bind(new.scheduled_at.unwrap_or(now))
        .bind(now)
        .fetch_one(db)
        .await?;

        Ok(id)
    }

    /// Paginated listing for the admin surface, newest and most urgent
    /// first. Returns the page plus the total row count for the filter.
    pub async fn list(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        status: Option<MessageStatus>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<MessageRecord>, u64), Error> {
        let tenant_id = tenant_id.as_ref();

        let total: i64 = match status {
            Some(status) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM messages WHERE tenant_id = $1 AND status = $2",
                )
                .bind(tenant_id)
                .bind(status)
                .fetch_one(&mut *db)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE tenant_id = $1")
                    .bind(tenant_id)
                    .fetch_one(&mut *db)
                    .await?
            }
        };

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let mut stream = match status {
            Some(status) => sqlx::query_as(
                "
                SELECT * FROM messages
                WHERE tenant_id = $1 AND status = $2
                ORDER BY priority DESC, created_at DESC
                LIMIT $3 OFFSET $4
                ",
            )
            .bind(tenant_id)
            .bind(status)
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch(&mut *db),
            None => sqlx::query_as(
                "
                SELECT * FROM messages
                WHERE tenant_id = $1
                ORDER BY priority DESC, created_at DESC
                LIMIT $2 OFFSET $3
                ",
            )
            .bind(tenant_id)
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch(&mut *db),
        };

        let mut records = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            records.push(res);
        }

        Ok((records, total as u64))
    }

    pub async fn stats(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
    ) -> Result<QueueStats, Error> {
        let rows: Vec<(MessageStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM messages WHERE tenant_id = $1 GROUP BY status",
        )
        .bind(tenant_id.as_ref())
        .fetch_all(db)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as u64;
            match status {
                MessageStatus::Pending => stats.pending = count,
                MessageStatus::Processing => stats.processing = count,
                MessageStatus::Sent => stats.sent = count,
                MessageStatus::Failed => stats.failed = count,
            }
        }

        Ok(stats)
    }

    /// Resets a message to `pending`, clearing any failure detail and making
    /// it immediately eligible. Idempotent per tenant-owned id.
    pub async fn retry(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let tenant_id = tenant_id.as_ref();

        let affected = sqlx::query(
            "
            UPDATE messages
            SET status = 'pending', error_detail = NULL, scheduled_at = $3, updated_at = $3
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(now)
        .execute(db)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::message_not_found(id, tenant_id));
        }

        Ok(())
    }

    pub async fn delete(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        id: i64,
    ) -> Result<(), Error> {
        let tenant_id = tenant_id.as_ref();

        let affected = sqlx::query("DELETE FROM messages WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(db)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(Error::message_not_found(id, tenant_id));
        }

        Ok(())
    }

    pub async fn delete_by_status(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        status: MessageStatus,
    ) -> Result<u64, Error> {
        Ok(
            sqlx::query("DELETE FROM messages WHERE tenant_id = $1 AND status = $2")
                .bind(tenant_id.as_ref())
                .bind(status)
                .execute(db)
                .await?
                .rows_affected(),
        )
    }

    pub async fn delete_all(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
    ) -> Result<u64, Error> {
        Ok(sqlx::query("DELETE FROM messages WHERE tenant_id = $1")
            .bind(tenant_id.as_ref())
            .execute(db)
            .await?
            .rows_affected())
    }

    /// Claims the single best dispatch candidate: due, pending, highest
    /// priority, oldest first. The conditional update flips it to
    /// `processing` in one statement, so two concurrent runs can never claim
    /// the same row.
    pub async fn claim_next(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRecord>, Error> {
        Ok(sqlx::query_as(
            "
            UPDATE messages
            SET status = 'processing', updated_at = $2
            WHERE id = (
                SELECT id FROM messages
                WHERE tenant_id = $1 AND status = 'pending' AND scheduled_at <= $2
                ORDER BY priority DESC, created_at ASC, id ASC
                LIMIT 1
            ) AND status = 'pending'
            RETURNING *
            ",
        )
        .bind(tenant_id.as_ref())
        .bind(now)
        .fetch_optional(db)
        .await?)
    }

    pub async fn mark_sent(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        id: i64,
        gateway_message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "
            UPDATE messages
            SET status = 'sent', gateway_message_id = $3, error_detail = NULL, updated_at = $4
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id.as_ref())
        .bind(id)
        .bind(gateway_message_id)
        .bind(now)
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        id: i64,
        error_detail: impl AsRef<str>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "
            UPDATE messages
            SET status = 'failed', error_detail = $3, updated_at = $4
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id.as_ref())
        .bind(id)
        .bind(error_detail.as_ref())
        .bind(now)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Rolling-window count: messages that reached `sent` after `cutoff`.
    pub async fn sent_since(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar(
            "
            SELECT COUNT(*) FROM messages
            WHERE tenant_id = $1 AND status = 'sent' AND updated_at > $2
            ",
        )
        .bind(tenant_id.as_ref())
        .bind(cutoff)
        .fetch_one(db)
        .await?;

        Ok(count as u64)
    }

    /// Releases `processing` rows orphaned by a dispatcher run that died
    /// between claim and outcome, returning them to `pending`.
    pub async fn release_stuck(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        older_than: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        Ok(sqlx::query(
            "
            UPDATE messages
            SET status = 'pending', updated_at = $3
            WHERE tenant_id = $1 AND status = 'processing' AND updated_at < $2
            ",
        )
        .bind(tenant_id.as_ref())
        .bind(older_than)
        .bind(now)
        .execute(db)
        .await?
        .rows_affected())
    }
}
