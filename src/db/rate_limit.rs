//! SQL operations over the `rate_limits` table, one row per tenant.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{error::Error, rate_limit::RateLimitPolicy};

impl RateLimitPolicy {
    pub async fn get(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
    ) -> Result<Option<RateLimitPolicy>, Error> {
        Ok(sqlx::query_as(
            "
            SELECT messages_per_minute, messages_per_hour, delay_between_messages_secs
            FROM rate_limits
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id.as_ref())
        .fetch_optional(db)
        .await?)
    }

    /// Fetches the tenant's policy, inserting the default one on first
    /// access so later reads and saves always find a row.
    pub async fn ensure(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        now: DateTime<Utc>,
    ) -> Result<RateLimitPolicy, Error> {
        if let Some(policy) = Self::get(&mut *db, &tenant_id).await? {
            return Ok(policy);
        }

        let policy = RateLimitPolicy::default();
        Self::upsert(db, tenant_id, policy, now).await?;

        Ok(policy)
    }

    pub async fn upsert(
        db: &mut SqliteConnection,
        tenant_id: impl AsRef<str>,
        policy: RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        sqlx::query(
            "
            INSERT INTO rate_limits (
                tenant_id, messages_per_minute, messages_per_hour,
                delay_between_messages_secs, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (tenant_id) DO UPDATE SET
                messages_per_minute = excluded.messages_per_minute,
                messages_per_hour = excluded.messages_per_hour,
                delay_between_messages_secs = excluded.delay_between_messages_secs,
                updated_at = excluded.updated_at
            ",
        )
        .bind(tenant_id.as_ref())
        .bind(policy.messages_per_minute)
        .bind(policy.messages_per_hour)
        .bind(policy.delay_between_messages_secs)
        .bind(now)
        .execute(db)
        .await?;

        Ok(())
    }
}
