use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode,
        SqlitePoolOptions,
    },
    Acquire, SqlitePool,
};

use crate::{
    config::Config,
    error::Error,
    message::{MessageRecord, MessageStatus, NewMessage, QueueStats},
    rate_limit::RateLimitPolicy,
};

/// The queue store: owns the database pool and exposes every tenant-scoped
/// operation the admin surface and the dispatcher need.
pub struct Service {
    db: SqlitePool,
    config: Config,
}

impl Service {
    pub async fn connect() -> eyre::Result<Self> {
        Self::connect_with(Config::default()).await
    }

    pub async fn connect_with(config: Config) -> eyre::Result<Self> {
        let opts = if let Some(path) = config.db_path() {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        } else {
            SqliteConnectOptions::new().in_memory(true)
        }
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .locking_mode(SqliteLockingMode::Normal)
        .optimize_on_close(true, None)
        .auto_vacuum(SqliteAutoVacuum::Full);

        let pool = SqlitePoolOptions::new().connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { db: pool, config })
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn rate_limit(&self, tenant_id: impl AsRef<str>) -> Result<RateLimitPolicy, Error> {
        let mut tx = self.db.begin().await?;

        let policy = RateLimitPolicy::ensure(tx.acquire().await?, tenant_id, Utc::now()).await?;

        tx.commit().await?;

        Ok(policy)
    }

    pub async fn save_rate_limit(
        &self,
        tenant_id: impl AsRef<str>,
        policy: RateLimitPolicy,
    ) -> Result<(), Error> {
        policy.validate()?;

        let mut tx = self.db.begin().await?;

        RateLimitPolicy::upsert(tx.acquire().await?, tenant_id, policy, Utc::now()).await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn enqueue(
        &self,
        tenant_id: impl AsRef<str>,
        new: NewMessage,
    ) -> Result<i64, Error> {
        let mut tx = self.db.begin().await?;

        let id = MessageRecord::insert(tx.acquire().await?, tenant_id, new, Utc::now()).await?;

        tx.commit().await?;

        Ok(id)
    }

    pub async fn list(
        &self,
        tenant_id: impl AsRef<str>,
        status: Option<MessageStatus>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<MessageRecord>, u64), Error> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        let mut conn = self.db.acquire().await?;
        MessageRecord::list(conn.acquire().await?, tenant_id, status, page, page_size).await
    }

    pub async fn stats(&self, tenant_id: impl AsRef<str>) -> Result<QueueStats, Error> {
        let mut conn = self.db.acquire().await?;
        MessageRecord::stats(conn.acquire().await?, tenant_id).await
    }

    pub async fn retry(&self, tenant_id: impl AsRef<str>, id: i64) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        MessageRecord::retry(tx.acquire().await?, tenant_id, id, Utc::now()).await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn delete(&self, tenant_id: impl AsRef<str>, id: i64) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        MessageRecord::delete(tx.acquire().await?, tenant_id, id).await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn delete_sent(&self, tenant_id: impl AsRef<str>) -> Result<u64, Error> {
        let mut tx = self.db.begin().await?;

        let removed =
            MessageRecord::delete_by_status(tx.acquire().await?, tenant_id, MessageStatus::Sent)
                .await?;

        tx.commit().await?;

        Ok(removed)
    }

    pub async fn delete_all(&self, tenant_id: impl AsRef<str>) -> Result<u64, Error> {
        let mut tx = self.db.begin().await?;

        let removed = MessageRecord::delete_all(tx.acquire().await?, tenant_id).await?;

        tx.commit().await?;

        Ok(removed)
    }

    pub async fn claim_next(
        &self,
        tenant_id: impl AsRef<str>,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRecord>, Error> {
        let mut tx = self.db.begin().await?;

        let claimed = MessageRecord::claim_next(tx.acquire().await?, tenant_id, now).await?;

        tx.commit().await?;

        Ok(claimed)
    }

    pub async fn mark_sent(
        &self,
        tenant_id: impl AsRef<str>,
        id: i64,
        gateway_message_id: Option<String>,
    ) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        MessageRecord::mark_sent(tx.acquire().await?, tenant_id, id, gateway_message_id, Utc::now())
            .await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn mark_failed(
        &self,
        tenant_id: impl AsRef<str>,
        id: i64,
        error_detail: impl AsRef<str>,
    ) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        MessageRecord::mark_failed(tx.acquire().await?, tenant_id, id, error_detail, Utc::now())
            .await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn sent_since(
        &self,
        tenant_id: impl AsRef<str>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut conn = self.db.acquire().await?;
        MessageRecord::sent_since(conn.acquire().await?, tenant_id, cutoff).await
    }

    pub async fn release_stuck(
        &self,
        tenant_id: impl AsRef<str>,
        max_age: chrono::Duration,
    ) -> Result<u64, Error> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let released =
            MessageRecord::release_stuck(tx.acquire().await?, tenant_id, now - max_age, now)
                .await?;

        tx.commit().await?;

        Ok(released)
    }
}
