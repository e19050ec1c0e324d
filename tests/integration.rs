use std::{ops::Deref, sync::Arc};

use chrono::{Duration, Utc};
use tempfile::TempDir;
use zapq::{
    config::Config,
    error::Error,
    message::{MessageStatus, NewMessage},
    rate_limit::RateLimitPolicy,
    service::Service,
};

struct TmpService {
    svc: Arc<Service>,
    #[allow(unused)]
    tmpdir: TempDir,
}

impl Deref for TmpService {
    type Target = Service;

    fn deref(&self) -> &Self::Target {
        &self.svc
    }
}

async fn setup() -> TmpService {
    let path = tempfile::tempdir().unwrap();

    TmpService {
        svc: Arc::new(
            Service::connect_with(Config {
                db_path: Some(path.path().join("zapq.db").to_string_lossy().to_string()),
                ..Config::default()
            })
            .await
            .unwrap(),
        ),
        tmpdir: path,
    }
}

fn msg(phone: &str, body: &str) -> NewMessage {
    NewMessage {
        recipient_phone: phone.to_owned(),
        body: body.to_owned(),
        template_id: None,
        client_id: None,
        invoice_id: None,
        priority: None,
        scheduled_at: None,
    }
}

#[tokio::test]
async fn test_enqueue_defaults() {
    let service = setup().await;

    let id = service
        .enqueue("tenant-a", msg("5511999990001", "hello"))
        .await
        .unwrap();

    let (records, total) = service.list("tenant-a", None, 1, 25).await.unwrap();

    assert_eq!(total, 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].status, MessageStatus::Pending);
    assert_eq!(records[0].priority, 5);
    assert!(records[0].scheduled_at <= Utc::now());
    assert!(records[0].error_detail.is_none());
}

#[tokio::test]
async fn test_enqueue_rejects_empty_fields() {
    let service = setup().await;

    let err = service
        .enqueue("tenant-a", msg("", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingParameter { .. }));

    let err = service
        .enqueue("tenant-a", msg("5511999990001", "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingParameter { .. }));
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let service = setup().await;

    for i in 0..4 {
        service
            .enqueue("tenant-a", msg("5511999990001", &format!("msg {i}")))
            .await
            .unwrap();
    }

    let failed_id = service
        .enqueue("tenant-a", msg("5511999990002", "doomed"))
        .await
        .unwrap();
    service
        .mark_failed("tenant-a", failed_id, "number not registered")
        .await
        .unwrap();

    let (page, total) = service.list("tenant-a", None, 1, 2).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);

    let (failed, total) = service
        .list("tenant-a", Some(MessageStatus::Failed), 1, 25)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(failed[0].id, failed_id);
    assert_eq!(
        failed[0].error_detail.as_deref(),
        Some("number not registered")
    );

    // Other tenants see nothing.
    let (_, total) = service.list("tenant-b", None, 1, 25).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_stats_zero_filled_and_consistent() {
    let service = setup().await;

    assert_eq!(service.stats("tenant-a").await.unwrap(), Default::default());

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            service
                .enqueue("tenant-a", msg("5511999990001", &format!("msg {i}")))
                .await
                .unwrap(),
        );
    }

    service.mark_sent("tenant-a", ids[0], None).await.unwrap();
    service
        .mark_sent("tenant-a", ids[1], Some("wamid-1".into()))
        .await
        .unwrap();
    service
        .mark_failed("tenant-a", ids[2], "timeout")
        .await
        .unwrap();

    let stats = service.stats("tenant-a").await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_retry_is_idempotent() {
    let service = setup().await;

    let id = service
        .enqueue("tenant-a", msg("5511999990001", "hello"))
        .await
        .unwrap();
    service
        .mark_failed("tenant-a", id, "connection reset")
        .await
        .unwrap();

    service.retry("tenant-a", id).await.unwrap();
    service.retry("tenant-a", id).await.unwrap();

    let (records, _) = service.list("tenant-a", None, 1, 25).await.unwrap();
    assert_eq!(records[0].status, MessageStatus::Pending);
    assert!(records[0].error_detail.is_none());
    assert!(records[0].scheduled_at <= Utc::now());
}

#[tokio::test]
async fn test_retry_and_delete_are_tenant_scoped() {
    let service = setup().await;

    let id = service
        .enqueue("tenant-a", msg("5511999990001", "hello"))
        .await
        .unwrap();

    assert!(matches!(
        service.retry("tenant-b", id).await.unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        service.delete("tenant-b", id).await.unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        service.retry("tenant-a", 9999).await.unwrap_err(),
        Error::NotFound { .. }
    ));

    service.delete("tenant-a", id).await.unwrap();
    assert!(matches!(
        service.delete("tenant-a", id).await.unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_bulk_deletes_return_counts() {
    let service = setup().await;

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(
            service
                .enqueue("tenant-a", msg("5511999990001", &format!("msg {i}")))
                .await
                .unwrap(),
        );
    }
    service.mark_sent("tenant-a", ids[0], None).await.unwrap();
    service.mark_sent("tenant-a", ids[1], None).await.unwrap();

    service
        .enqueue("tenant-b", msg("5511999990002", "other tenant"))
        .await
        .unwrap();

    assert_eq!(service.delete_sent("tenant-a").await.unwrap(), 2);
    assert_eq!(service.delete_all("tenant-a").await.unwrap(), 2);

    // tenant-b untouched
    let (_, total) = service.list("tenant-b", None, 1, 25).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_rate_limit_created_on_first_access() {
    let service = setup().await;

    let policy = service.rate_limit("tenant-a").await.unwrap();
    assert_eq!(policy, RateLimitPolicy::default());

    // Second access reads the stored row, same result.
    assert_eq!(service.rate_limit("tenant-a").await.unwrap(), policy);
}

#[tokio::test]
async fn test_rate_limit_save_validates_and_upserts() {
    let service = setup().await;

    let bad = RateLimitPolicy {
        messages_per_minute: 0,
        ..RateLimitPolicy::default()
    };
    assert!(matches!(
        service.save_rate_limit("tenant-a", bad).await.unwrap_err(),
        Error::Validation { .. }
    ));

    let updated = RateLimitPolicy {
        messages_per_minute: 2,
        messages_per_hour: 50,
        delay_between_messages_secs: 1,
    };
    service.save_rate_limit("tenant-a", updated).await.unwrap();

    assert_eq!(service.rate_limit("tenant-a").await.unwrap(), updated);
}

#[tokio::test]
async fn test_claim_order_and_future_exclusion() {
    let service = setup().await;

    for (phone, priority) in [("p1", 1), ("p9", 9), ("p5", 5)] {
        service
            .enqueue(
                "tenant-a",
                NewMessage {
                    priority: Some(priority),
                    ..msg(phone, "ordered")
                },
            )
            .await
            .unwrap();
    }
    service
        .enqueue(
            "tenant-a",
            NewMessage {
                priority: Some(100),
                scheduled_at: Some(Utc::now() + Duration::minutes(10)),
                ..msg("future", "not yet")
            },
        )
        .await
        .unwrap();

    let mut claimed = Vec::new();
    while let Some(record) = service.claim_next("tenant-a", Utc::now()).await.unwrap() {
        assert_eq!(record.status, MessageStatus::Processing);
        claimed.push(record.recipient_phone);
    }

    // Highest priority first; the future-scheduled record is never eligible.
    assert_eq!(claimed, ["p9", "p5", "p1"]);
}

#[tokio::test]
async fn test_concurrent_claims_never_share_a_record() {
    let service = setup().await;

    service
        .enqueue("tenant-a", msg("5511999990001", "only one"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        service.claim_next("tenant-a", Utc::now()),
        service.claim_next("tenant-a", Utc::now()),
    );

    let claims = [a.unwrap(), b.unwrap()];
    assert_eq!(claims.iter().filter(|c| c.is_some()).count(), 1);
}

#[tokio::test]
async fn test_release_stuck_reverts_processing() {
    let service = setup().await;

    service
        .enqueue("tenant-a", msg("5511999990001", "orphan"))
        .await
        .unwrap();
    service
        .claim_next("tenant-a", Utc::now())
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // Fresh claims are untouched at a sane threshold.
    assert_eq!(
        service
            .release_stuck("tenant-a", Duration::minutes(10))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        service
            .release_stuck("tenant-a", Duration::zero())
            .await
            .unwrap(),
        1
    );

    let stats = service.stats("tenant-a").await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.processing, 0);
}

#[tokio::test]
async fn test_sent_since_rolling_count() {
    let service = setup().await;

    let id = service
        .enqueue("tenant-a", msg("5511999990001", "hello"))
        .await
        .unwrap();
    service.mark_sent("tenant-a", id, None).await.unwrap();

    let now = Utc::now();
    assert_eq!(
        service
            .sent_since("tenant-a", now - Duration::seconds(60))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        service
            .sent_since("tenant-a", now + Duration::seconds(1))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        service
            .sent_since("tenant-b", now - Duration::seconds(60))
            .await
            .unwrap(),
        0
    );
}
