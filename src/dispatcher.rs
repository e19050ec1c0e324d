//! The batch dispatcher: drains due, pending messages for one tenant while
//! honoring the tenant's rate limit policy.
//!
//! A run is a discrete batch, not a long-lived loop. It stops when either
//! rolling-window ceiling is reached or the queue has no due candidates
//! left; whatever remains pending is picked up by the next invocation.
//! Pacing (the inter-message sleep) applies after failures too, because the
//! limits protect the channel from the gateway's anti-spam checks, not the
//! individual message.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::{rate_limit::RateLimitPolicy, service::Service};

/// Result of one gateway send attempt.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// The externally-supplied send capability. Implementations transmit one
/// message and report the gateway's verdict; transport errors may surface
/// either as `Err` or as an unsuccessful outcome, the dispatcher treats
/// both as a failed attempt.
#[async_trait::async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, recipient_phone: &str, body: &str) -> eyre::Result<SendOutcome>;
}

/// What one dispatcher run accomplished.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: u64,
    pub failed: u64,
    pub remaining_pending: u64,
}

pub struct Dispatcher {
    service: Arc<Service>,
    sender: Arc<dyn Sender>,
    reap_after: Duration,
}

impl Dispatcher {
    pub fn new(service: Arc<Service>, sender: Arc<dyn Sender>, reap_after: Duration) -> Self {
        Self {
            service,
            sender,
            reap_after,
        }
    }

    /// Runs one dispatch batch for a tenant.
    ///
    /// Window counts are snapshotted up front from the store and incremented
    /// locally per successful send; a snapshot taken mid-window can only
    /// undercount the remaining budget, never let the run exceed a ceiling.
    pub async fn run(&self, tenant_id: &str) -> eyre::Result<DispatchSummary> {
        let released = self.service.release_stuck(tenant_id, self.reap_after).await?;
        if released > 0 {
            tracing::warn!(tenant_id, released, "released stuck processing messages");
        }

        let policy = self.service.rate_limit(tenant_id).await?;

        let now = Utc::now();
        let mut sent_last_minute = self
            .service
            .sent_since(tenant_id, now - Duration::seconds(60))
            .await?;
        let mut sent_last_hour = self
            .service
            .sent_since(tenant_id, now - Duration::seconds(3600))
            .await?;

        let mut summary = DispatchSummary::default();

        loop {
            if self.ceiling_reached(&policy, sent_last_minute, sent_last_hour) {
                tracing::info!(
                    tenant_id,
                    sent_last_minute,
                    sent_last_hour,
                    "rate ceiling reached, stopping run"
                );
                break;
            }

            let Some(message) = self.service.claim_next(tenant_id, Utc::now()).await? else {
                break;
            };

            match self
                .sender
                .send(&message.recipient_phone, &message.body)
                .await
            {
                Ok(outcome) if outcome.success => {
                    self.service
                        .mark_sent(tenant_id, message.id, outcome.message_id)
                        .await?;

                    sent_last_minute += 1;
                    sent_last_hour += 1;
                    summary.sent += 1;

                    tracing::debug!(tenant_id, id = message.id, "message sent");
                }
                Ok(outcome) => {
                    let detail = outcome
                        .error
                        .unwrap_or_else(|| "gateway rejected message".to_owned());

                    self.service
                        .mark_failed(tenant_id, message.id, &detail)
                        .await?;
                    summary.failed += 1;

                    tracing::warn!(tenant_id, id = message.id, %detail, "send failed");
                }
                Err(e) => {
                    let detail = e.to_string();

                    self.service
                        .mark_failed(tenant_id, message.id, &detail)
                        .await?;
                    summary.failed += 1;

                    tracing::warn!(tenant_id, id = message.id, %detail, "send errored");
                }
            }

            // Pace the channel regardless of the attempt's outcome.
            tokio::time::sleep(policy.delay()).await;
        }

        summary.remaining_pending = self.service.stats(tenant_id).await?.pending;

        tracing::info!(
            tenant_id,
            sent = summary.sent,
            failed = summary.failed,
            remaining = summary.remaining_pending,
            "dispatch run finished"
        );

        Ok(summary)
    }

    fn ceiling_reached(&self, policy: &RateLimitPolicy, minute: u64, hour: u64) -> bool {
        minute >= u64::from(policy.messages_per_minute)
            || hour >= u64::from(policy.messages_per_hour)
    }
}
