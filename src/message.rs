//! Message types and status management for the outbound queue.
//!
//! This module defines the unit of work the queue persists and its lifecycle
//! states. A message is a fully rendered WhatsApp text addressed to one
//! recipient, owned by exactly one tenant; template substitution happens
//! before insertion.
//!
//! # Message Lifecycle
//!
//! 1. Producers enqueue messages in `Pending` status
//! 2. The dispatcher claims a message by flipping it to `Processing`
//! 3. Gateway success moves it to `Sent`, gateway error to `Failed`
//! 4. A `Failed` message can be manually reset to `Pending` (retry)
//!
//! There is no automatic retry or expiry; failed and sent messages sit in
//! their terminal state until an operator retries or deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Represents the current status of a message in the queue.
///
/// The status transitions follow:
/// `Pending` -> `Processing` (claimed by the dispatcher)
/// `Processing` -> `Sent`    (gateway accepted the message)
/// `Processing` -> `Failed`  (gateway error)
/// `Failed` -> `Pending`     (manual retry)
///
/// `Processing` also reverts to `Pending` when the reaper releases a row
/// orphaned by a dispatcher run that died mid-send.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type, strum::Display)]
#[sqlx(type_name = "text")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting for dispatch; eligible once `scheduled_at` has passed
    #[serde(rename = "pending")]
    #[sqlx(rename = "pending")]
    Pending,
    /// Claimed by a dispatcher run, send in flight
    #[serde(rename = "processing")]
    #[sqlx(rename = "processing")]
    Processing,
    /// Accepted by the gateway
    #[serde(rename = "sent")]
    #[sqlx(rename = "sent")]
    Sent,
    /// Gateway rejected the message or the send call errored
    #[serde(rename = "failed")]
    #[sqlx(rename = "failed")]
    Failed,
}

/// A persisted message in the outbound queue.
///
/// Messages are stored in the database and tracked through their lifecycle
/// using the `status` field. The optional `template_id`, `client_id` and
/// `invoice_id` are back-references for reporting only; the queue enforces
/// no referential integrity over them.
#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct MessageRecord {
    /// Unique identifier, assigned at insertion
    pub id: i64,
    /// Owning tenant; every queue operation is scoped to one tenant
    pub tenant_id: String,
    /// Destination phone number (E.164-like, not strictly validated)
    pub recipient_phone: String,
    /// Fully rendered message text
    pub body: String,

    pub template_id: Option<i64>,
    pub client_id: Option<i64>,
    pub invoice_id: Option<i64>,

    /// Higher sends first among otherwise-equal candidates
    pub priority: i64,
    /// Not eligible for dispatch before this time
    pub scheduled_at: DateTime<Utc>,

    pub status: MessageStatus,
    /// Present only when `status` is `Failed`
    pub error_detail: Option<String>,
    /// Gateway-assigned id, recorded on successful send
    pub gateway_message_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Producer-facing payload for enqueueing a message.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewMessage {
    pub recipient_phone: String,
    pub body: String,
    #[serde(default)]
    pub template_id: Option<i64>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub invoice_id: Option<i64>,
    /// Defaults to [`DEFAULT_PRIORITY`] when omitted
    #[serde(default)]
    pub priority: Option<i64>,
    /// Defaults to "now" (immediately eligible) when omitted
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Mid-range default priority for messages enqueued without one.
pub const DEFAULT_PRIORITY: i64 = 5;

/// Per-status row counts for one tenant, zero-filled.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
}
