//! Per-tenant rate limit configuration.
//!
//! The upstream WhatsApp gateway suspends accounts that burst messages, so
//! every tenant carries a policy with two ceilings (per trailing minute and
//! per trailing hour) plus a minimum delay between consecutive sends. Both
//! ceilings hold simultaneously; the binding constraint at any point is
//! whichever window is tighter.

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::error::Error;

pub const MESSAGES_PER_MINUTE_RANGE: std::ops::RangeInclusive<u32> = 1..=60;
pub const MESSAGES_PER_HOUR_RANGE: std::ops::RangeInclusive<u32> = 10..=500;
pub const DELAY_SECS_RANGE: std::ops::RangeInclusive<u32> = 1..=60;

/// Throughput policy for one tenant.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, FromRow)]
pub struct RateLimitPolicy {
    pub messages_per_minute: u32,
    pub messages_per_hour: u32,
    pub delay_between_messages_secs: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            messages_per_minute: 20,
            messages_per_hour: 100,
            delay_between_messages_secs: 3,
        }
    }
}

impl RateLimitPolicy {
    /// Checks every field against its allowed range.
    ///
    /// The returned error names the offending field and the inclusive
    /// bounds, so it can be surfaced to an operator as-is.
    pub fn validate(&self) -> Result<(), Error> {
        Self::check(
            "messages_per_minute",
            self.messages_per_minute,
            MESSAGES_PER_MINUTE_RANGE,
        )?;
        Self::check(
            "messages_per_hour",
            self.messages_per_hour,
            MESSAGES_PER_HOUR_RANGE,
        )?;
        Self::check(
            "delay_between_messages_secs",
            self.delay_between_messages_secs,
            DELAY_SECS_RANGE,
        )?;
        Ok(())
    }

    fn check(
        field: &'static str,
        value: u32,
        range: std::ops::RangeInclusive<u32>,
    ) -> Result<(), Error> {
        if range.contains(&value) {
            Ok(())
        } else {
            Err(Error::validation(
                field,
                format!(
                    "{} is out of range, allowed {}..={}",
                    value,
                    range.start(),
                    range.end()
                ),
            ))
        }
    }

    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.delay_between_messages_secs))
    }
}
