//! Service requests extracted from calls, and confirmed active orders.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Completion window for an active order, in seconds.
pub const ACTIVE_ORDER_WINDOW_SECS: i64 = 60 * 60;

/// Optional details attached to a [`ServiceRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequestDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_details: Option<String>,
}

/// A guest request derived from the call summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_type: String,
    pub request_text: String,
    #[serde(default)]
    pub details: ServiceRequestDetails,
}

/// A confirmed guest request tracked against a one-hour deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrder {
    pub reference: String,
    pub requested_at: DateTime<Utc>,
    pub estimated_time: String,
}

impl ActiveOrder {
    pub fn deadline(&self) -> DateTime<Utc> {
        self.requested_at + Duration::seconds(ACTIVE_ORDER_WINDOW_SECS)
    }

    /// Time left before the deadline, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let left = self.deadline() - now;
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }
}
