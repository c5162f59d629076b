//! Summary reconciliation: turns generated summary text into call, order and
//! service-request state.
//!
//! Generation never fails outward. [`generate`] converts every backend error
//! into [`SummaryOutcome::Failed`], and [`reconcile`] maps a failure to the
//! fixed fallback summary while leaving the order untouched.

use chrono::{DateTime, Utc};
use concierge_types::{
    CallSummary, OrderSummary, ServiceRequest, SUMMARY_FAILED, SUMMARY_NOT_PROVIDED, SUMMARY_TOO_SHORT,
};
use tracing::{info, warn};

use crate::backend::{ConciergeApi, SummaryRequest};
use crate::parser::{parse_order_details, ParsedOrder};

/// Result of one summary generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    Generated {
        summary: String,
        service_requests: Vec<ServiceRequest>,
    },
    Failed {
        reason: String,
    },
}

/// A generation outcome tagged with the call it was requested for.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryResolution {
    pub call_id: String,
    pub outcome: SummaryOutcome,
}

/// State produced by reconciling an outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub call_summary: CallSummary,
    /// `None` leaves the current order as it is.
    pub order_summary: Option<OrderSummary>,
    /// `None` leaves the current request list as it is.
    pub service_requests: Option<Vec<ServiceRequest>>,
}

/// Merges parsed fields into `existing`, or into the default template when
/// there is no order yet.
///
/// A field is overwritten only when the parse produced a non-empty value.
/// Items are replaced wholesale only when at least one item was parsed. The
/// total comes from the parse when present and is otherwise recomputed from
/// the merged items.
pub fn merge_order(existing: Option<&OrderSummary>, parsed: &ParsedOrder) -> OrderSummary {
    let mut order = existing
        .cloned()
        .unwrap_or_else(OrderSummary::default_template);

    if let Some(order_type) = non_empty(parsed.order_type.as_deref()) {
        order.order_type = order_type.to_string();
    }
    if let Some(delivery_time) = parsed.delivery_time {
        order.delivery_time = delivery_time;
    }
    if let Some(room) = non_empty(parsed.room_number.as_deref()) {
        order.room_number = room.to_string();
    }
    if let Some(instructions) = non_empty(parsed.special_instructions.as_deref()) {
        order.special_instructions = instructions.to_string();
    }

    if !parsed.items.is_empty() {
        order.items = parsed.items.clone();
    }
    order.total_amount = match parsed.total_amount {
        Some(total) if total > 0.0 => total,
        _ => order.items_total(),
    };
    order
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The summary installed when a call has too few transcript entries.
pub fn too_short(call_id: &str, at: DateTime<Utc>) -> CallSummary {
    CallSummary::new(call_id, SUMMARY_TOO_SHORT, at)
}

/// Requests a summary and converts any failure into [`SummaryOutcome::Failed`].
pub async fn generate(api: &dyn ConciergeApi, request: &SummaryRequest) -> SummaryOutcome {
    match api.generate_summary(request).await {
        Ok(response) if response.summary.trim().is_empty() => {
            warn!(call_id = %request.call_id, "summary backend returned empty content");
            SummaryOutcome::Failed {
                reason: "empty summary".to_string(),
            }
        }
        Ok(response) => {
            info!(
                call_id = %request.call_id,
                service_requests = response.service_requests.len(),
                "summary generated"
            );
            SummaryOutcome::Generated {
                summary: response.summary,
                service_requests: response.service_requests,
            }
        }
        Err(e) => {
            warn!(call_id = %request.call_id, error = %e, "summary generation failed");
            SummaryOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Applies an outcome to the current order.
pub fn reconcile(
    call_id: &str,
    outcome: SummaryOutcome,
    existing_order: Option<&OrderSummary>,
    at: DateTime<Utc>,
) -> Reconciled {
    match outcome {
        SummaryOutcome::Generated {
            summary,
            service_requests,
        } => {
            let parsed = parse_order_details(&summary);
            let order_summary = if parsed.is_empty() {
                existing_order.cloned()
            } else {
                Some(merge_order(existing_order, &parsed))
            };
            Reconciled {
                call_summary: CallSummary::new(call_id, summary, at),
                order_summary,
                service_requests: Some(service_requests),
            }
        }
        SummaryOutcome::Failed { .. } => Reconciled {
            call_summary: CallSummary::new(call_id, SUMMARY_FAILED, at),
            order_summary: None,
            service_requests: None,
        },
    }
}

/// Merges an end-of-call report from the voice service.
///
/// Returns the merged order (if the report mentioned anything) and the
/// summary to install when the call has none yet.
pub fn reconcile_report(
    call_id: &str,
    report: Option<&str>,
    existing_order: Option<&OrderSummary>,
    at: DateTime<Utc>,
) -> (Option<OrderSummary>, CallSummary) {
    let text = report.map(str::trim).filter(|t| !t.is_empty());
    let order = text
        .map(parse_order_details)
        .filter(|parsed| !parsed.is_empty())
        .map(|parsed| merge_order(existing_order, &parsed));
    let summary = CallSummary::new(call_id, text.unwrap_or(SUMMARY_NOT_PROVIDED), at);
    (order, summary)
}
