//! Once-per-call finalisation.
//!
//! Triggered by the first of: carrier `stop`, carrier socket close, or a
//! completed transfer tearing the stream down. Sub-steps are isolated; a
//! failing store write never blocks minute accounting or extraction, and
//! every failure is logged with the call id for offline reconciliation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::call::{extract, TranscriptLog};
use crate::obs::metrics::BridgeMetrics;
use crate::peers::llm::ChatModel;
use crate::store::{BillingSink, CallRecord, CallStatus, CallStore, MinuteUsage};
use crate::tenant::SharedSnapshot;

/// Everything the finaliser needs about the finished call.
pub struct CallOutcome {
    pub call_sid: String,
    pub snapshot: SharedSnapshot,
    pub caller: Option<String>,
    pub stream_sid: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub transferred: bool,
    /// The carrier socket died rather than closing cleanly.
    pub failed: bool,
    /// An appointment was already created by the in-call marker.
    pub booked: bool,
    pub gate_reason: Option<String>,
    pub transcript: TranscriptLog,
}

/// Partial minutes always round up: a 1-second call bills one minute.
pub fn billable_minutes(duration_secs: u64) -> u32 {
    duration_secs.div_ceil(60) as u32
}

pub struct Finalizer {
    done: AtomicBool,
}

impl Finalizer {
    pub fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Run the pipeline. Idempotent: the second and later invocations for
    /// the same call return immediately.
    pub async fn run(
        &self,
        store: &dyn CallStore,
        billing: &dyn BillingSink,
        llm: &dyn ChatModel,
        metrics: &Arc<BridgeMetrics>,
        outcome: &CallOutcome,
    ) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }

        let call_sid = outcome.call_sid.as_str();
        let tenant = &outcome.snapshot.tenant;
        let turns = outcome.transcript.snapshot();

        let status = if outcome.transferred {
            CallStatus::Transferred
        } else if outcome.failed {
            CallStatus::Failed
        } else {
            CallStatus::Completed
        };
        tracing::info!(
            call = %call_sid,
            tenant = %tenant.id,
            duration_secs = outcome.duration_secs,
            ?status,
            "finalising call"
        );

        if let Err(e) = store.append_turns(call_sid, &turns).await {
            tracing::warn!(call = %call_sid, err = %e, "transcript persist failed");
            metrics.finalize_errors.inc(&[("step", "transcript")]);
        }

        let record = CallRecord {
            call_sid: call_sid.to_string(),
            tenant_id: tenant.id.clone(),
            caller: outcome.caller.clone(),
            stream_sid: Some(outcome.stream_sid.clone()),
            started_at: outcome.started_at,
            ended_at: Some(Utc::now()),
            duration_secs: outcome.duration_secs,
            status,
            summary: Some(outcome.transcript.summary()),
            gate_reason: outcome.gate_reason.clone(),
        };
        if let Err(e) = store.upsert_call(&record).await {
            tracing::warn!(call = %call_sid, err = %e, "call record persist failed");
            metrics.finalize_errors.inc(&[("step", "call_record")]);
        }

        self.account_minutes(store, billing, metrics, outcome).await;

        let flat = outcome.transcript.flatten();
        if let Some(lead) =
            extract::extract_lead(llm, &flat, outcome.caller.as_deref(), &tenant.id, call_sid).await
        {
            if let Err(e) = store.insert_lead(&lead).await {
                tracing::warn!(call = %call_sid, err = %e, "lead persist failed");
                metrics.finalize_errors.inc(&[("step", "lead")]);
            }
        }

        if !outcome.booked {
            if let Some(appt) = extract::extract_booking(llm, &flat, &tenant.id, call_sid).await {
                if let Err(e) = store.insert_appointment(&appt).await {
                    tracing::warn!(call = %call_sid, err = %e, "appointment persist failed");
                    metrics.finalize_errors.inc(&[("step", "appointment")]);
                }
            }
        }

        metrics.calls_total.inc(&[("status", status_label(status))]);
    }

    async fn account_minutes(
        &self,
        store: &dyn CallStore,
        billing: &dyn BillingSink,
        metrics: &Arc<BridgeMetrics>,
        outcome: &CallOutcome,
    ) {
        let minutes = billable_minutes(outcome.duration_secs);
        if minutes == 0 {
            return;
        }
        let tenant = &outcome.snapshot.tenant;
        let Some(ledger) = tenant.ledger else {
            return;
        };

        let usage = if ledger.paid_plan {
            MinuteUsage::Paid(minutes)
        } else {
            MinuteUsage::Trial(minutes)
        };
        if let Err(e) = store.add_minutes(&tenant.id, usage).await {
            tracing::warn!(call = %outcome.call_sid, err = %e, "minute accounting failed");
            metrics.finalize_errors.inc(&[("step", "minutes")]);
            return;
        }

        if ledger.paid_plan {
            let used_now = ledger.paid_minutes_used + minutes;
            let over = used_now.saturating_sub(ledger.paid_minutes_included);
            if over > 0 {
                match &tenant.billing_customer_id {
                    Some(customer) => {
                        if let Err(e) = billing.record_overage(customer, over).await {
                            tracing::warn!(call = %outcome.call_sid, err = %e, "overage event failed");
                            metrics.finalize_errors.inc(&[("step", "overage")]);
                        }
                    }
                    None => tracing::warn!(
                        tenant = %tenant.id,
                        over,
                        "overage without billing customer id"
                    ),
                }
            }
        }
    }
}

impl Default for Finalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn status_label(status: CallStatus) -> &'static str {
    match status {
        CallStatus::InProgress => "in_progress",
        CallStatus::Completed => "completed",
        CallStatus::Failed => "failed",
        CallStatus::Transferred => "transferred",
    }
}
