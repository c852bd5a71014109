//! Post-call extraction passes (secondary model calls over the transcript).

use serde_json::Value;

use crate::peers::llm::ChatModel;
use crate::store::{Appointment, AppointmentStatus, Lead};

const LEAD_SYSTEM: &str = "You extract contact details from a phone call transcript. \
Reply with only a JSON object: {\"name\": string|null, \"email\": string|null, \
\"phone\": string|null, \"notes\": string|null}. Use null when the transcript \
does not state a value. Notes is a one-line reason for the call.";

const BOOKING_SYSTEM: &str = "You detect appointment requests in a phone call transcript. \
Reply with only a JSON object: {\"has_booking\": boolean, \"date\": \"YYYY-MM-DD\"|null, \
\"start_time\": \"HH:MM\"|null, \"end_time\": \"HH:MM\"|null, \"customer_name\": string|null, \
\"customer_phone\": string|null, \"customer_email\": string|null, \"service\": string|null, \
\"notes\": string|null}. has_booking is true only when the caller actually asked to book.";

fn text_field(v: &Value, key: &str) -> Option<String> {
    v[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Lead extraction: one short model pass. The caller number backfills a
/// missing phone. Returns `None` when nothing actionable was recovered.
pub async fn extract_lead(
    llm: &dyn ChatModel,
    transcript: &str,
    caller: Option<&str>,
    tenant_id: &str,
    call_sid: &str,
) -> Option<Lead> {
    if transcript.is_empty() {
        return None;
    }
    let v = match llm.complete_json(LEAD_SYSTEM, transcript).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(call = %call_sid, err = %e, "lead extraction failed");
            return None;
        }
    };

    let mut lead = Lead::new(tenant_id, call_sid);
    lead.name = text_field(&v, "name");
    lead.email = text_field(&v, "email");
    lead.phone = text_field(&v, "phone");
    lead.notes = text_field(&v, "notes");
    if !lead.is_actionable() {
        // Nothing recoverable: the caller id alone does not make a lead.
        return None;
    }
    if lead.phone.is_none() {
        lead.phone = caller.map(String::from);
    }
    Some(lead)
}

/// Booking extraction: the fallback for callers who agreed to a time but the
/// in-call marker never fired. Confirmed only when date and start time are
/// both present; otherwise pending for a human to complete.
pub async fn extract_booking(
    llm: &dyn ChatModel,
    transcript: &str,
    tenant_id: &str,
    call_sid: &str,
) -> Option<Appointment> {
    if transcript.is_empty() {
        return None;
    }
    let v = match llm.complete_json(BOOKING_SYSTEM, transcript).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(call = %call_sid, err = %e, "booking extraction failed");
            return None;
        }
    };

    if !v["has_booking"].as_bool().unwrap_or(false) {
        return None;
    }
    let customer_name = text_field(&v, "customer_name")?;

    let date = text_field(&v, "date");
    let start_time = text_field(&v, "start_time");
    let status = if date.is_some() && start_time.is_some() {
        AppointmentStatus::Confirmed
    } else {
        AppointmentStatus::Pending
    };

    Some(Appointment {
        tenant_id: tenant_id.to_string(),
        call_sid: call_sid.to_string(),
        customer_name,
        customer_phone: text_field(&v, "customer_phone"),
        customer_email: text_field(&v, "customer_email"),
        date,
        start_time,
        end_time: text_field(&v, "end_time"),
        service: text_field(&v, "service"),
        notes: text_field(&v, "notes"),
        status,
    })
}
