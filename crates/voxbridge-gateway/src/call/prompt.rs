//! Per-turn system prompt assembly.
//!
//! Rebuilt for every turn, not cached at call start: long calls cross
//! business-hour boundaries, and the rendered hours must track the tenant's
//! local clock.

use chrono::{DateTime, Datelike, Utc, Weekday};
use chrono_tz::Tz;

use voxbridge_core::markers::{BOOKING_MARKER, TRANSFER_MARKER};

use crate::call::dialogue::{SessionMemory, SessionVariables};
use crate::tenant::{Tenant, TenantSnapshot};

pub fn system_prompt(
    snap: &TenantSnapshot,
    memory: &SessionMemory,
    vars: &SessionVariables,
    now_utc: DateTime<Utc>,
) -> String {
    let tenant = &snap.tenant;
    let tz: Tz = tenant.timezone.parse().unwrap_or(Tz::UTC);
    let local = now_utc.with_timezone(&tz);
    let day = weekday_name(local.weekday());

    let mut p = String::with_capacity(2048);

    p.push_str(&format!(
        "You are {}, the phone receptionist for {}.",
        snap.voice.display_name, tenant.business_name
    ));
    if let Some(accent) = &snap.voice.accent {
        p.push_str(&format!(" You speak with a {accent} accent."));
    }
    if let Some(industry) = &tenant.industry {
        p.push_str(&format!(" The business is in the {industry} industry."));
    }
    if let Some(region) = &tenant.region {
        p.push_str(&format!(" It serves the {region} area."));
    }
    p.push('\n');

    p.push_str(&format!(
        "Right now it is {} {}, {} in the business's timezone ({}).\n",
        day,
        local.format("%Y-%m-%d"),
        local.format("%H:%M"),
        tenant.timezone
    ));
    p.push_str(&format!("Business hours: {}.\n", render_hours(tenant)));

    if !tenant.services.is_empty() {
        p.push_str(&format!("Services offered: {}.\n", tenant.services.join(", ")));
    }
    if let Some(pricing) = &tenant.pricing {
        p.push_str(&format!(
            "Pricing, only if the caller asks directly: {pricing}\n"
        ));
    }
    if let Some(tone) = &tenant.tone {
        p.push_str(&format!("Tone: {tone}.\n"));
    }
    if let Some(custom) = &tenant.system_prompt {
        p.push_str(custom);
        p.push('\n');
    }

    if let Some(name) = &vars.customer_name {
        p.push_str(&format!("The caller's name is {name}; use it naturally.\n"));
    }
    if memory.intro_played {
        p.push_str("You already greeted the caller; do not greet again.\n");
    }
    if memory.pricing_discussed {
        p.push_str("Pricing has already come up in this call.\n");
    }

    p.push_str(concat!(
        "Rules for this phone channel:\n",
        "- Answer in one or two short spoken sentences.\n",
        "- No markdown, no lists, no stage directions.\n",
        "- Never read raw digits for prices, percentages or phone numbers; say them in words.\n",
        "- Never volunteer pricing; only answer when asked.\n",
    ));
    if tenant.call_transfer_enabled {
        p.push_str(&format!(
            "- If the caller asks for a human, say a short handoff sentence and append the exact token {TRANSFER_MARKER}.\n"
        ));
    }
    p.push_str(&format!(
        "- To book an appointment once you have the details, emit the exact token {BOOKING_MARKER} \
         on its own line, followed by lines DATE: YYYY-MM-DD, START_TIME: HH:MM, END_TIME: HH:MM, \
         CUSTOMER_NAME:, CUSTOMER_PHONE:, CUSTOMER_EMAIL:, SERVICE:, NOTES:.\n"
    ));

    p
}

/// "monday 09:00-17:00, tuesday closed, ..." in a stable weekday order.
pub fn render_hours(tenant: &Tenant) -> String {
    const DAYS: [&str; 7] = [
        "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    ];
    let parts: Vec<String> = DAYS
        .iter()
        .filter_map(|day| {
            let hours = tenant.business_hours.get(*day)?;
            if hours.closed {
                return Some(format!("{day} closed"));
            }
            match (&hours.open, &hours.close) {
                (Some(open), Some(close)) => Some(format!("{day} {open}-{close}")),
                _ => None,
            }
        })
        .collect();
    if parts.is_empty() {
        "not published".to_string()
    } else {
        parts.join(", ")
    }
}

fn weekday_name(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
