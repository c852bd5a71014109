//! In-band model-to-system markers.
//!
//! The dialogue model is instructed to emit sentinel strings when it wants a
//! side effect: `INITIATING_TRANSFER` for a human handoff and
//! `BOOKING_APPOINTMENT` followed by a labelled block for a booking. The
//! scanner runs over the *accumulated* response text, so a marker split
//! across stream deltas is still detected. Stored history and synthesised
//! speech must never contain the sentinels.

pub const TRANSFER_MARKER: &str = "INITIATING_TRANSFER";
pub const BOOKING_MARKER: &str = "BOOKING_APPOINTMENT";

/// Labelled block following `BOOKING_APPOINTMENT`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BookingBlock {
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
}

impl BookingBlock {
    /// DATE, START_TIME, END_TIME and CUSTOMER_NAME are all required for a
    /// booking to be created; anything less is logged and ignored.
    pub fn is_complete(&self) -> bool {
        self.date.is_some()
            && self.start_time.is_some()
            && self.end_time.is_some()
            && self.customer_name.is_some()
    }

    fn set(&mut self, label: &str, value: &str) -> bool {
        let v = value.trim();
        let slot = match label {
            "DATE" => &mut self.date,
            "START_TIME" => &mut self.start_time,
            "END_TIME" => &mut self.end_time,
            "CUSTOMER_NAME" => &mut self.customer_name,
            "CUSTOMER_PHONE" => &mut self.customer_phone,
            "CUSTOMER_EMAIL" => &mut self.customer_email,
            "SERVICE" => &mut self.service,
            "NOTES" => &mut self.notes,
            _ => return false,
        };
        if !v.is_empty() {
            *slot = Some(v.to_string());
        }
        true
    }
}

/// Result of scanning one full model response.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Response text with every marker and booking line removed.
    pub clean: String,
    pub transfer: bool,
    pub booking: Option<BookingBlock>,
}

/// Scan an accumulated response for markers and strip them.
pub fn scan(response: &str) -> ScanOutcome {
    let mut out = ScanOutcome {
        transfer: response.contains(TRANSFER_MARKER),
        ..ScanOutcome::default()
    };

    let mut kept: Vec<String> = Vec::new();
    let mut in_block = false;
    for line in response.lines() {
        if line.contains(BOOKING_MARKER) {
            in_block = true;
            let block = out.booking.get_or_insert_with(BookingBlock::default);
            // Tolerate labels on the marker line itself.
            if let Some(rest) = line.splitn(2, BOOKING_MARKER).nth(1) {
                consume_label(block, rest);
            }
            let before = line.split(BOOKING_MARKER).next().unwrap_or("");
            push_clean(&mut kept, before);
            continue;
        }
        if in_block {
            if let Some(block) = out.booking.as_mut() {
                if consume_label(block, line) {
                    continue;
                }
            }
            in_block = false;
        }
        push_clean(&mut kept, line);
    }

    out.clean = kept.join(" ");
    out
}

/// Remove marker sentinels and booking labels from a sentence destined for
/// synthesis. Side effects are *not* interpreted here; this only guarantees
/// the caller never hears protocol text.
pub fn strip_inline(text: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.contains(BOOKING_MARKER) || is_label_line(line) {
            continue;
        }
        push_clean(&mut kept, line);
    }
    kept.join(" ")
}

fn push_clean(kept: &mut Vec<String>, line: &str) {
    let cleaned = line.replace(TRANSFER_MARKER, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if !cleaned.is_empty() {
        kept.push(cleaned);
    }
}

fn consume_label(block: &mut BookingBlock, line: &str) -> bool {
    let trimmed = line.trim();
    if let Some((label, value)) = trimmed.split_once(':') {
        return block.set(label.trim(), value);
    }
    trimmed.is_empty()
}

fn is_label_line(line: &str) -> bool {
    let trimmed = line.trim();
    match trimmed.split_once(':') {
        Some((label, _)) => matches!(
            label.trim(),
            "DATE"
                | "START_TIME"
                | "END_TIME"
                | "CUSTOMER_NAME"
                | "CUSTOMER_PHONE"
                | "CUSTOMER_EMAIL"
                | "SERVICE"
                | "NOTES"
        ),
        None => false,
    }
}
