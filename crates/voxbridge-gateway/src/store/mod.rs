//! Persistence contract and backends.
//!
//! Store-agnostic: the session and finaliser talk to these traits only.
//! Each record write is atomic on its own; partial persistence after a
//! failure is acceptable and reconciled offline by call id.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use voxbridge_core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Greeting,
    Transcription,
    AiResponse,
    Transfer,
    TransferFallback,
    BookingConfirmation,
    BookingError,
}

/// One entry of the append-only conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
    pub at: DateTime<Utc>,
    pub kind: TurnKind,
}

impl Turn {
    pub fn now(speaker: Speaker, kind: TurnKind, content: impl Into<String>) -> Self {
        Self {
            speaker,
            content: content.into(),
            at: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    InProgress,
    Completed,
    Failed,
    Transferred,
}

/// The per-call record, upserted by vendor call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_sid: String,
    pub tenant_id: String,
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(default)]
    pub stream_sid: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: u64,
    pub status: CallStatus,
    #[serde(default)]
    pub summary: Option<String>,
    /// Admission decision that let this call run (fail-open is visible here).
    #[serde(default)]
    pub gate_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub tenant_id: String,
    pub call_sid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub source: &'static str,
    pub status: &'static str,
}

impl Lead {
    pub fn new(tenant_id: impl Into<String>, call_sid: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            call_sid: call_sid.into(),
            name: None,
            email: None,
            phone: None,
            notes: None,
            source: "phone",
            status: "new",
        }
    }

    /// A lead is only worth persisting if it can be followed up.
    pub fn is_actionable(&self) -> bool {
        self.name.is_some() || self.email.is_some() || self.phone.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub tenant_id: String,
    pub call_sid: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

/// Minute-accounting delta; increments are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinuteUsage {
    Trial(u32),
    Paid(u32),
}

#[async_trait]
pub trait CallStore: Send + Sync {
    /// Upsert by `call_sid`.
    async fn upsert_call(&self, rec: &CallRecord) -> Result<()>;
    /// Append-only, keyed by (call, timestamp).
    async fn append_turns(&self, call_sid: &str, turns: &[Turn]) -> Result<()>;
    async fn add_minutes(&self, tenant_id: &str, usage: MinuteUsage) -> Result<()>;
    async fn insert_lead(&self, lead: &Lead) -> Result<()>;
    async fn insert_appointment(&self, appt: &Appointment) -> Result<()>;
}

/// External billing sink for paid-plan overage, keyed by the tenant's
/// payment-processor customer id.
#[async_trait]
pub trait BillingSink: Send + Sync {
    async fn record_overage(&self, customer_id: &str, minutes_over: u32) -> Result<()>;
}

/// External subscription state (opaque producer; see gate policy).
#[async_trait]
pub trait SubscriptionLookup: Send + Sync {
    async fn has_active_subscription(&self, tenant_id: &str) -> Result<bool>;
}
