//! Tenant and voice-profile records.
//!
//! Tenants are shared-read: a call takes a snapshot at `start` and never
//! observes later edits. The minute ledger on the snapshot is only used for
//! the admission decision; accounting updates go through the store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use voxbridge_core::error::Result;

/// One business served by the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tenant {
    pub id: String,
    pub business_name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// IANA timezone name, e.g. "America/New_York".
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Day name (lowercase) → hours.
    #[serde(default)]
    pub business_hours: HashMap<String, DayHours>,
    #[serde(default)]
    pub voice_id: Option<String>,
    /// Tenant-authored addition to the system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub call_transfer_enabled: bool,
    #[serde(default)]
    pub call_transfer_number: Option<String>,
    pub contact_email: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub pricing: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    /// Payment-processor customer id, used to key overage events.
    #[serde(default)]
    pub billing_customer_id: Option<String>,
    #[serde(default)]
    pub ledger: Option<MinuteLedger>,
}

fn default_timezone() -> String {
    "UTC".into()
}

/// Minute-tracking record; absence means the tenant is not metered.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinuteLedger {
    #[serde(default)]
    pub trial_minutes: u32,
    #[serde(default)]
    pub trial_minutes_used: u32,
    #[serde(default)]
    pub paid_plan: bool,
    #[serde(default)]
    pub paid_minutes_included: u32,
    #[serde(default)]
    pub paid_minutes_used: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayHours {
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceProfile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl VoiceProfile {
    /// Neutral fallback when a tenant has no profile assigned.
    pub fn fallback() -> Self {
        Self {
            id: "default".into(),
            display_name: "Alex".into(),
            accent: None,
            gender: None,
        }
    }
}

/// Immutable per-call view of a tenant, taken at `start`.
#[derive(Debug, Clone)]
pub struct TenantSnapshot {
    pub tenant: Tenant,
    pub voice: VoiceProfile,
}

pub type SharedSnapshot = Arc<TenantSnapshot>;

/// Lookup seam: in-memory for dev/tests, REST-backed in production.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn lookup(&self, client_id: &str) -> Result<Option<TenantSnapshot>>;
}
