//! In-memory backend (dev mode and tests).

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use voxbridge_core::error::Result;

use crate::tenant::{Tenant, TenantDirectory, TenantSnapshot, VoiceProfile};

use super::{
    Appointment, BillingSink, CallRecord, CallStore, Lead, MinuteUsage, SubscriptionLookup, Turn,
};

#[derive(Default)]
pub struct InMemoryStore {
    tenants: DashMap<String, Tenant>,
    voices: DashMap<String, VoiceProfile>,
    calls: DashMap<String, CallRecord>,
    log: DashMap<String, Vec<Turn>>,
    leads: Mutex<Vec<Lead>>,
    appointments: Mutex<Vec<Appointment>>,
    trial_minutes: DashMap<String, u32>,
    paid_minutes: DashMap<String, u32>,
    overages: Mutex<Vec<(String, u32)>>,
    subscribed: DashMap<String, bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from config for dev mode.
    pub fn seeded(tenants: &[Tenant], voices: &[VoiceProfile]) -> Self {
        let this = Self::new();
        for t in tenants {
            this.tenants.insert(t.id.clone(), t.clone());
        }
        for v in voices {
            this.voices.insert(v.id.clone(), v.clone());
        }
        this
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id.clone(), tenant);
    }

    pub fn set_subscribed(&self, tenant_id: &str, active: bool) {
        self.subscribed.insert(tenant_id.to_string(), active);
    }

    // Test/introspection accessors.

    pub fn call(&self, call_sid: &str) -> Option<CallRecord> {
        self.calls.get(call_sid).map(|r| r.value().clone())
    }

    pub fn turns(&self, call_sid: &str) -> Vec<Turn> {
        self.log.get(call_sid).map(|r| r.value().clone()).unwrap_or_default()
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.leads.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn appointments(&self) -> Vec<Appointment> {
        self.appointments.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn trial_minutes_used(&self, tenant_id: &str) -> u32 {
        self.trial_minutes.get(tenant_id).map(|r| *r.value()).unwrap_or(0)
    }

    pub fn paid_minutes_used(&self, tenant_id: &str) -> u32 {
        self.paid_minutes.get(tenant_id).map(|r| *r.value()).unwrap_or(0)
    }

    pub fn overages(&self) -> Vec<(String, u32)> {
        self.overages.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CallStore for InMemoryStore {
    async fn upsert_call(&self, rec: &CallRecord) -> Result<()> {
        self.calls.insert(rec.call_sid.clone(), rec.clone());
        Ok(())
    }

    async fn append_turns(&self, call_sid: &str, turns: &[Turn]) -> Result<()> {
        self.log
            .entry(call_sid.to_string())
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }

    async fn add_minutes(&self, tenant_id: &str, usage: MinuteUsage) -> Result<()> {
        let (map, n) = match usage {
            MinuteUsage::Trial(n) => (&self.trial_minutes, n),
            MinuteUsage::Paid(n) => (&self.paid_minutes, n),
        };
        *map.entry(tenant_id.to_string()).or_insert(0) += n;
        Ok(())
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        if let Ok(mut g) = self.leads.lock() {
            g.push(lead.clone());
        }
        Ok(())
    }

    async fn insert_appointment(&self, appt: &Appointment) -> Result<()> {
        if let Ok(mut g) = self.appointments.lock() {
            g.push(appt.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn lookup(&self, client_id: &str) -> Result<Option<TenantSnapshot>> {
        let Some(tenant) = self.tenants.get(client_id).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        let voice = tenant
            .voice_id
            .as_deref()
            .and_then(|vid| self.voices.get(vid).map(|r| r.value().clone()))
            .unwrap_or_else(VoiceProfile::fallback);
        Ok(Some(TenantSnapshot { tenant, voice }))
    }
}

#[async_trait]
impl BillingSink for InMemoryStore {
    async fn record_overage(&self, customer_id: &str, minutes_over: u32) -> Result<()> {
        if let Ok(mut g) = self.overages.lock() {
            g.push((customer_id.to_string(), minutes_over));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionLookup for InMemoryStore {
    async fn has_active_subscription(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.subscribed.get(tenant_id).map(|r| *r.value()).unwrap_or(false))
    }
}
