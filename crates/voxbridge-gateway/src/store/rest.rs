//! REST backend (PostgREST-style data service).
//!
//! One `reqwest` client with the service key in default headers and a 30 s
//! timeout; every method is a single request. Minute accounting goes through
//! an RPC so the increment stays monotonic server-side.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;

use voxbridge_core::error::{Peer, Result, VoxError};

use crate::tenant::{Tenant, TenantDirectory, TenantSnapshot, VoiceProfile};

use super::{
    Appointment, BillingSink, CallRecord, CallStore, Lead, MinuteUsage, SubscriptionLookup, Turn,
};

pub struct RestStore {
    client: reqwest::Client,
    base: String,
}

impl RestStore {
    pub fn new(base_url: &str, service_key: &str, timeout_secs: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|e| VoxError::Config(format!("bad store service key: {e}")))?;
        let key = HeaderValue::from_str(service_key)
            .map_err(|e| VoxError::Config(format!("bad store service key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("apikey", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VoxError::Config(format!("store client build failed: {e}")))?;

        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn post_row(&self, path: &str, body: &impl serde::Serialize) -> Result<()> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(store_err)?;
        ok_status(resp).await
    }
}

fn store_err(e: reqwest::Error) -> VoxError {
    if e.is_timeout() {
        VoxError::PeerTimeout(Peer::Store)
    } else {
        VoxError::Store(e.to_string())
    }
}

async fn ok_status(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(VoxError::Store(format!("status {status}: {body}")))
}

#[async_trait]
impl CallStore for RestStore {
    async fn upsert_call(&self, rec: &CallRecord) -> Result<()> {
        let resp = self
            .client
            .post(self.url("calls?on_conflict=call_sid"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(rec)
            .send()
            .await
            .map_err(store_err)?;
        ok_status(resp).await
    }

    async fn append_turns(&self, call_sid: &str, turns: &[Turn]) -> Result<()> {
        let rows: Vec<_> = turns
            .iter()
            .map(|t| {
                json!({
                    "call_sid": call_sid,
                    "speaker": t.speaker,
                    "content": t.content,
                    "at": t.at,
                    "kind": t.kind,
                })
            })
            .collect();
        self.post_row("conversation_log", &rows).await
    }

    async fn add_minutes(&self, tenant_id: &str, usage: MinuteUsage) -> Result<()> {
        let (trial, paid) = match usage {
            MinuteUsage::Trial(n) => (n, 0),
            MinuteUsage::Paid(n) => (0, n),
        };
        self.post_row(
            "rpc/record_minutes",
            &json!({ "tenant_id": tenant_id, "trial_minutes": trial, "paid_minutes": paid }),
        )
        .await
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        self.post_row("leads", lead).await
    }

    async fn insert_appointment(&self, appt: &Appointment) -> Result<()> {
        self.post_row("appointments", appt).await
    }
}

#[async_trait]
impl TenantDirectory for RestStore {
    async fn lookup(&self, client_id: &str) -> Result<Option<TenantSnapshot>> {
        let rows: Vec<Tenant> = self
            .client
            .get(self.url(&format!("tenants?id=eq.{client_id}&select=*")))
            .send()
            .await
            .map_err(store_err)?
            .json()
            .await
            .map_err(store_err)?;
        let Some(tenant) = rows.into_iter().next() else {
            return Ok(None);
        };

        let voice = match tenant.voice_id.as_deref() {
            Some(vid) => {
                let rows: Vec<VoiceProfile> = self
                    .client
                    .get(self.url(&format!("voice_profiles?id=eq.{vid}&select=*")))
                    .send()
                    .await
                    .map_err(store_err)?
                    .json()
                    .await
                    .map_err(store_err)?;
                rows.into_iter().next().unwrap_or_else(VoiceProfile::fallback)
            }
            None => VoiceProfile::fallback(),
        };

        Ok(Some(TenantSnapshot { tenant, voice }))
    }
}

#[async_trait]
impl SubscriptionLookup for RestStore {
    async fn has_active_subscription(&self, tenant_id: &str) -> Result<bool> {
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(default)]
            status: String,
        }
        let rows: Vec<Row> = self
            .client
            .get(self.url(&format!("subscriptions?tenant_id=eq.{tenant_id}&select=status")))
            .send()
            .await
            .map_err(store_err)?
            .json()
            .await
            .map_err(store_err)?;
        Ok(rows.iter().any(|r| r.status == "active"))
    }
}

/// HTTP overage sink; posts one event per finalised overage call.
pub struct HttpBillingSink {
    client: reqwest::Client,
    url: String,
}

impl HttpBillingSink {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VoxError::Config(format!("billing client build failed: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl BillingSink for HttpBillingSink {
    async fn record_overage(&self, customer_id: &str, minutes_over: u32) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "customer_id": customer_id, "minutes_over": minutes_over }))
            .send()
            .await
            .map_err(|e| VoxError::peer(Peer::Billing, e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(VoxError::peer(Peer::Billing, resp.status()))
        }
    }
}

/// Sink used when no overage endpoint is configured: logs and moves on.
pub struct NullBillingSink;

#[async_trait]
impl BillingSink for NullBillingSink {
    async fn record_overage(&self, customer_id: &str, minutes_over: u32) -> Result<()> {
        tracing::info!(customer = %customer_id, minutes_over, "overage (no billing sink configured)");
        Ok(())
    }
}
