//! Shared application state.
//!
//! Everything is `Arc`-friendly and cloneable. Vendor clients sit behind
//! trait objects so tests swap them for scripted fakes without touching the
//! session code.

use std::sync::Arc;

use voxbridge_core::error::Result;

use crate::call::registry::CallRegistry;
use crate::config::{GatewayConfig, StoreBackend};
use crate::obs::metrics::BridgeMetrics;
use crate::peers::carrier::{CallControl, TwilioControl};
use crate::peers::llm::{ChatModel, OpenAiChat};
use crate::peers::stt::{DeepgramStt, SpeechToText};
use crate::peers::tts::{ElevenLabsSynth, SpeechSynth};
use crate::store::memory::InMemoryStore;
use crate::store::rest::{HttpBillingSink, NullBillingSink, RestStore};
use crate::store::{BillingSink, CallStore, SubscriptionLookup};
use crate::tenant::TenantDirectory;
use crate::transport::guard::UpgradeGuard;

/// The vendor and storage seams, bundled for construction.
pub struct Services {
    pub directory: Arc<dyn TenantDirectory>,
    pub store: Arc<dyn CallStore>,
    pub subs: Arc<dyn SubscriptionLookup>,
    pub billing: Arc<dyn BillingSink>,
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn ChatModel>,
    pub tts: Arc<dyn SpeechSynth>,
    pub control: Arc<dyn CallControl>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    metrics: Arc<BridgeMetrics>,
    registry: CallRegistry,
    guard: UpgradeGuard,
    services: Services,
}

impl AppState {
    /// Wire the real backends from config.
    pub fn from_config(cfg: GatewayConfig) -> Result<Self> {
        let timeout = cfg.gateway.peer_timeout_secs;

        let (directory, store, subs): (
            Arc<dyn TenantDirectory>,
            Arc<dyn CallStore>,
            Arc<dyn SubscriptionLookup>,
        ) = match cfg.store.backend {
            StoreBackend::Memory => {
                let mem = Arc::new(InMemoryStore::seeded(&cfg.tenants, &cfg.voices));
                (mem.clone(), mem.clone(), mem)
            }
            StoreBackend::Rest => {
                let rest = Arc::new(RestStore::new(&cfg.store.url, &cfg.store.service_key, timeout)?);
                (rest.clone(), rest.clone(), rest)
            }
        };

        let billing: Arc<dyn BillingSink> = match &cfg.billing.overage_url {
            Some(url) => Arc::new(HttpBillingSink::new(url, timeout)?),
            None => Arc::new(NullBillingSink),
        };

        let services = Services {
            directory,
            store,
            subs,
            billing,
            stt: Arc::new(DeepgramStt::new(&cfg.stt)),
            llm: Arc::new(OpenAiChat::new(&cfg.llm, timeout)?),
            tts: Arc::new(ElevenLabsSynth::new(&cfg.tts, timeout)?),
            control: Arc::new(TwilioControl::new(&cfg.carrier, timeout)?),
        };
        Ok(Self::with_services(cfg, services))
    }

    /// Construction seam for tests: any subset of services can be a fake.
    pub fn with_services(cfg: GatewayConfig, services: Services) -> Self {
        let guard = UpgradeGuard::new(&cfg.gateway.upgrade_guard);
        Self {
            inner: Arc::new(AppStateInner {
                guard,
                metrics: Arc::new(BridgeMetrics::default()),
                registry: CallRegistry::new(),
                services,
                cfg,
            }),
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.inner.metrics
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.inner.registry
    }

    pub fn guard(&self) -> &UpgradeGuard {
        &self.inner.guard
    }

    pub fn directory(&self) -> &Arc<dyn TenantDirectory> {
        &self.inner.services.directory
    }

    pub fn store(&self) -> &Arc<dyn CallStore> {
        &self.inner.services.store
    }

    pub fn subs(&self) -> &Arc<dyn SubscriptionLookup> {
        &self.inner.services.subs
    }

    pub fn billing(&self) -> &Arc<dyn BillingSink> {
        &self.inner.services.billing
    }

    pub fn stt(&self) -> &Arc<dyn SpeechToText> {
        &self.inner.services.stt
    }

    pub fn llm(&self) -> &Arc<dyn ChatModel> {
        &self.inner.services.llm
    }

    pub fn tts(&self) -> &Arc<dyn SpeechSynth> {
        &self.inner.services.tts
    }

    pub fn control(&self) -> &Arc<dyn CallControl> {
        &self.inner.services.control
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }
}
