//! Pre-upgrade guard (per-IP limiter).
//!
//! Stops upgrade abuse before a session task is ever spawned. Rejections
//! return HTTP 429 with a Retry-After hint. The per-IP map self-trims by
//! least-recent use once it grows past its bound.

use std::net::IpAddr;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::schema::UpgradeGuardSection;

/// Token bucket (capacity/refill, best-effort).
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_per_sec: u32) -> Self {
        let cap = f64::from(capacity.max(1));
        Self {
            capacity: cap,
            tokens: cap,
            refill_per_sec: f64::from(refill_per_sec.max(1)),
            last: Instant::now(),
        }
    }

    /// Take one token, or return the seconds until one is available.
    fn try_take(&mut self) -> Result<(), u64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = ((1.0 - self.tokens) / self.refill_per_sec).ceil();
            Err((wait as u64).max(1))
        }
    }
}

pub struct UpgradeGuard {
    enabled: bool,
    per_ip_rps: u32,
    per_ip_burst: u32,
    max_ip_entries: usize,
    per_ip: DashMap<IpAddr, Mutex<(Bucket, Instant)>>,
}

impl UpgradeGuard {
    pub fn new(cfg: &UpgradeGuardSection) -> Self {
        Self {
            enabled: cfg.enabled,
            per_ip_rps: cfg.per_ip_rps,
            per_ip_burst: cfg.per_ip_burst,
            max_ip_entries: cfg.max_ip_entries.max(1),
            per_ip: DashMap::new(),
        }
    }

    /// Check one upgrade attempt. On reject, returns retry-after seconds.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        if !self.enabled {
            return Ok(());
        }

        let entry = self.per_ip.entry(ip).or_insert_with(|| {
            Mutex::new((Bucket::new(self.per_ip_burst, self.per_ip_rps), Instant::now()))
        });
        {
            let mut g = entry.value().lock().await;
            g.1 = Instant::now();
            g.0.try_take()?;
        }
        drop(entry);

        if self.per_ip.len() > self.max_ip_entries {
            self.trim();
        }
        Ok(())
    }

    /// Drop entries idle longer than a minute; coarse but bounded.
    fn trim(&self) {
        let cutoff = Instant::now() - std::time::Duration::from_secs(60);
        self.per_ip.retain(|_, m| match m.try_lock() {
            Ok(g) => g.1 > cutoff,
            Err(_) => true,
        });
        tracing::warn!(len = self.per_ip.len(), "upgrade guard ip map trimmed");
    }
}
