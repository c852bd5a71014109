//! Metrics registry for the bridge.
//!
//! Label sets are flattened into sorted key vectors for deterministic
//! ordering. Histogram buckets are fixed in milliseconds; the interesting
//! range is "how long between a caller finishing a sentence and the first
//! audio going back", which lives between 100 ms and 10 s.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn render_labels(key: &[(String, String)]) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self.map.entry(label_key(labels)).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let _ = writeln!(
                out,
                "{name}{{{}}} {}",
                render_labels(r.key()),
                r.value().load(Ordering::Relaxed)
            );
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<Vec<(String, String)>, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        let gauge = self.map.entry(label_key(labels)).or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        for r in self.map.iter() {
            let _ = writeln!(
                out,
                "{name}{{{}}} {}",
                render_labels(r.key()),
                r.value().load(Ordering::Relaxed)
            );
        }
    }
}

// 100ms .. 10s in milliseconds.
const BUCKETS_MS: [u64; 8] = [100, 250, 500, 1_000, 2_000, 4_000, 7_000, 10_000];

struct AtomicHistogram {
    count: AtomicU64,
    sum_ms: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MS.len()],
}

impl Default for AtomicHistogram {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<Vec<(String, String)>, AtomicHistogram>,
}

impl HistogramVec {
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let hist = self.map.entry(label_key(labels)).or_default();
        let ms = duration.as_millis() as u64;

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum_ms.fetch_add(ms, Ordering::Relaxed);
        for (i, &b) in BUCKETS_MS.iter().enumerate() {
            if ms <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for r in self.map.iter() {
            let labels = render_labels(r.key());
            let prefix = if labels.is_empty() {
                String::new()
            } else {
                format!("{labels},")
            };
            let hist = r.value();
            for (i, &le) in BUCKETS_MS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{name}_bucket{{{prefix}le=\"{le}\"}} {}",
                    hist.buckets[i].load(Ordering::Relaxed)
                );
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"+Inf\"}} {count}");
            let _ = writeln!(out, "{name}_sum{{{labels}}} {}", hist.sum_ms.load(Ordering::Relaxed));
            let _ = writeln!(out, "{name}_count{{{labels}}} {count}");
        }
    }
}

/// All bridge metrics, shared through `AppState`.
#[derive(Default)]
pub struct BridgeMetrics {
    /// Calls by final status (completed/failed/transferred/denied).
    pub calls_total: CounterVec,
    pub calls_active: GaugeVec,
    /// Gate outcomes by decision + reason.
    pub gate_decisions: CounterVec,
    pub upgrade_rejections: CounterVec,
    /// Inbound carrier frames by event.
    pub carrier_frames: CounterVec,
    pub stt_finals_total: CounterVec,
    /// Finals dropped because a turn was already in flight.
    pub finals_dropped_total: CounterVec,
    pub tts_chunks_total: CounterVec,
    /// Playback-queue resets at a response boundary.
    pub playback_resets_total: CounterVec,
    pub peer_errors: CounterVec,
    /// Finaliser sub-step failures by step.
    pub finalize_errors: CounterVec,
    /// Final-utterance → turn-complete latency (ms).
    pub turn_duration: HistogramVec,
    draining: AtomicBool,
}

impl BridgeMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.calls_total.render("voxbridge_calls_total", &mut out);
        self.calls_active.render("voxbridge_calls_active", &mut out);
        self.gate_decisions.render("voxbridge_gate_decisions_total", &mut out);
        self.upgrade_rejections.render("voxbridge_upgrade_rejections_total", &mut out);
        self.carrier_frames.render("voxbridge_carrier_frames_total", &mut out);
        self.stt_finals_total.render("voxbridge_stt_finals_total", &mut out);
        self.finals_dropped_total.render("voxbridge_finals_dropped_total", &mut out);
        self.tts_chunks_total.render("voxbridge_tts_chunks_total", &mut out);
        self.playback_resets_total.render("voxbridge_playback_resets_total", &mut out);
        self.peer_errors.render("voxbridge_peer_errors_total", &mut out);
        self.finalize_errors.render("voxbridge_finalize_errors_total", &mut out);
        self.turn_duration.render("voxbridge_turn_duration_ms", &mut out);
        let _ = writeln!(
            out,
            "# TYPE voxbridge_draining gauge\nvoxbridge_draining {}",
            u8::from(self.is_draining())
        );
        out
    }
}
