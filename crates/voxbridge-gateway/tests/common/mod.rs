//! Shared fakes and harness for gateway integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use voxbridge_core::error::{Peer, Result, VoxError};
use voxbridge_gateway::app_state::{AppState, Services};
use voxbridge_gateway::config;
use voxbridge_gateway::peers::carrier::CallControl;
use voxbridge_gateway::peers::llm::{ChatMessage, ChatModel};
use voxbridge_gateway::peers::stt::{SpeechToText, SttEvent, SttStream};
use voxbridge_gateway::peers::tts::SpeechSynth;
use voxbridge_gateway::router;
use voxbridge_gateway::store::memory::InMemoryStore;
use voxbridge_gateway::tenant::{MinuteLedger, Tenant, TenantSnapshot, VoiceProfile};

/// Model fake: scripted responses, each a list of stream deltas. An empty
/// script makes `stream_chat` fail, which doubles as the LLM-outage case.
#[derive(Default)]
pub struct ScriptedChat {
    pub responses: Mutex<VecDeque<Vec<String>>>,
    pub json_replies: Mutex<VecDeque<Value>>,
    pub stream_calls: AtomicUsize,
    pub json_calls: AtomicUsize,
}

impl ScriptedChat {
    pub fn with_responses(responses: Vec<Vec<&str>>) -> Arc<Self> {
        let this = Self::default();
        let mut q = this.responses.lock().unwrap();
        for r in responses {
            q.push_back(r.into_iter().map(String::from).collect());
        }
        drop(q);
        Arc::new(this)
    }

    pub fn push_json(&self, v: Value) {
        self.json_replies.lock().unwrap().push_back(v);
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn stream_chat(
        &self,
        _messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let deltas = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| VoxError::peer(Peer::Llm, "script exhausted"))?;
        let mut full = String::new();
        for d in deltas {
            full.push_str(&d);
            on_delta(&d);
        }
        Ok(full)
    }

    async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value> {
        self.json_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.json_replies.lock().unwrap().pop_front().unwrap_or(json!({
            "name": null, "email": null, "phone": null, "notes": null,
            "has_booking": false
        })))
    }
}

/// Synthesis fake: echoes the text as the audio payload so assertions can
/// match released frames to sentences. Per-text delays simulate out-of-order
/// vendor completion.
#[derive(Default)]
pub struct RecordingSynth {
    pub calls: Mutex<Vec<String>>,
    pub delays_ms: Mutex<HashMap<String, u64>>,
    pub wav_wrap: bool,
}

impl RecordingSynth {
    pub fn delay(&self, text: &str, ms: u64) {
        self.delays_ms.lock().unwrap().insert(text.to_string(), ms);
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynth for RecordingSynth {
    async fn synthesize(&self, _voice_id: &str, text: &str) -> Result<Bytes> {
        self.calls.lock().unwrap().push(text.to_string());
        let delay = self.delays_ms.lock().unwrap().get(text).copied();
        if let Some(ms) = delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.wav_wrap {
            let mut v = b"RIFF".to_vec();
            v.resize(44, 0);
            v.extend_from_slice(text.as_bytes());
            Ok(Bytes::from(v))
        } else {
            Ok(Bytes::from(text.as_bytes().to_vec()))
        }
    }
}

/// Synthesis fake that always fails (silent-turn behaviour).
pub struct FailingSynth;

#[async_trait]
impl SpeechSynth for FailingSynth {
    async fn synthesize(&self, _voice_id: &str, _text: &str) -> Result<Bytes> {
        Err(VoxError::peer(Peer::Tts, "down"))
    }
}

/// STT fake: each inbound audio packet pops the next scripted final.
#[derive(Default)]
pub struct FakeStt {
    script: Arc<Mutex<VecDeque<String>>>,
    pub opens: AtomicUsize,
}

impl FakeStt {
    pub fn with_finals(finals: Vec<&str>) -> Arc<Self> {
        let this = Self::default();
        this.script
            .lock()
            .unwrap()
            .extend(finals.into_iter().map(String::from));
        Arc::new(this)
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn open(
        &self,
        _call_sid: &str,
        events: mpsc::Sender<SttEvent>,
    ) -> Result<Box<dyn SttStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSttStream {
            script: self.script.clone(),
            events,
        }))
    }
}

struct FakeSttStream {
    script: Arc<Mutex<VecDeque<String>>>,
    events: mpsc::Sender<SttEvent>,
}

#[async_trait]
impl SttStream for FakeSttStream {
    async fn send_audio(&self, _audio: Bytes) {
        let next = self.script.lock().unwrap().pop_front();
        if let Some(text) = next {
            let _ = self.events.send(SttEvent::Final(text)).await;
        }
    }

    async fn close(&self) {}
}

/// Carrier control fake recording transfer invocations.
#[derive(Default)]
pub struct RecordingControl {
    pub transfers: Mutex<Vec<(String, String, String)>>,
}

impl RecordingControl {
    pub fn recorded(&self) -> Vec<(String, String, String)> {
        self.transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallControl for RecordingControl {
    async fn transfer(&self, call_sid: &str, number: &str, conversation: &str) -> Result<()> {
        self.transfers.lock().unwrap().push((
            call_sid.to_string(),
            number.to_string(),
            conversation.to_string(),
        ));
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub chat: Arc<ScriptedChat>,
    pub synth: Arc<RecordingSynth>,
    pub stt: Arc<FakeStt>,
    pub control: Arc<RecordingControl>,
}

pub fn harness(tenants: Vec<Tenant>, chat: Arc<ScriptedChat>, stt: Arc<FakeStt>) -> Harness {
    let cfg = config::load_from_str("version: 1\n").unwrap();
    let store = Arc::new(InMemoryStore::new());
    for t in tenants {
        store.insert_tenant(t);
    }
    let synth = Arc::new(RecordingSynth::default());
    let control = Arc::new(RecordingControl::default());

    let services = Services {
        directory: store.clone(),
        store: store.clone(),
        subs: store.clone(),
        billing: store.clone(),
        stt: stt.clone(),
        llm: chat.clone(),
        tts: synth.clone(),
        control: control.clone(),
    };
    Harness {
        state: AppState::with_services(cfg, services),
        store,
        chat,
        synth,
        stt,
        control,
    }
}

pub fn tenant(id: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        business_name: "Acme Dental".into(),
        industry: Some("dental".into()),
        region: None,
        timezone: "America/New_York".into(),
        business_hours: HashMap::new(),
        voice_id: None,
        system_prompt: None,
        call_transfer_enabled: false,
        call_transfer_number: None,
        contact_email: "desk@acme.test".into(),
        services: vec!["cleaning".into()],
        pricing: None,
        tone: None,
        greeting: Some("Hi.".into()),
        billing_customer_id: None,
        ledger: Some(MinuteLedger {
            trial_minutes: 10,
            trial_minutes_used: 0,
            ..Default::default()
        }),
    }
}

pub fn snapshot(t: Tenant) -> Arc<TenantSnapshot> {
    Arc::new(TenantSnapshot {
        tenant: t,
        voice: VoiceProfile::fallback(),
    })
}

// WebSocket driving helpers.

pub type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn spawn_server(state: AppState) -> SocketAddr {
    let app = router::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub async fn connect_call(addr: SocketAddr, call_sid: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/v1/calls/{call_sid}/media"))
        .await
        .unwrap();
    ws
}

pub async fn send_json(ws: &mut ClientWs, v: Value) {
    use futures_util::SinkExt;
    ws.send(WsMessage::Text(v.to_string())).await.unwrap();
}

pub fn start_frame(client_id: &str, caller: &str) -> Value {
    json!({
        "event": "start",
        "start": {
            "streamSid": "MZtest",
            "customParameters": {
                "client_id": client_id,
                "caller": caller,
                "direction": "inbound"
            }
        }
    })
}

pub fn media_frame() -> Value {
    use base64::Engine;
    let payload = base64::engine::general_purpose::STANDARD.encode([0u8; 160]);
    json!({ "event": "media", "media": { "payload": payload } })
}

/// Outbound frame, decoded: media payload text, or the stop event.
#[derive(Debug, PartialEq, Eq)]
pub enum Outbound {
    Media(String),
    Stop,
}

/// Read outbound frames until `n` collected or the deadline passes.
pub async fn collect_outbound(ws: &mut ClientWs, n: usize, deadline: Duration) -> Vec<Outbound> {
    use base64::Engine;
    use futures_util::StreamExt;

    let mut out = Vec::new();
    let _ = tokio::time::timeout(deadline, async {
        while out.len() < n {
            let Some(Ok(msg)) = ws.next().await else {
                break;
            };
            let WsMessage::Text(s) = msg else {
                continue;
            };
            let v: Value = serde_json::from_str(&s).unwrap();
            match v["event"].as_str() {
                Some("media") => {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(v["media"]["payload"].as_str().unwrap())
                        .unwrap();
                    out.push(Outbound::Media(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some("stop") => out.push(Outbound::Stop),
                _ => {}
            }
        }
    })
    .await;
    out
}

/// Poll until `check` passes or the deadline hits; panics with `what` on
/// timeout so the failure names the missing condition.
pub async fn wait_until(what: &str, deadline: Duration, mut check: impl FnMut() -> bool) {
    let result = tokio::time::timeout(deadline, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}
