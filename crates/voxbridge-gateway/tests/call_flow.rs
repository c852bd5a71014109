//! End-to-end call flows over a real WebSocket.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use futures_util::SinkExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use voxbridge_gateway::store::{CallStatus, Speaker, TurnKind};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn happy_path_one_turn_call() {
    let chat = ScriptedChat::with_responses(vec![vec!["We're open nine to five today."]]);
    let stt = FakeStt::with_finals(vec!["Hi, what are your hours?"]);
    let h = harness(vec![tenant("acme")], chat, stt);
    let addr = spawn_server(h.state.clone()).await;

    let mut ws = connect_call(addr, "CA100").await;
    send_json(&mut ws, json!({"event": "connected", "protocol": "Call"})).await;
    send_json(&mut ws, start_frame("acme", "+15550001111")).await;

    // Greeting first, so caller audio is not swallowed by half-duplex.
    let greeting = collect_outbound(&mut ws, 1, WAIT).await;
    assert_eq!(greeting, vec![Outbound::Media("Hi.".into())]);

    send_json(&mut ws, media_frame()).await;
    let response = collect_outbound(&mut ws, 1, WAIT).await;
    assert_eq!(
        response,
        vec![Outbound::Media("We're open nine to five today.".into())]
    );

    send_json(&mut ws, json!({"event": "stop"})).await;

    wait_until("call record completed", WAIT, || {
        h.store
            .call("CA100")
            .is_some_and(|c| c.status == CallStatus::Completed)
    })
    .await;

    let record = h.store.call("CA100").unwrap();
    assert!(record.ended_at.unwrap() > record.started_at);
    assert_eq!(record.caller.as_deref(), Some("+15550001111"));
    assert_eq!(record.summary.as_deref(), Some("Hi, what are your hours?"));

    let turns = h.store.turns("CA100");
    assert!(turns
        .iter()
        .any(|t| t.kind == TurnKind::Greeting && t.speaker == Speaker::Assistant));
    assert!(turns
        .iter()
        .any(|t| t.kind == TurnKind::Transcription && t.content == "Hi, what are your hours?"));
    assert!(turns
        .iter()
        .any(|t| t.kind == TurnKind::AiResponse
            && t.content == "We're open nine to five today."));

    assert_eq!(h.stt.opens.load(Ordering::SeqCst), 1);
    assert_eq!(h.chat.stream_calls.load(Ordering::SeqCst), 1);
    // A sub-minute test call bills nothing; rounding is covered in the
    // finaliser suite with real durations.
    assert!(h.store.leads().is_empty());
}

#[tokio::test]
async fn exhausted_trial_is_rejected_before_any_ai_spend() {
    let chat = ScriptedChat::with_responses(vec![]);
    let stt = FakeStt::with_finals(vec![]);
    let mut t = tenant("acme");
    if let Some(ledger) = t.ledger.as_mut() {
        ledger.trial_minutes = 30;
        ledger.trial_minutes_used = 30;
    }
    let h = harness(vec![t], chat, stt);
    let addr = spawn_server(h.state.clone()).await;

    let mut ws = connect_call(addr, "CA200").await;
    send_json(&mut ws, start_frame("acme", "+15550001111")).await;

    let out = collect_outbound(&mut ws, 2, Duration::from_secs(12)).await;
    assert_eq!(out.len(), 2, "expected rejection audio then stop");
    let Outbound::Media(text) = &out[0] else {
        panic!("expected rejection audio first");
    };
    assert!(text.contains("trial minutes"), "got: {text}");
    assert_eq!(out[1], Outbound::Stop);

    assert_eq!(h.stt.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.chat.stream_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.chat.json_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.synth.texts().len(), 1);
    assert_eq!(h.store.trial_minutes_used("acme"), 30);
    assert!(h.store.call("CA200").is_none());
}

#[tokio::test]
async fn sentences_reach_the_carrier_in_order_despite_slow_synthesis() {
    let chat = ScriptedChat::with_responses(vec![vec!["One. ", "Two. ", "Three."]]);
    let stt = FakeStt::with_finals(vec!["Tell me three things."]);
    let h = harness(vec![tenant("acme")], chat, stt);
    // First sentence completes last, third first.
    h.synth.delay("One.", 120);
    h.synth.delay("Two.", 60);
    h.synth.delay("Three.", 10);
    let addr = spawn_server(h.state.clone()).await;

    let mut ws = connect_call(addr, "CA300").await;
    send_json(&mut ws, start_frame("acme", "+15550001111")).await;
    let greeting = collect_outbound(&mut ws, 1, WAIT).await;
    assert_eq!(greeting, vec![Outbound::Media("Hi.".into())]);

    send_json(&mut ws, media_frame()).await;
    let out = collect_outbound(&mut ws, 3, WAIT).await;
    assert_eq!(
        out,
        vec![
            Outbound::Media("One.".into()),
            Outbound::Media("Two.".into()),
            Outbound::Media("Three.".into()),
        ]
    );
}

#[tokio::test]
async fn duplicate_upgrade_for_a_live_call_is_rejected() {
    let chat = ScriptedChat::with_responses(vec![]);
    let stt = FakeStt::with_finals(vec![]);
    let h = harness(vec![tenant("acme")], chat, stt);
    let addr = spawn_server(h.state.clone()).await;

    let _ws = connect_call(addr, "CA400").await;
    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/v1/calls/CA400/media")).await;
    assert!(err.is_err(), "second upgrade for the same call must fail");
}

#[tokio::test]
async fn session_without_start_frame_times_out_clean() {
    let chat = ScriptedChat::with_responses(vec![]);
    let stt = FakeStt::with_finals(vec![]);
    let h = harness(vec![tenant("acme")], chat, stt);
    let addr = spawn_server(h.state.clone()).await;

    let mut ws = connect_call(addr, "CA500").await;
    // Handshake ack only, never a start frame; the carrier side then hangs
    // up. Nothing may be persisted for such a session.
    send_json(&mut ws, json!({"event": "connected"})).await;
    ws.send(WsMessage::Close(None)).await.unwrap();

    wait_until("registry released", WAIT, || h.state.registry().is_empty()).await;
    assert!(h.store.call("CA500").is_none());
    assert_eq!(h.stt.opens.load(Ordering::SeqCst), 0);
}
