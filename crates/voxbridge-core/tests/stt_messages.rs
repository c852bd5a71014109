//! Transcription peer message vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use voxbridge_core::protocol::stt::{live_query_params, SttMessage, KEEPALIVE_JSON};

#[test]
fn final_result_yields_transcript() {
    let s = r#"{
        "type": "Results",
        "channel": { "alternatives": [ { "transcript": "Hi, what are your hours?" } ] },
        "is_final": true
    }"#;
    let m: SttMessage = serde_json::from_str(s).unwrap();
    assert_eq!(m.final_transcript(), Some("Hi, what are your hours?"));
}

#[test]
fn interim_result_is_ignored() {
    let s = r#"{
        "type": "Results",
        "channel": { "alternatives": [ { "transcript": "Hi, what" } ] },
        "is_final": false
    }"#;
    let m: SttMessage = serde_json::from_str(s).unwrap();
    assert_eq!(m.final_transcript(), None);
}

#[test]
fn whitespace_only_final_is_discarded() {
    let s = r#"{
        "type": "Results",
        "channel": { "alternatives": [ { "transcript": "   " } ] },
        "is_final": true
    }"#;
    let m: SttMessage = serde_json::from_str(s).unwrap();
    assert_eq!(m.final_transcript(), None);
}

#[test]
fn utterance_end_parses() {
    let m: SttMessage =
        serde_json::from_str(r#"{"type":"UtteranceEnd","last_word_end":2.1}"#).unwrap();
    assert!(matches!(m, SttMessage::UtteranceEnd { .. }));
    assert_eq!(m.final_transcript(), None);
}

#[test]
fn keepalive_is_valid_json() {
    let v: serde_json::Value = serde_json::from_str(KEEPALIVE_JSON).unwrap();
    assert_eq!(v["type"], "KeepAlive");
}

#[test]
fn live_params_pin_the_carrier_format() {
    let params = live_query_params();
    let get = |k: &str| params.iter().find(|(pk, _)| *pk == k).map(|(_, v)| *v);
    assert_eq!(get("encoding"), Some("mulaw"));
    assert_eq!(get("sample_rate"), Some("8000"));
    assert_eq!(get("channels"), Some("1"));
    assert_eq!(get("endpointing"), Some("300"));
}
