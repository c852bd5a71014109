#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use voxbridge_gateway::config::{self, StoreBackend};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
gateway:
  listen: "0.0.0.0:8080"
  start_timout_secs: 5 # typo should fail
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("invalid yaml"));
}

#[test]
fn ok_minimal_config_with_defaults() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.gateway.listen, "0.0.0.0:8080");
    assert_eq!(cfg.gateway.start_timeout_secs, 10);
    assert_eq!(cfg.gateway.deny_playback_secs, 10);
    assert_eq!(cfg.gateway.peer_timeout_secs, 30);
    assert_eq!(cfg.llm.max_tokens, 150);
    assert_eq!(cfg.store.backend, StoreBackend::Memory);
}

#[test]
fn rest_backend_requires_url() {
    let bad = r#"
version: 1
store:
  backend: rest
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn tenant_seeds_parse() {
    let ok = r#"
version: 1
tenants:
  - id: "acme"
    business_name: "Acme Dental"
    contact_email: "desk@acme.test"
    timezone: "America/New_York"
    greeting: "Thanks for calling Acme."
    call_transfer_enabled: true
    call_transfer_number: "+15550002222"
    business_hours:
      monday: { open: "09:00", close: "17:00" }
      sunday: { closed: true }
    ledger:
      trial_minutes: 30
      trial_minutes_used: 3
voices:
  - id: "v1"
    display_name: "Ava"
    accent: "US"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.tenants.len(), 1);
    let t = &cfg.tenants[0];
    assert_eq!(t.id, "acme");
    assert!(t.call_transfer_enabled);
    assert_eq!(t.ledger.unwrap().trial_minutes, 30);
    assert_eq!(cfg.voices[0].display_name, "Ava");
}
