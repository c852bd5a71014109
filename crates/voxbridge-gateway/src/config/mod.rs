//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use voxbridge_core::error::{Result, VoxError};

pub use schema::{
    BillingSection, CarrierSection, GatewayConfig, GatewaySection, LlmSection, StoreBackend,
    StoreSection, SttSection, TtsSection,
};

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| VoxError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig =
        serde_yaml::from_str(s).map_err(|e| VoxError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
