//! Top-level facade crate for voxbridge.
//!
//! Re-exports the core types and the gateway library so users can depend on
//! a single crate.

pub mod core {
    pub use voxbridge_core::*;
}

pub mod gateway {
    pub use voxbridge_gateway::*;
}
