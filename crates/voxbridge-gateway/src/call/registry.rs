//! Live-call registry.
//!
//! Exactly one in-memory session per call id: a second upgrade for a live
//! call is rejected at the door. Entries are removed on finalise.

use std::time::Instant;

use dashmap::DashMap;

#[derive(Default)]
pub struct CallRegistry {
    calls: DashMap<String, Instant>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a call id. `false` means a session is already bound to it.
    pub fn try_claim(&self, call_sid: &str) -> bool {
        match self.calls.entry(call_sid.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Instant::now());
                true
            }
        }
    }

    pub fn release(&self, call_sid: &str) {
        self.calls.remove(call_sid);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_claim_is_rejected_until_release() {
        let reg = CallRegistry::new();
        assert!(reg.try_claim("CA1"));
        assert!(!reg.try_claim("CA1"));
        reg.release("CA1");
        assert!(reg.try_claim("CA1"));
    }
}
