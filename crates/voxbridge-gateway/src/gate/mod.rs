//! Access gate: may this call consume AI resources?
//!
//! Runs exactly once per call, between tenant load and STT connect. Policy:
//! an active external subscription always admits; otherwise the minute
//! ledger decides. Paid plans are never blocked (overage is billed, not
//! refused). Any lookup failure admits the call: losing a real caller is
//! worse than an un-billed minute.

use crate::store::SubscriptionLookup;
use crate::tenant::Tenant;

/// Decision from gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow { reason: AllowReason },
    Deny { reason: DenyReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    ActiveSubscription,
    TrialMinutesActive,
    PaidPlan,
    /// Tenant has no minute-tracking record.
    Unmetered,
    /// A lookup failed; the call is admitted anyway.
    FailOpen,
}

impl AllowReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AllowReason::ActiveSubscription => "active_subscription",
            AllowReason::TrialMinutesActive => "trial_minutes_active",
            AllowReason::PaidPlan => "paid_plan",
            AllowReason::Unmetered => "unmetered",
            AllowReason::FailOpen => "fail_open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    TrialMinutesExhausted,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::TrialMinutesExhausted => "trial_minutes_exhausted",
        }
    }

    /// Tenant-specific rejection read to the caller before hangup.
    pub fn spoken_text(self, tenant: &Tenant) -> String {
        match self {
            DenyReason::TrialMinutesExhausted => format!(
                "Thank you for calling {}. This line's free trial minutes have been used up, \
                 so I can't take the call right now. Please reach out to {} by email, or try \
                 again once the account has been upgraded. Goodbye.",
                tenant.business_name, tenant.contact_email
            ),
        }
    }
}

/// Evaluate the admission predicate for one call.
pub async fn admit(subs: &dyn SubscriptionLookup, tenant: &Tenant) -> GateDecision {
    match subs.has_active_subscription(&tenant.id).await {
        Ok(true) => {
            return GateDecision::Allow {
                reason: AllowReason::ActiveSubscription,
            }
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(tenant = %tenant.id, err = %e, "subscription lookup failed; failing open");
            return GateDecision::Allow {
                reason: AllowReason::FailOpen,
            };
        }
    }

    let Some(ledger) = tenant.ledger else {
        return GateDecision::Allow {
            reason: AllowReason::Unmetered,
        };
    };

    if ledger.paid_plan {
        let overage = ledger.paid_minutes_used.saturating_sub(ledger.paid_minutes_included);
        if overage > 0 {
            tracing::info!(tenant = %tenant.id, overage, "paid plan over included minutes");
        }
        return GateDecision::Allow {
            reason: AllowReason::PaidPlan,
        };
    }

    if ledger.trial_minutes_used >= ledger.trial_minutes {
        GateDecision::Deny {
            reason: DenyReason::TrialMinutesExhausted,
        }
    } else {
        GateDecision::Allow {
            reason: AllowReason::TrialMinutesActive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SubscriptionLookup;
    use crate::tenant::MinuteLedger;
    use async_trait::async_trait;
    use voxbridge_core::error::{Result, VoxError};

    struct Subs(Result<bool>);

    #[async_trait]
    impl SubscriptionLookup for Subs {
        async fn has_active_subscription(&self, _tenant_id: &str) -> Result<bool> {
            match &self.0 {
                Ok(b) => Ok(*b),
                Err(_) => Err(VoxError::Internal("lookup down".into())),
            }
        }
    }

    fn tenant(ledger: Option<MinuteLedger>) -> Tenant {
        Tenant {
            id: "acme".into(),
            business_name: "Acme Dental".into(),
            industry: None,
            region: None,
            timezone: "UTC".into(),
            business_hours: Default::default(),
            voice_id: None,
            system_prompt: None,
            call_transfer_enabled: false,
            call_transfer_number: None,
            contact_email: "desk@acme.test".into(),
            services: vec![],
            pricing: None,
            tone: None,
            greeting: None,
            billing_customer_id: None,
            ledger,
        }
    }

    fn trial(total: u32, used: u32) -> MinuteLedger {
        MinuteLedger {
            trial_minutes: total,
            trial_minutes_used: used,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn active_subscription_admits_before_ledger() {
        let t = tenant(Some(trial(30, 30)));
        let d = admit(&Subs(Ok(true)), &t).await;
        assert_eq!(
            d,
            GateDecision::Allow {
                reason: AllowReason::ActiveSubscription
            }
        );
    }

    #[tokio::test]
    async fn exhausted_trial_is_denied() {
        let t = tenant(Some(trial(30, 30)));
        let d = admit(&Subs(Ok(false)), &t).await;
        assert_eq!(
            d,
            GateDecision::Deny {
                reason: DenyReason::TrialMinutesExhausted
            }
        );
    }

    #[tokio::test]
    async fn remaining_trial_minutes_admit() {
        let t = tenant(Some(trial(10, 0)));
        let d = admit(&Subs(Ok(false)), &t).await;
        assert_eq!(
            d,
            GateDecision::Allow {
                reason: AllowReason::TrialMinutesActive
            }
        );
    }

    #[tokio::test]
    async fn paid_plan_admits_even_over_included() {
        let t = tenant(Some(MinuteLedger {
            paid_plan: true,
            paid_minutes_included: 100,
            paid_minutes_used: 250,
            ..Default::default()
        }));
        let d = admit(&Subs(Ok(false)), &t).await;
        assert_eq!(
            d,
            GateDecision::Allow {
                reason: AllowReason::PaidPlan
            }
        );
    }

    #[tokio::test]
    async fn lookup_failure_fails_open() {
        let t = tenant(Some(trial(30, 30)));
        let d = admit(&Subs(Err(VoxError::Internal("x".into()))), &t).await;
        assert_eq!(
            d,
            GateDecision::Allow {
                reason: AllowReason::FailOpen
            }
        );
    }

    #[tokio::test]
    async fn unmetered_tenant_admits() {
        let t = tenant(None);
        let d = admit(&Subs(Ok(false)), &t).await;
        assert_eq!(
            d,
            GateDecision::Allow {
                reason: AllowReason::Unmetered
            }
        );
    }

    #[test]
    fn rejection_text_names_the_business_and_email() {
        let t = tenant(None);
        let text = DenyReason::TrialMinutesExhausted.spoken_text(&t);
        assert!(text.contains("Acme Dental"));
        assert!(text.contains("desk@acme.test"));
    }
}
