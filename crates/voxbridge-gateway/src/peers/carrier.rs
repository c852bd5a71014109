//! Carrier telephony control API (out-of-band call redirect).

use async_trait::async_trait;

use voxbridge_core::error::{Peer, Result, VoxError};

use crate::config::CarrierSection;

/// Transfer seam. `conversation` is the flattened history handed to whoever
/// picks up; the carrier tears the media stream down once the redirect takes
/// effect, which finalises the session.
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn transfer(&self, call_sid: &str, number: &str, conversation: &str) -> Result<()>;
}

pub struct TwilioControl {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioControl {
    pub fn new(cfg: &CarrierSection, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VoxError::Config(format!("carrier client build failed: {e}")))?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            account_sid: cfg.account_sid.clone(),
            auth_token: cfg.auth_token.clone(),
        })
    }
}

/// The one transfer TwiML shape this service emits.
fn dial_twiml(number: &str) -> String {
    let number = xml_escape(number);
    format!(r#"<Response><Dial timeout="30" callerId="{number}">{number}</Dial></Response>"#)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

#[async_trait]
impl CallControl for TwilioControl {
    async fn transfer(&self, call_sid: &str, number: &str, conversation: &str) -> Result<()> {
        tracing::info!(
            call = %call_sid,
            number = %number,
            transcript_len = conversation.len(),
            "redirecting live call to human"
        );

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls/{call_sid}.json",
            self.api_base, self.account_sid
        );
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Twiml", dial_twiml(number))])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoxError::PeerTimeout(Peer::Carrier)
                } else {
                    VoxError::peer(Peer::Carrier, e)
                }
            })?;
        if !resp.status().is_success() {
            return Err(VoxError::peer(Peer::Carrier, resp.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiml_has_the_single_prescribed_shape() {
        assert_eq!(
            dial_twiml("+15550001111"),
            r#"<Response><Dial timeout="30" callerId="+15550001111">+15550001111</Dial></Response>"#
        );
    }
}
