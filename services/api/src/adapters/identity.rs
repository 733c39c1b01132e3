//! services/api/src/adapters/identity.rs
//!
//! Adapter for the Google identity provider. Implements `IdentityProvider` by
//! asking Google's tokeninfo endpoint to validate an ID token.

use async_trait::async_trait;
use narat_core::domain::VerifiedIdentity;
use narat_core::ports::{IdentityProvider, PortError, PortResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Clone)]
pub struct GoogleIdentityAdapter {
    client: Client,
    tokeninfo_url: String,
    client_id: String,
}

impl GoogleIdentityAdapter {
    pub fn new(
        tokeninfo_url: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            tokeninfo_url: tokeninfo_url.into(),
            client_id: client_id.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityAdapter {
    async fn verify_token(&self, token: &str) -> PortResult<VerifiedIdentity> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("identity provider unreachable: {}", e)))?;

        // Google answers 400 for expired or forged tokens.
        if response.status().is_client_error() {
            return Err(PortError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "identity provider returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("malformed tokeninfo response: {}", e)))?;

        if info.aud.as_deref() != Some(self.client_id.as_str()) {
            warn!(aud = ?info.aud, "ID token issued for another client");
            return Err(PortError::Unauthorized);
        }

        match (info.email, info.name) {
            (Some(email), Some(name)) if !email.is_empty() && !name.is_empty() => {
                Ok(VerifiedIdentity { email, name })
            }
            _ => Err(PortError::NotFound(
                "email or name claim missing from ID token".to_string(),
            )),
        }
    }
}
