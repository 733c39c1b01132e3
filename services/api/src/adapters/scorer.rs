//! services/api/src/adapters/scorer.rs
//!
//! This module contains the adapter for the external recommendation scorer.
//! It implements the `RecommendationScorer` port from the `core` crate over HTTP.

use async_trait::async_trait;
use narat_core::domain::{QuestionId, RecommendationStrategy};
use narat_core::ports::{PortError, PortResult, RecommendationScorer};
use narat_core::scorer::{ScorerRequest, ScorerResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that posts feature records to the scorer service.
///
/// Makes exactly one attempt per call; retrying is left to the caller.
#[derive(Clone)]
pub struct HttpScorerAdapter {
    client: Client,
    base_url: String,
}

impl HttpScorerAdapter {
    /// Creates a new `HttpScorerAdapter` whose requests time out after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, strategy: RecommendationStrategy) -> String {
        format!("{}/api/recommendation/{}", self.base_url, strategy.as_str())
    }
}

//=========================================================================================
// `RecommendationScorer` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecommendationScorer for HttpScorerAdapter {
    async fn recommend(&self, request: &ScorerRequest) -> PortResult<Vec<QuestionId>> {
        let url = self.endpoint(request.strategy());
        debug!(url = %url, items = request.len(), "Posting to scorer");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PortError::Upstream(format!("scorer timed out: {}", e))
                } else {
                    PortError::Upstream(format!("scorer unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, %status, "Scorer returned an error status");
            return Err(PortError::Upstream(format!(
                "scorer returned {}: {}",
                status, body
            )));
        }

        let parsed: ScorerResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("malformed scorer response: {}", e)))?;
        parsed.into_items()
    }
}
