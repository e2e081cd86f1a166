//! HTTP client for the research workflow webhooks.
//!
//! Two seams: [`ResultFetcher`] reads a user's research records and
//! [`SubmissionGateway`] posts new requests. [`ResearchClient`] implements both
//! over `reqwest`.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::FetchError;
use crate::types::{ResearchRequestPayload, ResearchResult, ResultsQuery};

/// Reads the current research records for a user.
#[async_trait]
pub trait ResultFetcher: Send + Sync {
    /// A failure means "results temporarily unknown", never "no results".
    async fn fetch_results(&self, email: &str) -> Result<Vec<ResearchResult>, FetchError>;
}

/// Posts new research requests.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// `true` on a 2xx response; every other outcome is logged and reported as `false`.
    async fn submit(&self, payload: &ResearchRequestPayload) -> bool;
}

/// Webhook client for the research workflow.
pub struct ResearchClient {
    client: reqwest::Client,
    submit_url: String,
    results_url: String,
}

impl ResearchClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            submit_url: config.submit_url.clone(),
            results_url: config.results_url.clone(),
        })
    }
}

#[async_trait]
impl ResultFetcher for ResearchClient {
    async fn fetch_results(&self, email: &str) -> Result<Vec<ResearchResult>, FetchError> {
        debug!(url = %self.results_url, "fetching research results");
        let query = ResultsQuery {
            email: email.to_string(),
        };
        let resp = self
            .client
            .post(&self.results_url)
            .json(&query)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let results: Vec<ResearchResult> = serde_json::from_slice(&bytes)?;
        debug!(count = results.len(), "fetched research results");
        Ok(results)
    }
}

#[async_trait]
impl SubmissionGateway for ResearchClient {
    async fn submit(&self, payload: &ResearchRequestPayload) -> bool {
        info!(
            url = %self.submit_url,
            research_type = %payload.research_type,
            depth = %payload.depth,
            urgency = %payload.urgency,
            "submitting research request"
        );
        match self.client.post(&self.submit_url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("research request accepted");
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %body, "research request rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "research request failed");
                false
            }
        }
    }
}
