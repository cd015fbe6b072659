use std::time::Duration;

use reqwest::{StatusCode, header};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::PublishError;
use crate::resolver::ImageRecord;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Retry limits for a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    pub max_attempts: u32,
    /// Wait between attempts. There is no wait before the first one.
    pub retry_delay: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Terminal state of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The catalog accepted the record.
    Submitted { attempts: u32 },
    /// The catalog refused the record with a non-retryable status.
    Rejected { attempts: u32, status: StatusCode },
    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: u32 },
    /// The record could not be encoded, nothing was sent.
    Unserializable,
}

impl PublishOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PublishOutcome::Submitted { attempts }
            | PublishOutcome::Rejected { attempts, .. }
            | PublishOutcome::Exhausted { attempts } => *attempts,
            PublishOutcome::Unserializable => 0,
        }
    }
}

/// Registers image records with the catalog service.
#[derive(Debug, Clone)]
pub struct Publisher {
    url: Url,
    policy: PublishPolicy,
}

impl Publisher {
    pub fn new(url: Url, policy: PublishPolicy) -> Self {
        Self { url, policy }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn policy(&self) -> &PublishPolicy {
        &self.policy
    }

    /// PUTs `record` to the catalog, retrying transport failures and
    /// server errors until the attempt budget is spent.
    pub async fn publish(&self, record: &ImageRecord) -> PublishOutcome {
        let body = match serde_json::to_vec(record) {
            Ok(body) => body,
            Err(e) => {
                error!(
                    "error submitting {:?} image: {}",
                    record.repository,
                    PublishError::from(e)
                );
                return PublishOutcome::Unserializable;
            }
        };

        let mut attempts = 0;
        while attempts < self.policy.max_attempts {
            if attempts != 0 {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
            attempts += 1;

            match self.put(body.clone()).await {
                Ok(()) => {
                    info!("submitted {:?}", record);
                    return PublishOutcome::Submitted { attempts };
                }
                Err(PublishError::Client(status)) => {
                    error!(
                        "error submitting {:?} image: {}",
                        record.repository,
                        PublishError::Client(status)
                    );
                    return PublishOutcome::Rejected { attempts, status };
                }
                Err(e) => {
                    warn!(
                        "error submitting {:?} image (attempt {}/{}): {}",
                        record.repository, attempts, self.policy.max_attempts, e
                    );
                }
            }
        }

        error!(
            "error submitting {:?} image: max retries reached",
            record.repository
        );
        PublishOutcome::Exhausted { attempts }
    }

    /// Performs one attempt. The response body is drained and the
    /// connection released before this returns.
    async fn put(&self, body: Vec<u8>) -> Result<(), PublishError> {
        let client = reqwest::Client::new();
        let response = client
            .put(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        // the status is already known, a failed drain only costs the
        // pooled connection
        if let Err(e) = response.bytes().await {
            debug!("failed to drain catalog response: {}", e);
        }

        match status {
            StatusCode::OK => Ok(()),
            StatusCode::INTERNAL_SERVER_ERROR => Err(PublishError::Server(status)),
            _ => Err(PublishError::Client(status)),
        }
    }
}
