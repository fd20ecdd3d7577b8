//! Roster fetcher: pulls the list of current occupants from the property-management service.

use crate::config::Target;
use crate::error::FetchError;
use crate::types::Occupant;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Source of the current occupancy roster for a target.
#[async_trait]
pub trait RosterFetcher: Send + Sync {
    async fn fetch_roster(&self, target: &Target) -> Result<Vec<Occupant>, FetchError>;
}

/// Fetches the roster over HTTP as a JSON array.
#[derive(Debug, Clone)]
pub struct HttpRosterFetcher {
    /// HTTP client shared by all targets
    client: reqwest::Client,
    /// Per-request timeout
    timeout: Duration,
}

impl HttpRosterFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Base URL of the roster endpoint; `http://` is assumed when no scheme is given.
    fn roster_url(address: &str) -> Result<String, FetchError> {
        let address = address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(FetchError::InvalidAddress(address.to_string()));
        }

        if address.contains("://") {
            Ok(format!("{}/", address))
        } else {
            Ok(format!("http://{}/", address))
        }
    }
}

#[async_trait]
impl RosterFetcher for HttpRosterFetcher {
    async fn fetch_roster(&self, target: &Target) -> Result<Vec<Occupant>, FetchError> {
        let url = Self::roster_url(&target.roster_address)?;
        debug!(target_name = %target.display_name(), %url, profile = %target.roster_profile, "Fetching roster");

        let response = self
            .client
            .get(&url)
            .query(&[("name", target.roster_profile.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    FetchError::Request(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        response.json::<Vec<Occupant>>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                FetchError::Decode(e)
            }
        })
    }
}
