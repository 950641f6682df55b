//! The Issue Fetcher: resolves an identifier or query into issue records.
//!
//! `IssueFetcher` is the trait the engine consumes; `UreqFetcher`
//! is one concrete, swappable implementation hitting a generic REST
//! issue-tracker endpoint. A Jira/GitHub/GitLab/Linear-specific fetcher can
//! implement the same trait without touching the engine.

use isync_core::IssueRecord;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("issue not found: {0}")]
    NotFound(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

type Result<T> = std::result::Result<T, FetchError>;

/// Issue Fetcher contract.
pub trait IssueFetcher {
    fn get(&self, identifier: &str) -> Result<IssueRecord>;
    fn search(&self, query: &str) -> Result<Vec<IssueRecord>>;
    fn authenticate(&self) -> Result<()>;
}

/// Reference implementation: a generic REST issue tracker reachable over
/// HTTP, authenticated with a bearer token.
pub struct UreqFetcher {
    base_url: String,
    token: String,
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    fn authed(&self, req: ureq::RequestBuilder<ureq::typestate::WithoutBody>) -> ureq::RequestBuilder<ureq::typestate::WithoutBody> {
        req.header("Authorization", &format!("Bearer {}", self.token))
    }
}

impl IssueFetcher for UreqFetcher {
    fn get(&self, identifier: &str) -> Result<IssueRecord> {
        debug!(identifier, "fetching issue");
        let url = format!("{}/issues/{identifier}", self.base_url);
        let mut response = self
            .authed(self.agent.get(&url))
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(404) => FetchError::NotFound(identifier.to_owned()),
                other => FetchError::Transport(other.to_string()),
            })?;
        response
            .body_mut()
            .read_json::<IssueRecord>()
            .map_err(|e| FetchError::Transport(e.to_string()))
    }

    fn search(&self, query: &str) -> Result<Vec<IssueRecord>> {
        debug!(query, "searching issues");
        let url = format!("{}/search", self.base_url);
        let mut response = self
            .authed(self.agent.get(&url))
            .query("q", query)
            .call()
            .map_err(|e| FetchError::QueryFailed(e.to_string()))?;
        response
            .body_mut()
            .read_json::<Vec<IssueRecord>>()
            .map_err(|e| FetchError::QueryFailed(e.to_string()))
    }

    fn authenticate(&self) -> Result<()> {
        self.authed(self.agent.get(&format!("{}/auth/ping", self.base_url)))
            .call()
            .map_err(|e| FetchError::Authentication(e.to_string()))?;
        debug!("fetcher authentication succeeded");
        Ok(())
    }
}
