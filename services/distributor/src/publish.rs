use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::GithubSyncConfig;
use crate::error::PublishError;
use crate::state::StatisticsLedger;

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("brotherhood-distributor/", env!("CARGO_PKG_VERSION"));

/// Pushes a copy of the ledger somewhere public after each local save.
#[async_trait]
pub trait LedgerPublisher: Send + Sync {
    async fn publish(&self, ledger: &StatisticsLedger) -> Result<(), PublishError>;
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
}

/// Commits the ledger to a GitHub repository through the contents API.
pub struct GithubPublisher {
    client: reqwest::Client,
    config: GithubSyncConfig,
}

impl GithubPublisher {
    pub fn new(config: GithubSyncConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            GITHUB_API,
            self.config.repo,
            self.config.path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    /// Blob sha of the current file, required by the API to overwrite it.
    async fn current_sha(&self, url: &str) -> Result<Option<String>, PublishError> {
        let resp = self
            .request(reqwest::Method::GET, url)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        let entry: ContentsEntry = resp.json().await?;
        Ok(Some(entry.sha))
    }
}

async fn rejected(resp: reqwest::Response) -> PublishError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    PublishError::Rejected { status, body }
}

/// Request body for a contents API upsert.
fn upload_body(
    ledger: &StatisticsLedger,
    branch: &str,
    sha: Option<String>,
) -> Result<serde_json::Value, PublishError> {
    let content = serde_json::to_vec_pretty(ledger)?;
    let mut body = json!({
        "message": format!("Update distribution stats (cycle {})", ledger.total_cycles),
        "content": BASE64.encode(content),
        "branch": branch,
    });
    if let Some(sha) = sha {
        body["sha"] = json!(sha);
    }
    Ok(body)
}

#[async_trait]
impl LedgerPublisher for GithubPublisher {
    async fn publish(&self, ledger: &StatisticsLedger) -> Result<(), PublishError> {
        let url = self.contents_url();
        let sha = self.current_sha(&url).await?;
        let body = upload_body(ledger, &self.config.branch, sha)?;

        let resp = self.request(reqwest::Method::PUT, &url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        debug!(repo = %self.config.repo, path = %self.config.path, "stats pushed to github");
        Ok(())
    }
}
