use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use brotherhood_common::Holder;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::chain::HolderSource;
use crate::error::DistributorError;

const PAGE_LIMIT: usize = 1000;
// 100k token accounts. A pool still paging past this is refused, not truncated.
const MAX_PAGES: u32 = 100;
const DEFAULT_DECIMALS: u32 = 9;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<TokenAccountsPage>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenAccountsPage {
    #[serde(default)]
    token_accounts: Vec<TokenAccount>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenAccount {
    owner: String,
    amount: RawAmount,
    decimals: Option<u32>,
}

/// Helius reports raw amounts as JSON numbers, some proxies as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(u64),
    Text(String),
}

impl TokenAccount {
    fn ui_amount(&self) -> f64 {
        let raw = match &self.amount {
            RawAmount::Number(n) => *n as f64,
            RawAmount::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        };
        raw / 10f64.powi(self.decimals.unwrap_or(DEFAULT_DECIMALS) as i32)
    }
}

fn unavailable(reason: impl ToString) -> DistributorError {
    DistributorError::SnapshotUnavailable {
        reason: reason.to_string(),
    }
}

fn parse_page(envelope: RpcEnvelope) -> Result<Vec<TokenAccount>, DistributorError> {
    if let Some(err) = envelope.error {
        return Err(unavailable(format!(
            "getTokenAccounts error {}: {}",
            err.code, err.message
        )));
    }
    envelope
        .result
        .map(|page| page.token_accounts)
        .ok_or_else(|| unavailable("getTokenAccounts returned neither result nor error"))
}

/// Sum token accounts per owner wallet, dropping empty balances.
fn aggregate_holders(accounts: &[TokenAccount]) -> Vec<Holder> {
    let mut by_owner: BTreeMap<&str, f64> = BTreeMap::new();
    for account in accounts {
        *by_owner.entry(account.owner.as_str()).or_insert(0.0) += account.ui_amount();
    }
    by_owner
        .into_iter()
        .filter(|(_, balance)| *balance > 0.0)
        .map(|(owner, balance)| Holder::new(owner, balance))
        .collect()
}

/// Holder snapshots via the Helius DAS `getTokenAccounts` method.
pub struct HeliusHolderSource {
    client: reqwest::Client,
    rpc_url: String,
}

impl HeliusHolderSource {
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, DistributorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DistributorError::config("HELIUS_RPC_URL", e.to_string()))?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }

    async fn fetch_page(
        &self,
        mint: &str,
        page: u32,
    ) -> Result<Vec<TokenAccount>, DistributorError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": "holder-snapshot",
            "method": "getTokenAccounts",
            "params": {
                "mint": mint,
                "page": page,
                "limit": PAGE_LIMIT,
                "displayOptions": { "showZeroBalance": false },
            },
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {} - {}", status, body)));
        }

        let envelope: RpcEnvelope = resp.json().await.map_err(unavailable)?;
        parse_page(envelope)
    }
}

/// Fetch pages until a short one arrives. A full final page means the pool
/// was cut off, which is an error rather than a partial snapshot.
async fn collect_pages<F, Fut>(
    max_pages: u32,
    page_limit: usize,
    mut fetch: F,
) -> Result<Vec<TokenAccount>, DistributorError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<TokenAccount>, DistributorError>>,
{
    let mut accounts = Vec::new();
    for page in 1..=max_pages {
        let batch = fetch(page).await?;
        debug!(page, accounts = batch.len(), "fetched token account page");
        let last = batch.len() < page_limit;
        accounts.extend(batch);
        if last {
            return Ok(accounts);
        }
    }
    Err(unavailable(format!(
        "holder index still returning full pages after {} pages ({} accounts)",
        max_pages,
        accounts.len()
    )))
}

#[async_trait]
impl HolderSource for HeliusHolderSource {
    async fn snapshot(&self, mint: &str) -> Result<Vec<Holder>, DistributorError> {
        let accounts =
            collect_pages(MAX_PAGES, PAGE_LIMIT, |page| self.fetch_page(mint, page)).await?;

        let holders = aggregate_holders(&accounts);
        info!(
            accounts = accounts.len(),
            holders = holders.len(),
            "holder snapshot fetched"
        );
        Ok(holders)
    }
}
