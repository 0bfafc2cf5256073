//! A [`LedgerClient`] backed by a ledger indexer's REST API.
//!
//! The indexer is expected to answer `GET {base}/transfers/incoming/{target}` with
//!
//! ```json
//! { "transfers": [ { "sender": "0x1234...", "amount": "25000000", "txid": "0xabcd..." } ] }
//! ```
//!
//! `amount` is in the ledger's smallest unit and may be a JSON string or number.
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokenswap_engine::{
    db_types::LedgerTransfer,
    reconciler::{LedgerClient, LedgerError},
};
use tsw_common::Secret;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Deserialize)]
struct IncomingTransfers {
    transfers: Vec<TransferRecord>,
}

#[derive(Debug, Deserialize)]
struct TransferRecord {
    sender: String,
    amount: RawAmount,
    txid: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(u64),
    Text(String),
}

impl RawAmount {
    fn units(&self) -> Result<u128, LedgerError> {
        match self {
            Self::Number(n) => Ok(u128::from(*n)),
            Self::Text(s) => s
                .trim()
                .parse::<u128>()
                .map_err(|e| LedgerError::InvalidResponse(format!("'{s}' is not a valid amount. {e}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, api_key: Secret<String>) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("Could not build the HTTP client. {e}")))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    fn url_for(&self, target_address: &str) -> String {
        format!("{}/transfers/incoming/{target_address}", self.base_url)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn list_recent_incoming_transfers(&self, target_address: &str) -> Result<Vec<LedgerTransfer>, LedgerError> {
        let url = self.url_for(target_address);
        trace!("📒️ GET {url}");
        let mut request = self.client.get(&url);
        if !self.api_key.reveal().is_empty() {
            request = request.header(API_KEY_HEADER, self.api_key.reveal());
        }
        let response = request.send().await.map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::OK => {},
            status if status.is_server_error() => {
                return Err(LedgerError::Unavailable(format!("{url} returned {status}")));
            },
            status => return Err(LedgerError::InvalidResponse(format!("{url} returned {status}"))),
        }
        let body = response.text().await.map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        parse_transfers(&body)
    }
}

fn parse_transfers(body: &str) -> Result<Vec<LedgerTransfer>, LedgerError> {
    let response: IncomingTransfers =
        serde_json::from_str(body).map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
    response
        .transfers
        .into_iter()
        .map(|t| Ok(LedgerTransfer::new(t.sender, t.amount.units()?, t.txid)))
        .collect()
}
