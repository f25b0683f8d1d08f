//! HTTP client for the Tezos node RPC interface.

use crate::{BlockHeader, NodeError, NodeRpc};
use async_trait::async_trait;
use gateway_config::NodeEndpointConfig;
use gateway_types::TransactionEntry;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Default fee in mutez applied when an entry carries no override.
const DEFAULT_FEE: u64 = 1420;
/// Gas limit attached to forged contents.
const DEFAULT_GAS_LIMIT: u64 = 10600;
/// Storage limit attached to forged contents.
const DEFAULT_STORAGE_LIMIT: u64 = 300;

/// HTTP-backed implementation of [`NodeRpc`].
pub struct HttpNodeClient {
	name: String,
	base_url: String,
	supports_eviction: bool,
	client: reqwest::Client,
}

/// Head-header response shape; only the fields the pool needs.
#[derive(Debug, Deserialize)]
struct HeaderResponse {
	hash: String,
	level: u64,
}

impl HttpNodeClient {
	/// Creates a client for one configured endpoint with a per-request
	/// timeout.
	pub fn new(endpoint: &NodeEndpointConfig, request_timeout: Duration) -> Result<Self, NodeError> {
		let client = reqwest::Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| NodeError::Network(e.to_string()))?;

		Ok(Self {
			name: endpoint.name.clone(),
			base_url: endpoint.url.trim_end_matches('/').to_string(),
			supports_eviction: endpoint.supports_eviction,
			client,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	/// Sends a request and maps non-success statuses to an RPC error
	/// carrying the node's reason verbatim.
	async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, NodeError> {
		if response.status().is_success() {
			return Ok(response);
		}
		let status = response.status();
		let body = response.text().await.unwrap_or_default();
		Err(NodeError::Rpc(format!("{}: {}", status, body.trim())))
	}

	/// Builds the forge request contents for a batch.
	fn forge_contents(source: &str, entries: &[TransactionEntry]) -> Vec<serde_json::Value> {
		entries
			.iter()
			.map(|entry| {
				let mut content = json!({
					"kind": "transaction",
					"source": source,
					"destination": entry.contract_address,
					"amount": entry.amount.unwrap_or(0).to_string(),
					"fee": entry.fee.unwrap_or(DEFAULT_FEE).to_string(),
					"gas_limit": DEFAULT_GAS_LIMIT.to_string(),
					"storage_limit": DEFAULT_STORAGE_LIMIT.to_string(),
				});
				if !entry.entry_point.is_empty() {
					content["parameters"] = json!({
						"entrypoint": entry.entry_point,
						"value": entry
							.entry_point_params
							.clone()
							.unwrap_or_else(|| json!({"prim": "Unit"})),
					});
				}
				content
			})
			.collect()
	}
}

#[async_trait]
impl NodeRpc for HttpNodeClient {
	fn name(&self) -> &str {
		&self.name
	}

	fn supports_eviction(&self) -> bool {
		self.supports_eviction
	}

	async fn head_header(&self) -> Result<BlockHeader, NodeError> {
		let response = self
			.client
			.get(self.url("/chains/main/blocks/head/header"))
			.send()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		let header: HeaderResponse = Self::expect_success(response)
			.await?
			.json()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		Ok(BlockHeader {
			hash: header.hash,
			level: header.level,
		})
	}

	async fn forge_operations(
		&self,
		source: &str,
		entries: &[TransactionEntry],
	) -> Result<String, NodeError> {
		// The forge helper needs a recent branch to anchor the operation
		let branch = self.head_header().await?.hash;

		let body = json!({
			"branch": branch,
			"contents": Self::forge_contents(source, entries),
		});

		let response = self
			.client
			.post(self.url("/chains/main/blocks/head/helpers/forge/operations"))
			.json(&body)
			.send()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		let forged: String = Self::expect_success(response)
			.await?
			.json()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		Ok(forged)
	}

	async fn inject_operation(&self, signed_hex: &str) -> Result<String, NodeError> {
		let response = self
			.client
			.post(self.url("/injection/operation"))
			.json(&signed_hex)
			.send()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		let operation_hash: String = Self::expect_success(response)
			.await?
			.json()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		Ok(operation_hash)
	}

	async fn ban_operation(&self, operation_hash: &str) -> Result<(), NodeError> {
		let response = self
			.client
			.post(self.url("/chains/main/mempool/ban_operation"))
			.json(&operation_hash)
			.send()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		Self::expect_success(response).await?;
		Ok(())
	}
}
