//! HTTP indexer adapter driven by a field-mapping descriptor.

use crate::{ContractOperation, ContractOperationFilter, IndexerApi, IndexerError};
use async_trait::async_trait;
use gateway_config::{IndexerEndpointConfig, OperationLocator};
use gateway_types::OperationStatusSnapshot;
use std::time::Duration;

/// Timeout applied to each indexer request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-backed implementation of [`IndexerApi`].
///
/// All response interpretation goes through the endpoint's field mapping,
/// so one client type serves tzkt, tzstats, conseil, and anything else
/// with a compatible REST surface.
pub struct HttpIndexerClient {
	config: IndexerEndpointConfig,
	client: reqwest::Client,
}

impl HttpIndexerClient {
	/// Creates an adapter for one configured indexer endpoint.
	pub fn new(config: &IndexerEndpointConfig) -> Result<Self, IndexerError> {
		let client = reqwest::Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| IndexerError::Network(e.to_string()))?;

		Ok(Self {
			config: config.clone(),
			client,
		})
	}

	fn operation_url(&self, operation_hash: &str) -> String {
		format!(
			"{}{}{}",
			self.config.api_url, self.config.path_to_operation, operation_hash
		)
	}
}

/// Normalizes one raw indexer response into a snapshot using the
/// endpoint's field mapping.
///
/// The operation object is located via `key_to_operation` (an array index
/// or an object key, depending on the indexer), its status is read from
/// `key_to_status` and compared against `success_status`, and the block
/// level comes from `key_to_block_level`.
pub fn normalize_operation(
	config: &IndexerEndpointConfig,
	body: &serde_json::Value,
	operation_hash: &str,
) -> Result<OperationStatusSnapshot, IndexerError> {
	let operation = match &config.key_to_operation {
		OperationLocator::Index(index) => body.get(*index),
		OperationLocator::Key(key) => body.get(key.as_str()),
	}
	.ok_or_else(|| IndexerError::OperationNotFound(operation_hash.to_string()))?;

	let status = operation
		.get(&config.key_to_status)
		.and_then(|value| value.as_str())
		.ok_or_else(|| {
			IndexerError::Malformed(format!(
				"missing status key '{}' in response from {}",
				config.key_to_status, config.name
			))
		})?;

	if status != config.success_status {
		let reason = operation
			.get("errors")
			.map(|errors| errors.to_string())
			.or_else(|| {
				operation
					.get("reason")
					.and_then(|value| value.as_str())
					.map(String::from)
			});
		return Ok(OperationStatusSnapshot::failed(status, reason));
	}

	let block_level = operation
		.get(&config.key_to_block_level)
		.and_then(|value| value.as_u64())
		.ok_or_else(|| {
			IndexerError::Malformed(format!(
				"missing block level key '{}' in response from {}",
				config.key_to_block_level, config.name
			))
		})?;

	Ok(OperationStatusSnapshot::applied(status, block_level))
}

#[async_trait]
impl IndexerApi for HttpIndexerClient {
	fn name(&self) -> &str {
		&self.config.name
	}

	async fn health(&self) -> Result<(), IndexerError> {
		// Any HTTP answer counts as reachable; only transport failures
		// mark the adapter down.
		self.client
			.get(&self.config.api_url)
			.send()
			.await
			.map(|_| ())
			.map_err(|e| IndexerError::Network(e.to_string()))
	}

	async fn get_operation(
		&self,
		operation_hash: &str,
	) -> Result<OperationStatusSnapshot, IndexerError> {
		let response = self
			.client
			.get(self.operation_url(operation_hash))
			.send()
			.await
			.map_err(|e| IndexerError::Network(e.to_string()))?;

		if response.status() == reqwest::StatusCode::NOT_FOUND
			|| response.status() == reqwest::StatusCode::BAD_REQUEST
		{
			return Err(IndexerError::OperationNotFound(operation_hash.to_string()));
		}
		if !response.status().is_success() {
			return Err(IndexerError::Network(format!(
				"{} answered {}",
				self.config.name,
				response.status()
			)));
		}

		let body: serde_json::Value = response
			.json()
			.await
			.map_err(|e| IndexerError::Malformed(e.to_string()))?;

		normalize_operation(&self.config, &body, operation_hash)
	}

	async fn get_contract_operations(
		&self,
		contract_address: &str,
		filter: &ContractOperationFilter,
	) -> Result<Vec<ContractOperation>, IndexerError> {
		let path = self
			.config
			.path_to_contract_calls
			.as_ref()
			.ok_or_else(|| IndexerError::Unsupported(self.config.name.clone()))?;

		let mut request = self
			.client
			.get(format!("{}{}", self.config.api_url, path))
			.query(&[("target.eq", contract_address)])
			.query(&[
				("limit", filter.limit.unwrap_or(20).to_string()),
				("offset", filter.offset.unwrap_or(0).to_string()),
			]);
		if let Some(entry_point) = &filter.entry_point {
			request = request.query(&[("entrypoint.eq", entry_point)]);
		}

		let response = request
			.send()
			.await
			.map_err(|e| IndexerError::Network(e.to_string()))?;
		if !response.status().is_success() {
			return Err(IndexerError::Network(format!(
				"{} answered {}",
				self.config.name,
				response.status()
			)));
		}

		let body: Vec<serde_json::Value> = response
			.json()
			.await
			.map_err(|e| IndexerError::Malformed(e.to_string()))?;

		Ok(body
			.into_iter()
			.map(|call| ContractOperation {
				operation_hash: call
					.get("hash")
					.and_then(|value| value.as_str())
					.map(String::from),
				entry_point: call
					.get("parameter")
					.and_then(|parameter| parameter.get("entrypoint"))
					.and_then(|value| value.as_str())
					.map(String::from),
				block_level: call
					.get(&self.config.key_to_block_level)
					.and_then(|value| value.as_u64()),
				status: call
					.get(&self.config.key_to_status)
					.and_then(|value| value.as_str())
					.map(String::from),
			})
			.collect())
	}
}
