//! Indexer pool module for the Tezos transaction gateway.
//!
//! Wraps one or more configured block-explorer adapters behind a uniform
//! query interface. Each adapter carries a field-mapping descriptor naming
//! which JSON keys hold the operation status and block level and which
//! status string means "applied", so heterogeneous explorers normalize to
//! the same [`OperationStatusSnapshot`]. On adapter failure the pool moves
//! to another randomly-chosen adapter, up to the configured retry count;
//! exhaustion yields a not-found snapshot, which the reconciler treats as
//! inconclusive for this pass rather than as an error.

use async_trait::async_trait;
use gateway_config::IndexerPoolConfig;
use gateway_types::OperationStatusSnapshot;
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
}

/// Errors that can occur during indexer operations.
#[derive(Debug, Error)]
pub enum IndexerError {
	/// Error that occurs during network communication with an indexer.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when the indexer does not know the operation.
	#[error("Operation {0} not found")]
	OperationNotFound(String),
	/// Error that occurs when an indexer response cannot be normalized
	/// through its field mapping.
	#[error("Unexpected response shape: {0}")]
	Malformed(String),
	/// Error that occurs when no configured indexer is reachable.
	#[error("No configured indexer is reachable")]
	AllUnreachable,
	/// Error that occurs when an adapter does not support the requested
	/// query.
	#[error("Indexer '{0}' does not support this query")]
	Unsupported(String),
}

/// One call made against a contract, as reported by an indexer.
#[derive(Debug, Clone)]
pub struct ContractOperation {
	/// The operation hash.
	pub operation_hash: Option<String>,
	/// The entrypoint invoked.
	pub entry_point: Option<String>,
	/// Inclusion block level.
	pub block_level: Option<u64>,
	/// Raw status string as reported.
	pub status: Option<String>,
}

/// Filter for contract-call listings.
#[derive(Debug, Clone, Default)]
pub struct ContractOperationFilter {
	/// Restrict to calls of this entrypoint.
	pub entry_point: Option<String>,
	/// Page size; adapters apply their own default when absent.
	pub limit: Option<usize>,
	/// Page offset.
	pub offset: Option<usize>,
}

/// Trait defining the interface to one indexer adapter.
#[async_trait]
pub trait IndexerApi: Send + Sync {
	/// Short name of this indexer, used in logs.
	fn name(&self) -> &str;

	/// Cheap reachability probe used at startup.
	async fn health(&self) -> Result<(), IndexerError>;

	/// Looks up one operation and normalizes the answer. Returns
	/// `OperationNotFound` when the indexer definitively does not know
	/// the hash.
	async fn get_operation(&self, operation_hash: &str)
		-> Result<OperationStatusSnapshot, IndexerError>;

	/// Lists calls made against a contract.
	async fn get_contract_operations(
		&self,
		contract_address: &str,
		filter: &ContractOperationFilter,
	) -> Result<Vec<ContractOperation>, IndexerError>;
}

/// Pool of indexer adapters with random selection and retry fallback.
///
/// Holds no mutable state beyond its configuration; safe for concurrent
/// use from multiple workers.
pub struct IndexerPool {
	adapters: Vec<Arc<dyn IndexerApi>>,
	nb_of_retry: u32,
}

impl IndexerPool {
	/// Creates a pool over the given adapters.
	pub fn new(adapters: Vec<Arc<dyn IndexerApi>>, nb_of_retry: u32) -> Self {
		Self {
			adapters,
			nb_of_retry,
		}
	}

	/// Builds a pool of HTTP adapters from configuration.
	pub fn from_config(config: &IndexerPoolConfig) -> Result<Self, IndexerError> {
		let adapters = config
			.endpoints
			.iter()
			.map(|endpoint| {
				implementations::http::HttpIndexerClient::new(endpoint)
					.map(|client| Arc::new(client) as Arc<dyn IndexerApi>)
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self::new(adapters, config.nb_of_retry))
	}

	/// Validates reachability of the configured adapters. Individual
	/// unreachable adapters are logged and tolerated; a pool with no
	/// reachable adapter refuses to start.
	pub async fn initialize(&self) -> Result<(), IndexerError> {
		let mut reachable = 0usize;
		for adapter in &self.adapters {
			match adapter.health().await {
				Ok(()) => reachable += 1,
				Err(err) => {
					tracing::warn!(indexer = adapter.name(), error = %err, "Indexer unreachable at startup");
				},
			}
		}

		if reachable == 0 {
			return Err(IndexerError::AllUnreachable);
		}
		tracing::info!(
			reachable,
			configured = self.adapters.len(),
			"Indexer pool initialized"
		);
		Ok(())
	}

	fn pick_random(&self) -> &Arc<dyn IndexerApi> {
		let index = rand::thread_rng().gen_range(0..self.adapters.len());
		&self.adapters[index]
	}

	/// Queries one operation hash, falling back across adapters.
	///
	/// A definitive not-found answer from a reachable adapter and retry
	/// exhaustion both normalize to a not-found snapshot; the caller
	/// cannot distinguish them and must not treat either as an error.
	pub async fn query_operation(&self, operation_hash: &str) -> OperationStatusSnapshot {
		for _ in 0..self.nb_of_retry {
			let adapter = self.pick_random();
			match adapter.get_operation(operation_hash).await {
				Ok(snapshot) => {
					tracing::debug!(
						indexer = adapter.name(),
						operation_hash,
						applied = snapshot.applied,
						"Indexer resolved operation"
					);
					return snapshot;
				},
				Err(IndexerError::OperationNotFound(_)) => {
					return OperationStatusSnapshot::not_found();
				},
				Err(err) => {
					tracing::warn!(
						indexer = adapter.name(),
						operation_hash,
						error = %err,
						"Indexer query failed, trying another adapter"
					);
				},
			}
		}

		OperationStatusSnapshot::not_found()
	}

	/// Lists calls made against a contract, falling back across adapters.
	/// This is the external read path; the reconciliation loop never uses
	/// it.
	pub async fn query_operations_by_contract(
		&self,
		contract_address: &str,
		filter: &ContractOperationFilter,
	) -> Result<Vec<ContractOperation>, IndexerError> {
		let mut last_err = IndexerError::AllUnreachable;
		for _ in 0..self.nb_of_retry {
			let adapter = self.pick_random();
			match adapter
				.get_contract_operations(contract_address, filter)
				.await
			{
				Ok(operations) => return Ok(operations),
				Err(err) => {
					tracing::warn!(
						indexer = adapter.name(),
						contract_address,
						error = %err,
						"Contract query failed, trying another adapter"
					);
					last_err = err;
				},
			}
		}
		Err(last_err)
	}
}
