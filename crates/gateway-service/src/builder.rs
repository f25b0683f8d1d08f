//! Service construction: wires configuration into running components.
//!
//! Every component receives its configuration section and collaborators
//! by reference here, once, at startup. A failure in this module is
//! process-fatal by design; nothing later in the gateway's life is.

use gateway_broker::BrokerClient;
use gateway_config::Config;
use gateway_indexer::IndexerPool;
use gateway_ledger::implementations::file::FileJobStore;
use gateway_ledger::implementations::memory::MemoryJobStore;
use gateway_ledger::{JobStore, LedgerService};
use gateway_nodes::NodePool;
use gateway_signer::SignerService;
use gateway_worker::{BrokerNotifier, Notifier};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while bootstrapping the gateway.
#[derive(Debug, Error)]
pub enum BuildError {
	/// A component could not be constructed from its configuration.
	#[error("Failed to build {component}: {reason}")]
	Component {
		component: &'static str,
		reason: String,
	},
}

fn component_error(component: &'static str, reason: impl ToString) -> BuildError {
	BuildError::Component {
		component,
		reason: reason.to_string(),
	}
}

/// The shared services every gateway process is assembled from.
pub struct GatewayServices {
	pub config: Config,
	pub ledger: Arc<LedgerService>,
	pub nodes: Arc<NodePool>,
	pub indexers: Arc<IndexerPool>,
	pub signer: Arc<SignerService>,
	pub broker: Arc<BrokerClient>,
	pub notifier: Arc<dyn Notifier>,
}

/// Builds all shared services from validated configuration.
pub async fn build(config: Config) -> Result<GatewayServices, BuildError> {
	let backend: Box<dyn JobStore> = match config.ledger.backend.as_str() {
		"file" => {
			// Validation guarantees the path is present for this backend
			let path = config.ledger.path.clone().unwrap_or_default();
			Box::new(
				FileJobStore::open(PathBuf::from(path))
					.await
					.map_err(|e| component_error("ledger", e))?,
			)
		},
		_ => Box::new(MemoryJobStore::new()),
	};
	let ledger = Arc::new(LedgerService::new(backend));
	tracing::info!(component = "ledger", implementation = %config.ledger.backend, "Loaded");

	let nodes = Arc::new(
		NodePool::from_config(&config.node).map_err(|e| component_error("node pool", e))?,
	);
	tracing::info!(
		component = "nodes",
		endpoints = config.node.endpoints.len(),
		"Loaded"
	);

	let indexers = Arc::new(
		IndexerPool::from_config(&config.indexer)
			.map_err(|e| component_error("indexer pool", e))?,
	);
	indexers
		.initialize()
		.await
		.map_err(|e| component_error("indexer pool", e))?;
	tracing::info!(
		component = "indexers",
		endpoints = config.indexer.endpoints.len(),
		"Loaded"
	);

	let signer = Arc::new(
		SignerService::from_config(&config.signer).map_err(|e| component_error("signer", e))?,
	);
	tracing::info!(component = "signer", implementation = %config.signer.primary, "Loaded");

	let broker = Arc::new(
		BrokerClient::connect(&config.broker)
			.await
			.map_err(|e| component_error("broker", e))?,
	);
	let notifier: Arc<dyn Notifier> = Arc::new(BrokerNotifier::new(broker.clone()));

	Ok(GatewayServices {
		config,
		ledger,
		nodes,
		indexers,
		signer,
		broker,
		notifier,
	})
}
