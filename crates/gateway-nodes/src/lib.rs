//! Node pool module for the Tezos transaction gateway.
//!
//! Maintains the configured set of RPC node endpoints and hands out a
//! healthy one per request. Selection picks uniformly at random and probes
//! the candidate with a cheap head-header fetch; unhealthy candidates are
//! discarded and re-picked from the full set, so a transient node outage
//! self-heals on the next call. The search loop is bounded by a caller
//! deadline and degrades to a clear timeout error instead of hanging.

use async_trait::async_trait;
use gateway_config::NodeConfig;
use gateway_types::TransactionEntry;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
}

/// Delay between failed probes while searching for a healthy node.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Errors that can occur during node pool operations.
#[derive(Debug, Error)]
pub enum NodeError {
	/// Error that occurs during network communication with a node.
	#[error("Network error: {0}")]
	Network(String),
	/// Error returned by a node's RPC interface, e.g. an injection
	/// rejection with the node's reason.
	#[error("Node rejected the request: {0}")]
	Rpc(String),
	/// Error that occurs when no healthy node was found before the
	/// selection deadline elapsed.
	#[error("No healthy node found within {0:?}")]
	DeadlineExceeded(Duration),
	/// Error that occurs when every configured node is excluded from
	/// eviction.
	#[error("No node in the pool accepts eviction requests")]
	NoEvictionCandidate,
}

/// Header of the most recent block a node knows about.
#[derive(Debug, Clone)]
pub struct BlockHeader {
	/// Block hash; an empty hash marks the node as unhealthy.
	pub hash: String,
	/// Block level, used to compute confirmation depth.
	pub level: u64,
}

/// Trait defining the interface to one RPC node.
///
/// The pool never talks to a node except through this trait, which keeps
/// selection and eviction testable against stub nodes.
#[async_trait]
pub trait NodeRpc: Send + Sync {
	/// Short name of this node, used in logs and eviction exclusion.
	fn name(&self) -> &str;

	/// Whether this node accepts mempool eviction requests.
	fn supports_eviction(&self) -> bool;

	/// Fetches the latest block header. Used both as the liveness probe
	/// and as the head-level source for confirmation counting.
	async fn head_header(&self) -> Result<BlockHeader, NodeError>;

	/// Builds the wire-format bytes for a batch of transactions issued by
	/// `source`. Returns the forged payload as a hex string.
	async fn forge_operations(
		&self,
		source: &str,
		entries: &[TransactionEntry],
	) -> Result<String, NodeError>;

	/// Submits a signed operation and returns the chain-assigned
	/// operation hash.
	async fn inject_operation(&self, signed_hex: &str) -> Result<String, NodeError>;

	/// Asks the node to discard a pending operation from its mempool.
	async fn ban_operation(&self, operation_hash: &str) -> Result<(), NodeError>;
}

/// Pool of RPC nodes with health-based selection.
///
/// Holds no mutable state beyond its configuration; safe for concurrent
/// use from multiple workers.
pub struct NodePool {
	/// The configured nodes. Never shrinks: unhealthy nodes stay in the
	/// set and are simply skipped until they recover.
	nodes: Vec<Arc<dyn NodeRpc>>,
	/// Deadline for one healthy-node search.
	selection_timeout: Duration,
}

impl NodePool {
	/// Creates a pool over the given nodes.
	pub fn new(nodes: Vec<Arc<dyn NodeRpc>>, selection_timeout: Duration) -> Self {
		Self {
			nodes,
			selection_timeout,
		}
	}

	/// Builds a pool of HTTP clients from configuration.
	pub fn from_config(config: &NodeConfig) -> Result<Self, NodeError> {
		let request_timeout = Duration::from_secs(config.request_timeout_seconds);
		let nodes = config
			.endpoints
			.iter()
			.map(|endpoint| {
				implementations::http::HttpNodeClient::new(endpoint, request_timeout)
					.map(|client| Arc::new(client) as Arc<dyn NodeRpc>)
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self::new(
			nodes,
			Duration::from_secs(config.selection_timeout_seconds),
		))
	}

	fn pick_random<'a>(&self, candidates: &'a [Arc<dyn NodeRpc>]) -> &'a Arc<dyn NodeRpc> {
		let index = rand::thread_rng().gen_range(0..candidates.len());
		&candidates[index]
	}

	/// Probes a candidate; a node is healthy when it serves a head header
	/// with a non-empty block hash.
	async fn health_check(&self, node: &Arc<dyn NodeRpc>) -> bool {
		match node.head_header().await {
			Ok(header) => !header.hash.is_empty(),
			Err(err) => {
				tracing::warn!(node = node.name(), error = %err, "Node failed liveness probe");
				false
			},
		}
	}

	/// Selects a healthy node, retrying across the full set until the
	/// configured deadline elapses.
	pub async fn select_healthy(&self) -> Result<Arc<dyn NodeRpc>, NodeError> {
		let search = async {
			loop {
				let candidate = self.pick_random(&self.nodes).clone();
				if self.health_check(&candidate).await {
					tracing::debug!(node = candidate.name(), "Selected healthy node");
					return candidate;
				}
				tokio::time::sleep(RETRY_DELAY).await;
			}
		};

		tokio::time::timeout(self.selection_timeout, search)
			.await
			.map_err(|_| NodeError::DeadlineExceeded(self.selection_timeout))
	}

	/// Returns the current head level from a healthy node.
	pub async fn head_level(&self) -> Result<u64, NodeError> {
		let node = self.select_healthy().await?;
		Ok(node.head_header().await?.level)
	}

	/// Asks one eviction-capable node to discard a pending operation.
	///
	/// Nodes configured without eviction support are excluded from the
	/// candidate set. The call is issued once; a failure is logged and
	/// surfaced to the caller but not retried.
	pub async fn evict_pending_operation(&self, operation_hash: &str) -> Result<(), NodeError> {
		let candidates: Vec<Arc<dyn NodeRpc>> = self
			.nodes
			.iter()
			.filter(|node| node.supports_eviction())
			.cloned()
			.collect();

		if candidates.is_empty() {
			return Err(NodeError::NoEvictionCandidate);
		}

		let node = self.pick_random(&candidates);
		match node.ban_operation(operation_hash).await {
			Ok(()) => {
				tracing::info!(
					node = node.name(),
					operation_hash,
					"Evicted operation from mempool"
				);
				Ok(())
			},
			Err(err) => {
				tracing::error!(
					node = node.name(),
					operation_hash,
					error = %err,
					"Mempool eviction failed"
				);
				Err(err)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Stub node with scripted health and eviction behavior.
	struct StubNode {
		name: String,
		healthy: bool,
		supports_eviction: bool,
		probes: AtomicUsize,
		evictions: AtomicUsize,
	}

	impl StubNode {
		fn new(name: &str, healthy: bool, supports_eviction: bool) -> Self {
			Self {
				name: name.to_string(),
				healthy,
				supports_eviction,
				probes: AtomicUsize::new(0),
				evictions: AtomicUsize::new(0),
			}
		}
	}

	#[async_trait]
	impl NodeRpc for StubNode {
		fn name(&self) -> &str {
			&self.name
		}

		fn supports_eviction(&self) -> bool {
			self.supports_eviction
		}

		async fn head_header(&self) -> Result<BlockHeader, NodeError> {
			self.probes.fetch_add(1, Ordering::SeqCst);
			if self.healthy {
				Ok(BlockHeader {
					hash: "BLockGenesis".into(),
					level: 100,
				})
			} else {
				Err(NodeError::Network("connection refused".into()))
			}
		}

		async fn forge_operations(
			&self,
			_source: &str,
			_entries: &[TransactionEntry],
		) -> Result<String, NodeError> {
			Ok("deadbeef".into())
		}

		async fn inject_operation(&self, _signed_hex: &str) -> Result<String, NodeError> {
			Ok("oo123".into())
		}

		async fn ban_operation(&self, _operation_hash: &str) -> Result<(), NodeError> {
			self.evictions.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_unhealthy_node_is_skipped() {
		let sick = Arc::new(StubNode::new("sick", false, true));
		let healthy = Arc::new(StubNode::new("healthy", true, true));
		let pool = NodePool::new(
			vec![sick.clone() as Arc<dyn NodeRpc>, healthy.clone()],
			Duration::from_secs(10),
		);

		// Random selection may probe the sick node first, but the search
		// always lands on the healthy one without a caller-visible error.
		let selected = pool.select_healthy().await.unwrap();
		assert_eq!(selected.name(), "healthy");
	}

	#[tokio::test]
	async fn test_selection_deadline_is_enforced() {
		let pool = NodePool::new(
			vec![Arc::new(StubNode::new("sick", false, true)) as Arc<dyn NodeRpc>],
			Duration::from_millis(50),
		);

		let err = match pool.select_healthy().await {
			Ok(_) => panic!("expected select_healthy to fail"),
			Err(e) => e,
		};
		assert!(matches!(err, NodeError::DeadlineExceeded(_)));
	}

	#[tokio::test]
	async fn test_eviction_skips_excluded_nodes() {
		let no_evict = Arc::new(StubNode::new("archival", true, false));
		let evictor = Arc::new(StubNode::new("rolling", true, true));
		let pool = NodePool::new(
			vec![no_evict.clone() as Arc<dyn NodeRpc>, evictor.clone()],
			Duration::from_secs(10),
		);

		for _ in 0..5 {
			pool.evict_pending_operation("oo123").await.unwrap();
		}

		assert_eq!(no_evict.evictions.load(Ordering::SeqCst), 0);
		assert_eq!(evictor.evictions.load(Ordering::SeqCst), 5);
	}

	#[tokio::test]
	async fn test_eviction_with_no_candidates() {
		let pool = NodePool::new(
			vec![Arc::new(StubNode::new("archival", true, false)) as Arc<dyn NodeRpc>],
			Duration::from_secs(10),
		);

		let err = pool.evict_pending_operation("oo123").await.unwrap_err();
		assert!(matches!(err, NodeError::NoEvictionCandidate));
	}

	#[tokio::test]
	async fn test_head_level_comes_from_healthy_node() {
		let pool = NodePool::new(
			vec![Arc::new(StubNode::new("main", true, true)) as Arc<dyn NodeRpc>],
			Duration::from_secs(10),
		);
		assert_eq!(pool.head_level().await.unwrap(), 100);
	}
}
