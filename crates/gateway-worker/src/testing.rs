//! Shared stubs for worker tests.

use crate::{Notifier, WorkerError};
use async_trait::async_trait;
use gateway_config::LocalSignerConfig;
use gateway_indexer::{ContractOperation, ContractOperationFilter, IndexerApi, IndexerError};
use gateway_ledger::implementations::memory::MemoryJobStore;
use gateway_ledger::LedgerService;
use gateway_nodes::{BlockHeader, NodeError, NodePool, NodeRpc};
use gateway_signer::implementations::local::LocalSigner;
use gateway_signer::SignerService;
use gateway_types::{
	ConfirmationNotification, ErrorNotification, OperationStatusSnapshot, SendTransactionsMessage,
	TransactionEntry,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted node double counting every call it receives.
pub struct StubNode {
	name: String,
	healthy: bool,
	head_level: u64,
	injection_rejection: Option<String>,
	forges: AtomicUsize,
	injections: AtomicUsize,
	evictions: AtomicUsize,
}

impl StubNode {
	pub fn healthy(name: &str) -> Self {
		Self {
			name: name.into(),
			healthy: true,
			head_level: 1000,
			injection_rejection: None,
			forges: AtomicUsize::new(0),
			injections: AtomicUsize::new(0),
			evictions: AtomicUsize::new(0),
		}
	}

	pub fn rejecting_injection(mut self, reason: &str) -> Self {
		self.injection_rejection = Some(reason.into());
		self
	}

	pub fn at_level(mut self, level: u64) -> Self {
		self.head_level = level;
		self
	}

	pub fn forges(&self) -> usize {
		self.forges.load(Ordering::SeqCst)
	}

	pub fn injections(&self) -> usize {
		self.injections.load(Ordering::SeqCst)
	}

	pub fn evictions(&self) -> usize {
		self.evictions.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl NodeRpc for StubNode {
	fn name(&self) -> &str {
		&self.name
	}

	fn supports_eviction(&self) -> bool {
		true
	}

	async fn head_header(&self) -> Result<BlockHeader, NodeError> {
		if self.healthy {
			Ok(BlockHeader {
				hash: "BLhead".into(),
				level: self.head_level,
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
		self.forges.fetch_add(1, Ordering::SeqCst);
		Ok("a1b2c3d4".into())
	}

	async fn inject_operation(&self, _signed_hex: &str) -> Result<String, NodeError> {
		self.injections.fetch_add(1, Ordering::SeqCst);
		match &self.injection_rejection {
			Some(reason) => Err(NodeError::Rpc(reason.clone())),
			None => Ok("ooStubOperation".into()),
		}
	}

	async fn ban_operation(&self, _operation_hash: &str) -> Result<(), NodeError> {
		self.evictions.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// Indexer double answering every query with a programmable snapshot.
pub struct StubIndexer {
	snapshot: Mutex<OperationStatusSnapshot>,
}

impl StubIndexer {
	pub fn new() -> Self {
		Self {
			snapshot: Mutex::new(OperationStatusSnapshot::not_found()),
		}
	}

	pub fn set(&self, snapshot: OperationStatusSnapshot) {
		*self.snapshot.lock().unwrap() = snapshot;
	}
}

#[async_trait]
impl IndexerApi for StubIndexer {
	fn name(&self) -> &str {
		"stub"
	}

	async fn health(&self) -> Result<(), IndexerError> {
		Ok(())
	}

	async fn get_operation(
		&self,
		_operation_hash: &str,
	) -> Result<OperationStatusSnapshot, IndexerError> {
		Ok(self.snapshot.lock().unwrap().clone())
	}

	async fn get_contract_operations(
		&self,
		_contract_address: &str,
		_filter: &ContractOperationFilter,
	) -> Result<Vec<ContractOperation>, IndexerError> {
		Ok(Vec::new())
	}
}

/// Notifier double recording everything published through it.
#[derive(Default)]
pub struct RecordingNotifier {
	errors: Mutex<Vec<ErrorNotification>>,
	confirmations: Mutex<Vec<ConfirmationNotification>>,
	sends: Mutex<Vec<SendTransactionsMessage>>,
}

impl RecordingNotifier {
	pub fn errors(&self) -> Vec<ErrorNotification> {
		self.errors.lock().unwrap().clone()
	}

	pub fn confirmations(&self) -> Vec<ConfirmationNotification> {
		self.confirmations.lock().unwrap().clone()
	}

	pub fn sends(&self) -> Vec<SendTransactionsMessage> {
		self.sends.lock().unwrap().clone()
	}
}

#[async_trait]
impl Notifier for RecordingNotifier {
	async fn notify_error(&self, notification: &ErrorNotification) -> Result<(), WorkerError> {
		self.errors.lock().unwrap().push(notification.clone());
		Ok(())
	}

	async fn notify_confirmation(
		&self,
		notification: &ConfirmationNotification,
	) -> Result<(), WorkerError> {
		self.confirmations.lock().unwrap().push(notification.clone());
		Ok(())
	}

	async fn enqueue_send(&self, message: &SendTransactionsMessage) -> Result<(), WorkerError> {
		self.sends.lock().unwrap().push(message.clone());
		Ok(())
	}
}

/// A ledger service over a fresh in-memory store.
pub fn memory_ledger() -> Arc<LedgerService> {
	Arc::new(LedgerService::new(Box::new(MemoryJobStore::new())))
}

/// A signer service with one in-memory key named "admin".
pub fn local_signer() -> Arc<SignerService> {
	let mut keys = HashMap::new();
	keys.insert(
		"admin".to_string(),
		"9d6ed2074ae1f0c8d1f4a915c3a1b9bb57a10b50b1a949bbcbb68f86d45ba621".to_string(),
	);
	let signer = LocalSigner::from_config(&LocalSignerConfig { keys }).unwrap();
	Arc::new(SignerService::new(Box::new(signer)))
}

/// A node pool over stub nodes with a short selection deadline.
pub fn pool_of(nodes: Vec<Arc<StubNode>>) -> Arc<NodePool> {
	let nodes = nodes
		.into_iter()
		.map(|node| node as Arc<dyn NodeRpc>)
		.collect();
	Arc::new(NodePool::new(nodes, Duration::from_secs(5)))
}
