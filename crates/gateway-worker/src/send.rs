//! Send worker: forge, sign, and inject transaction batches.
//!
//! Consumes send requests from the broker and drives the owning job
//! through `Created -> Forged -> Signed -> Injected`, or to `Error` on
//! the first failing step. This worker is the only writer for those
//! transitions; the reconciler takes over once a job is injected.

use crate::{Notifier, WorkerError};
use gateway_broker::BrokerClient;
use gateway_config::WorkerConfig;
use gateway_ledger::LedgerService;
use gateway_nodes::NodePool;
use gateway_signer::SignerService;
use gateway_types::{ErrorNotification, Job, SendTransactionsMessage};
use std::sync::Arc;

/// Worker consuming transaction batches and submitting them to the chain.
pub struct SendWorker {
	ledger: Arc<LedgerService>,
	nodes: Arc<NodePool>,
	signer: Arc<SignerService>,
	notifier: Arc<dyn Notifier>,
	config: WorkerConfig,
}

impl SendWorker {
	/// Creates a send worker over the shared services.
	pub fn new(
		ledger: Arc<LedgerService>,
		nodes: Arc<NodePool>,
		signer: Arc<SignerService>,
		notifier: Arc<dyn Notifier>,
		config: WorkerConfig,
	) -> Self {
		Self {
			ledger,
			nodes,
			signer,
			notifier,
			config,
		}
	}

	/// Consumes the send queue until the task is cancelled.
	pub async fn run(self: Arc<Self>, broker: Arc<BrokerClient>) {
		let subject = broker.config().send_subject.clone();
		let worker = self.clone();

		broker
			.consume::<SendTransactionsMessage, _, _>("send-worker", &subject, move |message| {
				let worker = worker.clone();
				async move {
					worker.handle(message).await;
					Ok::<(), gateway_broker::HandlerError>(())
				}
			})
			.await;
	}

	/// Processes one send request. Failures are recorded on the job row
	/// and broadcast; they are never re-thrown into the consumer loop.
	pub async fn handle(&self, message: SendTransactionsMessage) {
		let job_id = message.job_id;
		match self.process(message).await {
			Ok(job) => {
				tracing::info!(
					job_id = job.id,
					operation_hash = job.operation_hash.as_deref().unwrap_or_default(),
					"Job injected"
				);
			},
			Err(err) => self.fail_job(job_id, err).await,
		}
	}

	/// The forge -> sign -> inject pipeline for one batch.
	async fn process(&self, message: SendTransactionsMessage) -> Result<Job, WorkerError> {
		let SendTransactionsMessage {
			transactions,
			secure_key_name,
			job_id,
			..
		} = message;

		// Batch bounds are a client contract, checked before any ledger
		// row leaves Created
		if transactions.is_empty() {
			return Err(WorkerError::Client("batch contains no transactions".into()));
		}
		if transactions.len() > self.config.max_operations_per_batch {
			return Err(WorkerError::Client(format!(
				"batch of {} operations exceeds the maximum of {}",
				transactions.len(),
				self.config.max_operations_per_batch
			)));
		}

		// One node serves the whole pipeline for this job
		let node = self.nodes.select_healthy().await?;

		let source = self
			.signer
			.public_key_hash(&secure_key_name)
			.await
			.map_err(|err| WorkerError::Client(err.to_string()))?;

		let forged = node.forge_operations(&source, &transactions).await?;
		self.ledger
			.mark_forged(job_id, forged.clone(), transactions, secure_key_name.clone())
			.await?;
		tracing::debug!(job_id, "Job forged");

		// Signing failures are attributable to the caller-supplied key
		// name, so they terminate the job without retry
		let signed = self
			.signer
			.sign(&forged, &secure_key_name)
			.await
			.map_err(|err| WorkerError::Client(err.to_string()))?;
		self.ledger.mark_signed(job_id).await?;

		let operation_hash = node.inject_operation(&signed.signed_bytes).await?;
		let job = self.ledger.mark_injected(job_id, operation_hash).await?;

		Ok(job)
	}

	/// Records a failure on the job row and broadcasts it.
	async fn fail_job(&self, job_id: u64, err: WorkerError) {
		let message = err.to_string();
		tracing::error!(job_id, error = %message, "Send request failed");

		if let Err(ledger_err) = self.ledger.mark_error(job_id, message.clone()).await {
			tracing::error!(job_id, error = %ledger_err, "Failed to record job error");
		}

		let notification = ErrorNotification {
			job_id,
			error_message: message,
		};
		if let Err(notify_err) = self.notifier.notify_error(&notification).await {
			tracing::error!(job_id, error = %notify_err, "Failed to broadcast job error");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{local_signer, memory_ledger, pool_of, RecordingNotifier, StubNode};
	use gateway_types::{JobStatus, OperationKind, TransactionEntry};

	fn entry(contract: &str) -> TransactionEntry {
		TransactionEntry {
			contract_address: contract.into(),
			entry_point: "transfer".into(),
			entry_point_params: Some(serde_json::json!({"to": "tz1dest"})),
			amount: None,
			fee: None,
		}
	}

	fn message(job_id: u64, entries: usize) -> SendTransactionsMessage {
		SendTransactionsMessage {
			transactions: (0..entries).map(|i| entry(&format!("KT1contract{}", i))).collect(),
			secure_key_name: "admin".into(),
			caller_id: Some("caller-7".into()),
			job_id,
		}
	}

	fn worker(
		ledger: Arc<LedgerService>,
		node: Arc<StubNode>,
		notifier: Arc<RecordingNotifier>,
	) -> SendWorker {
		SendWorker::new(
			ledger,
			pool_of(vec![node]),
			local_signer(),
			notifier,
			WorkerConfig {
				max_operations_per_batch: 5,
				max_retry: 0,
			},
		)
	}

	#[tokio::test]
	async fn test_happy_path_ends_injected_with_hash() {
		let ledger = memory_ledger();
		let node = Arc::new(StubNode::healthy("main"));
		let notifier = Arc::new(RecordingNotifier::default());
		let worker = worker(ledger.clone(), node, notifier.clone());

		let job = ledger
			.create_job(OperationKind::Transaction, Some("caller-7".into()))
			.await
			.unwrap();
		worker.handle(message(job.id, 1)).await;

		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Injected);
		assert!(stored.operation_hash.is_some());
		assert!(stored.raw_transaction.is_some());
		assert_eq!(stored.transactions.len(), 1);
		assert!(notifier.errors().is_empty());
	}

	#[tokio::test]
	async fn test_oversized_batch_rejected_before_forging() {
		let ledger = memory_ledger();
		let node = Arc::new(StubNode::healthy("main"));
		let notifier = Arc::new(RecordingNotifier::default());
		let worker = worker(ledger.clone(), node.clone(), notifier.clone());

		let job = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		worker.handle(message(job.id, 6)).await;

		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Error);
		// Never forged: no raw transaction was persisted
		assert!(stored.raw_transaction.is_none());
		assert!(stored.error_message.as_deref().unwrap().contains("exceeds"));
		assert_eq!(node.forges(), 0);
		assert_eq!(notifier.errors().len(), 1);
	}

	#[tokio::test]
	async fn test_unknown_key_terminates_job_naming_the_key() {
		let ledger = memory_ledger();
		let node = Arc::new(StubNode::healthy("main"));
		let notifier = Arc::new(RecordingNotifier::default());
		let worker = worker(ledger.clone(), node, notifier.clone());

		let job = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		let mut msg = message(job.id, 1);
		msg.secure_key_name = "no-such-key".into();
		worker.handle(msg).await;

		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Error);
		assert!(stored
			.error_message
			.as_deref()
			.unwrap()
			.contains("no-such-key"));
	}

	#[tokio::test]
	async fn test_node_rejection_is_terminal_with_reason() {
		let ledger = memory_ledger();
		let node = Arc::new(StubNode::healthy("main").rejecting_injection("counter in the past"));
		let notifier = Arc::new(RecordingNotifier::default());
		let worker = worker(ledger.clone(), node, notifier.clone());

		let job = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		worker.handle(message(job.id, 1)).await;

		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Error);
		assert!(stored
			.error_message
			.as_deref()
			.unwrap()
			.contains("counter in the past"));
		// Forge and sign happened before the rejection
		assert!(stored.raw_transaction.is_some());
		assert!(stored.operation_hash.is_none());
	}
}
