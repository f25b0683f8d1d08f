//! Inject worker: broadcast of client-signed payloads.
//!
//! Serves callers that forge through the gateway, sign locally, and only
//! need the signed bytes broadcast. The pipeline is the tail of the send
//! worker's: select a node, inject, record the operation hash.

use crate::{Notifier, WorkerError};
use gateway_broker::BrokerClient;
use gateway_ledger::LedgerService;
use gateway_nodes::NodePool;
use gateway_types::{ErrorNotification, InjectTransactionMessage, Job};
use std::sync::Arc;

/// Worker consuming pre-signed payloads and submitting them to the chain.
pub struct InjectWorker {
	ledger: Arc<LedgerService>,
	nodes: Arc<NodePool>,
	notifier: Arc<dyn Notifier>,
}

impl InjectWorker {
	/// Creates an inject worker over the shared services.
	pub fn new(
		ledger: Arc<LedgerService>,
		nodes: Arc<NodePool>,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self {
			ledger,
			nodes,
			notifier,
		}
	}

	/// Consumes the inject queue until the task is cancelled.
	pub async fn run(self: Arc<Self>, broker: Arc<BrokerClient>) {
		let subject = broker.config().inject_subject.clone();
		let worker = self.clone();

		broker
			.consume::<InjectTransactionMessage, _, _>("inject-worker", &subject, move |message| {
				let worker = worker.clone();
				async move {
					worker.handle(message).await;
					Ok::<(), gateway_broker::HandlerError>(())
				}
			})
			.await;
	}

	/// Processes one inject request; failures land on the job row.
	pub async fn handle(&self, message: InjectTransactionMessage) {
		let job_id = message.job_id;
		match self.process(message).await {
			Ok(job) => {
				tracing::info!(
					job_id = job.id,
					operation_hash = job.operation_hash.as_deref().unwrap_or_default(),
					"Client-signed job injected"
				);
			},
			Err(err) => self.fail_job(job_id, err).await,
		}
	}

	async fn process(&self, message: InjectTransactionMessage) -> Result<Job, WorkerError> {
		// The signature arrived with the message; record the transition
		// before attempting broadcast
		self.ledger.mark_signed(message.job_id).await?;

		let node = self.nodes.select_healthy().await?;
		let operation_hash = node.inject_operation(&message.signed_transaction).await?;

		let job = self
			.ledger
			.mark_injected(message.job_id, operation_hash)
			.await?;
		Ok(job)
	}

	async fn fail_job(&self, job_id: u64, err: WorkerError) {
		let message = err.to_string();
		tracing::error!(job_id, error = %message, "Inject request failed");

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
	use crate::testing::{memory_ledger, pool_of, RecordingNotifier, StubNode};
	use gateway_types::{JobStatus, OperationKind};

	#[tokio::test]
	async fn test_client_signed_payload_is_injected() {
		let ledger = memory_ledger();
		let node = Arc::new(StubNode::healthy("main"));
		let notifier = Arc::new(RecordingNotifier::default());
		let worker = InjectWorker::new(ledger.clone(), pool_of(vec![node.clone()]), notifier);

		let job = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		ledger
			.mark_forged(job.id, "a1b2".into(), Vec::new(), "client-key".into())
			.await
			.unwrap();

		worker
			.handle(InjectTransactionMessage {
				job_id: job.id,
				signed_transaction: "a1b2ffff".into(),
				signature: "edsigSomething".into(),
			})
			.await;

		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Injected);
		assert_eq!(stored.operation_hash.as_deref(), Some("ooStubOperation"));
		assert_eq!(node.injections(), 1);
	}

	#[tokio::test]
	async fn test_rejection_is_recorded_on_the_job() {
		let ledger = memory_ledger();
		let node = Arc::new(StubNode::healthy("main").rejecting_injection("fee too low"));
		let notifier = Arc::new(RecordingNotifier::default());
		let worker =
			InjectWorker::new(ledger.clone(), pool_of(vec![node]), notifier.clone());

		let job = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		ledger
			.mark_forged(job.id, "a1b2".into(), Vec::new(), "client-key".into())
			.await
			.unwrap();

		worker
			.handle(InjectTransactionMessage {
				job_id: job.id,
				signed_transaction: "a1b2ffff".into(),
				signature: "edsigSomething".into(),
			})
			.await;

		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Error);
		assert!(stored.error_message.as_deref().unwrap().contains("fee too low"));
		assert_eq!(notifier.errors().len(), 1);
	}

	#[tokio::test]
	async fn test_unknown_job_is_broadcast_but_not_crashing() {
		let ledger = memory_ledger();
		let node = Arc::new(StubNode::healthy("main"));
		let notifier = Arc::new(RecordingNotifier::default());
		let worker = InjectWorker::new(ledger, pool_of(vec![node]), notifier.clone());

		worker
			.handle(InjectTransactionMessage {
				job_id: 404,
				signed_transaction: "a1".into(),
				signature: "sig".into(),
			})
			.await;

		assert_eq!(notifier.errors().len(), 1);
		assert_eq!(notifier.errors()[0].job_id, 404);
	}
}
