//! Worker module for the Tezos transaction gateway.
//!
//! Houses the three long-running processes that advance jobs through
//! their lifecycle: the send worker (forge, sign, inject), the inject
//! worker (broadcast of client-signed payloads), and the confirmation
//! reconciler that polls indexers and settles or expires injected
//! operations.
//!
//! Workers never crash their process on a single message's failure: every
//! error is recorded on the job row, published to the broadcast exchange,
//! and swallowed. Only startup failures are fatal.

use async_trait::async_trait;
use gateway_broker::{BrokerClient, BrokerError};
use gateway_ledger::LedgerError;
use gateway_nodes::NodeError;
use gateway_signer::SignerError;
use gateway_types::{ConfirmationNotification, ErrorNotification, SendTransactionsMessage};
use std::sync::Arc;
use thiserror::Error;

/// The inject worker.
pub mod inject;
/// The confirmation reconciler.
pub mod reconciler;
/// The send worker.
pub mod send;

#[cfg(test)]
pub(crate) mod testing;

/// Errors that can occur while processing a job.
#[derive(Debug, Error)]
pub enum WorkerError {
	/// Error attributable to the caller: malformed batch, unknown key,
	/// rejected signature. Terminal, never retried.
	#[error("{0}")]
	Client(String),
	/// Error from the job ledger.
	#[error(transparent)]
	Ledger(#[from] LedgerError),
	/// Error from the node pool.
	#[error(transparent)]
	Node(#[from] NodeError),
	/// Error from the signing capability.
	#[error(transparent)]
	Signer(#[from] SignerError),
	/// Error from the message broker.
	#[error(transparent)]
	Broker(#[from] BrokerError),
}

/// Outbound notification seam for workers.
///
/// Everything a worker publishes goes through this trait so that job
/// processing stays testable without a live broker.
#[async_trait]
pub trait Notifier: Send + Sync {
	/// Publishes a job failure to the broadcast exchange.
	async fn notify_error(&self, notification: &ErrorNotification) -> Result<(), WorkerError>;

	/// Publishes a confirmation to the broadcast exchange.
	async fn notify_confirmation(
		&self,
		notification: &ConfirmationNotification,
	) -> Result<(), WorkerError>;

	/// Enqueues a send request, used when an expired job is retried.
	async fn enqueue_send(&self, message: &SendTransactionsMessage) -> Result<(), WorkerError>;
}

/// Broker-backed notifier used by all deployed workers.
pub struct BrokerNotifier {
	broker: Arc<BrokerClient>,
}

impl BrokerNotifier {
	/// Creates a notifier publishing through the given broker client.
	pub fn new(broker: Arc<BrokerClient>) -> Self {
		Self { broker }
	}
}

#[async_trait]
impl Notifier for BrokerNotifier {
	async fn notify_error(&self, notification: &ErrorNotification) -> Result<(), WorkerError> {
		self.broker.publish_error_notification(notification).await?;
		Ok(())
	}

	async fn notify_confirmation(
		&self,
		notification: &ConfirmationNotification,
	) -> Result<(), WorkerError> {
		self.broker.publish_confirmation(notification).await?;
		Ok(())
	}

	async fn enqueue_send(&self, message: &SendTransactionsMessage) -> Result<(), WorkerError> {
		let subject = self.broker.config().send_subject.clone();
		self.broker.publish(&subject, message).await?;
		Ok(())
	}
}
