//! Confirmation reconciler: settles or expires injected operations.
//!
//! Runs on a fixed schedule and is the only component that transitions a
//! job out of `Injected`. Each pass walks the pending set sequentially,
//! asks the indexer pool for a fresh snapshot of every operation, and
//! applies one of four decisions: wait, confirm, fail, or expire. The
//! decision is a pure function of the snapshot, so re-observing an
//! unchanged snapshot is a no-op and passes are idempotent.

use crate::{Notifier, WorkerError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gateway_config::{ReconcilerConfig, WorkerConfig};
use gateway_indexer::IndexerPool;
use gateway_ledger::LedgerService;
use gateway_nodes::NodePool;
use gateway_types::{
	ConfirmationNotification, ErrorNotification, Job, OperationStatusSnapshot,
	SendTransactionsMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What a reconciliation pass should do with one injected job.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileDecision {
	/// Leave the job injected; the next pass will look again.
	Wait,
	/// The operation reached its confirmation depth.
	Confirm,
	/// The chain rejected the operation.
	Fail { reason: String },
	/// The operation was never observed and its expiration window has
	/// elapsed.
	Expire,
}

/// Computes the decision for one job from this pass's observations.
///
/// Confirmation depth counts blocks produced after the inclusion block:
/// an operation at `block_level` with the head at `head_level` has
/// `head_level - block_level` confirmations.
pub fn decide(
	job: &Job,
	snapshot: &OperationStatusSnapshot,
	head_level: u64,
	now: DateTime<Utc>,
	config: &ReconcilerConfig,
) -> ReconcileDecision {
	if !snapshot.found {
		let expires_at = job.created_at
			+ ChronoDuration::minutes(config.operation_expiration_timeout_minutes as i64);
		if now > expires_at {
			return ReconcileDecision::Expire;
		}
		return ReconcileDecision::Wait;
	}

	if !snapshot.applied {
		let reason = snapshot
			.reason
			.clone()
			.unwrap_or_else(|| format!("operation {}", snapshot.chain_status));
		return ReconcileDecision::Fail { reason };
	}

	match snapshot.block_level {
		Some(block_level) if head_level.saturating_sub(block_level) >= config.nb_of_confirmation => {
			ReconcileDecision::Confirm
		},
		_ => ReconcileDecision::Wait,
	}
}

/// The reconciler process.
pub struct Reconciler {
	ledger: Arc<LedgerService>,
	nodes: Arc<NodePool>,
	indexers: Arc<IndexerPool>,
	notifier: Arc<dyn Notifier>,
	config: ReconcilerConfig,
	worker_config: WorkerConfig,
}

impl Reconciler {
	/// Creates a reconciler over the shared services.
	pub fn new(
		ledger: Arc<LedgerService>,
		nodes: Arc<NodePool>,
		indexers: Arc<IndexerPool>,
		notifier: Arc<dyn Notifier>,
		config: ReconcilerConfig,
		worker_config: WorkerConfig,
	) -> Self {
		Self {
			ledger,
			nodes,
			indexers,
			notifier,
			config,
			worker_config,
		}
	}

	/// Runs scheduled passes until the task is cancelled.
	///
	/// The loop awaits each pass before sleeping again, and missed ticks
	/// are delayed rather than burst, so passes never overlap even when
	/// a slow indexer stretches one past the interval.
	pub async fn run(&self) {
		let mut interval =
			tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			interval.tick().await;
			match self.run_pass().await {
				Ok(reconciled) => {
					if reconciled > 0 {
						tracing::info!(reconciled, "Reconciliation pass complete");
					}
				},
				Err(err) => {
					tracing::warn!(error = %err, "Reconciliation pass skipped");
				},
			}
		}
	}

	/// Walks every injected job once. Returns how many jobs were
	/// examined.
	pub async fn run_pass(&self) -> Result<usize, WorkerError> {
		let jobs = self.ledger.select_injected().await?;
		if jobs.is_empty() {
			return Ok(0);
		}

		// One head observation serves the whole pass
		let head_level = self.nodes.head_level().await?;
		let now = Utc::now();

		let examined = jobs.len();
		for job in jobs {
			// Rows without a hash never reach this loop
			let operation_hash = job.operation_hash.clone().unwrap_or_default();
			let snapshot = self.indexers.query_operation(&operation_hash).await;
			let decision = decide(&job, &snapshot, head_level, now, &self.config);

			tracing::debug!(job_id = job.id, ?decision, "Reconciled operation");
			if let Err(err) = self.apply(&job, decision).await {
				tracing::error!(job_id = job.id, error = %err, "Failed to apply reconciliation decision");
			}
		}

		Ok(examined)
	}

	async fn apply(&self, job: &Job, decision: ReconcileDecision) -> Result<(), WorkerError> {
		match decision {
			ReconcileDecision::Wait => Ok(()),
			ReconcileDecision::Confirm => self.confirm(job).await,
			ReconcileDecision::Fail { reason } => self.fail(job, reason).await,
			ReconcileDecision::Expire => self.expire(job).await,
		}
	}

	async fn confirm(&self, job: &Job) -> Result<(), WorkerError> {
		self.ledger.mark_done(job.id).await?;
		tracing::info!(job_id = job.id, "Job confirmed");

		for entry in &job.transactions {
			let notification = ConfirmationNotification {
				job_id: job.id,
				contract_address: entry.contract_address.clone(),
				entry_point: entry.entry_point.clone(),
				caller_id: job.caller_id.clone(),
			};
			if let Err(err) = self.notifier.notify_confirmation(&notification).await {
				tracing::error!(job_id = job.id, error = %err, "Failed to broadcast confirmation");
			}
		}

		Ok(())
	}

	async fn fail(&self, job: &Job, reason: String) -> Result<(), WorkerError> {
		self.ledger.mark_error(job.id, reason.clone()).await?;
		tracing::info!(job_id = job.id, reason, "Job failed on chain");

		let notification = ErrorNotification {
			job_id: job.id,
			error_message: reason,
		};
		if let Err(err) = self.notifier.notify_error(&notification).await {
			tracing::error!(job_id = job.id, error = %err, "Failed to broadcast job error");
		}

		Ok(())
	}

	async fn expire(&self, job: &Job) -> Result<(), WorkerError> {
		let operation_hash = job.operation_hash.clone().unwrap_or_default();

		// Best-effort, issued exactly once per expiry: other nodes may
		// still propagate the operation
		if let Err(err) = self.nodes.evict_pending_operation(&operation_hash).await {
			tracing::warn!(job_id = job.id, error = %err, "Mempool eviction failed");
		}

		let message = format!(
			"operation {} not observed on any indexer within {} minutes",
			operation_hash, self.config.operation_expiration_timeout_minutes
		);
		self.ledger.mark_timeout(job.id, message.clone()).await?;
		tracing::info!(job_id = job.id, "Job expired");

		let notification = ErrorNotification {
			job_id: job.id,
			error_message: message,
		};
		if let Err(err) = self.notifier.notify_error(&notification).await {
			tracing::error!(job_id = job.id, error = %err, "Failed to broadcast job error");
		}

		self.maybe_retry(job).await
	}

	/// Re-enqueues an expired job when the retry ceiling allows it and
	/// the job still carries everything a fresh submission needs.
	async fn maybe_retry(&self, job: &Job) -> Result<(), WorkerError> {
		if job.retry_count >= self.worker_config.max_retry {
			return Ok(());
		}
		let Some(secure_key_name) = job.secure_key_name.clone() else {
			return Ok(());
		};
		if job.transactions.is_empty() {
			return Ok(());
		}

		let retry = self.ledger.create_retry_of(job).await?;
		let message = SendTransactionsMessage {
			transactions: job.transactions.clone(),
			secure_key_name,
			caller_id: job.caller_id.clone(),
			job_id: retry.id,
		};
		self.notifier.enqueue_send(&message).await?;

		tracing::info!(
			job_id = job.id,
			retry_job_id = retry.id,
			attempt = retry.retry_count,
			"Re-enqueued expired job"
		);
		Ok(())
	}
}
