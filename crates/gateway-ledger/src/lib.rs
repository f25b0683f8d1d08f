//! Job ledger module for the Tezos transaction gateway.
//!
//! The ledger is the single source of truth for job state. It provides
//! row-level CRUD over persisted job records through the [`JobStore`]
//! trait, with in-memory and file-based backends, and a typed
//! [`LedgerService`] wrapper that enforces the job lifecycle ordering on
//! every write.

use async_trait::async_trait;
use chrono::Utc;
use gateway_types::{Job, JobStatus, OperationKind, TransactionEntry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Error that occurs when a requested job is not found.
	#[error("Job {0} not found")]
	NotFound(u64),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs when a write would move a job backwards in its
	/// lifecycle.
	#[error("Invalid transition for job {job_id}: {from} -> {to}")]
	InvalidTransition {
		job_id: u64,
		from: JobStatus,
		to: JobStatus,
	},
}

/// Trait defining the low-level interface for ledger backends.
///
/// Backends provide plain row CRUD; they assign identifiers but enforce no
/// lifecycle rules. All invariant checking lives in [`LedgerService`].
#[async_trait]
pub trait JobStore: Send + Sync {
	/// Inserts a new job row, assigning the next monotonic identifier.
	async fn insert(&self, job: Job) -> Result<Job, LedgerError>;

	/// Retrieves one job by identifier.
	async fn get(&self, id: u64) -> Result<Job, LedgerError>;

	/// Returns all jobs currently in the given status.
	async fn select_by_status(&self, status: JobStatus) -> Result<Vec<Job>, LedgerError>;

	/// Overwrites an existing job row.
	async fn update(&self, job: &Job) -> Result<(), LedgerError>;

	/// Reserves and returns the next job identifier.
	async fn next_id(&self) -> Result<u64, LedgerError>;
}

/// High-level ledger service enforcing the job lifecycle.
///
/// Wraps a backend and refuses any write that would regress a job's
/// status. Every successful write refreshes `updated_at`.
pub struct LedgerService {
	/// The underlying storage backend implementation.
	backend: Box<dyn JobStore>,
}

impl LedgerService {
	/// Creates a new LedgerService with the specified backend.
	pub fn new(backend: Box<dyn JobStore>) -> Self {
		Self { backend }
	}

	/// Creates a job row in `Created` and returns it.
	pub async fn create_job(
		&self,
		kind: OperationKind,
		caller_id: Option<String>,
	) -> Result<Job, LedgerError> {
		let id = self.backend.next_id().await?;
		self.backend.insert(Job::new(id, kind, caller_id)).await
	}

	/// Creates a fresh job row that retries an expired one. The new job
	/// starts over in `Created` and carries the source job's retry count
	/// plus one.
	pub async fn create_retry_of(&self, source: &Job) -> Result<Job, LedgerError> {
		let id = self.backend.next_id().await?;
		let mut job = Job::new(id, source.operation_kind, source.caller_id.clone());
		job.retry_count = source.retry_count + 1;
		self.backend.insert(job).await
	}

	/// Retrieves one job by identifier.
	pub async fn get(&self, id: u64) -> Result<Job, LedgerError> {
		self.backend.get(id).await
	}

	/// Returns all jobs awaiting confirmation, i.e. in `Injected` with an
	/// operation hash. Jobs injected but missing a hash would violate the
	/// ledger invariant and are skipped with a warning rather than polled.
	pub async fn select_injected(&self) -> Result<Vec<Job>, LedgerError> {
		let jobs = self.backend.select_by_status(JobStatus::Injected).await?;
		Ok(jobs
			.into_iter()
			.filter(|job| {
				if job.operation_hash.is_none() {
					tracing::warn!(job_id = job.id, "Injected job has no operation hash, skipping");
					return false;
				}
				true
			})
			.collect())
	}

	/// Records the forged payload: raw transaction bytes, the batch the
	/// job carries, and the custody key that will sign it.
	pub async fn mark_forged(
		&self,
		id: u64,
		raw_transaction: String,
		transactions: Vec<TransactionEntry>,
		secure_key_name: String,
	) -> Result<Job, LedgerError> {
		self.transition(id, JobStatus::Forged, move |job| {
			job.raw_transaction = Some(raw_transaction);
			job.transactions = transactions;
			job.secure_key_name = Some(secure_key_name);
		})
		.await
	}

	/// Marks the job signed.
	pub async fn mark_signed(&self, id: u64) -> Result<Job, LedgerError> {
		self.transition(id, JobStatus::Signed, |_| {}).await
	}

	/// Records the chain-assigned operation hash and marks the job
	/// injected.
	pub async fn mark_injected(&self, id: u64, operation_hash: String) -> Result<Job, LedgerError> {
		self.transition(id, JobStatus::Injected, move |job| {
			job.operation_hash = Some(operation_hash);
		})
		.await
	}

	/// Marks the job done.
	pub async fn mark_done(&self, id: u64) -> Result<Job, LedgerError> {
		self.transition(id, JobStatus::Done, |_| {}).await
	}

	/// Terminates the job with an error message.
	pub async fn mark_error(&self, id: u64, message: impl Into<String>) -> Result<Job, LedgerError> {
		let message = message.into();
		self.transition(id, JobStatus::Error, move |job| {
			job.error_message = Some(message);
		})
		.await
	}

	/// Terminates the job as expired, recording the reason.
	pub async fn mark_timeout(
		&self,
		id: u64,
		message: impl Into<String>,
	) -> Result<Job, LedgerError> {
		let message = message.into();
		self.transition(id, JobStatus::Timeout, move |job| {
			job.error_message = Some(message);
		})
		.await
	}

	/// Applies a status transition after checking the lifecycle ordering.
	async fn transition<F>(&self, id: u64, to: JobStatus, apply: F) -> Result<Job, LedgerError>
	where
		F: FnOnce(&mut Job),
	{
		let mut job = self.backend.get(id).await?;

		if !job.status.can_transition_to(to) {
			return Err(LedgerError::InvalidTransition {
				job_id: id,
				from: job.status,
				to,
			});
		}

		apply(&mut job);
		job.status = to;
		job.updated_at = Utc::now();

		self.backend.update(&job).await?;
		Ok(job)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryJobStore;

	fn service() -> LedgerService {
		LedgerService::new(Box::new(MemoryJobStore::new()))
	}

	#[tokio::test]
	async fn test_job_ids_are_monotonic() {
		let ledger = service();
		let first = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		let second = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		assert!(second.id > first.id);
	}

	#[tokio::test]
	async fn test_full_lifecycle_to_done() {
		let ledger = service();
		let job = ledger.create_job(OperationKind::Transaction, Some("caller-1".into())).await.unwrap();

		ledger
			.mark_forged(job.id, "deadbeef".into(), Vec::new(), "ops-key".into())
			.await
			.unwrap();
		ledger.mark_signed(job.id).await.unwrap();
		let injected = ledger.mark_injected(job.id, "oo123".into()).await.unwrap();
		assert_eq!(injected.status, JobStatus::Injected);
		assert_eq!(injected.operation_hash.as_deref(), Some("oo123"));

		let done = ledger.mark_done(job.id).await.unwrap();
		assert_eq!(done.status, JobStatus::Done);
		// Hash survives terminal transition
		assert_eq!(done.operation_hash.as_deref(), Some("oo123"));
	}

	#[tokio::test]
	async fn test_regression_is_rejected() {
		let ledger = service();
		let job = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		ledger
			.mark_forged(job.id, "00".into(), Vec::new(), "k".into())
			.await
			.unwrap();
		ledger.mark_signed(job.id).await.unwrap();
		ledger.mark_injected(job.id, "oo1".into()).await.unwrap();

		// Injected -> Signed is a regression
		let err = ledger.mark_signed(job.id).await.unwrap_err();
		assert!(matches!(err, LedgerError::InvalidTransition { .. }));

		// The stored row is untouched
		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Injected);
	}

	#[tokio::test]
	async fn test_terminal_jobs_are_frozen() {
		let ledger = service();
		let job = ledger.create_job(OperationKind::Reveal, None).await.unwrap();
		ledger.mark_error(job.id, "unknown key").await.unwrap();

		let err = ledger.mark_done(job.id).await.unwrap_err();
		assert!(matches!(err, LedgerError::InvalidTransition { .. }));

		let stored = ledger.get(job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Error);
		assert_eq!(stored.error_message.as_deref(), Some("unknown key"));
	}

	#[tokio::test]
	async fn test_created_job_can_fail_before_forging() {
		let ledger = service();
		let job = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		let failed = ledger.mark_error(job.id, "batch too large").await.unwrap();

		assert_eq!(failed.status, JobStatus::Error);
		assert!(failed.raw_transaction.is_none());
		assert!(failed.operation_hash.is_none());
	}

	#[tokio::test]
	async fn test_select_injected_skips_rows_without_hash() {
		let ledger = service();
		let ok = ledger.create_job(OperationKind::Transaction, None).await.unwrap();
		ledger
			.mark_forged(ok.id, "00".into(), Vec::new(), "k".into())
			.await
			.unwrap();
		ledger.mark_signed(ok.id).await.unwrap();
		ledger.mark_injected(ok.id, "oo1".into()).await.unwrap();

		let pending = ledger.select_injected().await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].id, ok.id);
	}
}
