//! In-memory ledger backend.
//!
//! Stores job rows in a HashMap behind a read-write lock. Rows do not
//! survive a restart; this backend exists for tests, development, and
//! single-process deployments where durability is delegated elsewhere.

use crate::{JobStore, LedgerError};
use async_trait::async_trait;
use gateway_types::{Job, JobStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory job store.
///
/// Clones share the same rows and id sequence, which lets tests keep a
/// handle on a store they hand to a service.
#[derive(Clone)]
pub struct MemoryJobStore {
	/// The job rows protected by a read-write lock.
	rows: Arc<RwLock<HashMap<u64, Job>>>,
	/// Next identifier to hand out.
	next_id: Arc<AtomicU64>,
}

impl MemoryJobStore {
	/// Creates a new empty MemoryJobStore.
	pub fn new() -> Self {
		Self {
			rows: Arc::new(RwLock::new(HashMap::new())),
			next_id: Arc::new(AtomicU64::new(1)),
		}
	}
}

impl Default for MemoryJobStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl JobStore for MemoryJobStore {
	async fn insert(&self, job: Job) -> Result<Job, LedgerError> {
		let mut rows = self.rows.write().await;
		rows.insert(job.id, job.clone());
		Ok(job)
	}

	async fn get(&self, id: u64) -> Result<Job, LedgerError> {
		let rows = self.rows.read().await;
		rows.get(&id).cloned().ok_or(LedgerError::NotFound(id))
	}

	async fn select_by_status(&self, status: JobStatus) -> Result<Vec<Job>, LedgerError> {
		let rows = self.rows.read().await;
		let mut jobs: Vec<Job> = rows
			.values()
			.filter(|job| job.status == status)
			.cloned()
			.collect();
		jobs.sort_by_key(|job| job.id);
		Ok(jobs)
	}

	async fn update(&self, job: &Job) -> Result<(), LedgerError> {
		let mut rows = self.rows.write().await;
		if !rows.contains_key(&job.id) {
			return Err(LedgerError::NotFound(job.id));
		}
		rows.insert(job.id, job.clone());
		Ok(())
	}

	async fn next_id(&self) -> Result<u64, LedgerError> {
		Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
	}
}
