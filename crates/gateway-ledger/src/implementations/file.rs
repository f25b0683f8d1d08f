//! File-based ledger backend.
//!
//! Persists each job row as a JSON file under a base directory, written
//! atomically via a temp-file rename. Identifier assignment scans the
//! directory once at startup and continues from the highest existing id.

use crate::{JobStore, LedgerError};
use async_trait::async_trait;
use gateway_types::{Job, JobStatus};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// File-backed job store.
pub struct FileJobStore {
	/// Base directory holding one `<id>.json` per job.
	base_path: PathBuf,
	/// Next identifier to hand out.
	next_id: AtomicU64,
}

impl FileJobStore {
	/// Opens (or creates) a store rooted at `base_path`, resuming the id
	/// sequence from the rows already on disk.
	pub async fn open(base_path: PathBuf) -> Result<Self, LedgerError> {
		fs::create_dir_all(&base_path)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;

		let mut max_id = 0u64;
		let mut entries = fs::read_dir(&base_path)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				continue;
			}
			if let Some(id) = path
				.file_stem()
				.and_then(|stem| stem.to_str())
				.and_then(|stem| stem.parse::<u64>().ok())
			{
				max_id = max_id.max(id);
			}
		}

		Ok(Self {
			base_path,
			next_id: AtomicU64::new(max_id + 1),
		})
	}

	fn row_path(&self, id: u64) -> PathBuf {
		self.base_path.join(format!("{}.json", id))
	}

	async fn write_row(&self, job: &Job) -> Result<(), LedgerError> {
		let bytes =
			serde_json::to_vec(job).map_err(|e| LedgerError::Serialization(e.to_string()))?;
		let path = self.row_path(job.id);

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, bytes)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;

		Ok(())
	}
}

#[async_trait]
impl JobStore for FileJobStore {
	async fn insert(&self, job: Job) -> Result<Job, LedgerError> {
		self.write_row(&job).await?;
		Ok(job)
	}

	async fn get(&self, id: u64) -> Result<Job, LedgerError> {
		let data = match fs::read(self.row_path(id)).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(LedgerError::NotFound(id))
			},
			Err(e) => return Err(LedgerError::Backend(e.to_string())),
		};
		serde_json::from_slice(&data).map_err(|e| LedgerError::Serialization(e.to_string()))
	}

	async fn select_by_status(&self, status: JobStatus) -> Result<Vec<Job>, LedgerError> {
		let mut jobs = Vec::new();
		let mut entries = fs::read_dir(&self.base_path)
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?;

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| LedgerError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				continue;
			}
			match fs::read(&path).await {
				Ok(data) => match serde_json::from_slice::<Job>(&data) {
					Ok(job) if job.status == status => jobs.push(job),
					Ok(_) => {},
					Err(e) => {
						tracing::warn!(?path, error = %e, "Skipping unreadable job row");
					},
				},
				Err(e) => {
					tracing::warn!(?path, error = %e, "Skipping unreadable job row");
				},
			}
		}

		jobs.sort_by_key(|job| job.id);
		Ok(jobs)
	}

	async fn update(&self, job: &Job) -> Result<(), LedgerError> {
		if !self.row_path(job.id).exists() {
			return Err(LedgerError::NotFound(job.id));
		}
		self.write_row(job).await
	}

	async fn next_id(&self) -> Result<u64, LedgerError> {
		Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gateway_types::OperationKind;

	#[tokio::test]
	async fn test_rows_survive_reopen() {
		let dir = tempfile::tempdir().unwrap();

		{
			let store = FileJobStore::open(dir.path().to_path_buf()).await.unwrap();
			let id = store.next_id().await.unwrap();
			store
				.insert(Job::new(id, OperationKind::Transaction, None))
				.await
				.unwrap();
		}

		let reopened = FileJobStore::open(dir.path().to_path_buf()).await.unwrap();
		let job = reopened.get(1).await.unwrap();
		assert_eq!(job.status, JobStatus::Created);

		// Id sequence resumes past existing rows
		assert_eq!(reopened.next_id().await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_select_by_status_filters() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileJobStore::open(dir.path().to_path_buf()).await.unwrap();

		let id = store.next_id().await.unwrap();
		let mut job = Job::new(id, OperationKind::Transaction, None);
		store.insert(job.clone()).await.unwrap();

		job.status = JobStatus::Injected;
		job.operation_hash = Some("oo1".into());
		store.update(&job).await.unwrap();

		assert!(store
			.select_by_status(JobStatus::Created)
			.await
			.unwrap()
			.is_empty());
		let injected = store.select_by_status(JobStatus::Injected).await.unwrap();
		assert_eq!(injected.len(), 1);
		assert_eq!(injected[0].operation_hash.as_deref(), Some("oo1"));
	}

	#[tokio::test]
	async fn test_get_missing_row() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileJobStore::open(dir.path().to_path_buf()).await.unwrap();
		assert!(matches!(store.get(99).await, Err(LedgerError::NotFound(99))));
	}
}
