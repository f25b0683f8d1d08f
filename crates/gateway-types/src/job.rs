//! Job lifecycle types for the transaction gateway.
//!
//! A job is the client-visible unit of work tracking one batch of
//! transactions from creation to chain finality or failure. Jobs advance
//! through a fixed pipeline (forge, sign, inject, confirm) and never move
//! backwards; the ledger enforces the ordering declared here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job.
///
/// States form a strict partial order: `Created < Forged < Signed <
/// Injected < {Done, Error, Timeout}`. The three final states are terminal
/// and mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	/// The job row exists but no work has been performed yet.
	Created,
	/// The wire-format transaction bytes have been built and persisted.
	Forged,
	/// The forged bytes have been signed by the key-custody capability.
	Signed,
	/// The signed operation has been accepted by a node; an operation
	/// hash is available.
	Injected,
	/// The operation reached the configured confirmation depth.
	Done,
	/// A step failed terminally; `error_message` carries the reason.
	Error,
	/// The operation never appeared on any indexer before the expiration
	/// window elapsed.
	Timeout,
}

impl JobStatus {
	/// Position of this state in the lifecycle ordering. Terminal states
	/// share a rank because no ordering exists between them.
	fn rank(&self) -> u8 {
		match self {
			JobStatus::Created => 0,
			JobStatus::Forged => 1,
			JobStatus::Signed => 2,
			JobStatus::Injected => 3,
			JobStatus::Done | JobStatus::Error | JobStatus::Timeout => 4,
		}
	}

	/// Returns true if this state is final.
	pub fn is_terminal(&self) -> bool {
		self.rank() == 4
	}

	/// Returns true if a job may move from this state to `next`.
	///
	/// Any strictly forward move is allowed (a job can jump from
	/// `Created` straight to `Error` when batch validation fails before
	/// forging); terminal states accept no successor.
	pub fn can_transition_to(&self, next: JobStatus) -> bool {
		!self.is_terminal() && next.rank() > self.rank()
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			JobStatus::Created => "created",
			JobStatus::Forged => "forged",
			JobStatus::Signed => "signed",
			JobStatus::Injected => "injected",
			JobStatus::Done => "done",
			JobStatus::Error => "error",
			JobStatus::Timeout => "timeout",
		};
		write!(f, "{}", s)
	}
}

/// Kind of chain operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
	/// A smart-contract call or transfer.
	Transaction,
	/// A public-key reveal for a fresh account.
	Reveal,
}

/// One contract call inside a job's batch.
///
/// Entries are supplied by the client at submission time and are immutable
/// once the owning job leaves `Created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
	/// Address of the target smart contract.
	pub contract_address: String,
	/// Name of the entrypoint to invoke.
	pub entry_point: String,
	/// Structured entrypoint parameters, passed through verbatim.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub entry_point_params: Option<serde_json::Value>,
	/// Optional value transfer in mutez.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub amount: Option<u64>,
	/// Optional explicit fee override in mutez.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fee: Option<u64>,
}

/// A client-visible unit of work: one batch of transactions tracked from
/// creation to finality or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
	/// Monotonically assigned identifier, generated by the ledger at
	/// creation.
	pub id: u64,
	/// Current lifecycle state.
	pub status: JobStatus,
	/// Kind of operation this job performs.
	pub operation_kind: OperationKind,
	/// Hex-encoded wire-format bytes; set when the job reaches `Forged`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub raw_transaction: Option<String>,
	/// Chain-assigned operation identifier; set when the job reaches
	/// `Injected`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub operation_hash: Option<String>,
	/// Failure reason, set only on `Error` or `Timeout`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	/// Opaque client-supplied correlation string.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub caller_id: Option<String>,
	/// The batch this job submits. Populated when the send worker picks
	/// the job up; immutable afterwards.
	#[serde(default)]
	pub transactions: Vec<TransactionEntry>,
	/// Name of the custody key used to sign this job, kept so an expired
	/// job can be re-enqueued.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub secure_key_name: Option<String>,
	/// Number of times this job has been re-enqueued after expiring.
	#[serde(default)]
	pub retry_count: u32,
	/// Creation timestamp.
	pub created_at: DateTime<Utc>,
	/// Timestamp of the last state transition.
	pub updated_at: DateTime<Utc>,
}

impl Job {
	/// Creates a fresh job in `Created` with the given kind.
	pub fn new(id: u64, operation_kind: OperationKind, caller_id: Option<String>) -> Self {
		let now = Utc::now();
		Self {
			id,
			status: JobStatus::Created,
			operation_kind,
			raw_transaction: None,
			operation_hash: None,
			error_message: None,
			caller_id,
			transactions: Vec::new(),
			secure_key_name: None,
			retry_count: 0,
			created_at: now,
			updated_at: now,
		}
	}
}
