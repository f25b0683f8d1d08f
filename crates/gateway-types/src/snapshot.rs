//! Normalized indexer query results.

use serde::{Deserialize, Serialize};

/// The normalized outcome of asking an indexer about one operation hash.
///
/// A snapshot is produced fresh on every reconciliation pass and never
/// cached across polls; an indexer's view of a pending operation can change
/// between passes (an operation may drop out of its pending set entirely).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStatusSnapshot {
	/// Whether any indexer knows the operation.
	pub found: bool,
	/// Whether the indexer reports the operation as applied.
	pub applied: bool,
	/// The raw status string the indexer reported, before normalization.
	pub chain_status: String,
	/// Block level the operation was included at, when known.
	pub block_level: Option<u64>,
	/// Chain-provided failure reason, when the operation failed.
	pub reason: Option<String>,
}

impl OperationStatusSnapshot {
	/// Snapshot for an operation no configured indexer could resolve.
	/// The reconciler treats this as inconclusive, not as an error.
	pub fn not_found() -> Self {
		Self {
			found: false,
			applied: false,
			chain_status: String::new(),
			block_level: None,
			reason: None,
		}
	}

	/// Snapshot for an operation reported as applied at `block_level`.
	pub fn applied(chain_status: impl Into<String>, block_level: u64) -> Self {
		Self {
			found: true,
			applied: true,
			chain_status: chain_status.into(),
			block_level: Some(block_level),
			reason: None,
		}
	}

	/// Snapshot for an operation the chain rejected.
	pub fn failed(chain_status: impl Into<String>, reason: Option<String>) -> Self {
		Self {
			found: true,
			applied: false,
			chain_status: chain_status.into(),
			block_level: None,
			reason,
		}
	}
}
