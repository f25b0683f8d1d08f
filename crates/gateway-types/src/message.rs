//! Broker message payloads for the transaction gateway.
//!
//! Every queue carries exactly one message shape; consumers decode into
//! these types and drop anything that does not parse. Field names stay in
//! camelCase on the wire for compatibility with existing publishers.

use crate::TransactionEntry;
use serde::{Deserialize, Serialize};

/// Request consumed by the send worker: forge, sign, and inject a batch
/// of transactions under a custody key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionsMessage {
	/// The batch to submit, one entry per contract call.
	pub transactions: Vec<TransactionEntry>,
	/// Name of the key-custody key that signs the batch.
	pub secure_key_name: String,
	/// Opaque client correlation string, echoed into the job record.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub caller_id: Option<String>,
	/// Identifier of the job row created for this request.
	pub job_id: u64,
}

/// Request consumed by the inject worker: broadcast a payload the client
/// signed locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectTransactionMessage {
	/// Identifier of the job row created for this request.
	pub job_id: u64,
	/// Hex-encoded forged transaction, as returned at forge time.
	pub signed_transaction: String,
	/// Detached signature over the forged bytes.
	pub signature: String,
}

/// Notification published to the broadcast exchange when a job fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotification {
	/// The failed job.
	pub job_id: u64,
	/// Human-readable failure reason, as recorded on the job row.
	pub error_message: String,
}

/// Notification published to the broadcast exchange when an operation
/// reaches its confirmation depth. One event per transaction entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationNotification {
	/// The confirmed job.
	pub job_id: u64,
	/// Target contract of the confirmed entry.
	pub contract_address: String,
	/// Entrypoint of the confirmed entry.
	pub entry_point: String,
	/// Correlation string supplied at submission, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub caller_id: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_send_message_wire_format_is_camel_case() {
		let msg = SendTransactionsMessage {
			transactions: vec![TransactionEntry {
				contract_address: "KT1abc".into(),
				entry_point: "transfer".into(),
				entry_point_params: Some(serde_json::json!({"to": "tz1xyz"})),
				amount: None,
				fee: None,
			}],
			secure_key_name: "ops-key".into(),
			caller_id: None,
			job_id: 7,
		};

		let json = serde_json::to_value(&msg).unwrap();
		assert_eq!(json["secureKeyName"], "ops-key");
		assert_eq!(json["jobId"], 7);
		assert_eq!(json["transactions"][0]["contractAddress"], "KT1abc");
	}

	#[test]
	fn test_inject_message_roundtrip() {
		let raw = r#"{"jobId":3,"signedTransaction":"deadbeef","signature":"edsig..."}"#;
		let msg: InjectTransactionMessage = serde_json::from_str(raw).unwrap();
		assert_eq!(msg.job_id, 3);
		assert_eq!(msg.signed_transaction, "deadbeef");
	}
}
