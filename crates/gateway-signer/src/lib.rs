//! Signing module for the Tezos transaction gateway.
//!
//! Key custody is an opaque capability: "sign these bytes under key K".
//! Two implementations exist and are selected once at construction time:
//! a remote vault holding production keys, and a local in-memory signer
//! for development and tests. Signing failures are client-attributable
//! (the key name comes from the caller) and are never retried.

use async_trait::async_trait;
use gateway_config::SignerConfig;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
	pub mod vault;
}

/// Base58check prefix for tz1 addresses.
const TZ1_PREFIX: [u8; 3] = [6, 161, 159];
/// Base58check prefix for ed25519 signatures.
const EDSIG_PREFIX: [u8; 5] = [9, 245, 205, 134, 18];
/// Watermark byte prepended to generic operations before signing.
const OPERATION_WATERMARK: u8 = 0x03;

/// Errors that can occur during signing operations.
#[derive(Debug, Error)]
pub enum SignerError {
	/// Error that occurs when the named key does not exist.
	#[error("Key '{0}' not found")]
	KeyNotFound(String),
	/// Error that occurs when the custody service rejects a signing
	/// request.
	#[error("Signing failed for key '{key}': {reason}")]
	SigningFailed { key: String, reason: String },
	/// Error that occurs when key material is malformed.
	#[error("Invalid key material: {0}")]
	InvalidKey(String),
	/// Error that occurs during network communication with the custody
	/// service.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when the payload to sign is not valid hex.
	#[error("Invalid payload: {0}")]
	InvalidPayload(String),
}

/// A signed operation, ready for injection.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedOperation {
	/// Hex of the forged bytes with the raw signature appended; this is
	/// what gets injected.
	pub signed_bytes: String,
	/// The detached signature in base58check (edsig) form.
	pub signature: String,
}

/// Trait defining the key-custody capability.
#[async_trait]
pub trait Signer: Send + Sync {
	/// Signs forged operation bytes (hex) under the named key.
	async fn sign(&self, forged_hex: &str, key_name: &str)
		-> Result<SignedOperation, SignerError>;

	/// Returns the tz1 address of the named key.
	async fn public_key_hash(&self, key_name: &str) -> Result<String, SignerError>;
}

/// Service wrapping the signer implementation selected at construction.
pub struct SignerService {
	implementation: Box<dyn Signer>,
}

impl SignerService {
	/// Creates a service over an explicit implementation.
	pub fn new(implementation: Box<dyn Signer>) -> Self {
		Self { implementation }
	}

	/// Builds the configured implementation: "vault" or "local".
	pub fn from_config(config: &SignerConfig) -> Result<Self, SignerError> {
		let implementation: Box<dyn Signer> = match config.primary.as_str() {
			"vault" => {
				let vault = config.vault.as_ref().ok_or_else(|| {
					SignerError::InvalidKey("vault signer selected without configuration".into())
				})?;
				Box::new(implementations::vault::VaultSigner::new(vault)?)
			},
			"local" => {
				let local = config.local.as_ref().ok_or_else(|| {
					SignerError::InvalidKey("local signer selected without keys".into())
				})?;
				Box::new(implementations::local::LocalSigner::from_config(local)?)
			},
			other => {
				return Err(SignerError::InvalidKey(format!(
					"unknown signer implementation '{}'",
					other
				)))
			},
		};

		Ok(Self::new(implementation))
	}

	/// Signs forged operation bytes under the named key.
	pub async fn sign(
		&self,
		forged_hex: &str,
		key_name: &str,
	) -> Result<SignedOperation, SignerError> {
		self.implementation.sign(forged_hex, key_name).await
	}

	/// Returns the tz1 address of the named key.
	pub async fn public_key_hash(&self, key_name: &str) -> Result<String, SignerError> {
		self.implementation.public_key_hash(key_name).await
	}
}

/// Digest signed by every implementation: watermark byte plus the forged
/// bytes, hashed once.
pub(crate) fn operation_digest(forged_hex: &str) -> Result<[u8; 32], SignerError> {
	let bytes = hex::decode(forged_hex).map_err(|e| SignerError::InvalidPayload(e.to_string()))?;

	let mut hasher = Sha256::new();
	hasher.update([OPERATION_WATERMARK]);
	hasher.update(&bytes);
	Ok(hasher.finalize().into())
}

/// Encodes a raw 64-byte signature as base58check with the edsig prefix.
pub(crate) fn encode_signature(raw: &[u8; 64]) -> String {
	let mut payload = Vec::with_capacity(EDSIG_PREFIX.len() + raw.len());
	payload.extend_from_slice(&EDSIG_PREFIX);
	payload.extend_from_slice(raw);
	bs58::encode(payload).with_check().into_string()
}

/// Derives the tz1 address for an ed25519 public key.
pub(crate) fn encode_public_key_hash(public_key: &[u8; 32]) -> String {
	let digest = Sha256::digest(public_key);

	let mut payload = Vec::with_capacity(TZ1_PREFIX.len() + 20);
	payload.extend_from_slice(&TZ1_PREFIX);
	payload.extend_from_slice(&digest[..20]);
	bs58::encode(payload).with_check().into_string()
}

/// Assembles the injectable payload from forged bytes and a raw
/// signature.
pub(crate) fn append_signature(forged_hex: &str, raw: &[u8; 64]) -> String {
	format!("{}{}", forged_hex, hex::encode(raw))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_operation_digest_rejects_bad_hex() {
		let err = operation_digest("not-hex").unwrap_err();
		assert!(matches!(err, SignerError::InvalidPayload(_)));
	}

	#[test]
	fn test_encoded_signature_has_edsig_prefix() {
		let encoded = encode_signature(&[7u8; 64]);
		assert!(encoded.starts_with("edsig"));
	}

	#[test]
	fn test_public_key_hash_has_tz1_prefix() {
		let encoded = encode_public_key_hash(&[9u8; 32]);
		assert!(encoded.starts_with("tz1"));
	}
}
