//! In-memory ed25519 signer.
//!
//! Holds signing keys directly in process memory, keyed by custody key
//! name. Used for development and tests; production deployments point the
//! gateway at the vault implementation instead.

use crate::{append_signature, encode_public_key_hash, encode_signature, operation_digest};
use crate::{SignedOperation, Signer, SignerError};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use gateway_config::LocalSignerConfig;
use std::collections::HashMap;

/// Signer backed by in-memory ed25519 keys.
pub struct LocalSigner {
	keys: HashMap<String, SigningKey>,
}

impl LocalSigner {
	/// Builds the signer from hex-encoded secret keys.
	pub fn from_config(config: &LocalSignerConfig) -> Result<Self, SignerError> {
		let mut keys = HashMap::new();
		for (name, secret_hex) in &config.keys {
			let secret = hex::decode(secret_hex)
				.map_err(|e| SignerError::InvalidKey(format!("key '{}': {}", name, e)))?;
			let secret: [u8; 32] = secret.try_into().map_err(|_| {
				SignerError::InvalidKey(format!("key '{}': expected 32 bytes", name))
			})?;
			keys.insert(name.clone(), SigningKey::from_bytes(&secret));
		}
		Ok(Self { keys })
	}

	fn key(&self, key_name: &str) -> Result<&SigningKey, SignerError> {
		self.keys
			.get(key_name)
			.ok_or_else(|| SignerError::KeyNotFound(key_name.to_string()))
	}
}

#[async_trait]
impl Signer for LocalSigner {
	async fn sign(
		&self,
		forged_hex: &str,
		key_name: &str,
	) -> Result<SignedOperation, SignerError> {
		let key = self.key(key_name)?;
		let digest = operation_digest(forged_hex)?;

		let raw = key.sign(&digest).to_bytes();

		Ok(SignedOperation {
			signed_bytes: append_signature(forged_hex, &raw),
			signature: encode_signature(&raw),
		})
	}

	async fn public_key_hash(&self, key_name: &str) -> Result<String, SignerError> {
		let key = self.key(key_name)?;
		Ok(encode_public_key_hash(&key.verifying_key().to_bytes()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn signer() -> LocalSigner {
		let mut keys = HashMap::new();
		keys.insert(
			"admin".to_string(),
			"9d6ed2074ae1f0c8d1f4a915c3a1b9bb57a10b50b1a949bbcbb68f86d45ba621".to_string(),
		);
		LocalSigner::from_config(&LocalSignerConfig { keys }).unwrap()
	}

	#[tokio::test]
	async fn test_sign_appends_signature_to_forged_bytes() {
		let signer = signer();
		let forged = "a1b2c3d4";

		let signed = signer.sign(forged, "admin").await.unwrap();

		assert!(signed.signed_bytes.starts_with(forged));
		// 64-byte ed25519 signature appended as hex
		assert_eq!(signed.signed_bytes.len(), forged.len() + 128);
		assert!(signed.signature.starts_with("edsig"));
	}

	#[tokio::test]
	async fn test_signing_is_deterministic() {
		let signer = signer();
		let first = signer.sign("00ff", "admin").await.unwrap();
		let second = signer.sign("00ff", "admin").await.unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_unknown_key_is_reported() {
		let signer = signer();
		let err = signer.sign("00", "missing-key").await.unwrap_err();
		assert!(matches!(err, SignerError::KeyNotFound(name) if name == "missing-key"));
	}

	#[tokio::test]
	async fn test_public_key_hash_is_stable_tz1() {
		let signer = signer();
		let first = signer.public_key_hash("admin").await.unwrap();
		let second = signer.public_key_hash("admin").await.unwrap();
		assert_eq!(first, second);
		assert!(first.starts_with("tz1"));
	}

	#[test]
	fn test_malformed_secret_rejected() {
		let mut keys = HashMap::new();
		keys.insert("short".to_string(), "abcd".to_string());
		let err = match LocalSigner::from_config(&LocalSignerConfig { keys }) {
			Ok(_) => panic!("expected from_config to reject malformed secret"),
			Err(e) => e,
		};
		assert!(matches!(err, SignerError::InvalidKey(_)));
	}
}
