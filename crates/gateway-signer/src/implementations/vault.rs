//! Remote vault signer.
//!
//! Talks to a vault transit endpoint: keys live in the vault and never
//! leave it; the gateway sends a digest and receives a signature. Key
//! names are caller-supplied, so a missing key or a rejected request is a
//! client error, not a transient condition.

use crate::{append_signature, encode_public_key_hash, encode_signature, operation_digest};
use crate::{SignedOperation, Signer, SignerError};
use async_trait::async_trait;
use base64::Engine;
use gateway_config::VaultSignerConfig;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// Timeout applied to each vault request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Prefix the vault puts on transit signatures ("vault:v1:").
const VAULT_SIGNATURE_PREFIX: &str = "vault:v1:";

/// Signer backed by a remote vault transit API.
pub struct VaultSigner {
	api_url: String,
	token: String,
	client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
	data: SignData,
}

#[derive(Debug, Deserialize)]
struct SignData {
	signature: String,
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
	data: KeyData,
}

#[derive(Debug, Deserialize)]
struct KeyData {
	/// Key versions by version number; the latest version signs.
	keys: BTreeMap<String, KeyVersion>,
}

#[derive(Debug, Deserialize)]
struct KeyVersion {
	public_key: String,
}

impl VaultSigner {
	/// Creates a signer for the configured vault.
	pub fn new(config: &VaultSignerConfig) -> Result<Self, SignerError> {
		let client = reqwest::Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| SignerError::Network(e.to_string()))?;

		Ok(Self {
			api_url: config.api_url.trim_end_matches('/').to_string(),
			token: config.token.clone(),
			client,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}/{}", self.api_url, path)
	}

	/// Maps a vault response, treating 404 as an unknown key and any
	/// other client error as a signing rejection.
	async fn expect_success(
		response: reqwest::Response,
		key_name: &str,
	) -> Result<reqwest::Response, SignerError> {
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}

		let body = response.text().await.unwrap_or_default();
		if status == reqwest::StatusCode::NOT_FOUND {
			return Err(SignerError::KeyNotFound(key_name.to_string()));
		}
		if status.is_client_error() {
			return Err(SignerError::SigningFailed {
				key: key_name.to_string(),
				reason: body.trim().to_string(),
			});
		}
		Err(SignerError::Network(format!("{}: {}", status, body.trim())))
	}
}

#[async_trait]
impl Signer for VaultSigner {
	async fn sign(
		&self,
		forged_hex: &str,
		key_name: &str,
	) -> Result<SignedOperation, SignerError> {
		let digest = operation_digest(forged_hex)?;
		let input = base64::engine::general_purpose::STANDARD.encode(digest);

		let response = self
			.client
			.post(self.url(&format!("transit/sign/{}", key_name)))
			.header("X-Vault-Token", &self.token)
			.json(&json!({ "input": input }))
			.send()
			.await
			.map_err(|e| SignerError::Network(e.to_string()))?;

		let signed: SignResponse = Self::expect_success(response, key_name)
			.await?
			.json()
			.await
			.map_err(|e| SignerError::Network(e.to_string()))?;

		let encoded = signed
			.data
			.signature
			.strip_prefix(VAULT_SIGNATURE_PREFIX)
			.ok_or_else(|| SignerError::SigningFailed {
				key: key_name.to_string(),
				reason: format!("unexpected signature format '{}'", signed.data.signature),
			})?;
		let raw = base64::engine::general_purpose::STANDARD
			.decode(encoded)
			.map_err(|e| SignerError::SigningFailed {
				key: key_name.to_string(),
				reason: e.to_string(),
			})?;
		let raw: [u8; 64] = raw.try_into().map_err(|_| SignerError::SigningFailed {
			key: key_name.to_string(),
			reason: "signature is not 64 bytes".into(),
		})?;

		Ok(SignedOperation {
			signed_bytes: append_signature(forged_hex, &raw),
			signature: encode_signature(&raw),
		})
	}

	async fn public_key_hash(&self, key_name: &str) -> Result<String, SignerError> {
		let response = self
			.client
			.get(self.url(&format!("transit/keys/{}", key_name)))
			.header("X-Vault-Token", &self.token)
			.send()
			.await
			.map_err(|e| SignerError::Network(e.to_string()))?;

		let key: KeyResponse = Self::expect_success(response, key_name)
			.await?
			.json()
			.await
			.map_err(|e| SignerError::Network(e.to_string()))?;

		// Versions are numbered; the newest one is the active key
		let latest = key
			.data
			.keys
			.iter()
			.max_by_key(|(version, _)| version.parse::<u64>().unwrap_or(0))
			.map(|(_, key_version)| key_version)
			.ok_or_else(|| SignerError::KeyNotFound(key_name.to_string()))?;

		let public_key = base64::engine::general_purpose::STANDARD
			.decode(&latest.public_key)
			.map_err(|e| SignerError::InvalidKey(e.to_string()))?;
		let public_key: [u8; 32] = public_key
			.try_into()
			.map_err(|_| SignerError::InvalidKey("public key is not 32 bytes".into()))?;

		Ok(encode_public_key_hash(&public_key))
	}
}
