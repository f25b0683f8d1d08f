//! Configuration module for the Tezos transaction gateway.
//!
//! Configuration is loaded from TOML files with `${ENV_VAR}` resolution and
//! validated before any component starts. Every component receives the
//! sections it needs by reference at construction time; there is no ambient
//! or global lookup.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the gateway.
///
/// Contains all sections required by the gateway processes: instance
/// identity, node pool, indexer pool, broker, signer, ledger, worker, and
/// reconciler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this gateway instance.
	pub gateway: GatewayConfig,
	/// Configuration for the RPC node pool.
	pub node: NodeConfig,
	/// Configuration for the indexer pool.
	pub indexer: IndexerPoolConfig,
	/// Configuration for the message broker.
	pub broker: BrokerConfig,
	/// Configuration for the signing capability.
	pub signer: SignerConfig,
	/// Configuration for the job ledger backend.
	pub ledger: LedgerConfig,
	/// Configuration for the signing/injection workers.
	#[serde(default)]
	pub worker: WorkerConfig,
	/// Configuration for the confirmation reconciler.
	#[serde(default)]
	pub reconciler: ReconcilerConfig,
}

/// Identity settings for a gateway instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
	/// Unique identifier for this gateway instance.
	pub id: String,
}

/// Configuration for the RPC node pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
	/// The configured node endpoints. Selection picks uniformly at random
	/// from this full set on every call.
	pub endpoints: Vec<NodeEndpointConfig>,
	/// Timeout applied to each individual RPC request.
	#[serde(default = "default_request_timeout")]
	pub request_timeout_seconds: u64,
	/// Deadline for the healthy-node search loop as a whole.
	#[serde(default = "default_selection_timeout")]
	pub selection_timeout_seconds: u64,
}

/// One RPC node endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeEndpointConfig {
	/// Short name used in logs and in the eviction exclusion list.
	pub name: String,
	/// Base URL of the node's RPC interface.
	pub url: String,
	/// Whether this node accepts mempool eviction requests. Nodes that do
	/// not are never selected as eviction targets.
	#[serde(default = "default_true")]
	pub supports_eviction: bool,
}

/// Configuration for the indexer pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerPoolConfig {
	/// Number of adapter attempts before a query is declared inconclusive.
	#[serde(default = "default_nb_of_retry")]
	pub nb_of_retry: u32,
	/// The configured indexer endpoints with their field mappings.
	pub endpoints: Vec<IndexerEndpointConfig>,
}

/// Where the operation object lives in an indexer response: either an
/// array index or an object key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OperationLocator {
	/// The response is an array; take the element at this index.
	Index(usize),
	/// The response is an object; take the value under this key.
	Key(String),
}

/// One indexer endpoint plus the field-mapping descriptor that lets
/// heterogeneous explorers be queried through one normalized interface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerEndpointConfig {
	/// Short name used in logs.
	pub name: String,
	/// Base URL of the indexer API.
	pub api_url: String,
	/// Path fragment appended before the operation hash.
	pub path_to_operation: String,
	/// Optional path fragment for contract-call listings.
	#[serde(default)]
	pub path_to_contract_calls: Option<String>,
	/// Where the operation object sits in the response body.
	pub key_to_operation: OperationLocator,
	/// JSON key holding the operation status string.
	pub key_to_status: String,
	/// JSON key holding the inclusion block level.
	pub key_to_block_level: String,
	/// Status string value that means the operation was applied.
	pub success_status: String,
}

/// Configuration for the message broker client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
	/// Broker server URL.
	pub url: String,
	/// Name of the durable stream all gateway subjects live on.
	#[serde(default = "default_stream")]
	pub stream: String,
	/// Subject the send worker consumes.
	#[serde(default = "default_send_subject")]
	pub send_subject: String,
	/// Subject the inject worker consumes.
	#[serde(default = "default_inject_subject")]
	pub inject_subject: String,
	/// Broadcast subject for error notifications.
	#[serde(default = "default_error_subject")]
	pub error_subject: String,
	/// Broadcast subject for confirmation notifications.
	#[serde(default = "default_confirmation_subject")]
	pub confirmation_subject: String,
}

/// Configuration for the signing capability.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignerConfig {
	/// Which implementation to use: "vault" or "local".
	pub primary: String,
	/// Remote vault settings, required when primary is "vault".
	#[serde(default)]
	pub vault: Option<VaultSignerConfig>,
	/// Local in-memory keys, required when primary is "local".
	#[serde(default)]
	pub local: Option<LocalSignerConfig>,
}

/// Remote key-custody service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultSignerConfig {
	/// Base URL of the vault API.
	pub api_url: String,
	/// Access token sent with every request.
	pub token: String,
}

/// In-memory signing keys, keyed by custody key name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalSignerConfig {
	/// Map of key name to hex-encoded ed25519 secret key.
	pub keys: std::collections::HashMap<String, String>,
}

/// Configuration for the job ledger backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which backend to use: "memory" or "file".
	pub backend: String,
	/// Base directory for the file backend.
	#[serde(default)]
	pub path: Option<String>,
}

/// Configuration for the signing/injection workers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
	/// Largest batch a single job may carry; larger batches are rejected
	/// as a client error before any forging happens.
	#[serde(default = "default_max_operations_per_batch")]
	pub max_operations_per_batch: usize,
	/// How many times an expired job may be re-enqueued. Zero disables
	/// re-enqueueing.
	#[serde(default)]
	pub max_retry: u32,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			max_operations_per_batch: default_max_operations_per_batch(),
			max_retry: 0,
		}
	}
}

/// Configuration for the confirmation reconciler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerConfig {
	/// Confirmation depth required before a job is marked done.
	#[serde(default = "default_nb_of_confirmation")]
	pub nb_of_confirmation: u64,
	/// Minutes after creation before an unobserved operation expires.
	#[serde(default = "default_expiration_timeout")]
	pub operation_expiration_timeout_minutes: u64,
	/// Seconds between reconciliation passes.
	#[serde(default = "default_poll_interval")]
	pub poll_interval_seconds: u64,
}

impl Default for ReconcilerConfig {
	fn default() -> Self {
		Self {
			nb_of_confirmation: default_nb_of_confirmation(),
			operation_expiration_timeout_minutes: default_expiration_timeout(),
			poll_interval_seconds: default_poll_interval(),
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_request_timeout() -> u64 {
	10
}

fn default_selection_timeout() -> u64 {
	30
}

fn default_nb_of_retry() -> u32 {
	3
}

fn default_stream() -> String {
	"gateway".to_string()
}

fn default_send_subject() -> String {
	"gateway.send-transactions".to_string()
}

fn default_inject_subject() -> String {
	"gateway.inject-transaction".to_string()
}

fn default_error_subject() -> String {
	"gateway.notifications.errors".to_string()
}

fn default_confirmation_subject() -> String {
	"gateway.notifications.confirmations".to_string()
}

fn default_max_operations_per_batch() -> usize {
	5
}

fn default_nb_of_confirmation() -> u64 {
	1
}

fn default_expiration_timeout() -> u64 {
	8
}

fn default_poll_interval() -> u64 {
	60
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size so pathological files cannot stall the regex
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a TOML file, resolving environment
	/// variables and validating the result.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let raw = tokio::fs::read_to_string(path).await?;
		raw.parse()
	}

	/// Validates the configuration to ensure all required fields are
	/// properly set before any component is constructed.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.gateway.id.is_empty() {
			return Err(ConfigError::Validation("Gateway id cannot be empty".into()));
		}

		// Node pool
		if self.node.endpoints.is_empty() {
			return Err(ConfigError::Validation(
				"At least one node endpoint must be configured".into(),
			));
		}
		for endpoint in &self.node.endpoints {
			if endpoint.url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Node endpoint '{}' must have a url",
					endpoint.name
				)));
			}
		}
		if self.node.selection_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"node.selection_timeout_seconds must be greater than 0".into(),
			));
		}

		// Indexer pool
		if self.indexer.endpoints.is_empty() {
			return Err(ConfigError::Validation(
				"At least one indexer endpoint must be configured".into(),
			));
		}
		if self.indexer.nb_of_retry == 0 {
			return Err(ConfigError::Validation(
				"indexer.nb_of_retry must be at least 1".into(),
			));
		}
		for endpoint in &self.indexer.endpoints {
			if endpoint.api_url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Indexer endpoint '{}' must have an api_url",
					endpoint.name
				)));
			}
			if endpoint.success_status.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Indexer endpoint '{}' must declare its success status value",
					endpoint.name
				)));
			}
		}

		// Broker
		if self.broker.url.is_empty() {
			return Err(ConfigError::Validation("Broker url cannot be empty".into()));
		}

		// Signer
		match self.signer.primary.as_str() {
			"vault" => {
				if self.signer.vault.is_none() {
					return Err(ConfigError::Validation(
						"signer.primary is 'vault' but [signer.vault] is missing".into(),
					));
				}
			},
			"local" => {
				let keys_present = self
					.signer
					.local
					.as_ref()
					.is_some_and(|local| !local.keys.is_empty());
				if !keys_present {
					return Err(ConfigError::Validation(
						"signer.primary is 'local' but [signer.local] has no keys".into(),
					));
				}
			},
			other => {
				return Err(ConfigError::Validation(format!(
					"Unknown signer implementation '{}'",
					other
				)));
			},
		}

		// Ledger
		match self.ledger.backend.as_str() {
			"memory" => {},
			"file" => {
				if self.ledger.path.is_none() {
					return Err(ConfigError::Validation(
						"ledger.backend is 'file' but ledger.path is missing".into(),
					));
				}
			},
			other => {
				return Err(ConfigError::Validation(format!(
					"Unknown ledger backend '{}'",
					other
				)));
			},
		}

		// Worker and reconciler bounds
		if self.worker.max_operations_per_batch == 0 {
			return Err(ConfigError::Validation(
				"worker.max_operations_per_batch must be at least 1".into(),
			));
		}
		if self.reconciler.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"reconciler.poll_interval_seconds must be greater than 0".into(),
			));
		}
		if self.reconciler.operation_expiration_timeout_minutes == 0 {
			return Err(ConfigError::Validation(
				"reconciler.operation_expiration_timeout_minutes must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string, resolving environment
/// variables and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_config() -> String {
		r#"
[gateway]
id = "test-gateway"

[node]
[[node.endpoints]]
name = "main"
url = "http://localhost:8732"

[[node.endpoints]]
name = "backup"
url = "http://localhost:8733"
supports_eviction = false

[indexer]
[[indexer.endpoints]]
name = "tzkt"
api_url = "http://localhost:5000/v1/operations/"
path_to_operation = ""
key_to_operation = 0
key_to_status = "status"
key_to_block_level = "level"
success_status = "applied"

[broker]
url = "nats://localhost:4222"

[signer]
primary = "local"
[signer.local.keys]
admin = "9d6ed2074ae1f0c8d1f4a915c3a1b9bb57a10b50b1a949bbcbb68f86d45ba621"

[ledger]
backend = "memory"
"#
		.to_string()
	}

	#[test]
	fn test_minimal_config_parses_with_defaults() {
		let config: Config = base_config().parse().unwrap();

		assert_eq!(config.gateway.id, "test-gateway");
		assert_eq!(config.node.endpoints.len(), 2);
		assert!(config.node.endpoints[0].supports_eviction);
		assert!(!config.node.endpoints[1].supports_eviction);
		assert_eq!(config.indexer.nb_of_retry, 3);
		assert_eq!(config.worker.max_operations_per_batch, 5);
		assert_eq!(config.reconciler.nb_of_confirmation, 1);
		assert_eq!(config.reconciler.operation_expiration_timeout_minutes, 8);
		assert_eq!(config.reconciler.poll_interval_seconds, 60);
	}

	#[test]
	fn test_operation_locator_accepts_index_and_key() {
		let config: Config = base_config().parse().unwrap();
		assert_eq!(
			config.indexer.endpoints[0].key_to_operation,
			OperationLocator::Index(0)
		);

		let with_key = base_config().replace("key_to_operation = 0", "key_to_operation = \"operation_group\"");
		let config: Config = with_key.parse().unwrap();
		assert_eq!(
			config.indexer.endpoints[0].key_to_operation,
			OperationLocator::Key("operation_group".into())
		);
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_GATEWAY_BROKER", "nats://broker:4222");

		let raw = base_config().replace("nats://localhost:4222", "${TEST_GATEWAY_BROKER}");
		let config: Config = raw.parse().unwrap();
		assert_eq!(config.broker.url, "nats://broker:4222");

		std::env::remove_var("TEST_GATEWAY_BROKER");
	}

	#[test]
	fn test_env_var_with_default() {
		let raw = base_config().replace(
			"nats://localhost:4222",
			"${MISSING_GATEWAY_VAR:-nats://fallback:4222}",
		);
		let config: Config = raw.parse().unwrap();
		assert_eq!(config.broker.url, "nats://fallback:4222");
	}

	#[test]
	fn test_missing_env_var_rejected() {
		let raw = base_config().replace("nats://localhost:4222", "${MISSING_GATEWAY_VAR}");
		let err = raw.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("MISSING_GATEWAY_VAR"));
	}

	#[test]
	fn test_empty_node_pool_rejected() {
		let raw = r#"
[gateway]
id = "test"

[node]
endpoints = []

[indexer]
[[indexer.endpoints]]
name = "tzkt"
api_url = "http://localhost:5000/v1/operations/"
path_to_operation = ""
key_to_operation = 0
key_to_status = "status"
key_to_block_level = "level"
success_status = "applied"

[broker]
url = "nats://localhost:4222"

[signer]
primary = "local"
[signer.local.keys]
admin = "00"

[ledger]
backend = "memory"
"#;
		let err = raw.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("node endpoint"));
	}

	#[test]
	fn test_vault_signer_requires_section() {
		let raw = base_config().replace("primary = \"local\"", "primary = \"vault\"");
		let err = raw.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("signer.vault"));
	}

	#[test]
	fn test_file_ledger_requires_path() {
		let raw = base_config().replace("backend = \"memory\"", "backend = \"file\"");
		let err = raw.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("ledger.path"));
	}
}
