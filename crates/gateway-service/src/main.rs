//! Main entry point for the Tezos transaction gateway.
//!
//! One binary serves every role: the send worker (forge, sign, inject),
//! the inject worker (broadcast of client-signed payloads), and the
//! confirmation reconciler. Roles run as separate processes in production
//! and can be combined with `--role all` for development.

use clap::{Parser, ValueEnum};
use gateway_config::Config;
use gateway_worker::inject::InjectWorker;
use gateway_worker::reconciler::Reconciler;
use gateway_worker::send::SendWorker;
use std::path::PathBuf;
use std::sync::Arc;

mod builder;

/// Which processes this invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
	/// Every role in one process.
	All,
	/// Forge, sign, and inject transaction batches.
	SendWorker,
	/// Broadcast client-signed payloads.
	InjectWorker,
	/// Poll indexers and settle or expire injected operations.
	Reconciler,
}

/// Command-line arguments for the gateway service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Role to run
	#[arg(short, long, value_enum, default_value_t = Role::All)]
	role: Role,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started gateway");

	// Load configuration
	let config = Config::from_file(args.config.to_str().unwrap_or_default()).await?;
	tracing::info!("Loaded configuration [{}]", config.gateway.id);

	let services = builder::build(config).await?;
	run(args.role, services).await;

	tracing::info!("Stopped gateway");
	Ok(())
}

/// Spawns the selected roles and waits for the shutdown signal.
async fn run(role: Role, services: builder::GatewayServices) {
	let mut tasks = Vec::new();

	if matches!(role, Role::All | Role::SendWorker) {
		let worker = Arc::new(SendWorker::new(
			services.ledger.clone(),
			services.nodes.clone(),
			services.signer.clone(),
			services.notifier.clone(),
			services.config.worker.clone(),
		));
		let broker = services.broker.clone();
		tasks.push(tokio::spawn(async move {
			worker.run(broker).await;
		}));
		tracing::info!(role = "send-worker", "Running");
	}

	if matches!(role, Role::All | Role::InjectWorker) {
		let worker = Arc::new(InjectWorker::new(
			services.ledger.clone(),
			services.nodes.clone(),
			services.notifier.clone(),
		));
		let broker = services.broker.clone();
		tasks.push(tokio::spawn(async move {
			worker.run(broker).await;
		}));
		tracing::info!(role = "inject-worker", "Running");
	}

	if matches!(role, Role::All | Role::Reconciler) {
		let reconciler = Arc::new(Reconciler::new(
			services.ledger.clone(),
			services.nodes.clone(),
			services.indexers.clone(),
			services.notifier.clone(),
			services.config.reconciler.clone(),
			services.config.worker.clone(),
		));
		tasks.push(tokio::spawn(async move {
			reconciler.run().await;
		}));
		tracing::info!(role = "reconciler", "Running");
	}

	// Workers run until interrupted; a single message's failure never
	// reaches this point
	tokio::signal::ctrl_c().await.ok();
	tracing::info!("Shutdown signal received");

	for task in &tasks {
		task.abort();
	}
}
