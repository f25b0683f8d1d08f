//! Message broker module for the Tezos transaction gateway.
//!
//! Durable queue publish/consume over NATS JetStream. The stream and its
//! consumers are declared idempotently, so a reconnect after connection
//! loss re-establishes the same topology and resumes delivery; in-flight
//! business logic only ever sees a gap.
//!
//! Consumption is strictly at-most-once per message: a payload that fails
//! typed decoding is acknowledged and dropped (a malformed message can
//! never become valid, and acknowledging prevents poison-message loops),
//! and a payload whose handler errors is still acknowledged after the
//! handler returns. Handlers are not idempotent across all failure
//! points (e.g. partial injection), so redelivery is deliberately not
//! attempted.

use async_nats::jetstream;
use futures::StreamExt;
use gateway_config::BrokerConfig;
use gateway_types::{ConfirmationNotification, ErrorNotification};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Boxed error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Delay before re-establishing a consumer after a delivery failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Errors that can occur during broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
	/// Error that occurs while connecting or declaring topology.
	#[error("Broker connection error: {0}")]
	Connect(String),
	/// Error that occurs while publishing a message.
	#[error("Publish error: {0}")]
	Publish(String),
	/// Error that occurs during payload serialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
}

/// What became of one delivered payload. Every variant is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	/// The payload decoded and its handler succeeded.
	Handled,
	/// The payload decoded but its handler returned an error; the error
	/// was logged and the message is still consumed.
	HandlerFailed,
	/// The payload failed typed decoding and was dropped.
	Dropped,
}

/// Decodes one payload and runs the handler over it.
///
/// This is the whole per-message discipline, factored out of the delivery
/// loop: decode failure drops the message, handler failure is logged, and
/// in every case the caller acknowledges afterwards.
pub async fn process_payload<T, F, Fut>(payload: &[u8], handler: &F) -> Disposition
where
	T: DeserializeOwned,
	F: Fn(T) -> Fut,
	Fut: Future<Output = Result<(), HandlerError>>,
{
	let message: T = match serde_json::from_slice(payload) {
		Ok(message) => message,
		Err(err) => {
			tracing::error!(error = %err, "Message failed schema validation, dropping");
			return Disposition::Dropped;
		},
	};

	match handler(message).await {
		Ok(()) => Disposition::Handled,
		Err(err) => {
			tracing::error!(error = %err, "Message handler failed");
			Disposition::HandlerFailed
		},
	}
}

/// Client for the gateway's durable message stream.
///
/// One client serves both roles: workers consume their queue subjects
/// through it, and every process publishes requests and broadcast
/// notifications through it.
pub struct BrokerClient {
	jetstream: jetstream::Context,
	config: BrokerConfig,
}

impl BrokerClient {
	/// Connects to the broker and declares the gateway stream
	/// idempotently.
	pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
		let client = async_nats::connect(&config.url)
			.await
			.map_err(|e| BrokerError::Connect(e.to_string()))?;
		let jetstream = jetstream::new(client);

		jetstream
			.get_or_create_stream(jetstream::stream::Config {
				name: config.stream.clone(),
				subjects: vec![format!("{}.>", config.stream)],
				..Default::default()
			})
			.await
			.map_err(|e| BrokerError::Connect(e.to_string()))?;

		tracing::info!(stream = %config.stream, "Connected to broker");

		Ok(Self {
			jetstream,
			config: config.clone(),
		})
	}

	/// Publishes a JSON payload to a subject and waits for the server
	/// acknowledgment.
	pub async fn publish<T: Serialize>(&self, subject: &str, payload: &T) -> Result<(), BrokerError> {
		let bytes =
			serde_json::to_vec(payload).map_err(|e| BrokerError::Serialization(e.to_string()))?;

		self.jetstream
			.publish(subject.to_string(), bytes.into())
			.await
			.map_err(|e| BrokerError::Publish(e.to_string()))?
			.await
			.map_err(|e| BrokerError::Publish(e.to_string()))?;

		Ok(())
	}

	/// Publishes an error notification to the broadcast subject.
	pub async fn publish_error_notification(
		&self,
		notification: &ErrorNotification,
	) -> Result<(), BrokerError> {
		self.publish(&self.config.error_subject, notification).await
	}

	/// Publishes a confirmation notification to the broadcast subject.
	pub async fn publish_confirmation(
		&self,
		notification: &ConfirmationNotification,
	) -> Result<(), BrokerError> {
		self.publish(&self.config.confirmation_subject, notification)
			.await
	}

	/// Returns the configured subjects, for callers that publish requests.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Consumes a queue subject forever, one message at a time.
	///
	/// Declares a durable pull consumer with an in-flight window of one
	/// message, so handler execution is serialized per queue. The outer
	/// loop re-declares the consumer and resumes after any delivery
	/// failure; it only returns when the task is cancelled.
	pub async fn consume<T, F, Fut>(&self, durable_name: &str, subject: &str, handler: F)
	where
		T: DeserializeOwned,
		F: Fn(T) -> Fut,
		Fut: Future<Output = Result<(), HandlerError>>,
	{
		loop {
			let consumer = match self.ensure_consumer(durable_name, subject).await {
				Ok(consumer) => consumer,
				Err(err) => {
					tracing::error!(subject, error = %err, "Failed to declare consumer, retrying");
					tokio::time::sleep(RECONNECT_DELAY).await;
					continue;
				},
			};

			let mut messages = match consumer.messages().await {
				Ok(messages) => messages,
				Err(err) => {
					tracing::error!(subject, error = %err, "Failed to open delivery stream, retrying");
					tokio::time::sleep(RECONNECT_DELAY).await;
					continue;
				},
			};

			while let Some(delivery) = messages.next().await {
				match delivery {
					Ok(message) => {
						let disposition =
							process_payload::<T, _, _>(&message.payload, &handler).await;
						tracing::debug!(subject, ?disposition, "Processed message");

						// Ack in every case; this consumer never redelivers
						if let Err(err) = message.ack().await {
							tracing::error!(subject, error = %err, "Failed to acknowledge message");
						}
					},
					Err(err) => {
						tracing::warn!(subject, error = %err, "Delivery interrupted, re-establishing consumer");
						break;
					},
				}
			}

			tokio::time::sleep(RECONNECT_DELAY).await;
		}
	}

	async fn ensure_consumer(
		&self,
		durable_name: &str,
		subject: &str,
	) -> Result<jetstream::consumer::Consumer<jetstream::consumer::pull::Config>, BrokerError> {
		let stream = self
			.jetstream
			.get_stream(&self.config.stream)
			.await
			.map_err(|e| BrokerError::Connect(e.to_string()))?;

		stream
			.get_or_create_consumer(
				durable_name,
				jetstream::consumer::pull::Config {
					durable_name: Some(durable_name.to_string()),
					filter_subject: subject.to_string(),
					// One in-flight message per queue: handler execution
					// for a given consumer is effectively serialized
					max_ack_pending: 1,
					..Default::default()
				},
			)
			.await
			.map_err(|e| BrokerError::Connect(e.to_string()))
	}
}
