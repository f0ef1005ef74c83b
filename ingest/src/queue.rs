use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use health::HealthHandle;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use store::Event;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("kafka produce error: {0}")]
    Produce(#[from] KafkaError),
    #[error("kafka produce canceled")]
    Canceled,
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct KafkaContext {
    liveness: HealthHandle,
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        let brokers_up = stats.brokers.values().any(|b| b.state == "UP");
        if brokers_up {
            self.liveness.report_healthy_blocking();
        }
    }
}

/// Publishes accepted events to the durable work-queue stream, one
/// JSON-encoded message per event. A publisher error aborts the remaining
/// batch; the caller (the ingest handler) decides what that means for the
/// client-visible response.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), QueueError>;
}

pub struct KafkaQueuePublisher {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaQueuePublisher {
    pub async fn new(
        bootstrap_servers: &str,
        topic: String,
        liveness: HealthHandle,
    ) -> Result<Self, QueueError> {
        let producer: FutureProducer<KafkaContext> = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("statistics.interval.ms", "10000")
            .set("message.timeout.ms", "20000")
            .create_with_context(KafkaContext { liveness })?;

        declare_topic(bootstrap_servers, &topic).await?;

        Ok(Self { producer, topic })
    }
}

/// Topic declaration is idempotent: `TopicAlreadyExists` from the admin
/// client races with other instances doing the same at startup and is not
/// treated as an error, mirroring the source's "stream declaration is
/// idempotent" contract.
async fn declare_topic(bootstrap_servers: &str, topic: &str) -> Result<(), QueueError> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .create()?;

    let retention_ms = (7 * 24 * 60 * 60 * 1000).to_string();
    let new_topic = NewTopic::new(topic, 1, TopicReplication::Fixed(1))
        .set("retention.ms", &retention_ms)
        .set("retention.bytes", "-1");

    let results = admin
        .create_topics(&[new_topic], &AdminOptions::new())
        .await?;

    for result in results {
        match result {
            Ok(_) => info!(topic, "topic declared"),
            Err((_, rdkafka::types::RDKafkaErrorCode::TopicAlreadyExists)) => {
                info!(topic, "topic already exists");
            }
            Err((name, code)) => {
                warn!(topic = name, error = ?code, "topic declaration failed");
            }
        }
    }

    Ok(())
}

#[async_trait]
impl QueuePublisher for KafkaQueuePublisher {
    async fn publish(&self, event: &Event) -> Result<(), QueueError> {
        let payload = serde_json::to_string(event)?;

        match self
            .producer
            .send(
                FutureRecord::to(&self.topic).payload(&payload).key(&event.event_id.to_string()),
                Duration::from_secs(0),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err((error, _)) => {
                error!(error = %error, event_id = %event.event_id, "failed to publish event");
                Err(QueueError::Produce(error))
            }
        }
    }
}

/// Records every published event for assertions in ingest-handler tests,
/// following this codebase's recorded-call mock convention.
#[derive(Default)]
pub struct MockQueuePublisher {
    published: Mutex<Vec<Event>>,
    fail_after: Option<usize>,
}

impl MockQueuePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Causes the Nth call (1-indexed) onward to fail, to exercise partial-
    /// batch failure handling.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueuePublisher for MockQueuePublisher {
    async fn publish(&self, event: &Event) -> Result<(), QueueError> {
        let mut published = self.published.lock().unwrap();
        if let Some(n) = self.fail_after {
            if published.len() + 1 >= n {
                return Err(QueueError::Canceled);
            }
        }
        published.push(event.clone());
        Ok(())
    }
}

pub fn wrap_arc<P: QueuePublisher + 'static>(publisher: P) -> Arc<dyn QueuePublisher> {
    Arc::new(publisher)
}
