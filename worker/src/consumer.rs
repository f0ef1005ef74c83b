use std::time::Duration;

use common_kafka::kafka_consumer::{Offset, RecvErr, SingleTopicConsumer};
use health::HealthHandle;
use store::{Event, EventStore};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::WorkerError;

pub struct IngestionConsumerLoop {
    consumer: SingleTopicConsumer,
    store: EventStore,
    liveness: HealthHandle,
    batch_size: usize,
    batch_fetch_timeout: Duration,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl IngestionConsumerLoop {
    pub fn new(config: &Config, store: EventStore, liveness: HealthHandle) -> Result<Self, WorkerError> {
        let consumer =
            SingleTopicConsumer::new(config.kafka.clone(), config.consumer_config())?;

        Ok(Self {
            consumer,
            store,
            liveness,
            batch_size: config.batch_size,
            batch_fetch_timeout: Duration::from_millis(config.batch_fetch_timeout_ms),
            max_attempts: config.max_store_attempts,
            retry_backoff: Duration::from_millis(config.store_retry_backoff_ms),
        })
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!("starting ingestion consumer loop");

        loop {
            if *shutdown.borrow() {
                info!("shutdown signal received, stopping consumer loop");
                break;
            }

            self.liveness.report_healthy().await;

            let batch = self.collect_batch().await;
            if batch.is_empty() {
                // Idle fetch window with nothing delivered; normal behavior.
                continue;
            }

            for (event, offset) in batch {
                self.process_message(event, offset, &mut shutdown).await;
            }
        }

        Ok(())
    }

    async fn collect_batch(&self) -> Vec<(Event, Offset)> {
        let mut batch = Vec::with_capacity(self.batch_size);

        for _ in 0..self.batch_size {
            match timeout(self.batch_fetch_timeout, self.consumer.json_recv::<Event>()).await {
                Ok(Ok((event, offset))) => batch.push((event, offset)),
                Ok(Err(RecvErr::Empty) | Err(RecvErr::Serde(_))) => {
                    // json_recv already stored the offset for us; this message
                    // is poison and will never be redelivered.
                    metrics::counter!("events_decode_error_total").increment(1);
                }
                Ok(Err(RecvErr::Kafka(e))) => {
                    warn!(error = %e, "kafka recv error");
                    break;
                }
                Err(_) => {
                    // Fetch timeout with an otherwise empty window; stop
                    // collecting and let the caller re-poll.
                    break;
                }
            }
        }

        batch
    }

    async fn process_message(&self, event: Event, offset: Offset, shutdown: &mut watch::Receiver<bool>) {
        let mut attempt = 1;

        loop {
            match self.store.insert_one(&event).await {
                Ok(_) => {
                    metrics::counter!("ingestion_consumer_messages_processed").increment(1);
                    if let Err(e) = offset.store() {
                        error!(error = %e, "failed to store consumer offset");
                    }
                    return;
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        error = %e,
                        attempt,
                        event_id = %event.event_id,
                        "transient store failure, retrying"
                    );
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_backoff) => {},
                        _ = shutdown.changed() => {
                            // Finish the current attempt's bookkeeping and exit;
                            // the message is redelivered on next start since its
                            // offset was never stored.
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!(
                        error = %e,
                        attempt,
                        event_id = %event.event_id,
                        "giving up on message after exhausting retries"
                    );
                    metrics::counter!("events_failed_total", "reason" => "store_exhausted")
                        .increment(1);
                    if let Err(e) = offset.store() {
                        error!(error = %e, "failed to store consumer offset for dead-lettered message");
                    }
                    return;
                }
            }
        }
    }
}
