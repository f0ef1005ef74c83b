use envconfig::Envconfig;
use health::HealthStrategy;

pub use common_kafka::config::{ConsumerConfig, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(from = "KAFKA_CONSUMER_TOPIC", default = "events_ingestion")]
    pub kafka_topic: String,

    #[envconfig(from = "KAFKA_CONSUMER_GROUP", default = "ingestion-worker")]
    pub kafka_group_id: String,

    pub database_url: String,

    #[envconfig(default = "20")]
    pub database_max_connections: u32,

    /// Maximum total delivery attempts for a single message before it is
    /// dead-lettered (offset stored, not redelivered). See worker::consumer
    /// for why this is tracked in-process rather than by the broker.
    #[envconfig(default = "3")]
    pub max_store_attempts: u32,

    #[envconfig(default = "5000")]
    pub store_retry_backoff_ms: u64,

    #[envconfig(default = "10")]
    pub batch_size: usize,

    #[envconfig(default = "1000")]
    pub batch_fetch_timeout_ms: u64,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub bind_host: String,

    #[envconfig(from = "BIND_PORT", default = "3310")]
    pub bind_port: u16,

    #[envconfig(default = "ALL")]
    pub healthcheck_strategy: HealthStrategy,

    #[envconfig(default = "info")]
    pub log_level: String,

    #[envconfig(default = "dev")]
    pub environment: String,
}

impl Config {
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            kafka_consumer_group: self.kafka_group_id.clone(),
            kafka_consumer_topic: self.kafka_topic.clone(),
            kafka_consumer_offset_reset: "earliest".to_string(),
            kafka_consumer_auto_commit: false,
            kafka_consumer_auto_commit_interval_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_config_carries_topic_and_group() {
        let config = Config {
            kafka: KafkaConfig::init_from_env().unwrap(),
            kafka_topic: "events_ingestion".to_string(),
            kafka_group_id: "test-group".to_string(),
            database_url: "postgres://localhost/test".to_string(),
            database_max_connections: 20,
            max_store_attempts: 3,
            store_retry_backoff_ms: 5000,
            batch_size: 10,
            batch_fetch_timeout_ms: 1000,
            bind_host: "::".to_string(),
            bind_port: 3310,
            healthcheck_strategy: HealthStrategy::All,
            log_level: "info".to_string(),
            environment: "test".to_string(),
        };

        let consumer_config = config.consumer_config();
        assert_eq!(consumer_config.kafka_consumer_topic, "events_ingestion");
        assert_eq!(consumer_config.kafka_consumer_group, "test-group");
        assert!(!consumer_config.kafka_consumer_auto_commit);
    }
}
