use envconfig::Envconfig;
use health::HealthStrategy;

pub use common_kafka::config::{ConsumerConfig, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(from = "KAFKA_PRODUCER_TOPIC", default = "events_ingestion")]
    pub kafka_topic: String,

    pub database_url: String,

    #[envconfig(default = "20")]
    pub database_max_connections: u32,

    pub redis_url: String,

    #[envconfig(default = "86400")]
    pub dedup_ttl_seconds: u64,

    #[envconfig(default = "true")]
    pub rate_limit_enabled: bool,

    #[envconfig(default = "1000")]
    pub rate_limit_max_requests: u64,

    #[envconfig(default = "60")]
    pub rate_limit_window_seconds: i64,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub bind_host: String,

    #[envconfig(from = "BIND_PORT", default = "3000")]
    pub bind_port: u16,

    #[envconfig(default = "ALL")]
    pub healthcheck_strategy: HealthStrategy,

    #[envconfig(default = "info")]
    pub log_level: String,

    #[envconfig(default = "dev")]
    pub environment: String,
}
