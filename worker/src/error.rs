use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("offset commit error: {0}")]
    Offset(#[from] common_kafka::kafka_consumer::OffsetErr),
}
