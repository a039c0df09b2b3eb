use async_trait::async_trait;
use court_core::EventSink;
use court_shared::BookingEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

pub const RESERVATION_TOPIC: &str = "reservations.events";

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer, topic: RESERVATION_TOPIC.to_string() })
    }

    pub async fn send(&self, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(&self.topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    self.topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", self.topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventSink for EventProducer {
    /// Keyed by reservation id so one reservation's events stay ordered on a partition.
    async fn publish(&self, event: BookingEvent) {
        let key = event.reservation_id().to_string();
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                error!(kind = event.kind(), "Failed to serialize booking event: {}", e);
                return;
            }
        };
        // Transition already committed; a lost event is logged, not retried.
        let _ = self.send(&key, &payload).await;
    }
}
