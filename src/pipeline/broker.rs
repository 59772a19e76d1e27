//! In-process message broker
//!
//! Topic exchanges route stage messages onto bounded queues by matching the
//! message's routing key against queue binding patterns (`*` matches one
//! segment, `#` matches the rest). A direct exchange carries the single
//! persistence lane. Delivery is at-least-once from the consumer's point of
//! view: a key matching several bindings is delivered to each of them, so
//! handlers must tolerate duplicates.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use crate::pipeline::messages::{SaveMessage, StageMessage};

/// Broker operation errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("no queue bound for routing key '{routing_key}' on exchange '{exchange}'")]
    Unroutable {
        exchange: &'static str,
        routing_key: String,
    },

    #[error("queue '{queue}' is closed")]
    Closed { queue: String },
}

/// Consumer handle for one bound queue.
///
/// The receiver sits behind a lock so several workers can share the queue;
/// each message is handed to exactly one of them per delivery.
pub struct MessageQueue<T> {
    pattern: String,
    receiver: Arc<RwLock<mpsc::Receiver<T>>>,
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            receiver: Arc::clone(&self.receiver),
        }
    }
}

impl<T> MessageQueue<T> {
    /// Receives the next message, or `None` once the queue is closed.
    pub async fn recv(&self) -> Option<T> {
        let mut receiver = self.receiver.write().await;
        receiver.recv().await
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

struct Binding<T> {
    pattern: String,
    sender: mpsc::Sender<T>,
}

/// Topic exchange: routes by pattern-matching the routing key.
pub struct TopicExchange<T> {
    name: &'static str,
    capacity: usize,
    bindings: RwLock<Vec<Binding<T>>>,
}

impl<T: Clone> TopicExchange<T> {
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            bindings: RwLock::new(Vec::new()),
        }
    }

    /// Binds a new queue under the given pattern.
    pub async fn bind(&self, pattern: &str) -> MessageQueue<T> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.bindings.write().await.push(Binding {
            pattern: pattern.to_string(),
            sender,
        });
        MessageQueue {
            pattern: pattern.to_string(),
            receiver: Arc::new(RwLock::new(receiver)),
        }
    }

    /// Publishes to every queue whose pattern matches the routing key.
    ///
    /// Returns the number of queues the message was delivered to.
    pub async fn publish(&self, routing_key: &str, message: T) -> Result<usize, BrokerError> {
        let bindings = self.bindings.read().await;
        let mut matched = 0;
        let mut delivered = 0;

        for binding in bindings
            .iter()
            .filter(|b| routing_key_matches(&b.pattern, routing_key))
        {
            matched += 1;
            if binding.sender.send(message.clone()).await.is_err() {
                warn!(
                    "Queue '{}' on exchange '{}' dropped its receiver",
                    binding.pattern, self.name
                );
                continue;
            }
            delivered += 1;
        }

        if delivered == 0 {
            if matched > 0 {
                return Err(BrokerError::Closed {
                    queue: routing_key.to_string(),
                });
            }
            return Err(BrokerError::Unroutable {
                exchange: self.name,
                routing_key: routing_key.to_string(),
            });
        }
        Ok(delivered)
    }
}

/// Direct exchange: one named lane, exact-match routing.
pub struct DirectExchange<T> {
    name: &'static str,
    capacity: usize,
    bindings: RwLock<Vec<Binding<T>>>,
}

impl<T: Clone> DirectExchange<T> {
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            bindings: RwLock::new(Vec::new()),
        }
    }

    pub async fn bind(&self, queue_name: &str) -> MessageQueue<T> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.bindings.write().await.push(Binding {
            pattern: queue_name.to_string(),
            sender,
        });
        MessageQueue {
            pattern: queue_name.to_string(),
            receiver: Arc::new(RwLock::new(receiver)),
        }
    }

    pub async fn publish(&self, routing_key: &str, message: T) -> Result<usize, BrokerError> {
        let bindings = self.bindings.read().await;
        let mut matched = 0;
        let mut delivered = 0;

        for binding in bindings.iter().filter(|b| b.pattern == routing_key) {
            matched += 1;
            if binding.sender.send(message.clone()).await.is_err() {
                warn!(
                    "Queue '{}' on exchange '{}' dropped its receiver",
                    binding.pattern, self.name
                );
                continue;
            }
            delivered += 1;
        }

        if delivered == 0 {
            if matched > 0 {
                return Err(BrokerError::Closed {
                    queue: routing_key.to_string(),
                });
            }
            return Err(BrokerError::Unroutable {
                exchange: self.name,
                routing_key: routing_key.to_string(),
            });
        }
        Ok(delivered)
    }
}

/// AMQP-style topic match: `*` matches exactly one dot-separated segment,
/// `#` matches the remainder (including nothing).
#[must_use]
pub fn routing_key_matches(pattern: &str, routing_key: &str) -> bool {
    let mut pattern_segments = pattern.split('.');
    let mut key_segments = routing_key.split('.');

    loop {
        match (pattern_segments.next(), key_segments.next()) {
            (Some("#"), _) => return true,
            (Some("*"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Exchange topology for the pipeline: one topic exchange per chain stage,
/// one direct exchange for persistence.
pub struct MessageBroker {
    fetch_exchange: TopicExchange<StageMessage>,
    prices_exchange: TopicExchange<StageMessage>,
    combine_exchange: TopicExchange<StageMessage>,
    save_exchange: DirectExchange<SaveMessage>,
}

/// The bound consumer queues, one per stage.
pub struct StageQueues {
    pub fetch: MessageQueue<StageMessage>,
    pub prices: MessageQueue<StageMessage>,
    pub combine: MessageQueue<StageMessage>,
    pub save: MessageQueue<SaveMessage>,
}

impl MessageBroker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            fetch_exchange: TopicExchange::new("fetch", capacity),
            prices_exchange: TopicExchange::new("prices", capacity),
            combine_exchange: TopicExchange::new("combine", capacity),
            save_exchange: DirectExchange::new("save", capacity),
        }
    }

    /// Declares the standard queue topology and returns the consumer ends.
    pub async fn bind_stage_queues(&self) -> StageQueues {
        StageQueues {
            fetch: self.fetch_exchange.bind("fetch.products.#").await,
            prices: self.prices_exchange.bind("fetch.prices.#").await,
            combine: self.combine_exchange.bind("combine.products.#").await,
            save: self.save_exchange.bind("save.products").await,
        }
    }

    /// Routes a chain message to its stage's exchange.
    pub async fn publish(&self, message: StageMessage) -> Result<(), BrokerError> {
        let routing_key = message.routing_key();
        let exchange = match &message {
            StageMessage::FetchProducts { .. } => &self.fetch_exchange,
            StageMessage::FetchPrices { .. } => &self.prices_exchange,
            StageMessage::CombineProducts { .. } => &self.combine_exchange,
        };
        exchange.publish(&routing_key, message).await.map(|_| ())
    }

    /// Routes a persistence message onto the direct lane.
    pub async fn publish_save(&self, message: SaveMessage) -> Result<(), BrokerError> {
        self.save_exchange
            .publish(SaveMessage::routing_key(), message)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestId;
    use rstest::rstest;

    #[rstest]
    #[case("fetch.products.#", "fetch.products.77.4727", true)]
    #[case("fetch.products.#", "fetch.products", true)]
    #[case("fetch.products.#", "fetch.prices.77.4727", false)]
    #[case("fetch.*.77", "fetch.products.77", true)]
    #[case("fetch.*.77", "fetch.products.78", false)]
    #[case("fetch.products", "fetch.products", true)]
    #[case("fetch.products", "fetch.products.77", false)]
    fn topic_pattern_matching(
        #[case] pattern: &str,
        #[case] routing_key: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(routing_key_matches(pattern, routing_key), expected);
    }

    fn fetch_message(city: &str, category: &str) -> StageMessage {
        StageMessage::FetchProducts {
            request_id: RequestId::new(),
            category_id: category.to_string(),
            city_id: city.to_string(),
            min_goods: 1,
        }
    }

    #[tokio::test]
    async fn publish_reaches_matching_queue() {
        let exchange: TopicExchange<StageMessage> = TopicExchange::new("fetch", 8);
        let queue = exchange.bind("fetch.products.#").await;

        let message = fetch_message("77", "4727");
        let delivered = exchange
            .publish(&message.routing_key(), message.clone())
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let received = queue.recv().await.unwrap();
        assert_eq!(received.request_id(), message.request_id());
    }

    #[tokio::test]
    async fn unroutable_message_is_an_error() {
        let exchange: TopicExchange<StageMessage> = TopicExchange::new("fetch", 8);
        let _queue = exchange.bind("fetch.prices.#").await;

        let message = fetch_message("77", "4727");
        let result = exchange.publish(&message.routing_key(), message).await;
        assert!(matches!(result, Err(BrokerError::Unroutable { .. })));
    }

    #[tokio::test]
    async fn overlapping_bindings_deliver_to_each() {
        // Two patterns match the same key: at-least-once, not exactly-once.
        let exchange: TopicExchange<StageMessage> = TopicExchange::new("fetch", 8);
        let wide = exchange.bind("fetch.products.#").await;
        let narrow = exchange.bind("fetch.products.77.*").await;

        let message = fetch_message("77", "4727");
        let delivered = exchange
            .publish(&message.routing_key(), message)
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        assert!(wide.recv().await.is_some());
        assert!(narrow.recv().await.is_some());
    }

    #[tokio::test]
    async fn direct_exchange_is_exact_match() {
        let exchange: DirectExchange<SaveMessage> = DirectExchange::new("save", 8);
        let queue = exchange.bind("save.products").await;

        let message = SaveMessage {
            request_id: RequestId::new(),
            products: Vec::new(),
            path: "out.json".into(),
        };
        exchange
            .publish("save.products", message)
            .await
            .unwrap();
        assert!(queue.recv().await.is_some());

        let stray = SaveMessage {
            request_id: RequestId::new(),
            products: Vec::new(),
            path: "out.json".into(),
        };
        assert!(exchange.publish("save.products.77", stray).await.is_err());
    }

    #[tokio::test]
    async fn broker_routes_stage_messages_by_variant() {
        let broker = MessageBroker::new(8);
        let queues = broker.bind_stage_queues().await;

        broker.publish(fetch_message("1", "2")).await.unwrap();
        assert!(queues.fetch.recv().await.is_some());
    }
}
