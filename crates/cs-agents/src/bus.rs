//! Alert bus
//!
//! Workers publish [`Alert`]s on the topic `alert.{kind}.{severity}`.
//! Subscribers and handlers select alerts with topic patterns.

use async_trait::async_trait;
use cs_customers::{Alert, CustomerStore};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Alert bus error types.
#[derive(Debug, Error)]
pub enum AlertBusError {
    /// Handler failed to process an alert
    #[error("Handler {handler} failed: {message}")]
    Handler {
        /// Handler name
        handler: String,
        /// Failure description
        message: String,
    },

    /// Subscription id is not known
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for alert bus operations.
pub type AlertBusResult<T> = Result<T, AlertBusError>;

/// Subscription handle for receiving alerts.
pub struct Subscription {
    /// Subscription ID
    pub id: String,
    /// Topic pattern
    pub pattern: String,
    /// Alert receiver
    pub receiver: broadcast::Receiver<Alert>,
}

impl Subscription {
    /// Receive the next alert.
    pub async fn recv(&mut self) -> AlertBusResult<Alert> {
        loop {
            match self.receiver.recv().await {
                Ok(alert) => return Ok(alert),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(subscription = %self.id, skipped, "Alert subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(AlertBusError::ChannelClosed),
            }
        }
    }
}

/// Alert handler trait for processing alerts.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Handler name, for logs and errors.
    fn name(&self) -> &str;

    /// Handle an alert.
    async fn handle(&self, alert: &Alert) -> AlertBusResult<()>;

    /// Topic patterns this handler is interested in.
    fn patterns(&self) -> Vec<String>;
}

/// Alert bus trait for publish/subscribe operations.
#[async_trait]
pub trait AlertBus: Send + Sync {
    /// Publish an alert.
    ///
    /// Returns an error when a handler failed to process it, so callers
    /// can tell a delivered alert from a lost one.
    async fn publish(&self, alert: Alert) -> AlertBusResult<()>;

    /// Subscribe to a topic pattern.
    ///
    /// Patterns support wildcards:
    /// - `*` matches any single segment
    /// - `#` matches zero or more segments
    ///
    /// Examples:
    /// - `alert.churn_risk.*` matches churn alerts of every severity
    /// - `alert.*.critical` matches critical alerts of every kind
    /// - `alert.#` matches everything
    async fn subscribe(&self, pattern: &str) -> AlertBusResult<Subscription>;

    /// Register an alert handler.
    async fn register_handler(&self, handler: Arc<dyn AlertHandler>) -> AlertBusResult<()>;

    /// Drop a subscription.
    async fn unsubscribe(&self, subscription_id: &str) -> AlertBusResult<()>;

    /// Get alert bus stats.
    async fn stats(&self) -> AlertBusStats;
}

/// Alert bus statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AlertBusStats {
    /// Total alerts published
    pub alerts_published: u64,
    /// Deliveries to subscribers and handlers
    pub alerts_delivered: u64,
    /// Handler failures
    pub handler_errors: u64,
    /// Active subscriptions
    pub active_subscriptions: usize,
    /// Registered handlers
    pub registered_handlers: usize,
}

/// In-process alert bus.
///
/// Subscribers get alerts through broadcast channels; handlers run inline
/// in [`AlertBus::publish`], so an alert has been handled once `publish`
/// returns. A failing handler does not stop the others; the first failure
/// is returned after every handler has run.
pub struct MemoryAlertBus {
    /// One channel per pattern
    channels: RwLock<HashMap<String, broadcast::Sender<Alert>>>,
    /// Subscription id to pattern
    subscriptions: RwLock<HashMap<String, String>>,
    /// Registered handlers
    handlers: RwLock<Vec<Arc<dyn AlertHandler>>>,
    /// Statistics
    stats: RwLock<AlertBusStats>,
    /// Channel capacity
    channel_capacity: usize,
}

impl std::fmt::Debug for MemoryAlertBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAlertBus")
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl MemoryAlertBus {
    /// Create a new in-memory alert bus.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            stats: RwLock::new(AlertBusStats::default()),
            channel_capacity: capacity.max(1),
        }
    }
}

impl Default for MemoryAlertBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a topic matches a pattern.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('.').collect();
    let topic_parts: Vec<&str> = topic.split('.').collect();
    segments_match(&pattern_parts, &topic_parts)
}

fn segments_match(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&"#", rest)) => (0..=topic.len()).any(|skip| segments_match(rest, &topic[skip..])),
        Some((&"*", rest)) => !topic.is_empty() && segments_match(rest, &topic[1..]),
        Some((segment, rest)) => {
            topic.first() == Some(segment) && segments_match(rest, &topic[1..])
        }
    }
}

#[async_trait]
impl AlertBus for MemoryAlertBus {
    async fn publish(&self, alert: Alert) -> AlertBusResult<()> {
        let topic = alert.topic();
        let mut delivered = 0u64;
        let mut failures = 0u64;
        let mut first_failure = None;

        {
            let channels = self.channels.read().await;
            for (pattern, sender) in channels.iter() {
                if topic_matches(pattern, &topic) {
                    // Err only means nobody is listening right now
                    if let Ok(receivers) = sender.send(alert.clone()) {
                        delivered += receivers as u64;
                    }
                }
            }
        }

        let handlers: Vec<Arc<dyn AlertHandler>> = self.handlers.read().await.clone();
        for handler in handlers {
            if !handler.patterns().iter().any(|p| topic_matches(p, &topic)) {
                continue;
            }
            match handler.handle(&alert).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failures += 1;
                    warn!(handler = handler.name(), alert_id = %alert.id, error = %e, "Alert handler failed");
                    first_failure.get_or_insert(AlertBusError::Handler {
                        handler: handler.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.alerts_published += 1;
            stats.alerts_delivered += delivered;
            stats.handler_errors += failures;
        }

        debug!(topic = %topic, alert_id = %alert.id, delivered, "Alert published");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn subscribe(&self, pattern: &str) -> AlertBusResult<Subscription> {
        let id = uuid::Uuid::now_v7().to_string();

        let receiver = {
            let mut channels = self.channels.write().await;
            match channels.get(pattern) {
                Some(sender) => sender.subscribe(),
                None => {
                    let (sender, receiver) = broadcast::channel(self.channel_capacity);
                    channels.insert(pattern.to_string(), sender);
                    receiver
                }
            }
        };

        let active = {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.insert(id.clone(), pattern.to_string());
            subscriptions.len()
        };
        self.stats.write().await.active_subscriptions = active;

        Ok(Subscription {
            id,
            pattern: pattern.to_string(),
            receiver,
        })
    }

    async fn register_handler(&self, handler: Arc<dyn AlertHandler>) -> AlertBusResult<()> {
        let count = {
            let mut handlers = self.handlers.write().await;
            handlers.push(handler);
            handlers.len()
        };
        self.stats.write().await.registered_handlers = count;
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> AlertBusResult<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let pattern = subscriptions
            .remove(subscription_id)
            .ok_or_else(|| AlertBusError::UnknownSubscription(subscription_id.to_string()))?;

        // Drop the channel once no subscription uses the pattern
        if !subscriptions.values().any(|p| *p == pattern) {
            self.channels.write().await.remove(&pattern);
        }

        self.stats.write().await.active_subscriptions = subscriptions.len();
        Ok(())
    }

    async fn stats(&self) -> AlertBusStats {
        self.stats.read().await.clone()
    }
}

/// Persists every alert it sees into the customer store.
#[derive(Debug, Clone)]
pub struct StoreAlertHandler {
    store: Arc<CustomerStore>,
}

impl StoreAlertHandler {
    /// Create a handler writing to `store`.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AlertHandler for StoreAlertHandler {
    fn name(&self) -> &str {
        "store"
    }

    async fn handle(&self, alert: &Alert) -> AlertBusResult<()> {
        self.store
            .record_alert(alert)
            .await
            .map_err(|e| AlertBusError::Handler {
                handler: self.name().to_string(),
                message: e.to_string(),
            })
    }

    fn patterns(&self) -> Vec<String> {
        vec!["alert.#".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_customers::{AlertKind, AlertQuery, NewCustomer, Severity};
    use std::time::Duration;

    fn alert(kind: AlertKind, severity: Severity) -> Alert {
        Alert::new(uuid::Uuid::now_v7(), kind, severity, "test")
    }

    #[test]
    fn test_topic_matching() {
        // Exact match
        assert!(topic_matches("alert.low_health.high", "alert.low_health.high"));

        // Single wildcard
        assert!(topic_matches("alert.low_health.*", "alert.low_health.high"));
        assert!(topic_matches("alert.*.critical", "alert.churn_risk.critical"));
        assert!(topic_matches("*.low_usage.low", "alert.low_usage.low"));

        // Multi-segment wildcard
        assert!(topic_matches("alert.#", "alert.low_health.high"));
        assert!(topic_matches("#", "alert.low_health.high"));
        assert!(topic_matches("alert.#.high", "alert.low_health.high"));
        assert!(topic_matches("alert.low_health.high.#", "alert.low_health.high"));

        // Non-matches
        assert!(!topic_matches("alert.low_health.low", "alert.low_health.high"));
        assert!(!topic_matches("alert.*", "alert.low_health.high"));
        assert!(!topic_matches("alert.*.*.*", "alert.low_health.high"));
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = MemoryAlertBus::new();
        let mut critical = bus.subscribe("alert.*.critical").await.unwrap();
        let mut churn = bus.subscribe("alert.churn_risk.#").await.unwrap();

        bus.publish(alert(AlertKind::LowUsage, Severity::Low)).await.unwrap();
        let sent = alert(AlertKind::ChurnRisk, Severity::Critical);
        bus.publish(sent.clone()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(100), critical.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, sent.id);
        assert_eq!(churn.recv().await.unwrap().id, sent.id);

        let stats = bus.stats().await;
        assert_eq!(stats.alerts_published, 2);
        assert_eq!(stats.alerts_delivered, 2);
        assert_eq!(stats.active_subscriptions, 2);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = MemoryAlertBus::new();
        let sub = bus.subscribe("alert.#").await.unwrap();

        bus.unsubscribe(&sub.id).await.unwrap();
        assert_eq!(bus.stats().await.active_subscriptions, 0);
        assert!(matches!(
            bus.unsubscribe(&sub.id).await,
            Err(AlertBusError::UnknownSubscription(_))
        ));
    }

    struct Failing;

    #[async_trait]
    impl AlertHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _alert: &Alert) -> AlertBusResult<()> {
            Err(AlertBusError::ChannelClosed)
        }

        fn patterns(&self) -> Vec<String> {
            vec!["alert.#".to_string()]
        }
    }

    #[tokio::test]
    async fn test_store_handler_persists_and_failures_are_isolated() {
        let store = Arc::new(CustomerStore::in_memory().await.unwrap());
        let customer = store.create(NewCustomer::new("Acme")).await.unwrap();

        let bus = MemoryAlertBus::new();
        bus.register_handler(Arc::new(Failing)).await.unwrap();
        bus.register_handler(Arc::new(StoreAlertHandler::new(store.clone())))
            .await
            .unwrap();

        let sent = Alert::new(customer.id, AlertKind::Disengaged, Severity::Medium, "quiet");
        let err = bus.publish(sent.clone()).await.unwrap_err();
        assert!(matches!(err, AlertBusError::Handler { ref handler, .. } if handler == "failing"));

        let stored = store.list_alerts(&AlertQuery::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, sent.id);

        let stats = bus.stats().await;
        assert_eq!(stats.handler_errors, 1);
        assert_eq!(stats.registered_handlers, 2);
    }
}
