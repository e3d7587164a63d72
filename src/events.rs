//! Domain events
//!
//! Events are published after the state change they describe has been
//! persisted. Delivery is best-effort: callers log publish failures and
//! carry on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    InvocationStarted,
    InvocationSuccess,
    InvocationFailed,
    InvocationCanceled,
    ProviderCreated,
    ProviderUpdated,
    ProviderDeleted,
    OperationCreated,
    OperationUpdated,
    OperationDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::InvocationStarted => "invocation.started",
            EventType::InvocationSuccess => "invocation.success",
            EventType::InvocationFailed => "invocation.failed",
            EventType::InvocationCanceled => "invocation.canceled",
            EventType::ProviderCreated => "provider.created",
            EventType::ProviderUpdated => "provider.updated",
            EventType::ProviderDeleted => "provider.deleted",
            EventType::OperationCreated => "operation.created",
            EventType::OperationUpdated => "operation.updated",
            EventType::OperationDeleted => "operation.deleted",
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub properties: Map<String, Value>,
}

impl EventMetadata {
    /// Metadata carrying the trace and span of the calling task.
    pub fn current() -> Self {
        Self {
            trace_id: telemetry::current_trace_id(),
            span_id: telemetry::current_span_id(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_provider(mut self, identifier: impl Into<String>) -> Self {
        self.provider_identifier = Some(identifier.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub metadata: EventMetadata,
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: EventType, metadata: EventMetadata, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            occurred_at: Utc::now(),
            metadata,
            payload,
        }
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event bus is closed")]
    Closed,
    #[error("event bus rejected event: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), EventError>;
}

/// Publishes and logs failures without surfacing them.
pub async fn publish_best_effort(publisher: &dyn EventPublisher, event: Event) {
    let event_type = event.event_type.as_str();
    if let Err(error) = publisher.publish(event).await {
        tracing::warn!(event_type, %error, "Failed to publish event");
    }
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Event>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: Event) -> Result<(), EventError> {
        tracing::debug!(event_type = event.event_type.as_str(), event_id = %event.id, "Publishing event");
        // No subscribers is not a failure
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let publisher = BroadcastPublisher::new(8);
        let mut receiver = publisher.subscribe();

        let metadata = EventMetadata::default()
            .with_provider("github")
            .with_operation("list_repos")
            .with_property("attempt", 1);
        publisher
            .publish(Event::new(EventType::InvocationStarted, metadata, json!({"id": "x"})))
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::InvocationStarted);
        assert_eq!(event.metadata.provider_identifier.as_deref(), Some("github"));
        assert_eq!(event.metadata.properties["attempt"], 1);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let publisher = BroadcastPublisher::default();
        let event = Event::new(EventType::ProviderDeleted, EventMetadata::default(), Value::Null);
        assert!(publisher.publish(event).await.is_ok());
    }

    #[test]
    fn event_types_serialize_to_dotted_names() {
        assert_eq!(
            serde_json::to_value(EventType::InvocationCanceled).unwrap(),
            json!("invocation.canceled")
        );
    }
}
