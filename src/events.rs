//! Module Events
//!
//! Fire-and-forget notifications from cache modules. Publishing pushes onto a
//! bounded channel and never blocks or fails the caller; a background
//! dispatcher drains the channel into the registered sinks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// == Event Types ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    ConfigChange,
    HealthChange,
    PerformanceAlert,
    DataCorruption,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warn,
    Error,
    Critical,
}

// == Cache Module Event ==
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheModuleEvent {
    pub event_type: EventType,
    pub source_module: String,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub data: Value,
    pub requires_response: bool,
}

impl CacheModuleEvent {
    pub fn new(
        event_type: EventType,
        source_module: impl Into<String>,
        severity: EventSeverity,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            source_module: source_module.into(),
            timestamp: Utc::now(),
            severity,
            data,
            requires_response: false,
        }
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }
}

// == Event Sink ==
/// Destination for dispatched events.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &CacheModuleEvent) -> Result<(), String>;
}

/// Writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn deliver(&self, event: &CacheModuleEvent) -> Result<(), String> {
        match event.severity {
            EventSeverity::Info => info!(
                source = %event.source_module,
                event_type = ?event.event_type,
                "cache event: {}",
                event.data
            ),
            EventSeverity::Warn => warn!(
                source = %event.source_module,
                event_type = ?event.event_type,
                "cache event: {}",
                event.data
            ),
            EventSeverity::Error | EventSeverity::Critical => error!(
                source = %event.source_module,
                event_type = ?event.event_type,
                "cache event: {}",
                event.data
            ),
        }
        Ok(())
    }
}

/// Keeps delivered events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<CacheModuleEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CacheModuleEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for CollectingSink {
    fn deliver(&self, event: &CacheModuleEvent) -> Result<(), String> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// == Event Bus ==
/// Publishing half of the event channel, cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    source: Arc<str>,
    tx: mpsc::Sender<CacheModuleEvent>,
    dropped: Arc<AtomicU64>,
}

/// Receiving half, handed to [`spawn_dispatcher`].
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<CacheModuleEvent>,
}

impl EventReceiver {
    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<CacheModuleEvent> {
        self.rx.try_recv().ok()
    }
}

impl EventBus {
    /// Creates a bus for `source` with a channel of `capacity` events.
    pub fn new(source: impl Into<String>, capacity: usize) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let bus = Self {
            source: Arc::from(source.into()),
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (bus, EventReceiver { rx })
    }

    /// A bus whose events go nowhere.
    pub fn disconnected(source: impl Into<String>) -> Self {
        Self::new(source, 1).0
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Enqueues `event`; when the channel is full or closed the event is
    /// dropped and counted.
    pub fn publish(&self, event: CacheModuleEvent) {
        if let Err(e) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("event dropped: {}", e);
        }
    }

    /// Builds and publishes an event from this bus's source.
    pub fn emit(&self, event_type: EventType, severity: EventSeverity, data: Value) {
        self.publish(CacheModuleEvent::new(
            event_type,
            self.source.as_ref(),
            severity,
            data,
        ));
    }

    /// Number of events that could not be enqueued.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// == Dispatcher ==
/// Spawns the task that drains `receiver` into `sinks`.
///
/// A failing sink is logged and skipped; the task ends once every bus clone
/// has been dropped.
pub fn spawn_dispatcher(mut receiver: EventReceiver, sinks: Vec<Arc<dyn EventSink>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("event dispatcher started with {} sinks", sinks.len());
        while let Some(event) = receiver.rx.recv().await {
            for sink in &sinks {
                if let Err(e) = sink.deliver(&event) {
                    warn!("event sink failed for {:?}: {}", event.event_type, e);
                }
            }
        }
        debug!("event dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn deliver(&self, _event: &CacheModuleEvent) -> Result<(), String> {
            Err("sink offline".to_string())
        }
    }

    #[test]
    fn test_publish_never_blocks_when_full() {
        let (bus, mut rx) = EventBus::new("quote-cache", 2);
        for i in 0..5 {
            bus.emit(EventType::Custom, EventSeverity::Info, json!({ "i": i }));
        }
        assert_eq!(bus.dropped(), 3);
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_event_serializes_kebab_type() {
        let event = CacheModuleEvent::new(
            EventType::PerformanceAlert,
            "basic-cache",
            EventSeverity::Warn,
            json!({}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "performance-alert");
        assert_eq!(json["severity"], "warn");
        assert_eq!(json["requires_response"], false);
    }

    #[tokio::test]
    async fn test_dispatcher_survives_failing_sink() {
        let (bus, rx) = EventBus::new("basic-cache", 16);
        let collector = Arc::new(CollectingSink::new());
        let handle = spawn_dispatcher(rx, vec![Arc::new(FailingSink), collector.clone()]);

        bus.emit(EventType::HealthChange, EventSeverity::Info, json!({"status": "healthy"}));
        bus.emit(EventType::ConfigChange, EventSeverity::Info, json!({}));
        drop(bus);
        handle.await.unwrap();

        let events = collector.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].source_module, "basic-cache");
        assert_eq!(events[1].event_type, EventType::ConfigChange);
    }

    #[test]
    fn test_disconnected_bus_counts_drops() {
        let bus = EventBus::disconnected("orphan");
        bus.emit(EventType::Custom, EventSeverity::Info, json!(null));
        assert_eq!(bus.dropped(), 1);
    }
}
