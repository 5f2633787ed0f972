//! In-process lifecycle event fan-out.
//!
//! Every subscriber owns a bounded queue. Publishing never blocks: when a
//! subscriber's queue is full the event is dropped for that subscriber only,
//! and a subscriber whose receiver was dropped is pruned on the next publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "workflow:started")]
    WorkflowStarted,
    #[serde(rename = "workflow:status_changed")]
    WorkflowStatusChanged,
    #[serde(rename = "workflow:cancelled")]
    WorkflowCancelled,
    #[serde(rename = "workflow:recovered")]
    WorkflowRecovered,
    #[serde(rename = "workflow:engine_linked")]
    WorkflowEngineLinked,
    #[serde(rename = "agent:assigned")]
    AgentAssigned,
    #[serde(rename = "agent:handoff")]
    AgentHandoff,
    #[serde(rename = "result:stored")]
    ResultStored,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::WorkflowStarted => "workflow:started",
            EventType::WorkflowStatusChanged => "workflow:status_changed",
            EventType::WorkflowCancelled => "workflow:cancelled",
            EventType::WorkflowRecovered => "workflow:recovered",
            EventType::WorkflowEngineLinked => "workflow:engine_linked",
            EventType::AgentAssigned => "agent:assigned",
            EventType::AgentHandoff => "agent:handoff",
            EventType::ResultStored => "result:stored",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub workflow_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, workflow_id: impl Into<String>, data: Value) -> Self {
        Self {
            event_type,
            workflow_id: workflow_id.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Per-publish delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug)]
struct Subscriber {
    filter: Option<EventType>,
    sender: mpsc::Sender<Event>,
}

impl Subscriber {
    fn wants(&self, event_type: EventType) -> bool {
        self.filter.map_or(true, |filter| filter == event_type)
    }
}

#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    history_limit: usize,
    subscribers: Mutex<Vec<Subscriber>>,
    history: Mutex<VecDeque<Event>>,
    dropped_total: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY, DEFAULT_HISTORY_LIMIT)
    }
}

impl EventBus {
    pub fn new(capacity: usize, history_limit: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history_limit,
            subscribers: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Receive events of one type.
    pub fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        self.register(Some(event_type))
    }

    /// Receive every event.
    pub fn subscribe_all(&self) -> mpsc::Receiver<Event> {
        self.register(None)
    }

    fn register(&self, filter: Option<EventType>) -> mpsc::Receiver<Event> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber { filter, sender });
        receiver
    }

    pub fn publish(&self, event: Event) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();

        {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subscribers.retain(|subscriber| {
                if !subscriber.wants(event.event_type) {
                    return !subscriber.sender.is_closed();
                }
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => {
                        outcome.delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        outcome.dropped += 1;
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                }
            });
        }

        if outcome.dropped > 0 {
            self.dropped_total
                .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
            debug!(
                event_type = %event.event_type,
                workflow_id = %event.workflow_id,
                dropped = outcome.dropped,
                "Subscriber queue full, event dropped"
            );
        }
        trace!(event_type = %event.event_type, delivered = outcome.delivered, "Event published");

        self.remember(event);
        outcome
    }

    fn remember(&self, event: Event) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == self.history_limit {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Events dropped on full queues since the bus was created.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|subscriber| !subscriber.sender.is_closed());
        subscribers.len()
    }

    /// Most recent events first, optionally restricted to some types.
    pub fn history(&self, limit: usize, types: &[EventType]) -> Vec<Event> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history
            .iter()
            .rev()
            .filter(|event| types.is_empty() || types.contains(&event.event_type))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Retained events for one workflow, oldest first.
    pub fn workflow_events(&self, workflow_id: &str) -> Vec<Event> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history
            .iter()
            .filter(|event| event.workflow_id == workflow_id)
            .cloned()
            .collect()
    }
}
