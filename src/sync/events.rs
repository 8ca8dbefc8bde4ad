//! Job lifecycle events and the publishers that carry them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncEvent {
    pub job_id: Uuid,
    pub kind: SyncEventKind,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventKind::Started => "started",
            SyncEventKind::Completed => "completed",
            SyncEventKind::Failed => "failed",
        }
    }
}

impl SyncEvent {
    pub fn started(job_id: Uuid, user_id: i64, username: &str) -> Self {
        Self {
            job_id,
            kind: SyncEventKind::Started,
            status: 202,
            payload: Some(serde_json::json!({ "user_id": user_id, "username": username })),
            error: None,
        }
    }

    pub fn completed(job_id: Uuid, payload: Value) -> Self {
        Self {
            job_id,
            kind: SyncEventKind::Completed,
            status: 200,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(job_id: Uuid, status: u16, error: impl Into<String>) -> Self {
        Self {
            job_id,
            kind: SyncEventKind::Failed,
            status,
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind != SyncEventKind::Started
    }
}

/// Outbound sink for job events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SyncEvent);
}

/// Fans events out to in-process subscribers.
///
/// The most recent terminal events are also retained, so a watcher that
/// subscribes after its job already finished still sees the outcome.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<SyncEvent>,
    recent_terminal: Arc<Mutex<VecDeque<SyncEvent>>>,
    retain: usize,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            recent_terminal: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            retain: capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Follow one job (ending after its terminal event), or every job when `job_id` is `None`.
    pub fn watch(&self, job_id: Option<Uuid>) -> JobEventStream {
        // Subscribe before looking at the backlog so nothing falls in between.
        let receiver = self.sender.subscribe();
        let backlog = job_id.and_then(|job_id| {
            self.recent_terminal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .find(|event| event.job_id == job_id)
                .cloned()
        });

        JobEventStream {
            receiver,
            job_id,
            backlog,
            finished: false,
        }
    }

    fn remember(&self, event: &SyncEvent) {
        let mut recent = self
            .recent_terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if recent.len() == self.retain {
            recent.pop_front();
        }
        recent.push_back(event.clone());
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: SyncEvent) {
        if event.is_terminal() {
            self.remember(&event);
        }
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

/// A broadcast subscription narrowed to one job.
#[derive(Debug)]
pub struct JobEventStream {
    receiver: broadcast::Receiver<SyncEvent>,
    job_id: Option<Uuid>,
    backlog: Option<SyncEvent>,
    finished: bool,
}

impl JobEventStream {
    /// Next matching event, or `None` once the watched job has finished or the
    /// publisher is gone.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        if self.finished {
            return None;
        }
        if let Some(event) = self.backlog.take() {
            self.finished = true;
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    let Some(job_id) = self.job_id else {
                        return Some(event);
                    };
                    if event.job_id != job_id {
                        continue;
                    }
                    self.finished = event.is_terminal();
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event watcher fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Emits each event as a structured log line.
#[derive(Debug, Clone, Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: SyncEvent) {
        match event.kind {
            SyncEventKind::Failed => tracing::warn!(
                job_id = %event.job_id,
                status = event.status,
                error = event.error.as_deref().unwrap_or_default(),
                "Sync job failed"
            ),
            kind => tracing::info!(
                job_id = %event.job_id,
                status = event.status,
                kind = ?kind,
                "Sync job event"
            ),
        }
    }
}

/// Publishes to every inner publisher in order.
#[derive(Default)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: SyncEvent) {
        for publisher in &self.publishers {
            publisher.publish(event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let job_id = Uuid::new_v4();

        publisher
            .publish(SyncEvent::failed(job_id, 400, "bad code"))
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, job_id);
        assert!(event.is_terminal());
        assert_eq!(event.error.as_deref(), Some("bad code"));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let publisher = BroadcastPublisher::default();
        publisher
            .publish(SyncEvent::completed(Uuid::new_v4(), serde_json::json!({})))
            .await;
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn fanout_reaches_every_publisher() {
        let first = BroadcastPublisher::new(4);
        let second = BroadcastPublisher::new(4);
        let (mut rx1, mut rx2) = (first.subscribe(), second.subscribe());
        let fanout = FanoutPublisher::new(vec![
            Arc::new(first) as Arc<dyn EventPublisher>,
            Arc::new(second),
            Arc::new(TracingPublisher),
        ]);

        fanout
            .publish(SyncEvent::started(Uuid::new_v4(), 1, "octo"))
            .await;

        assert_eq!(rx1.recv().await.unwrap().kind, SyncEventKind::Started);
        assert_eq!(rx2.recv().await.unwrap().kind, SyncEventKind::Started);
    }

    #[tokio::test]
    async fn watch_follows_one_job_until_its_terminal_event() {
        let publisher = BroadcastPublisher::new(8);
        let (mine, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut watch = publisher.watch(Some(mine));

        publisher.publish(SyncEvent::started(other, 2, "other")).await;
        publisher.publish(SyncEvent::started(mine, 1, "octo")).await;
        publisher
            .publish(SyncEvent::completed(mine, serde_json::json!({})))
            .await;
        publisher.publish(SyncEvent::failed(other, 500, "boom")).await;

        let started = watch.next_event().await.unwrap();
        assert_eq!((started.job_id, started.kind), (mine, SyncEventKind::Started));
        let done = watch.next_event().await.unwrap();
        assert_eq!((done.job_id, done.kind), (mine, SyncEventKind::Completed));
        assert!(watch.next_event().await.is_none());
    }

    #[tokio::test]
    async fn late_watcher_gets_the_retained_outcome() {
        let publisher = BroadcastPublisher::new(2);
        let job_id = Uuid::new_v4();
        publisher.publish(SyncEvent::failed(job_id, 400, "bad code")).await;

        let mut watch = publisher.watch(Some(job_id));
        let event = watch.next_event().await.unwrap();
        assert_eq!(event.status, 400);
        assert!(watch.next_event().await.is_none());

        // Older outcomes fall out once the retention window is full.
        publisher.publish(SyncEvent::failed(Uuid::new_v4(), 500, "a")).await;
        publisher.publish(SyncEvent::failed(Uuid::new_v4(), 500, "b")).await;
        let watch = publisher.watch(Some(job_id));
        assert!(watch.backlog.is_none());
    }

    #[test]
    fn failed_event_serializes_without_payload() {
        let value = serde_json::to_value(SyncEvent::failed(Uuid::nil(), 502, "down")).unwrap();
        assert_eq!(value["kind"], "failed");
        assert_eq!(value["status"], 502);
        assert!(value.get("payload").is_none());
    }
}
