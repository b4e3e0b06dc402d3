use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::Verdict;

/// Buffered events per topic before slow subscribers start missing some
const TOPIC_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Running,
    Completed,
    Error,
}

/// One lifecycle notification for a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<i64>,
    pub status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    pub fn running(submission_id: i64) -> Self {
        Self {
            submission_id: Some(submission_id),
            status: EventStatus::Running,
            verdict: None,
            error: None,
        }
    }

    pub fn completed(submission_id: i64, verdict: Verdict) -> Self {
        Self {
            submission_id: Some(submission_id),
            status: EventStatus::Completed,
            verdict: Some(verdict),
            error: None,
        }
    }

    pub fn error(submission_id: Option<i64>, error: impl Into<String>) -> Self {
        Self {
            submission_id,
            status: EventStatus::Error,
            verdict: None,
            error: Some(error.into()),
        }
    }
}

/// Topic based fan-out of status events, keyed by user id
///
/// Delivery is at most once: nothing is stored, acknowledged or retried, and
/// a subscriber that is not listening when an event goes out never sees it.
#[derive(Debug, Default)]
pub struct StatusBroadcaster {
    topics: RwLock<HashMap<String, broadcast::Sender<StatusEvent>>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<StatusEvent> {
        let mut topics = self.topics.write();
        match topics.get(topic) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(TOPIC_CAPACITY);
                topics.insert(topic.to_string(), sender);
                receiver
            }
        }
    }

    /// Sends `event` to every current subscriber of `topic`
    ///
    /// Returns how many subscribers it reached.
    pub fn publish(&self, topic: &str, event: StatusEvent) -> usize {
        let delivered = self
            .topics
            .read()
            .get(topic)
            .map_or(0, |sender| sender.send(event.clone()).unwrap_or(0));

        if delivered == 0 {
            log::debug!("No listener on topic {topic} for {:?} event", event.status);
            self.prune(topic);
        } else {
            log::debug!("Delivered {:?} event to {delivered} listener(s) on topic {topic}", event.status);
        }
        delivered
    }

    /// Drops every topic, which ends all open subscriptions
    pub fn close(&self) {
        self.topics.write().clear();
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    fn prune(&self, topic: &str) {
        let mut topics = self.topics.write();
        if topics
            .get(topic)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            topics.remove(topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn test_event_payloads() {
        assert_json_eq!(
            serde_json::to_value(StatusEvent::running(4)).unwrap(),
            json!({ "submissionId": 4, "status": "running" })
        );
        assert_json_eq!(
            serde_json::to_value(StatusEvent::completed(4, Verdict::Pass)).unwrap(),
            json!({ "submissionId": 4, "status": "completed", "verdict": "Pass" })
        );
        assert_json_eq!(
            serde_json::to_value(StatusEvent::error(None, "boom")).unwrap(),
            json!({ "status": "error", "error": "boom" })
        );
    }

    #[tokio::test]
    async fn test_every_session_of_a_user_receives_events() {
        let broadcaster = StatusBroadcaster::new();
        let mut tab_one = broadcaster.subscribe("alice");
        let mut tab_two = broadcaster.subscribe("alice");
        let mut other = broadcaster.subscribe("bob");

        assert_eq!(broadcaster.publish("alice", StatusEvent::running(1)), 2);

        assert_eq!(tab_one.recv().await.unwrap(), StatusEvent::running(1));
        assert_eq!(tab_two.recv().await.unwrap(), StatusEvent::running(1));
        assert!(matches!(other.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_publish_without_listeners_is_dropped() {
        let broadcaster = StatusBroadcaster::new();
        assert_eq!(broadcaster.publish("nobody", StatusEvent::running(1)), 0);
        assert_eq!(broadcaster.topic_count(), 0);

        // events sent before subscribing are not replayed
        let mut late = broadcaster.subscribe("nobody");
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_abandoned_topics_are_pruned() {
        let broadcaster = StatusBroadcaster::new();
        drop(broadcaster.subscribe("alice"));
        assert_eq!(broadcaster.topic_count(), 1);

        broadcaster.publish("alice", StatusEvent::running(1));
        assert_eq!(broadcaster.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let broadcaster = StatusBroadcaster::new();
        let mut receiver = broadcaster.subscribe("alice");
        broadcaster.close();
        assert!(matches!(receiver.recv().await, Err(RecvError::Closed)));
    }
}
