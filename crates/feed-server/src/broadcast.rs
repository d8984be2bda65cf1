//! Live change notifications
//!
//! Post mutations are fanned out over a tokio broadcast channel. The channel
//! owns the subscriber set; clients join with [`ChangeBroadcaster::subscribe`]
//! and leave by dropping their [`Subscription`]. There is no replay: only
//! subscribers connected at publish time see an event.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::Post;

/// Event pushed to live clients, serialized as `{"action": ..., "post": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "post", rename_all = "lowercase")]
pub enum FeedEvent {
    Create(Post),
    Update(Post),
    /// Carries only the id of the removed post
    Delete(String),
}

impl FeedEvent {
    pub fn action(&self) -> &'static str {
        match self {
            FeedEvent::Create(_) => "create",
            FeedEvent::Update(_) => "update",
            FeedEvent::Delete(_) => "delete",
        }
    }
}

/// Outcome of a publish. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered(usize),
    NoSubscribers,
}

#[derive(Clone)]
pub struct ChangeBroadcaster {
    tx: broadcast::Sender<FeedEvent>,
}

impl ChangeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> Subscription {
        debug!("[Live] subscriber joined ({} total)", self.tx.receiver_count() + 1);
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send `event` to every current subscriber without waiting on any of them
    pub fn publish(&self, event: FeedEvent) -> Delivery {
        let action = event.action();
        match self.tx.send(event) {
            Ok(n) => {
                debug!("[Live] {} delivered to {} subscriber(s)", action, n);
                Delivery::Delivered(n)
            }
            Err(_) => {
                debug!("[Live] {} dropped, nobody listening", action);
                Delivery::NoSubscribers
            }
        }
    }
}

/// A live subscriber's handle on the event stream
pub struct Subscription {
    rx: broadcast::Receiver<FeedEvent>,
}

impl Subscription {
    /// Next event, or `None` once the broadcaster is gone.
    /// Events missed by a lagging subscriber are skipped.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("[Live] subscriber lagged, skipped {} event(s)", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Creator;
    use chrono::Utc;

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            title: "T".into(),
            content: "C".into(),
            image_url: "images/a.jpg".into(),
            creator: Creator {
                id: "u1".into(),
                name: None,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_connected_subscribers_receive() {
        let broadcaster = ChangeBroadcaster::new(8);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let created = post("p1");
        let delivery = broadcaster.publish(FeedEvent::Create(created.clone()));
        assert_eq!(delivery, Delivery::Delivered(2));

        assert_eq!(a.recv().await, Some(FeedEvent::Create(created.clone())));
        assert_eq!(b.recv().await, Some(FeedEvent::Create(created)));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let broadcaster = ChangeBroadcaster::new(8);
        let mut early = broadcaster.subscribe();

        broadcaster.publish(FeedEvent::Delete("p1".into()));
        let mut late = broadcaster.subscribe();
        broadcaster.publish(FeedEvent::Delete("p2".into()));

        assert_eq!(early.recv().await, Some(FeedEvent::Delete("p1".into())));
        assert_eq!(early.recv().await, Some(FeedEvent::Delete("p2".into())));
        assert_eq!(late.recv().await, Some(FeedEvent::Delete("p2".into())));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = ChangeBroadcaster::new(8);
        assert_eq!(
            broadcaster.publish(FeedEvent::Delete("p1".into())),
            Delivery::NoSubscribers
        );
    }

    #[tokio::test]
    async fn test_dropped_subscription_leaves_set() {
        let broadcaster = ChangeBroadcaster::new(8);
        let sub = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let broadcaster = ChangeBroadcaster::new(2);
        let mut sub = broadcaster.subscribe();

        for id in ["p1", "p2", "p3", "p4"] {
            broadcaster.publish(FeedEvent::Delete(id.into()));
        }

        assert_eq!(sub.recv().await, Some(FeedEvent::Delete("p3".into())));
        assert_eq!(sub.recv().await, Some(FeedEvent::Delete("p4".into())));
    }

    #[tokio::test]
    async fn test_closed_when_broadcaster_dropped() {
        let broadcaster = ChangeBroadcaster::new(2);
        let mut sub = broadcaster.subscribe();
        drop(broadcaster);

        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(FeedEvent::Delete("p9".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "action": "delete", "post": "p9" }));

        let json = serde_json::to_value(FeedEvent::Update(post("p1"))).unwrap();
        assert_eq!(json["action"], "update");
        assert_eq!(json["post"]["id"], "p1");
    }
}
