//! In-process notifier backed by bounded channels.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use vaultgate_core::UserId;

use crate::error::Result;
use crate::event::ConsentEvent;
use crate::notifier::{Notifier, Subscription};

/// Default per-subscription buffer.
pub const DEFAULT_CAPACITY: usize = 64;

/// Channel-per-subscription fan-out.
///
/// A full buffer drops the event for that subscriber only; a closed
/// subscription is pruned on the next publish.
pub struct MemoryNotifier {
    capacity: usize,
    senders: RwLock<HashMap<UserId, Vec<mpsc::Sender<ConsentEvent>>>>,
}

impl MemoryNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            senders: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, user_id: &UserId, event: ConsentEvent) -> Result<usize> {
        let mut senders = self.senders.write().await;
        let Some(subscribers) = senders.get_mut(user_id) else {
            return Ok(0);
        };

        let mut delivered = 0;
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user = %user_id, request_id = %event.request_id(), "subscriber lagging, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if subscribers.is_empty() {
            senders.remove(user_id);
        }

        tracing::debug!(user = %user_id, delivered, "published consent event");
        Ok(delivered)
    }

    async fn subscribe(&self, user_id: &UserId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders
            .write()
            .await
            .entry(user_id.clone())
            .or_default()
            .push(tx);
        Subscription::new(rx)
    }

    async fn subscriber_count(&self, user_id: &UserId) -> usize {
        self.senders
            .read()
            .await
            .get(user_id)
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use std::time::Duration;
    use vaultgate_core::{AgentContext, AgentId, ConsentRequest, RequestId, RequestStatus, Scope};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn pending(user_id: &str) -> ConsentEvent {
        let ctx = AgentContext::new(user(user_id), AgentId::new("a1").unwrap());
        ConsentEvent::Pending {
            request: ConsentRequest::new(
                &ctx,
                Scope::parse("attr.food.*").unwrap(),
                "meal plan",
                Duration::from_secs(60),
                0,
                Duration::from_secs(30),
            ),
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_all_sessions() {
        let notifier = MemoryNotifier::default();
        let mut phone = notifier.subscribe(&user("u1")).await;
        let mut laptop = notifier.subscribe(&user("u1")).await;
        let mut stranger = notifier.subscribe(&user("u2")).await;

        let event = pending("u1");
        assert_eq!(notifier.publish(&user("u1"), event.clone()).await.unwrap(), 2);

        assert_eq!(phone.recv().await, Some(event.clone()));
        assert_eq!(laptop.recv().await, Some(event));
        assert_eq!(stranger.try_recv(), Err(NotifyError::Empty));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let notifier = MemoryNotifier::default();
        assert_eq!(notifier.publish(&user("u1"), pending("u1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_without_blocking() {
        let notifier = MemoryNotifier::new(1);
        let mut sub = notifier.subscribe(&user("u1")).await;

        assert_eq!(notifier.publish(&user("u1"), pending("u1")).await.unwrap(), 1);
        assert_eq!(notifier.publish(&user("u1"), pending("u1")).await.unwrap(), 0);

        assert!(sub.try_recv().is_ok());
        assert_eq!(sub.try_recv(), Err(NotifyError::Empty));
        assert_eq!(notifier.subscriber_count(&user("u1")).await, 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let notifier = MemoryNotifier::default();
        let sub = notifier.subscribe(&user("u1")).await;
        drop(sub);

        let resolved = ConsentEvent::Resolved {
            request_id: RequestId::generate(),
            status: RequestStatus::Approved,
        };
        assert_eq!(notifier.publish(&user("u1"), resolved).await.unwrap(), 0);
        assert_eq!(notifier.subscriber_count(&user("u1")).await, 0);
    }

    #[tokio::test]
    async fn test_recv_timeout_returns_none() {
        let notifier = MemoryNotifier::default();
        let mut sub = notifier.subscribe(&user("u1")).await;
        assert_eq!(
            sub.recv_timeout(Duration::from_millis(10)).await.unwrap(),
            None
        );
    }
}
