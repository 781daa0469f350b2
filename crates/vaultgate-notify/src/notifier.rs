//! Publish/subscribe abstraction for consent events.
//!
//! Delivery is best-effort. A missed event never invalidates a request:
//! clients that were offline catch up by listing pending requests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use vaultgate_core::UserId;

use crate::error::{NotifyError, Result};
use crate::event::ConsentEvent;

/// Fan-out of consent events to a user's live sessions.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `event` to every live subscription of `user_id`.
    ///
    /// Never blocks on a slow subscriber. Returns how many subscriptions
    /// accepted the event.
    async fn publish(&self, user_id: &UserId, event: ConsentEvent) -> Result<usize>;

    /// Open a new subscription for `user_id`.
    async fn subscribe(&self, user_id: &UserId) -> Subscription;

    /// Number of open subscriptions for `user_id`.
    async fn subscriber_count(&self, user_id: &UserId) -> usize;
}

/// A stream of events for one session. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<ConsentEvent>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<ConsentEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<ConsentEvent> {
        self.receiver.recv().await
    }

    /// Take an event if one is ready.
    pub fn try_recv(&mut self) -> Result<ConsentEvent> {
        self.receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => NotifyError::Empty,
            mpsc::error::TryRecvError::Disconnected => NotifyError::Closed,
        })
    }

    /// Wait up to `timeout` for the next event.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ConsentEvent>> {
        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(NotifyError::Closed),
            Err(_) => Ok(None),
        }
    }
}
