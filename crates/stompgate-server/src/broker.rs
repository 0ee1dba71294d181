//! In-memory topic broker
//!
//! One broadcast channel per destination, created on first subscription.
//! Delivery is best effort: a subscriber that falls more than
//! [`TOPIC_CAPACITY`] messages behind skips the ones it missed. A channel is
//! forgotten as soon as its last [`TopicSubscription`] is dropped.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use stompgate_auth::{Frame, StompCommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

/// Buffered messages per destination
pub const TOPIC_CAPACITY: usize = 256;

/// A message published to a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Destination the message was sent to
    pub destination: String,
    /// `content-type` of the SEND frame, if any
    pub content_type: Option<String>,
    /// Message body
    pub body: Bytes,
}

impl Published {
    /// MESSAGE frame delivering this message to subscription `subscription`
    pub fn to_message_frame(&self, subscription: &str) -> Frame {
        let mut frame = Frame::new(StompCommand::Message)
            .with_header("destination", self.destination.as_str())
            .with_header("message-id", Uuid::new_v4().to_string())
            .with_header("subscription", subscription);
        if let Some(content_type) = &self.content_type {
            frame = frame.with_header("content-type", content_type.as_str());
        }
        frame
            .with_header("content-length", self.body.len().to_string())
            .with_body(self.body.clone())
    }
}

/// Destination registry shared by all connections
#[derive(Debug, Default)]
pub struct Broker {
    topics: DashMap<String, broadcast::Sender<Published>>,
}

impl Broker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every message published to `destination` from now on
    pub fn subscribe(&self, destination: &str) -> broadcast::Receiver<Published> {
        self.topics
            .entry(destination.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish a message; returns how many subscriptions received it
    pub fn publish(&self, message: Published) -> usize {
        let destination = message.destination.clone();
        let delivered = match self.topics.get(&destination) {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            // Nobody listens any more; forget the channel
            self.topics
                .remove_if(&destination, |_, sender| sender.receiver_count() == 0);
        }
        debug!(destination = %destination, delivered, "Message published");
        delivered
    }

    /// Subscribe to `destination` for as long as the returned handle lives
    pub fn lease(self: &Arc<Self>, destination: &str) -> TopicSubscription {
        TopicSubscription {
            receiver: Some(self.subscribe(destination)),
            broker: Arc::clone(self),
            destination: destination.to_string(),
        }
    }

    /// Forget the channel of `destination` if nobody receives from it
    pub fn release(&self, destination: &str) {
        if self
            .topics
            .remove_if(destination, |_, sender| sender.receiver_count() == 0)
            .is_some()
        {
            debug!(destination, "Topic released");
        }
    }

    /// Number of destinations with a live channel
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// Receiving end of one subscription; releases its topic when dropped
#[derive(Debug)]
pub struct TopicSubscription {
    receiver: Option<broadcast::Receiver<Published>>,
    broker: Arc<Broker>,
    destination: String,
}

impl TopicSubscription {
    /// Destination this subscription listens on
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Next message published to the destination
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Lagged`] after messages were skipped and
    /// [`RecvError::Closed`] once the channel is gone.
    pub async fn recv(&mut self) -> Result<Published, RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(RecvError::Closed),
        }
    }
}

impl Drop for TopicSubscription {
    fn drop(&mut self) {
        // The receiver must be gone before the count is checked
        drop(self.receiver.take());
        self.broker.release(&self.destination);
    }
}
