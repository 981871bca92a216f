//! In-process event bus between a command body and the UI.
//!
//! Built on a `tokio::sync::broadcast` channel. Publishing never blocks; a
//! subscriber that falls more than `capacity` events behind skips the
//! missed events and logs a warning.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// Kind of the event that asks the event loop to stop consuming events.
pub const EXIT_EVENT: &str = "clio.exit";

/// A typed notification published on the bus.
#[derive(Clone)]
pub struct Event {
    kind: Cow<'static, str>,
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl Event {
    pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: kind.into(),
            value: None,
        }
    }

    /// Attach a payload.
    pub fn with_value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.value = Some(Arc::new(value));
        self
    }

    /// The exit event.
    pub fn exit() -> Self {
        Self::new(EXIT_EVENT)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_exit(&self) -> bool {
        self.kind == EXIT_EVENT
    }

    /// Payload, if present and of type `T`.
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("has_value", &self.value.is_some())
            .finish()
    }
}

/// Publishing side of the bus. Clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct Bus {
    sender: broadcast::Sender<Event>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event, returning how many subscribers will see it.
    pub fn publish(&self, event: Event) -> usize {
        // no subscribers is not an error; the event is dropped
        self.sender.send(event).unwrap_or(0)
    }

    /// Publish the exit event.
    pub fn exit(&self) -> usize {
        self.publish(Event::exit())
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving side of the bus. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Next event, or `None` once every [`Bus`] handle is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-queued event, without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
