//! Typed in-process publish/subscribe channel.
//!
//! The bus carries two disjoint message kinds, capability requests and
//! notification items. Producers call [`RequestBus::emit`] and never block;
//! each subscriber gets its own unbounded channel and sees every message its
//! predicate accepts, in emission order.
//!
//! # Example
//!
//! ```ignore
//! let bus = RequestBus::new();
//! let mut requests = bus.subscribe(BusMessage::is_capability);
//!
//! bus.emit(BusMessage::Capability(request));
//! while let Some(message) = requests.next().await {
//!     // ...
//! }
//! ```

use crate::arbiter::CapabilityRequest;
use crate::notification::NotificationItem;
use futures::Stream;
use futures::channel::mpsc;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

/// A message carried on the [`RequestBus`]
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A producer asks for a capability
    Capability(CapabilityRequest),
    /// A producer shows an in-app notification
    Notification(NotificationItem),
}

impl BusMessage {
    /// Whether this is a capability request
    #[must_use]
    pub const fn is_capability(&self) -> bool {
        matches!(self, Self::Capability(_))
    }

    /// Whether this is a notification
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Capability(_) => "capability",
            Self::Notification(_) => "notification",
        }
    }
}

type Predicate = Box<dyn Fn(&BusMessage) -> bool + Send + Sync>;

struct Subscriber {
    predicate: Predicate,
    sender: mpsc::UnboundedSender<BusMessage>,
}

/// Process-wide request bus
///
/// Cloning is cheap; clones share the subscriber registry.
#[derive(Clone, Default)]
pub struct RequestBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl RequestBus {
    /// Create a bus with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a message to every matching subscriber
    ///
    /// Never blocks. Subscribers whose stream was dropped are pruned.
    pub fn emit(&self, message: BusMessage) {
        let kind = message.label();
        metrics::counter!("bus.messages.emitted", "kind" => kind).increment(1);

        // Sends happen under the registry lock so concurrent emitters are
        // observed in the same order by every subscriber.
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0_u64;
        subscribers.retain(|subscriber| {
            if !(subscriber.predicate)(&message) {
                return !subscriber.sender.is_closed();
            }
            match subscriber.sender.unbounded_send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                },
                Err(_) => {
                    tracing::debug!(kind, "Pruning closed subscriber");
                    false
                },
            }
        });

        tracing::trace!(kind, delivered, "Message emitted");
        metrics::counter!("bus.messages.delivered", "kind" => kind).increment(delivered);
    }

    /// Subscribe to every message accepted by `predicate`
    ///
    /// Only messages emitted after this call are delivered.
    #[must_use]
    pub fn subscribe<P>(&self, predicate: P) -> Subscription
    where
        P: Fn(&BusMessage) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                predicate: Box::new(predicate),
                sender,
            });
        Subscription { receiver }
    }

    /// Number of live subscribers (closed ones are counted until the next emit)
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for RequestBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Stream of messages for one subscriber
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<BusMessage>,
}

impl Stream for Subscription {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::CapabilityRequest;
    use crate::catalog::RequestKind;
    use crate::notification::{NotificationContent, NotificationItem, NotificationType};
    use futures::StreamExt;
    use promptbus_testing::test_clock;

    fn capability(kind: RequestKind) -> BusMessage {
        BusMessage::Capability(CapabilityRequest::new(kind))
    }

    fn notification(title: &str) -> BusMessage {
        BusMessage::Notification(NotificationItem::typed(
            NotificationType::Info,
            NotificationContent::new(title, "message"),
            &test_clock(),
        ))
    }

    #[tokio::test]
    async fn test_predicates_do_not_cross_talk() {
        let bus = RequestBus::new();
        let requests = bus.subscribe(BusMessage::is_capability);
        let notifications = bus.subscribe(BusMessage::is_notification);

        bus.emit(notification("one"));
        bus.emit(capability(RequestKind::CameraAccess));
        drop(bus);

        let requests: Vec<_> = requests.collect().await;
        let notifications: Vec<_> = notifications.collect().await;

        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_capability());
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].is_notification());
    }

    #[tokio::test]
    async fn test_delivery_preserves_emission_order() {
        let bus = RequestBus::new();
        let all = bus.subscribe(|_| true);

        for title in ["a", "b", "c"] {
            bus.emit(notification(title));
        }
        drop(bus);

        let titles: Vec<String> = all
            .filter_map(|message| async move {
                match message {
                    BusMessage::Notification(item) => Some(item.content.title),
                    BusMessage::Capability(_) => None,
                }
            })
            .collect()
            .await;
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_subscription_wakes_only_for_matching_messages() {
        let bus = RequestBus::new();
        let mut requests = tokio_test::task::spawn(bus.subscribe(BusMessage::is_capability));

        tokio_test::assert_pending!(requests.poll_next());
        bus.emit(notification("ignored"));
        assert!(!requests.is_woken());
        tokio_test::assert_pending!(requests.poll_next());

        bus.emit(capability(RequestKind::CameraAccess));
        assert!(requests.is_woken());
        let message = tokio_test::assert_ready!(requests.poll_next());
        assert!(message.is_some_and(|message| message.is_capability()));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = RequestBus::new();
        let keep = bus.subscribe(|_| true);
        let dropped = bus.subscribe(|_| true);
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.emit(capability(RequestKind::AppRating));
        assert_eq!(bus.subscriber_count(), 1);
        drop(keep);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = RequestBus::new();
        bus.emit(capability(RequestKind::LocationAccess));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
