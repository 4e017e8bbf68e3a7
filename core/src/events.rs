use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Anything that can travel over an [`EventChannel`].
pub trait Event: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Event for T {}

/// A directory entry was activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSelected {
    pub room_id: String,
    pub name: String,
}

/// Short-lived, user-facing outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RoomCreated { name: String },
    RoomCreateFailed { name: String, reason: String },
    SendFailed { reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RoomCreated { name } => write!(f, "room \"{name}\" created"),
            Notice::RoomCreateFailed { name, reason } => {
                write!(f, "could not create room \"{name}\": {reason}")
            }
            Notice::SendFailed { reason } => write!(f, "message not sent: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Slot {
    id: SubscriberId,
    sender: Box<dyn Any + Send>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<TypeId, Vec<Slot>>,
}

/// In-process publish/subscribe keyed by payload type.
///
/// Every subscriber gets its own queue, drained by whoever owns the
/// [`EventReceiver`]. Events published before a subscription are not
/// replayed, and there is no ordering between different event types.
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Mutex<Registry>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type `E`.
    pub fn subscribe<E: Event>(&self) -> EventReceiver<E> {
        let (tx, rx) = unbounded_channel::<E>();
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = SubscriberId(registry.next_id);
        registry
            .subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Slot {
                id,
                sender: Box::new(tx),
            });
        EventReceiver { id, rx }
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut registry = self.registry.lock();
        let mut found = false;
        for list in registry.subscribers.values_mut() {
            let before = list.len();
            list.retain(|slot| slot.id != id);
            found |= list.len() != before;
        }
        found
    }

    /// Deliver `event` to every current subscriber of its type. Returns the
    /// number of subscribers reached.
    pub fn publish<E: Event>(&self, event: E) -> usize {
        let mut registry = self.registry.lock();
        let Some(list) = registry.subscribers.get_mut(&TypeId::of::<E>()) else {
            return 0;
        };
        let mut delivered = 0;
        list.retain(|slot| match slot.sender.downcast_ref::<UnboundedSender<E>>() {
            Some(tx) if tx.send(event.clone()).is_ok() => {
                delivered += 1;
                true
            }
            _ => false,
        });
        delivered
    }

    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.registry
            .lock()
            .subscribers
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        let count: usize = registry.subscribers.values().map(Vec::len).sum();
        f.debug_struct("EventChannel")
            .field("subscribers", &count)
            .finish()
    }
}

/// Receiving end of a subscription.
pub struct EventReceiver<E> {
    id: SubscriberId,
    rx: UnboundedReceiver<E>,
}

impl<E> EventReceiver<E> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}
