//! Store change notifications.
//!
//! # Responsibility
//! - Fan committed change sets out to every live subscriber.
//! - Tie subscriber lifetime to an explicit `Subscription` handle.
//!
//! # Invariants
//! - Notifications are posted after the SQLite transaction commits, never before.
//! - Subscribers see notifications in generation order.
//! - Dropping or unsubscribing a `Subscription` stops delivery to it.

use crate::model::dream::DreamId;
use crate::repo::history_repo::ChangeOrigin;
use crate::store::context::ContextId;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// One committed change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub generation: u64,
    /// Context name for local saves, container identifier for remote imports.
    pub author: String,
    /// Saving context; `None` for remote imports.
    pub context_id: Option<ContextId>,
    pub origin: ChangeOrigin,
    pub inserted: Vec<DreamId>,
    pub updated: Vec<DreamId>,
    pub deleted: Vec<DreamId>,
}

impl ChangeNotification {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    pub fn touches(&self, id: DreamId) -> bool {
        self.inserted.contains(&id) || self.updated.contains(&id) || self.deleted.contains(&id)
    }
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, Sender<ChangeNotification>)>>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::channel();
        if let Ok(mut observers) = self.observers.lock() {
            observers.push((id, sender));
        }
        debug!("event=subscribe module=store status=ok subscription_id={id}");
        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(self),
        }
    }

    /// Delivers to every observer; observers whose receiver is gone are pruned.
    pub(crate) fn post(&self, notification: &ChangeNotification) {
        let Ok(mut observers) = self.observers.lock() else {
            return;
        };
        observers.retain(|(_, sender)| sender.send(notification.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.lock().map(|observers| observers.len()).unwrap_or(0)
    }

    fn remove(&self, id: u64) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|(observer_id, _)| *observer_id != id);
        }
    }
}

/// Receiving end of the store's change stream.
pub struct Subscription {
    id: u64,
    receiver: Receiver<ChangeNotification>,
    registry: Weak<ObserverRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the next queued notification without blocking.
    pub fn try_next(&self) -> Option<ChangeNotification> {
        match self.receiver.try_recv() {
            Ok(notification) => Some(notification),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Returns every queued notification, oldest first.
    pub fn drain(&self) -> Vec<ChangeNotification> {
        self.receiver.try_iter().collect()
    }

    /// Blocks up to `timeout` for the next notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeNotification> {
        match self.receiver.recv_timeout(timeout) {
            Ok(notification) => Some(notification),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stops delivery explicitly.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
            debug!(
                "event=unsubscribe module=store status=ok subscription_id={}",
                self.id
            );
        }
    }
}
