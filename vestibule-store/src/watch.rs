// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed change-notification streams for store records.
//!
//! A component registers interest in one entity key and receives every subsequent change to it
//! as a [`Change`] on an unbounded channel. Senders never block: a subscriber that dropped its
//! receiver is pruned on the next notification for its key.

use std::collections::HashMap;
use std::hash::Hash as StdHash;

use tokio::sync::mpsc;

/// One observed change to a keyed record.
///
/// `previous` is `None` on creation, `current` is `None` on removal.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<T> {
    pub previous: Option<T>,
    pub current: Option<T>,
}

pub type ChangeSender<T> = mpsc::UnboundedSender<Change<T>>;

pub type ChangeReceiver<T> = mpsc::UnboundedReceiver<Change<T>>;

/// A grant-level change on one resource, feeding "who is in this resource" listings.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceGrantChange {
    Membership(Change<vestibule_core::Membership>),
    SessionGrant(Change<vestibule_core::SessionGrant>),
}

/// Registry of notification subscribers, keyed by the entity they watch.
///
/// Lives inside a store's guarded state: subscribing and notifying happen under the same lock
/// as the mutation itself, so subscribers observe changes in application order.
#[derive(Debug)]
pub struct WatcherSet<K, M> {
    watchers: HashMap<K, Vec<mpsc::UnboundedSender<M>>>,
}

impl<K, M> WatcherSet<K, M>
where
    K: Eq + StdHash,
    M: Clone,
{
    pub fn new() -> Self {
        Self {
            watchers: HashMap::new(),
        }
    }

    /// Register a new subscriber for `key` and return its receiving end.
    pub fn subscribe(&mut self, key: K) -> mpsc::UnboundedReceiver<M> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.entry(key).or_default().push(tx);
        rx
    }

    /// Notify all subscribers of `key`.
    ///
    /// Subscribers whose receiver has been dropped are removed, an empty entry is cleaned up.
    pub fn notify(&mut self, key: &K, message: M) {
        let Some(subscribers) = self.watchers.get_mut(key) else {
            return;
        };

        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        if subscribers.is_empty() {
            self.watchers.remove(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

impl<K, M> Default for WatcherSet<K, M>
where
    K: Eq + StdHash,
    M: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::error::TryRecvError;

    use super::{Change, WatcherSet};

    #[test]
    fn notifies_only_the_watched_key() {
        let mut set: WatcherSet<&str, Change<u64>> = WatcherSet::new();
        let mut a_rx = set.subscribe("a");
        let mut b_rx = set.subscribe("b");

        set.notify(
            &"a",
            Change {
                previous: None,
                current: Some(1),
            },
        );

        let change = a_rx.try_recv().expect("should return Ok");
        assert_eq!(change.current, Some(1));
        assert!(matches!(b_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut set: WatcherSet<&str, Change<u64>> = WatcherSet::new();
        let rx = set.subscribe("a");
        drop(rx);

        set.notify(
            &"a",
            Change {
                previous: None,
                current: Some(1),
            },
        );

        assert!(set.is_empty());
    }

    #[test]
    fn changes_arrive_in_application_order() {
        let mut set: WatcherSet<&str, Change<u64>> = WatcherSet::new();
        let mut rx = set.subscribe("a");

        for value in 1..=3 {
            set.notify(
                &"a",
                Change {
                    previous: Some(value - 1),
                    current: Some(value),
                },
            );
        }

        for value in 1..=3 {
            let change = rx.try_recv().expect("should return Ok");
            assert_eq!(change.current, Some(value));
        }
    }
}
