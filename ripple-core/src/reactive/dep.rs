//! Dependency records.
//!
//! A record exists per `(container, key)` pair that has ever been read inside
//! a tracked run. It holds the subscribers that read the pair during their
//! latest run, in registration order and without duplicates. Subscribers are
//! held weakly; dropped or disposed subscribers are pruned the next time the
//! record fans out.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::subscriber::{Subscriber, SubscriberId};
use crate::store::Key;

pub(crate) struct DepRecord {
    key: Key,
    subscribers: RefCell<IndexMap<SubscriberId, Weak<Subscriber>>>,
}

impl DepRecord {
    pub(crate) fn new(key: Key) -> Rc<Self> {
        Rc::new(Self {
            key,
            subscribers: RefCell::new(IndexMap::new()),
        })
    }

    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    /// Register a subscriber. Returns `false` if it was already registered.
    pub(crate) fn add(&self, subscriber: &Rc<Subscriber>) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&subscriber.id()) {
            return false;
        }
        subscribers.insert(subscriber.id(), Rc::downgrade(subscriber));
        true
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        self.subscribers.borrow_mut().shift_remove(&id);
    }

    /// Live subscribers in registration order. Stale entries are pruned.
    pub(crate) fn live(&self) -> Vec<Rc<Subscriber>> {
        let mut subscribers = self.subscribers.borrow_mut();
        let mut live = Vec::with_capacity(subscribers.len());
        subscribers.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) if !subscriber.is_disposed() => {
                live.push(subscriber);
                true
            }
            _ => false,
        });
        live
    }

    /// Number of live subscribers.
    pub(crate) fn len(&self) -> usize {
        self.subscribers
            .borrow()
            .values()
            .filter(|weak| weak.upgrade().is_some_and(|s| !s.is_disposed()))
            .count()
    }
}

impl fmt::Debug for DepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepRecord")
            .field("key", &self.key)
            .field("subscribers", &self.subscribers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::runtime::Runtime;
    use crate::reactive::subscriber::{Body, SubscriberKind};

    fn subscriber(runtime: &Runtime) -> Rc<Subscriber> {
        Rc::new(Subscriber::new(
            SubscriberKind::Reaction,
            runtime,
            Body::Job(Box::new(|_| Ok(()))),
        ))
    }

    #[test]
    fn add_deduplicates_and_keeps_order() {
        let runtime = Runtime::new();
        let record = DepRecord::new(Key::from("name"));
        let first = subscriber(&runtime);
        let second = subscriber(&runtime);

        assert!(record.add(&first));
        assert!(record.add(&second));
        assert!(!record.add(&first));

        let ids: Vec<_> = record.live().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![first.id(), second.id()]);
    }

    #[test]
    fn live_prunes_dropped_and_disposed() {
        let runtime = Runtime::new();
        let record = DepRecord::new(Key::Index(0));
        let kept = subscriber(&runtime);
        let disposed = subscriber(&runtime);

        record.add(&kept);
        record.add(&disposed);
        {
            let dropped = subscriber(&runtime);
            record.add(&dropped);
        }
        disposed.dispose();

        let live = record.live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), kept.id());
        assert_eq!(record.subscribers.borrow().len(), 1);
    }
}
