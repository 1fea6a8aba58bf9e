use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::value::Value;

/// Callback invoked with `(timestamp, value)` whenever a node is notified.
///
/// Handlers run synchronously on the thread delivering the notification and
/// must not call back into the tree or session that fired them.
pub type Handler = Arc<dyn Fn(Option<SystemTime>, &Value) + Send + Sync>;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned on registration, used to unregister.
///
/// Ids are process-unique so a registration can be carried across tree
/// rebuilds without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered set of handlers owned by one node.
#[derive(Clone, Default)]
pub struct ObserverList {
    entries: Vec<(ObserverId, Handler)>,
}

impl ObserverList {
    /// Register a handler and return its fresh id.
    pub fn add(&mut self, handler: Handler) -> ObserverId {
        let id = ObserverId::next();
        self.insert(id, handler);
        id
    }

    /// Register a handler under an existing id.
    pub fn insert(&mut self, id: ObserverId, handler: Handler) {
        self.entries.push((id, handler));
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every handler in registration order.
    pub fn fire(&self, timestamp: Option<SystemTime>, value: &Value) {
        for (_, handler) in &self.entries {
            handler(timestamp, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn fires_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut list = ObserverList::default();
        for tag in 0..3 {
            let seen = Arc::clone(&seen);
            list.add(Arc::new(move |_, _| seen.lock().unwrap().push(tag)));
        }

        list.fire(None, &Value::U8(1));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn remove_and_clear() {
        let mut list = ObserverList::default();
        let a = list.add(Arc::new(|_, _| {}));
        let _b = list.add(Arc::new(|_, _| {}));

        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.len(), 1);

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ObserverId::next(), ObserverId::next());
    }
}
