//! Listener registration shared by views and the transaction coordinator.

use hashbrown::HashMap;
use std::rc::Rc;

/// Identifies a registered listener.
pub type ListenerId = u64;

/// Listeners receiving a `&T`, notified in registration order.
pub(crate) struct Listeners<T: ?Sized> {
    listeners: HashMap<ListenerId, Rc<dyn Fn(&T)>>,
    next_id: ListenerId,
}

impl<T: ?Sized> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Listeners<T> {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a listener and returns its id.
    pub fn subscribe(&mut self, listener: Rc<dyn Fn(&T)>) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.insert(id, listener);
        id
    }

    /// Returns true if the listener was registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Snapshot of the registered listeners, oldest first.
    ///
    /// Callers notify from the snapshot so listeners may subscribe or
    /// unsubscribe while being called.
    pub fn snapshot(&self) -> Vec<Rc<dyn Fn(&T)>> {
        let mut entries: Vec<_> = self.listeners.iter().collect();
        entries.sort_unstable_by_key(|(id, _)| **id);
        entries.into_iter().map(|(_, l)| l.clone()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}
