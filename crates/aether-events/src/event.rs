use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::subscription::{SubState, Subscription};

type Handler<T> = Rc<dyn Fn(&T)>;

struct Slot<T> {
    state: Weak<SubState>,
    handler: Handler<T>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone(), handler: self.handler.clone() }
    }
}

impl<T> Slot<T> {
    fn invoke(&self, value: &T) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        if state.alive.get() {
            (self.handler)(value);
            if state.once.get() {
                state.alive.set(false);
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.state.upgrade().is_some_and(|s| s.alive.get())
    }
}

/// Typed multicast event.
///
/// `Event` is a shared handle: clones refer to the same subscriber list, so a
/// component can hand out the event for subscription while keeping the right
/// to emit.
///
/// Emit iterates a snapshot of the handlers registered before the call.
/// Handlers may subscribe (visible from the next emit), drop subscriptions
/// (the dropped handler no longer fires, even within the current emit) and
/// emit recursively.
pub struct Event<T> {
    slots: Rc<RefCell<Vec<Slot<T>>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self { slots: self.slots.clone() }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self { slots: Rc::new(RefCell::new(Vec::new())) }
    }

    /// Attach a handler; it fires for every emit until the returned
    /// [`Subscription`] is dropped or reset.
    #[must_use = "the handler detaches when the Subscription is dropped"]
    pub fn subscribe(&self, handler: impl Fn(&T) + 'static) -> Subscription {
        let state = Rc::new(SubState { alive: std::cell::Cell::new(true), once: Default::default() });
        self.slots
            .borrow_mut()
            .push(Slot { state: Rc::downgrade(&state), handler: Rc::new(handler) });
        Subscription::new(state)
    }

    /// Invoke every live handler registered before this call.
    pub fn emit(&self, value: &T) {
        // Snapshot so handlers can freely mutate the subscriber list; each
        // slot re-checks liveness right before its own invocation.
        let snapshot = self.slots.borrow().clone();
        for slot in &snapshot {
            slot.invoke(value);
        }
        self.slots.borrow_mut().retain(Slot::is_alive);
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.borrow().iter().filter(|s| s.is_alive()).count()
    }
}

impl Event<()> {
    /// Shorthand for unit-payload events such as stream updates.
    pub fn notify(&self) {
        self.emit(&());
    }
}
