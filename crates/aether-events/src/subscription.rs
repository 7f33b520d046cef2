use std::{cell::Cell, rc::Rc};

/// Shared liveness cell between a [`Subscription`] and the handler slot
/// stored inside an event.
#[derive(Debug, Default)]
pub(crate) struct SubState {
    pub(crate) alive: Cell<bool>,
    pub(crate) once: Cell<bool>,
}

/// RAII handle to an event handler.
///
/// While the subscription is held the handler fires on every emit. Dropping
/// or resetting it detaches the handler; the event compacts the dead slot on
/// its next emit.
#[derive(Debug, Default)]
pub struct Subscription {
    state: Option<Rc<SubState>>,
}

impl Subscription {
    pub(crate) fn new(state: Rc<SubState>) -> Self {
        Self { state: Some(state) }
    }

    /// Empty handle, useful as a placeholder field before the first link-up.
    pub fn none() -> Self {
        Self::default()
    }

    /// Mark the handler to self-detach after its first invocation.
    pub fn once(self) -> Self {
        if let Some(state) = &self.state {
            state.once.set(true);
        }
        self
    }

    pub fn is_active(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.alive.get())
    }

    /// Detach the handler immediately.
    pub fn reset(&mut self) {
        if let Some(state) = self.state.take() {
            state.alive.set(false);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Bag of subscriptions sharing one lifetime.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subs: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sub: Subscription) {
        // opportunistically drop spent entries (mostly `.once()` handlers)
        self.subs.retain(Subscription::is_active);
        self.subs.push(sub);
    }

    pub fn clear(&mut self) {
        self.subs.clear();
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}
