use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use aether_timing::Instant;

use crate::action::{ActionBehavior, ActionPtr, RegistrySlot};

struct ContextInner {
    trigger: Rc<Cell<bool>>,
    registry: RefCell<Vec<Rc<dyn RegistrySlot>>>,
}

/// Capability to spawn actions into a processor's registry.
///
/// Cheap to clone; every subsystem that creates in-flight operations holds
/// one. Spawning marks the processor trigger so the new action runs on the
/// next pass.
#[derive(Clone)]
pub struct ActionContext {
    inner: Rc<ContextInner>,
}

impl ActionContext {
    pub fn spawn<B: ActionBehavior>(&self, behavior: B) -> ActionPtr<B> {
        let ptr = ActionPtr::new(behavior, self.inner.trigger.clone());
        self.inner.registry.borrow_mut().push(Rc::new(ptr.cell()));
        self.inner.trigger.set(true);
        ptr
    }

    /// Wake the processor without touching any particular action.
    pub fn trigger(&self) {
        self.inner.trigger.set(true);
    }

    pub fn action_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }
}

/// Single-threaded cooperative driver for a set of actions.
///
/// The embedder calls [`ActionProcessor::update`] in a loop, sleeping until
/// the returned deadline. One tick:
///
///   1. Snapshot the registry.
///   2. Poll every action that is dirty or whose deadline has passed.
///   3. Detach actions that reached a terminal state.
///   4. Return the earliest pending deadline, or `now` if anything
///      triggered during the tick.
pub struct ActionProcessor {
    context: ActionContext,
}

impl Default for ActionProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionProcessor {
    pub fn new() -> Self {
        Self {
            context: ActionContext {
                inner: Rc::new(ContextInner {
                    trigger: Rc::new(Cell::new(false)),
                    registry: RefCell::new(Vec::new()),
                }),
            },
        }
    }

    pub fn context(&self) -> ActionContext {
        self.context.clone()
    }

    pub fn update(&mut self, now: Instant) -> Instant {
        let inner = &self.context.inner;
        inner.trigger.set(false);

        // Snapshot: handlers and behaviors may spawn new actions mid-tick,
        // those run from the next pass.
        let snapshot: Vec<Rc<dyn RegistrySlot>> = inner.registry.borrow().clone();

        let mut next_wake = Instant::MAX;
        for slot in &snapshot {
            let poll = slot.poll(now);
            if poll.finished {
                continue;
            }
            if let Some(at) = poll.next {
                next_wake = next_wake.min(at);
            }
        }

        inner.registry.borrow_mut().retain(|slot| !slot.is_finished());

        if inner.trigger.get() { now } else { next_wake }
    }
}
