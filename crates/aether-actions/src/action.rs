use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use aether_events::Event;
use aether_timing::Instant;

use crate::status::{UpdateCtl, UpdateStatus};

/// State machine body of a cooperative action.
///
/// `update` runs when the action is dirty or its armed deadline has passed.
/// It must not block; suspension happens only by returning.
pub trait ActionBehavior: 'static {
    type Output: Clone + 'static;
    type Error: Clone + 'static;

    fn update(
        &mut self,
        now: Instant,
        ctl: &mut UpdateCtl,
    ) -> UpdateStatus<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Done,
    Failed,
    Stopped,
}

pub(crate) struct ActionShared<B: ActionBehavior> {
    behavior: B,
    dirty: bool,
    stop_requested: bool,
    wake_at: Option<Instant>,
    terminal: Option<Terminal>,
    trigger: Rc<Cell<bool>>,

    result_event: Event<B::Output>,
    error_event: Event<B::Error>,
    stop_event: Event<()>,
    finished_event: Event<()>,
}

/// Shared view over a scheduled action.
///
/// The registry and every `ActionPtr` clone co-own the action slot; the slot
/// is freed once the action reaches a terminal state and the last view is
/// dropped. Holding a pointer past termination is safe: mutation is a no-op
/// and `is_finished` reports the outcome.
pub struct ActionPtr<B: ActionBehavior> {
    shared: Rc<RefCell<ActionShared<B>>>,
}

impl<B: ActionBehavior> Clone for ActionPtr<B> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<B: ActionBehavior> ActionPtr<B> {
    pub(crate) fn new(behavior: B, trigger: Rc<Cell<bool>>) -> Self {
        Self {
            shared: Rc::new(RefCell::new(ActionShared {
                behavior,
                dirty: true,
                stop_requested: false,
                wake_at: None,
                terminal: None,
                trigger,
                result_event: Event::new(),
                error_event: Event::new(),
                stop_event: Event::new(),
                finished_event: Event::new(),
            })),
        }
    }

    pub(crate) fn cell(&self) -> ActionCell<B> {
        ActionCell { shared: self.shared.clone() }
    }

    /// Fires once with the action's result value.
    pub fn result_event(&self) -> Event<B::Output> {
        self.shared.borrow().result_event.clone()
    }

    /// Fires once with the action's error kind.
    pub fn error_event(&self) -> Event<B::Error> {
        self.shared.borrow().error_event.clone()
    }

    /// Fires once when the action is stopped.
    pub fn stop_event(&self) -> Event<()> {
        self.shared.borrow().stop_event.clone()
    }

    /// Fires once after any terminal event, whichever it was.
    pub fn finished_event(&self) -> Event<()> {
        self.shared.borrow().finished_event.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.borrow().terminal.is_some()
    }

    /// Mutate the behavior and mark the action dirty so the processor
    /// re-polls it on the next pass. No-op once terminal.
    pub fn with<R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        let mut inner = self.shared.borrow_mut();
        if inner.terminal.is_some() {
            return None;
        }
        let out = f(&mut inner.behavior);
        inner.dirty = true;
        inner.trigger.set(true);
        Some(out)
    }

    /// Read-only access to the behavior, without rescheduling.
    pub fn peek<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.shared.borrow().behavior)
    }

    /// Request cancellation: the action fires `Stop` on the next tick and no
    /// `Result` or `Error` afterwards.
    pub fn stop(&self) {
        let mut inner = self.shared.borrow_mut();
        if inner.terminal.is_some() {
            return;
        }
        inner.stop_requested = true;
        inner.dirty = true;
        inner.trigger.set(true);
    }
}

pub(crate) struct SlotPoll {
    pub(crate) next: Option<Instant>,
    pub(crate) finished: bool,
}

pub(crate) trait RegistrySlot {
    fn poll(&self, now: Instant) -> SlotPoll;
    fn is_finished(&self) -> bool;
}

/// Registry-side co-owner of one action slot.
pub(crate) struct ActionCell<B: ActionBehavior> {
    shared: Rc<RefCell<ActionShared<B>>>,
}

enum Fired<B: ActionBehavior> {
    None,
    Result(Event<B::Output>, B::Output),
    Error(Event<B::Error>, B::Error),
    Stop(Event<()>),
}

impl<B: ActionBehavior> RegistrySlot for ActionCell<B> {
    fn poll(&self, now: Instant) -> SlotPoll {
        // Update under the borrow, emit after releasing it: handlers may
        // call back into this same action through an ActionPtr.
        let (fired, finished_event, poll) = {
            let mut inner = self.shared.borrow_mut();
            if inner.terminal.is_some() {
                return SlotPoll { next: None, finished: true };
            }

            let due = inner.wake_at.is_some_and(|t| t <= now);
            if !inner.dirty && !due {
                return SlotPoll { next: inner.wake_at, finished: false };
            }
            inner.dirty = false;

            if inner.stop_requested {
                inner.terminal = Some(Terminal::Stopped);
                let stop = inner.stop_event.clone();
                let finished = inner.finished_event.clone();
                (Fired::<B>::Stop(stop), Some(finished), SlotPoll { next: None, finished: true })
            } else {
                let mut ctl = UpdateCtl::default();
                let status = inner.behavior.update(now, &mut ctl);
                if ctl.take() {
                    inner.dirty = true;
                    inner.trigger.set(true);
                }
                match status {
                    UpdateStatus::Continue => {
                        inner.wake_at = None;
                        (Fired::None, None, SlotPoll { next: None, finished: false })
                    }
                    UpdateStatus::Delay(at) => {
                        inner.wake_at = Some(at);
                        (Fired::None, None, SlotPoll { next: Some(at), finished: false })
                    }
                    UpdateStatus::Result(value) => {
                        inner.terminal = Some(Terminal::Done);
                        let ev = inner.result_event.clone();
                        let fin = inner.finished_event.clone();
                        (Fired::Result(ev, value), Some(fin), SlotPoll { next: None, finished: true })
                    }
                    UpdateStatus::Error(err) => {
                        inner.terminal = Some(Terminal::Failed);
                        let ev = inner.error_event.clone();
                        let fin = inner.finished_event.clone();
                        (Fired::Error(ev, err), Some(fin), SlotPoll { next: None, finished: true })
                    }
                    UpdateStatus::Stop => {
                        inner.terminal = Some(Terminal::Stopped);
                        let ev = inner.stop_event.clone();
                        let fin = inner.finished_event.clone();
                        (Fired::Stop(ev), Some(fin), SlotPoll { next: None, finished: true })
                    }
                }
            }
        };

        match fired {
            Fired::None => {}
            Fired::Result(ev, value) => ev.emit(&value),
            Fired::Error(ev, err) => ev.emit(&err),
            Fired::Stop(ev) => ev.notify(),
        }
        if let Some(fin) = finished_event {
            fin.notify();
        }
        poll
    }

    fn is_finished(&self) -> bool {
        self.shared.borrow().terminal.is_some()
    }
}
