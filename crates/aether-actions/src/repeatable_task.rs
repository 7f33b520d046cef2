use aether_timing::{Duration, Instant};
use thiserror::Error;

use crate::{
    action::ActionBehavior,
    state_machine::StateMachine,
    status::{UpdateCtl, UpdateStatus},
};

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("repeat count exceeded")]
    RepeatCountExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Run,
    Wait,
    Stop,
    RepeatCountExceeded,
}

/// Runs a thunk every `interval` until the repeat budget runs out or the
/// task is stopped.
pub struct RepeatableTask {
    task: Box<dyn FnMut()>,
    interval: Duration,
    max_repeat_count: Option<u32>,

    state: StateMachine<State>,
    next_execution: Instant,
    current_repeat: u32,
}

impl RepeatableTask {
    pub fn new(task: impl FnMut() + 'static, interval: Duration, max_repeat_count: u32) -> Self {
        Self::build(task, interval, Some(max_repeat_count))
    }

    /// Repeat until explicitly stopped.
    pub fn forever(task: impl FnMut() + 'static, interval: Duration) -> Self {
        Self::build(task, interval, None)
    }

    fn build(
        task: impl FnMut() + 'static,
        interval: Duration,
        max_repeat_count: Option<u32>,
    ) -> Self {
        Self {
            task: Box::new(task),
            interval,
            max_repeat_count,
            state: StateMachine::new(State::Run),
            next_execution: Instant::ZERO,
            current_repeat: 0,
        }
    }

    pub fn stop(&mut self) {
        self.state.set(State::Stop);
    }

    fn run(&mut self, now: Instant, ctl: &mut UpdateCtl) {
        if self.max_repeat_count.is_some_and(|max| self.current_repeat >= max) {
            self.state.set(State::RepeatCountExceeded);
            ctl.trigger();
            return;
        }
        self.current_repeat += 1;
        self.next_execution = now + self.interval;
        (self.task)();
        self.state.set(State::Wait);
        ctl.trigger();
    }

    fn check_interval(&mut self, now: Instant, ctl: &mut UpdateCtl) -> UpdateStatus<(), TaskError> {
        if self.next_execution <= now {
            self.state.set(State::Run);
            ctl.trigger();
            return UpdateStatus::Continue;
        }
        UpdateStatus::Delay(self.next_execution)
    }
}

impl ActionBehavior for RepeatableTask {
    type Output = ();
    type Error = TaskError;

    fn update(&mut self, now: Instant, ctl: &mut UpdateCtl) -> UpdateStatus<(), TaskError> {
        if self.state.changed() {
            match self.state.acquire() {
                State::Run => self.run(now, ctl),
                State::Wait => {}
                State::Stop => return UpdateStatus::Stop,
                State::RepeatCountExceeded => {
                    return UpdateStatus::Error(TaskError::RepeatCountExceeded);
                }
            }
        }

        if self.state.get() == State::Wait {
            return self.check_interval(now, ctl);
        }
        UpdateStatus::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::processor::ActionProcessor;

    fn drain(processor: &mut ActionProcessor, now: Instant) -> Instant {
        // run passes until the tick settles on a future deadline
        let mut wake = processor.update(now);
        while wake <= now {
            wake = processor.update(now);
            if wake == Instant::MAX {
                break;
            }
        }
        wake
    }

    #[test]
    fn runs_on_interval() {
        let mut processor = ActionProcessor::new();
        let ctx = processor.context();

        let runs = Rc::new(Cell::new(0u32));
        let r = runs.clone();
        let _task = ctx.spawn(RepeatableTask::forever(
            move || r.set(r.get() + 1),
            Duration::from_millis(10),
        ));

        let mut now = Instant::ZERO;
        drain(&mut processor, now);
        assert_eq!(runs.get(), 1);

        now = now + Duration::from_millis(10);
        drain(&mut processor, now);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn errors_after_budget() {
        let mut processor = ActionProcessor::new();
        let ctx = processor.context();

        let task = ctx.spawn(RepeatableTask::new(|| {}, Duration::from_millis(1), 2));
        let failed = Rc::new(Cell::new(false));
        let f = failed.clone();
        let _sub = task
            .error_event()
            .subscribe(move |err| f.set(*err == TaskError::RepeatCountExceeded));

        let mut now = Instant::ZERO;
        for _ in 0..4 {
            drain(&mut processor, now);
            now = now + Duration::from_millis(1);
        }
        assert!(failed.get());
        assert!(task.is_finished());
    }

    #[test]
    fn stop_fires_stop_event() {
        let mut processor = ActionProcessor::new();
        let ctx = processor.context();

        let task = ctx.spawn(RepeatableTask::forever(|| {}, Duration::from_millis(1)));
        let stopped = Rc::new(Cell::new(false));
        let s = stopped.clone();
        let _sub = task.stop_event().subscribe(move |()| s.set(true));

        drain(&mut processor, Instant::ZERO);
        task.with(RepeatableTask::stop);
        drain(&mut processor, Instant::ZERO);
        assert!(stopped.get());
    }
}
