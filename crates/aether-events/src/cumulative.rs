use std::{cell::RefCell, rc::Rc};

use crate::{Event, Subscription};

struct CumulativeInner<T> {
    values: RefCell<Vec<Option<T>>>,
    done_event: Event<Vec<T>>,
    subs: RefCell<Vec<Subscription>>,
}

/// Joins several source events into one.
///
/// Each attached source fills its slot on every fire; once all slots hold a
/// value, `done_event` emits the collected set, and keeps re-emitting on
/// later source fires with the refreshed values. Used to wait for a group
/// of lookups that each report through their own event.
pub struct CumulativeEvent<T: Clone + 'static> {
    inner: Rc<CumulativeInner<T>>,
}

impl<T: Clone + 'static> Clone for CumulativeEvent<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Clone + 'static> CumulativeEvent<T> {
    pub fn new(slot_count: usize) -> Self {
        Self {
            inner: Rc::new(CumulativeInner {
                values: RefCell::new(vec![None; slot_count]),
                done_event: Event::new(),
                subs: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Feed `slot` from `source`, mapping each fire into the joined value
    /// type. Panics if `slot` is out of range.
    pub fn attach<S: 'static>(
        &self,
        slot: usize,
        source: &Event<S>,
        map: impl Fn(&S) -> T + 'static,
    ) {
        assert!(slot < self.inner.values.borrow().len());

        let inner = self.inner.clone();
        let sub = source.subscribe(move |value: &S| {
            inner.values.borrow_mut()[slot] = Some(map(value));

            let collected: Option<Vec<T>> =
                inner.values.borrow().iter().cloned().collect();
            if let Some(values) = collected {
                inner.done_event.emit(&values);
            }
        });
        self.inner.subs.borrow_mut().push(sub);
    }

    /// Fires with all slot values once every slot has been filled.
    pub fn done_event(&self) -> Event<Vec<T>> {
        self.inner.done_event.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.values.borrow().iter().all(Option::is_some)
    }

    pub fn value(&self, slot: usize) -> Option<T> {
        self.inner.values.borrow().get(slot).cloned().flatten()
    }

    /// Forget collected values and detach from every source.
    pub fn reset(&self) {
        self.inner.subs.borrow_mut().clear();
        self.inner.values.borrow_mut().fill(None);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[test]
    fn fires_only_when_every_slot_is_filled() {
        let first = Event::<u32>::new();
        let second = Event::<u32>::new();
        let joined = CumulativeEvent::<u32>::new(2);
        joined.attach(0, &first, |v| *v);
        joined.attach(1, &second, |v| *v * 10);

        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let _sub = joined.done_event().subscribe(move |values: &Vec<u32>| {
            sink.borrow_mut().push(values.clone());
        });

        first.emit(&1);
        assert!(results.borrow().is_empty());
        assert!(!joined.is_complete());

        second.emit(&2);
        assert_eq!(*results.borrow(), vec![vec![1, 20]]);
        assert!(joined.is_complete());
    }

    #[test]
    fn refires_with_refreshed_values() {
        let first = Event::<u32>::new();
        let second = Event::<u32>::new();
        let joined = CumulativeEvent::<u32>::new(2);
        joined.attach(0, &first, |v| *v);
        joined.attach(1, &second, |v| *v);

        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let _sub = joined.done_event().subscribe(move |values: &Vec<u32>| {
            sink.borrow_mut().push(values.clone());
        });

        first.emit(&1);
        second.emit(&2);
        first.emit(&7);
        assert_eq!(*results.borrow(), vec![vec![1, 2], vec![7, 2]]);
        assert_eq!(joined.value(0), Some(7));
    }

    #[test]
    fn reset_detaches_sources() {
        let source = Event::<u32>::new();
        let joined = CumulativeEvent::<u32>::new(1);
        joined.attach(0, &source, |v| *v);

        source.emit(&5);
        assert!(joined.is_complete());

        joined.reset();
        source.emit(&6);
        assert!(!joined.is_complete());
    }
}
