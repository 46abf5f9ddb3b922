//! Array Observer
//!
//! Reports each flush's array mutations as one list of splices. Records are
//! merged with [`merge_records`], so `push`, `push`, `pop` arrives as a
//! single one-element splice and a write that was later undone can vanish
//! entirely.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::{check_openable, CallbackSlot};
use crate::error::{Diagnostic, ListenerOutcome, ObserveError, Result};
use crate::reactive::splice::{merge_records, project_splices};
use crate::reactive::{
    AcceptTypes, ChangeCallback, ChangeRecord, ObservableArray, ObserverState, Phase, PhaseGuard,
    Scheduler, Splice, Subscription, Value,
};

/// How record batches are turned into splices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpliceMode {
    /// Merge the raw splices. Cheap; `sort` and `reverse` show up as one
    /// full-range splice.
    #[default]
    Merged,
    /// Merge, then diff each merged splice against the current contents.
    /// Drops writes that restored the old value and shrinks full-range
    /// splices to what actually moved.
    Minimal,
}

type SpliceFn = dyn FnMut(&[Splice]) -> Result<(), Diagnostic>;

struct ArrayObserverInner {
    array: ObservableArray,
    mode: SpliceMode,
    state: Cell<ObserverState>,
    phase: Cell<Phase>,
    listener: ChangeCallback,
    subscription: RefCell<Option<Subscription>>,
    callback: CallbackSlot<SpliceFn>,
}

impl ArrayObserverInner {
    fn on_records(&self, records: &[ChangeRecord]) {
        if self.state.get() != ObserverState::Open {
            return;
        }
        let Some(_guard) = PhaseGuard::enter(&self.phase, Phase::Delivering) else {
            return;
        };

        let splices = match self.mode {
            SpliceMode::Merged => merge_records(records),
            SpliceMode::Minimal => self.array.with(|items| project_splices(items, records)),
        };
        if splices.is_empty() {
            return;
        }
        self.callback
            .invoke("array", |callback| callback(&splices));
    }
}

/// Observes one array and reports coalesced splices.
#[derive(Clone)]
pub struct ArrayObserver {
    inner: Rc<ArrayObserverInner>,
}

impl ArrayObserver {
    /// Observe `value`, which must be an array.
    pub fn new(scheduler: &Scheduler, value: impl Into<Value>) -> Result<Self> {
        Self::with_mode(scheduler, value, SpliceMode::default())
    }

    pub fn with_mode(scheduler: &Scheduler, value: impl Into<Value>, mode: SpliceMode) -> Result<Self> {
        let array = match value.into() {
            Value::Array(array) => array,
            other => return Err(ObserveError::NotObservable(other.type_name())),
        };

        let inner = Rc::new_cyclic(|weak: &Weak<ArrayObserverInner>| {
            let weak = weak.clone();
            let listener = ChangeCallback::new(scheduler, move |records: &[ChangeRecord]| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_records(records);
                }
            });
            ArrayObserverInner {
                array,
                mode,
                state: Cell::new(ObserverState::Unopened),
                phase: Cell::new(Phase::Idle),
                listener,
                subscription: RefCell::new(None),
                callback: CallbackSlot::new(),
            }
        });
        Ok(Self { inner })
    }

    /// Start observing. Returns the current contents.
    pub fn open<F, R>(&self, mut callback: F) -> Result<Vec<Value>>
    where
        F: FnMut(&[Splice]) -> R + 'static,
        R: ListenerOutcome,
    {
        let inner = &self.inner;
        check_openable(inner.state.get())?;

        inner
            .callback
            .set(Box::new(move |splices: &[Splice]| callback(splices).into_outcome()));
        let subscription = inner.array.observe(&inner.listener, AcceptTypes::ARRAY);
        *inner.subscription.borrow_mut() = Some(subscription);
        inner.state.set(ObserverState::Open);
        Ok(inner.array.to_vec())
    }

    pub fn array(&self) -> &ObservableArray {
        &self.inner.array
    }

    pub fn mode(&self) -> SpliceMode {
        self.inner.mode
    }

    /// Report pending splices now. Returns whether records were pending.
    pub fn deliver(&self) -> bool {
        self.inner.state.get() == ObserverState::Open && self.inner.listener.deliver()
    }

    /// Drop pending splices. Returns the current contents.
    pub fn discard_changes(&self) -> Vec<Value> {
        let _guard = PhaseGuard::enter(&self.inner.phase, Phase::Discarding);
        self.inner.listener.discard();
        self.inner.array.to_vec()
    }

    pub fn state(&self) -> ObserverState {
        self.inner.state.get()
    }

    pub fn close(&self) {
        let inner = &self.inner;
        if inner.state.replace(ObserverState::Closed) == ObserverState::Closed {
            return;
        }
        inner.subscription.borrow_mut().take();
        inner.listener.discard();
        inner.callback.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.get() == ObserverState::Closed
    }
}

impl fmt::Debug for ArrayObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayObserver")
            .field("mode", &self.inner.mode)
            .field("state", &self.inner.state.get())
            .field("len", &self.inner.array.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::splice::apply_splices;

    type Log = Rc<RefCell<Vec<Vec<Splice>>>>;

    fn letters(s: &str) -> Vec<Value> {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    }

    fn logging(observer: &ArrayObserver) -> Log {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        observer
            .open(move |splices: &[Splice]| log_clone.borrow_mut().push(splices.to_vec()))
            .unwrap();
        log
    }

    #[test]
    fn merges_a_turn_into_one_splice() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(letters("abcdefghij"));
        let observer = ArrayObserver::new(&scheduler, array.clone()).unwrap();
        let log = logging(&observer);

        array.splice(3, 4, letters("ABC"));
        array.splice(6, 2, letters("012"));
        scheduler.flush();

        assert_eq!(*log.borrow(), vec![vec![Splice::new(3, letters("defghi"), 6)]]);
    }

    #[test]
    fn replaying_reported_splices_tracks_the_array() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(letters("abc"));
        let observer = ArrayObserver::new(&scheduler, array.clone()).unwrap();
        let mut mirror = observer.discard_changes();
        let log = logging(&observer);

        array.push("d");
        array.shift();
        array.set(1, "X");
        array.reverse();
        scheduler.flush();

        for splices in log.borrow().iter() {
            apply_splices(&mut mirror, &array.to_vec(), splices);
        }
        assert_eq!(mirror, array.to_vec());
    }

    #[test]
    fn cancelled_edits_are_silent() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(letters("ab"));
        let observer = ArrayObserver::new(&scheduler, array.clone()).unwrap();
        let log = logging(&observer);

        array.push("c");
        array.pop();
        scheduler.flush();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn minimal_mode_tightens_sort() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(letters("abdc"));
        let merged = ArrayObserver::new(&scheduler, array.clone()).unwrap();
        let minimal = ArrayObserver::with_mode(&scheduler, array.clone(), SpliceMode::Minimal).unwrap();
        let merged_log = logging(&merged);
        let minimal_log = logging(&minimal);

        array.sort();
        array.set(0, "a");
        scheduler.flush();

        assert_eq!(
            *merged_log.borrow(),
            vec![vec![Splice::new(0, letters("abdc"), 4)]]
        );
        let minimal_log = minimal_log.borrow();
        assert_eq!(minimal_log.len(), 1);
        assert!(minimal_log[0].iter().all(|s| s.index >= 2));
    }

    #[test]
    fn rejects_non_arrays() {
        let scheduler = Scheduler::new();
        assert!(matches!(
            ArrayObserver::new(&scheduler, "nope"),
            Err(ObserveError::NotObservable("string"))
        ));
    }

    #[test]
    fn deliver_discard_close() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(letters("a"));
        let observer = ArrayObserver::new(&scheduler, array.clone()).unwrap();
        let log = logging(&observer);

        array.push("b");
        assert_eq!(observer.discard_changes(), letters("ab"));
        scheduler.flush();
        assert!(log.borrow().is_empty());

        array.push("c");
        assert!(observer.deliver());
        assert_eq!(log.borrow().len(), 1);

        observer.close();
        assert_eq!(array.observer_count(), 0);
        array.push("d");
        scheduler.flush();
        assert_eq!(log.borrow().len(), 1);
    }
}
