//! Fan-in Aggregator
//!
//! [`AggregateObserver`] watches several sources and reports all of their
//! values together. When one source changes, the aggregate pulls every
//! other source forward (delivers it synchronously) before calling back,
//! so a callback never sees a half-updated snapshot: three properties set
//! in one turn produce one callback carrying all three new values and the
//! snapshot from before the turn.
//!
//! # Re-entrancy
//!
//! Pulling a sibling makes the sibling call back into the aggregate. Those
//! nested notifications only record the sibling's new value; the
//! `Delivering` phase keeps them from firing the callback again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::{
    check_openable, value_callback, Bindable, CallbackSlot, Closable, Mutable, Observable, Source,
    ValueCallback,
};
use crate::error::{Diagnostic, ListenerOutcome, ObserveError, Result};
use crate::reactive::{same_value, ObserverState, Phase, PhaseGuard, Scheduler, Value};

type AggregateFn = dyn FnMut(&[Value], &[Value]) -> Result<(), Diagnostic>;

struct AggregateInner {
    scheduler: Scheduler,
    state: Cell<ObserverState>,
    phase: Cell<Phase>,
    pending: RefCell<Vec<Source>>,
    observers: RefCell<Vec<Rc<dyn Bindable>>>,
    values: RefCell<Vec<Value>>,
    snapshot: RefCell<Vec<Value>>,
    callback: CallbackSlot<AggregateFn>,
}

impl AggregateInner {
    fn observers(&self) -> Vec<Rc<dyn Bindable>> {
        self.observers.borrow().clone()
    }

    fn on_source_change(&self, index: usize, value: &Value) {
        if let Some(slot) = self.values.borrow_mut().get_mut(index) {
            *slot = value.clone();
        }
        if self.state.get() != ObserverState::Open {
            return;
        }
        let Some(_guard) = PhaseGuard::enter(&self.phase, Phase::Delivering) else {
            return;
        };

        for (i, observer) in self.observers().iter().enumerate() {
            if i != index {
                observer.deliver();
            }
        }
        self.fire();
    }

    /// Call back if the values differ from the last reported snapshot.
    fn fire(&self) -> bool {
        let values = self.values.borrow().clone();
        let changed = {
            let snapshot = self.snapshot.borrow();
            values.len() != snapshot.len()
                || values.iter().zip(snapshot.iter()).any(|(a, b)| !same_value(a, b))
        };
        if !changed {
            return false;
        }

        let old = self.snapshot.replace(values.clone());
        self.callback
            .invoke("aggregate", |callback| callback(&values, &old))
    }
}

/// Observes several sources and reports their values as one row.
///
/// # Example
///
/// ```rust,ignore
/// let aggregate = AggregateObserver::new(&scheduler);
/// aggregate.add_path(object.clone(), "a")?;
/// aggregate.add_path(object.clone(), "b")?;
/// aggregate.open(|values: &[Value], old: &[Value]| {
///     println!("{old:?} -> {values:?}");
/// })?;
/// ```
#[derive(Clone)]
pub struct AggregateObserver {
    inner: Rc<AggregateInner>,
}

impl AggregateObserver {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Rc::new(AggregateInner {
                scheduler: scheduler.clone(),
                state: Cell::new(ObserverState::Unopened),
                phase: Cell::new(Phase::Idle),
                pending: RefCell::new(Vec::new()),
                observers: RefCell::new(Vec::new()),
                values: RefCell::new(Vec::new()),
                snapshot: RefCell::new(Vec::new()),
                callback: CallbackSlot::new(),
            }),
        }
    }

    /// Build an unopened aggregate over `sources`.
    pub fn with_sources<I>(scheduler: &Scheduler, sources: I) -> Self
    where
        I: IntoIterator<Item = Source>,
    {
        let aggregate = Self::new(scheduler);
        aggregate.inner.pending.borrow_mut().extend(sources);
        aggregate
    }

    /// Queue a source. Only allowed before `open`.
    pub fn add_source(&self, source: Source) -> Result<()> {
        match self.inner.state.get() {
            ObserverState::Unopened => {
                self.inner.pending.borrow_mut().push(source);
                Ok(())
            }
            ObserverState::Open => Err(ObserveError::SourcesLocked),
            ObserverState::Closed => Err(ObserveError::Closed),
        }
    }

    pub fn add_path(&self, root: impl Into<Value>, path: &str) -> Result<()> {
        self.add_source(Source::path(root, path)?)
    }

    pub fn add_observer(&self, observer: impl Bindable + 'static) -> Result<()> {
        self.add_source(Source::observer(observer))
    }

    /// Number of sources, pending or open.
    pub fn len(&self) -> usize {
        self.inner.pending.borrow().len() + self.inner.observers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open every source and start reporting. Returns the initial values.
    pub fn open<F, R>(&self, mut callback: F) -> Result<Vec<Value>>
    where
        F: FnMut(&[Value], &[Value]) -> R + 'static,
        R: ListenerOutcome,
    {
        let inner = &self.inner;
        check_openable(inner.state.get())?;

        let sources = std::mem::take(&mut *inner.pending.borrow_mut());
        let mut observers: Vec<Rc<dyn Bindable>> = Vec::with_capacity(sources.len());
        let mut values = Vec::with_capacity(sources.len());

        for (index, source) in sources.into_iter().enumerate() {
            let observer = source.into_observer(&inner.scheduler);
            let weak: Weak<AggregateInner> = Rc::downgrade(inner);
            let opened = observer.open_with(value_callback(move |new: &Value, _: &Value| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_source_change(index, new);
                }
            }));
            match opened {
                Ok(value) => {
                    values.push(value);
                    observers.push(observer);
                }
                Err(err) => {
                    for observer in &observers {
                        observer.close();
                    }
                    return Err(err);
                }
            }
        }

        debug!(sources = observers.len(), "aggregate opened");
        *inner.observers.borrow_mut() = observers;
        *inner.values.borrow_mut() = values.clone();
        *inner.snapshot.borrow_mut() = values.clone();
        inner
            .callback
            .set(Box::new(move |values: &[Value], old: &[Value]| {
                callback(values, old).into_outcome()
            }));
        inner.state.set(ObserverState::Open);
        Ok(values)
    }

    /// Current values, including changes not yet reported.
    pub fn values(&self) -> Vec<Value> {
        self.inner.values.borrow().clone()
    }

    /// Write `values` positionally into the sources.
    ///
    /// Extra values, or missing ones, are ignored. Returns how many sources
    /// accepted a write.
    pub fn set_values(&self, values: &[Value]) -> usize {
        self.inner
            .observers()
            .iter()
            .zip(values)
            .filter(|(observer, value)| observer.set_value((*value).clone()))
            .count()
    }

    fn deliver_all(&self) -> bool {
        let inner = &self.inner;
        if inner.state.get() != ObserverState::Open {
            return false;
        }
        let Some(_guard) = PhaseGuard::enter(&inner.phase, Phase::Delivering) else {
            return false;
        };
        let mut delivered = false;
        for observer in inner.observers() {
            delivered |= observer.deliver();
        }
        inner.fire() || delivered
    }

    fn discard_all(&self) -> Vec<Value> {
        let inner = &self.inner;
        if inner.state.get() != ObserverState::Open {
            return inner.values.borrow().clone();
        }
        let Some(_guard) = PhaseGuard::enter(&inner.phase, Phase::Discarding) else {
            return inner.values.borrow().clone();
        };

        let values: Vec<Value> = inner
            .observers()
            .iter()
            .map(|observer| observer.discard_changes())
            .collect();
        *inner.values.borrow_mut() = values.clone();
        *inner.snapshot.borrow_mut() = values.clone();
        values
    }
}

impl Observable for AggregateObserver {
    /// Open reporting the values as one array value.
    fn open_with(&self, mut callback: ValueCallback) -> Result<Value> {
        let values = self.open(move |values: &[Value], old: &[Value]| {
            callback(&Value::from(values.to_vec()), &Value::from(old.to_vec()))
        })?;
        Ok(Value::from(values))
    }

    fn deliver(&self) -> bool {
        self.deliver_all()
    }

    fn discard_changes(&self) -> Value {
        Value::from(self.discard_all())
    }

    fn value(&self) -> Value {
        Value::from(self.values())
    }

    fn state(&self) -> ObserverState {
        self.inner.state.get()
    }
}

impl Mutable for AggregateObserver {
    fn set_value(&self, value: Value) -> bool {
        match value.as_array() {
            Some(array) => self.set_values(&array.to_vec()) > 0,
            None => false,
        }
    }
}

impl Closable for AggregateObserver {
    fn close(&self) {
        let inner = &self.inner;
        if inner.state.replace(ObserverState::Closed) == ObserverState::Closed {
            return;
        }
        inner.pending.borrow_mut().clear();
        let observers = std::mem::take(&mut *inner.observers.borrow_mut());
        for observer in observers {
            observer.close();
        }
        inner.callback.clear();
    }

    fn is_closed(&self) -> bool {
        self.inner.state.get() == ObserverState::Closed
    }
}

impl fmt::Debug for AggregateObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateObserver")
            .field("state", &self.inner.state.get())
            .field("sources", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::PathObserver;
    use crate::reactive::ObservableObject;

    type Log = Rc<RefCell<Vec<(Vec<Value>, Vec<Value>)>>>;

    fn logging(aggregate: &AggregateObserver) -> (Vec<Value>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let initial = aggregate
            .open(move |values: &[Value], old: &[Value]| {
                log_clone.borrow_mut().push((values.to_vec(), old.to_vec()));
            })
            .unwrap();
        (initial, log)
    }

    fn numbers(items: &[i32]) -> Vec<Value> {
        items.iter().copied().map(Value::from).collect()
    }

    fn abc() -> ObservableObject {
        [("a", 1), ("b", 2), ("c", 3)].into_iter().collect()
    }

    #[test]
    fn one_callback_per_turn_with_full_snapshot() {
        let scheduler = Scheduler::new();
        let object = abc();
        let aggregate = AggregateObserver::new(&scheduler);
        for key in ["a", "b", "c"] {
            aggregate.add_path(object.clone(), key).unwrap();
        }
        let (initial, log) = logging(&aggregate);
        assert_eq!(initial, numbers(&[1, 2, 3]));

        object.set("a", 10);
        object.set("b", 20);
        object.set("c", 30);
        scheduler.flush();

        assert_eq!(
            *log.borrow(),
            vec![(numbers(&[10, 20, 30]), numbers(&[1, 2, 3]))]
        );
    }

    #[test]
    fn sources_locked_after_open() {
        let scheduler = Scheduler::new();
        let aggregate = AggregateObserver::new(&scheduler);
        aggregate.add_path(abc(), "a").unwrap();
        logging(&aggregate);

        assert!(matches!(aggregate.add_path(abc(), "b"), Err(ObserveError::SourcesLocked)));
        assert!(matches!(
            aggregate.open(|_: &[Value], _: &[Value]| {}),
            Err(ObserveError::AlreadyOpened)
        ));

        aggregate.close();
        assert!(matches!(aggregate.add_path(abc(), "b"), Err(ObserveError::Closed)));
    }

    #[test]
    fn discard_then_deliver() {
        let scheduler = Scheduler::new();
        let object = abc();
        let aggregate = AggregateObserver::with_sources(
            &scheduler,
            [
                Source::path(object.clone(), "a").unwrap(),
                Source::path(object.clone(), "b").unwrap(),
            ],
        );
        let (_, log) = logging(&aggregate);

        object.set("a", 5);
        let settled = aggregate.discard_changes();
        assert_eq!(settled.as_array().map(|a| a.to_vec()), Some(numbers(&[5, 2])));
        scheduler.flush();
        assert!(log.borrow().is_empty());

        object.set("b", 6);
        assert!(aggregate.deliver());
        assert_eq!(*log.borrow(), vec![(numbers(&[5, 6]), numbers(&[5, 2]))]);
    }

    #[test]
    fn nested_aggregate_reports_as_array() {
        let scheduler = Scheduler::new();
        let object = abc();
        let inner = AggregateObserver::new(&scheduler);
        inner.add_path(object.clone(), "a").unwrap();
        inner.add_path(object.clone(), "b").unwrap();

        let outer = AggregateObserver::new(&scheduler);
        outer.add_source(inner.into()).unwrap();
        outer.add_path(object.clone(), "c").unwrap();
        let (initial, log) = logging(&outer);

        assert_eq!(initial[0].as_array().map(|a| a.to_vec()), Some(numbers(&[1, 2])));
        assert_eq!(initial[1], Value::from(3));

        object.set("b", 7);
        object.set("c", 8);
        scheduler.flush();

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let (values, _) = &log[0];
        assert_eq!(values[0].as_array().map(|a| a.to_vec()), Some(numbers(&[1, 7])));
        assert_eq!(values[1], Value::from(8));
    }

    #[test]
    fn set_values_fans_out() {
        let scheduler = Scheduler::new();
        let object = abc();
        let aggregate = AggregateObserver::new(&scheduler);
        aggregate.add_path(object.clone(), "a").unwrap();
        aggregate
            .add_observer(PathObserver::new(&scheduler, object.clone(), "b").unwrap())
            .unwrap();
        logging(&aggregate);

        assert_eq!(aggregate.set_values(&numbers(&[100, 200, 300])), 2);
        assert_eq!(object.get("a"), Value::from(100));
        assert_eq!(object.get("b"), Value::from(200));
        assert_eq!(object.get("c"), Value::from(3));
    }

    #[test]
    fn callback_write_to_a_source_reports_in_same_flush() {
        let scheduler = Scheduler::new();
        let object: ObservableObject = [("a", 1), ("b", 2)].into_iter().collect();
        let aggregate = AggregateObserver::new(&scheduler);
        aggregate.add_path(object.clone(), "a").unwrap();
        aggregate.add_path(object.clone(), "b").unwrap();

        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let target = object.clone();
        aggregate
            .open(move |values: &[Value], old: &[Value]| {
                log_clone.borrow_mut().push((values.to_vec(), old.to_vec()));
                if values[0] == Value::from(10) {
                    target.set("b", 99);
                }
            })
            .unwrap();

        object.set("a", 10);
        assert_eq!(scheduler.flush(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                (numbers(&[10, 2]), numbers(&[1, 2])),
                (numbers(&[10, 99]), numbers(&[10, 2])),
            ]
        );
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn close_releases_sources() {
        let scheduler = Scheduler::new();
        let object = abc();
        let aggregate = AggregateObserver::new(&scheduler);
        aggregate.add_path(object.clone(), "a").unwrap();
        let (_, log) = logging(&aggregate);
        assert_eq!(object.observer_count(), 1);

        aggregate.close();
        aggregate.close();
        assert_eq!(object.observer_count(), 0);
        object.set("a", 9);
        scheduler.flush();
        assert!(log.borrow().is_empty());
    }
}
