//! Object Observer
//!
//! Summarises a batch of object records as added, removed and changed
//! properties. An add followed by a delete of the same key cancels out, and
//! an update that ends on the value it started from is not reported.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::{check_openable, CallbackSlot};
use crate::error::{Diagnostic, ListenerOutcome, ObserveError, Result};
use crate::reactive::{
    same_value, AcceptTypes, ChangeCallback, ChangeKind, ChangeRecord, ChangeType,
    ObservableObject, ObserverState, Phase, PhaseGuard, Scheduler, Subscription, Value,
};

/// Net effect of one batch of property records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectDiff {
    /// New properties with their current values.
    pub added: IndexMap<Rc<str>, Value>,
    /// Deleted properties with the values they had before the batch.
    pub removed: IndexMap<Rc<str>, Value>,
    /// Properties present before and after, with their current values.
    pub changed: IndexMap<Rc<str>, Value>,
    /// Pre-batch value of every touched property (`undefined` for adds).
    pub old_values: IndexMap<Rc<str>, Value>,
}

impl ObjectDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Fold `records` for `object` into a diff.
    pub fn from_records(object: &ObservableObject, records: &[ChangeRecord]) -> Self {
        let mut old_values: IndexMap<Rc<str>, Value> = IndexMap::new();
        let mut added: IndexMap<Rc<str>, ()> = IndexMap::new();
        let mut removed: IndexMap<Rc<str>, ()> = IndexMap::new();

        for record in records {
            let (name, old_value) = match &record.kind {
                ChangeKind::Add { name } => (name.to_name(), Value::Undefined),
                ChangeKind::Update { name, old_value } | ChangeKind::Delete { name, old_value } => {
                    (name.to_name(), old_value.clone())
                }
                _ => continue,
            };
            old_values.entry(name.clone()).or_insert(old_value);

            match record.change_type() {
                ChangeType::Add => {
                    if removed.shift_remove(&name).is_none() {
                        added.insert(name, ());
                    }
                }
                ChangeType::Delete => {
                    if added.shift_remove(&name).is_some() {
                        old_values.shift_remove(&name);
                    } else {
                        removed.insert(name, ());
                    }
                }
                _ => {}
            }
        }

        let added: IndexMap<Rc<str>, Value> = added
            .into_keys()
            .map(|name| {
                let value = object.get(&name);
                (name, value)
            })
            .collect();
        let removed: IndexMap<Rc<str>, Value> = removed
            .into_keys()
            .map(|name| {
                let value = old_values.get(&name).cloned().unwrap_or_default();
                (name, value)
            })
            .collect();

        let mut changed = IndexMap::new();
        for (name, old_value) in &old_values {
            if added.contains_key(name) || removed.contains_key(name) {
                continue;
            }
            let value = object.get(name);
            if !same_value(&value, old_value) {
                changed.insert(name.clone(), value);
            }
        }

        ObjectDiff {
            added,
            removed,
            changed,
            old_values,
        }
    }
}

type DiffFn = dyn FnMut(&ObjectDiff) -> Result<(), Diagnostic>;

const PROPERTY_RECORDS: AcceptTypes = AcceptTypes::NONE
    .with(ChangeType::Add)
    .with(ChangeType::Update)
    .with(ChangeType::Delete);

struct ObjectObserverInner {
    object: ObservableObject,
    state: Cell<ObserverState>,
    phase: Cell<Phase>,
    listener: ChangeCallback,
    subscription: RefCell<Option<Subscription>>,
    callback: CallbackSlot<DiffFn>,
}

impl ObjectObserverInner {
    fn on_records(&self, records: &[ChangeRecord]) {
        if self.state.get() != ObserverState::Open {
            return;
        }
        let Some(_guard) = PhaseGuard::enter(&self.phase, Phase::Delivering) else {
            return;
        };

        let diff = ObjectDiff::from_records(&self.object, records);
        if diff.is_empty() {
            return;
        }
        self.callback.invoke("object", |callback| callback(&diff));
    }
}

/// Observes the properties of one object.
#[derive(Clone)]
pub struct ObjectObserver {
    inner: Rc<ObjectObserverInner>,
}

impl ObjectObserver {
    /// Observe `value`, which must be an object.
    pub fn new(scheduler: &Scheduler, value: impl Into<Value>) -> Result<Self> {
        let object = match value.into() {
            Value::Object(object) => object,
            other => return Err(ObserveError::NotObservable(other.type_name())),
        };

        let inner = Rc::new_cyclic(|weak: &Weak<ObjectObserverInner>| {
            let weak = weak.clone();
            let listener = ChangeCallback::new(scheduler, move |records: &[ChangeRecord]| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_records(records);
                }
            });
            ObjectObserverInner {
                object,
                state: Cell::new(ObserverState::Unopened),
                phase: Cell::new(Phase::Idle),
                listener,
                subscription: RefCell::new(None),
                callback: CallbackSlot::new(),
            }
        });
        Ok(Self { inner })
    }

    /// Start observing. Returns the object.
    pub fn open<F, R>(&self, mut callback: F) -> Result<ObservableObject>
    where
        F: FnMut(&ObjectDiff) -> R + 'static,
        R: ListenerOutcome,
    {
        let inner = &self.inner;
        check_openable(inner.state.get())?;

        inner
            .callback
            .set(Box::new(move |diff: &ObjectDiff| callback(diff).into_outcome()));
        let subscription = inner.object.observe(&inner.listener, PROPERTY_RECORDS);
        *inner.subscription.borrow_mut() = Some(subscription);
        inner.state.set(ObserverState::Open);
        Ok(inner.object.clone())
    }

    pub fn object(&self) -> &ObservableObject {
        &self.inner.object
    }

    pub fn deliver(&self) -> bool {
        self.inner.state.get() == ObserverState::Open && self.inner.listener.deliver()
    }

    pub fn discard_changes(&self) -> ObservableObject {
        let _guard = PhaseGuard::enter(&self.inner.phase, Phase::Discarding);
        self.inner.listener.discard();
        self.inner.object.clone()
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

impl fmt::Debug for ObjectObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectObserver")
            .field("state", &self.inner.state.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
