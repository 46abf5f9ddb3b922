//! Per-element Observer
//!
//! [`ElementsObserver`] watches an array-valued path and, for every element
//! of that array, a fixed list of sub-paths. Each element gets its own
//! [`AggregateObserver`] group, and the callback receives one row of values
//! per element.
//!
//! # Keeping Groups Aligned
//!
//! The group list mirrors the array. When the array reports splices, the
//! group list is spliced with the same index math: groups of removed
//! elements are closed, fresh groups are opened for inserted elements. When
//! the array itself is replaced, every group is torn down and rebuilt
//! against the new array. Both operations run in the `Discarding` phase so
//! the rebuilt groups cannot fire the outer callback half-way through.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::{
    check_openable, value_callback, AggregateObserver, CallbackSlot, Closable, Observable,
    PathObserver, Source,
};
use crate::error::{Diagnostic, ListenerOutcome, ObserveError, Result};
use crate::reactive::splice::merge_records;
use crate::reactive::{
    AcceptTypes, ChangeCallback, ChangeRecord, ObservableArray, ObserverState, Path, Phase,
    PhaseGuard, Scheduler, Subscription, Value,
};

type RowsFn = dyn FnMut(&[Vec<Value>], &[Vec<Value>]) -> Result<(), Diagnostic>;

struct ElementsInner {
    scheduler: Scheduler,
    source: PathObserver,
    element_paths: Vec<Path>,
    state: Cell<ObserverState>,
    phase: Cell<Phase>,
    array: RefCell<Option<ObservableArray>>,
    array_listener: ChangeCallback,
    subscription: RefCell<Option<Subscription>>,
    groups: RefCell<Vec<AggregateObserver>>,
    snapshot: RefCell<Vec<Vec<Value>>>,
    callback: CallbackSlot<RowsFn>,
}

impl ElementsInner {
    fn open_group(self: &Rc<Self>, element: Value) -> AggregateObserver {
        let sources = self.element_paths.iter().map(|path| {
            Source::from(
                PathObserver::with_path(&self.scheduler, element.clone(), path.clone())
                    .expect_scalar_root(),
            )
        });
        let group = AggregateObserver::with_sources(&self.scheduler, sources);
        let weak = Rc::downgrade(self);
        let opened = group.open(move |_: &[Value], _: &[Value]| {
            if let Some(inner) = weak.upgrade() {
                inner.fire_if_idle();
            }
        });
        if let Err(err) = opened {
            debug!(error = %err, "element group failed to open");
        }
        group
    }

    fn rows(&self) -> Vec<Vec<Value>> {
        self.groups.borrow().iter().map(AggregateObserver::values).collect()
    }

    fn attach(self: &Rc<Self>, value: &Value) {
        let Value::Array(array) = value else {
            if !matches!(value, Value::Undefined | Value::Null) {
                warn!(
                    path = %self.source.path(),
                    found = value.type_name(),
                    "element source is not an array; observing nothing"
                );
            }
            return;
        };

        let subscription = array.observe(&self.array_listener, AcceptTypes::ARRAY);
        let groups: Vec<AggregateObserver> = array
            .to_vec()
            .into_iter()
            .map(|element| self.open_group(element))
            .collect();

        *self.subscription.borrow_mut() = Some(subscription);
        *self.array.borrow_mut() = Some(array.clone());
        *self.groups.borrow_mut() = groups;
    }

    fn detach(&self) {
        self.array_listener.discard();
        self.subscription.borrow_mut().take();
        self.array.borrow_mut().take();
        let groups = std::mem::take(&mut *self.groups.borrow_mut());
        for group in groups {
            group.close();
        }
    }

    fn rebuild(self: &Rc<Self>, value: &Value) {
        let _guard = PhaseGuard::enter(&self.phase, Phase::Discarding);
        self.detach();
        self.attach(value);
    }

    fn on_source_swap(self: &Rc<Self>, value: &Value) {
        if self.state.get() != ObserverState::Open {
            return;
        }
        debug!(path = %self.source.path(), "element source replaced");
        self.rebuild(value);
        self.fire_if_idle();
    }

    fn on_splices(self: &Rc<Self>, records: &[ChangeRecord]) {
        if self.state.get() != ObserverState::Open {
            return;
        }
        let Some(array) = self.array.borrow().clone() else {
            return;
        };
        let splices = merge_records(records);
        if splices.is_empty() {
            return;
        }

        {
            // Groups must track the array even when callbacks are suppressed.
            let _guard = PhaseGuard::enter(&self.phase, Phase::Discarding);
            for splice in &splices {
                let added: Vec<AggregateObserver> = (splice.index..splice.index + splice.added_count)
                    .map(|i| self.open_group(array.get(i)))
                    .collect();
                let removed: Vec<AggregateObserver> = {
                    let mut groups = self.groups.borrow_mut();
                    let start = splice.index.min(groups.len());
                    let end = (start + splice.removed.len()).min(groups.len());
                    groups.splice(start..end, added).collect()
                };
                for group in removed {
                    group.close();
                }
            }
        }
        self.fire_if_idle();
    }

    /// Pull every group forward, then report once.
    fn fire_if_idle(&self) -> bool {
        if self.state.get() != ObserverState::Open {
            return false;
        }
        let Some(_guard) = PhaseGuard::enter(&self.phase, Phase::Delivering) else {
            return false;
        };

        let groups = self.groups.borrow().clone();
        for group in &groups {
            group.deliver();
        }

        let rows = self.rows();
        if *self.snapshot.borrow() == rows {
            return false;
        }
        let old = self.snapshot.replace(rows.clone());
        self.callback
            .invoke("elements", |callback| callback(&rows, &old))
    }
}

/// Observes sub-paths of every element of an array-valued path.
///
/// # Example
///
/// ```rust,ignore
/// let observer = ElementsObserver::new(&scheduler, model, "todos", &["title", "done"])?;
/// observer.open(|rows: &[Vec<Value>], _old: &[Vec<Value>]| {
///     for row in rows {
///         println!("{:?} done={:?}", row[0], row[1]);
///     }
/// })?;
/// ```
#[derive(Clone)]
pub struct ElementsObserver {
    inner: Rc<ElementsInner>,
}

impl ElementsObserver {
    /// Watch `element_paths` under every element of the array at `path`.
    ///
    /// Fails if any path is malformed or `element_paths` is empty.
    pub fn new(
        scheduler: &Scheduler,
        root: impl Into<Value>,
        path: &str,
        element_paths: &[&str],
    ) -> Result<Self> {
        if element_paths.is_empty() {
            return Err(ObserveError::InvalidPath {
                path: String::new(),
                reason: "at least one element path is required",
            });
        }
        let element_paths = element_paths
            .iter()
            .map(|path| Path::parse(path))
            .collect::<Result<Vec<_>>>()?;
        let source = PathObserver::new(scheduler, root, path)?;

        let inner = Rc::new_cyclic(|weak: &Weak<ElementsInner>| {
            let weak = weak.clone();
            let array_listener = ChangeCallback::new(scheduler, move |records: &[ChangeRecord]| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_splices(records);
                }
            });
            ElementsInner {
                scheduler: scheduler.clone(),
                source,
                element_paths,
                state: Cell::new(ObserverState::Unopened),
                phase: Cell::new(Phase::Idle),
                array: RefCell::new(None),
                array_listener,
                subscription: RefCell::new(None),
                groups: RefCell::new(Vec::new()),
                snapshot: RefCell::new(Vec::new()),
                callback: CallbackSlot::new(),
            }
        });
        Ok(Self { inner })
    }

    /// Start observing. Returns the initial rows.
    pub fn open<F, R>(&self, mut callback: F) -> Result<Vec<Vec<Value>>>
    where
        F: FnMut(&[Vec<Value>], &[Vec<Value>]) -> R + 'static,
        R: ListenerOutcome,
    {
        let inner = &self.inner;
        check_openable(inner.state.get())?;

        let weak = Rc::downgrade(inner);
        let value = inner.source.open_with(value_callback(move |new: &Value, _: &Value| {
            if let Some(inner) = weak.upgrade() {
                inner.on_source_swap(new);
            }
        }))?;

        inner.callback.set(Box::new(move |rows: &[Vec<Value>], old: &[Vec<Value>]| {
            callback(rows, old).into_outcome()
        }));
        inner.state.set(ObserverState::Open);
        inner.rebuild(&value);

        let rows = inner.rows();
        *inner.snapshot.borrow_mut() = rows.clone();
        Ok(rows)
    }

    /// Process pending changes now. Returns whether anything was pending.
    pub fn deliver(&self) -> bool {
        let inner = &self.inner;
        if inner.state.get() != ObserverState::Open {
            return false;
        }
        let swapped = inner.source.deliver();
        let spliced = inner.array_listener.deliver();
        let fired = inner.fire_if_idle();
        swapped || spliced || fired
    }

    /// Drop pending changes and resynchronise. Returns the settled rows.
    pub fn discard_changes(&self) -> Vec<Vec<Value>> {
        let inner = &self.inner;
        if inner.state.get() != ObserverState::Open {
            return inner.snapshot.borrow().clone();
        }
        let value = inner.source.discard_changes();
        inner.rebuild(&value);
        let rows = inner.rows();
        *inner.snapshot.borrow_mut() = rows.clone();
        rows
    }

    /// Current rows, including changes not yet reported.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.inner.rows()
    }

    /// Number of element groups.
    pub fn len(&self) -> usize {
        self.inner.groups.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> ObserverState {
        self.inner.state.get()
    }

    pub fn close(&self) {
        let inner = &self.inner;
        if inner.state.replace(ObserverState::Closed) == ObserverState::Closed {
            return;
        }
        inner.source.close();
        inner.detach();
        inner.callback.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.get() == ObserverState::Closed
    }
}

impl fmt::Debug for ElementsObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementsObserver")
            .field("path", &self.inner.source.path().to_string())
            .field("state", &self.inner.state.get())
            .field("groups", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
