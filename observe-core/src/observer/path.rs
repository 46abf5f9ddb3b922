//! Path Observer
//!
//! Watches the value found at a [`Path`] under a root container and reports
//! `(new, old)` whenever it changes.
//!
//! # The Chain
//!
//! For a path `a.b.c` the observer subscribes to the root (which holds `a`),
//! to the value of `a` (which holds `b`) and to the value of `a.b` (which
//! holds `c`). Each link is a [`PathNode`]. When an intermediate value is
//! replaced, say `root.a` now points at another object, the node for `a`
//! tears down everything below it and builds a fresh chain against the new
//! object. Links are only built through containers; a chain simply stops
//! at the first scalar.
//!
//! Any record on any link schedules a check. The check rebinds the chain,
//! resolves the path and compares with the last reported value, so one
//! flush reports at most one `(new, old)` pair no matter how many links
//! changed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use super::{check_openable, CallbackSlot, Closable, Mutable, Observable, ValueCallback};
use crate::error::{Diagnostic, ListenerOutcome, Result};
use crate::reactive::{
    same_value, AcceptTypes, ChangeCallback, ChangeRecord, Key, ObserverState, Path, Phase,
    PhaseGuard, Scheduler, Subscription, Value,
};

type ValueFn = dyn FnMut(&Value, &Value) -> Result<(), Diagnostic>;

/// Subscribe `listener` to `container` with its default record filter.
fn subscribe(container: &Value, listener: &ChangeCallback) -> Option<Subscription> {
    match container {
        Value::Object(object) => Some(object.observe(listener, AcceptTypes::OBJECT)),
        Value::Array(array) => Some(array.observe(listener, AcceptTypes::ARRAY)),
        _ => None,
    }
}

/// One link: a container, subscribed, and the link for the value it holds.
struct PathNode {
    container: Value,
    _subscription: Subscription,
    child: Option<Box<PathNode>>,
}

impl PathNode {
    /// Build links for `keys` starting at `container`.
    fn build(container: Value, keys: &[Key], listener: &ChangeCallback) -> Option<Box<PathNode>> {
        let (key, rest) = keys.split_first()?;
        let subscription = subscribe(&container, listener)?;
        let child = if rest.is_empty() {
            None
        } else {
            Self::build(container.get(key), rest, listener)
        };
        Some(Box::new(PathNode {
            container,
            _subscription: subscription,
            child,
        }))
    }

    /// Re-resolve below this link, rebuilding where identities changed.
    fn rebind(&mut self, keys: &[Key], listener: &ChangeCallback) {
        let Some((key, rest)) = keys.split_first() else {
            return;
        };
        if rest.is_empty() {
            return;
        }

        let head = self.container.get(key);
        let same = self
            .child
            .as_ref()
            .is_some_and(|child| same_value(&child.container, &head));
        if same {
            if let Some(child) = self.child.as_mut() {
                child.rebind(rest, listener);
            }
        } else {
            trace!(key = %key, "path link replaced");
            self.child = Self::build(head, rest, listener);
        }
    }

    fn depth(&self) -> usize {
        1 + self.child.as_ref().map_or(0, |child| child.depth())
    }
}

struct PathInner {
    root: Value,
    path: Path,
    state: Cell<ObserverState>,
    phase: Cell<Phase>,
    value: RefCell<Value>,
    chain: RefCell<Option<Box<PathNode>>>,
    listener: ChangeCallback,
    callback: CallbackSlot<ValueFn>,
    scalar_root_expected: Cell<bool>,
}

impl PathInner {
    fn rebind(&self) {
        let mut chain = self.chain.borrow_mut();
        if let Some(node) = chain.as_mut() {
            node.rebind(self.path.segments(), &self.listener);
            return;
        }
        *chain = PathNode::build(self.root.clone(), self.path.segments(), &self.listener);
    }

    fn resolve(&self) -> Value {
        self.path.value_from(&self.root)
    }

    /// Compare with the last reported value and call back on a change.
    fn check(&self) -> bool {
        if self.state.get() != ObserverState::Open {
            return false;
        }
        let Some(_guard) = PhaseGuard::enter(&self.phase, Phase::Delivering) else {
            return false;
        };

        self.rebind();
        let new = self.resolve();
        if same_value(&new, &self.value.borrow()) {
            return false;
        }
        let old = self.value.replace(new.clone());
        trace!(path = %self.path, "path value changed");
        self.callback.invoke("path", |callback| callback(&new, &old))
    }
}

/// Observes the value at a path under a root.
///
/// # Example
///
/// ```rust,ignore
/// let observer = PathObserver::new(&scheduler, root.clone(), "a.b.c")?;
/// observer.open(|new: &Value, old: &Value| println!("{old:?} -> {new:?}"))?;
///
/// root_a.set("b", other_object); // rebinding link `b`
/// scheduler.flush();             // one call with (new c, old c)
/// ```
#[derive(Clone)]
pub struct PathObserver {
    inner: Rc<PathInner>,
}

impl PathObserver {
    /// Parse `path` and build an unopened observer.
    pub fn new(scheduler: &Scheduler, root: impl Into<Value>, path: &str) -> Result<Self> {
        Ok(Self::with_path(scheduler, root, Path::parse(path)?))
    }

    pub fn with_path(scheduler: &Scheduler, root: impl Into<Value>, path: Path) -> Self {
        let root = root.into();
        let inner = Rc::new_cyclic(|weak: &Weak<PathInner>| {
            let weak = weak.clone();
            let listener = ChangeCallback::new(scheduler, move |_: &[ChangeRecord]| {
                if let Some(inner) = weak.upgrade() {
                    inner.check();
                }
            });
            PathInner {
                root,
                path,
                state: Cell::new(ObserverState::Unopened),
                phase: Cell::new(Phase::Idle),
                value: RefCell::new(Value::Undefined),
                chain: RefCell::new(None),
                listener,
                callback: CallbackSlot::new(),
                scalar_root_expected: Cell::new(false),
            }
        });
        Self { inner }
    }

    /// Mark a non-container root as expected, e.g. a plain array element.
    /// Opening then logs at debug level instead of warning.
    pub(crate) fn expect_scalar_root(self) -> Self {
        self.inner.scalar_root_expected.set(true);
        self
    }

    /// Open with a `(new, old)` closure returning `()` or a `Result`.
    pub fn open<F, R>(&self, callback: F) -> Result<Value>
    where
        F: FnMut(&Value, &Value) -> R + 'static,
        R: ListenerOutcome,
    {
        self.open_with(super::value_callback(callback))
    }

    pub fn root(&self) -> &Value {
        &self.inner.root
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Number of containers currently subscribed along the path.
    pub fn chain_len(&self) -> usize {
        self.inner.chain.borrow().as_ref().map_or(0, |node| node.depth())
    }
}

impl Observable for PathObserver {
    fn open_with(&self, callback: ValueCallback) -> Result<Value> {
        let inner = &self.inner;
        check_openable(inner.state.get())?;

        if !inner.path.is_empty() && !inner.root.is_container() {
            if inner.scalar_root_expected.get() {
                debug!(path = %inner.path, root = inner.root.type_name(), "scalar path root");
            } else {
                warn!(
                    path = %inner.path,
                    root = inner.root.type_name(),
                    "path root is not observable; observer will never fire"
                );
            }
        }

        inner.callback.set(callback);
        inner.state.set(ObserverState::Open);
        inner.rebind();
        let value = inner.resolve();
        *inner.value.borrow_mut() = value.clone();
        Ok(value)
    }

    fn deliver(&self) -> bool {
        self.inner.state.get() == ObserverState::Open && self.inner.listener.deliver()
    }

    fn discard_changes(&self) -> Value {
        let inner = &self.inner;
        if inner.state.get() != ObserverState::Open {
            return inner.value.borrow().clone();
        }
        let Some(_guard) = PhaseGuard::enter(&inner.phase, Phase::Discarding) else {
            return inner.value.borrow().clone();
        };

        inner.listener.discard();
        inner.rebind();
        let value = inner.resolve();
        *inner.value.borrow_mut() = value.clone();
        value
    }

    fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    fn state(&self) -> ObserverState {
        self.inner.state.get()
    }
}

impl Mutable for PathObserver {
    fn set_value(&self, value: Value) -> bool {
        self.inner.path.set_value_from(&self.inner.root, value)
    }
}

impl Closable for PathObserver {
    fn close(&self) {
        let inner = &self.inner;
        if inner.state.replace(ObserverState::Closed) == ObserverState::Closed {
            return;
        }
        inner.chain.borrow_mut().take();
        inner.listener.discard();
        inner.callback.clear();
    }

    fn is_closed(&self) -> bool {
        self.inner.state.get() == ObserverState::Closed
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathObserver")
            .field("path", &self.inner.path.to_string())
            .field("state", &self.inner.state.get())
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
