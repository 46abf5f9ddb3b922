//! Observable Objects
//!
//! [`ObservableObject`] is a string-keyed property map whose mutating
//! methods describe themselves as [`ChangeRecord`]s.
//!
//! # How Writes Are Observed
//!
//! `set` is the only reliably observed write path:
//!
//! 1. The new value is compared to the old one with `same_value`; an
//!    equal write emits nothing.
//! 2. A new key emits `Add`, an existing key emits `Update` with the old
//!    value.
//! 3. Accessor properties (getter/setter pairs) run their setter and emit
//!    nothing. The accessor owner is expected to call
//!    [`ObservableObject::notify`] itself.
//!
//! Structural operations emit their own records: `delete` emits `Delete`,
//! redefining a data property as an accessor emits `Reconfigure`,
//! `set_prototype` emits `SetPrototype` and `prevent_extensions` emits
//! `PreventExtensions`.
//!
//! Records are only built when someone is listening.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::callback::ChangeCallback;
use super::notifier::{Notifier, Subscription};
use super::record::{AcceptTypes, ChangeKind, ChangeRecord};
use super::value::{same_value, Key, Value};

/// A getter/setter pair standing in for a data property.
#[derive(Clone)]
pub struct Accessor {
    get: Rc<dyn Fn() -> Value>,
    set: Option<Rc<dyn Fn(Value)>>,
}

impl Accessor {
    /// A read-only accessor.
    pub fn new<G>(get: G) -> Self
    where
        G: Fn() -> Value + 'static,
    {
        Self {
            get: Rc::new(get),
            set: None,
        }
    }

    pub fn with_setter<S>(mut self, set: S) -> Self
    where
        S: Fn(Value) + 'static,
    {
        self.set = Some(Rc::new(set));
        self
    }
}

#[derive(Clone)]
enum Slot {
    Data(Value),
    Accessor(Accessor),
}

struct ObjectInner {
    slots: RefCell<IndexMap<Rc<str>, Slot>>,
    prototype: RefCell<Option<ObservableObject>>,
    extensible: Cell<bool>,
    notifier: OnceCell<Rc<Notifier>>,
}

/// A property map that reports its own mutations.
///
/// Cloning returns another handle to the same object.
#[derive(Clone)]
pub struct ObservableObject {
    inner: Rc<ObjectInner>,
}

impl ObservableObject {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                slots: RefCell::new(IndexMap::new()),
                prototype: RefCell::new(None),
                extensible: Cell::new(true),
                notifier: OnceCell::new(),
            }),
        }
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &ObservableObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a property, consulting the prototype chain when it is not an
    /// own property.
    pub fn get(&self, name: &str) -> Value {
        let slot = self.inner.slots.borrow().get(name).cloned();
        match slot {
            Some(Slot::Data(value)) => value,
            Some(Slot::Accessor(accessor)) => (accessor.get)(),
            None => {
                let prototype = self.inner.prototype.borrow().clone();
                prototype.map_or(Value::Undefined, |proto| proto.get(name))
            }
        }
    }

    /// Whether `name` is an own property.
    pub fn has(&self, name: &str) -> bool {
        self.inner.slots.borrow().contains_key(name)
    }

    /// Own property names in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.slots.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a property.
    ///
    /// Returns whether a change record was emitted. Same-value writes,
    /// accessor writes and new keys on a non-extensible object return false.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let existing = self.inner.slots.borrow().get(name).cloned();

        match existing {
            Some(Slot::Accessor(accessor)) => {
                if let Some(setter) = accessor.set {
                    setter(value);
                }
                false
            }
            Some(Slot::Data(old_value)) => {
                if same_value(&old_value, &value) {
                    return false;
                }
                let name: Rc<str> = name.into();
                self.inner
                    .slots
                    .borrow_mut()
                    .insert(Rc::clone(&name), Slot::Data(value));
                self.emit(|| ChangeKind::Update {
                    name: Key::Name(name),
                    old_value,
                });
                true
            }
            None => {
                if !self.inner.extensible.get() {
                    debug!(name, "ignoring new property on non-extensible object");
                    return false;
                }
                let name: Rc<str> = name.into();
                self.inner
                    .slots
                    .borrow_mut()
                    .insert(Rc::clone(&name), Slot::Data(value));
                self.emit(|| ChangeKind::Add {
                    name: Key::Name(name),
                });
                true
            }
        }
    }

    /// Remove an own property. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.inner.slots.borrow_mut().shift_remove_entry(name);
        match removed {
            Some((name, slot)) => {
                let old_value = match slot {
                    Slot::Data(value) => value,
                    Slot::Accessor(accessor) => (accessor.get)(),
                };
                self.emit(|| ChangeKind::Delete {
                    name: Key::Name(name),
                    old_value,
                });
                true
            }
            None => false,
        }
    }

    /// Install a getter/setter pair for `name`.
    ///
    /// Replacing an existing property emits `Reconfigure`; defining a fresh
    /// one emits `Add`.
    pub fn define_accessor(&self, name: &str, accessor: Accessor) {
        let name: Rc<str> = name.into();
        let previous = self
            .inner
            .slots
            .borrow_mut()
            .insert(Rc::clone(&name), Slot::Accessor(accessor));
        let name = Key::Name(name);
        match previous {
            Some(_) => self.emit(|| ChangeKind::Reconfigure { name }),
            None => self.emit(|| ChangeKind::Add { name }),
        }
    }

    pub fn prototype(&self) -> Option<ObservableObject> {
        self.inner.prototype.borrow().clone()
    }

    /// Replace the prototype used for property lookup fallback.
    pub fn set_prototype(&self, prototype: Option<ObservableObject>) {
        let old = self.inner.prototype.replace(prototype.clone());
        let unchanged = match (&old, &prototype) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.emit(|| ChangeKind::SetPrototype {
            old_value: old.map_or(Value::Null, Value::Object),
        });
    }

    /// Refuse new properties from now on.
    pub fn prevent_extensions(&self) {
        if self.inner.extensible.replace(false) {
            self.emit(|| ChangeKind::PreventExtensions);
        }
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.get()
    }

    /// Register `callback` for records whose type is in `accept`.
    pub fn observe(&self, callback: &ChangeCallback, accept: AcceptTypes) -> Subscription {
        self.notifier().observe(callback, accept)
    }

    /// Emit a record by hand, e.g. from an accessor's setter.
    pub fn notify(&self, kind: ChangeKind) {
        self.emit(|| kind);
    }

    /// Number of listeners currently registered.
    pub fn observer_count(&self) -> usize {
        self.inner.notifier.get().map_or(0, |notifier| notifier.len())
    }

    fn notifier(&self) -> &Rc<Notifier> {
        self.inner.notifier.get_or_init(Rc::default)
    }

    fn emit(&self, kind: impl FnOnce() -> ChangeKind) {
        if let Some(notifier) = self.inner.notifier.get() {
            if notifier.has_observers() {
                notifier.notify(ChangeRecord::new(Value::Object(self.clone()), kind()));
            }
        }
    }
}

impl Default for ObservableObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for ObservableObject
where
    K: Into<Rc<str>>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = ObservableObject::new();
        object.inner.slots.borrow_mut().extend(
            iter.into_iter()
                .map(|(key, value)| (key.into(), Slot::Data(value.into()))),
        );
        object
    }
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("keys", &self.keys())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
