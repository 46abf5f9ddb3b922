//! Observable Arrays
//!
//! [`ObservableArray`] is a growable list whose structural mutators all
//! funnel through one primitive, `splice_raw`, that edits the storage and
//! emits a single `Splice` record.
//!
//! | Mutator            | Record                                           |
//! |--------------------|--------------------------------------------------|
//! | `push`/`extend`    | splice at the old length                         |
//! | `pop`/`shift`      | splice removing one element                      |
//! | `unshift`          | splice at 0                                      |
//! | `splice`           | exactly the requested edit                       |
//! | `set` in bounds    | `Update` at the index                            |
//! | `set` past the end | splice growing the array (gap filled with `undefined`) |
//! | `set_length`       | splice truncating or growing                     |
//! | `sort`/`reverse`   | one full-range splice                            |
//!
//! `sort` and `reverse` deliberately report the whole array as replaced
//! rather than a minimal permutation. Listeners wanting a tight diff can ask
//! an [`ArrayObserver`](crate::observer::ArrayObserver) for
//! [`SpliceMode::Minimal`](crate::observer::SpliceMode::Minimal).

use std::cell::{OnceCell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::callback::ChangeCallback;
use super::notifier::{Notifier, Subscription};
use super::record::{AcceptTypes, ChangeKind, ChangeRecord, Splice};
use super::value::{same_value, Key, Value};

/// Largest length an array may grow to (2^32 - 1).
pub const MAX_LENGTH: usize = u32::MAX as usize;

fn within_max_length(len: usize, what: &'static str) -> bool {
    if len > MAX_LENGTH {
        warn!(requested = len, max = MAX_LENGTH, what, "array write refused; length limit exceeded");
        return false;
    }
    true
}

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    notifier: OnceCell<Rc<Notifier>>,
}

/// An ordered list that reports its own mutations.
///
/// Cloning returns another handle to the same array.
#[derive(Clone)]
pub struct ObservableArray {
    inner: Rc<ArrayInner>,
}

impl ObservableArray {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn ptr_eq(&self, other: &ObservableArray) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `Undefined` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Borrow the contents for the duration of `f`.
    ///
    /// `f` must not mutate this array.
    pub fn with<R>(&self, f: impl FnOnce(&[Value]) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    /// Append one element. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.extend([value.into()])
    }

    /// Append several elements in one splice. Returns the new length.
    pub fn extend<I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = Value>,
    {
        let len = self.len();
        self.splice_raw(len, 0, values.into_iter().collect());
        self.len()
    }

    /// Remove and return the last element (`Undefined` when empty).
    pub fn pop(&self) -> Value {
        match self.len() {
            0 => Value::Undefined,
            len => self.splice_raw(len - 1, 1, Vec::new()).pop().unwrap_or_default(),
        }
    }

    /// Remove and return the first element (`Undefined` when empty).
    pub fn shift(&self) -> Value {
        if self.is_empty() {
            return Value::Undefined;
        }
        self.splice_raw(0, 1, Vec::new()).pop().unwrap_or_default()
    }

    /// Insert elements at the front. Returns the new length.
    pub fn unshift<I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = Value>,
    {
        self.splice_raw(0, 0, values.into_iter().collect());
        self.len()
    }

    /// Remove `delete_count` elements at `index` and insert `items` there.
    ///
    /// Both `index` and `delete_count` are clamped to the array bounds.
    /// Returns the removed elements.
    pub fn splice(&self, index: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        self.splice_raw(index, delete_count, items)
    }

    /// Write one element.
    ///
    /// In bounds this emits an `Update` (nothing if the value is the same);
    /// past the end it grows the array, padding with `undefined`. An index
    /// at or beyond [`MAX_LENGTH`] is refused.
    /// Returns whether a record was emitted.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        let value = value.into();
        let len = self.len();

        if index >= len {
            if !within_max_length(index.saturating_add(1), "index") {
                return false;
            }
            let mut items = vec![Value::Undefined; index - len];
            items.push(value);
            self.splice_raw(len, 0, items);
            return true;
        }

        let old_value = {
            let mut items = self.inner.items.borrow_mut();
            if same_value(&items[index], &value) {
                return false;
            }
            std::mem::replace(&mut items[index], value)
        };
        self.emit(|| ChangeKind::Update {
            name: Key::Index(index),
            old_value,
        });
        true
    }

    /// Truncate or pad (with `undefined`) to `len` elements.
    ///
    /// Returns false, leaving the array alone, if `len` exceeds
    /// [`MAX_LENGTH`].
    pub fn set_length(&self, len: usize) -> bool {
        if !within_max_length(len, "length") {
            return false;
        }
        let current = self.len();
        match len.cmp(&current) {
            Ordering::Less => {
                self.splice_raw(len, current - len, Vec::new());
            }
            Ordering::Greater => {
                self.splice_raw(current, 0, vec![Value::Undefined; len - current]);
            }
            Ordering::Equal => {}
        }
        true
    }

    /// Sort by string form, with `undefined` last.
    pub fn sort(&self) {
        self.sort_by(|a, b| match (a.is_undefined(), b.is_undefined()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.to_js_string().cmp(&b.to_js_string()),
        });
    }

    /// Stable sort with a custom comparator.
    ///
    /// The comparator runs on a copy, so it may read this array.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        let prior = self.inner.items.replace(sorted);
        self.emit_full_range(prior);
    }

    pub fn reverse(&self) {
        let prior = {
            let mut items = self.inner.items.borrow_mut();
            let prior = items.clone();
            items.reverse();
            prior
        };
        self.emit_full_range(prior);
    }

    /// Register `callback` for records whose type is in `accept`.
    pub fn observe(&self, callback: &ChangeCallback, accept: AcceptTypes) -> Subscription {
        self.inner
            .notifier
            .get_or_init(Rc::default)
            .observe(callback, accept)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.notifier.get().map_or(0, |notifier| notifier.len())
    }

    /// The one structural primitive. Edits storage, then emits one splice.
    fn splice_raw(&self, index: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let added_count = items.len();
        let (index, removed) = {
            let mut storage = self.inner.items.borrow_mut();
            let index = index.min(storage.len());
            let end = index.saturating_add(delete_count).min(storage.len());
            let removed: Vec<Value> = storage.splice(index..end, items).collect();
            (index, removed)
        };

        let splice = Splice::new(index, removed, added_count);
        if !splice.is_noop() {
            let removed = splice.removed.clone();
            self.emit(|| ChangeKind::Splice(splice));
            return removed;
        }
        splice.removed
    }

    fn emit_full_range(&self, prior: Vec<Value>) {
        let len = self.len();
        if len == 0 {
            return;
        }
        self.emit(|| ChangeKind::Splice(Splice::new(0, prior, len)));
    }

    fn emit(&self, kind: impl FnOnce() -> ChangeKind) {
        if let Some(notifier) = self.inner.notifier.get() {
            if notifier.has_observers() {
                notifier.notify(ChangeRecord::new(Value::Array(self.clone()), kind()));
            }
        }
    }
}

impl Default for ObservableArray {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for ObservableArray {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                notifier: OnceCell::new(),
            }),
        }
    }
}

impl FromIterator<Value> for ObservableArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl fmt::Debug for ObservableArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow: elements may contain this array again.
        f.debug_struct("ObservableArray")
            .field("len", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::scheduler::Scheduler;

    fn values(items: &[i32]) -> Vec<Value> {
        items.iter().copied().map(Value::from).collect()
    }

    fn splice_log(scheduler: &Scheduler, array: &ObservableArray) -> (Subscription, Rc<RefCell<Vec<ChangeRecord>>>, ChangeCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let callback = ChangeCallback::new(scheduler, move |records: &[ChangeRecord]| {
            log_clone.borrow_mut().extend_from_slice(records);
        });
        let subscription = array.observe(&callback, AcceptTypes::ARRAY);
        (subscription, log, callback)
    }

    #[test]
    fn push_pop_shift_unshift() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(values(&[1, 2]));
        let (_sub, log, _cb) = splice_log(&scheduler, &array);

        assert_eq!(array.push(3), 3);
        assert_eq!(array.pop(), Value::from(3));
        assert_eq!(array.shift(), Value::from(1));
        assert_eq!(array.unshift(values(&[0])), 2);
        scheduler.flush();

        let splices: Vec<Splice> = log
            .borrow()
            .iter()
            .map(|r| r.as_splice().cloned().unwrap())
            .collect();
        assert_eq!(
            splices,
            vec![
                Splice::new(2, vec![], 1),
                Splice::new(2, values(&[3]), 0),
                Splice::new(0, values(&[1]), 0),
                Splice::new(0, vec![], 1),
            ]
        );
        assert_eq!(array.to_vec(), values(&[0, 2]));
    }

    #[test]
    fn empty_pop_is_silent() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::new();
        let (_sub, log, _cb) = splice_log(&scheduler, &array);

        assert_eq!(array.pop(), Value::Undefined);
        assert_eq!(array.shift(), Value::Undefined);
        assert!(array.splice(0, 3, vec![]).is_empty());
        scheduler.flush();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn splice_clamps_to_bounds() {
        let array = ObservableArray::from(values(&[1, 2, 3]));
        let removed = array.splice(2, 10, values(&[9]));
        assert_eq!(removed, values(&[3]));
        assert_eq!(array.to_vec(), values(&[1, 2, 9]));

        array.splice(10, 0, values(&[4]));
        assert_eq!(array.to_vec(), values(&[1, 2, 9, 4]));
    }

    #[test]
    fn set_in_bounds_emits_update() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(values(&[1, 2]));
        let (_sub, log, _cb) = splice_log(&scheduler, &array);

        assert!(!array.set(0, 1));
        assert!(array.set(1, 5));
        scheduler.flush();

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(
            log.borrow()[0].kind,
            ChangeKind::Update {
                name: Key::Index(1),
                old_value: Value::from(2)
            }
        );
    }

    #[test]
    fn set_past_end_grows_with_undefined() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(values(&[1]));
        let (_sub, log, _cb) = splice_log(&scheduler, &array);

        array.set(3, 4);
        scheduler.flush();

        assert_eq!(
            array.to_vec(),
            vec![Value::from(1), Value::Undefined, Value::Undefined, Value::from(4)]
        );
        assert_eq!(log.borrow()[0].as_splice(), Some(&Splice::new(1, vec![], 3)));
    }

    #[test]
    fn set_length_truncates_and_pads() {
        let array = ObservableArray::from(values(&[1, 2, 3]));
        assert!(array.set_length(1));
        assert_eq!(array.to_vec(), values(&[1]));
        assert!(array.set_length(2));
        assert_eq!(array.to_vec(), vec![Value::from(1), Value::Undefined]);
    }

    #[test]
    fn oversized_writes_are_refused() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(values(&[1]));
        let (_sub, log, _cb) = splice_log(&scheduler, &array);

        assert!(!array.set(usize::MAX, 5));
        assert!(!array.set(MAX_LENGTH, 5));
        assert!(!array.set_length(usize::MAX));
        assert!(!array.set_length(MAX_LENGTH + 1));
        scheduler.flush();

        assert_eq!(array.to_vec(), values(&[1]));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn default_sort_of_self_containing_array() {
        let array = ObservableArray::from(vec![Value::from("b"), Value::from(1), Value::from("a")]);
        array.push(array.clone());
        array.sort();

        assert_eq!(array.get(0), Value::from(1));
        assert_eq!(array.get(1), Value::from("a"));
        assert_eq!(array.get(2), Value::from("b"));
        assert_eq!(array.get(3), Value::from(array.clone()));
    }

    #[test]
    fn comparator_may_read_the_array() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(values(&[3, 1, 2]));
        let (_sub, log, _cb) = splice_log(&scheduler, &array);
        let view = array.clone();
        let mut lengths = Vec::new();

        array.sort_by(|a, b| {
            lengths.push(view.len());
            a.as_number().partial_cmp(&b.as_number()).unwrap_or(Ordering::Equal)
        });
        scheduler.flush();

        assert!(lengths.iter().all(|&len| len == 3));
        assert_eq!(array.to_vec(), values(&[1, 2, 3]));
        assert_eq!(log.borrow()[0].as_splice(), Some(&Splice::new(0, values(&[3, 1, 2]), 3)));
    }

    #[test]
    fn sort_and_reverse_emit_full_range() {
        let scheduler = Scheduler::new();
        let array = ObservableArray::from(values(&[3, 1, 2]));
        let (_sub, log, _cb) = splice_log(&scheduler, &array);

        array.sort();
        assert_eq!(array.to_vec(), values(&[1, 2, 3]));
        array.reverse();
        assert_eq!(array.to_vec(), values(&[3, 2, 1]));
        scheduler.flush();

        let log = log.borrow();
        assert_eq!(log[0].as_splice(), Some(&Splice::new(0, values(&[3, 1, 2]), 3)));
        assert_eq!(log[1].as_splice(), Some(&Splice::new(0, values(&[1, 2, 3]), 3)));
    }

    #[test]
    fn default_sort_puts_undefined_last() {
        let array = ObservableArray::from(vec![Value::Undefined, Value::from(10), Value::from(9)]);
        array.sort();
        // String ordering: "10" < "9".
        assert_eq!(
            array.to_vec(),
            vec![Value::from(10), Value::from(9), Value::Undefined]
        );
    }

    #[test]
    fn unobserved_array_builds_no_records() {
        let array = ObservableArray::from(values(&[1]));
        array.push(2);
        assert_eq!(array.observer_count(), 0);
    }
}
