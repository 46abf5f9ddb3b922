//! Change Records
//!
//! A [`ChangeRecord`] describes one mutation of one container. Records are
//! produced synchronously by the mutating call, queued per listener, and
//! handed to the listener in order at the next flush.
//!
//! # Splices
//!
//! Array mutations are described by a [`Splice`]: at `index`, the elements in
//! `removed` were taken out and `added_count` new elements were put in their
//! place. A splice is an invertible edit script: knowing the post-mutation
//! array and the splice is enough to rebuild the pre-mutation array.

use std::fmt;

use super::value::{Key, Value};

/// The kind of a change record, used for accept filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Add,
    Update,
    Delete,
    Reconfigure,
    SetPrototype,
    PreventExtensions,
    Splice,
}

impl ChangeType {
    const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Wire name of the record type.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
            ChangeType::Reconfigure => "reconfigure",
            ChangeType::SetPrototype => "setPrototype",
            ChangeType::PreventExtensions => "preventExtensions",
            ChangeType::Splice => "splice",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of record types a registration wants to receive.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcceptTypes(u8);

impl AcceptTypes {
    pub const NONE: AcceptTypes = AcceptTypes(0);

    pub const ALL: AcceptTypes = AcceptTypes(0x7f);

    /// Default filter for plain objects: everything except splices.
    pub const OBJECT: AcceptTypes = AcceptTypes::NONE
        .with(ChangeType::Add)
        .with(ChangeType::Update)
        .with(ChangeType::Delete)
        .with(ChangeType::Reconfigure)
        .with(ChangeType::SetPrototype)
        .with(ChangeType::PreventExtensions);

    /// Default filter for arrays.
    pub const ARRAY: AcceptTypes = AcceptTypes::NONE
        .with(ChangeType::Add)
        .with(ChangeType::Update)
        .with(ChangeType::Delete)
        .with(ChangeType::Splice);

    pub const fn only(change: ChangeType) -> Self {
        AcceptTypes(change.bit())
    }

    pub const fn with(self, change: ChangeType) -> Self {
        AcceptTypes(self.0 | change.bit())
    }

    pub const fn contains(self, change: ChangeType) -> bool {
        self.0 & change.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<ChangeType> for AcceptTypes {
    fn from_iter<I: IntoIterator<Item = ChangeType>>(iter: I) -> Self {
        iter.into_iter().fold(AcceptTypes::NONE, AcceptTypes::with)
    }
}

impl fmt::Debug for AcceptTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const ALL_TYPES: [ChangeType; 7] = [
            ChangeType::Add,
            ChangeType::Update,
            ChangeType::Delete,
            ChangeType::Reconfigure,
            ChangeType::SetPrototype,
            ChangeType::PreventExtensions,
            ChangeType::Splice,
        ];
        f.debug_set()
            .entries(ALL_TYPES.iter().filter(|t| self.contains(**t)).map(|t| t.as_str()))
            .finish()
    }
}

/// A contiguous remove-and-insert edit of an array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Splice {
    /// Position of the edit in the post-mutation array.
    pub index: usize,
    /// Elements that were removed, in their original order.
    pub removed: Vec<Value>,
    /// Number of elements inserted at `index`.
    pub added_count: usize,
}

impl Splice {
    pub fn new(index: usize, removed: Vec<Value>, added_count: usize) -> Self {
        Self {
            index,
            removed,
            added_count,
        }
    }

    /// A splice that neither removes nor adds anything.
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added_count == 0
    }

    /// Net change in array length caused by this splice.
    pub fn length_delta(&self) -> isize {
        self.added_count as isize - self.removed.len() as isize
    }
}

/// What happened, without the container it happened to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Add { name: Key },
    Update { name: Key, old_value: Value },
    Delete { name: Key, old_value: Value },
    Reconfigure { name: Key },
    SetPrototype { old_value: Value },
    PreventExtensions,
    Splice(Splice),
}

/// One mutation of one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// The mutated container.
    pub object: Value,
    pub kind: ChangeKind,
}

impl ChangeRecord {
    pub fn new(object: Value, kind: ChangeKind) -> Self {
        Self { object, kind }
    }

    pub fn change_type(&self) -> ChangeType {
        match &self.kind {
            ChangeKind::Add { .. } => ChangeType::Add,
            ChangeKind::Update { .. } => ChangeType::Update,
            ChangeKind::Delete { .. } => ChangeType::Delete,
            ChangeKind::Reconfigure { .. } => ChangeType::Reconfigure,
            ChangeKind::SetPrototype { .. } => ChangeType::SetPrototype,
            ChangeKind::PreventExtensions => ChangeType::PreventExtensions,
            ChangeKind::Splice(_) => ChangeType::Splice,
        }
    }

    /// The property the record is about, if any.
    pub fn name(&self) -> Option<&Key> {
        match &self.kind {
            ChangeKind::Add { name }
            | ChangeKind::Update { name, .. }
            | ChangeKind::Delete { name, .. }
            | ChangeKind::Reconfigure { name } => Some(name),
            _ => None,
        }
    }

    /// The value replaced by the mutation, if the record carries one.
    pub fn old_value(&self) -> Option<&Value> {
        match &self.kind {
            ChangeKind::Update { old_value, .. }
            | ChangeKind::Delete { old_value, .. }
            | ChangeKind::SetPrototype { old_value } => Some(old_value),
            _ => None,
        }
    }

    pub fn as_splice(&self) -> Option<&Splice> {
        match &self.kind {
            ChangeKind::Splice(splice) => Some(splice),
            _ => None,
        }
    }
}
