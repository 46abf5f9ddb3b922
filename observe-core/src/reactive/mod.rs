//! Reactive Primitives
//!
//! This module implements the mutation-tracking layer: observable
//! containers, the change records they emit, and the scheduler that batches
//! those records into listener deliveries.
//!
//! # Concepts
//!
//! ## Containers
//!
//! [`ObservableObject`] and [`ObservableArray`] are shared, interior-mutable
//! containers. Every mutation that changes something produces a
//! [`ChangeRecord`] for each registered listener whose [`AcceptTypes`]
//! filter admits it.
//!
//! ## Listeners
//!
//! A [`ChangeCallback`] queues the records it receives. Nothing runs at
//! mutation time: the [`Scheduler`] delivers each dirty listener's whole
//! queue at the next [`flush`](Scheduler::flush), ordered by the listener's
//! registration sequence.
//!
//! ## Splices
//!
//! Array records are [`Splice`]s. The [`splice`] module merges a batch of
//! them into a minimal, index-sorted list and can replay or diff arrays.
//!
//! # Implementation Notes
//!
//! Everything is single-threaded. Containers and listeners are `Rc`
//! handles; registrations hold listeners weakly and [`Subscription`]
//! handles unregister on drop, so dropping a listener is enough to stop it.

mod array;
mod callback;
mod notifier;
mod object;
mod phase;
mod record;
mod scheduler;
mod value;

pub mod path;
pub mod splice;

pub use array::ObservableArray;
pub use callback::ChangeCallback;
pub use notifier::Subscription;
pub use object::{Accessor, ObservableObject};
pub use path::Path;
pub use phase::{ObserverState, Phase, PhaseGuard};
pub use record::{AcceptTypes, ChangeKind, ChangeRecord, ChangeType, Splice};
pub use scheduler::{Scheduler, TaskHandle, TaskId};
pub(crate) use scheduler::panic_message;
pub use value::{same_value, Key, Value};
