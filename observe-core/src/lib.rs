//! Observe Core
//!
//! This crate provides batched change observation for plain, shared
//! containers. It implements:
//!
//! - Observable objects and arrays that emit change records
//! - A flush scheduler that delivers each listener's records as one batch
//! - Splice merging and array diffing
//! - Composed observers for paths, arrays, objects, aggregates and
//!   per-element sub-paths
//! - An async driver that flushes on a tokio `LocalSet`
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: containers, change records, listeners and the scheduler
//! - `observer`: observers composed from the reactive layer
//! - `driver`: the tokio integration
//! - `config`: scheduler tunables
//! - `error`: error and diagnostic types
//!
//! # Example
//!
//! ```rust,ignore
//! use observe_core::observer::PathObserver;
//! use observe_core::reactive::{ObservableObject, Scheduler, Value};
//!
//! let scheduler = Scheduler::new();
//! let model = ObservableObject::new();
//! model.set("count", 0);
//!
//! let observer = PathObserver::new(&scheduler, model.clone(), "count")?;
//! observer.open(|new: &Value, old: &Value| println!("{old:?} -> {new:?}"))?;
//!
//! model.set("count", 1);
//! model.set("count", 2);
//! scheduler.flush(); // prints "0 -> 2" once
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod observer;
pub mod reactive;

pub use config::SchedulerConfig;
pub use driver::FlushDriver;
pub use error::{Diagnostic, ObserveError, Result};
pub use reactive::{ObservableArray, ObservableObject, Scheduler, Value};
