//! Aggregate Sources

use std::fmt;
use std::rc::Rc;

use super::{AggregateObserver, Bindable, PathObserver};
use crate::error::Result;
use crate::reactive::{Path, Scheduler, Value};

/// One input of an [`AggregateObserver`].
pub enum Source {
    /// An observer built by the caller.
    Single(Rc<dyn Bindable>),
    /// A path under a root; the aggregate builds the observer.
    Path { root: Value, path: Path },
    /// A nested aggregate, reported as an array of its values.
    Aggregate(AggregateObserver),
}

impl Source {
    pub fn path(root: impl Into<Value>, path: &str) -> Result<Self> {
        Ok(Source::Path {
            root: root.into(),
            path: Path::parse(path)?,
        })
    }

    pub fn observer(observer: impl Bindable + 'static) -> Self {
        Source::Single(Rc::new(observer))
    }

    pub(crate) fn into_observer(self, scheduler: &Scheduler) -> Rc<dyn Bindable> {
        match self {
            Source::Single(observer) => observer,
            Source::Path { root, path } => Rc::new(PathObserver::with_path(scheduler, root, path)),
            Source::Aggregate(aggregate) => Rc::new(aggregate),
        }
    }
}

impl From<AggregateObserver> for Source {
    fn from(aggregate: AggregateObserver) -> Self {
        Source::Aggregate(aggregate)
    }
}

impl From<PathObserver> for Source {
    fn from(observer: PathObserver) -> Self {
        Source::observer(observer)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Single(observer) => f
                .debug_tuple("Single")
                .field(&observer.state())
                .finish(),
            Source::Path { root, path } => f
                .debug_struct("Path")
                .field("root", &root.type_name())
                .field("path", &path.to_string())
                .finish(),
            Source::Aggregate(aggregate) => f.debug_tuple("Aggregate").field(aggregate).finish(),
        }
    }
}
