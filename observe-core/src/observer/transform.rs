//! Transform Observer
//!
//! Wraps another observer and converts values on the way out (`format`) and
//! on the way back in (`parse`). A failing conversion is logged and the raw
//! value is used instead.

use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::{Bindable, Closable, Mutable, Observable, ValueCallback};
use crate::error::{Diagnostic, Result};
use crate::reactive::{ObserverState, Value};

/// A two-way value conversion.
pub trait Converter {
    /// Observed value to reported value.
    fn format(&self, value: &Value) -> Result<Value, Diagnostic>;

    /// Written value to stored value. Identity by default.
    fn parse(&self, value: &Value) -> Result<Value, Diagnostic> {
        Ok(value.clone())
    }
}

impl<F> Converter for F
where
    F: Fn(&Value) -> Result<Value, Diagnostic>,
{
    fn format(&self, value: &Value) -> Result<Value, Diagnostic> {
        self(value)
    }
}

fn or_raw(converted: Result<Value, Diagnostic>, direction: &'static str, raw: &Value) -> Value {
    converted.unwrap_or_else(|diagnostic| {
        warn!(direction, error = %diagnostic, "value conversion failed; using raw value");
        raw.clone()
    })
}

/// An observer seen through a [`Converter`].
#[derive(Clone)]
pub struct TransformObserver {
    source: Rc<dyn Bindable>,
    converter: Rc<dyn Converter>,
}

impl TransformObserver {
    pub fn new(source: impl Bindable + 'static, converter: impl Converter + 'static) -> Self {
        Self::from_rc(Rc::new(source), Rc::new(converter))
    }

    pub fn from_rc(source: Rc<dyn Bindable>, converter: Rc<dyn Converter>) -> Self {
        Self { source, converter }
    }

    fn format(&self, value: &Value) -> Value {
        or_raw(self.converter.format(value), "format", value)
    }
}

impl Observable for TransformObserver {
    fn open_with(&self, mut callback: ValueCallback) -> Result<Value> {
        let converter = Rc::clone(&self.converter);
        let value = self.source.open_with(Box::new(move |new: &Value, old: &Value| {
            let new = or_raw(converter.format(new), "format", new);
            let old = or_raw(converter.format(old), "format", old);
            callback(&new, &old)
        }))?;
        Ok(self.format(&value))
    }

    fn deliver(&self) -> bool {
        self.source.deliver()
    }

    fn discard_changes(&self) -> Value {
        self.format(&self.source.discard_changes())
    }

    fn value(&self) -> Value {
        self.format(&self.source.value())
    }

    fn state(&self) -> ObserverState {
        self.source.state()
    }
}

impl Mutable for TransformObserver {
    fn set_value(&self, value: Value) -> bool {
        let parsed = or_raw(self.converter.parse(&value), "parse", &value);
        self.source.set_value(parsed)
    }
}

impl Closable for TransformObserver {
    fn close(&self) {
        self.source.close();
    }

    fn is_closed(&self) -> bool {
        self.source.is_closed()
    }
}

impl fmt::Debug for TransformObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformObserver")
            .field("state", &self.source.state())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{value_callback, PathObserver};
    use crate::reactive::{ObservableObject, Scheduler};
    use std::cell::RefCell;

    /// Numbers shown as strings; only numeric strings parse back.
    struct NumberText;

    impl Converter for NumberText {
        fn format(&self, value: &Value) -> Result<Value, Diagnostic> {
            match value.as_number() {
                Some(n) => Ok(Value::from(n.to_string())),
                None => Err(Diagnostic::new("not a number")),
            }
        }

        fn parse(&self, value: &Value) -> Result<Value, Diagnostic> {
            value
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .map(Value::from)
                .ok_or_else(|| Diagnostic::new("not numeric text"))
        }
    }

    #[test]
    fn formats_reported_values() {
        let scheduler = Scheduler::new();
        let object: ObservableObject = [("n", 1)].into_iter().collect();
        let observer = TransformObserver::new(
            PathObserver::new(&scheduler, object.clone(), "n").unwrap(),
            NumberText,
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let initial = observer
            .open_with(value_callback(move |new: &Value, old: &Value| {
                log_clone.borrow_mut().push((new.clone(), old.clone()));
            }))
            .unwrap();
        assert_eq!(initial, Value::from("1"));

        object.set("n", 2);
        scheduler.flush();
        assert_eq!(*log.borrow(), vec![(Value::from("2"), Value::from("1"))]);
    }

    #[test]
    fn parse_on_write_and_raw_fallback() {
        let scheduler = Scheduler::new();
        let object: ObservableObject = [("n", 1)].into_iter().collect();
        let observer = TransformObserver::new(
            PathObserver::new(&scheduler, object.clone(), "n").unwrap(),
            NumberText,
        );

        assert!(observer.set_value(Value::from("42")));
        assert_eq!(object.get("n"), Value::from(42));

        // Unparseable text is stored raw; formatting it fails and passes it through.
        assert!(observer.set_value(Value::from("abc")));
        assert_eq!(object.get("n"), Value::from("abc"));
        assert_eq!(observer.get_from(), Value::from("abc"));
    }

    #[test]
    fn closures_are_converters() {
        let double = |value: &Value| -> Result<Value, Diagnostic> {
            Ok(Value::from(value.as_number().unwrap_or_default() * 2.0))
        };
        assert_eq!(double.format(&Value::from(4)).unwrap(), Value::from(8));
        assert_eq!(double.parse(&Value::from(4)).unwrap(), Value::from(4));
    }
}
