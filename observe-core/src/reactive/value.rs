//! Value Model
//!
//! Observed data is dynamically typed: a [`Value`] is a scalar, a string, or
//! a handle to one of the two observable containers. Containers are shared
//! by reference, so cloning a `Value::Object` clones the handle and both
//! clones see (and notify about) the same properties.
//!
//! # Equality
//!
//! Equality everywhere in the engine is [`same_value`]:
//!
//! - `NaN` equals `NaN`
//! - `+0` and `-0` are different
//! - containers compare by identity, never by contents
//!
//! `PartialEq for Value` uses the same rule, which makes it a true
//! equivalence relation and lets `Value` also implement `Eq`.

use std::fmt;
use std::rc::Rc;

use super::array::ObservableArray;
use super::object::ObservableObject;

/// A property name or array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property.
    Name(Rc<str>),
    /// A position in an array.
    Index(usize),
}

impl Key {
    /// The key as a property name; indices are rendered in decimal.
    pub fn to_name(&self) -> Rc<str> {
        match self {
            Key::Name(name) => Rc::clone(name),
            Key::Index(index) => index.to_string().into(),
        }
    }

    /// The key as an array index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// A dynamically typed observed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObservableObject),
    Array(ObservableArray),
}

impl Value {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// Whether this value is an observable container.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_object(&self) -> Option<&ObservableObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ObservableArray> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as a non-negative integral length or index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
                Some(*n as usize)
            }
            _ => None,
        }
    }

    /// Read one step into this value. Non-containers yield `Undefined`.
    ///
    /// Arrays answer index keys and the `length` name.
    pub fn get(&self, key: &Key) -> Value {
        match (self, key) {
            (Value::Object(object), Key::Name(name)) => object.get(name),
            (Value::Object(object), Key::Index(index)) => object.get(&index.to_string()),
            (Value::Array(array), Key::Index(index)) => array.get(*index),
            (Value::Array(array), Key::Name(name)) if &**name == "length" => {
                Value::Number(array.len() as f64)
            }
            _ => Value::Undefined,
        }
    }

    /// String conversion used for default array ordering.
    ///
    /// An array nested inside itself renders as the empty string.
    pub fn to_js_string(&self) -> String {
        self.js_string_within(&mut Vec::new())
    }

    fn js_string_within(&self, open: &mut Vec<ObservableArray>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Array(array) => {
                if open.iter().any(|seen| seen.ptr_eq(array)) {
                    return String::new();
                }
                open.push(array.clone());
                let joined = array
                    .to_vec()
                    .iter()
                    .map(|item| match item {
                        Value::Undefined | Value::Null => String::new(),
                        other => other.js_string_within(open),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                open.pop();
                joined
            }
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

/// SameValue equality.
///
/// Differs from `==` on floats in exactly two places: `NaN` is equal to
/// itself and `+0` is not equal to `-0`.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x == y && x.is_sign_negative() == y.is_sign_negative()
            }
        }
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if *n == 0.0 && n.is_sign_negative() => f.write_str("-0"),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(object) => fmt::Debug::fmt(object, f),
            Value::Array(array) => fmt::Debug::fmt(array, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<ObservableObject> for Value {
    fn from(object: ObservableObject) -> Self {
        Value::Object(object)
    }
}

impl From<ObservableArray> for Value {
    fn from(array: ObservableArray) -> Self {
        Value::Array(array)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(ObservableArray::from(items))
    }
}

/// Build an observable tree from a JSON document.
///
/// Every JSON object becomes a fresh [`ObservableObject`] and every JSON
/// array a fresh [`ObservableArray`].
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_is_same_value_as_nan() {
        assert!(same_value(&Value::from(f64::NAN), &Value::from(f64::NAN)));
    }

    #[test]
    fn signed_zeros_differ() {
        assert!(!same_value(&Value::from(0.0), &Value::from(-0.0)));
        assert!(same_value(&Value::from(-0.0), &Value::from(-0.0)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = ObservableObject::new();
        let b = ObservableObject::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(ObservableObject::new()), Value::from(b));
    }

    #[test]
    fn mixed_types_are_never_equal() {
        assert_ne!(Value::from(1), Value::from("1"));
        assert_ne!(Value::Undefined, Value::Null);
    }

    #[test]
    fn json_builds_nested_containers() {
        let value = Value::from(json!({"a": {"b": [1, 2, 3]}}));
        let b = value.get(&"a".into()).get(&"b".into());
        assert_eq!(b.get(&Key::Index(1)), Value::from(2));
        assert_eq!(b.get(&"length".into()), Value::from(3));
    }

    #[test]
    fn get_on_scalar_is_undefined() {
        assert!(Value::from(5).get(&"x".into()).is_undefined());
    }

    #[test]
    fn js_string_conversion() {
        assert_eq!(Value::from(1.0).to_js_string(), "1");
        assert_eq!(Value::from(1.5).to_js_string(), "1.5");
        assert_eq!(Value::from(-0.0).to_js_string(), "0");
        assert_eq!(Value::from(f64::INFINITY).to_js_string(), "Infinity");
        assert_eq!(Value::from(vec![Value::from(1), Value::Null]).to_js_string(), "1,");
    }

    #[test]
    fn cyclic_arrays_render_the_cycle_empty() {
        let a = ObservableArray::from(vec![Value::from(1)]);
        let b = ObservableArray::from(vec![Value::from(2)]);
        a.push(b.clone());
        b.push(a.clone());

        assert_eq!(Value::from(a.clone()).to_js_string(), "1,2,");
        assert_eq!(Value::from(b).to_js_string(), "2,1,");

        // A repeated, non-cyclic reference still renders each time.
        let leaf = ObservableArray::from(vec![Value::from(3)]);
        let twice = Value::from(vec![Value::from(leaf.clone()), Value::from(leaf)]);
        assert_eq!(twice.to_js_string(), "3,3");
    }
}
