//! Property Paths
//!
//! A [`Path`] is a parsed sequence of [`Key`]s addressing a value nested
//! inside containers.
//!
//! # Grammar
//!
//! ```text
//! path     := ws (segment (("." segment) | bracket)*)? ws
//! segment  := ident | digits
//! bracket  := "[" (digits | quoted) "]"
//! quoted   := "'" chars "'" | '"' chars '"'      (backslash escapes)
//! ident    := (alpha | "_" | "$") (alnum | "_" | "$")*
//! ```
//!
//! Digit segments become [`Key::Index`]; everything else is a
//! [`Key::Name`]. The empty string is the empty path, which resolves to the
//! root itself.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use super::array::MAX_LENGTH;
use super::value::{Key, Value};
use crate::error::{ObserveError, Result};

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    segments: SmallVec<[Key; 4]>,
}

impl Path {
    /// The empty path.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(source: &str) -> Result<Self> {
        Parser::new(source).parse()
    }

    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = Key>,
    {
        Self {
            segments: keys.into_iter().collect(),
        }
    }

    pub fn segments(&self) -> &[Key] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment and the path after it.
    pub fn split_first(&self) -> Option<(&Key, Path)> {
        let (head, rest) = self.segments.split_first()?;
        Some((head, Path::from_keys(rest.iter().cloned())))
    }

    /// Resolve against `root`. Any non-container on the way yields
    /// `Undefined`.
    pub fn value_from(&self, root: &Value) -> Value {
        let mut current = root.clone();
        for key in &self.segments {
            if !current.is_container() {
                return Value::Undefined;
            }
            current = current.get(key);
        }
        current
    }

    /// Write `value` at this path under `root`.
    ///
    /// Returns false, without writing, when the path is empty, an
    /// intermediate value is not a container, or an array index or length
    /// is past [`MAX_LENGTH`](super::array::MAX_LENGTH).
    pub fn set_value_from(&self, root: &Value, value: Value) -> bool {
        let Some((last, parents)) = self.segments.split_last() else {
            return false;
        };
        let mut target = root.clone();
        for key in parents {
            if !target.is_container() {
                return false;
            }
            target = target.get(key);
        }

        match (&target, last) {
            (Value::Object(object), key) => {
                object.set(&key.to_name(), value);
                true
            }
            (Value::Array(array), Key::Index(index)) => {
                // `set` logs and ignores indices past the limit.
                array.set(*index, value);
                *index < MAX_LENGTH
            }
            (Value::Array(array), Key::Name(name)) if &**name == "length" => {
                value.as_index().is_some_and(|len| array.set_length(len))
            }
            _ => false,
        }
    }
}

impl FromStr for Path {
    type Err = ObserveError;

    fn from_str(source: &str) -> Result<Self> {
        Path::parse(source)
    }
}

impl TryFrom<&str> for Path {
    type Error = ObserveError;

    fn try_from(source: &str) -> Result<Self> {
        Path::parse(source)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_part)
}

impl fmt::Display for Path {
    /// Canonical form: identifiers dotted, indices bracketed, anything else
    /// quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.segments.iter().enumerate() {
            match key {
                Key::Index(index) => write!(f, "[{index}]")?,
                Key::Name(name) if is_identifier(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Key::Name(name) => {
                    f.write_str("[\"")?;
                    for c in name.chars() {
                        if c == '"' || c == '\\' {
                            f.write_str("\\")?;
                        }
                        write!(f, "{c}")?;
                    }
                    f.write_str("\"]")?;
                }
            }
        }
        Ok(())
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    segments: SmallVec<[Key; 4]>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.trim().chars().peekable(),
            segments: SmallVec::new(),
        }
    }

    fn fail(&self, reason: &'static str) -> ObserveError {
        ObserveError::InvalidPath {
            path: self.source.to_string(),
            reason,
        }
    }

    fn parse(mut self) -> Result<Path> {
        if self.chars.peek().is_none() {
            return Ok(Path::empty());
        }

        match self.chars.peek() {
            Some('[') => {}
            _ => self.segment()?,
        }

        while let Some(&c) = self.chars.peek() {
            match c {
                '.' => {
                    self.chars.next();
                    self.segment()?;
                }
                '[' => {
                    self.chars.next();
                    self.bracket()?;
                }
                _ => return Err(self.fail("unexpected character")),
            }
        }

        Ok(Path {
            segments: self.segments,
        })
    }

    fn segment(&mut self) -> Result<()> {
        match self.chars.peek() {
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                if self.chars.peek().is_some_and(|&c| is_ident_part(c)) {
                    return Err(self.fail("identifier cannot start with a digit"));
                }
                let index = digits.parse().map_err(|_| self.fail("index out of range"))?;
                self.segments.push(Key::Index(index));
                Ok(())
            }
            Some(&c) if is_ident_start(c) => {
                let name = self.take_while(is_ident_part);
                self.segments.push(Key::Name(name.into()));
                Ok(())
            }
            Some(_) => Err(self.fail("expected identifier or index")),
            None => Err(self.fail("path ends after `.`")),
        }
    }

    fn bracket(&mut self) -> Result<()> {
        let key = match self.chars.peek() {
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                Key::Index(digits.parse().map_err(|_| self.fail("index out of range"))?)
            }
            Some(&quote) if quote == '"' || quote == '\'' => {
                self.chars.next();
                Key::Name(self.quoted(quote)?.into())
            }
            _ => return Err(self.fail("expected index or quoted key in brackets")),
        };
        match self.chars.next() {
            Some(']') => {
                self.segments.push(key);
                Ok(())
            }
            _ => Err(self.fail("unclosed bracket")),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('\\') => match self.chars.next() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(self.fail("unterminated escape")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.fail("unterminated string")),
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::array::ObservableArray;
    use crate::reactive::object::ObservableObject;

    fn keys(path: &str) -> Vec<Key> {
        Path::parse(path).unwrap().segments().to_vec()
    }

    #[test]
    fn parses_dotted_identifiers_and_indices() {
        assert_eq!(keys("a.b.c"), vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(keys("items.0.name"), vec!["items".into(), Key::Index(0), "name".into()]);
        assert_eq!(keys("a[12]"), vec!["a".into(), Key::Index(12)]);
        assert_eq!(keys(r#"a["b c"]['d']"#), vec!["a".into(), "b c".into(), "d".into()]);
        assert_eq!(keys(r#"["x\"y"]"#), vec![Key::from("x\"y")]);
        assert_eq!(keys("  $el._id  "), vec!["$el".into(), "_id".into()]);
        assert!(keys("").is_empty());
        assert!(keys("   ").is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["a..b", "a.", ".a", "1a", "a[", "a[b]", "a['x", "a b", "a[1"] {
            let err = Path::parse(bad).unwrap_err();
            assert!(
                matches!(err, ObserveError::InvalidPath { .. }),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn display_is_canonical() {
        let path: Path = r#" a['b'][0]["c d"].e "#.parse().unwrap();
        assert_eq!(path.to_string(), r#"a.b[0]["c d"].e"#);
        assert_eq!(Path::parse(&path.to_string()).unwrap(), path);
    }

    #[test]
    fn value_from_walks_containers() {
        let root = Value::from(serde_json::json!({
            "a": { "items": [ { "name": "first" } ] }
        }));
        assert_eq!(
            Path::parse("a.items[0].name").unwrap().value_from(&root),
            Value::from("first")
        );
        assert_eq!(
            Path::parse("a.items.length").unwrap().value_from(&root),
            Value::from(1)
        );
        assert_eq!(
            Path::parse("a.missing.deeper").unwrap().value_from(&root),
            Value::Undefined
        );
        assert_eq!(Path::empty().value_from(&root), root);
    }

    #[test]
    fn set_value_from_writes_through() {
        let object = ObservableObject::new();
        let array = ObservableArray::from(vec![Value::from(1), Value::from(2)]);
        object.set("list", array.clone());
        let root = Value::Object(object.clone());

        assert!(Path::parse("x").unwrap().set_value_from(&root, Value::from(5)));
        assert_eq!(object.get("x"), Value::from(5));

        assert!(Path::parse("list[1]").unwrap().set_value_from(&root, Value::from(9)));
        assert_eq!(array.get(1), Value::from(9));

        assert!(Path::parse("list.length").unwrap().set_value_from(&root, Value::from(1)));
        assert_eq!(array.len(), 1);

        assert!(!Path::parse("x.y").unwrap().set_value_from(&root, Value::from(1)));
        assert!(!Path::parse("nope.y").unwrap().set_value_from(&root, Value::from(1)));
        assert!(!Path::empty().set_value_from(&root, Value::from(1)));
    }

    #[test]
    fn oversized_array_writes_are_refused() {
        let object = ObservableObject::new();
        let array = ObservableArray::from(vec![Value::from(1)]);
        object.set("list", array.clone());
        let root = Value::Object(object);

        let length = Path::parse("list.length").unwrap();
        assert!(!length.set_value_from(&root, Value::from(1e20)));
        assert!(!length.set_value_from(&root, Value::from(4294967296.0)));

        let far = Path::from_keys([Key::from("list"), Key::Index(usize::MAX)]);
        assert!(!far.set_value_from(&root, Value::from(5)));

        assert_eq!(array.to_vec(), vec![Value::from(1)]);
    }
}
