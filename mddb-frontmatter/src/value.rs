//! Borrowed frontmatter values and the parsed document view.

use std::borrow::Cow;

use mddb_core::document::{FieldValue, FrontmatterMap};

/// A frontmatter value borrowing from the parse buffer.
///
/// `Str` is a `Cow` because double-quoted strings with escapes have no
/// contiguous source representation; everything else borrows.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Str(Cow<'a, str>),
    Int(i64),
    Bool(bool),
    List(Vec<Value<'a>>),
    Object(Vec<(&'a str, Value<'a>)>),
}

impl<'a> Value<'a> {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Deep-copy into an owned value that outlives the parse buffer.
    pub fn to_owned_value(&self) -> FieldValue {
        match self {
            Self::Str(s) => FieldValue::Str(s.to_string()),
            Self::Int(n) => FieldValue::Int(*n),
            Self::Bool(b) => FieldValue::Bool(*b),
            Self::List(items) => {
                FieldValue::List(items.iter().map(Value::to_owned_value).collect())
            }
            Self::Object(entries) => FieldValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_owned_value()))
                    .collect(),
            ),
        }
    }
}

/// The parsed frontmatter: top-level entries in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter<'a> {
    pub(crate) entries: Vec<(&'a str, Value<'a>)>,
}

impl<'a> Frontmatter<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value<'a>> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &Value<'a>)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Owned snapshot of every entry, preserving file order.
    pub fn to_map(&self) -> FrontmatterMap {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_owned_value()))
            .collect()
    }
}
