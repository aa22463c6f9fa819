//! Document model: the capability trait the store is generic over,
//! the ordered frontmatter map, and the summary row shape.

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Frontmatter keys injected by the store on serialise and consumed on
/// parse. User maps must not contain them.
pub const RESERVED_KEYS: [&str; 3] = ["id", "schema_version", "title"];

/// An owned frontmatter value in the supported subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<FieldValue>),
    Object(Vec<(String, FieldValue)>),
}

impl FieldValue {
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
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// An insertion-ordered string-keyed map of frontmatter values.
///
/// Key order is the file order on parse and feeds the deterministic
/// marshal order on write. Lookups are linear; frontmatter maps are
/// small by construction (the parser caps line count).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontmatterMap {
    entries: Vec<(String, FieldValue)>,
}

impl FrontmatterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace in place, preserving the original position of
    /// a replaced key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, FieldValue)> for FrontmatterMap {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// An owned SQL value projected from a document into a user column.
/// Mirrors the SQLite storage classes without depending on the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Everything the store knows about a document when reconstructing it
/// from a file and its index row.
#[derive(Debug, Clone)]
pub struct DocumentParts {
    pub id: String,
    pub short_id: String,
    pub rel_path: String,
    pub title: String,
    /// User fields only; reserved keys are stripped.
    pub frontmatter: FrontmatterMap,
    pub body: String,
    pub mtime_ns: i64,
    pub size_bytes: i64,
}

/// The capability set the store needs from a user document type:
/// readable `{id, title, frontmatter, body}` for writes, constructible
/// from parts for reads, and a projection into declared user columns.
pub trait Document: Send + Sync + Sized {
    fn id(&self) -> &str;

    fn title(&self) -> &str;

    /// User frontmatter fields. Must not contain reserved keys.
    fn frontmatter(&self) -> &FrontmatterMap;

    fn body(&self) -> &str;

    /// Rebuild a document from a parsed file and its derived metadata.
    fn from_parts(parts: DocumentParts) -> Result<Self, StoreError>;

    /// Values for the user columns declared in the schema, in
    /// declaration order. Required whenever the schema has user
    /// columns; the default suits the base-only schema.
    fn column_values(&self) -> Vec<SqlValue> {
        Vec::new()
    }
}

/// A summary row as stored in the index, without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub short_id: String,
    pub path: String,
    pub mtime_ns: i64,
    pub size_bytes: i64,
    pub title: String,
}
