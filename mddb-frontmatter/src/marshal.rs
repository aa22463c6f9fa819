//! Deterministic serialisation of a frontmatter map, fences included.
//!
//! Output always reparses to the same values: strings are emitted bare
//! only when nothing in them can be misread as another scalar kind or
//! break the line grammar.

use mddb_core::document::{FieldValue, FrontmatterMap, RESERVED_KEYS};
use mddb_core::errors::MarshalError;

use crate::parse::is_int_token;

/// Key-order controls for [`marshal`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MarshalOptions<'a> {
    /// Keys emitted first, in the given order, when present.
    /// Remaining keys follow in ascending byte order.
    pub priority: &'a [&'a str],
    /// Explicit full order: exactly these keys, in this order. A listed
    /// key with no value is a hard error; unlisted keys are omitted.
    pub order: Option<&'a [&'a str]>,
}

/// Serialise a user frontmatter map. Reserved keys are rejected here;
/// the store injects them itself via [`marshal_raw`].
pub fn marshal(map: &FrontmatterMap, opts: &MarshalOptions) -> Result<String, MarshalError> {
    for (key, _) in map.iter() {
        if RESERVED_KEYS.contains(&key) {
            return Err(MarshalError::ReservedKey {
                key: key.to_string(),
            });
        }
    }
    marshal_raw(map, opts)
}

/// Serialise without the reserved-key check. Used by the store after
/// it has injected `id`, `schema_version` and `title` into the map.
pub fn marshal_raw(map: &FrontmatterMap, opts: &MarshalOptions) -> Result<String, MarshalError> {
    let keys = ordered_keys(map, opts)?;
    let mut out = String::from("---\n");
    for key in keys {
        validate_key(key)?;
        let value = map.get(key).ok_or_else(|| MarshalError::MissingOrderedKey {
            key: key.to_string(),
        })?;
        out.push_str(key);
        out.push(':');
        write_value(&mut out, key, value)?;
        out.push('\n');
    }
    out.push_str("---\n");
    Ok(out)
}

fn ordered_keys<'m>(
    map: &'m FrontmatterMap,
    opts: &MarshalOptions<'_>,
) -> Result<Vec<&'m str>, MarshalError> {
    if let Some(order) = opts.order {
        let mut keys: Vec<&'m str> = Vec::with_capacity(order.len());
        for &key in order {
            let (stored, _) = map
                .iter()
                .find(|(k, _)| *k == key)
                .ok_or_else(|| MarshalError::MissingOrderedKey {
                    key: key.to_string(),
                })?;
            if keys.contains(&stored) {
                return Err(MarshalError::DuplicateOrderKey {
                    key: key.to_string(),
                });
            }
            keys.push(stored);
        }
        return Ok(keys);
    }

    let mut keys: Vec<&'m str> = Vec::with_capacity(map.len());
    for &key in opts.priority {
        if let Some((stored, _)) = map.iter().find(|(k, _)| *k == key) {
            if !keys.contains(&stored) {
                keys.push(stored);
            }
        }
    }
    let mut rest: Vec<&'m str> = map
        .iter()
        .map(|(k, _)| k)
        .filter(|k| !keys.contains(k))
        .collect();
    rest.sort_unstable();
    keys.extend(rest);
    Ok(keys)
}

fn write_value(out: &mut String, key: &str, value: &FieldValue) -> Result<(), MarshalError> {
    match value {
        FieldValue::Str(s) => {
            out.push(' ');
            write_scalar_str(out, s, false);
        }
        FieldValue::Int(n) => {
            out.push(' ');
            out.push_str(&n.to_string());
        }
        FieldValue::Bool(b) => {
            out.push(' ');
            out.push_str(if *b { "true" } else { "false" });
        }
        FieldValue::List(items) => {
            out.push(' ');
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_list_scalar(out, key, item)?;
            }
            out.push(']');
        }
        FieldValue::Object(entries) => {
            if entries.is_empty() {
                return Err(MarshalError::EmptyObject {
                    key: key.to_string(),
                });
            }
            let mut sorted: Vec<&(String, FieldValue)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (i, entry) in sorted.iter().enumerate() {
                let (k, v) = (&entry.0, &entry.1);
                validate_key(k)?;
                if i > 0 && sorted[i - 1].0 == *k {
                    return Err(MarshalError::InvalidKey { key: k.to_string() });
                }
                out.push('\n');
                out.push_str("  ");
                out.push_str(k);
                out.push(':');
                out.push(' ');
                write_object_scalar(out, key, v)?;
            }
        }
    }
    Ok(())
}

fn write_list_scalar(out: &mut String, key: &str, value: &FieldValue) -> Result<(), MarshalError> {
    match value {
        FieldValue::Str(s) => {
            write_scalar_str(out, s, true);
            Ok(())
        }
        FieldValue::Int(n) => {
            out.push_str(&n.to_string());
            Ok(())
        }
        FieldValue::Bool(b) => {
            out.push_str(if *b { "true" } else { "false" });
            Ok(())
        }
        FieldValue::List(_) | FieldValue::Object(_) => Err(MarshalError::UnsupportedNesting {
            key: key.to_string(),
        }),
    }
}

fn write_object_scalar(
    out: &mut String,
    key: &str,
    value: &FieldValue,
) -> Result<(), MarshalError> {
    match value {
        FieldValue::Str(s) => {
            write_scalar_str(out, s, false);
            Ok(())
        }
        FieldValue::Int(n) => {
            out.push_str(&n.to_string());
            Ok(())
        }
        FieldValue::Bool(b) => {
            out.push_str(if *b { "true" } else { "false" });
            Ok(())
        }
        FieldValue::List(_) | FieldValue::Object(_) => Err(MarshalError::UnsupportedNesting {
            key: key.to_string(),
        }),
    }
}

fn validate_key(key: &str) -> Result<(), MarshalError> {
    if key.is_empty() {
        return Err(MarshalError::EmptyKey);
    }
    if key.chars().any(|c| c.is_whitespace()) || key.contains(':') || key.contains('#') {
        return Err(MarshalError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn write_scalar_str(out: &mut String, s: &str, in_list: bool) {
    if bare_safe(s, in_list) {
        out.push_str(s);
    } else {
        quote_into(out, s);
    }
}

/// A string is emitted bare only when reparsing it yields the same
/// string: no edge whitespace, no control characters, no `#`, no
/// quote or sentinel prefix, not readable as an int or bool, and in
/// list position no separator characters.
fn bare_safe(s: &str, in_list: bool) -> bool {
    if s.is_empty() || s != s.trim() {
        return false;
    }
    if s.chars().any(|c| c.is_control()) {
        return false;
    }
    if s.contains('#') {
        return false;
    }
    if in_list && (s.contains(',') || s.contains(']')) {
        return false;
    }
    let first = s.chars().next().expect("non-empty");
    if matches!(
        first,
        '[' | '{' | '|' | '>' | '&' | '*' | '!' | '%' | '@' | '`' | '\'' | '"'
    ) {
        return false;
    }
    if s == "true" || s == "false" || is_int_token(s) {
        return false;
    }
    true
}

/// Double-quote with the escape set the parser decodes.
fn quote_into(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
