//! Parser and serialiser behaviour: grammar acceptance, hard errors
//! with line numbers, deterministic output, and the fixed-point
//! property over the supported subset.

use std::borrow::Cow;

use mddb_core::document::{FieldValue, FrontmatterMap};
use mddb_frontmatter::{marshal, marshal_raw, parse, MarshalOptions, ParseError, ParseOptions};
use mddb_frontmatter::Value;

fn opts() -> ParseOptions {
    ParseOptions::default()
}

fn parse_ok(input: &str) -> (Vec<(String, FieldValue)>, Vec<u8>) {
    let parsed = parse(input.as_bytes(), &opts()).expect("parse should succeed");
    let entries = parsed
        .frontmatter
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_owned_value()))
        .collect();
    (entries, parsed.tail.to_vec())
}

fn parse_err(input: &str) -> ParseError {
    parse(input.as_bytes(), &opts()).expect_err("parse should fail")
}

// ───────────────────────────────────────────────────────────────────
// Parsing
// ───────────────────────────────────────────────────────────────────

#[test]
fn parses_scalar_kinds() {
    let (entries, tail) = parse_ok(
        "---\n\
         name: milk run\n\
         count: -42\n\
         done: true\n\
         quoted: \"a: b\"\n\
         single: 'x y'\n\
         ---\n\
         body\n",
    );
    assert_eq!(entries[0], ("name".into(), FieldValue::Str("milk run".into())));
    assert_eq!(entries[1], ("count".into(), FieldValue::Int(-42)));
    assert_eq!(entries[2], ("done".into(), FieldValue::Bool(true)));
    assert_eq!(entries[3], ("quoted".into(), FieldValue::Str("a: b".into())));
    assert_eq!(entries[4], ("single".into(), FieldValue::Str("x y".into())));
    assert_eq!(tail, b"body\n");
}

#[test]
fn parses_inline_and_block_lists() {
    let (entries, _) = parse_ok(
        "---\n\
         tags: [a, b, \"c, d\"]\n\
         empty: []\n\
         block:\n\
         \x20\x20- one\n\
         \x20\x20- 2\n\
         ---\n",
    );
    assert_eq!(
        entries[0].1,
        FieldValue::List(vec![
            FieldValue::Str("a".into()),
            FieldValue::Str("b".into()),
            FieldValue::Str("c, d".into()),
        ])
    );
    assert_eq!(entries[1].1, FieldValue::List(vec![]));
    assert_eq!(
        entries[2].1,
        FieldValue::List(vec![FieldValue::Str("one".into()), FieldValue::Int(2)])
    );
}

#[test]
fn parses_block_object() {
    let (entries, _) = parse_ok(
        "---\n\
         meta:\n\
         \x20\x20author: jo\n\
         \x20\x20year: 2024\n\
         ---\n",
    );
    assert_eq!(
        entries[0].1,
        FieldValue::Object(vec![
            ("author".into(), FieldValue::Str("jo".into())),
            ("year".into(), FieldValue::Int(2024)),
        ])
    );
}

#[test]
fn borrowed_strings_point_into_the_input() {
    let input = b"---\ntitle: plain\n---\n".to_vec();
    let parsed = parse(&input, &opts()).unwrap();
    match parsed.frontmatter.get("title") {
        Some(Value::Str(Cow::Borrowed(s))) => assert_eq!(*s, "plain"),
        other => panic!("expected borrowed string, got {other:?}"),
    }
}

#[test]
fn escaped_strings_are_owned_and_decoded() {
    let input = b"---\nt: \"a\\nb\\u0041\"\n---\n".to_vec();
    let parsed = parse(&input, &opts()).unwrap();
    match parsed.frontmatter.get("t") {
        Some(Value::Str(Cow::Owned(s))) => assert_eq!(s, "a\nbA"),
        other => panic!("expected owned string, got {other:?}"),
    }
}

#[test]
fn tail_honours_crlf_and_blank_trim() {
    let parsed = parse(b"---\na: b\n---\n\r\nbody\r\n", &opts()).unwrap();
    assert_eq!(parsed.tail, b"body\r\n");

    let parsed = parse(b"---\na: b\n---\n\nbody\n", &opts()).unwrap();
    assert_eq!(parsed.tail, b"body\n");

    let no_trim = ParseOptions {
        trim_leading_blank: false,
        ..opts()
    };
    let parsed = parse(b"---\na: b\n---\n\nbody\n", &no_trim).unwrap();
    assert_eq!(parsed.tail, b"\nbody\n");
}

#[test]
fn missing_fence_behaviour() {
    assert!(matches!(
        parse_err("a: b\n"),
        ParseError::MissingDelimiter { line: 1 }
    ));

    let lax = ParseOptions {
        require_delimiter: false,
        ..opts()
    };
    let parsed = parse(b"just a body\n", &lax).unwrap();
    assert!(parsed.frontmatter.is_empty());
    assert_eq!(parsed.tail, b"just a body\n");
}

#[test]
fn missing_closing_fence_means_empty_tail() {
    let parsed = parse(b"---\na: b\n", &opts()).unwrap();
    assert_eq!(parsed.frontmatter.len(), 1);
    assert_eq!(parsed.tail, b"");
}

#[test]
fn hard_errors_carry_line_numbers() {
    assert!(matches!(
        parse_err("---\n: v\n---\n"),
        ParseError::EmptyKey { line: 2 }
    ));
    assert!(matches!(
        parse_err("---\na: 1\na: 2\n---\n"),
        ParseError::DuplicateKey { line: 3, .. }
    ));
    assert!(matches!(
        parse_err("---\na: 1\n\tb: 2\n---\n"),
        ParseError::TabIndent { line: 3 }
    ));
    assert!(matches!(
        parse_err("---\na: 1 \n---\n"),
        ParseError::TrailingWhitespace { line: 2 }
    ));
    assert!(matches!(
        parse_err("---\na: \"oops\n---\n"),
        ParseError::UnterminatedQuote { line: 2 }
    ));
    assert!(matches!(
        parse_err("---\na: {b: c}\n---\n"),
        ParseError::UnsupportedPrefix { line: 2, prefix: '{' }
    ));
    assert!(matches!(
        parse_err("---\na: v # comment\n---\n"),
        ParseError::UnquotedHash { line: 2 }
    ));
    assert!(matches!(
        parse_err("---\na:b\n---\n"),
        ParseError::NoSpaceAfterColon { line: 2 }
    ));
    assert!(matches!(
        parse_err("---\nbad key: v\n---\n"),
        ParseError::InvalidKey { line: 2, .. }
    ));
    assert!(matches!(
        parse_err("---\nlist:\n\x20\x20\x20\x20- deep\n---\n"),
        ParseError::BadIndent { line: 3 }
    ));
    assert!(matches!(
        parse_err("---\nempty:\nnext: 1\n---\n"),
        ParseError::MissingValue { line: 2 }
    ));
}

#[test]
fn line_limit_bounds_malformed_inputs() {
    let limited = ParseOptions {
        line_limit: 2,
        ..opts()
    };
    let input = "---\na: 1\nb: 2\nc: 3\n---\n";
    assert!(matches!(
        parse(input.as_bytes(), &limited),
        Err(ParseError::LineLimit { limit: 2 })
    ));

    let unlimited = ParseOptions {
        line_limit: 0,
        ..opts()
    };
    parse(input.as_bytes(), &unlimited).unwrap();
}

// ───────────────────────────────────────────────────────────────────
// Marshalling
// ───────────────────────────────────────────────────────────────────

#[test]
fn default_order_is_ascending_bytes() {
    let mut map = FrontmatterMap::new();
    map.insert("zeta", "z");
    map.insert("alpha", "a");
    let out = marshal(&map, &MarshalOptions::default()).unwrap();
    assert_eq!(out, "---\nalpha: a\nzeta: z\n---\n");
}

#[test]
fn priority_keys_come_first() {
    let mut map = FrontmatterMap::new();
    map.insert("b", 1i64);
    map.insert("a", 2i64);
    map.insert("z", 3i64);
    let o = MarshalOptions {
        priority: &["z", "missing"],
        order: None,
    };
    let out = marshal(&map, &o).unwrap();
    assert_eq!(out, "---\nz: 3\na: 2\nb: 1\n---\n");
}

#[test]
fn explicit_order_omits_and_errors() {
    let mut map = FrontmatterMap::new();
    map.insert("a", 1i64);
    map.insert("b", 2i64);
    let o = MarshalOptions {
        priority: &[],
        order: Some(&["b"]),
    };
    assert_eq!(marshal(&map, &o).unwrap(), "---\nb: 2\n---\n");

    let o = MarshalOptions {
        priority: &[],
        order: Some(&["b", "gone"]),
    };
    assert!(marshal(&map, &o).is_err());
}

#[test]
fn strings_quote_only_when_needed() {
    let mut map = FrontmatterMap::new();
    map.insert("plain", "hello world");
    map.insert("int_like", "42");
    map.insert("bool_like", "true");
    map.insert("edge_space", " x");
    map.insert("hash", "a#b");
    map.insert("newline", "a\nb");
    map.insert("empty", "");
    let out = marshal(&map, &MarshalOptions::default()).unwrap();
    assert!(out.contains("plain: hello world\n"));
    assert!(out.contains("int_like: \"42\"\n"));
    assert!(out.contains("bool_like: \"true\"\n"));
    assert!(out.contains("edge_space: \" x\"\n"));
    assert!(out.contains("hash: \"a#b\"\n"));
    assert!(out.contains("newline: \"a\\nb\"\n"));
    assert!(out.contains("empty: \"\"\n"));
}

#[test]
fn lists_and_objects_render() {
    let mut map = FrontmatterMap::new();
    map.insert(
        "tags",
        FieldValue::List(vec![
            FieldValue::Str("a".into()),
            FieldValue::Str("b, c".into()),
            FieldValue::Int(7),
        ]),
    );
    map.insert("none", FieldValue::List(vec![]));
    map.insert(
        "meta",
        FieldValue::Object(vec![
            ("b".into(), FieldValue::Int(2)),
            ("a".into(), FieldValue::Str("x".into())),
        ]),
    );
    let out = marshal(&map, &MarshalOptions::default()).unwrap();
    assert!(out.contains("tags: [a, \"b, c\", 7]\n"));
    assert!(out.contains("none: []\n"));
    assert!(out.contains("meta:\n  a: x\n  b: 2\n"));
}

#[test]
fn empty_object_is_invalid() {
    let mut map = FrontmatterMap::new();
    map.insert("meta", FieldValue::Object(vec![]));
    assert!(marshal(&map, &MarshalOptions::default()).is_err());
}

#[test]
fn reserved_keys_are_rejected() {
    for key in ["id", "schema_version", "title"] {
        let mut map = FrontmatterMap::new();
        map.insert(key, "v");
        assert!(marshal(&map, &MarshalOptions::default()).is_err(), "{key}");
        // The raw entry point is what the store uses after injection.
        assert!(marshal_raw(&map, &MarshalOptions::default()).is_ok(), "{key}");
    }
}

// ───────────────────────────────────────────────────────────────────
// Fixed point: parse(marshal(m)) == m
// ───────────────────────────────────────────────────────────────────

fn roundtrip(map: &FrontmatterMap) {
    let text = marshal(map, &MarshalOptions::default()).unwrap();
    let parsed = parse(text.as_bytes(), &opts()).unwrap();
    let back = parsed.frontmatter.to_map();
    let mut sorted: Vec<(String, FieldValue)> =
        map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let got: Vec<(String, FieldValue)> =
        back.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    assert_eq!(got, sorted, "round trip of {text:?}");
    // And marshalling again is a fixed point.
    assert_eq!(marshal(&back, &MarshalOptions::default()).unwrap(), text);
}

#[test]
fn roundtrips_awkward_values() {
    let mut map = FrontmatterMap::new();
    map.insert("a", "");
    map.insert("b", " leading");
    map.insert("c", "trailing ");
    map.insert("d", "has \"quotes\" and \\slashes\\");
    map.insert("e", "tab\there");
    map.insert("f", i64::MIN);
    map.insert("g", i64::MAX);
    map.insert("h", "[not a list]");
    map.insert("i", "007");
    map.insert("j", "-13");
    map.insert("k", "ünïcodé ✓");
    roundtrip(&map);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn scalar() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            any::<i64>().prop_map(FieldValue::Int),
            any::<bool>().prop_map(FieldValue::Bool),
            "[ -~]{0,12}".prop_map(FieldValue::Str),
            "\\PC{0,8}".prop_map(FieldValue::Str),
        ]
    }

    fn field_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            scalar(),
            proptest::collection::vec(scalar(), 0..4).prop_map(FieldValue::List),
        ]
    }

    proptest! {
        #[test]
        fn parse_after_marshal_is_identity(
            entries in proptest::collection::btree_map("k[a-z0-9_]{0,6}", field_value(), 0..6)
        ) {
            let map: FrontmatterMap = entries
                .into_iter()
                .collect();
            roundtrip(&map);
        }
    }
}
