//! The streaming parser. Single pass over the input bytes, line by
//! line; every slice handed out borrows from the input buffer.

use std::borrow::Cow;

use mddb_core::config::ParseOptions;
use mddb_core::errors::ParseError;

use crate::value::{Frontmatter, Value};

/// Result of a parse: the frontmatter entries and the tail (body).
#[derive(Debug)]
pub struct Parsed<'a> {
    pub frontmatter: Frontmatter<'a>,
    /// Bytes after the closing fence, with a single leading blank line
    /// trimmed when the options ask for it. CRLF is honoured.
    pub tail: &'a [u8],
}

/// Parse frontmatter from `input`.
///
/// With `require_delimiter` unset, an input that does not open with a
/// `---` fence parses as empty frontmatter with the whole input as
/// tail.
pub fn parse<'a>(input: &'a [u8], opts: &ParseOptions) -> Result<Parsed<'a>, ParseError> {
    Parser::new(input, opts).run()
}

struct Lines<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lines<'a> {
    fn peek(&self) -> Option<&'a [u8]> {
        if self.pos >= self.input.len() {
            return None;
        }
        let rest = &self.input[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        Some(&rest[..end])
    }

    fn advance(&mut self) {
        let rest = &self.input[self.pos..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(n) => self.pos += n + 1,
            None => self.pos = self.input.len(),
        }
    }

    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }
}

struct Parser<'a, 'o> {
    lines: Lines<'a>,
    line_no: usize,
    fm_lines: usize,
    opts: &'o ParseOptions,
}

impl<'a, 'o> Parser<'a, 'o> {
    fn new(input: &'a [u8], opts: &'o ParseOptions) -> Self {
        Self {
            lines: Lines { input, pos: 0 },
            line_no: 0,
            fm_lines: 0,
            opts,
        }
    }

    fn advance(&mut self) {
        self.lines.advance();
        self.line_no += 1;
    }

    fn count_fm_line(&mut self) -> Result<(), ParseError> {
        self.fm_lines += 1;
        if self.opts.line_limit > 0 && self.fm_lines > self.opts.line_limit {
            return Err(ParseError::LineLimit {
                limit: self.opts.line_limit,
            });
        }
        Ok(())
    }

    fn run(mut self) -> Result<Parsed<'a>, ParseError> {
        match self.lines.peek() {
            Some(b"---") => self.advance(),
            _ => {
                if self.opts.require_delimiter {
                    return Err(ParseError::MissingDelimiter { line: 1 });
                }
                return Ok(Parsed {
                    frontmatter: Frontmatter::default(),
                    tail: self.lines.rest(),
                });
            }
        }

        let mut entries: Vec<(&'a str, Value<'a>)> = Vec::new();
        let mut closed = false;
        while let Some(raw) = self.lines.peek() {
            if raw == b"---" {
                self.advance();
                closed = true;
                break;
            }
            self.advance();
            self.count_fm_line()?;
            let ln = self.line_no;
            let s = as_utf8(raw, ln)?;
            if s.starts_with('\t') {
                return Err(ParseError::TabIndent { line: ln });
            }
            if s.starts_with(' ') {
                return Err(ParseError::BadIndent { line: ln });
            }
            check_trailing(s, ln)?;
            let colon = s
                .find(':')
                .ok_or(ParseError::MissingColon { line: ln })?;
            let key = &s[..colon];
            validate_key(key, ln)?;
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(ParseError::DuplicateKey {
                    line: ln,
                    key: key.to_string(),
                });
            }
            let rest = &s[colon + 1..];
            let value = if rest.is_empty() {
                self.parse_block(ln)?
            } else {
                if !rest.starts_with(' ') || rest.len() < 2 || rest.as_bytes()[1] == b' ' {
                    return Err(ParseError::NoSpaceAfterColon { line: ln });
                }
                self.parse_inline(&rest[1..], ln)?
            };
            entries.push((key, value));
        }

        let mut tail = self.lines.rest();
        if closed && self.opts.trim_leading_blank {
            if let Some(rest) = tail.strip_prefix(b"\r\n".as_slice()) {
                tail = rest;
            } else if let Some(rest) = tail.strip_prefix(b"\n".as_slice()) {
                tail = rest;
            }
        }
        Ok(Parsed {
            frontmatter: Frontmatter { entries },
            tail,
        })
    }

    /// A block value: the two-space-indented lines after a bare `key:`.
    fn parse_block(&mut self, key_line: usize) -> Result<Value<'a>, ParseError> {
        let mut is_list: Option<bool> = None;
        let mut list: Vec<Value<'a>> = Vec::new();
        let mut object: Vec<(&'a str, Value<'a>)> = Vec::new();

        while let Some(raw) = self.lines.peek() {
            if raw.starts_with(b"\t") {
                return Err(ParseError::TabIndent {
                    line: self.line_no + 1,
                });
            }
            if !raw.starts_with(b"  ") {
                if raw.starts_with(b" ") {
                    return Err(ParseError::BadIndent {
                        line: self.line_no + 1,
                    });
                }
                break;
            }
            self.advance();
            self.count_fm_line()?;
            let ln = self.line_no;
            let s = as_utf8(raw, ln)?;
            check_trailing(s, ln)?;
            let body = &s[2..];
            if body.starts_with(' ') || body.starts_with('\t') {
                return Err(ParseError::BadIndent { line: ln });
            }
            if body == "-" {
                return Err(ParseError::MissingValue { line: ln });
            }
            if let Some(item) = body.strip_prefix("- ") {
                if is_list == Some(false) {
                    return Err(ParseError::BadIndent { line: ln });
                }
                is_list = Some(true);
                list.push(self.parse_scalar(item, ln)?);
            } else {
                if is_list == Some(true) {
                    return Err(ParseError::BadIndent { line: ln });
                }
                is_list = Some(false);
                let colon = body
                    .find(':')
                    .ok_or(ParseError::MissingColon { line: ln })?;
                let key = &body[..colon];
                validate_key(key, ln)?;
                if object.iter().any(|(k, _)| *k == key) {
                    return Err(ParseError::DuplicateKey {
                        line: ln,
                        key: key.to_string(),
                    });
                }
                let rest = &body[colon + 1..];
                if rest.is_empty() {
                    return Err(ParseError::MissingValue { line: ln });
                }
                if !rest.starts_with(' ') || rest.len() < 2 || rest.as_bytes()[1] == b' ' {
                    return Err(ParseError::NoSpaceAfterColon { line: ln });
                }
                object.push((key, self.parse_scalar(&rest[1..], ln)?));
            }
        }

        match is_list {
            None => Err(ParseError::MissingValue { line: key_line }),
            Some(true) => Ok(Value::List(list)),
            Some(false) => Ok(Value::Object(object)),
        }
    }

    /// A top-level value: scalar or inline list.
    fn parse_inline(&self, v: &'a str, ln: usize) -> Result<Value<'a>, ParseError> {
        let first = v.chars().next().expect("inline value is non-empty");
        match first {
            '[' => self.parse_inline_list(v, ln),
            _ => self.parse_scalar_inner(v, ln, first),
        }
    }

    /// A scalar in a position where lists and objects are not allowed:
    /// block list items, block object values, inline list elements.
    fn parse_scalar(&self, v: &'a str, ln: usize) -> Result<Value<'a>, ParseError> {
        let first = v.chars().next().expect("scalar is non-empty");
        if first == '[' {
            return Err(ParseError::UnsupportedPrefix {
                line: ln,
                prefix: '[',
            });
        }
        self.parse_scalar_inner(v, ln, first)
    }

    fn parse_scalar_inner(
        &self,
        v: &'a str,
        ln: usize,
        first: char,
    ) -> Result<Value<'a>, ParseError> {
        match first {
            '"' => {
                let (s, used) = parse_double_quoted(v, ln)?;
                if used != v.len() {
                    return Err(ParseError::TrailingChars { line: ln });
                }
                Ok(Value::Str(s))
            }
            '\'' => {
                let (s, used) = parse_single_quoted(v, ln)?;
                if used != v.len() {
                    return Err(ParseError::TrailingChars { line: ln });
                }
                Ok(Value::Str(Cow::Borrowed(s)))
            }
            '{' | '|' | '>' | '&' | '*' | '!' | '%' | '@' | '`' => {
                Err(ParseError::UnsupportedPrefix {
                    line: ln,
                    prefix: first,
                })
            }
            _ => {
                if v.contains('#') {
                    return Err(ParseError::UnquotedHash { line: ln });
                }
                Ok(classify(v))
            }
        }
    }

    fn parse_inline_list(&self, v: &'a str, ln: usize) -> Result<Value<'a>, ParseError> {
        if !v.ends_with(']') {
            return Err(ParseError::MalformedList { line: ln });
        }
        if v == "[]" {
            return Ok(Value::List(Vec::new()));
        }
        let mut items: Vec<Value<'a>> = Vec::new();
        let mut i = 1usize;
        loop {
            let rest = &v[i..];
            let first = rest
                .chars()
                .next()
                .ok_or(ParseError::MalformedList { line: ln })?;
            let used = match first {
                '"' => {
                    let (s, used) = parse_double_quoted(rest, ln)?;
                    items.push(Value::Str(s));
                    used
                }
                '\'' => {
                    let (s, used) = parse_single_quoted(rest, ln)?;
                    items.push(Value::Str(Cow::Borrowed(s)));
                    used
                }
                '[' | '{' | '|' | '>' | '&' | '*' | '!' | '%' | '@' | '`' => {
                    return Err(ParseError::UnsupportedPrefix {
                        line: ln,
                        prefix: first,
                    })
                }
                _ => {
                    let end = rest
                        .find([',', ']'])
                        .ok_or(ParseError::MalformedList { line: ln })?;
                    let tok = &rest[..end];
                    if tok.is_empty() || tok.starts_with(' ') || tok.ends_with(' ') {
                        return Err(ParseError::MalformedList { line: ln });
                    }
                    if tok.contains('#') {
                        return Err(ParseError::UnquotedHash { line: ln });
                    }
                    items.push(classify(tok));
                    end
                }
            };
            i += used;
            let after = &v[i..];
            if after == "]" {
                return Ok(Value::List(items));
            }
            match after.strip_prefix(", ") {
                Some(_) => i += 2,
                None => return Err(ParseError::MalformedList { line: ln }),
            }
        }
    }
}

fn as_utf8(raw: &[u8], line: usize) -> Result<&str, ParseError> {
    std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8 { line })
}

fn check_trailing(s: &str, line: usize) -> Result<(), ParseError> {
    if s.ends_with(' ') || s.ends_with('\t') || s.ends_with('\r') {
        return Err(ParseError::TrailingWhitespace { line });
    }
    Ok(())
}

fn validate_key(key: &str, line: usize) -> Result<(), ParseError> {
    if key.is_empty() {
        return Err(ParseError::EmptyKey { line });
    }
    if key.chars().any(|c| c.is_whitespace()) || key.contains('#') {
        return Err(ParseError::InvalidKey {
            line,
            key: key.to_string(),
        });
    }
    Ok(())
}

/// True for tokens the parser reads back as an integer. Shared with
/// the serialiser so bare-string decisions agree with parse behaviour.
pub(crate) fn is_int_token(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && s.parse::<i64>().is_ok()
}

fn classify(tok: &str) -> Value<'_> {
    match tok {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if is_int_token(tok) {
                if let Ok(n) = tok.parse::<i64>() {
                    return Value::Int(n);
                }
            }
            Value::Str(Cow::Borrowed(tok))
        }
    }
}

/// Double-quoted string with Go-style escapes. Returns the decoded
/// value and the number of bytes consumed including both quotes.
/// Borrows when the source contains no escapes.
fn parse_double_quoted(v: &str, ln: usize) -> Result<(Cow<'_, str>, usize), ParseError> {
    debug_assert!(v.starts_with('"'));
    let mut owned: Option<String> = None;
    let mut run_start = 1usize;
    let mut i = 1usize;
    while i < v.len() {
        let c = v[i..].chars().next().expect("in-bounds char");
        match c {
            '"' => {
                let cow = match owned {
                    Some(mut s) => {
                        s.push_str(&v[run_start..i]);
                        Cow::Owned(s)
                    }
                    None => Cow::Borrowed(&v[1..i]),
                };
                return Ok((cow, i + 1));
            }
            '\\' => {
                let mut s = owned.take().unwrap_or_default();
                s.push_str(&v[run_start..i]);
                let (decoded, used) = decode_escape(&v[i..], ln)?;
                s.push(decoded);
                owned = Some(s);
                i += used;
                run_start = i;
            }
            _ => i += c.len_utf8(),
        }
    }
    Err(ParseError::UnterminatedQuote { line: ln })
}

fn decode_escape(v: &str, ln: usize) -> Result<(char, usize), ParseError> {
    let mut chars = v.chars();
    chars.next();
    let c = chars
        .next()
        .ok_or(ParseError::UnterminatedQuote { line: ln })?;
    let simple = |ch: char| Ok((ch, 2));
    match c {
        'a' => simple('\x07'),
        'b' => simple('\x08'),
        'f' => simple('\x0c'),
        'n' => simple('\n'),
        'r' => simple('\r'),
        't' => simple('\t'),
        'v' => simple('\x0b'),
        '\\' => simple('\\'),
        '"' => simple('"'),
        '\'' => simple('\''),
        'x' => decode_hex(v, 2, ln),
        'u' => decode_hex(v, 4, ln),
        'U' => decode_hex(v, 8, ln),
        _ => Err(ParseError::BadEscape { line: ln }),
    }
}

fn decode_hex(v: &str, width: usize, ln: usize) -> Result<(char, usize), ParseError> {
    let digits = v
        .get(2..2 + width)
        .ok_or(ParseError::BadEscape { line: ln })?;
    let n = u32::from_str_radix(digits, 16).map_err(|_| ParseError::BadEscape { line: ln })?;
    let c = char::from_u32(n).ok_or(ParseError::BadEscape { line: ln })?;
    Ok((c, 2 + width))
}

/// Single-quoted string: no escapes, content runs to the next quote.
fn parse_single_quoted(v: &str, ln: usize) -> Result<(&str, usize), ParseError> {
    debug_assert!(v.starts_with('\''));
    match v[1..].find('\'') {
        Some(n) => Ok((&v[1..1 + n], n + 2)),
        None => Err(ParseError::UnterminatedQuote { line: ln }),
    }
}
