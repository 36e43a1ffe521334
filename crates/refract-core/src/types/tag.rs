//! Struct tag parsing
//!
//! Tags use the wire format
//!
//! ```text
//! key:"name,option1,option2" key2:"value2"
//! ```
//!
//! i.e. space-separated `key:"quoted value"` pairs. Quoted values use the
//! hosted language's string-literal escapes. A malformed tag fails the whole
//! parse; looking up an absent key is not an error.

use crate::{ReflectError, ReflectResult};
use std::fmt;

/// A raw struct tag string with lookup helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StructTag<'a>(pub &'a str);

impl<'a> StructTag<'a> {
    /// Value associated with `key`, or `None` if the key is absent
    ///
    /// The whole tag is validated, so a syntax error anywhere fails the
    /// lookup even if `key` appears before the error.
    pub fn get(&self, key: &str) -> ReflectResult<Option<String>> {
        let mut found = None;
        for pair in Pairs::new(self.0) {
            let (k, v) = pair?;
            if found.is_none() && k == key {
                found = Some(v);
            }
        }
        Ok(found)
    }

    /// Parse into the structured [`Tags`] form
    pub fn parse(&self) -> ReflectResult<Tags> {
        Tags::parse(self.0)
    }
}

/// One `key:"name,options"` entry of a struct tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Tag key, e.g. `json`
    pub key: String,

    /// First comma-separated element of the value
    pub name: String,

    /// Remaining comma-separated elements of the value
    pub options: Vec<String>,
}

impl Tag {
    /// Create a tag entry
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            options: Vec::new(),
        }
    }

    /// Append an option
    pub fn with_option(mut self, opt: impl Into<String>) -> Self {
        self.options.push(opt.into());
        self
    }

    /// Whether `opt` is among the options
    pub fn has_option(&self, opt: &str) -> bool {
        self.options.iter().any(|o| o == opt)
    }

    /// The unquoted value: name followed by the options
    pub fn value(&self) -> String {
        let mut value = self.name.clone();
        for opt in &self.options {
            value.push(',');
            value.push_str(opt);
        }
        value
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, quote(&self.value()))
    }
}

/// A parsed struct tag
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tags {
    tags: Vec<Tag>,
}

impl Tags {
    /// Parse a tag string
    pub fn parse(tag: &str) -> ReflectResult<Self> {
        let mut tags = Vec::new();
        for pair in Pairs::new(tag) {
            let (key, value) = pair?;
            let mut parts = value.split(',');
            let name = parts.next().unwrap_or("").to_string();
            let options = parts.map(str::to_string).collect();
            tags.push(Tag { key, name, options });
        }
        Ok(Self { tags })
    }

    /// First entry with the given key
    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.key == key)
    }

    /// All entries in source order
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Keys in source order
    pub fn keys(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.key.as_str()).collect()
    }

    /// Replace the entry with the same key, or append
    pub fn set(&mut self, tag: Tag) {
        match self.tags.iter_mut().find(|t| t.key == tag.key) {
            Some(existing) => *existing = tag,
            None => self.tags.push(tag),
        }
    }

    /// Remove every entry with the given key
    pub fn delete(&mut self, key: &str) {
        self.tags.retain(|t| t.key != key);
    }

    /// Sort entries by key
    pub fn sort(&mut self) {
        self.tags.sort_by(|a, b| a.key.cmp(&b.key));
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", tag)?;
        }
        Ok(())
    }
}

// ============================================================================
// Pair scanner
// ============================================================================

/// Iterator over `(key, unquoted value)` pairs
struct Pairs<'a> {
    src: &'a str,
    pos: usize,
    failed: bool,
}

impl<'a> Pairs<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            failed: false,
        }
    }

    fn error(&mut self, pos: usize, reason: &'static str) -> Option<ReflectResult<(String, String)>> {
        self.failed = true;
        Some(Err(ReflectError::TagSyntax { pos, reason }))
    }
}

impl<'a> Iterator for Pairs<'a> {
    type Item = ReflectResult<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos] == b' ' {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }

        // key: printable, no space, colon or quote
        let key_start = self.pos;
        let mut i = key_start;
        while i < bytes.len()
            && bytes[i] > b' '
            && bytes[i] != b':'
            && bytes[i] != b'"'
            && bytes[i] != 0x7f
        {
            i += 1;
        }
        if i == key_start {
            return self.error(i, "bad syntax for struct tag key");
        }
        if i + 1 >= bytes.len() || bytes[i] != b':' {
            return self.error(i, "bad syntax for struct tag pair");
        }
        if bytes[i + 1] != b'"' {
            return self.error(i + 1, "bad syntax for struct tag value");
        }
        let key = &self.src[key_start..i];

        // quoted value, honouring backslash escapes
        let q_start = i + 1;
        let mut j = q_start + 1;
        while j < bytes.len() && bytes[j] != b'"' {
            if bytes[j] == b'\\' {
                j += 1;
            }
            j += 1;
        }
        if j >= bytes.len() {
            return self.error(q_start, "unterminated struct tag value");
        }
        let quoted = &self.src[q_start..=j];
        self.pos = j + 1;

        match unquote(quoted) {
            Ok(value) => Some(Ok((key.to_string(), value))),
            Err(_) => self.error(q_start, "bad syntax for struct tag value"),
        }
    }
}

// ============================================================================
// Literal unquoting
// ============================================================================

/// Interpret `s` as a quoted string literal (`"..."`, `'...'` or `` `...` ``)
///
/// Byte escapes that do not form valid UTF-8 are accepted; each invalid
/// sequence decodes to U+FFFD.
pub fn unquote(s: &str) -> ReflectResult<String> {
    let syntax = |reason| ReflectError::TagSyntax { pos: 0, reason };
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return Err(syntax("literal too short"));
    }
    let quote = bytes[0];
    if bytes[bytes.len() - 1] != quote {
        return Err(syntax("mismatched quotes"));
    }
    let body = &s[1..s.len() - 1];

    if quote == b'`' {
        if body.contains('`') {
            return Err(syntax("backquote inside raw literal"));
        }
        return Ok(body.replace('\r', ""));
    }
    if quote != b'"' && quote != b'\'' {
        return Err(syntax("not a quoted literal"));
    }
    if body.contains('\n') {
        return Err(syntax("newline in literal"));
    }

    let mut out = Vec::with_capacity(body.len());
    let mut rest = body;
    while !rest.is_empty() {
        let (ch, tail) = unquote_char(rest, quote).map_err(syntax)?;
        match ch {
            Unquoted::Byte(b) => out.push(b),
            Unquoted::Char(c) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
        rest = tail;
        if quote == b'\'' && !rest.is_empty() {
            return Err(syntax("multiple characters in rune literal"));
        }
    }
    Ok(match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

enum Unquoted {
    Byte(u8),
    Char(char),
}

/// Decode the first character of an escaped literal body
fn unquote_char(s: &str, quote: u8) -> Result<(Unquoted, &str), &'static str> {
    let bytes = s.as_bytes();
    let c = bytes[0];
    if c == quote {
        return Err("unescaped quote");
    }
    if c != b'\\' {
        let ch = s.chars().next().ok_or("empty literal")?;
        return Ok((Unquoted::Char(ch), &s[ch.len_utf8()..]));
    }
    if bytes.len() < 2 {
        return Err("trailing backslash");
    }

    let esc = bytes[1];
    let rest = &s[2..];
    let simple = |b: u8| Ok((Unquoted::Byte(b), rest));
    match esc {
        b'a' => simple(0x07),
        b'b' => simple(0x08),
        b'f' => simple(0x0c),
        b'n' => simple(b'\n'),
        b'r' => simple(b'\r'),
        b't' => simple(b'\t'),
        b'v' => simple(0x0b),
        b'\\' => simple(b'\\'),
        b'\'' | b'"' if esc == quote => simple(esc),
        b'x' | b'u' | b'U' => {
            let n = match esc {
                b'x' => 2,
                b'u' => 4,
                _ => 8,
            };
            let digits = rest.get(..n).ok_or("short hex escape")?;
            let v = u32::from_str_radix(digits, 16).map_err(|_| "bad hex escape")?;
            if !digits.bytes().all(|d| d.is_ascii_hexdigit()) {
                return Err("bad hex escape");
            }
            let tail = &rest[n..];
            if esc == b'x' {
                return Ok((Unquoted::Byte(v as u8), tail));
            }
            let ch = char::from_u32(v).ok_or("escape is not a valid code point")?;
            Ok((Unquoted::Char(ch), tail))
        }
        b'0'..=b'7' => {
            let digits = s.get(1..4).ok_or("short octal escape")?;
            let mut v = 0u32;
            for d in digits.bytes() {
                if !(b'0'..=b'7').contains(&d) {
                    return Err("bad octal escape");
                }
                v = (v << 3) | u32::from(d - b'0');
            }
            if v > 255 {
                return Err("octal escape out of range");
            }
            Ok((Unquoted::Byte(v as u8), &s[4..]))
        }
        _ => Err("unknown escape sequence"),
    }
}

/// Render `s` as a double-quoted literal
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
