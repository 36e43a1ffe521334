//! Encoded name records
//!
//! Every type, field and method name is kept as a compact, self-delimiting
//! byte record:
//!
//! ```text
//! +-------+---------+-----------+ - - - - - - - - - - + - - - - - - - - - - +
//! | flags | len u16 | name ...  | tag len u16 | tag | pkg len u16 | pkg   |
//! +-------+---------+-----------+ - - - - - - - - - - + - - - - - - - - - - +
//!
//! flags: bit 0 exported, bit 1 tag follows, bit 2 package path follows
//! lengths are big-endian
//! ```
//!
//! The package path travels with the record so that unexported names from
//! different packages never compare equal.

use crate::{ReflectError, ReflectResult};
use std::fmt;
use std::ops::Range;

const FLAG_EXPORTED: u8 = 1 << 0;
const FLAG_TAG: u8 = 1 << 1;
const FLAG_PKG: u8 = 1 << 2;

/// Maximum length of any single string inside a name record
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// A decoded name record
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Name {
    bytes: Box<[u8]>,
    name: Range<usize>,
    tag: Option<Range<usize>>,
    pkg: Option<Range<usize>>,
}

impl Name {
    /// Encode a new name record
    pub fn new(name: &str, tag: &str, exported: bool, pkg_path: Option<&str>) -> ReflectResult<Self> {
        for part in [name, tag, pkg_path.unwrap_or("")] {
            if part.len() > MAX_NAME_LEN {
                return Err(ReflectError::NameTooLong(part.len()));
            }
        }

        let mut flags = 0u8;
        if exported {
            flags |= FLAG_EXPORTED;
        }
        if !tag.is_empty() {
            flags |= FLAG_TAG;
        }
        if pkg_path.is_some_and(|p| !p.is_empty()) {
            flags |= FLAG_PKG;
        }

        let mut bytes = Vec::with_capacity(1 + 2 + name.len() + 2 + tag.len());
        bytes.push(flags);
        push_string(&mut bytes, name);
        if flags & FLAG_TAG != 0 {
            push_string(&mut bytes, tag);
        }
        if flags & FLAG_PKG != 0 {
            push_string(&mut bytes, pkg_path.unwrap_or(""));
        }

        Ok(Self::decode(&bytes)?.0)
    }

    /// Encode the textual form of a type
    ///
    /// Forms longer than [`MAX_NAME_LEN`] are truncated at a character
    /// boundary; identity never depends on the textual form.
    pub fn type_string(s: &str) -> Self {
        let mut end = s.len().min(MAX_NAME_LEN);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let s = &s[..end];
        let mut bytes = Vec::with_capacity(3 + s.len());
        bytes.push(0);
        push_string(&mut bytes, s);
        let len = bytes.len();
        Self {
            bytes: bytes.into_boxed_slice(),
            name: 3..len,
            tag: None,
            pkg: None,
        }
    }

    /// Encode a plain name, exported when it starts with an upper-case letter
    pub fn plain(name: &str) -> ReflectResult<Self> {
        Self::new(name, "", is_exported_ident(name), None)
    }

    /// Decode one record from the front of `buf`
    ///
    /// Returns the record and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> ReflectResult<(Self, usize)> {
        let flags = *buf.first().ok_or(ReflectError::NameRecord("empty record"))?;
        if flags & !(FLAG_EXPORTED | FLAG_TAG | FLAG_PKG) != 0 {
            return Err(ReflectError::NameRecord("unknown flag bits"));
        }

        let mut pos = 1;
        let name = read_string(buf, &mut pos)?;
        let tag = if flags & FLAG_TAG != 0 {
            Some(read_string(buf, &mut pos)?)
        } else {
            None
        };
        let pkg = if flags & FLAG_PKG != 0 {
            Some(read_string(buf, &mut pos)?)
        } else {
            None
        };

        let record = Self {
            bytes: buf[..pos].into(),
            name,
            tag,
            pkg,
        };
        Ok((record, pos))
    }

    /// Raw encoded bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The name itself
    pub fn name(&self) -> &str {
        self.str_at(&self.name)
    }

    /// The tag string, empty if none
    pub fn tag(&self) -> &str {
        self.tag.as_ref().map(|r| self.str_at(r)).unwrap_or("")
    }

    /// Declaring package path, if recorded
    pub fn pkg_path(&self) -> Option<&str> {
        self.pkg.as_ref().map(|r| self.str_at(r))
    }

    /// Exported bit
    #[inline]
    pub fn is_exported(&self) -> bool {
        self.bytes[0] & FLAG_EXPORTED != 0
    }

    /// Whether a tag follows the name
    #[inline]
    pub fn has_tag(&self) -> bool {
        self.tag.is_some()
    }

    /// Whether the name is the blank identifier `_`
    pub fn is_blank(&self) -> bool {
        self.name() == "_"
    }

    fn str_at(&self, range: &Range<usize>) -> &str {
        // validated as UTF-8 in decode
        std::str::from_utf8(&self.bytes[range.clone()]).unwrap_or("")
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Name");
        d.field("name", &self.name());
        if self.has_tag() {
            d.field("tag", &self.tag());
        }
        if let Some(pkg) = self.pkg_path() {
            d.field("pkg", &pkg);
        }
        d.field("exported", &self.is_exported()).finish()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether an identifier is exported (starts with an upper-case letter)
pub fn is_exported_ident(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn push_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_string(buf: &[u8], pos: &mut usize) -> ReflectResult<Range<usize>> {
    let len_bytes = buf
        .get(*pos..*pos + 2)
        .ok_or(ReflectError::NameRecord("truncated length"))?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let start = *pos + 2;
    let data = buf
        .get(start..start + len)
        .ok_or(ReflectError::NameRecord("truncated data"))?;
    std::str::from_utf8(data).map_err(|_| ReflectError::NameRecord("invalid utf-8"))?;
    *pos = start + len;
    Ok(start..start + len)
}
