//! In-memory representations of the hosted language's built-in kinds
//!
//! ```text
//! string      [ data ptr | len ]
//! slice       [ data ptr | len | cap ]
//! interface{} [ type     | data word ]
//! interface   [ itab     | data word ]
//! complex64   [ re f32   | im f32 ]
//! complex128  [ re f64   | im f64 ]
//! ```
//!
//! The data word of an interface holds the value itself when the dynamic
//! type is pointer-shaped, and a pointer to the value otherwise.

use crate::types::TypeRef;
use crate::runtime::CallFn;
use std::fmt;

/// String header
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StringHeader {
    /// Pointer to the first byte
    pub data: *const u8,
    /// Length in bytes
    pub len: usize,
}

impl StringHeader {
    /// The empty string
    pub const EMPTY: StringHeader = StringHeader {
        data: std::ptr::null(),
        len: 0,
    };

    /// Header over a static string
    pub fn from_static(s: &'static str) -> Self {
        Self {
            data: s.as_ptr(),
            len: s.len(),
        }
    }

    /// Bytes of the string
    ///
    /// # Safety
    ///
    /// `data` must be valid for `len` bytes for as long as the returned
    /// slice is used.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.len == 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.data, self.len)
    }

    /// The string contents, replacing invalid UTF-8 sequences
    ///
    /// # Safety
    ///
    /// Same as [`StringHeader::as_bytes`].
    pub unsafe fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl fmt::Debug for StringHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringHeader")
            .field("data", &self.data)
            .field("len", &self.len)
            .finish()
    }
}

/// Slice header
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SliceHeader {
    /// Pointer to the first element
    pub data: *mut u8,
    /// Number of elements in use
    pub len: usize,
    /// Number of elements available
    pub cap: usize,
}

impl SliceHeader {
    /// The nil slice
    pub const NIL: SliceHeader = SliceHeader {
        data: std::ptr::null_mut(),
        len: 0,
        cap: 0,
    };
}

/// Empty-interface representation; also the boxed form of any value
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EmptyInterface {
    /// Dynamic type, `None` for a nil interface
    pub typ: Option<TypeRef>,
    /// Value word or pointer to the value
    pub word: *mut u8,
}

/// Short name for the boxed form used at the public entry points
pub type Eface = EmptyInterface;

impl EmptyInterface {
    /// The nil interface
    pub const NIL: EmptyInterface = EmptyInterface {
        typ: None,
        word: std::ptr::null_mut(),
    };

    /// Box a word with its dynamic type
    pub fn new(typ: TypeRef, word: *mut u8) -> Self {
        Self {
            typ: Some(typ),
            word,
        }
    }

    /// Whether the interface is nil
    pub fn is_nil(&self) -> bool {
        self.typ.is_none()
    }
}

/// Method-bearing interface representation
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NonEmptyInterface {
    /// Dispatch table, `None` for a nil interface
    pub itab: Option<&'static Itab>,
    /// Value word or pointer to the value
    pub word: *mut u8,
}

/// Dispatch table binding a concrete type to an interface
pub struct Itab {
    /// Interface type
    pub inter: TypeRef,
    /// Concrete type
    pub typ: TypeRef,
    /// Implementations in the interface's method order
    pub fun: Box<[CallFn]>,
}

impl fmt::Debug for Itab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Itab")
            .field("inter", &self.inter.string())
            .field("typ", &self.typ.string())
            .field("methods", &self.fun.len())
            .finish()
    }
}

/// Complex number of two 32-bit floats
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex64 {
    /// Real part
    pub re: f32,
    /// Imaginary part
    pub im: f32,
}

/// Complex number of two 64-bit floats
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex128 {
    /// Real part
    pub re: f64,
    /// Imaginary part
    pub im: f64,
}

impl Complex128 {
    /// Create a complex number
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl From<Complex64> for Complex128 {
    fn from(c: Complex64) -> Self {
        Self {
            re: f64::from(c.re),
            im: f64::from(c.im),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PTR_SIZE;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(std::mem::size_of::<StringHeader>(), 2 * PTR_SIZE);
        assert_eq!(std::mem::size_of::<SliceHeader>(), 3 * PTR_SIZE);
        assert_eq!(std::mem::size_of::<EmptyInterface>(), 2 * PTR_SIZE);
        assert_eq!(std::mem::size_of::<NonEmptyInterface>(), 2 * PTR_SIZE);
        assert_eq!(std::mem::size_of::<Complex64>(), 8);
        assert_eq!(std::mem::size_of::<Complex128>(), 16);
    }

    #[test]
    fn test_string_header_bytes() {
        let s = StringHeader::from_static("abc");
        assert_eq!(unsafe { s.as_bytes() }, b"abc");
        assert_eq!(unsafe { StringHeader::EMPTY.as_bytes() }, b"");
    }
}
