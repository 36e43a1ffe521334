//! Slice views
//!
//! A slice value is a three-word header `(data, len, cap)`. Reslicing and
//! appending produce new headers over the same or a grown backing array;
//! only the setters rewrite the header in place.

use super::convert::assign_to;
use super::{store, Flags, Value};
use crate::config::misuse;
use crate::gc::Heap;
use crate::runtime::SliceHeader;
use crate::types::{Kind, TypeRef, TypeRegistry};

/// View of a slice value
#[derive(Debug, Clone, Copy)]
pub struct SliceValue(Value);

impl SliceValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    #[inline]
    fn header(&self) -> SliceHeader {
        unsafe { *(self.0.ptr as *const SliceHeader) }
    }

    fn typ(&self) -> Option<TypeRef> {
        self.0.typ
    }

    fn elem(&self) -> Option<TypeRef> {
        self.0.typ.and_then(|t| t.elem())
    }

    fn check_set(&self, op: &str) -> bool {
        if self.0.can_set() {
            return true;
        }
        misuse(op, "slice is not settable");
        false
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.header().len
    }

    /// Whether the slice has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the backing array
    pub fn cap(&self) -> usize {
        self.header().cap
    }

    /// Whether the slice is nil
    pub fn is_nil(&self) -> bool {
        self.header().data.is_null()
    }

    /// Element `i`, always addressable
    pub fn index(&self, i: usize) -> Value {
        self.0.index(i)
    }

    /// Change the length within the capacity
    pub fn set_len(&self, n: usize) -> bool {
        if !self.check_set("SliceValue::set_len") {
            return false;
        }
        let h = self.header();
        if n > h.cap {
            misuse("SliceValue::set_len", format_args!("length {} exceeds capacity {}", n, h.cap));
            return false;
        }
        unsafe { (*(self.0.ptr as *mut SliceHeader)).len = n };
        true
    }

    /// Shrink the capacity, keeping it at least the length
    pub fn set_cap(&self, n: usize) -> bool {
        if !self.check_set("SliceValue::set_cap") {
            return false;
        }
        let h = self.header();
        if n < h.len || n > h.cap {
            misuse("SliceValue::set_cap", format_args!("capacity {} out of range [{}, {}]", n, h.len, h.cap));
            return false;
        }
        unsafe { (*(self.0.ptr as *mut SliceHeader)).cap = n };
        true
    }

    /// Subslice `[i:j]` sharing the backing array
    pub fn slice(&self, i: usize, j: usize) -> Option<Value> {
        self.slice3(i, j, self.cap())
    }

    /// Subslice `[i:j:k]` with capacity `k - i`
    pub fn slice3(&self, i: usize, j: usize, k: usize) -> Option<Value> {
        let (t, elem) = (self.typ()?, self.elem()?);
        let h = self.header();
        if !(i <= j && j <= k && k <= h.cap) {
            misuse(
                "SliceValue::slice",
                format_args!("bounds [{}:{}:{}] out of range for capacity {}", i, j, k, h.cap),
            );
            return None;
        }
        let data = if h.data.is_null() {
            h.data
        } else {
            unsafe { h.data.add(i * elem.size()) }
        };
        Some(new_header(t, data, j - i, k - i, self.0.flag))
    }

    /// Copy of a byte slice's contents
    pub fn bytes(&self) -> Vec<u8> {
        if self.elem().map(|e| e.kind()) != Some(Kind::Uint8) {
            misuse("SliceValue::bytes", "slice of non-byte elements");
            return Vec::new();
        }
        let h = self.header();
        if h.len == 0 {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(h.data, h.len) }.to_vec()
    }

    /// Copy of a code point slice's contents
    pub fn runes(&self) -> Vec<i32> {
        if self.elem().map(|e| e.kind()) != Some(Kind::Int32) {
            misuse("SliceValue::runes", "slice of non-rune elements");
            return Vec::new();
        }
        let h = self.header();
        (0..h.len)
            .map(|i| unsafe { *(h.data as *const i32).add(i) })
            .collect()
    }

    /// Replace a byte slice with a fresh copy of `bytes`
    pub fn set_bytes(&self, bytes: &[u8]) -> bool {
        if self.elem().map(|e| e.kind()) != Some(Kind::Uint8) {
            misuse("SliceValue::set_bytes", "slice of non-byte elements");
            return false;
        }
        self.replace(bytes.as_ptr(), bytes.len(), bytes.len())
    }

    /// Replace a code point slice with a fresh copy of `runes`
    pub fn set_runes(&self, runes: &[i32]) -> bool {
        if self.elem().map(|e| e.kind()) != Some(Kind::Int32) {
            misuse("SliceValue::set_runes", "slice of non-rune elements");
            return false;
        }
        self.replace(runes.as_ptr() as *const u8, runes.len(), runes.len() * 4)
    }

    fn replace(&self, src: *const u8, len: usize, bytes: usize) -> bool {
        if !self.check_set("SliceValue::set") {
            return false;
        }
        let Some(elem) = self.elem() else {
            return false;
        };
        let data = Heap::global().alloc_array(elem, len);
        unsafe {
            if bytes > 0 {
                std::ptr::copy_nonoverlapping(src, data, bytes);
            }
            *(self.0.ptr as *mut SliceHeader) = SliceHeader { data, len, cap: len };
        }
        true
    }

    /// Swap elements `i` and `j`
    ///
    /// Elements are writable unless the slice was reached through an
    /// unexported field.
    pub fn swap(&self, i: usize, j: usize) -> bool {
        if self.0.is_read_only() {
            misuse("SliceValue::swap", "slice obtained through an unexported field");
            return false;
        }
        let (Some(elem), h) = (self.elem(), self.header()) else {
            return false;
        };
        if i >= h.len || j >= h.len {
            misuse("SliceValue::swap", format_args!("index out of range [0, {})", h.len));
            return false;
        }
        if i != j {
            let n = elem.size();
            unsafe { std::ptr::swap_nonoverlapping(h.data.add(i * n), h.data.add(j * n), n) };
        }
        true
    }

    /// New slice with `values` appended
    ///
    /// Grows into a fresh backing array when the capacity is exhausted.
    /// Every value must be assignable to the element type.
    pub fn append(&self, values: &[Value]) -> Option<Value> {
        let (t, elem) = (self.typ()?, self.elem()?);
        let mut converted = Vec::with_capacity(values.len());
        for v in values {
            if v.is_read_only() {
                misuse("SliceValue::append", "value obtained through an unexported field");
                return None;
            }
            match assign_to(v, elem) {
                Some(x) => converted.push(x),
                None => {
                    misuse(
                        "SliceValue::append",
                        format_args!("{} is not assignable to {}", super::type_name(v), elem),
                    );
                    return None;
                }
            }
        }

        let h = grow(elem, self.header(), converted.len());
        for (i, x) in converted.iter().enumerate() {
            unsafe { store(elem, h.data.add((h.len - converted.len() + i) * elem.size()), x) };
        }
        Some(new_header(t, h.data, h.len, h.cap, Flags::default()))
    }

    /// New slice with the elements of `other` appended
    pub fn append_slice(&self, other: &SliceValue) -> Option<Value> {
        let (t, elem) = (self.typ()?, self.elem()?);
        if other.elem() != Some(elem) {
            misuse("SliceValue::append_slice", "element types differ");
            return None;
        }
        let src = other.header();
        let h = grow(elem, self.header(), src.len);
        if src.len > 0 && elem.size() > 0 {
            unsafe {
                std::ptr::copy(
                    src.data,
                    h.data.add((h.len - src.len) * elem.size()),
                    src.len * elem.size(),
                )
            };
        }
        Some(new_header(t, h.data, h.len, h.cap, Flags::default()))
    }
}

/// Header with room for `extra` more elements, copying into a larger
/// backing array when needed
fn grow(elem: TypeRef, h: SliceHeader, extra: usize) -> SliceHeader {
    let len = h.len + extra;
    if len <= h.cap {
        return SliceHeader { len, ..h };
    }
    let mut cap = if h.cap < 256 { h.cap * 2 } else { h.cap + h.cap / 4 };
    cap = cap.max(len);
    let data = Heap::global().alloc_array(elem, cap);
    if h.len > 0 && elem.size() > 0 {
        unsafe { std::ptr::copy_nonoverlapping(h.data, data, h.len * elem.size()) };
    }
    tracing::trace!(elem = elem.string(), from = h.cap, to = cap, "slice grown");
    SliceHeader { data, len, cap }
}

/// Fresh, non-addressable slice value over `data`
fn new_header(t: TypeRef, data: *mut u8, len: usize, cap: usize, from: Flags) -> Value {
    let p = super::alloc(t);
    unsafe { *(p as *mut SliceHeader) = SliceHeader { data, len, cap } };
    Value::at(t, p, Flags::default().inherit_ro(from))
}

impl Value {
    /// Slice view
    pub fn as_slice(&self) -> Option<SliceValue> {
        if self.kind() == Kind::Slice && !self.is_method() {
            return Some(SliceValue(*self));
        }
        misuse("Value::as_slice", format_args!("call on {} value", self.kind()));
        None
    }

    /// Slice `[i:j]` over an addressable array
    pub fn slice_array(&self, registry: &TypeRegistry, i: usize, j: usize) -> Option<Value> {
        if !self.must_be("Value::slice_array", Kind::Array) {
            return None;
        }
        let t = self.typ?;
        let (elem, n) = (t.elem()?, t.len()?);
        if !self.can_addr() {
            misuse("Value::slice_array", "array is not addressable");
            return None;
        }
        if !(i <= j && j <= n) {
            misuse("Value::slice_array", format_args!("bounds [{}:{}] out of range for length {}", i, j, n));
            return None;
        }
        let data = unsafe { self.ptr.add(i * elem.size()) };
        Some(new_header(registry.slice_of(elem), data, j - i, n - i, self.flag))
    }

    /// Copy `len` raw bytes into the backing array of a fresh slice
    ///
    /// # Safety
    ///
    /// The slice must have room for `len` bytes of element data.
    pub(crate) unsafe fn fill_elems(&self, src: *const u8, len: usize) {
        if len > 0 {
            let h = *(self.ptr as *const SliceHeader);
            std::ptr::copy_nonoverlapping(src, h.data, len);
        }
    }
}
