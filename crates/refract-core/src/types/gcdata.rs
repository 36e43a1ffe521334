//! GC pointer metadata
//!
//! Every descriptor carries [`GcData`] describing which pointer-sized words
//! of a value hold pointers, covering the first `ptr_data` bytes:
//!
//! - `None`: the type holds no pointers.
//! - `Mask`: a flat bitmap, one bit per word, least significant bit first.
//! - `Program`: a compact instruction stream used for large arrays, where
//!   a flat bitmap would be needlessly big.
//!
//! Program format (after a 4-byte little-endian length prefix):
//!
//! ```text
//! 0x00               end of program
//! 0nnnnnnn  b...     emit n literal bits taken from the next ceil(n/8) bytes
//! 1nnnnnnn  c        repeat the previous n bits c more times (varint c)
//! 10000000  n c      same with a varint bit count n
//! ```
//!
//! Both forms are consumed by [`GcData::for_each_pointer_word`], so the
//! collector and the tests never care which one a type uses.

use super::descriptor::TypeRef;
use super::kind::{Kind, PTR_SIZE};
use std::fmt;

/// Largest flat mask (in bytes) the array constructor will synthesize
pub const MAX_PTR_MASK_BYTES: usize = 2048;

/// Longest literal run a program instruction carries
const MAX_LITERAL_BITS: usize = 120;

/// GC pointer map or program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GcData {
    /// No pointers in this type
    #[default]
    None,

    /// One bit per word, LSB first
    Mask(Box<[u8]>),

    /// Length-prefixed repeat program
    Program(Box<[u8]>),
}

impl GcData {
    /// Build a mask from a bit vector, or `None` if it has no set bits
    pub fn from_bits(bits: &BitVector) -> Self {
        if bits.count_ones() == 0 {
            GcData::None
        } else {
            GcData::Mask(bits.as_bytes().into())
        }
    }

    /// Check if this metadata names any pointer
    pub fn has_pointers(&self) -> bool {
        !matches!(self, GcData::None)
    }

    /// Check if this metadata is a program
    pub fn is_program(&self) -> bool {
        matches!(self, GcData::Program(_))
    }

    /// Whether word `i` holds a pointer
    ///
    /// Programs are expanded up to `i` to answer.
    pub fn is_pointer_word(&self, i: usize) -> bool {
        match self {
            GcData::None => false,
            GcData::Mask(mask) => mask
                .get(i / 8)
                .is_some_and(|b| b & (1 << (i % 8)) != 0),
            GcData::Program(_) => {
                let mut found = false;
                self.for_each_pointer_word(i + 1, |w| found |= w == i);
                found
            }
        }
    }

    /// Call `f` with the index of every pointer word below `words`
    pub fn for_each_pointer_word<F>(&self, words: usize, mut f: F)
    where
        F: FnMut(usize),
    {
        match self {
            GcData::None => {}
            GcData::Mask(mask) => {
                for (byte_index, &byte) in mask.iter().enumerate() {
                    if byte == 0 {
                        continue;
                    }
                    for bit in 0..8 {
                        let w = byte_index * 8 + bit;
                        if w >= words {
                            return;
                        }
                        if byte & (1 << bit) != 0 {
                            f(w);
                        }
                    }
                }
            }
            GcData::Program(prog) => {
                run_program(prog, words, |w, is_ptr| {
                    if is_ptr {
                        f(w);
                    }
                });
            }
        }
    }

    /// Expand into a flat bit vector covering `words` words
    pub fn to_bits(&self, words: usize) -> BitVector {
        let mut bits = BitVector::with_len(words);
        self.for_each_pointer_word(words, |w| bits.set(w));
        bits
    }

    /// Get the number of pointer words below `words`
    pub fn pointer_count(&self, words: usize) -> usize {
        let mut n = 0;
        self.for_each_pointer_word(words, |_| n += 1);
        n
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            GcData::None => 0,
            GcData::Mask(m) => m.len(),
            GcData::Program(p) => p.len(),
        }
    }
}

impl fmt::Display for GcData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcData::None => write!(f, "None"),
            GcData::Mask(mask) => {
                write!(f, "Mask(")?;
                for byte in mask.iter() {
                    write!(f, "{:08b}", byte.reverse_bits())?;
                }
                write!(f, ")")
            }
            GcData::Program(prog) => write!(f, "Program({} bytes)", prog.len()),
        }
    }
}

// ============================================================================
// Bit vector
// ============================================================================

/// Growable bit vector, LSB first within each byte
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVector {
    n: usize,
    data: Vec<u8>,
}

impl BitVector {
    /// Create an empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vector of `n` clear bits
    pub fn with_len(n: usize) -> Self {
        Self {
            n,
            data: vec![0; n.div_ceil(8)],
        }
    }

    /// Append one bit
    pub fn append(&mut self, bit: bool) {
        if self.n % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            self.data[self.n / 8] |= 1 << (self.n % 8);
        }
        self.n += 1;
    }

    /// Append clear bits until the length is `n`
    pub fn pad_to(&mut self, n: usize) {
        while self.n < n {
            self.append(false);
        }
    }

    /// Set bit `i`, growing the vector if needed
    pub fn set(&mut self, i: usize) {
        self.pad_to(i + 1);
        self.data[i / 8] |= 1 << (i % 8);
    }

    /// Read bit `i`
    pub fn get(&self, i: usize) -> bool {
        i < self.n && self.data[i / 8] & (1 << (i % 8)) != 0
    }

    /// Number of bits
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether the vector has no bits
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Index one past the highest set bit
    pub fn last_set(&self) -> Option<usize> {
        (0..self.n).rev().find(|&i| self.get(i))
    }

    /// Truncate to `n` bits
    pub fn truncate(&mut self, n: usize) {
        if n >= self.n {
            return;
        }
        self.n = n;
        self.data.truncate(n.div_ceil(8));
        if n % 8 != 0 {
            if let Some(last) = self.data.last_mut() {
                *last &= (1u8 << (n % 8)) - 1;
            }
        }
    }

    /// Packed bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Record the pointer words of a `t` placed at byte `offset`
///
/// The vector is padded with clear bits up to the first word of each
/// pointer, so the result covers words up to the last pointer of `t`.
pub fn add_type_bits(bits: &mut BitVector, offset: usize, t: TypeRef) {
    if !t.has_pointers() {
        return;
    }

    match t.kind() {
        Kind::Chan
        | Kind::Func
        | Kind::Map
        | Kind::Ptr
        | Kind::Slice
        | Kind::String
        | Kind::UnsafePointer => {
            // 1 pointer at start of representation
            bits.pad_to(offset / PTR_SIZE);
            bits.append(true);
        }
        Kind::Interface => {
            // 2 pointers
            bits.pad_to(offset / PTR_SIZE);
            bits.append(true);
            bits.append(true);
        }
        Kind::Array => {
            if let Some(arr) = t.as_array() {
                for i in 0..arr.len() {
                    add_type_bits(bits, offset + i * arr.elem().size(), arr.elem());
                }
            }
        }
        Kind::Struct => {
            if let Some(st) = t.as_struct() {
                for f in st.fields() {
                    add_type_bits(bits, offset + f.offset(), f.typ);
                }
            }
        }
        _ => {}
    }
}

/// Tile `t`'s pointer words `count` times into `bits`, starting at word `base`
pub(crate) fn emit_gc_mask(bits: &mut BitVector, base: usize, t: TypeRef, count: usize) {
    let words = t.size() / PTR_SIZE;
    let mut ptrs = Vec::new();
    t.gc_data().for_each_pointer_word(t.ptr_words(), |w| ptrs.push(w));
    for i in 0..count {
        for &w in &ptrs {
            bits.set(base + i * words + w);
        }
    }
}

// ============================================================================
// Programs
// ============================================================================

/// Writer for repeat programs
#[derive(Debug)]
pub struct ProgramWriter {
    buf: Vec<u8>,
}

impl ProgramWriter {
    /// Start a program, reserving the length prefix
    pub fn new() -> Self {
        Self { buf: vec![0; 4] }
    }

    /// Emit the pointer words of `t` as literal bits
    ///
    /// If `t` itself uses a program, its body is spliced in. Returns the
    /// number of bits emitted: the pointer prefix for a mask, the whole
    /// value for a spliced program (array programs always cover every word).
    pub fn type_bits(&mut self, t: TypeRef) -> usize {
        match t.gc_data() {
            GcData::None => 0,
            GcData::Program(prog) => {
                // drop length prefix and trailing end marker
                if prog.len() > 5 {
                    self.buf.extend_from_slice(&prog[4..prog.len() - 1]);
                }
                t.size() / PTR_SIZE
            }
            mask @ GcData::Mask(_) => {
                let bits = mask.to_bits(t.ptr_words());
                self.literal(&bits);
                bits.len()
            }
        }
    }

    /// Emit every bit of `bits` literally
    pub fn literal(&mut self, bits: &BitVector) {
        let mut start = 0;
        while start < bits.len() {
            let n = (bits.len() - start).min(MAX_LITERAL_BITS);
            self.buf.push(n as u8);
            let mut byte = 0u8;
            for j in 0..n {
                if bits.get(start + j) {
                    byte |= 1 << (j % 8);
                }
                if j % 8 == 7 || j == n - 1 {
                    self.buf.push(byte);
                    byte = 0;
                }
            }
            start += n;
        }
    }

    /// Emit `n` clear bits
    pub fn zeros(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.buf.extend_from_slice(&[0x01, 0x00]);
        if n > 1 {
            self.repeat(1, n - 1);
        }
    }

    /// Repeat the previous `bits` bits `count` more times
    pub fn repeat(&mut self, bits: usize, count: usize) {
        if bits < 0x80 {
            self.buf.push(bits as u8 | 0x80);
        } else {
            self.buf.push(0x80);
            append_varint(&mut self.buf, bits);
        }
        append_varint(&mut self.buf, count);
    }

    /// Terminate the program and fill in the length prefix
    pub fn finish(mut self) -> Box<[u8]> {
        self.buf.push(0);
        let len = (self.buf.len() - 4) as u32;
        self.buf[..4].copy_from_slice(&len.to_le_bytes());
        self.buf.into_boxed_slice()
    }
}

impl Default for ProgramWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Append an unsigned LEB128 varint
pub fn append_varint(out: &mut Vec<u8>, mut v: usize) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn read_varint(prog: &[u8], pos: &mut usize) -> Option<usize> {
    let mut v = 0usize;
    let mut shift = 0;
    loop {
        let b = *prog.get(*pos)?;
        *pos += 1;
        v |= ((b & 0x7f) as usize) << shift;
        if b & 0x80 == 0 {
            return Some(v);
        }
        shift += 7;
        if shift >= usize::BITS {
            return None;
        }
    }
}

/// Interpret a program, reporting each of the first `limit` words
///
/// Stops early at `limit` or at the end of the program; a malformed
/// program is treated as ending where it stops parsing.
fn run_program(prog: &[u8], limit: usize, mut emit: impl FnMut(usize, bool)) {
    let mut history = BitVector::new();
    let mut pos = 4;

    while history.len() < limit {
        let Some(&inst) = prog.get(pos) else {
            return;
        };
        pos += 1;
        let n = (inst & 0x7f) as usize;

        if inst & 0x80 == 0 {
            if n == 0 {
                return;
            }
            // literal bits
            for j in 0..n {
                let Some(&byte) = prog.get(pos + j / 8) else {
                    return;
                };
                let bit = byte & (1 << (j % 8)) != 0;
                if history.len() < limit {
                    emit(history.len(), bit);
                }
                history.append(bit);
            }
            pos += n.div_ceil(8);
            continue;
        }

        // repeat
        let n = if n == 0 {
            match read_varint(prog, &mut pos) {
                Some(n) => n,
                None => return,
            }
        } else {
            n
        };
        let Some(count) = read_varint(prog, &mut pos) else {
            return;
        };
        if n == 0 || n > history.len() {
            return;
        }
        let src = history.len() - n;
        for _ in 0..count {
            for j in 0..n {
                if history.len() >= limit {
                    return;
                }
                let bit = history.get(src + j);
                emit(history.len(), bit);
                history.append(bit);
            }
        }
    }
}
