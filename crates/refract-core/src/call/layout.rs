//! Argument frame layout
//!
//! A call frame is one contiguous block holding an optional receiver word,
//! the inputs, then the outputs:
//!
//! ```text
//! +----------+--------+--------+-----+---------+---------+
//! | receiver | in 0   | in 1   | ... | out 0   | out 1   |
//! +----------+--------+--------+-----+---------+---------+
//! 0          ^ each input at its own alignment
//!                                    ^ ret_offset (word aligned)
//! ```
//!
//! The receiver, when present, always occupies exactly one pointer-sized
//! slot holding the address of the receiver value. The frame's type is an
//! opaque struct whose pointer mask covers every pointer word, so a frame
//! allocated from the heap is scanned like any other object.

use crate::types::factory::opaque_struct;
use crate::types::gcdata::add_type_bits;
use crate::types::{BitVector, TypeDescriptor, TypeRef, PTR_SIZE};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

static LAYOUTS: Lazy<RwLock<FxHashMap<(usize, usize), &'static FrameLayout>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// Computed frame layout of a function signature
#[derive(Debug)]
pub struct FrameLayout {
    frame: TypeRef,
    receiver: bool,
    ins: Vec<usize>,
    outs: Vec<usize>,
    ret_offset: usize,
}

#[inline]
fn align_up(n: usize, a: usize) -> usize {
    n.div_ceil(a.max(1)) * a.max(1)
}

fn addr(t: TypeRef) -> usize {
    t as *const TypeDescriptor as usize
}

impl FrameLayout {
    /// Layout for calling `ft`, with a receiver slot if `receiver` is set
    ///
    /// Layouts are computed once per signature and receiver type and
    /// shared process-wide. Returns `None` if `ft` is not a function type.
    pub fn of(ft: TypeRef, receiver: Option<TypeRef>) -> Option<&'static FrameLayout> {
        let func = ft.as_func()?;
        let key = (addr(ft), receiver.map_or(0, addr));
        if let Some(&layout) = LAYOUTS.read().get(&key) {
            return Some(layout);
        }

        let mut bits = BitVector::new();
        let mut offset = 0;
        let mut align = PTR_SIZE;
        if receiver.is_some() {
            bits.append(true);
            offset = PTR_SIZE;
        }
        let mut ins = Vec::with_capacity(func.ins().len());
        for &t in func.ins() {
            offset = align_up(offset, t.align());
            align = align.max(t.align());
            ins.push(offset);
            add_type_bits(&mut bits, offset, t);
            offset += t.size();
        }
        offset = align_up(offset, PTR_SIZE);
        let ret_offset = offset;
        let mut outs = Vec::with_capacity(func.outs().len());
        for &t in func.outs() {
            offset = align_up(offset, t.align());
            align = align.max(t.align());
            outs.push(offset);
            add_type_bits(&mut bits, offset, t);
            offset += t.size();
        }
        let size = align_up(offset, PTR_SIZE);

        let string = match receiver {
            Some(r) => format!("methodargs({}.{})", r, ft),
            None => format!("funcargs({})", ft),
        };

        // only the thread that fills the entry leaks its descriptors
        let mut layouts = LAYOUTS.write();
        let layout = *layouts.entry(key).or_insert_with(|| {
            tracing::debug!(frame = %string, size, ret_offset, "frame layout computed");
            let frame: TypeRef = Box::leak(Box::new(opaque_struct(&string, size, align, &bits)));
            Box::leak(Box::new(FrameLayout {
                frame,
                receiver: receiver.is_some(),
                ins,
                outs,
                ret_offset,
            }))
        });
        Some(layout)
    }

    /// Descriptor of the frame record
    #[inline]
    pub fn frame_type(&self) -> TypeRef {
        self.frame
    }

    /// Total frame size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.frame.size()
    }

    /// Whether slot 0 holds a receiver
    #[inline]
    pub fn has_receiver(&self) -> bool {
        self.receiver
    }

    /// Offset of the first output
    #[inline]
    pub fn ret_offset(&self) -> usize {
        self.ret_offset
    }

    /// Offsets of the inputs, excluding the receiver
    #[inline]
    pub fn in_offsets(&self) -> &[usize] {
        &self.ins
    }

    /// Offsets of the outputs
    #[inline]
    pub fn out_offsets(&self) -> &[usize] {
        &self.outs
    }

    /// Whether frame word `i` holds a pointer
    pub fn is_pointer_word(&self, i: usize) -> bool {
        self.frame.gc_data().is_pointer_word(i)
    }

    /// Fresh zeroed frame in engine memory
    pub(crate) fn alloc_frame(&self) -> *mut u8 {
        crate::gc::Heap::global().alloc(self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, Kind, ModuleBuilder};

    #[test]
    fn test_plain_layout() {
        let mut m = ModuleBuilder::new("main");
        let ft = m
            .func(
                &[basic(Kind::Int8), basic(Kind::Int64), basic(Kind::String)],
                &[basic(Kind::Bool), basic(Kind::Int32)],
                false,
            )
            .unwrap();
        let l = FrameLayout::of(ft, None).unwrap();
        let w = PTR_SIZE;

        assert!(!l.has_receiver());
        assert_eq!(l.in_offsets(), &[0, 8, 16]);
        assert_eq!(l.ret_offset(), 16 + 2 * w);
        assert_eq!(l.out_offsets(), &[16 + 2 * w, 16 + 2 * w + 4]);
        assert_eq!(l.size() % w, 0);
        assert!(l.is_pointer_word(16 / w));
        assert!(!l.is_pointer_word(0));
        assert_eq!(l.frame_type().string(), format!("funcargs({})", ft));
    }

    #[test]
    fn test_receiver_slot() {
        let mut m = ModuleBuilder::new("main");
        let ft = m.func(&[basic(Kind::Uint8)], &[], false).unwrap();
        let big = m.array(basic(Kind::Int64), 10).unwrap();
        let l = FrameLayout::of(ft, Some(big)).unwrap();
        assert!(l.has_receiver());
        assert_eq!(l.in_offsets(), &[PTR_SIZE]);
        assert!(l.is_pointer_word(0));
        assert_eq!(l.size(), 2 * PTR_SIZE);
    }

    #[test]
    fn test_layouts_are_cached() {
        let mut m = ModuleBuilder::new("main");
        let ft = m.func(&[], &[basic(Kind::Float64)], false).unwrap();
        let a = FrameLayout::of(ft, None).unwrap();
        let b = FrameLayout::of(ft, None).unwrap();
        assert!(std::ptr::eq(a, b));
        assert!(FrameLayout::of(basic(Kind::Int), None).is_none());
    }

    #[test]
    fn test_concurrent_requests_share_one_frame_type() {
        let mut m = ModuleBuilder::new("main");
        let ft = m.func(&[basic(Kind::Uint16), basic(Kind::String)], &[], false).unwrap();
        let frames: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| addr(FrameLayout::of(ft, None).unwrap().frame_type())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(frames.iter().all(|&f| f == frames[0]));
    }
}
