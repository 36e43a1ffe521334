//! Garbage collection
//!
//! Engine-managed memory and the mark-sweep collector that scans it
//! through type descriptors.

pub mod collector;
pub mod header;
pub mod heap;
pub mod roots;

pub use collector::{GarbageCollector, GcStats, HeapStats};
pub use header::{AllocHeader, NativeHooks};
pub use heap::{zero_base, Heap, Trace};
pub use roots::RootSet;
