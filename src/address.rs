//! Raw-pointer arithmetic, wrapped in newtypes (spec.md §9 Design Notes:
//! "Raw pointer arithmetic -> ownership-discipline abstraction").
//!
//! `Address` is a byte offset into managed memory with no ownership
//! semantics of its own; `ObjPtr` is the runtime's tagged reference, which
//! may or may not actually point into the managed heap.

use std::fmt;

/// A raw byte address inside some chunk's backing storage. Never
/// dereferenced directly outside of `object.rs` / `chunk.rs`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub usize);

impl Address {
    #[inline(always)]
    pub fn from_ptr(p: *mut u8) -> Self {
        Address(p as usize)
    }

    #[inline(always)]
    pub fn to_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }

    #[inline(always)]
    pub fn add(self, bytes: usize) -> Self {
        Address(self.0 + bytes)
    }

    #[inline(always)]
    pub fn sub(self, bytes: usize) -> Self {
        Address(self.0 - bytes)
    }

    #[inline(always)]
    pub fn offset_from(self, other: Address) -> isize {
        self.0 as isize - other.0 as isize
    }

    #[inline(always)]
    pub unsafe fn load_u64(self) -> u64 {
        (self.0 as *const u64).read_unaligned()
    }

    #[inline(always)]
    pub unsafe fn store_u64(self, v: u64) {
        (self.0 as *mut u64).write_unaligned(v)
    }

    #[inline(always)]
    pub unsafe fn load_usize(self) -> usize {
        (self.0 as *const usize).read_unaligned()
    }

    #[inline(always)]
    pub unsafe fn store_usize(self, v: usize) {
        (self.0 as *mut usize).write_unaligned(v)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The runtime's tagged reference. `None` stands for anything that is not a
/// managed pointer: `BOGUS_OBJPTR`, small integers, unit, etc. Deliberately
/// `Copy` so that deque slots and forwarding args can move it around freely.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjPtr(Option<Address>);

impl ObjPtr {
    pub const BOGUS: ObjPtr = ObjPtr(None);

    #[inline(always)]
    pub fn of(addr: Address) -> Self {
        ObjPtr(Some(addr))
    }

    #[inline(always)]
    pub fn is_objptr(self) -> bool {
        self.0.is_some()
    }

    #[inline(always)]
    pub fn address(self) -> Option<Address> {
        self.0
    }

    /// Panics if this is not actually a pointer; used once a caller has
    /// already checked `is_objptr`.
    #[inline(always)]
    pub fn unwrap_address(self) -> Address {
        self.0.expect("ObjPtr::unwrap_address on BOGUS_OBJPTR")
    }
}

impl fmt::Debug for ObjPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(a) => write!(f, "ObjPtr({:?})", a),
            None => write!(f, "BOGUS_OBJPTR"),
        }
    }
}

impl Default for ObjPtr {
    fn default() -> Self {
        ObjPtr::BOGUS
    }
}
