//! Object headers and tag dispatch (spec.md §3 "Object"). Packed into one
//! 64-bit word with `modular_bitfield`, the way `header.rs::HeapObjectHeader`
//! packs mark bits and a type id.

use crate::address::Address;
use crate::constants::{HEADER_SIZE, META_SIZE_NORMAL, META_SIZE_SEQ, META_SIZE_STACK, PTR_SIZE};
use modular_bitfield::prelude::*;

#[derive(BitfieldSpecifier, Clone, Copy, PartialEq, Eq, Debug)]
#[bits = 2]
pub enum Tag {
    Normal = 0,
    Sequence = 1,
    Stack = 2,
    Weak = 3,
}

/// Packed object header: `[tag:2][forwarded:1][num_ptrs:24][bytes_non_ptr:24][_pad:13]`.
#[bitfield(bits = 64)]
#[derive(Clone, Copy)]
pub struct PackedHeader {
    pub tag: Tag,
    pub forwarded: bool,
    pub num_ptrs: B24,
    pub bytes_non_ptr: B24,
    #[skip]
    __: B13,
}

/// A decoded view over an object's header word, read out of the heap at
/// `addr - HEADER_SIZE`.
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub tag: Tag,
    pub forwarded: bool,
    pub num_ptrs: u32,
    pub bytes_non_ptr: u32,
}

/// Address of the header word that precedes an object at `addr`.
#[inline(always)]
fn header_addr(addr: Address) -> Address {
    addr.sub(HEADER_SIZE)
}

/// Read the header preceding `addr`. Caller guarantees `addr` is a valid
/// object pointer obtained from the allocator.
pub unsafe fn read_header(addr: Address) -> Header {
    let raw = header_addr(addr).load_u64();
    let packed = PackedHeader::from_bytes(raw.to_le_bytes());
    Header {
        tag: packed.tag(),
        forwarded: packed.forwarded(),
        num_ptrs: packed.num_ptrs(),
        bytes_non_ptr: packed.bytes_non_ptr(),
    }
}

pub unsafe fn write_header(addr: Address, header: Header) {
    let mut packed = PackedHeader::new();
    packed.set_tag(header.tag);
    packed.set_forwarded(header.forwarded);
    packed.set_num_ptrs(header.num_ptrs);
    packed.set_bytes_non_ptr(header.bytes_non_ptr);
    header_addr(addr).store_u64(u64::from_le_bytes(packed.into_bytes()));
}

/// Forwarding pointers are stashed in the object's first word once the
/// header's `forwarded` bit is set, matching the original's overwrite of
/// the header slot during a copy.
pub unsafe fn read_forward_pointer(addr: Address) -> Address {
    Address(addr.load_usize())
}

pub unsafe fn write_forward_pointer(addr: Address, to: Address) {
    let mut header = read_header(addr);
    header.forwarded = true;
    write_header(addr, header);
    addr.store_usize(to.0);
}

/// Stack-specific extra fields, stored immediately after the header:
/// `[reserved: usize][used: usize]`.
pub unsafe fn read_stack_extra(addr: Address) -> (usize, usize) {
    let reserved = addr.load_usize();
    let used = addr.add(PTR_SIZE).load_usize();
    (reserved, used)
}

pub unsafe fn write_stack_extra(addr: Address, reserved: usize, used: usize) {
    addr.store_usize(reserved);
    addr.add(PTR_SIZE).store_usize(used);
}

/// Sequence-specific extra field: element count, stored right after the
/// header.
pub unsafe fn read_seq_length(addr: Address) -> usize {
    addr.load_usize()
}

pub unsafe fn write_seq_length(addr: Address, len: usize) {
    addr.store_usize(len);
}

/// Sentinel `bytes_non_ptr` value marking a weak object whose referent
/// died (`GC_WEAK_GONE_HEADER`, §4.7). A live weak's `bytes_non_ptr` is
/// always 0 (its one pointer slot is the target), so this value can
/// never arise naturally.
pub const WEAK_GONE_MARKER: u32 = 0x00FF_FFFF;

pub unsafe fn write_weak_gone_header(addr: Address) {
    write_header(
        addr,
        Header { tag: Tag::Weak, forwarded: false, num_ptrs: 0, bytes_non_ptr: WEAK_GONE_MARKER },
    );
}

pub fn is_weak_gone(header: Header) -> bool {
    header.tag == Tag::Weak && header.bytes_non_ptr == WEAK_GONE_MARKER
}

/// Fixed per-tag metadata size (header + any tag-specific extra fields),
/// per the DATA MODEL table.
pub fn meta_size(tag: Tag) -> usize {
    match tag {
        Tag::Normal | Tag::Weak => META_SIZE_NORMAL,
        Tag::Sequence => META_SIZE_SEQ,
        Tag::Stack => META_SIZE_STACK,
    }
}

/// Total object size assuming a NORMAL/WEAK-style fixed layout: metadata
/// plus `bytes_non_ptr + num_ptrs * PTR_SIZE`, rounded to the pointer
/// width. Sequences and stacks carry extra fields the header alone
/// doesn't encode; use `total_size` when the tag is not known to be
/// NORMAL/WEAK.
pub fn object_size(header: Header) -> usize {
    let payload = header.bytes_non_ptr as usize + header.num_ptrs as usize * PTR_SIZE;
    meta_size(header.tag) + align_up(payload, PTR_SIZE)
}

/// Tag-dispatching total size, for walking a chunk's objects end to end
/// (§4.5 step 7's chunk-list scan).
pub unsafe fn total_size(addr: Address, header: Header) -> usize {
    match header.tag {
        Tag::Normal | Tag::Weak => object_size(header),
        Tag::Sequence => {
            let len = read_seq_length(addr);
            let elem = header.bytes_non_ptr as usize + header.num_ptrs as usize * PTR_SIZE;
            meta_size(header.tag) + align_up(len * elem, PTR_SIZE)
        }
        Tag::Stack => {
            let (reserved, _used) = read_stack_extra(addr);
            meta_size(header.tag) + align_up(reserved, PTR_SIZE)
        }
    }
}

#[inline(always)]
pub(crate) fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Address of the `index`-th pointer slot in an object's payload. Pointer
/// slots for NORMAL/SEQUENCE/STACK all live at the tail of the object,
/// after any non-pointer bytes, matching the original's field layout
/// (pointers last).
pub unsafe fn ptr_slot(addr: Address, header: Header, index: u32) -> Address {
    let base = addr.add(header.bytes_non_ptr as usize);
    base.add(index as usize * PTR_SIZE)
}
