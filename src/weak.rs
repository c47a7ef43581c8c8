//! Weak references and the global weak chain (spec.md §3 "Weak", §4.7
//! "Weak Fixup"). Weaks are root-heap-only: `forward_hh_objptr` fatally
//! rejects `WEAK_TAG` (§4.3 step 4; Open Question resolved in
//! `SPEC_FULL.md`), so this chain is only ever walked by the Cheney
//! collector.
//!
//! A weak object's single pointer slot (right after its header) holds
//! the referent. It is visited **tracelessly**: the collector never
//! forwards through it during the main scan, only fixes it up in one
//! pass at the end of a major collection.

use crate::address::Address;
use crate::object::{self, Header, Tag};

/// One entry in the global weak chain: the address of the weak object
/// itself (its target slot is read/written through `object`).
#[derive(Clone, Copy, Debug)]
pub struct WeakEntry {
    pub weak_addr: Address,
}

#[derive(Default)]
pub struct WeakChain {
    entries: Vec<WeakEntry>,
}

impl WeakChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, weak_addr: Address) {
        self.entries.push(WeakEntry { weak_addr });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `updateWeaksForCheneyCopy`: for each weak, resolve its referent.
    /// If the referent survived (has a forwarding pointer installed by
    /// the main Cheney scan), rewrite the weak's target slot to point at
    /// the to-space copy; otherwise mark the weak itself gone and null
    /// its slot. Always empties the chain afterward (§4.7 "Reset the
    /// chain to empty").
    pub unsafe fn fixup(&mut self) {
        for entry in self.entries.drain(..) {
            let target_slot = entry.weak_addr;
            let raw = target_slot.load_usize();
            if raw == 0 {
                continue;
            }
            let referent = Address(raw);
            let header = object::read_header(referent);
            if header.forwarded {
                let new_addr = object::read_forward_pointer(referent);
                target_slot.store_usize(new_addr.0);
            } else {
                object::write_weak_gone_header(entry.weak_addr.sub(object::meta_size(Tag::Weak)));
                target_slot.store_usize(0);
            }
        }
    }
}

/// True iff the weak at `addr` has already been marked gone by a prior
/// fixup pass.
pub unsafe fn is_gone(addr: Address) -> bool {
    let header: Header = object::read_header(addr);
    object::is_weak_gone(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkList, ChunkSlab};
    use crate::object::{write_header, Header, Tag};

    unsafe fn alloc_weak(chunks: &mut ChunkSlab, list: &mut ChunkList, target: Option<Address>) -> Address {
        let handle = chunks.allocate(4096);
        list.append(chunks, handle, chunks.get(handle).size());
        let chunk = chunks.get_mut(handle);
        let header_addr = chunk.bump(object::meta_size(Tag::Weak) + 8);
        let obj_addr = header_addr.add(object::meta_size(Tag::Weak));
        write_header(obj_addr, Header { tag: Tag::Weak, forwarded: false, num_ptrs: 1, bytes_non_ptr: 0 });
        obj_addr.store_usize(target.map(|a| a.0).unwrap_or(0));
        obj_addr
    }

    #[test]
    fn fixup_follows_forwarding_pointer() {
        unsafe {
            let mut chunks = ChunkSlab::new();
            let mut list = ChunkList::new(0);

            let handle = chunks.allocate(4096);
            list.append(&mut chunks, handle, chunks.get(handle).size());
            let chunk = chunks.get_mut(handle);
            let referent_header = chunk.bump(object::meta_size(Tag::Normal));
            let referent = referent_header.add(object::meta_size(Tag::Normal));
            write_header(referent, Header { tag: Tag::Normal, forwarded: false, num_ptrs: 0, bytes_non_ptr: 0 });

            let weak = alloc_weak(&mut chunks, &mut list, Some(referent));

            let new_addr = Address(0xdead_beef);
            object::write_forward_pointer(referent, new_addr);

            let mut chain = WeakChain::new();
            chain.register(weak);
            chain.fixup();

            assert_eq!(weak.load_usize(), new_addr.0);
            assert!(chain.is_empty());
        }
    }

    #[test]
    fn fixup_marks_dead_referent_gone() {
        unsafe {
            let mut chunks = ChunkSlab::new();
            let mut list = ChunkList::new(0);

            let handle = chunks.allocate(4096);
            list.append(&mut chunks, handle, chunks.get(handle).size());
            let chunk = chunks.get_mut(handle);
            let referent_header = chunk.bump(object::meta_size(Tag::Normal));
            let referent = referent_header.add(object::meta_size(Tag::Normal));
            write_header(referent, Header { tag: Tag::Normal, forwarded: false, num_ptrs: 0, bytes_non_ptr: 0 });

            let weak = alloc_weak(&mut chunks, &mut list, Some(referent));

            let mut chain = WeakChain::new();
            chain.register(weak);
            chain.fixup();

            assert_eq!(weak.load_usize(), 0);
            assert!(is_gone(weak));
        }
    }
}
