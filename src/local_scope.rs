//! Local-scope claiming (spec.md §4.2): a thin wrapper over the deque that
//! lets a worker's collector claim a contiguous prefix of its own depths
//! by repeatedly popping its own bottom.

use crate::address::ObjPtr;
use crate::deque::ChaseLevDeque;

/// Pop one depth off the bottom of `deque`. Returns `true` iff the popped
/// value was a real claim (not `BOGUS_OBJPTR`), meaning the worker now
/// owns one more depth exclusively.
pub fn try_claim_local_scope(deque: &ChaseLevDeque<ObjPtr>) -> bool {
    deque.try_pop_bottom(ObjPtr::BOGUS).is_objptr()
}

/// Restore `bot` to a value observed before a sequence of claims, giving
/// back every depth the worker claimed but did not keep.
pub fn release_local_scope(deque: &ChaseLevDeque<ObjPtr>, original_bot: u64) {
    deque.set_bot(original_bot);
}

/// Current `bot`, i.e. the shallowest depth not yet claimed by anyone.
pub fn poll_current_local_scope(deque: &ChaseLevDeque<ObjPtr>) -> u64 {
    deque.bot()
}
