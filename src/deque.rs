//! Chase-Lev work-stealing deque with a `set_depth` extension used by the
//! hierarchical-heap collector to publish/claim ranges of depths (spec.md
//! §4.1). Ported from `examples/original_source/runtime/gc/chase-lev-deque.c`;
//! the atomic orderings are reproduced exactly, not "simplified to what
//! works on x86" (§9 Design Notes).
//!
//! Owner ("bottom") and thieves ("top") share one instance. `push_bottom`
//! and `try_pop_bottom` may only be called by the owning worker;
//! `try_pop_top` may be called by any number of concurrent thieves.

use crate::constants::CAP;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Fixed-capacity circular buffer. `T` must be `Copy` (deque slots are
/// tagged references / depth markers, never owning handles).
pub struct ChaseLevDeque<T: Copy> {
    top: CachePadded<AtomicU64>,
    bot: CachePadded<AtomicU64>,
    data: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: access to `data` is only ever performed under the index
// discipline enforced by the algorithm below: the owner writes slots in
// `[bot, bot+1)` it is about to publish, and thieves only read slots they
// have already reserved via a successful CAS on `top`.
unsafe impl<T: Copy + Send> Send for ChaseLevDeque<T> {}
unsafe impl<T: Copy + Send> Sync for ChaseLevDeque<T> {}

impl<T: Copy> ChaseLevDeque<T> {
    pub fn new() -> Self {
        let data = (0..CAP)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            top: CachePadded::new(AtomicU64::new(0)),
            bot: CachePadded::new(AtomicU64::new(0)),
            data,
        }
    }

    #[inline(always)]
    unsafe fn slot_write(&self, index: u64, value: T) {
        (*self.data[(index % CAP) as usize].get()).write(value);
    }

    #[inline(always)]
    unsafe fn slot_read(&self, index: u64) -> T {
        (*self.data[(index % CAP) as usize].get()).assume_init()
    }

    /// Try to push `value` at the bottom. Returns `false` if the deque is
    /// already at capacity; a recoverable signal for the scheduler, never
    /// a panic (§7).
    pub fn push_bottom(&self, value: T) -> bool {
        let b = self.bot.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);

        if b.wrapping_sub(t) >= CAP {
            return false;
        }

        unsafe { self.slot_write(b, value) };
        fence(Ordering::Release);
        self.bot.store(b.wrapping_add(1), Ordering::Relaxed);
        true
    }

    /// Try to pop from the bottom (owner only). Returns `fail` if the
    /// deque is empty or the owner lost a race against a thief for the
    /// last element.
    pub fn try_pop_bottom(&self, fail: T) -> T {
        let b = self.bot.load(Ordering::Relaxed).wrapping_sub(1);
        self.bot.store(b, Ordering::Release);
        fence(Ordering::SeqCst);
        let mut t = self.top.load(Ordering::Relaxed);

        if t <= b {
            // Non-empty.
            let elem = unsafe { self.slot_read(b) };
            if t == b {
                // Last element: race with a thief.
                let won = self
                    .top
                    .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok();
                self.bot.store(b.wrapping_add(1), Ordering::Relaxed);
                if won {
                    elem
                } else {
                    fail
                }
            } else {
                elem
            }
        } else {
            // Was already empty.
            self.bot.store(b.wrapping_add(1), Ordering::Relaxed);
            let _ = &mut t;
            fail
        }
    }

    /// Try to steal from the top (any number of concurrent thieves).
    pub fn try_pop_top(&self, fail: T) -> T {
        let t = self.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = self.bot.load(Ordering::Acquire);

        if t >= b {
            return fail;
        }

        let elem = unsafe { self.slot_read(t) };
        match self
            .top
            .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => elem,
            Err(_) => fail,
        }
    }

    /// Reset an *empty* deque so that its next push lands at depth `d`
    /// instead of wherever `bot` previously was. Fatal if the deque is
    /// not observed empty by the caller (§4.1).
    ///
    /// The store ordering is deliberate: whichever of `top`/`bot` is moving
    /// *away* from the other goes first, so that any thief sampling
    /// `(top, bot)` at any instant during the transition still observes
    /// `bot <= top`, i.e. "empty", never a transient non-empty state with
    /// stale slot contents (§4.1 Rationale, §8 property 3).
    pub fn set_depth(&self, desired_depth: u64) {
        let top = self.top.load(Ordering::Acquire);
        let bot = self.bot.load(Ordering::Acquire);

        if top != bot {
            crate::fatal!(crate::error::Fatal::PreconditionViolation {
                what: "set_depth on a non-empty deque"
            });
        }

        if desired_depth == bot {
            return;
        } else if desired_depth < bot {
            self.bot.store(desired_depth, Ordering::SeqCst);
            self.top.store(desired_depth, Ordering::SeqCst);
        } else {
            self.top.store(desired_depth, Ordering::SeqCst);
            self.bot.store(desired_depth, Ordering::SeqCst);
        }
    }

    /// Current `bot` index; used by `local_scope::poll_current_local_scope`.
    pub fn bot(&self) -> u64 {
        self.bot.load(Ordering::SeqCst)
    }

    /// Restore `bot` to a previously observed value (§4.2
    /// `release_local_scope`).
    pub fn set_bot(&self, value: u64) {
        self.bot.store(value, Ordering::SeqCst);
    }

    pub fn len(&self) -> u64 {
        self.bot
            .load(Ordering::SeqCst)
            .wrapping_sub(self.top.load(Ordering::SeqCst))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out every live slot `[top, bot)`, in index order. Only safe
    /// to call while the owning worker is stopped for its own local
    /// collection; concurrent thieves only ever touch slots at or past
    /// `top`, and a local collection never lowers `top`.
    pub unsafe fn snapshot_live_slots(&self) -> Vec<T> {
        let t = self.top.load(Ordering::SeqCst);
        let b = self.bot.load(Ordering::SeqCst);
        let mut out = Vec::with_capacity(b.wrapping_sub(t) as usize);
        let mut i = t;
        while i < b {
            out.push((*self.data[(i % CAP) as usize].get()).assume_init());
            i = i.wrapping_add(1);
        }
        out
    }

    /// Write `values` back into the live slots `[top, bot)`, in the same
    /// order `snapshot_live_slots` returned them.
    pub unsafe fn write_live_slots(&self, values: &[T]) {
        let t = self.top.load(Ordering::SeqCst);
        let b = self.bot.load(Ordering::SeqCst);
        debug_assert_eq!(values.len() as u64, b.wrapping_sub(t));
        let mut i = t;
        for &value in values {
            (*self.data[(i % CAP) as usize].get()).write(value);
            i = i.wrapping_add(1);
        }
    }
}

impl<T: Copy> Default for ChaseLevDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}
