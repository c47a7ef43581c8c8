//! Fatal-error discipline (spec.md §7).
//!
//! The teacher never routes out-of-memory or broken-invariant conditions
//! through `Result`; `semispace.rs::allocate_with_gc` just does
//! `eprintln!("FATAL: Out of memory"); std::process::abort();`. We keep that
//! shape: a `Fatal` enum purely for a readable message, and a `fatal!` macro
//! that prints it and aborts the process. Recoverable conditions (full
//! deque, CAS contention, skipped collection) never go through here; they
//! return sentinels or booleans, per §7's policy table.

use std::fmt;

#[derive(Debug)]
pub enum Fatal {
    /// The chunk allocator returned null.
    OutOfSpace { context: &'static str },
    /// A down-pointer from a shallower level into a deeper one was observed
    /// during forwarding (§4.3 step 2, §3 "Hierarchy" invariant).
    Entanglement { level: u32, max_level: u32 },
    /// A precondition documented in §4.1/§4.2 was violated by the caller.
    PreconditionViolation { what: &'static str },
    /// An object tag that the hierarchical-heap path refuses to handle
    /// (`WEAK_TAG`, §4.3 step 4) reached `forward_hh_objptr`.
    UnsupportedObject { tag: &'static str },
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::OutOfSpace { context } => {
                write!(f, "Ran out of space for hierarchical heap: {}", context)
            }
            Fatal::Entanglement { level, max_level } => write!(
                f,
                "entanglement detected: object at level {} reachable below level {}",
                level, max_level
            ),
            Fatal::PreconditionViolation { what } => {
                write!(f, "precondition violated: {}", what)
            }
            Fatal::UnsupportedObject { tag } => {
                write!(f, "unsupported object tag in this path: {}", tag)
            }
        }
    }
}

/// Prints the fatal condition and aborts the process, matching the
/// original's `DIE(...)` macro (see `invariant.c`, `local-scope.c`). Never
/// returns.
#[macro_export]
macro_rules! fatal {
    ($e:expr) => {{
        eprintln!("[hhgc] FATAL: {}", $e);
        std::process::abort();
    }};
}
