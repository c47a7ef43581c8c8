//! Compatibility constants (spec.md §6 "Constants that affect compatibility").

/// Fixed capacity of a Chase-Lev deque. Must be a power of two.
pub const CAP: u64 = 64;

/// Maximum number of nesting depths a hierarchical heap can track. Tied to
/// `CAP`: a worker cannot claim more local scope than its deque can encode.
pub const HM_MAX_NUM_LEVELS: usize = CAP as usize;

/// Sentinel depth meaning "this ForwardArgs is not restricted to a single
/// promotion target level" (§3, `ForwardArgs.to_level`).
pub const HM_HH_INVALID_LEVEL: u32 = u32::MAX;

/// Sentinel `containing_hh` value installed on to-space chunk lists during a
/// collection (§3 "To-space" invariant).
pub const COPY_OBJECT_HH_VALUE: u64 = u64::MAX;

/// Extra bytes appended to a freshly allocated chunk so that the mutator
/// frontier always has a little slack before crossing a block boundary
/// (§4.4, §4.5 step 11).
pub const HEAP_LIMIT_SLOP: usize = 256;

/// Size of the first "block" of any chunk; `frontier` must stay inside this
/// region while the mutator is resumed (§3 "Heap" invariant).
pub const HM_BLOCK_SIZE: usize = 32 * 1024;

/// Byte width of a machine pointer / ObjPtr slot.
pub const PTR_SIZE: usize = core::mem::size_of::<usize>();

/// Fixed metadata sizes by tag, in bytes (header + tag-specific extra
/// fields), per the DATA MODEL table in spec.md §3.
pub const META_SIZE_NORMAL: usize = HEADER_SIZE;
pub const META_SIZE_SEQ: usize = HEADER_SIZE + SEQ_EXTRA_SIZE;
pub const META_SIZE_STACK: usize = HEADER_SIZE + STACK_EXTRA_SIZE;

pub const HEADER_SIZE: usize = 8;
pub const SEQ_EXTRA_SIZE: usize = 8;
pub const STACK_EXTRA_SIZE: usize = 16;
