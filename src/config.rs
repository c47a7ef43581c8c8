//! Runtime tunables (§6 "Policy"), grounded on `allocation_config.rs`'s
//! plain-struct-with-methods style rather than a builder or config crate.

/// `hhCollectionLevel` from the original: how aggressively local collection
/// is allowed to run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CollectionLevel {
    /// Local collection is disabled entirely.
    None,
    /// Ordinary local collection: claim as much local scope as desired.
    Local,
    /// Only ever collect the current depth (never claim more scope),
    /// per §4.5 step 3.
    SuperLocal,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub hh_collection_level: CollectionLevel,
    /// Levels at or below this one are never included in a local
    /// collection's scope (§4.5 step 1).
    pub min_local_level: u32,
    /// Growth factor applied to `collection_threshold` after a collection
    /// that didn't free enough to go back under it.
    pub heap_growth_factor: f64,
    /// Emit `eprintln!` trace lines at each root-enumeration step and the
    /// final size summary, mirroring the original's `Trace0/3`/`LOG`
    /// sinks (§6 "Tracing/logging"). Off by default; tests that assert on
    /// stdout leave it off.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hh_collection_level: CollectionLevel::Local,
            min_local_level: 1,
            heap_growth_factor: 1.5,
            verbose: false,
        }
    }
}

impl Config {
    pub fn new(hh_collection_level: CollectionLevel, min_local_level: u32) -> Self {
        Self {
            hh_collection_level,
            min_local_level,
            ..Default::default()
        }
    }

    /// `HM_HH_nextCollectionThreshold` (§6 Policy): grow the threshold
    /// proportionally to the live size observed after a collection.
    pub fn next_collection_threshold(&self, live_size: usize) -> usize {
        ((live_size as f64) * self.heap_growth_factor).ceil() as usize + HEAP_LIMIT_SLOP_BUFFER
    }
}

const HEAP_LIMIT_SLOP_BUFFER: usize = crate::constants::HEAP_LIMIT_SLOP;
