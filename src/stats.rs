//! Cumulative and per-collection statistics, grounded on
//! `statistics.rs::HeapStatistics`'s `Display`-for-humans style.

use std::fmt;

/// Counters threaded through one `collect_local` invocation
/// (`ForwardArgs` in spec.md §3).
#[derive(Clone, Copy, Default, Debug)]
pub struct ForwardCounters {
    pub bytes_copied: usize,
    pub objects_copied: u64,
    pub bytes_moved: usize,
    pub objects_moved: u64,
    pub stacks_copied: u64,
}

/// Per-level size delta, used for the before/after logging that
/// `hierarchical-heap-collection.c` does under `LOG(LM_HH_COLLECTION,
/// LL_INFO, ...)`.
#[derive(Clone, Copy, Debug)]
pub struct LevelDelta {
    pub level: u32,
    pub before: usize,
    pub after: usize,
}

/// Returned by `collect_local` so callers and tests can observe what a
/// collection actually did without reaching into private state.
#[derive(Clone, Debug, Default)]
pub struct CollectionReport {
    pub counters: ForwardCounters,
    pub bytes_survived: usize,
    pub min_level: u32,
    pub max_level: u32,
    pub level_deltas: Vec<LevelDelta>,
}

/// Cumulative statistics for one worker's lifetime
/// (`s->cumulativeStatistics` in the original).
#[derive(Clone, Default, Debug)]
pub struct CumulativeStatistics {
    pub num_hh_local_gcs: u64,
    pub bytes_hh_localed: usize,
    pub bytes_allocated: usize,
    pub num_copying_gcs: u64,
    pub bytes_copied_major: usize,
    pub num_minor_gcs: u64,
    pub bytes_copied_minor: usize,
}

impl CumulativeStatistics {
    pub fn record_local_collection(&mut self, report: &CollectionReport) {
        self.num_hh_local_gcs += 1;
        self.bytes_hh_localed += report.counters.bytes_copied;
    }
}

impl fmt::Display for CumulativeStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hierarchical heap statistics:")?;
        writeln!(f, "  Local collections run:    {}", self.num_hh_local_gcs)?;
        writeln!(f, "  Bytes localed (copied):   {}", self.bytes_hh_localed)?;
        writeln!(f, "  Bytes allocated (total):  {}", self.bytes_allocated)?;
        writeln!(f, "  Major copying GCs:        {}", self.num_copying_gcs)?;
        writeln!(f, "  Bytes copied (major):     {}", self.bytes_copied_major)?;
        writeln!(f, "  Minor GCs:                {}", self.num_minor_gcs)?;
        writeln!(f, "  Bytes copied (minor):     {}", self.bytes_copied_minor)
    }
}
