//! Parallel garbage-collection core for a hierarchical-heap, task-parallel
//! runtime (spec.md §1-§2).
//!
//! Module layout mirrors the dependency order in spec.md §2 "System
//! Overview", leaves first: an atomic work-stealing deque at the bottom,
//! the hierarchical local collector and mutator facade built on top of it,
//! and the classical Cheney two-space collector as a sibling entry point
//! for the shared root heap.

pub mod error;

pub mod address;
pub mod cheney;
pub mod chunk;
pub mod config;
pub mod constants;
pub mod deque;
pub mod forward;
pub mod heap;
pub mod hh_collect;
pub mod invariant;
pub mod local_scope;
pub mod mutator;
pub mod object;
pub mod stats;
pub mod weak;

#[cfg(test)]
mod scenarios;

pub use address::{Address, ObjPtr};
pub use config::{CollectionLevel, Config};
pub use error::Fatal;
pub use heap::{HierarchicalHeap, Thread, Worker};
pub use mutator::{duplicate_world, ensure_assurances, init_vectors, init_world};
pub use stats::CollectionReport;
