//! Structural analyses over the IR.
//!
//! Each analysis is built from a program (or a single procedure) and then
//! queried by block or value name. Analyses never mutate the program; a
//! pass that rewrites the IR rebuilds the analyses it consumes.

mod dominators;
mod frontiers;
mod interference;
mod live_ranges;
mod liveness;
mod ssa_info;

pub use dominators::{Direction, DominatorTree, DominatorTrees};
pub use frontiers::DominanceFrontiers;
pub use interference::{InterferenceGraph, InterferenceNode, NUM_COLORS, RESERVED_COLORS};
pub use live_ranges::{LiveRange, LiveRanges};
pub use liveness::{DataFlowSets, LiveVariables, NameKey, SsaKey, ValueKey};
pub use ssa_info::build_ssa_info;
