//! Transformation passes.
//!
//! Every pass shares one contract: take the program by value, return the
//! transformed program. The input is consumed; returning it allows
//! chaining without aliasing. A pass that requires SSA form checks the
//! program flag and fails with `PreconditionFailed` otherwise.

mod dce;
mod lvn;
mod normal_form;
mod regalloc;
mod register_behavior;
mod ssa;

pub use dce::DeadCodeEliminationPass;
pub use lvn::LvnPass;
pub use normal_form::NormalFormPass;
pub use regalloc::RegisterAllocationPass;
pub use register_behavior::RegisterBehaviorPass;
pub use ssa::SsaConstructionPass;

use crate::optimizer::error::Result;
use crate::optimizer::ir::Program;

/// The pass contract.
pub trait Pass {
    /// Transform the program.
    fn apply(&mut self, program: Program) -> Result<Program>;
}
