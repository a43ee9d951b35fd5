//! Pass selection and orchestration.
//!
//! The pass string selects from `{l, s, d, r}` — local value numbering,
//! SSA construction, dead-code elimination, register allocation — and the
//! characters run in the given order (default `lsdr`). Register-behavior
//! inference always runs first. If the program ends up in SSA form and
//! register allocation was not selected, the normal-form pass translates
//! the phis back into copies so the emitted text is executable ILOC.

use log::info;
use serde::{Deserialize, Serialize};

use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::Program;
use crate::optimizer::passes::{
    DeadCodeEliminationPass, LvnPass, NormalFormPass, Pass, RegisterAllocationPass,
    RegisterBehaviorPass, SsaConstructionPass,
};

/// One selectable pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Lvn,
    Ssa,
    DeadCode,
    RegAlloc,
}

impl PassKind {
    fn from_char(c: char) -> Option<PassKind> {
        match c {
            'l' => Some(PassKind::Lvn),
            's' => Some(PassKind::Ssa),
            'd' => Some(PassKind::DeadCode),
            'r' => Some(PassKind::RegAlloc),
            _ => None,
        }
    }
}

/// A validated pass selection.
#[derive(Debug, Clone)]
pub struct PassSelection {
    passes: Vec<PassKind>,
    text: String,
}

impl Default for PassSelection {
    fn default() -> Self {
        PassSelection::parse("lsdr").expect("default selection is valid")
    }
}

impl PassSelection {
    /// Parse a pass string. Unknown characters are a usage error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut passes = Vec::new();
        for c in text.chars() {
            let kind = PassKind::from_char(c).ok_or_else(|| {
                OptimizerError::UnsupportedOperation(format!(
                    "unknown pass selector `{c}` (expected characters from {{l, s, d, r}})"
                ))
            })?;
            passes.push(kind);
        }
        Ok(PassSelection {
            passes,
            text: text.to_string(),
        })
    }

    pub fn passes(&self) -> &[PassKind] {
        &self.passes
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Statistics collected over one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub passes_run: String,
    pub procedures: usize,
    pub blocks: usize,
    pub instructions_total: usize,
    pub instructions_deleted: usize,
    pub phi_nodes: usize,
    pub spills: usize,
    pub allocator_rounds: u32,
}

/// Run the selected passes over a program.
pub fn run(program: Program, selection: &PassSelection) -> Result<(Program, PipelineStats)> {
    let mut stats = PipelineStats {
        passes_run: selection.as_str().to_string(),
        ..PipelineStats::default()
    };

    let mut program = RegisterBehaviorPass.apply(program)?;

    for kind in selection.passes() {
        program = match kind {
            PassKind::Lvn => {
                info!("running local value numbering");
                LvnPass::default().apply(program)?
            }
            PassKind::Ssa => {
                info!("running SSA construction");
                SsaConstructionPass.apply(program)?
            }
            PassKind::DeadCode => {
                info!("running dead-code elimination");
                DeadCodeEliminationPass::default().apply(program)?
            }
            PassKind::RegAlloc => {
                info!("running register allocation");
                let mut pass = RegisterAllocationPass::default();
                program = pass.apply(program)?;
                stats.spills = pass.spill_count;
                stats.allocator_rounds = pass.iterations;
                program
            }
        };
    }

    if program.is_ssa() && !selection.passes().contains(&PassKind::RegAlloc) {
        info!("running normal-form translation");
        program = NormalFormPass.apply(program)?;
    }

    stats.procedures = program.procedures.len();
    for proc in &program.procedures {
        stats.blocks += proc.block_count();
        for block in proc.ordered_blocks() {
            stats.instructions_total += block.instructions.len();
            stats.instructions_deleted += block
                .instructions
                .iter()
                .filter(|inst| inst.is_deleted())
                .count();
            stats.phi_nodes += block.phinodes.len();
        }
    }

    Ok((program, stats))
}
