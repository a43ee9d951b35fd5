//! Aggressive dead-code elimination.
//!
//! Mark-and-sweep over SSA driven by control dependence. Every
//! possibly-side-effecting instruction is necessary; the worklist then
//! pulls in the definitions of everything a necessary item reads, and the
//! conditional terminators of every block the item's block is
//! control-dependent on (its reverse dominance frontier).
//!
//! The sweep deletes unnecessary phis and straight-line instructions, and
//! rewrites unnecessary conditional branches into unconditional jumps to
//! the nearest necessary post-dominator — the post-dominator-tree parent
//! of the containing block, which must exist at rewrite time.

use std::collections::{HashSet, VecDeque};

use log::debug;

use super::Pass;
use crate::optimizer::analysis::{
    build_ssa_info, Direction, DominanceFrontiers, DominatorTree, DominatorTrees,
};
use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::{
    DefSite, Opcode, Operation, Procedure, Program, Value,
};

/// A marking site: one instruction or one phi, addressed by containing
/// block and index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Site {
    Instruction { block: String, index: usize },
    Phi { block: String, index: usize },
}

#[derive(Debug, Default)]
pub struct DeadCodeEliminationPass {
    necessary: HashSet<Site>,
    visited: HashSet<Site>,
    worklist: VecDeque<Site>,
}

impl Pass for DeadCodeEliminationPass {
    fn apply(&mut self, mut program: Program) -> Result<Program> {
        if !program.is_ssa() {
            return Err(OptimizerError::PreconditionFailed(
                "dead-code elimination requires SSA form".to_string(),
            ));
        }

        debug!("eliminating dead code");

        let pd_trees = DominatorTrees::compute(&program, Direction::PostDominator)?;
        for proc in &mut program.procedures {
            proc.set_ssa_info(build_ssa_info(proc));
            let pd_tree: &DominatorTree = pd_trees.tree(proc.name())?;
            let frontiers = DominanceFrontiers::build(pd_tree, proc)?;
            self.eliminate(proc, pd_tree, &frontiers)?;
        }

        Ok(program)
    }
}

impl DeadCodeEliminationPass {
    fn eliminate(
        &mut self,
        proc: &mut Procedure,
        pd_tree: &DominatorTree,
        frontiers: &DominanceFrontiers,
    ) -> Result<()> {
        self.necessary.clear();
        self.visited.clear();
        self.worklist.clear();

        // anything with a side effect is necessary outright
        for block in proc.ordered_blocks() {
            for (index, inst) in block.instructions.iter().enumerate() {
                if !inst.is_deleted() && inst.has_side_effects() {
                    self.mark(Site::Instruction {
                        block: block.debug_name.clone(),
                        index,
                    });
                }
            }
        }

        while let Some(site) = self.worklist.pop_front() {
            self.visited.insert(site.clone());

            let (block_name, rvalues) = self.site_rvalues(proc, &site)?;

            // the conditional branches this block is control-dependent on
            // decide whether it runs at all
            for dep_block in frontiers.frontier_of(&block_name)? {
                self.mark_terminator(proc, dep_block)?;
            }

            // whatever a necessary item reads must be computed
            for rvalue in rvalues {
                self.mark_definition(proc, &rvalue)?;
            }
        }

        self.sweep(proc, pd_tree)
    }

    /// Containing block and virtual-register rvalues of a site.
    fn site_rvalues(&self, proc: &Procedure, site: &Site) -> Result<(String, Vec<Value>)> {
        match site {
            Site::Instruction { block, index } => {
                let inst = proc
                    .block(block)
                    .and_then(|b| b.instructions.get(*index))
                    .ok_or_else(|| {
                        OptimizerError::lookup("instruction site in block", block.clone())
                    })?;
                let rvalues = inst
                    .operation
                    .rvalues
                    .iter()
                    .filter(|v| v.is_virtual_reg())
                    .cloned()
                    .collect();
                Ok((block.clone(), rvalues))
            }
            Site::Phi { block, index } => {
                let phi = proc
                    .block(block)
                    .and_then(|b| b.phinodes.get(*index))
                    .ok_or_else(|| {
                        OptimizerError::lookup("phi site in block", block.clone())
                    })?;
                let rvalues = phi
                    .rvalue_map()
                    .values()
                    .filter(|v| v.is_virtual_reg())
                    .cloned()
                    .collect();
                Ok((block.clone(), rvalues))
            }
        }
    }

    fn mark(&mut self, site: Site) {
        if self.necessary.insert(site.clone()) && !self.visited.contains(&site) {
            self.worklist.push_back(site);
        }
    }

    /// The conditional terminator of a control-dependence source is
    /// necessary.
    fn mark_terminator(&mut self, proc: &Procedure, block_name: &str) -> Result<()> {
        let block = proc
            .block(block_name)
            .ok_or_else(|| OptimizerError::lookup("block", block_name))?;
        if let Some((index, terminator)) = block.terminator() {
            if terminator.operation.opcode.is_conditional_branch() {
                self.mark(Site::Instruction {
                    block: block_name.to_string(),
                    index,
                });
            }
        }
        Ok(())
    }

    fn mark_definition(&mut self, proc: &Procedure, rvalue: &Value) -> Result<()> {
        if rvalue.subscript().is_empty() {
            // never defined along this path; nothing to keep
            return Ok(());
        }
        let def = proc
            .ssa_info()
            .definitions
            .get(&rvalue.full_text())
            .ok_or_else(|| OptimizerError::lookup("definition of", rvalue.full_text()))?;
        match def {
            DefSite::Instruction { block, index } => self.mark(Site::Instruction {
                block: block.clone(),
                index: *index,
            }),
            DefSite::Phi { block, index } => self.mark(Site::Phi {
                block: block.clone(),
                index: *index,
            }),
            DefSite::Predefined { .. } => {}
        }
        Ok(())
    }

    fn sweep(&mut self, proc: &mut Procedure, pd_tree: &DominatorTree) -> Result<()> {
        let mut deleted = 0usize;
        let mut rewritten = 0usize;

        for block_name in proc.ordered_block_names() {
            // find the jump target first; the mutable sweep below can't
            // hold the tree lookup open
            let parent_of_block: Option<String> =
                pd_tree.find_parent_of(&block_name).ok().map(String::from);

            let block = proc
                .block_mut(&block_name)
                .expect("ordered names are present");

            for index in 0..block.instructions.len() {
                let site = Site::Instruction {
                    block: block_name.clone(),
                    index,
                };
                if self.necessary.contains(&site) {
                    continue;
                }
                let inst = &mut block.instructions[index];
                if inst.is_deleted() {
                    continue;
                }

                if inst.operation.opcode.is_conditional_branch() {
                    // the branch decides nothing anyone needs: jump
                    // straight to the nearest necessary post-dominator
                    let target = parent_of_block.clone().ok_or_else(|| {
                        OptimizerError::lookup("post-dominator tree parent of", block_name.clone())
                    })?;
                    let mut op = Operation::new(Opcode::Jumpi);
                    op.arrow = "->".to_string();
                    op.lvalues.push(Value::label(target));
                    inst.operation = op;
                    rewritten += 1;
                } else if inst.label.is_none() {
                    // labelled instructions stay; deleting one would lose
                    // the block entry point
                    inst.mark_deleted();
                    deleted += 1;
                }
            }

            for index in 0..block.phinodes.len() {
                let site = Site::Phi {
                    block: block_name.clone(),
                    index,
                };
                if !self.necessary.contains(&site) {
                    block.phinodes[index].mark_deleted();
                }
            }
        }

        debug!(
            "dead-code elimination in `{}`: {deleted} deleted, {rewritten} branch(es) rewritten",
            proc.name()
        );
        Ok(())
    }
}
