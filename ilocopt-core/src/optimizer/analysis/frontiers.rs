//! Dominance frontiers.
//!
//! Computed in one post-order walk of the dominator tree. For a node `n`,
//! `DF(n)` collects every CFG neighbor `m` (successor in dominator mode,
//! predecessor in post-dominator mode) that `n` does not strictly
//! dominate, plus every block propagated up from a child that `n` does not
//! strictly dominate either.
//!
//! Built on the post-dominator tree this yields reverse dominance
//! frontiers — the control-dependence relation dead-code elimination
//! walks.

use std::collections::{BTreeMap, BTreeSet};

use super::dominators::{Direction, DominatorTree};
use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::Procedure;

/// Frontier sets for every block of one procedure.
#[derive(Debug, Clone)]
pub struct DominanceFrontiers {
    frontiers: BTreeMap<String, BTreeSet<String>>,
}

impl DominanceFrontiers {
    pub fn build(tree: &DominatorTree, proc: &Procedure) -> Result<Self> {
        let mut frontiers = DominanceFrontiers {
            frontiers: BTreeMap::new(),
        };
        frontiers.walk(tree.root(), tree, proc)?;
        Ok(frontiers)
    }

    pub fn frontier_of(&self, block_name: &str) -> Result<&BTreeSet<String>> {
        self.frontiers
            .get(block_name)
            .ok_or_else(|| OptimizerError::lookup("dominance frontier for block", block_name))
    }

    fn walk(&mut self, name: &str, tree: &DominatorTree, proc: &Procedure) -> Result<()> {
        // children first
        for child in tree.children_of(name) {
            self.walk(child, tree, proc)?;
        }

        let mut frontier = BTreeSet::new();

        for child in tree.children_of(name) {
            let child_frontier = self
                .frontiers
                .get(child)
                .expect("children visited before parent");
            for block in child_frontier {
                if !tree.strictly_dominates(name, block) {
                    frontier.insert(block.clone());
                }
            }
        }

        let block = proc
            .block(name)
            .ok_or_else(|| OptimizerError::lookup("block", name))?;
        let neighbors = match tree.direction() {
            Direction::Dominator => &block.after,
            Direction::PostDominator => &block.before,
        };
        for neighbor in neighbors {
            if !tree.strictly_dominates(name, neighbor) {
                frontier.insert(neighbor.clone());
            }
        }

        self.frontiers.insert(name.to_string(), frontier);
        Ok(())
    }
}
