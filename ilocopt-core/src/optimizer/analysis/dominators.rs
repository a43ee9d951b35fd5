//! Dominator and post-dominator analysis.
//!
//! Dominator sets come from the classic iterative algorithm:
//! `Dom(root) = {root}`, `Dom(b) = all_blocks` elsewhere, then iterate
//! `Dom(b) = {b} ∪ ⋂ Dom(p)` over predecessors (or successors, in
//! post-dominator mode) until nothing changes. Sets are bit vectors
//! indexed by each block's position in procedure order, so "changed" is
//! exact and iteration order never leaks into results.
//!
//! The tree is recovered from the sets: a block's immediate dominator is
//! the member of its dominator set (other than itself) with the largest
//! own dominator set. Ties cannot occur by construction.

use std::collections::BTreeMap;

use bitvec::prelude::*;
use log::{log_enabled, trace, Level};

use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::ENTRY_BLOCK;
use crate::optimizer::ir::{Procedure, Program};

/// Which relation to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Rooted at `entry`, edges follow `before`.
    Dominator,
    /// Rooted at the exit block, edges follow `after`.
    PostDominator,
}

/// The dominator (or post-dominator) tree of a single procedure.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    direction: Direction,
    root: String,
    parent: BTreeMap<String, Option<String>>,
    children: BTreeMap<String, Vec<String>>,
}

impl DominatorTree {
    /// Build the tree for one procedure. Single-block procedures bypass
    /// the fixed point and produce a singleton tree.
    pub fn build(proc: &Procedure, direction: Direction) -> Result<Self> {
        let root = match direction {
            Direction::Dominator => ENTRY_BLOCK.to_string(),
            Direction::PostDominator => {
                let name = proc.exit_block_name();
                if name.is_empty() {
                    return Err(OptimizerError::PreconditionFailed(format!(
                        "procedure `{}` has no exit block",
                        proc.name()
                    )));
                }
                name.to_string()
            }
        };

        if proc.block_count() == 1 {
            let only = proc
                .ordered_blocks()
                .first()
                .map(|b| b.debug_name.clone())
                .expect("non-empty procedure");
            let mut parent = BTreeMap::new();
            parent.insert(only.clone(), None);
            let mut children = BTreeMap::new();
            children.insert(only.clone(), Vec::new());
            return Ok(DominatorTree {
                direction,
                root: only,
                parent,
                children,
            });
        }

        let order = proc.ordered_block_names();
        let index: BTreeMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        let n = order.len();

        let root_idx = *index.get(root.as_str()).ok_or_else(|| {
            OptimizerError::lookup("block", root.clone())
        })?;

        // iterate to the fixed point
        let mut dom: Vec<BitVec> = (0..n)
            .map(|i| {
                if i == root_idx {
                    let mut set = bitvec![0; n];
                    set.set(i, true);
                    set
                } else {
                    bitvec![1; n]
                }
            })
            .collect();

        let mut dirty = true;
        while dirty {
            dirty = false;
            for (i, name) in order.iter().enumerate() {
                if i == root_idx {
                    continue;
                }
                let block = proc
                    .block(name)
                    .ok_or_else(|| OptimizerError::lookup("block", name.clone()))?;
                let neighbors = match direction {
                    Direction::Dominator => &block.before,
                    Direction::PostDominator => &block.after,
                };

                let mut next = bitvec![1; n];
                for nb in neighbors {
                    if let Some(&j) = index.get(nb.as_str()) {
                        next &= dom[j].as_bitslice();
                    }
                }
                next.set(i, true);

                if next != dom[i] {
                    dom[i] = next;
                    dirty = true;
                }
            }
        }

        // immediate dominator: the strict dominator with the most
        // dominators of its own
        let mut parent: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in &order {
            parent.insert(name.clone(), None);
            children.insert(name.clone(), Vec::new());
        }

        for (i, name) in order.iter().enumerate() {
            if i == root_idx {
                continue;
            }
            let mut most = 0usize;
            let mut idom: Option<usize> = None;
            for j in dom[i].iter_ones() {
                if j == i {
                    continue;
                }
                let count = dom[j].count_ones();
                if count > most {
                    most = count;
                    idom = Some(j);
                }
            }
            if let Some(j) = idom {
                parent.insert(name.clone(), Some(order[j].clone()));
                children.get_mut(&order[j]).expect("initialized").push(name.clone());
            }
        }

        // child lists follow block order already (insertion order above)

        Ok(DominatorTree {
            direction,
            root,
            parent,
            children,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parent.contains_key(name)
    }

    pub fn children_of(&self, name: &str) -> &[String] {
        self.children.get(name).map_or(&[], Vec::as_slice)
    }

    /// The tree parent (immediate dominator) of `name`.
    pub fn find_parent_of(&self, name: &str) -> Result<&str> {
        self.parent
            .get(name)
            .ok_or_else(|| OptimizerError::lookup("block", name))?
            .as_deref()
            .ok_or_else(|| OptimizerError::lookup("dominator tree parent of", name))
    }

    /// Does `a` dominate `b` (reflexively)?
    pub fn dominates(&self, a: &str, b: &str) -> bool {
        let mut cursor = Some(b);
        while let Some(name) = cursor {
            if name == a {
                return true;
            }
            cursor = self.parent.get(name).and_then(|p| p.as_deref());
        }
        false
    }

    pub fn strictly_dominates(&self, a: &str, b: &str) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Block names in preorder, children in block order.
    pub fn preorder(&self) -> Vec<String> {
        let mut list = Vec::with_capacity(self.parent.len());
        self.walk_preorder(&self.root, &mut list);
        list
    }

    fn walk_preorder(&self, name: &str, list: &mut Vec<String>) {
        list.push(name.to_string());
        for child in self.children_of(name) {
            self.walk_preorder(child, list);
        }
    }
}

/// Trees for every procedure in a program, keyed by procedure name.
#[derive(Debug, Clone)]
pub struct DominatorTrees {
    direction: Direction,
    trees: BTreeMap<String, DominatorTree>,
}

impl DominatorTrees {
    pub fn compute(program: &Program, direction: Direction) -> Result<Self> {
        let mut trees = BTreeMap::new();
        for proc in &program.procedures {
            let tree = DominatorTree::build(proc, direction)?;
            if log_enabled!(Level::Trace) {
                trace!(
                    "{:?} tree for `{}`: {:?}",
                    direction,
                    proc.name(),
                    tree.preorder()
                );
            }
            trees.insert(proc.name().to_string(), tree);
        }
        Ok(DominatorTrees { direction, trees })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn tree(&self, proc_name: &str) -> Result<&DominatorTree> {
        self.trees
            .get(proc_name)
            .ok_or_else(|| OptimizerError::lookup("dominator tree", proc_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::parser::parse_program;

    const DIAMOND: &str = "\
.frame main, 0
\tloadI 1 => %vr4
\tcbr_lt %vr4 -> .L1, .L2
.L1:\taddi %vr4, 1 => %vr5
\tjumpI -> .L3
.L2:\taddi %vr4, 2 => %vr5
\tjumpI -> .L3
.L3:\tiwrite %vr5
\tret
";

    #[test]
    fn diamond_dominators() {
        let program = parse_program(DIAMOND).unwrap();
        let tree = DominatorTree::build(&program.procedures[0], Direction::Dominator).unwrap();

        assert_eq!(tree.root(), "entry");
        assert_eq!(tree.find_parent_of(".L1").unwrap(), "entry");
        assert_eq!(tree.find_parent_of(".L2").unwrap(), "entry");
        assert_eq!(tree.find_parent_of(".L3").unwrap(), "entry");
        assert!(tree.dominates("entry", ".L3"));
        assert!(!tree.strictly_dominates(".L1", ".L3"));
    }

    #[test]
    fn diamond_postdominators() {
        let program = parse_program(DIAMOND).unwrap();
        let tree =
            DominatorTree::build(&program.procedures[0], Direction::PostDominator).unwrap();

        assert_eq!(tree.root(), ".L3");
        assert_eq!(tree.find_parent_of(".L1").unwrap(), ".L3");
        assert_eq!(tree.find_parent_of(".L2").unwrap(), ".L3");
        assert_eq!(tree.find_parent_of("entry").unwrap(), ".L3");
    }

    #[test]
    fn single_block_tree_is_singleton() {
        let program = parse_program(".frame main, 0\n\tret\n").unwrap();
        let tree = DominatorTree::build(&program.procedures[0], Direction::Dominator).unwrap();
        assert_eq!(tree.preorder(), vec!["entry".to_string()]);
        assert!(tree.find_parent_of("entry").is_err());
    }
}
