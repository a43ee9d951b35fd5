//! Live-variable analysis.
//!
//! Backward, may, union-meet dataflow per procedure:
//!
//! - `gen(b)`: virtual registers read before any local write
//! - `not_prsv(b)`: virtual registers written in the block
//! - `out(b) = ⋃ in(s)` over successors
//! - `in(b) = gen(b) ∪ (out(b) \ not_prsv(b))`
//!
//! The same algorithm runs with two value equivalences: SSA-aware (full
//! text, subscript included) for interference construction, and name-only
//! for phi placement, where subscripts do not exist yet. The equivalence
//! is a type parameter rather than a second copy of the code; sets are
//! maps keyed by the chosen key so membership, difference, and the
//! fixed-point "changed" test are all exact and ordered.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;

use log::debug;

use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::ENTRY_BLOCK;
use crate::optimizer::ir::{Procedure, Program, Value};

/// The equivalence used for set membership.
pub trait ValueKey {
    fn key(value: &Value) -> String;
}

/// Full-text equivalence: `%vr4_2` and `%vr4_3` are distinct.
#[derive(Debug, Clone, Copy)]
pub struct SsaKey;

impl ValueKey for SsaKey {
    fn key(value: &Value) -> String {
        value.full_text()
    }
}

/// Name-only equivalence: every SSA version of `%vr4` is the same variable.
#[derive(Debug, Clone, Copy)]
pub struct NameKey;

impl ValueKey for NameKey {
    fn key(value: &Value) -> String {
        value.name().to_string()
    }
}

/// One key-sorted value set.
pub type ValueSet = BTreeMap<String, Value>;

/// The four dataflow sets of one block.
#[derive(Debug, Clone, Default)]
pub struct DataFlowSets {
    pub gen: ValueSet,
    pub not_prsv: ValueSet,
    pub in_set: ValueSet,
    pub out_set: ValueSet,
}

/// Live-variable solution for every block of every procedure.
#[derive(Debug, Clone)]
pub struct LiveVariables<K: ValueKey> {
    sets: HashMap<String, BTreeMap<String, DataFlowSets>>,
    _equivalence: PhantomData<K>,
}

impl<K: ValueKey> LiveVariables<K> {
    pub fn compute(program: &Program) -> Result<Self> {
        let mut lv = LiveVariables {
            sets: HashMap::new(),
            _equivalence: PhantomData,
        };
        for proc in &program.procedures {
            lv.analyze_procedure(proc)?;
        }
        Ok(lv)
    }

    pub fn block_sets(&self, proc_name: &str, block_name: &str) -> Result<&DataFlowSets> {
        self.sets
            .get(proc_name)
            .and_then(|blocks| blocks.get(block_name))
            .ok_or_else(|| OptimizerError::lookup("live-variable sets for block", block_name))
    }

    fn analyze_procedure(&mut self, proc: &Procedure) -> Result<()> {
        // depth-first visit order rooted at entry, so predecessors of an
        // unvisited block don't starve the fixed point
        let visit_order = depth_first_order(proc)?;

        let mut sets: BTreeMap<String, DataFlowSets> = BTreeMap::new();
        for name in proc.ordered_block_names() {
            let block = proc
                .block(&name)
                .ok_or_else(|| OptimizerError::lookup("block", name.clone()))?;
            let mut block_sets = DataFlowSets::default();
            compute_local_sets::<K>(block, &mut block_sets);
            sets.insert(name, block_sets);
        }

        let mut iterations = 0u32;
        let mut dirty = true;
        while dirty {
            dirty = false;
            iterations += 1;

            for name in &visit_order {
                let block = proc
                    .block(name)
                    .ok_or_else(|| OptimizerError::lookup("block", name.clone()))?;

                let mut out_set = ValueSet::new();
                for successor in &block.after {
                    if let Some(succ_sets) = sets.get(successor) {
                        for (key, value) in &succ_sets.in_set {
                            out_set.entry(key.clone()).or_insert_with(|| value.clone());
                        }
                    }
                }

                let current = sets.get(name).expect("initialized above");
                let mut in_set = current.gen.clone();
                for (key, value) in &out_set {
                    if !current.not_prsv.contains_key(key) {
                        in_set.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }

                let current = sets.get_mut(name).expect("initialized above");
                if current.in_set != in_set || current.out_set != out_set {
                    current.in_set = in_set;
                    current.out_set = out_set;
                    dirty = true;
                }
            }
        }

        debug!(
            "live variables for `{}` converged after {iterations} iteration(s)",
            proc.name()
        );

        self.sets.insert(proc.name().to_string(), sets);
        Ok(())
    }
}

fn compute_local_sets<K: ValueKey>(
    block: &crate::optimizer::ir::BasicBlock,
    sets: &mut DataFlowSets,
) {
    for inst in &block.instructions {
        if inst.is_deleted() {
            continue;
        }
        for rval in &inst.operation.rvalues {
            if rval.is_virtual_reg() {
                let key = K::key(rval);
                if !sets.not_prsv.contains_key(&key) {
                    sets.gen.entry(key).or_insert_with(|| rval.clone());
                }
            }
        }
        for lval in &inst.operation.lvalues {
            if lval.is_virtual_reg() {
                sets.not_prsv
                    .entry(K::key(lval))
                    .or_insert_with(|| lval.clone());
            }
        }
    }
}

/// Blocks in the order the fixed point visits them: the reverse of a
/// depth-first discovery stack from entry, successors pushed in edge
/// order. Unreachable blocks go last, in block order.
fn depth_first_order(proc: &Procedure) -> Result<Vec<String>> {
    let mut discovery: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack = vec![ENTRY_BLOCK.to_string()];
    visited.insert(ENTRY_BLOCK.to_string());

    while let Some(name) = stack.pop() {
        let block = proc
            .block(&name)
            .ok_or_else(|| OptimizerError::lookup("block", name.clone()))?;
        discovery.push(name);
        for successor in &block.after {
            if visited.insert(successor.clone()) {
                stack.push(successor.clone());
            }
        }
    }

    let mut order: Vec<String> = discovery.into_iter().rev().collect();
    for name in proc.ordered_block_names() {
        if !visited.contains(&name) {
            order.push(name);
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::parser::parse_program;

    #[test]
    fn straight_line_gen_and_kill() {
        let source = "\
.frame main, 0
\tadd %vr4, %vr5 => %vr6
\tiwrite %vr6
\tret
";
        let program = parse_program(source).unwrap();
        let lv = LiveVariables::<SsaKey>::compute(&program).unwrap();
        let sets = lv.block_sets("main", "entry").unwrap();

        assert!(sets.gen.contains_key("%vr4"));
        assert!(sets.gen.contains_key("%vr5"));
        assert!(!sets.gen.contains_key("%vr6"));
        assert!(sets.not_prsv.contains_key("%vr6"));
        assert!(sets.in_set.contains_key("%vr4"));
        assert!(sets.out_set.is_empty());
    }

    #[test]
    fn loop_carries_liveness_around_back_edge() {
        let source = "\
.frame main, 0
\tloadI 0 => %vr4
\tloadI 10 => %vr5
.L1:\tcmp_lt %vr4, %vr5 => %vr6
\tcbr %vr6 -> .L2, .L3
.L2:\taddi %vr4, 1 => %vr4
\tjumpI -> .L1
.L3:\tiwrite %vr4
\tret
";
        let program = parse_program(source).unwrap();
        let lv = LiveVariables::<NameKey>::compute(&program).unwrap();

        // the induction variable is live into the loop header from both
        // the preheader and the latch
        let header = lv.block_sets("main", ".L1").unwrap();
        assert!(header.in_set.contains_key("%vr4"));
        assert!(header.in_set.contains_key("%vr5"));

        let latch = lv.block_sets("main", ".L2").unwrap();
        assert!(latch.out_set.contains_key("%vr4"));
    }
}
