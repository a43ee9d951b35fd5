//! Chaitin-Briggs register allocation with iterated spilling.
//!
//! Each round rebuilds uses/definitions, live ranges, SSA-aware liveness,
//! and the interference graph, colours with `k = 8` (colours 0..3 pinned
//! to `%vr0..%vr3`), and rewrites the IR for every range that failed to
//! colour: a fresh 4-byte frame slot, a `storeai` after each definition,
//! and a `loadai` before each use. Ranges spilled in an earlier round
//! carry infinite spill cost so they are never picked again, which bounds
//! the iteration count by the number of distinct ranges.
//!
//! Formal arguments are call-by-reference: a spilled argument is stored at
//! procedure entry, and reloaded in every predecessor of the exit block so
//! the caller observes its final value.
//!
//! After convergence every virtual-register operand `%vrN_s` is renamed to
//! `%vrC`, where `C` is its range's colour; the old full text moves into
//! the subscript so the debug rendition stays unambiguous.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use super::Pass;
use crate::optimizer::analysis::{
    build_ssa_info, InterferenceGraph, LiveRanges, LiveVariables, SsaKey, NUM_COLORS,
};
use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::ENTRY_BLOCK;
use crate::optimizer::ir::{
    Behavior, Instruction, Opcode, Operation, Procedure, Program, Value, ValueType,
};

/// Bytes per spill slot.
const SPILL_SLOT_BYTES: i64 = 4;

#[derive(Debug, Default)]
pub struct RegisterAllocationPass {
    /// Number of colour-spill rounds the last run took.
    pub iterations: u32,
    /// Total ranges spilled over the whole run.
    pub spill_count: usize,
}

impl Pass for RegisterAllocationPass {
    fn apply(&mut self, mut program: Program) -> Result<Program> {
        if !program.is_ssa() {
            return Err(OptimizerError::PreconditionFailed(
                "register allocation requires SSA form".to_string(),
            ));
        }

        debug!("allocating registers (k = {NUM_COLORS})");

        // per-procedure state that survives across rounds
        let mut spilled: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut offsets: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        let mut dirty: BTreeMap<String, bool> = BTreeMap::new();
        for proc in &program.procedures {
            spilled.insert(proc.name().to_string(), BTreeSet::new());
            offsets.insert(proc.name().to_string(), BTreeMap::new());
            dirty.insert(proc.name().to_string(), true);
        }

        self.iterations = 0;
        self.spill_count = 0;

        // the infinite-cost flags make each range spillable at most once,
        // so the round count is bounded by the range count
        let mut max_rounds: u32 = 1;
        for proc in &program.procedures {
            max_rounds += build_ssa_info(proc).definitions.len() as u32;
        }

        loop {
            self.iterations += 1;
            if self.iterations > max_rounds {
                return Err(OptimizerError::PreconditionFailed(
                    "register allocation failed to converge".to_string(),
                ));
            }

            for proc in &mut program.procedures {
                proc.set_ssa_info(build_ssa_info(proc));
            }
            let liveness = LiveVariables::<SsaKey>::compute(&program)?;

            let mut any_spilled = false;
            for proc in &mut program.procedures {
                let proc_name = proc.name().to_string();
                if !dirty[&proc_name] {
                    continue;
                }

                let ranges = LiveRanges::compute(proc, proc.ssa_info())?;
                let mut graph = InterferenceGraph::build(
                    proc,
                    &ranges,
                    &liveness,
                    proc.ssa_info(),
                    &spilled[&proc_name],
                )?;
                graph.color(NUM_COLORS)?;

                let newly_spilled = spill_rewrite(
                    proc,
                    &graph,
                    &ranges,
                    spilled.get_mut(&proc_name).expect("initialized"),
                    offsets.get_mut(&proc_name).expect("initialized"),
                )?;

                self.spill_count += newly_spilled;
                let proc_dirty = newly_spilled > 0;
                dirty.insert(proc_name, proc_dirty);
                any_spilled |= proc_dirty;
            }

            if !any_spilled {
                break;
            }
        }

        debug!(
            "register allocation converged after {} round(s), {} spill(s)",
            self.iterations, self.spill_count
        );

        // final colouring over the converged program, then the rename
        for proc in &mut program.procedures {
            proc.set_ssa_info(build_ssa_info(proc));
        }
        let liveness = LiveVariables::<SsaKey>::compute(&program)?;
        for proc in &mut program.procedures {
            let proc_name = proc.name().to_string();
            let ranges = LiveRanges::compute(proc, proc.ssa_info())?;
            let mut graph = InterferenceGraph::build(
                proc,
                &ranges,
                &liveness,
                proc.ssa_info(),
                &spilled[&proc_name],
            )?;
            graph.color(NUM_COLORS)?;
            remap_to_colors(proc, &graph, &ranges)?;
        }

        Ok(program)
    }
}

/// Insert spill code for every uncoloured range that has not been spilled
/// before. Returns how many ranges were newly spilled.
fn spill_rewrite(
    proc: &mut Procedure,
    graph: &InterferenceGraph,
    ranges: &LiveRanges,
    spilled: &mut BTreeSet<String>,
    offsets: &mut BTreeMap<String, i64>,
) -> Result<usize> {
    // the ranges this round actually spills
    let mut targets: BTreeSet<String> = BTreeSet::new();
    for name in graph.uncolored() {
        if !spilled.contains(&name) {
            targets.insert(name);
        }
    }
    if targets.is_empty() {
        return Ok(0);
    }

    for name in &targets {
        allocate_slot(proc, offsets, name);
        debug!(
            "spilling {} in `{}` at offset -{}",
            name,
            proc.name(),
            offsets[name]
        );
    }

    // call-by-reference arguments: store on entry, reload before returning
    let spilled_args: Vec<Value> = proc
        .frame
        .arguments
        .iter()
        .filter(|arg| {
            ranges
                .range_of_value(arg)
                .map(|r| targets.contains(&r.name))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    for arg in &spilled_args {
        let offset = range_offset(ranges, offsets, arg)?;
        let store = make_store(arg.clone(), offset);
        let entry = proc
            .block_mut(ENTRY_BLOCK)
            .ok_or_else(|| OptimizerError::lookup("block", ENTRY_BLOCK))?;
        entry.instructions.insert(0, store);
    }

    // store after every non-load-immediate definition
    for block_name in proc.ordered_block_names() {
        let block = proc
            .block_mut(&block_name)
            .expect("ordered names are present");
        let mut rewritten: Vec<Instruction> = Vec::with_capacity(block.instructions.len());
        for inst in block.instructions.drain(..) {
            let deleted = inst.is_deleted();
            let is_loadi = inst.operation.opcode == Opcode::Loadi;
            let lvalues: Vec<Value> = inst
                .operation
                .lvalues
                .iter()
                .filter(|v| v.is_virtual_reg())
                .cloned()
                .collect();
            rewritten.push(inst);
            if deleted || is_loadi {
                continue;
            }
            for lval in lvalues {
                if let Ok(range) = ranges.range_of_value(&lval) {
                    if targets.contains(&range.name) {
                        let offset = *offsets.get(&range.name).expect("slot allocated above");
                        rewritten.push(make_store(lval, offset));
                    }
                }
            }
        }
        block.instructions = rewritten;
    }

    // load before every use, except inside the spill stores themselves
    for block_name in proc.ordered_block_names() {
        let block = proc
            .block_mut(&block_name)
            .expect("ordered names are present");
        let mut rewritten: Vec<Instruction> = Vec::with_capacity(block.instructions.len());
        for inst in block.instructions.drain(..) {
            let reload_exempt =
                inst.is_deleted() || inst.operation.opcode == Opcode::Storeai;
            if !reload_exempt {
                for rval in &inst.operation.rvalues {
                    if !rval.is_virtual_reg() {
                        continue;
                    }
                    if let Ok(range) = ranges.range_of_value(rval) {
                        if targets.contains(&range.name) {
                            let offset =
                                *offsets.get(&range.name).expect("slot allocated above");
                            rewritten.push(make_load(rval.clone(), offset));
                        }
                    }
                }
            }
            rewritten.push(inst);
        }
        block.instructions = rewritten;
    }

    // call-by-reference arguments: the caller reads the register after the
    // call, so every path to the return restores it from the slot
    if !spilled_args.is_empty() {
        let exit_name = proc.exit_block_name().to_string();
        let exit_preds: Vec<String> = proc
            .block(&exit_name)
            .ok_or_else(|| OptimizerError::lookup("block", exit_name.clone()))?
            .before
            .iter()
            .cloned()
            .collect();
        if exit_preds.is_empty() {
            return Err(OptimizerError::PreconditionFailed(format!(
                "exit block `{exit_name}` of `{}` has no predecessor to reload spilled arguments in",
                proc.name()
            )));
        }
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for pred_name in exit_preds {
            if !seen.insert(pred_name.clone()) {
                continue;
            }
            let pred = proc
                .block_mut(&pred_name)
                .ok_or_else(|| OptimizerError::lookup("block", pred_name.clone()))?;
            // ahead of the terminating branch; at the end of a
            // fall-through predecessor
            let insert_at = match pred.terminator() {
                Some((index, inst))
                    if inst.operation.category()
                        == crate::optimizer::ir::Category::Branch =>
                {
                    index
                }
                _ => pred.instructions.len(),
            };
            for arg in &spilled_args {
                let offset = *offsets
                    .get(&ranges.range_of_value(arg)?.name)
                    .expect("slot allocated above");
                pred.instructions.insert(insert_at, make_load(arg.clone(), offset));
            }
        }
    }

    for name in &targets {
        spilled.insert(name.clone());
    }
    Ok(targets.len())
}

/// Extend the spill area by one slot for `range_name` if it has none yet.
fn allocate_slot(proc: &mut Procedure, offsets: &mut BTreeMap<String, i64>, range_name: &str) {
    if !offsets.contains_key(range_name) {
        proc.frame.size += SPILL_SLOT_BYTES;
        offsets.insert(range_name.to_string(), proc.frame.size);
    }
}

fn range_offset(
    ranges: &LiveRanges,
    offsets: &BTreeMap<String, i64>,
    value: &Value,
) -> Result<i64> {
    let range = ranges.range_of_value(value)?;
    offsets
        .get(&range.name)
        .copied()
        .ok_or_else(|| OptimizerError::lookup("spill slot for range", range.name.clone()))
}

/// `storeai value, %vr0, -offset`
fn make_store(value: Value, offset: i64) -> Instruction {
    let mut op = Operation::new(Opcode::Storeai);
    op.arrow = "=>".to_string();
    op.rvalues.push(value);
    op.rvalues.push(frame_pointer());
    op.rvalues.push(Value::number(-offset));
    Instruction::new(op)
}

/// `loadai %vr0, -offset => value`
fn make_load(value: Value, offset: i64) -> Instruction {
    let mut op = Operation::new(Opcode::Loadai);
    op.arrow = "=>".to_string();
    op.rvalues.push(frame_pointer());
    op.rvalues.push(Value::number(-offset));
    op.lvalues.push(value);
    Instruction::new(op)
}

fn frame_pointer() -> Value {
    let mut fp = Value::new("%vr0", ValueType::VirtualReg, Behavior::Memory);
    fp.set_subscript("0");
    fp
}

/// Rewrite every virtual-register operand from `%vrN_s` to `%vrC` with the
/// original full text kept as the subscript.
fn remap_to_colors(
    proc: &mut Procedure,
    graph: &InterferenceGraph,
    ranges: &LiveRanges,
) -> Result<()> {
    let recolor = |value: &mut Value| -> Result<()> {
        if !value.is_virtual_reg() || value.subscript().is_empty() {
            return Ok(());
        }
        let range = ranges.range_of_value(value)?;
        let color = graph.node(&range.name)?.color.ok_or_else(|| {
            OptimizerError::PreconditionFailed(format!(
                "live range {} left uncoloured after convergence",
                range.name
            ))
        })?;
        let original = value.full_text();
        value.set_name(format!("%vr{color}"));
        value.set_subscript(original);
        Ok(())
    };

    for arg in &mut proc.frame.arguments {
        recolor(arg)?;
    }

    for block_name in proc.ordered_block_names() {
        let block = proc
            .block_mut(&block_name)
            .expect("ordered names are present");
        for inst in &mut block.instructions {
            if inst.is_deleted() {
                continue;
            }
            for rval in &mut inst.operation.rvalues {
                recolor(rval)?;
            }
            for lval in &mut inst.operation.lvalues {
                recolor(lval)?;
            }
        }
        for phi in &mut block.phinodes {
            if phi.is_deleted() {
                continue;
            }
            let mut lval = phi.lvalue().clone();
            recolor(&mut lval)?;
            phi.set_lvalue(lval);
            let rewired: Vec<(String, Value)> = phi
                .rvalue_map()
                .iter()
                .map(|(pred, rval)| (pred.clone(), rval.clone()))
                .collect();
            for (pred, mut rval) in rewired {
                recolor(&mut rval)?;
                phi.replace_rvalue(&pred, rval);
            }
        }
    }

    Ok(())
}
