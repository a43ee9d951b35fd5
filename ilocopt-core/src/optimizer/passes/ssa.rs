//! SSA construction.
//!
//! Phi placement is Cytron-style: for each variable, the iterated
//! dominance frontier of its definition blocks (plus entry) names the join
//! points, and a phi lands only where the variable is live-in (pruned
//! SSA). Renaming then walks the dominator tree from entry with one
//! subscript stack per variable name.
//!
//! The renaming walk doubles as dominator-tree value numbering: an
//! expression-producing instruction whose operands (already renamed) match
//! a key recorded in any enclosing scope is deleted, and its lvalue's
//! stack is aliased to the earlier result. Only registers behaving as pure
//! expressions participate — address arithmetic and memory traffic are
//! left alone.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use super::Pass;
use crate::optimizer::analysis::{
    Direction, DominanceFrontiers, DominatorTree, DominatorTrees, LiveVariables, NameKey,
    ValueKey,
};
use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::{ENTRY_BLOCK, SPECIAL_REGISTERS};
use crate::optimizer::ir::{
    Behavior, Category, Opcode, PhiNode, Procedure, Program, Value, ValueType,
};

/// Available-expression key: opcode plus renamed operand texts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExprKey {
    opcode: Opcode,
    rv1: String,
    rv2: String,
}

impl ExprKey {
    fn of(opcode: Opcode, rvalues: &[Value]) -> Self {
        ExprKey {
            opcode,
            rv1: rvalues.first().map(Value::full_text).unwrap_or_default(),
            rv2: rvalues.get(1).map(Value::full_text).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default)]
struct RenameState {
    /// variable name → stack of renamed values
    stacks: HashMap<String, Vec<Value>>,
    /// variable name → next subscript
    next: HashMap<String, u32>,
    /// one available-expression map per open dominator-tree scope
    scopes: Vec<HashMap<ExprKey, Value>>,
}

impl RenameState {
    fn push_new_name(&mut self, value: &Value) -> Value {
        let mut renamed = value.clone();
        let counter = self.next.entry(value.name().to_string()).or_insert(0);
        renamed.set_subscript(counter.to_string());
        *counter += 1;
        self.stacks
            .entry(value.name().to_string())
            .or_default()
            .push(renamed.clone());
        renamed
    }

    fn push_alias(&mut self, name: &str, value: Value) {
        self.stacks.entry(name.to_string()).or_default().push(value);
    }

    fn top(&self, name: &str) -> Option<&Value> {
        self.stacks.get(name).and_then(|stack| stack.last())
    }

    fn pop(&mut self, name: &str) -> Result<Value> {
        self.stacks
            .get_mut(name)
            .and_then(Vec::pop)
            .ok_or_else(|| OptimizerError::lookup("rename stack entry", name))
    }

    fn find_available(&self, key: &ExprKey) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(key))
    }

    fn record_available(&mut self, key: ExprKey, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key, value);
        }
    }
}

/// What the forward phase did to each instruction, replayed backward by
/// the unwinding phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardAction {
    /// Already deleted, or no lvalue handling applied.
    Skipped,
    /// One value pushed per lvalue.
    Pushed,
}

#[derive(Debug, Default)]
pub struct SsaConstructionPass;

impl Pass for SsaConstructionPass {
    fn apply(&mut self, mut program: Program) -> Result<Program> {
        debug!("constructing SSA form");

        let liveness = LiveVariables::<NameKey>::compute(&program)?;
        let trees = DominatorTrees::compute(&program, Direction::Dominator)?;

        for proc in &mut program.procedures {
            let tree: &DominatorTree = trees.tree(proc.name())?;
            let frontiers = DominanceFrontiers::build(tree, proc)?;

            place_phi_nodes(proc, &frontiers, &liveness)?;

            let mut state = RenameState::default();
            rename_init(proc, &mut state);
            rename_block(proc, tree, ENTRY_BLOCK, &mut state)?;
        }

        program.set_ssa(true);
        Ok(program)
    }
}

fn place_phi_nodes(
    proc: &mut Procedure,
    frontiers: &DominanceFrontiers,
    liveness: &LiveVariables<NameKey>,
) -> Result<()> {
    // clear any phis from a previous construction
    for name in proc.ordered_block_names() {
        proc.block_mut(&name)
            .expect("ordered names are present")
            .phinodes
            .clear();
    }

    let proc_name = proc.name().to_string();
    for variable in proc.variable_names() {
        let join_blocks = iterated_dominance_frontier(proc, frontiers, &variable)?;

        for block_name in join_blocks {
            let live_in = &liveness.block_sets(&proc_name, &block_name)?.in_set;
            if !live_in.contains_key(&NameKey::key(&variable)) {
                continue;
            }

            let block = proc
                .block_mut(&block_name)
                .ok_or_else(|| OptimizerError::lookup("block", block_name.clone()))?;
            let mut phi = PhiNode::new(variable.clone());
            for pred in block.before.clone() {
                phi.add_rvalue(pred, variable.clone());
            }
            block.phinodes.push(phi);
        }
    }

    Ok(())
}

/// Least fixed point of the dominance frontier over the variable's
/// definition blocks (entry included).
fn iterated_dominance_frontier(
    proc: &Procedure,
    frontiers: &DominanceFrontiers,
    variable: &Value,
) -> Result<BTreeSet<String>> {
    let mut work: BTreeSet<String> = BTreeSet::new();
    work.insert(ENTRY_BLOCK.to_string());

    for block in proc.ordered_blocks() {
        let defines = block.instructions.iter().any(|inst| {
            !inst.is_deleted()
                && inst
                    .operation
                    .lvalues
                    .iter()
                    .any(|lval| lval.name() == variable.name())
        });
        if defines {
            work.insert(block.debug_name.clone());
        }
    }

    let mut result: BTreeSet<String> = BTreeSet::new();
    while let Some(block_name) = work.pop_first() {
        for frontier_block in frontiers.frontier_of(&block_name)? {
            if result.insert(frontier_block.clone()) {
                work.insert(frontier_block.clone());
            }
        }
    }

    Ok(result)
}

/// Seed the subscript stacks: the reserved registers and every formal
/// argument are defined on entry with subscript `0`.
fn rename_init(proc: &mut Procedure, state: &mut RenameState) {
    for arg in &mut proc.frame.arguments {
        let renamed = state.push_new_name(&arg.clone());
        *arg = renamed;
    }

    for special in SPECIAL_REGISTERS {
        let value = Value::new(special, ValueType::VirtualReg, Behavior::Memory);
        state.push_new_name(&value);
    }
}

fn rename_block(
    proc: &mut Procedure,
    tree: &DominatorTree,
    block_name: &str,
    state: &mut RenameState,
) -> Result<()> {
    // phi lvalues define at the top of the block
    {
        let block = proc
            .block(block_name)
            .ok_or_else(|| OptimizerError::lookup("block", block_name))?;
        let phi_lvalues: Vec<Value> = block
            .phinodes
            .iter()
            .filter(|phi| !phi.is_deleted())
            .map(|phi| phi.lvalue().clone())
            .collect();
        for lvalue in phi_lvalues {
            state.push_new_name(&lvalue);
        }
    }

    state.scopes.push(HashMap::new());

    let mut actions: Vec<ForwardAction> = Vec::new();
    {
        let block = proc
            .block_mut(block_name)
            .ok_or_else(|| OptimizerError::lookup("block", block_name))?;

        for inst in &mut block.instructions {
            if inst.is_deleted() {
                actions.push(ForwardAction::Skipped);
                continue;
            }

            for rval in &mut inst.operation.rvalues {
                if rval.is_virtual_reg() {
                    if let Some(top) = state.top(rval.name()) {
                        *rval = top.clone();
                    }
                }
            }

            if inst.operation.category() == Category::Branch {
                actions.push(ForwardAction::Skipped);
                continue;
            }

            match inst.operation.lvalues.len() {
                0 => actions.push(ForwardAction::Skipped),
                1 => {
                    let lvalue = inst.operation.lvalues[0].clone();
                    let category = inst.operation.category();
                    let cse_eligible = matches!(
                        category,
                        Category::Expression | Category::LoadImmediate
                    ) && lvalue.behavior() == Behavior::Expression
                        && !inst.operation.opcode.reads_external();

                    if cse_eligible {
                        let key = ExprKey::of(inst.operation.opcode, &inst.operation.rvalues);
                        if let Some(available) = state.find_available(&key).cloned() {
                            state.push_alias(lvalue.name(), available);
                            inst.mark_deleted();
                        } else {
                            let renamed = state.push_new_name(&lvalue);
                            state.record_available(key, renamed);
                        }
                    } else {
                        state.push_new_name(&lvalue);
                    }
                    actions.push(ForwardAction::Pushed);
                }
                _ => {
                    // by-reference call outputs are the one sanctioned
                    // multi-lvalue shape
                    if !inst.operation.opcode.is_call() {
                        return Err(OptimizerError::UnsupportedOperation(format!(
                            "multiple lvalues on non-call `{}`",
                            inst.operation.opcode.name()
                        )));
                    }
                    for lval in inst.operation.lvalues.clone() {
                        state.push_new_name(&lval);
                    }
                    actions.push(ForwardAction::Pushed);
                }
            }
        }
    }

    // wire this block's position into successor phis
    let successors: Vec<String> = {
        let block = proc
            .block(block_name)
            .ok_or_else(|| OptimizerError::lookup("block", block_name))?;
        block.after.iter().cloned().collect()
    };
    for successor in successors {
        let succ = proc
            .block_mut(&successor)
            .ok_or_else(|| OptimizerError::lookup("block", successor.clone()))?;
        for phi in &mut succ.phinodes {
            if phi.is_deleted() {
                continue;
            }
            let name = phi.lvalue().name().to_string();
            if let Some(top) = state.top(&name).cloned() {
                phi.replace_rvalue(block_name, top);
            }
        }
    }

    // dominated blocks see this block's definitions
    for child in tree.children_of(block_name).to_vec() {
        rename_block(proc, tree, &child, state)?;
    }

    // unwind: lvalues take their names as the stacks pop
    {
        let block = proc
            .block_mut(block_name)
            .ok_or_else(|| OptimizerError::lookup("block", block_name))?;

        for (inst, action) in block.instructions.iter_mut().zip(&actions).rev() {
            if *action != ForwardAction::Pushed {
                continue;
            }
            for lval in inst.operation.lvalues.iter_mut().rev() {
                let popped = state.pop(lval.name())?;
                *lval = popped;
            }
        }

        for phi in block.phinodes.iter_mut().rev() {
            if phi.is_deleted() {
                continue;
            }
            let popped = state.pop(phi.lvalue().name())?;
            phi.set_lvalue(popped);
        }
    }

    state.scopes.pop();
    Ok(())
}
