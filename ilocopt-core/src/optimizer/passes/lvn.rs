//! Local value numbering.
//!
//! A forward pass over each basic block with three tables, all reset at
//! block entry:
//!
//! - `symbols`: register name → value number, plus the subsumption links
//! - `expressions`: `(opcode, vn, vn)` → the register that first computed it
//! - `constants`: value number → known integer literal
//!
//! Redundant load-immediates are deleted; redundant expressions become
//! moves from the earlier result; constant operands fold, feed the
//! immediate-form opcodes, and swap to the right of commutative
//! operations. The `subsumed_by`/`subsumes` links form a forest of rename
//! equivalences applied to every operand before it is read; redefining a
//! register severs its outgoing links in both directions.

use std::collections::HashMap;

use log::debug;

use super::Pass;
use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::{Category, Instruction, Opcode, Program, Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ExprKey {
    opcode: Opcode,
    rv1: u32,
    rv2: u32,
}

#[derive(Debug, Default)]
struct SymbolEntry {
    number: u32,
    subsumed_by: Option<String>,
    subsumes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LvnPass {
    next_id: u32,
    symbols: HashMap<String, SymbolEntry>,
    expressions: HashMap<ExprKey, String>,
    constants: HashMap<u32, i64>,
}

impl Pass for LvnPass {
    fn apply(&mut self, mut program: Program) -> Result<Program> {
        debug!("performing local value numbering");

        for proc in &mut program.procedures {
            for name in proc.ordered_block_names() {
                let block = proc.block_mut(&name).expect("ordered names are present");
                self.reset_tables();
                for inst in &mut block.instructions {
                    if inst.is_deleted() {
                        continue;
                    }
                    self.number_instruction(inst)?;
                }
            }
        }

        Ok(program)
    }
}

impl LvnPass {
    fn reset_tables(&mut self) {
        self.next_id = 1;
        self.symbols.clear();
        self.expressions.clear();
        self.constants.clear();
    }

    /// Process one instruction. Subsumption renaming applies to every
    /// operand read; the numbering itself only handles single-lvalue
    /// shapes — nops, writes, stores, and calls with several lvalues pass
    /// through.
    fn number_instruction(&mut self, inst: &mut Instruction) -> Result<()> {
        self.apply_subsumption(inst);

        if inst.operation.lvalues.len() != 1 {
            return Ok(());
        }
        if inst.operation.rvalues.len() > 2 {
            return Err(OptimizerError::UnsupportedOperation(format!(
                "value numbering cannot handle {} rvalues in `{}`",
                inst.operation.rvalues.len(),
                inst.operation.opcode.name()
            )));
        }

        let lvalue = inst.operation.lvalues[0].clone();

        let key = ExprKey {
            opcode: inst.operation.opcode,
            rv1: inst
                .operation
                .rvalues
                .first()
                .map_or(0, |v| self.value_number(v.name())),
            rv2: inst
                .operation
                .rvalues
                .get(1)
                .map_or(0, |v| self.value_number(v.name())),
        };

        match inst.operation.category() {
            Category::LoadImmediate => {
                self.handle_load_immediate(inst, &lvalue);
            }
            Category::Memory => {
                // only the register moves take part; loads and stores are
                // opaque to value numbering
                if matches!(inst.operation.opcode, Opcode::I2i | Opcode::F2f) {
                    let number = self.value_number(inst.operation.rvalues[0].name());
                    if let Some(&constant) = self.constants.get(&number) {
                        inst.change_to_loadi(constant);
                        self.handle_load_immediate(inst, &lvalue);
                    } else {
                        let source = inst.operation.rvalues[0].name().to_string();
                        self.remove_subsumption(lvalue.name());
                        self.set_value_number(lvalue.name(), number);
                        self.subsume(lvalue.name(), &source);
                    }
                }
            }
            Category::Expression | Category::Test => {
                self.number_expression(inst, &lvalue, key)?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Number a `loadI`, including instructions just rewritten into one.
    /// A constant already held by another register deletes the load and
    /// routes readers there through a subsumption link.
    fn handle_load_immediate(&mut self, inst: &mut Instruction, lvalue: &Value) {
        let literal_number = self.value_number(&inst.operation.rvalues[0].name().to_string());
        let key = ExprKey {
            opcode: Opcode::Loadi,
            rv1: literal_number,
            rv2: 0,
        };

        // the table entry is only trustworthy while the canonical register
        // still carries the constant's number
        let canonical = self
            .expressions
            .get(&key)
            .filter(|name| {
                self.symbols.get(name.as_str()).map(|e| e.number) == Some(literal_number)
            })
            .cloned();

        match canonical {
            Some(canonical) if canonical != lvalue.name() => {
                inst.mark_deleted();
                self.remove_subsumption(lvalue.name());
                self.set_value_number(lvalue.name(), literal_number);
                self.subsume(lvalue.name(), &canonical);
            }
            Some(_) => {
                // reloading the same constant into the same register
                inst.mark_deleted();
            }
            None => {
                self.expressions.insert(key, lvalue.name().to_string());
                self.remove_subsumption(lvalue.name());
                self.set_value_number(lvalue.name(), literal_number);
            }
        }
    }

    fn number_expression(
        &mut self,
        inst: &mut Instruction,
        lvalue: &Value,
        key: ExprKey,
    ) -> Result<()> {
        let both_constant =
            self.constants.contains_key(&key.rv1) && self.constants.contains_key(&key.rv2);

        if both_constant {
            if let Some(result) = self.fold_constant(key) {
                inst.change_to_loadi(result);
                self.handle_load_immediate(inst, lvalue);
                return Ok(());
            }
            // the fold was refused (divide by zero, or no rule); fall
            // through to the ordinary paths
        }

        if let Some(canonical) = self.expressions.get(&key).cloned() {
            let number = self.value_number(&canonical);
            inst.change_to_move(&canonical);
            self.remove_subsumption(lvalue.name());
            self.set_value_number(lvalue.name(), number);
            self.subsume(lvalue.name(), &canonical);
            return Ok(());
        }

        self.rewrite_immediate_forms(inst)?;

        if !inst.operation.opcode.reads_external() {
            // the key keeps the pre-rewrite opcode so later occurrences of
            // the same source expression still match it
            self.expressions.insert(key, lvalue.name().to_string());
        }
        self.remove_subsumption(lvalue.name());
        self.assign_fresh_number(lvalue.name());
        Ok(())
    }

    /// Swap a constant left operand to the right of commutative ops, then
    /// rewrite `op reg, const` into the immediate-form opcode.
    fn rewrite_immediate_forms(&mut self, inst: &mut Instruction) -> Result<()> {
        if inst.operation.rvalues.len() < 2 {
            return Ok(());
        }

        if self.is_constant(&inst.operation.rvalues[0]) && inst.operation.opcode.is_commutative() {
            inst.operation.rvalues.swap(0, 1);
        }

        let right_number = self.value_number(inst.operation.rvalues[1].name());
        if let Some(&constant) = self.constants.get(&right_number) {
            if let Some(immediate) = inst.operation.opcode.immediate_form() {
                inst.operation.opcode = immediate;
                let right = &mut inst.operation.rvalues[1];
                right.set_name(constant.to_string());
                right.set_type(ValueType::Number);
            }
        }
        Ok(())
    }

    /// Two's-complement constant folding. `None` means the fold is
    /// refused, not that anything went wrong.
    fn fold_constant(&self, key: ExprKey) -> Option<i64> {
        let a = *self.constants.get(&key.rv1)?;
        let b = *self.constants.get(&key.rv2)?;

        let result = match key.opcode {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mult => a.wrapping_mul(b),
            Opcode::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            Opcode::Mod => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            Opcode::And => a & b,
            Opcode::Or => a | b,
            Opcode::Lshift => a.wrapping_shl(b as u32 & 63),
            Opcode::Rshift => a.wrapping_shr(b as u32 & 63),
            // three-way compare: 1 below, 0 equal, 2 above
            Opcode::Comp => match a.cmp(&b) {
                std::cmp::Ordering::Less => 1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 2,
            },
            Opcode::CmpEq => fold_bool(a == b),
            Opcode::CmpNe => fold_bool(a != b),
            Opcode::CmpLt => fold_bool(a < b),
            Opcode::CmpGt => fold_bool(a > b),
            Opcode::CmpLe => fold_bool(a <= b),
            Opcode::CmpGe => fold_bool(a >= b),
            _ => return None,
        };
        Some(result)
    }

    /// Rename every operand that has been subsumed by another register.
    fn apply_subsumption(&mut self, inst: &mut Instruction) {
        for rval in &mut inst.operation.rvalues {
            if let Some(entry) = self.symbols.get(rval.name()) {
                if let Some(replacement) = entry.subsumed_by.clone() {
                    rval.set_name(replacement);
                }
            }
        }
    }

    fn subsume(&mut self, subsumed: &str, canonical: &str) {
        self.value_number(canonical);
        self.value_number(subsumed);
        self.symbols
            .get_mut(canonical)
            .expect("symbol just created")
            .subsumes
            .push(subsumed.to_string());
        self.symbols
            .get_mut(subsumed)
            .expect("symbol just created")
            .subsumed_by = Some(canonical.to_string());
    }

    /// A redefinition of `name` severs its subsumption links in both
    /// directions: registers it subsumed stand alone again, and the
    /// register that subsumed it forgets it.
    fn remove_subsumption(&mut self, name: &str) {
        let (subsumed, canonical) = match self.symbols.get_mut(name) {
            Some(entry) => (
                std::mem::take(&mut entry.subsumes),
                entry.subsumed_by.take(),
            ),
            None => return,
        };
        for other in subsumed {
            if let Some(entry) = self.symbols.get_mut(&other) {
                entry.subsumed_by = None;
            }
        }
        if let Some(canonical) = canonical {
            if let Some(entry) = self.symbols.get_mut(&canonical) {
                entry.subsumes.retain(|s| s != name);
            }
        }
    }

    /// Look up or create the value number for a name. Literal names enter
    /// the constant table as they are numbered.
    fn value_number(&mut self, name: &str) -> u32 {
        if let Some(entry) = self.symbols.get(name) {
            return entry.number;
        }

        let id = self.next_id;
        self.next_id += 1;

        if let Ok(constant) = name.parse::<i64>() {
            self.constants.insert(id, constant);
        }

        self.symbols.insert(
            name.to_string(),
            SymbolEntry {
                number: id,
                ..SymbolEntry::default()
            },
        );
        id
    }

    fn set_value_number(&mut self, name: &str, number: u32) {
        self.value_number(name);
        self.symbols.get_mut(name).expect("symbol just created").number = number;
    }

    /// A redefined register computes a value nothing else is known to
    /// hold: give it a number of its own.
    fn assign_fresh_number(&mut self, name: &str) {
        self.value_number(name);
        let id = self.next_id;
        self.next_id += 1;
        self.symbols.get_mut(name).expect("symbol just created").number = id;
    }

    fn is_constant(&mut self, value: &Value) -> bool {
        let number = self.value_number(value.name());
        self.constants.contains_key(&number)
    }
}

fn fold_bool(condition: bool) -> i64 {
    if condition {
        -1
    } else {
        0
    }
}
