//! Conversion out of SSA form.
//!
//! Each live phi becomes a register move in every predecessor: the
//! predecessor's incoming value is copied into the phi's lvalue ahead of
//! the predecessor's terminating branch. Self-copies are skipped. Plain
//! emission then drops the subscripts and the program reads as ordinary
//! ILOC again.

use log::debug;

use super::Pass;
use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::{Category, Instruction, Opcode, Operation, Program};

#[derive(Debug, Default)]
pub struct NormalFormPass;

impl Pass for NormalFormPass {
    fn apply(&mut self, mut program: Program) -> Result<Program> {
        debug!("translating out of SSA form");

        for proc in &mut program.procedures {
            for block_name in proc.ordered_block_names() {
                let copies: Vec<(String, Instruction)> = {
                    let block = proc
                        .block(&block_name)
                        .ok_or_else(|| OptimizerError::lookup("block", block_name.clone()))?;

                    let mut copies = Vec::new();
                    for phi in &block.phinodes {
                        if phi.is_deleted() {
                            continue;
                        }
                        for (pred_name, rvalue) in phi.rvalue_map() {
                            if phi.lvalue().name() == rvalue.name() {
                                continue;
                            }
                            let mut op = Operation::new(Opcode::I2i);
                            op.arrow = "=>".to_string();
                            op.rvalues.push(rvalue.clone());
                            op.lvalues.push(phi.lvalue().clone());
                            let mut inst = Instruction::new(op);
                            inst.containing_block_name = pred_name.clone();
                            copies.push((pred_name.clone(), inst));
                        }
                    }
                    copies
                };

                for (pred_name, copy) in copies {
                    let pred = proc
                        .block_mut(&pred_name)
                        .ok_or_else(|| OptimizerError::lookup("block", pred_name.clone()))?;

                    // keep the terminator last
                    let insert_at = if pred
                        .instructions
                        .last()
                        .is_some_and(|inst| inst.operation.category() == Category::Branch)
                    {
                        pred.instructions.len() - 1
                    } else {
                        pred.instructions.len()
                    };
                    pred.instructions.insert(insert_at, copy);
                }
            }
        }

        program.set_ssa(false);
        Ok(program)
    }
}
