//! Register behavior inference.
//!
//! Tags every defined register with how it is used: `memory` when defined
//! by a memory operation (it holds an address), `expression` when defined
//! by an expression or a load-immediate, and `mixed` when defined by an
//! expression over at least one known-memory operand. SSA renaming
//! consults the tags to keep its common-subexpression elimination away
//! from address arithmetic.
//!
//! Behaviors flow through repeated full sweeps over each procedure until a
//! sweep changes nothing; a register name inherits the last behavior
//! observed for it, so taint from a definition late in the block list
//! still reaches uses ahead of it.

use std::collections::HashMap;

use log::debug;

use super::Pass;
use crate::optimizer::error::Result;
use crate::optimizer::ir::{Behavior, Category, Program};

#[derive(Debug, Default)]
pub struct RegisterBehaviorPass;

impl Pass for RegisterBehaviorPass {
    fn apply(&mut self, mut program: Program) -> Result<Program> {
        debug!("determining register behaviors");

        for proc in &mut program.procedures {
            let mut known: HashMap<String, Behavior> = HashMap::new();

            // a behavior reaches a use only through the map, so full
            // sweeps repeat until one leaves every entry unchanged; entries
            // only ever harden toward memory taint, which bounds the loop
            let mut changed = true;
            while changed {
                let snapshot = known.clone();
                for name in proc.ordered_block_names() {
                    let block = proc.block_mut(&name).expect("ordered names are present");
                    for inst in &mut block.instructions {
                        let behavior = match inst.operation.category() {
                            Category::Memory => Behavior::Memory,
                            Category::LoadImmediate => Behavior::Expression,
                            Category::Expression => {
                                let mut behavior = Behavior::Expression;
                                for rval in &inst.operation.rvalues {
                                    // a value computed from an address, or
                                    // from anything already tainted by one,
                                    // is itself tainted
                                    if matches!(
                                        known.get(rval.name()),
                                        Some(Behavior::Memory | Behavior::Mixed)
                                    ) {
                                        behavior = Behavior::Mixed;
                                    }
                                }
                                behavior
                            }
                            _ => continue,
                        };
                        for lval in &mut inst.operation.lvalues {
                            lval.set_behavior(behavior);
                            known.insert(lval.name().to_string(), behavior);
                        }
                    }
                }
                changed = known != snapshot;
            }
        }

        Ok(program)
    }
}
