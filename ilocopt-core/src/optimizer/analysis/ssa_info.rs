//! Uses-and-definitions indexing.
//!
//! Rebuilds a procedure's [`SsaInfo`] from scratch: definitions are seeded
//! with the four reserved registers and the formal arguments (subscript
//! `0`, predefined at entry), then every non-deleted instruction and phi
//! contributes its virtual-register lvalues as definitions and rvalues as
//! uses. The first writer wins if duplicate definitions appear — they
//! should not once the program is in SSA form.

use crate::optimizer::ir::{ENTRY_BLOCK, SPECIAL_REGISTERS};
use crate::optimizer::ir::{Behavior, DefSite, Procedure, SsaInfo, UseSite, Value, ValueType};

/// Build the uses/definitions index for one procedure.
pub fn build_ssa_info(proc: &Procedure) -> SsaInfo {
    let mut info = SsaInfo::default();

    for special in SPECIAL_REGISTERS {
        let mut value = Value::new(special, ValueType::VirtualReg, Behavior::Memory);
        value.set_subscript("0");
        info.definitions.insert(
            value.full_text(),
            DefSite::Predefined {
                block: ENTRY_BLOCK.to_string(),
            },
        );
    }

    for arg in &proc.frame.arguments {
        let mut value = arg.clone();
        value.set_subscript("0");
        info.definitions.entry(value.full_text()).or_insert(DefSite::Predefined {
            block: ENTRY_BLOCK.to_string(),
        });
    }

    for block in proc.ordered_blocks() {
        for (index, inst) in block.instructions.iter().enumerate() {
            if inst.is_deleted() {
                continue;
            }

            for rval in &inst.operation.rvalues {
                if rval.is_virtual_reg() {
                    info.uses
                        .entry(rval.full_text())
                        .or_default()
                        .push(UseSite::Instruction {
                            block: block.debug_name.clone(),
                            index,
                        });
                }
            }

            for lval in &inst.operation.lvalues {
                if lval.is_virtual_reg() {
                    info.definitions
                        .entry(lval.full_text())
                        .or_insert(DefSite::Instruction {
                            block: block.debug_name.clone(),
                            index,
                        });
                }
            }
        }

        for (index, phi) in block.phinodes.iter().enumerate() {
            if phi.is_deleted() {
                continue;
            }

            for rval in phi.rvalue_map().values() {
                if rval.is_virtual_reg() {
                    info.uses
                        .entry(rval.full_text())
                        .or_default()
                        .push(UseSite::Phi {
                            block: block.debug_name.clone(),
                            index,
                        });
                }
            }

            info.definitions
                .entry(phi.lvalue().full_text())
                .or_insert(DefSite::Phi {
                    block: block.debug_name.clone(),
                    index,
                });
        }
    }

    info
}
