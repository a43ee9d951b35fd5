//! Operations and instructions.

use smallvec::SmallVec;

use super::opcode::{Category, Opcode};
use super::value::{Behavior, Value, ValueType};

/// Operand lists rarely exceed two entries (three for `storeai`), so they
/// stay inline.
pub type ValueList = SmallVec<[Value; 2]>;

/// An opcode with its operands. `rvalues` are read, `lvalues` written; the
/// declaration arrow (`=>` or `->`) is preserved for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub opcode: Opcode,
    pub arrow: String,
    pub rvalues: ValueList,
    pub lvalues: ValueList,
}

impl Operation {
    pub fn new(opcode: Opcode) -> Self {
        Operation {
            opcode,
            arrow: String::new(),
            rvalues: SmallVec::new(),
            lvalues: SmallVec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.opcode.category()
    }

    /// The behavior a register defined by this operation is known to have
    /// from the operation alone.
    pub fn result_behavior(&self) -> Behavior {
        match self.category() {
            Category::Memory => Behavior::Memory,
            Category::Expression | Category::LoadImmediate => Behavior::Expression,
            _ => Behavior::Unknown,
        }
    }

    /// Store-family operations do not write a register: the syntactic
    /// target is an address that is read. Move any parsed lvalues over to
    /// the rvalue list.
    pub fn fix_values(&mut self) {
        if self.opcode.is_store() {
            for lval in self.lvalues.drain(..) {
                self.rvalues.push(lval);
            }
        }
    }
}

/// A single ILOC instruction inside a basic block.
///
/// Deletion is logical: emitters and analyses skip deleted instructions,
/// and only the allocator's rewriting physically inserts new ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Label naming the containing block, present only on its first
    /// instruction.
    pub label: Option<String>,
    pub operation: Operation,
    pub containing_block_name: String,
    deleted: bool,
}

impl Instruction {
    pub fn new(operation: Operation) -> Self {
        Instruction {
            label: None,
            operation,
            containing_block_name: String::new(),
            deleted: false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn has_side_effects(&self) -> bool {
        self.operation.opcode.has_side_effects()
    }

    /// Rewrite in place into `loadI <constant>`, keeping the lvalue.
    pub fn change_to_loadi(&mut self, constant: i64) {
        self.operation.opcode = Opcode::Loadi;
        self.operation.rvalues.clear();
        self.operation.rvalues.push(Value::number(constant));
    }

    /// Rewrite in place into `i2i <reg>`, keeping the lvalue.
    pub fn change_to_move(&mut self, reg_name: &str) {
        self.operation.opcode = Opcode::I2i;
        self.operation.arrow = "=>".to_string();
        self.operation.rvalues.clear();
        self.operation
            .rvalues
            .push(Value::new(reg_name, ValueType::VirtualReg, Behavior::Unknown));
    }
}
