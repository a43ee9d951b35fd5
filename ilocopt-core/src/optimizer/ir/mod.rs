//! The intermediate representation.
//!
//! All cross-references between blocks and between definitions and uses are
//! by stable string names (block names, register full text), never by
//! pointer or index into another container. This keeps the model copy-safe
//! and cycle-free at the data level even though the control-flow graph is
//! cyclic.

mod block;
mod instruction;
mod opcode;
mod phi;
mod procedure;
mod program;
mod ssa_info;
mod value;

pub use block::BasicBlock;
pub use instruction::{Instruction, Operation};
pub use opcode::{Category, Opcode};
pub use phi::PhiNode;
pub use procedure::{Frame, Procedure, ENTRY_BLOCK, SPECIAL_REGISTERS};
pub use program::Program;
pub use ssa_info::{DefSite, SsaInfo, UseSite};
pub use value::{Behavior, Value, ValueType};
