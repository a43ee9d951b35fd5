//! Basic blocks.

use smallvec::SmallVec;

use super::instruction::Instruction;
use super::phi::PhiNode;

/// A maximal straight-line instruction sequence.
///
/// `before`/`after` hold predecessor/successor block names; most blocks
/// have at most two of each, so the lists stay inline. `order` is assigned
/// at construction and preserved through every pass — all deterministic
/// block traversals sort by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// "entry" for the procedure entry, the label for labelled blocks,
    /// a generated name for fall-through splits.
    pub debug_name: String,
    /// Stable construction order within the procedure.
    pub order: u32,
    pub instructions: Vec<Instruction>,
    pub phinodes: Vec<PhiNode>,
    /// Predecessor block names.
    pub before: SmallVec<[String; 2]>,
    /// Successor block names, branch targets first, fall-through last.
    pub after: SmallVec<[String; 2]>,
}

impl BasicBlock {
    pub fn new(debug_name: impl Into<String>, order: u32) -> Self {
        BasicBlock {
            debug_name: debug_name.into(),
            order,
            instructions: Vec::new(),
            phinodes: Vec::new(),
            before: SmallVec::new(),
            after: SmallVec::new(),
        }
    }

    /// The block's last non-deleted instruction, normally its terminator.
    pub fn terminator(&self) -> Option<(usize, &Instruction)> {
        self.instructions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, inst)| !inst.is_deleted())
    }
}
