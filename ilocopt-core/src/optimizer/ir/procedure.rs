//! Procedures and their frames.

use std::collections::{BTreeMap, HashMap};

use super::block::BasicBlock;
use super::ssa_info::SsaInfo;
use super::value::{Behavior, Value, ValueType};

/// The name of every procedure's entry block.
pub const ENTRY_BLOCK: &str = "entry";

/// Reserved registers `%vr0..%vr3`, considered defined on procedure entry
/// and pinned to the first four allocator colours.
pub const SPECIAL_REGISTERS: [&str; 4] = ["%vr0", "%vr1", "%vr2", "%vr3"];

/// Stack-frame description from the `.frame` directive: procedure name,
/// spill-area size in bytes, and the formal arguments in declaration order.
/// The size only ever grows, as register allocation carves out spill slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub size: i64,
    pub arguments: Vec<Value>,
}

/// One ILOC procedure: a frame plus a named set of basic blocks.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub frame: Frame,
    blocks: HashMap<String, BasicBlock>,
    exit_block_name: String,
    ssa_info: SsaInfo,
}

impl Procedure {
    pub fn new(frame: Frame) -> Self {
        Procedure {
            frame,
            blocks: HashMap::new(),
            exit_block_name: String::new(),
            ssa_info: SsaInfo::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.frame.name
    }

    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.entry(block.debug_name.clone()).or_insert(block);
    }

    pub fn contains_block(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn block(&self, name: &str) -> Option<&BasicBlock> {
        self.blocks.get(name)
    }

    pub fn block_mut(&mut self, name: &str) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(name)
    }

    pub fn remove_block(&mut self, name: &str) -> Option<BasicBlock> {
        self.blocks.remove(name)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks sorted by their stable construction order. Every traversal
    /// whose order can leak into the output goes through here.
    pub fn ordered_blocks(&self) -> Vec<&BasicBlock> {
        let mut blocks: Vec<&BasicBlock> = self.blocks.values().collect();
        blocks.sort_by_key(|b| b.order);
        blocks
    }

    pub fn ordered_block_names(&self) -> Vec<String> {
        self.ordered_blocks()
            .iter()
            .map(|b| b.debug_name.clone())
            .collect()
    }

    /// Every distinct virtual-register name written in the procedure, plus
    /// the formal arguments and the four reserved registers. Keyed by bare
    /// name (SSA subscripts ignored), sorted for deterministic iteration.
    pub fn variable_names(&self) -> Vec<Value> {
        let mut variables: BTreeMap<String, Value> = BTreeMap::new();

        for block in self.ordered_blocks() {
            for inst in &block.instructions {
                for lval in &inst.operation.lvalues {
                    if lval.is_virtual_reg() {
                        variables
                            .entry(lval.name().to_string())
                            .or_insert_with(|| lval.clone());
                    }
                }
            }
        }

        for arg in &self.frame.arguments {
            variables
                .entry(arg.name().to_string())
                .or_insert_with(|| arg.clone());
        }

        for special in SPECIAL_REGISTERS {
            variables.entry(special.to_string()).or_insert_with(|| {
                Value::new(special, ValueType::VirtualReg, Behavior::Memory)
            });
        }

        variables.into_values().collect()
    }

    pub fn exit_block_name(&self) -> &str {
        &self.exit_block_name
    }

    pub fn set_exit_block_name(&mut self, name: impl Into<String>) {
        self.exit_block_name = name.into();
    }

    pub fn ssa_info(&self) -> &SsaInfo {
        &self.ssa_info
    }

    pub fn set_ssa_info(&mut self, info: SsaInfo) {
        self.ssa_info = info;
    }
}
