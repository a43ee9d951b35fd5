//! Chaitin live ranges.
//!
//! Each defined SSA value starts in its own range; ranges then merge
//! across phi nodes (the lvalue with every rvalue) and across call sites.
//! ILOC passes arguments by reference, so a call's actual argument and the
//! post-call name of that argument must occupy the same register: ranges
//! merge positionally between the call's rvalues (skipping the callee
//! label) and its lvalues (skipping the return-value slot of `icall` and
//! `fcall`).

use std::collections::{BTreeSet, HashMap};

use log::trace;

use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::{Opcode, Procedure, SsaInfo, Value};

/// An equivalence class of SSA values that must share a register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRange {
    /// Canonical text: the full text of the value the range was seeded
    /// from; merging keeps the absorbing range's name.
    pub name: String,
    pub registers: BTreeSet<Value>,
}

impl LiveRange {
    fn new(value: Value) -> Self {
        let name = value.full_text();
        let mut registers = BTreeSet::new();
        registers.insert(value);
        LiveRange { name, registers }
    }

    /// Total recorded uses over every value in the range.
    pub fn use_count(&self, info: &SsaInfo) -> usize {
        self.registers
            .iter()
            .map(|value| info.use_count(&value.full_text()))
            .sum()
    }

    /// Whether the range holds `%vrN` subscript `0` for N in 0..=3; such
    /// ranges are pinned to colour N.
    pub fn reserved_color(&self) -> Option<u8> {
        for n in 0u8..4 {
            let text = format!("%vr{n}_0");
            if self.registers.iter().any(|v| v.full_text() == text) {
                return Some(n);
            }
        }
        None
    }
}

/// The live ranges of one procedure, with a full-text → range index.
#[derive(Debug, Clone)]
pub struct LiveRanges {
    ranges: Vec<LiveRange>,
    /// value full text → index into `ranges`
    index: HashMap<String, usize>,
}

impl LiveRanges {
    /// Compute the ranges for a procedure. Requires SSA names; callers
    /// check the program-level flag.
    pub fn compute(proc: &Procedure, info: &SsaInfo) -> Result<Self> {
        let mut ranges = LiveRanges {
            ranges: Vec::new(),
            index: HashMap::new(),
        };

        // one range per defined value, in sorted definition order
        for full_text in info.definitions.keys() {
            let value = value_from_full_text(full_text);
            let idx = ranges.ranges.len();
            ranges.ranges.push(LiveRange::new(value));
            ranges.index.insert(full_text.clone(), idx);
        }

        // merge across phis
        for block in proc.ordered_blocks() {
            for phi in &block.phinodes {
                if phi.is_deleted() {
                    continue;
                }
                let lval_text = phi.lvalue().full_text();
                for rval in phi.rvalue_map().values() {
                    // an unsubscripted rvalue is undefined along its path
                    // and owns no range
                    if rval.subscript().is_empty() {
                        continue;
                    }
                    ranges.merge(&lval_text, &rval.full_text())?;
                }
            }
        }

        // merge across call sites: by-reference actuals share a register
        // with their post-call names
        for block in proc.ordered_blocks() {
            for inst in &block.instructions {
                if inst.is_deleted() || !inst.operation.opcode.is_call() {
                    continue;
                }
                let actuals = inst
                    .operation
                    .rvalues
                    .iter()
                    .filter(|v| v.is_virtual_reg());
                let skip = match inst.operation.opcode {
                    Opcode::Icall | Opcode::Fcall => 1,
                    _ => 0,
                };
                let outs = inst.operation.lvalues.iter().skip(skip);
                for (actual, out) in actuals.zip(outs) {
                    ranges.merge(&out.full_text(), &actual.full_text())?;
                }
            }
        }

        for range in ranges.ranges.iter().filter(|r| !r.registers.is_empty()) {
            trace!("live range {}: {} value(s)", range.name, range.registers.len());
        }

        Ok(ranges)
    }

    /// All non-empty ranges (merged-away ranges leave empty husks behind).
    pub fn iter(&self) -> impl Iterator<Item = &LiveRange> {
        self.ranges.iter().filter(|r| !r.registers.is_empty())
    }

    /// The range holding `full_text`.
    pub fn range_of(&self, full_text: &str) -> Result<&LiveRange> {
        let idx = *self
            .index
            .get(full_text)
            .ok_or_else(|| OptimizerError::lookup("live range", full_text))?;
        Ok(&self.ranges[idx])
    }

    pub fn range_of_value(&self, value: &Value) -> Result<&LiveRange> {
        self.range_of(&value.full_text())
    }

    /// Union the range of `into` with the range of `from`; `into`'s range
    /// keeps its name and absorbs the other's members.
    fn merge(&mut self, into: &str, from: &str) -> Result<()> {
        let into_idx = *self
            .index
            .get(into)
            .ok_or_else(|| OptimizerError::lookup("live range", into))?;
        let from_idx = *self
            .index
            .get(from)
            .ok_or_else(|| OptimizerError::lookup("live range", from))?;
        if into_idx == from_idx {
            return Ok(());
        }

        let absorbed = std::mem::take(&mut self.ranges[from_idx].registers);
        for value in &absorbed {
            self.index.insert(value.full_text(), into_idx);
        }
        self.ranges[into_idx].registers.extend(absorbed);
        Ok(())
    }
}

/// Reconstruct a register value from its `name_subscript` rendition.
fn value_from_full_text(full_text: &str) -> Value {
    match full_text.rsplit_once('_') {
        Some((name, subscript)) => {
            let mut value = Value::reg(name);
            value.set_subscript(subscript);
            value
        }
        None => Value::reg(full_text),
    }
}
