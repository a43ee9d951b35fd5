//! Phi nodes, present only while a procedure is in SSA form.

use std::collections::BTreeMap;

use super::value::Value;

/// A phi node: one lvalue, one rvalue per predecessor block. The rvalue map
/// is keyed by predecessor name and kept sorted so emission and worklist
/// seeding are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    lvalue: Value,
    rvalues: BTreeMap<String, Value>,
    deleted: bool,
}

impl PhiNode {
    pub fn new(lvalue: Value) -> Self {
        PhiNode {
            lvalue,
            rvalues: BTreeMap::new(),
            deleted: false,
        }
    }

    pub fn lvalue(&self) -> &Value {
        &self.lvalue
    }

    pub fn set_lvalue(&mut self, lvalue: Value) {
        self.lvalue = lvalue;
    }

    pub fn rvalue_map(&self) -> &BTreeMap<String, Value> {
        &self.rvalues
    }

    pub fn add_rvalue(&mut self, pred_name: impl Into<String>, value: Value) {
        self.rvalues.insert(pred_name.into(), value);
    }

    pub fn replace_rvalue(&mut self, pred_name: &str, value: Value) {
        if let Some(slot) = self.rvalues.get_mut(pred_name) {
            *slot = value;
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}
