//! Operand values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// What kind of token an operand is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Unknown,
    /// `%vrN`
    VirtualReg,
    /// decimal literal
    Number,
    /// identifier (block label or procedure name)
    Label,
}

/// How the register holding this value is used, as inferred by the
/// register-behavior pass. `Memory` registers hold addresses; `Expression`
/// registers hold computed scalars; `Mixed` registers are expressions over
/// at least one memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Behavior {
    #[default]
    Unknown,
    Memory,
    Expression,
    Mixed,
}

/// A single operand occurrence.
///
/// Two values compare equal iff their name, SSA subscript, and type all
/// match. The `behavior` tag is advisory and excluded from equality so a
/// later behavior-inference run cannot perturb any name-keyed table.
#[derive(Debug, Clone)]
pub struct Value {
    name: String,
    subscript: String,
    vtype: ValueType,
    behavior: Behavior,
}

impl Value {
    pub fn new(name: impl Into<String>, vtype: ValueType, behavior: Behavior) -> Self {
        Value {
            name: name.into(),
            subscript: String::new(),
            vtype,
            behavior,
        }
    }

    pub fn reg(name: impl Into<String>) -> Self {
        Value::new(name, ValueType::VirtualReg, Behavior::Unknown)
    }

    pub fn number(n: i64) -> Self {
        Value::new(n.to_string(), ValueType::Number, Behavior::Expression)
    }

    pub fn label(name: impl Into<String>) -> Self {
        Value::new(name, ValueType::Label, Behavior::Unknown)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscript(&self) -> &str {
        &self.subscript
    }

    pub fn value_type(&self) -> ValueType {
        self.vtype
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn is_virtual_reg(&self) -> bool {
        self.vtype == ValueType::VirtualReg
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_subscript(&mut self, sub: impl Into<String>) {
        self.subscript = sub.into();
    }

    pub fn set_type(&mut self, vtype: ValueType) {
        self.vtype = vtype;
    }

    pub fn set_behavior(&mut self, behavior: Behavior) {
        self.behavior = behavior;
    }

    /// The name-and-subscript rendition used as a map key wherever SSA
    /// versions must be distinguished: `%vr4_2` for a subscripted register,
    /// the bare name otherwise.
    pub fn full_text(&self) -> String {
        if self.vtype == ValueType::VirtualReg && !self.subscript.is_empty() {
            format!("{}_{}", self.name, self.subscript)
        } else {
            self.name.clone()
        }
    }

    /// Numeric literal view, if this operand is one.
    pub fn as_number(&self) -> Option<i64> {
        if self.vtype == ValueType::Number {
            self.name.parse().ok()
        } else {
            None
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.subscript == other.subscript && self.vtype == other.vtype
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.subscript.hash(state);
        self.vtype.hash(state);
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.subscript.cmp(&other.subscript))
            .then_with(|| self.vtype.cmp(&other.vtype))
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_text())
    }
}
