//! The ILOC opcode set and its classification tables.

use std::str::FromStr;

use crate::optimizer::error::OptimizerError;

/// Instruction categories. Every opcode belongs to exactly one; category is
/// a deterministic function of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Expression,
    Memory,
    LoadImmediate,
    Branch,
    Io,
    Test,
    Nop,
}

/// ILOC opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    // integer arithmetic / logic
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    And,
    Or,
    Not,
    Lshift,
    Rshift,
    // immediate forms
    Addi,
    Subi,
    Multi,
    Lshifti,
    Rshifti,
    // float arithmetic
    Fadd,
    Fsub,
    Fmult,
    Fdiv,
    // comparisons
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    CmpEq,
    CmpNe,
    Comp,
    Fcomp,
    // tests
    Testeq,
    Testne,
    Testgt,
    Testge,
    Testlt,
    Testle,
    // conversions
    F2i,
    I2f,
    // moves
    I2i,
    F2f,
    // memory
    Load,
    Loadai,
    Loadao,
    Store,
    Storeai,
    Storeao,
    Fload,
    Floadai,
    Floadao,
    Fstore,
    Fstoreai,
    Fstoreao,
    // load immediate
    Loadi,
    // branches
    Jumpi,
    Jump,
    Cbr,
    Cbrne,
    CbrLt,
    CbrLe,
    CbrGt,
    CbrGe,
    CbrEq,
    CbrNe,
    Ret,
    Iret,
    Fret,
    // io
    Iread,
    Fread,
    Iwrite,
    Fwrite,
    Swrite,
    // calls
    Call,
    Icall,
    Fcall,
    // nop
    Nop,
}

impl Opcode {
    /// The category this opcode belongs to.
    pub fn category(self) -> Category {
        use Opcode::*;
        match self {
            Add | Sub | Mult | Div | Mod | And | Or | Not | Lshift | Rshift | Addi | Subi
            | Multi | Lshifti | Rshifti | Fadd | Fsub | Fmult | Fdiv | CmpLt | CmpLe | CmpGt
            | CmpGe | CmpEq | CmpNe | Comp | Fcomp | F2i | I2f | Call | Icall | Fcall => {
                Category::Expression
            }
            Testeq | Testne | Testgt | Testge | Testlt | Testle => Category::Test,
            I2i | F2f | Load | Loadai | Loadao | Store | Storeai | Storeao | Fload | Floadai
            | Floadao | Fstore | Fstoreai | Fstoreao => Category::Memory,
            Loadi => Category::LoadImmediate,
            Jumpi | Jump | Cbr | Cbrne | CbrLt | CbrLe | CbrGt | CbrGe | CbrEq | CbrNe | Ret
            | Iret | Fret => Category::Branch,
            Iread | Fread | Iwrite | Fwrite | Swrite => Category::Io,
            Nop => Category::Nop,
        }
    }

    /// Opcodes with observable effects beyond their lvalues: stores, loads
    /// through an address, calls and returns, unconditional jumps, and I/O.
    /// These seed the dead-code worklist.
    pub fn has_side_effects(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Call | Icall
                | Fcall
                | Ret
                | Iret
                | Fret
                | Loadai
                | Loadao
                | Store
                | Storeai
                | Storeao
                | Fload
                | Floadai
                | Floadao
                | Fstore
                | Fstoreai
                | Fstoreao
                | Jumpi
                | Jump
                | Iread
                | Fread
                | Iwrite
                | Fwrite
                | Swrite
        )
    }

    /// Store-family opcodes: every operand is an rvalue even though one is
    /// syntactically a target address.
    pub fn is_store(self) -> bool {
        use Opcode::*;
        matches!(self, Store | Storeai | Storeao | Fstore | Fstoreai | Fstoreao)
    }

    /// Return-family opcodes; the block ending in one is the procedure's
    /// exit block.
    pub fn is_return(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Iret | Opcode::Fret)
    }

    /// Call-family opcodes. These are the only instructions allowed more
    /// than one lvalue (the by-reference actual arguments, preceded by the
    /// return value for `icall`/`fcall`).
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::Icall | Opcode::Fcall)
    }

    /// Branches whose taken-ness depends on a register: the `cbr` family.
    /// `jump`/`jumpi` and the returns are excluded.
    pub fn is_conditional_branch(self) -> bool {
        use Opcode::*;
        matches!(self, Cbr | Cbrne | CbrLt | CbrLe | CbrGt | CbrGe | CbrEq | CbrNe)
    }

    /// Opcodes whose result depends on state outside the program text, and
    /// which therefore must never enter a value-numbering expression table.
    pub fn reads_external(self) -> bool {
        use Opcode::*;
        matches!(self, Iread | Fread | Call | Icall | Fcall)
    }

    /// Commutative integer expressions, eligible for operand swapping
    /// during value numbering.
    pub fn is_commutative(self) -> bool {
        matches!(self, Opcode::Add | Opcode::Mult)
    }

    /// The immediate-form counterpart of this opcode, if one exists.
    pub fn immediate_form(self) -> Option<Opcode> {
        match self {
            Opcode::Add => Some(Opcode::Addi),
            Opcode::Sub => Some(Opcode::Subi),
            Opcode::Mult => Some(Opcode::Multi),
            Opcode::Lshift => Some(Opcode::Lshifti),
            Opcode::Rshift => Some(Opcode::Rshifti),
            _ => None,
        }
    }

    /// The textual name emitted for this opcode.
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Add => "add",
            Sub => "sub",
            Mult => "mult",
            Div => "div",
            Mod => "mod",
            And => "and",
            Or => "or",
            Not => "not",
            Lshift => "lshift",
            Rshift => "rshift",
            Addi => "addi",
            Subi => "subi",
            Multi => "multi",
            Lshifti => "lshifti",
            Rshifti => "rshifti",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmult => "fmult",
            Fdiv => "fdiv",
            CmpLt => "cmp_lt",
            CmpLe => "cmp_le",
            CmpGt => "cmp_gt",
            CmpGe => "cmp_ge",
            CmpEq => "cmp_eq",
            CmpNe => "cmp_ne",
            Comp => "comp",
            Fcomp => "fcomp",
            Testeq => "testeq",
            Testne => "testne",
            Testgt => "testgt",
            Testge => "testge",
            Testlt => "testlt",
            Testle => "testle",
            F2i => "f2i",
            I2f => "i2f",
            I2i => "i2i",
            F2f => "f2f",
            Load => "load",
            Loadai => "loadai",
            Loadao => "loadao",
            Store => "store",
            Storeai => "storeai",
            Storeao => "storeao",
            Fload => "fload",
            Floadai => "floadai",
            Floadao => "floadao",
            Fstore => "fstore",
            Fstoreai => "fstoreai",
            Fstoreao => "fstoreao",
            Loadi => "loadI",
            Jumpi => "jumpI",
            Jump => "jump",
            Cbr => "cbr",
            Cbrne => "cbrne",
            CbrLt => "cbr_lt",
            CbrLe => "cbr_le",
            CbrGt => "cbr_gt",
            CbrGe => "cbr_ge",
            CbrEq => "cbr_eq",
            CbrNe => "cbr_ne",
            Ret => "ret",
            Iret => "iret",
            Fret => "fret",
            Iread => "iread",
            Fread => "fread",
            Iwrite => "iwrite",
            Fwrite => "fwrite",
            Swrite => "swrite",
            Call => "call",
            Icall => "icall",
            Fcall => "fcall",
            Nop => "nop",
        }
    }
}

impl FromStr for Opcode {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Opcode::*;
        // opcode mnemonics are matched case-insensitively; `loadI`/`jumpI`
        // appear both ways in the wild
        let op = match s.to_ascii_lowercase().as_str() {
            "add" => Add,
            "sub" => Sub,
            "mult" => Mult,
            "div" => Div,
            "mod" => Mod,
            "and" => And,
            "or" => Or,
            "not" => Not,
            "lshift" => Lshift,
            "rshift" => Rshift,
            "addi" => Addi,
            "subi" => Subi,
            "multi" => Multi,
            "lshifti" => Lshifti,
            "rshifti" => Rshifti,
            "fadd" => Fadd,
            "fsub" => Fsub,
            "fmult" => Fmult,
            "fdiv" => Fdiv,
            "cmp_lt" => CmpLt,
            "cmp_le" => CmpLe,
            "cmp_gt" => CmpGt,
            "cmp_ge" => CmpGe,
            "cmp_eq" => CmpEq,
            "cmp_ne" => CmpNe,
            "comp" => Comp,
            "fcomp" => Fcomp,
            "testeq" => Testeq,
            "testne" => Testne,
            "testgt" => Testgt,
            "testge" => Testge,
            "testlt" => Testlt,
            "testle" => Testle,
            "f2i" => F2i,
            "i2f" => I2f,
            "i2i" => I2i,
            "f2f" => F2f,
            "load" => Load,
            "loadai" => Loadai,
            "loadao" => Loadao,
            "store" => Store,
            "storeai" => Storeai,
            "storeao" => Storeao,
            "fload" => Fload,
            "floadai" => Floadai,
            "floadao" => Floadao,
            "fstore" => Fstore,
            "fstoreai" => Fstoreai,
            "fstoreao" => Fstoreao,
            "loadi" => Loadi,
            "jumpi" => Jumpi,
            "jump" => Jump,
            "cbr" => Cbr,
            "cbrne" => Cbrne,
            "cbr_lt" => CbrLt,
            "cbr_le" => CbrLe,
            "cbr_gt" => CbrGt,
            "cbr_ge" => CbrGe,
            "cbr_eq" => CbrEq,
            "cbr_ne" => CbrNe,
            "ret" => Ret,
            "iret" => Iret,
            "fret" => Fret,
            "iread" => Iread,
            "fread" => Fread,
            "iwrite" => Iwrite,
            "fwrite" => Fwrite,
            "swrite" => Swrite,
            "call" => Call,
            "icall" => Icall,
            "fcall" => Fcall,
            "nop" => Nop,
            _ => {
                return Err(OptimizerError::UnsupportedOperation(format!(
                    "unknown opcode `{s}`"
                )))
            }
        };
        Ok(op)
    }
}
