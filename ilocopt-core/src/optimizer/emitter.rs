//! ILOC text emission.
//!
//! Plain emission prints register names without SSA subscripts and skips
//! deleted instructions, producing a program a downstream assembler or
//! simulator can consume. Debug emission keeps full value texts, prefixes
//! deleted instructions with `(deleted)`, and renders phi nodes — it is a
//! faithful dump of the IR mid-pipeline.

use std::fmt::Write as _;

use crate::optimizer::ir::{BasicBlock, Frame, Instruction, PhiNode, Program, Value};

const TAB: &str = "\t";

/// Render a program as plain ILOC text.
pub fn emit(program: &Program) -> String {
    let mut out = String::new();

    for psop in &program.pseudo_ops {
        let _ = writeln!(out, "{TAB}{psop}");
    }

    for proc in &program.procedures {
        let _ = writeln!(out, "{TAB}{}", frame_text(&proc.frame, false));
        for block in proc.ordered_blocks() {
            out.push_str(&block_text(block));
        }
    }

    out
}

/// Render a program with full value texts, deleted markers, and phi nodes.
pub fn emit_debug(program: &Program) -> String {
    let mut out = String::new();

    for psop in &program.pseudo_ops {
        let _ = writeln!(out, "{TAB}{psop}");
    }

    for proc in &program.procedures {
        let _ = writeln!(out, "{TAB}{}", frame_text(&proc.frame, true));
        for block in proc.ordered_blocks() {
            out.push_str(&block_debug_text(block));
        }
    }

    out
}

fn frame_text(frame: &Frame, debug: bool) -> String {
    let mut text = format!(".frame {}, {}", frame.name, frame.size);
    for arg in &frame.arguments {
        text.push_str(", ");
        text.push_str(&operand_text(arg, debug));
    }
    text
}

fn operand_text(value: &Value, debug: bool) -> String {
    if debug {
        value.full_text()
    } else {
        value.name().to_string()
    }
}

fn block_text(block: &BasicBlock) -> String {
    let mut out = String::new();
    for inst in &block.instructions {
        if !inst.is_deleted() {
            out.push_str(&instruction_text(inst, false));
            out.push('\n');
        }
    }
    out
}

fn block_debug_text(block: &BasicBlock) -> String {
    let mut out = String::new();

    // phi nodes print at the top of the block body, after the label-bearing
    // first instruction if there is one
    let label_first = block
        .instructions
        .first()
        .is_some_and(|inst| inst.label.is_some());

    let mut emitted_phis = false;
    for (i, inst) in block.instructions.iter().enumerate() {
        if !emitted_phis && (!label_first || i == 1) {
            for phi in &block.phinodes {
                out.push_str(&phi_debug_text(phi));
                out.push('\n');
            }
            emitted_phis = true;
        }
        out.push_str(&instruction_text(inst, true));
        out.push('\n');
    }
    if !emitted_phis {
        for phi in &block.phinodes {
            out.push_str(&phi_debug_text(phi));
            out.push('\n');
        }
    }

    out
}

fn instruction_text(inst: &Instruction, debug: bool) -> String {
    if inst.operation.opcode.is_store() {
        return store_text(inst, debug);
    }

    let mut text = String::new();
    if debug && inst.is_deleted() {
        text.push_str("(deleted)");
    }
    match &inst.label {
        Some(label) => {
            text.push_str(label);
            text.push_str(": ");
        }
        None => text.push_str(TAB),
    }

    text.push_str(inst.operation.opcode.name());

    let mut spacer = " ";
    for rval in &inst.operation.rvalues {
        text.push_str(spacer);
        text.push_str(&operand_text(rval, debug));
        spacer = ", ";
    }

    if !inst.operation.lvalues.is_empty() {
        text.push(' ');
        text.push_str(&inst.operation.arrow);
        let mut spacer = " ";
        for lval in &inst.operation.lvalues {
            text.push_str(spacer);
            text.push_str(&operand_text(lval, debug));
            spacer = ", ";
        }
    }

    text
}

/// Stores keep every operand in the rvalue list but print as if the
/// address operands were targets: `store src => base` and
/// `storeai src => base, offset`.
fn store_text(inst: &Instruction, debug: bool) -> String {
    let mut text = String::new();
    if debug && inst.is_deleted() {
        text.push_str("(deleted)");
    }
    match &inst.label {
        Some(label) => {
            text.push_str(label);
            text.push_str(": ");
        }
        None => text.push_str(TAB),
    }

    text.push_str(inst.operation.opcode.name());

    let mut spacer = " ";
    for (i, rval) in inst.operation.rvalues.iter().enumerate() {
        if i == 0 {
            text.push_str(spacer);
            text.push_str(&operand_text(rval, debug));
            text.push(' ');
            text.push_str(&inst.operation.arrow);
        } else {
            text.push_str(spacer);
            text.push_str(&operand_text(rval, debug));
            spacer = ", ";
        }
    }

    text
}

fn phi_debug_text(phi: &PhiNode) -> String {
    let mut text = String::new();
    if phi.is_deleted() {
        text.push_str("(deleted)");
    }
    let _ = write!(text, "{TAB}(phi): {} (", phi.lvalue().full_text());
    let mut spacer = "";
    for (pred, rval) in phi.rvalue_map() {
        let _ = write!(text, "{spacer}{pred}->{}", rval.full_text());
        spacer = ", ";
    }
    text.push(')');
    text
}
