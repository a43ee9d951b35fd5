//! ILOC source parser.
//!
//! Line-oriented: a `.data` section of pass-through pseudo-ops, a `.text`
//! marker, then procedures, each opened by a `.frame` directive and
//! followed by its instructions. `//` starts a comment.
//!
//! # Block construction
//! 1. A labelled instruction begins a new block named by its label; the
//!    previous block falls through to it.
//! 2. A branch-category instruction ends its block, linking to each label
//!    operand, and opens a synthetic fall-through block linked up when the
//!    next instruction arrives.
//! 3. Empty blocks (a branch at procedure end, or a branch immediately
//!    followed by a labelled instruction) are dropped along with any link
//!    pairs that mention them.

use std::collections::HashMap;
use std::str::FromStr;

use log::debug;

use crate::optimizer::error::{OptimizerError, Result};
use crate::optimizer::ir::{
    BasicBlock, Behavior, Category, Frame, Instruction, Opcode, Operation, Procedure, Program,
    Value, ValueType,
};
use crate::optimizer::ir::ENTRY_BLOCK;

/// Parse ILOC source text into a [`Program`].
pub fn parse_program(source: &str) -> Result<Program> {
    let mut program = Program::new();
    let mut in_data = false;
    let mut saw_text = false;

    // raw (frame, instructions) pairs; blocks are formed per procedure once
    // all of its instructions are collected
    let mut current: Option<(Frame, Vec<Instruction>)> = None;

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line == ".data" {
            program.pseudo_ops.push(".data".to_string());
            in_data = true;
            continue;
        }
        if line == ".text" {
            program.pseudo_ops.push(".text".to_string());
            in_data = false;
            saw_text = true;
            continue;
        }
        if in_data {
            program.pseudo_ops.push(line.to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix(".frame") {
            if let Some((frame, instructions)) = current.take() {
                program.procedures.push(build_procedure(frame, instructions)?);
            }
            current = Some((parse_frame(rest, line_no)?, Vec::new()));
            continue;
        }

        let inst = parse_instruction(line, line_no)?;
        match current.as_mut() {
            Some((_, instructions)) => instructions.push(inst),
            None => {
                return Err(OptimizerError::ParseError {
                    line: line_no,
                    message: "instruction outside of any .frame".to_string(),
                })
            }
        }
    }

    if let Some((frame, instructions)) = current.take() {
        program.procedures.push(build_procedure(frame, instructions)?);
    }

    if !saw_text {
        // tolerated: bare procedure listings without directives
        debug!("no .text directive in input");
    }

    debug!(
        "parsed {} procedure(s), {} pseudo-op(s)",
        program.procedures.len(),
        program.pseudo_ops.len()
    );

    Ok(program)
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_frame(rest: &str, line_no: usize) -> Result<Frame> {
    let mut fields = rest.split(',').map(str::trim);

    let name = fields.next().filter(|n| !n.is_empty()).ok_or_else(|| {
        OptimizerError::ParseError {
            line: line_no,
            message: ".frame directive missing procedure name".to_string(),
        }
    })?;
    let size = fields
        .next()
        .and_then(|n| n.parse::<i64>().ok())
        .ok_or_else(|| OptimizerError::ParseError {
            line: line_no,
            message: ".frame directive missing frame size".to_string(),
        })?;

    let mut arguments = Vec::new();
    for arg in fields {
        if !arg.starts_with("%vr") {
            return Err(OptimizerError::ParseError {
                line: line_no,
                message: format!("frame argument `{arg}` is not a virtual register"),
            });
        }
        arguments.push(Value::new(arg, ValueType::VirtualReg, Behavior::Expression));
    }

    Ok(Frame {
        name: name.to_string(),
        size,
        arguments,
    })
}

fn parse_instruction(line: &str, line_no: usize) -> Result<Instruction> {
    let mut rest = line;

    // optional leading `label:`
    let mut label = None;
    if let Some(colon) = rest.find(':') {
        let candidate = rest[..colon].trim();
        if !candidate.is_empty() && !candidate.contains(char::is_whitespace) {
            label = Some(candidate.to_string());
            rest = rest[colon + 1..].trim_start();
        }
    }

    let (mnemonic, operands) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };
    let opcode = Opcode::from_str(mnemonic)?;

    let mut operation = Operation::new(opcode);

    // operands before the arrow are rvalues, after it lvalues
    let (rtext, ltext) = match operands.find("=>") {
        Some(pos) => {
            operation.arrow = "=>".to_string();
            (&operands[..pos], Some(&operands[pos + 2..]))
        }
        None => match operands.find("->") {
            Some(pos) => {
                operation.arrow = "->".to_string();
                (&operands[..pos], Some(&operands[pos + 2..]))
            }
            None => (operands, None),
        },
    };

    for text in split_operands(rtext) {
        operation.rvalues.push(classify_operand(text, &operation, line_no)?);
    }
    if let Some(ltext) = ltext {
        for text in split_operands(ltext) {
            operation.lvalues.push(classify_operand(text, &operation, line_no)?);
        }
    }

    operation.fix_values();

    let mut inst = Instruction::new(operation);
    inst.label = label;
    Ok(inst)
}

fn split_operands(text: &str) -> impl Iterator<Item = &str> {
    text.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
}

fn classify_operand(text: &str, operation: &Operation, line_no: usize) -> Result<Value> {
    if text.starts_with('%') {
        if !text.starts_with("%vr") {
            return Err(OptimizerError::ParseError {
                line: line_no,
                message: format!("malformed register `{text}`"),
            });
        }
        return Ok(Value::new(
            text,
            ValueType::VirtualReg,
            operation.result_behavior(),
        ));
    }
    if text.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-') {
        if text.parse::<i64>().is_err() {
            return Err(OptimizerError::ParseError {
                line: line_no,
                message: format!("malformed number `{text}`"),
            });
        }
        return Ok(Value::new(text, ValueType::Number, Behavior::Expression));
    }
    Ok(Value::new(text, ValueType::Label, Behavior::Unknown))
}

fn build_procedure(frame: Frame, instructions: Vec<Instruction>) -> Result<Procedure> {
    let mut proc = Procedure::new(frame);

    let mut blocks: HashMap<String, BasicBlock> = HashMap::new();
    let mut links: Vec<(String, String)> = Vec::new();
    let mut next_order: u32 = 0;
    let mut next_split: u32 = 0;
    let mut pending_fallthrough: Option<String> = None;

    let mut current = ENTRY_BLOCK.to_string();
    blocks.insert(current.clone(), BasicBlock::new(ENTRY_BLOCK, next_order));
    next_order += 1;

    for mut inst in instructions {
        if let Some(label) = inst.label.clone() {
            // a branch directly followed by a labelled instruction has no
            // fall-through edge; only its label operands link it onward
            pending_fallthrough = None;
            // straight-line code falls through into the labelled block
            links.push((current.clone(), label.clone()));
            current = label.clone();
            blocks
                .entry(label.clone())
                .or_insert_with(|| {
                    let block = BasicBlock::new(label, next_order);
                    next_order += 1;
                    block
                });
        }

        if let Some(from) = pending_fallthrough.take() {
            links.push((from, current.clone()));
        }

        let is_branch = inst.operation.category() == Category::Branch;

        inst.containing_block_name = current.clone();
        blocks
            .get_mut(&current)
            .expect("current block always exists")
            .instructions
            .push(inst);

        if is_branch {
            let block = blocks.get(&current).expect("current block always exists");
            let terminator = block.instructions.last().expect("just pushed");
            for target in &terminator.operation.lvalues {
                links.push((current.clone(), target.name().to_string()));
            }

            pending_fallthrough = Some(current.clone());
            current = format!("fall{next_split}");
            next_split += 1;
            blocks.insert(current.clone(), BasicBlock::new(current.clone(), next_order));
            next_order += 1;
        }
    }

    // drop empty blocks: a trailing branch leaves an unused fall-through
    // split, and a branch directly followed by a labelled instruction does
    // the same
    blocks.retain(|_, block| !block.instructions.is_empty());

    for (from, to) in links {
        if blocks.contains_key(&from) && blocks.contains_key(&to) {
            blocks.get_mut(&from).unwrap().after.push(to.clone());
            blocks.get_mut(&to).unwrap().before.push(from);
        }
    }

    // locate the exit block: exactly one block terminates in a return
    let mut ordered: Vec<&BasicBlock> = blocks.values().collect();
    ordered.sort_by_key(|b| b.order);
    let mut exit_name: Option<String> = None;
    for block in &ordered {
        let is_exit = block
            .instructions
            .last()
            .is_some_and(|inst| inst.operation.opcode.is_return());
        if is_exit {
            if exit_name.is_some() {
                return Err(OptimizerError::PreconditionFailed(format!(
                    "procedure `{}` has more than one return block",
                    proc.name()
                )));
            }
            exit_name = Some(block.debug_name.clone());
        }
    }
    if let Some(name) = exit_name {
        proc.set_exit_block_name(name);
    }

    for (_, block) in blocks {
        proc.add_block(block);
    }

    debug!(
        "procedure `{}`: {} block(s), exit `{}`",
        proc.name(),
        proc.block_count(),
        proc.exit_block_name()
    );

    Ok(proc)
}
