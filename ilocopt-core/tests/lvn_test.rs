//! Integration tests for local value numbering

use ilocopt_core::optimizer::ir::{Instruction, Opcode, Program};
use ilocopt_core::optimizer::parser::parse_program;
use ilocopt_core::optimizer::passes::{LvnPass, Pass};

fn run_lvn(source: &str) -> Program {
    let program = parse_program(source).unwrap();
    LvnPass::default().apply(program).unwrap()
}

fn live_instructions<'a>(program: &'a Program, block: &str) -> Vec<&'a Instruction> {
    program.procedures[0]
        .block(block)
        .unwrap()
        .instructions
        .iter()
        .filter(|inst| !inst.is_deleted())
        .collect()
}

#[test]
fn constant_folding_and_copy_elimination() {
    let program = run_lvn(
        "\
\t.frame main, 0
\tloadI 3 => %vr4
\tloadI 4 => %vr5
\tadd %vr4, %vr5 => %vr6
\ti2i %vr6 => %vr7
\tiwrite %vr7
\tret
",
    );

    let live = live_instructions(&program, "entry");
    assert_eq!(live.len(), 5, "the i2i must be subsumed away");

    // the add folds to a load immediate of 7
    let folded = live[2];
    assert_eq!(folded.operation.opcode, Opcode::Loadi);
    assert_eq!(folded.operation.rvalues[0].name(), "7");
    assert_eq!(folded.operation.lvalues[0].name(), "%vr6");

    // the write reads the subsuming register
    let write = live[3];
    assert_eq!(write.operation.opcode, Opcode::Iwrite);
    assert_eq!(write.operation.rvalues[0].name(), "%vr6");
}

#[test]
fn redundant_expression_becomes_a_move() {
    let program = run_lvn(
        "\
\t.frame main, 0
\tadd %vr4, %vr5 => %vr6
\tadd %vr4, %vr5 => %vr7
\tiwrite %vr7
\tret
",
    );

    let live = live_instructions(&program, "entry");
    let second = live[1];
    assert_eq!(second.operation.opcode, Opcode::I2i);
    assert_eq!(second.operation.rvalues[0].name(), "%vr6");
    assert_eq!(second.operation.lvalues[0].name(), "%vr7");
}

#[test]
fn chained_redundancy_moves_from_the_first_result() {
    // x = a + b; y = x; z = a + b  =>  z copies x, not y, and does not
    // recompute
    let program = run_lvn(
        "\
\t.frame main, 0
\tadd %vr4, %vr5 => %vr6
\ti2i %vr6 => %vr7
\tadd %vr4, %vr5 => %vr8
\tiwrite %vr8
\tret
",
    );

    let live = live_instructions(&program, "entry");
    let z = live[2];
    assert_eq!(z.operation.opcode, Opcode::I2i);
    assert_eq!(z.operation.rvalues[0].name(), "%vr6");
}

#[test]
fn immediate_form_rewrite() {
    let program = run_lvn(
        "\
\t.frame main, 0
\tloadI 10 => %vr4
\tadd %vr5, %vr4 => %vr6
\tsub %vr5, %vr4 => %vr7
\tiwrite %vr6
\tret
",
    );

    let live = live_instructions(&program, "entry");
    let add = live[1];
    assert_eq!(add.operation.opcode, Opcode::Addi);
    assert_eq!(add.operation.rvalues[0].name(), "%vr5");
    assert_eq!(add.operation.rvalues[1].name(), "10");

    let sub = live[2];
    assert_eq!(sub.operation.opcode, Opcode::Subi);
    assert_eq!(sub.operation.rvalues[1].name(), "10");
}

#[test]
fn commutative_constant_swaps_to_the_right() {
    let program = run_lvn(
        "\
\t.frame main, 0
\tloadI 10 => %vr4
\tadd %vr4, %vr5 => %vr6
\tiwrite %vr6
\tret
",
    );

    let live = live_instructions(&program, "entry");
    let add = live[1];
    assert_eq!(add.operation.opcode, Opcode::Addi);
    assert_eq!(add.operation.rvalues[0].name(), "%vr5");
    assert_eq!(add.operation.rvalues[1].name(), "10");
}

#[test]
fn divide_by_zero_is_not_folded() {
    let program = run_lvn(
        "\
\t.frame main, 0
\tloadI 8 => %vr4
\tloadI 0 => %vr5
\tdiv %vr4, %vr5 => %vr6
\tiwrite %vr6
\tret
",
    );

    let live = live_instructions(&program, "entry");
    assert_eq!(live[2].operation.opcode, Opcode::Div);
}

#[test]
fn comparisons_fold_to_truth_values() {
    let program = run_lvn(
        "\
\t.frame main, 0
\tloadI 3 => %vr4
\tloadI 5 => %vr5
\tcmp_lt %vr4, %vr5 => %vr6
\tcomp %vr4, %vr5 => %vr7
\tiwrite %vr6
\tiwrite %vr7
\tret
",
    );

    let live = live_instructions(&program, "entry");
    assert_eq!(live[2].operation.opcode, Opcode::Loadi);
    assert_eq!(live[2].operation.rvalues[0].name(), "-1");
    assert_eq!(live[3].operation.opcode, Opcode::Loadi);
    assert_eq!(live[3].operation.rvalues[0].name(), "1");
}

#[test]
fn tables_reset_at_block_boundaries() {
    // the second block may not reuse the first block's expression table
    let program = run_lvn(
        "\
\t.frame main, 0
\tadd %vr4, %vr5 => %vr6
\tjumpI -> .L1
.L1: add %vr4, %vr5 => %vr7
\tiwrite %vr7
\tret
",
    );

    let l1 = program.procedures[0].block(".L1").unwrap();
    assert_eq!(l1.instructions[0].operation.opcode, Opcode::Add);
}

#[test]
fn lvn_is_idempotent() {
    let source = "\
\t.frame main, 0
\tloadI 3 => %vr4
\tloadI 4 => %vr5
\tadd %vr4, %vr5 => %vr6
\ti2i %vr6 => %vr7
\tiwrite %vr7
\tret
";
    let once = LvnPass::default()
        .apply(parse_program(source).unwrap())
        .unwrap();
    let twice = LvnPass::default().apply(once.clone()).unwrap();

    let a = ilocopt_core::optimizer::emitter::emit(&once);
    let b = ilocopt_core::optimizer::emitter::emit(&twice);
    assert_eq!(a, b);
}
