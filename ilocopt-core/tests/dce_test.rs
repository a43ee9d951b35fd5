//! Integration tests for dead-code elimination

use ilocopt_core::optimizer::emitter;
use ilocopt_core::optimizer::ir::{Opcode, Program};
use ilocopt_core::optimizer::parser::parse_program;
use ilocopt_core::optimizer::passes::{
    DeadCodeEliminationPass, Pass, RegisterBehaviorPass, SsaConstructionPass,
};

fn run_ssa_dce(source: &str) -> Program {
    let program = parse_program(source).unwrap();
    let program = RegisterBehaviorPass.apply(program).unwrap();
    let program = SsaConstructionPass.apply(program).unwrap();
    DeadCodeEliminationPass::default().apply(program).unwrap()
}

#[test]
fn requires_ssa_form() {
    let program = parse_program("\t.frame main, 0\n\tret\n").unwrap();
    assert!(DeadCodeEliminationPass::default().apply(program).is_err());
}

#[test]
fn unused_computation_is_deleted() {
    let program = run_ssa_dce(
        "\
\t.frame main, 0
\tloadI 3 => %vr4
\tloadI 5 => %vr5
\tadd %vr4, %vr4 => %vr6
\tiwrite %vr4
\tret
",
    );

    let entry = program.procedures[0].block("entry").unwrap();
    let live: Vec<&str> = entry
        .instructions
        .iter()
        .filter(|inst| !inst.is_deleted())
        .map(|inst| inst.operation.opcode.name())
        .collect();

    // the unread loadI 5 and the unread add are gone
    assert_eq!(live, vec!["loadI", "iwrite", "ret"]);
}

#[test]
fn side_effecting_instructions_all_survive() {
    let source = "\
\t.frame main, 0
\tiread %vr4
\tiwrite %vr4
\tstoreai %vr4 => %vr0, -4
\tret
";
    let program = run_ssa_dce(source);
    let entry = program.procedures[0].block("entry").unwrap();
    assert!(entry.instructions.iter().all(|inst| !inst.is_deleted()));
}

#[test]
fn dead_conditional_branch_is_rewritten_to_a_jump() {
    let program = run_ssa_dce(
        "\
\t.frame main, 0
\tloadI 1 => %vr4
\tcbr_lt %vr4 -> .L1, .L2
.L1: add %vr4, %vr4 => %vr5
\tsub %vr4, %vr4 => %vr7
.L2: loadI 7 => %vr6
\tiwrite %vr6
\tret
",
    );

    let proc = &program.procedures[0];
    let entry = proc.block("entry").unwrap();
    let (_, terminator) = entry.terminator().unwrap();
    assert_eq!(terminator.operation.opcode, Opcode::Jumpi);
    assert_eq!(terminator.operation.lvalues[0].name(), ".L2");

    // the loadI feeding the branch condition became dead with it
    assert!(entry.instructions[0].is_deleted());

    // the unlabelled dead computation is deleted, the labelled one stays
    // to keep the block entry point
    let l1 = proc.block(".L1").unwrap();
    assert!(!l1.instructions[0].is_deleted());
    assert!(l1.instructions[1].is_deleted());
}

#[test]
fn necessary_branch_survives() {
    let program = run_ssa_dce(
        "\
\t.frame main, 0
\tiread %vr4
\tcbr_lt %vr4 -> .L1, .L2
.L1: iwrite %vr4
.L2: ret
",
    );

    let entry = program.procedures[0].block("entry").unwrap();
    let (_, terminator) = entry.terminator().unwrap();
    assert_eq!(
        terminator.operation.opcode,
        Opcode::CbrLt,
        "a branch deciding whether a write runs is necessary"
    );
}

#[test]
fn loop_phi_survives_because_the_test_needs_it() {
    let program = run_ssa_dce(
        "\
\t.frame main, 0
\tloadI 0 => %vr4
\tloadI 10 => %vr5
.L1: cmp_lt %vr4, %vr5 => %vr6
\tcbr %vr6 -> .L2, .L3
.L2: addi %vr4, 1 => %vr4
\tjumpI -> .L1
.L3: iwrite %vr4
\tret
",
    );

    let proc = &program.procedures[0];
    let header = proc.block(".L1").unwrap();
    let phi = header
        .phinodes
        .iter()
        .find(|phi| phi.lvalue().name() == "%vr4")
        .unwrap();
    assert!(!phi.is_deleted());

    // every piece of the induction chain is still live
    for block in proc.ordered_blocks() {
        for inst in &block.instructions {
            assert!(!inst.is_deleted(), "nothing here is dead");
        }
    }
}

#[test]
fn unread_phi_is_deleted() {
    let program = run_ssa_dce(
        "\
\t.frame main, 0
\tiread %vr9
\tcbr_lt %vr9 -> .L1, .L2
.L1: loadI 10 => %vr5
\tjumpI -> .L3
.L2: loadI 20 => %vr5
\tjumpI -> .L3
.L3: add %vr5, %vr5 => %vr8
\tiwrite %vr9
\tret
",
    );

    let l3 = program.procedures[0].block(".L3").unwrap();
    let phi = l3
        .phinodes
        .iter()
        .find(|phi| phi.lvalue().name() == "%vr5")
        .expect("liveness placed a phi for the merged %vr5");
    assert!(
        phi.is_deleted(),
        "its only reader was dead, so the phi must go"
    );
}

#[test]
fn dce_is_idempotent() {
    let source = "\
\t.frame main, 0
\tloadI 1 => %vr4
\tcbr_lt %vr4 -> .L1, .L2
.L1: add %vr4, %vr4 => %vr5
\tsub %vr4, %vr4 => %vr7
.L2: loadI 7 => %vr6
\tiwrite %vr6
\tret
";
    let once = run_ssa_dce(source);
    let twice = DeadCodeEliminationPass::default()
        .apply(once.clone())
        .unwrap();
    assert_eq!(emitter::emit(&once), emitter::emit(&twice));
}
