//! Integration tests for SSA construction

use ilocopt_core::optimizer::ir::Program;
use ilocopt_core::optimizer::parser::parse_program;
use ilocopt_core::optimizer::passes::{Pass, RegisterBehaviorPass, SsaConstructionPass};

fn run_ssa(source: &str) -> Program {
    let program = parse_program(source).unwrap();
    let program = RegisterBehaviorPass.apply(program).unwrap();
    SsaConstructionPass.apply(program).unwrap()
}

const DIAMOND: &str = "\
\t.frame main, 0
\tloadI 1 => %vr4
\tcbr_lt %vr4 -> .L1, .L2
.L1: loadI 10 => %vr5
\tjumpI -> .L3
.L2: loadI 20 => %vr5
\tjumpI -> .L3
.L3: iwrite %vr5
\tret
";

#[test]
fn phi_lands_at_the_join_point() {
    let program = run_ssa(DIAMOND);
    assert!(program.is_ssa());

    let proc = &program.procedures[0];
    let l3 = proc.block(".L3").unwrap();
    assert_eq!(l3.phinodes.len(), 1);

    let phi = &l3.phinodes[0];
    assert_eq!(phi.lvalue().name(), "%vr5");
    assert_eq!(phi.rvalue_map().len(), 2, "one rvalue per predecessor");

    let from_l1 = phi.rvalue_map().get(".L1").unwrap();
    let from_l2 = phi.rvalue_map().get(".L2").unwrap();
    assert_ne!(from_l1.full_text(), from_l2.full_text());

    // no phis anywhere else
    for name in ["entry", ".L1", ".L2"] {
        assert!(proc.block(name).unwrap().phinodes.is_empty());
    }
}

#[test]
fn uses_read_the_dominating_definition() {
    let program = run_ssa(DIAMOND);
    let proc = &program.procedures[0];

    let l3 = proc.block(".L3").unwrap();
    let phi = &l3.phinodes[0];
    let write = l3
        .instructions
        .iter()
        .find(|inst| !inst.is_deleted() && inst.operation.opcode.name() == "iwrite")
        .unwrap();
    assert_eq!(
        write.operation.rvalues[0].full_text(),
        phi.lvalue().full_text(),
        "the merged value flows into the use"
    );
}

#[test]
fn every_value_is_defined_exactly_once() {
    let program = run_ssa(DIAMOND);
    let proc = &program.procedures[0];

    let mut seen = std::collections::HashSet::new();
    for block in proc.ordered_blocks() {
        for inst in &block.instructions {
            if inst.is_deleted() {
                continue;
            }
            for lval in &inst.operation.lvalues {
                if lval.is_virtual_reg() {
                    assert!(
                        seen.insert(lval.full_text()),
                        "{} defined twice",
                        lval.full_text()
                    );
                }
            }
        }
        for phi in &block.phinodes {
            if !phi.is_deleted() {
                assert!(seen.insert(phi.lvalue().full_text()));
            }
        }
    }
}

#[test]
fn loop_header_phi_joins_preheader_and_latch() {
    let program = run_ssa(
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
        .expect("induction variable needs a phi at the loop header");

    let from_entry = phi.rvalue_map().get("entry").unwrap();
    let from_latch = phi.rvalue_map().get(".L2").unwrap();
    assert_ne!(from_entry.full_text(), from_latch.full_text());

    // the loop test reads the phi's result
    let test = &header
        .instructions
        .iter()
        .find(|inst| inst.operation.opcode.name() == "cmp_lt")
        .unwrap();
    assert_eq!(
        test.operation.rvalues[0].full_text(),
        phi.lvalue().full_text()
    );
}

#[test]
fn dominating_expressions_are_reused() {
    let program = run_ssa(
        "\
\t.frame main, 0
\tadd %vr4, %vr5 => %vr6
\tadd %vr4, %vr5 => %vr7
\tiwrite %vr7
\tret
",
    );

    let entry = program.procedures[0].block("entry").unwrap();
    assert!(
        entry.instructions[1].is_deleted(),
        "the recomputation is redundant along the dominator path"
    );

    let write = &entry.instructions[2];
    assert_eq!(write.operation.rvalues[0].name(), "%vr6");
}

#[test]
fn memory_behavior_blocks_the_reuse() {
    // %vr6 holds a loaded (memory-behavior) value: the second load must
    // not be treated as an available expression
    let program = run_ssa(
        "\
\t.frame main, 0
\tload %vr4 => %vr6
\tload %vr4 => %vr7
\tiwrite %vr7
\tret
",
    );

    let entry = program.procedures[0].block("entry").unwrap();
    assert!(!entry.instructions[1].is_deleted());
}

#[test]
fn arguments_and_reserved_registers_start_at_subscript_zero() {
    let program = run_ssa(
        "\
\t.frame f, 0, %vr10
\taddi %vr10, 1 => %vr11
\tiwrite %vr11
\tret
",
    );

    let proc = &program.procedures[0];
    assert_eq!(proc.frame.arguments[0].full_text(), "%vr10_0");

    let entry = proc.block("entry").unwrap();
    let add = &entry.instructions[0];
    assert_eq!(add.operation.rvalues[0].full_text(), "%vr10_0");
}
