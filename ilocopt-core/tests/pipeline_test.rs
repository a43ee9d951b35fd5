//! End-to-end pipeline tests

use ilocopt_core::optimizer::emitter;
use ilocopt_core::optimizer::parser::parse_program;
use ilocopt_core::optimizer::pipeline::{run, PassSelection};

const LOOP: &str = "\
\t.data
\t.text
\t.frame main, 0
\tloadI 0 => %vr4
\tloadI 10 => %vr5
.L1: cmp_lt %vr4, %vr5 => %vr6
\tcbr %vr6 -> .L2, .L3
.L2: addi %vr4, 1 => %vr4
\tjumpI -> .L1
.L3: iwrite %vr4
\tret
";

#[test]
fn default_selection_is_lsdr() {
    let selection = PassSelection::default();
    assert_eq!(selection.as_str(), "lsdr");
    assert_eq!(selection.passes().len(), 4);
}

#[test]
fn unknown_selector_is_rejected() {
    assert!(PassSelection::parse("lsx").is_err());
    assert!(PassSelection::parse("q").is_err());
    assert!(PassSelection::parse("").is_ok());
}

#[test]
fn full_pipeline_runs_on_a_loop() {
    let program = parse_program(LOOP).unwrap();
    let selection = PassSelection::default();
    let (program, stats) = run(program, &selection).unwrap();

    assert_eq!(stats.procedures, 1);
    assert_eq!(stats.passes_run, "lsdr");

    let text = emitter::emit(&program);
    assert!(text.contains(".frame main"));
    assert!(text.contains("iwrite"));
    assert!(text.contains("ret"));
    // every register that survives allocation is a coloured one
    for token in text.split_whitespace() {
        if let Some(rest) = token.strip_prefix("%vr") {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            let n: u32 = digits.parse().unwrap();
            assert!(n < 8, "uncoloured register `{token}` in output");
        }
    }
}

#[test]
fn ssa_only_selection_leaves_executable_output() {
    // without register allocation, the pipeline translates out of SSA so
    // the emitted program is ordinary ILOC again
    let program = parse_program(LOOP).unwrap();
    let selection = PassSelection::parse("s").unwrap();
    let (program, _) = run(program, &selection).unwrap();

    assert!(!program.is_ssa());
    let reparsed = parse_program(&emitter::emit(&program)).unwrap();
    assert_eq!(reparsed.procedures.len(), 1);
}

#[test]
fn aliased_phi_slots_become_copies() {
    // the second add is value-numbered away during renaming, so the phi
    // at .L3 receives %vr4's value from .L1 and a copy must restore %vr5
    // there when translating out of SSA
    let source = "\
\t.frame main, 0
\tiread %vr8
\tcbr_lt %vr8 -> .L1, .L2
.L1: add %vr8, %vr8 => %vr4
\tadd %vr8, %vr8 => %vr5
\tjumpI -> .L3
.L2: loadI 3 => %vr5
\tjumpI -> .L3
.L3: iwrite %vr5
\tret
";
    let program = parse_program(source).unwrap();
    let (program, _) = run(program, &PassSelection::parse("s").unwrap()).unwrap();

    let l1 = program.procedures[0].block(".L1").unwrap();
    let copy = l1
        .instructions
        .iter()
        .find(|inst| inst.operation.opcode.name() == "i2i")
        .expect("the aliased phi slot needs a copy in .L1");
    assert_eq!(copy.operation.rvalues[0].name(), "%vr4");
    assert_eq!(copy.operation.lvalues[0].name(), "%vr5");

    // the copy sits ahead of the terminating jump
    let last = l1.instructions.last().unwrap();
    assert_eq!(last.operation.opcode.name(), "jumpI");
}

#[test]
fn pseudo_ops_pass_through() {
    let program = parse_program(LOOP).unwrap();
    let (program, _) = run(program, &PassSelection::parse("l").unwrap()).unwrap();
    let text = emitter::emit(&program);
    assert!(text.starts_with("\t.data\n\t.text\n"));
}

#[test]
fn stats_count_deletions() {
    let source = "\
\t.frame main, 0
\tloadI 3 => %vr4
\tloadI 4 => %vr5
\tadd %vr4, %vr5 => %vr6
\ti2i %vr6 => %vr7
\tiwrite %vr7
\tret
";
    let program = parse_program(source).unwrap();
    let (_, stats) = run(program, &PassSelection::parse("l").unwrap()).unwrap();
    assert_eq!(stats.procedures, 1);
    assert!(stats.instructions_deleted >= 1, "the i2i is subsumed away");
}

#[test]
fn dead_branch_scenario_end_to_end() {
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
    let program = parse_program(source).unwrap();
    let (program, _) = run(program, &PassSelection::parse("lsd").unwrap()).unwrap();
    let text = emitter::emit(&program);
    assert!(
        text.contains("jumpI -> .L2"),
        "the dead conditional branch must become a jump to its post-dominator:\n{text}"
    );
}
