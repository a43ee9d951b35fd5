//! Integration tests for register allocation

use ilocopt_core::optimizer::ir::{Opcode, Program, Value};
use ilocopt_core::optimizer::parser::parse_program;
use ilocopt_core::optimizer::passes::{
    Pass, RegisterAllocationPass, RegisterBehaviorPass, SsaConstructionPass,
};

fn run_alloc(source: &str) -> (Program, RegisterAllocationPass) {
    let program = parse_program(source).unwrap();
    let program = RegisterBehaviorPass.apply(program).unwrap();
    let program = SsaConstructionPass.apply(program).unwrap();
    let mut pass = RegisterAllocationPass::default();
    let program = pass.apply(program).unwrap();
    (program, pass)
}

/// Every virtual-register operand must carry a colour in [0, 8) after
/// allocation.
fn assert_all_colored(program: &Program) {
    let check = |value: &Value| {
        if !value.is_virtual_reg() {
            return;
        }
        let digits: String = value.name().chars().skip(3).collect();
        let n: u8 = digits
            .parse()
            .unwrap_or_else(|_| panic!("{} is not a coloured name", value.name()));
        assert!(n < 8, "{} is out of the palette", value.name());
    };

    for proc in &program.procedures {
        for block in proc.ordered_blocks() {
            for inst in &block.instructions {
                if inst.is_deleted() {
                    continue;
                }
                inst.operation.rvalues.iter().for_each(&check);
                inst.operation.lvalues.iter().for_each(&check);
            }
        }
    }
}

#[test]
fn requires_ssa_form() {
    let program = parse_program("\t.frame main, 0\n\tret\n").unwrap();
    assert!(RegisterAllocationPass::default().apply(program).is_err());
}

#[test]
fn small_procedure_colors_without_spilling() {
    let (program, pass) = run_alloc(
        "\
\t.frame main, 0
\tloadI 1 => %vr10
\tloadI 2 => %vr11
\tadd %vr10, %vr11 => %vr12
\tiwrite %vr12
\tret
",
    );

    assert_eq!(pass.spill_count, 0);
    assert_eq!(program.procedures[0].frame.size, 0, "no slots were carved");
    assert_all_colored(&program);

    // the two simultaneously live operands got distinct registers
    let entry = program.procedures[0].block("entry").unwrap();
    let add = entry
        .instructions
        .iter()
        .find(|inst| inst.operation.opcode == Opcode::Add)
        .unwrap();
    assert_ne!(
        add.operation.rvalues[0].name(),
        add.operation.rvalues[1].name()
    );
}

#[test]
fn interfering_ranges_never_share_a_color() {
    let (program, _) = run_alloc(
        "\
\t.frame main, 0
\tloadI 1 => %vr10
\tloadI 2 => %vr11
\tloadI 3 => %vr12
\tadd %vr10, %vr11 => %vr13
\tadd %vr13, %vr12 => %vr14
\tiwrite %vr14
\tret
",
    );
    assert_all_colored(&program);

    // %vr10, %vr11, %vr12 are simultaneously live at the first add
    let entry = program.procedures[0].block("entry").unwrap();
    let first_add = entry
        .instructions
        .iter()
        .find(|inst| inst.operation.opcode == Opcode::Add)
        .unwrap();
    let a = first_add.operation.rvalues[0].name().to_string();
    let b = first_add.operation.rvalues[1].name().to_string();
    let third = entry
        .instructions
        .iter()
        .find(|inst| {
            inst.operation.opcode == Opcode::Loadi
                && inst.operation.lvalues[0].subscript().starts_with("%vr12")
        })
        .unwrap();
    let c = third.operation.lvalues[0].name().to_string();

    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(b, c);
}

#[test]
fn oversubscription_spills_and_converges() {
    // six values live at once under four usable colours
    let (program, pass) = run_alloc(
        "\
\t.frame main, 0
\tloadI 1 => %vr10
\tloadI 2 => %vr11
\tloadI 3 => %vr12
\tloadI 4 => %vr13
\tloadI 5 => %vr14
\tloadI 6 => %vr15
\tadd %vr10, %vr11 => %vr20
\tadd %vr20, %vr12 => %vr21
\tadd %vr21, %vr13 => %vr22
\tadd %vr22, %vr14 => %vr23
\tadd %vr23, %vr15 => %vr24
\tiwrite %vr24
\tret
",
    );

    assert!(pass.spill_count > 0, "six-way pressure must spill");
    assert!(pass.iterations >= 2, "a spill forces another round");
    assert_all_colored(&program);

    let proc = &program.procedures[0];
    assert_eq!(
        proc.frame.size,
        4 * pass.spill_count as i64,
        "one 4-byte slot per spilled range"
    );

    // reloads were inserted ahead of the uses
    let entry = proc.block("entry").unwrap();
    let reloads = entry
        .instructions
        .iter()
        .filter(|inst| inst.operation.opcode == Opcode::Loadai)
        .count();
    assert!(reloads > 0);
}

#[test]
fn spilled_argument_is_stored_on_entry_and_reloaded_before_return() {
    // the unused by-reference argument is the cheapest spill candidate
    let (program, pass) = run_alloc(
        "\
\t.frame f, 4, %vr30
\tloadI 1 => %vr10
\tloadI 2 => %vr11
\tloadI 3 => %vr12
\tloadI 4 => %vr13
\tloadI 5 => %vr14
\tloadI 6 => %vr15
\tadd %vr10, %vr11 => %vr20
\tadd %vr20, %vr12 => %vr21
\tadd %vr21, %vr13 => %vr22
\tadd %vr22, %vr14 => %vr23
\tadd %vr23, %vr15 => %vr24
\tjumpI -> .L1
.L1: iwrite %vr24
\tret
",
    );

    assert!(pass.spill_count > 0);

    let proc = &program.procedures[0];
    assert!(proc.frame.size >= 4 + 4, "slots extend the declared area");

    let entry = proc.block("entry").unwrap();
    let arg_stored = entry.instructions.iter().any(|inst| {
        inst.operation.opcode == Opcode::Storeai
            && inst.operation.rvalues[0].subscript() == "%vr30_0"
    });
    let arg_reloaded = entry.instructions.iter().any(|inst| {
        inst.operation.opcode == Opcode::Loadai
            && inst
                .operation
                .lvalues
                .first()
                .is_some_and(|lval| lval.subscript() == "%vr30_0")
    });

    if arg_stored {
        // call-by-reference: the caller must observe the final value
        assert!(
            arg_reloaded,
            "a spilled argument needs its reload in the exit predecessor"
        );
    }
}

#[test]
fn reserved_registers_keep_their_colors() {
    let (program, _) = run_alloc(
        "\
\t.frame main, 8
\tloadI 7 => %vr10
\tstoreai %vr10 => %vr0, -4
\tloadai %vr0, -4 => %vr11
\tiwrite %vr11
\tret
",
    );

    let entry = program.procedures[0].block("entry").unwrap();
    let store = entry
        .instructions
        .iter()
        .find(|inst| inst.operation.opcode == Opcode::Storeai)
        .unwrap();
    // the frame pointer stays in %vr0
    assert_eq!(store.operation.rvalues[1].name(), "%vr0");
}
