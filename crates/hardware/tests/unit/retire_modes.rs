//! Retirement discipline (legacy/loose/strict) changes *when* instructions
//! retire but must never change the architectural outcome of a program.

use rstest::rstest;
use rvsim_core::config::RetireMode;
use rvsim_core::isa::AluOp;
use rvsim_core::word::Word;
use rvsim_core::Config;

use crate::common::*;

fn config_with(retire_mode: RetireMode) -> Config {
    let mut config = Config::default();
    config.execution_engine.retire_mode = retire_mode;
    config
}

#[rstest]
#[case(RetireMode::Legacy)]
#[case(RetireMode::Loose)]
#[case(RetireMode::Strict)]
fn arithmetic_sequence_is_retire_mode_invariant(#[case] retire_mode: RetireMode) {
    let mut ctx = TestContext::new(config_with(retire_mode));
    ctx.load(vec![
        alu_imm(0, AluOp::Add, 1, ZERO, 1),
        alu_reg(4, AluOp::Add, 2, 1, 1),
        alu_imm(8, AluOp::Add, 3, 2, 1),
    ]);
    ctx.run_to_completion(500);

    assert_eq!(ctx.reg_word(1), Word::new(1));
    assert_eq!(ctx.reg_word(2), Word::new(2));
    assert_eq!(ctx.reg_word(3), Word::new(3));
}

/// Strict mode (retire strictly one slot fully at a time) can never finish
/// in fewer ticks than loose mode, since loose allows independent slots to
/// overlap their retiring/freeing stages.
#[test]
fn strict_mode_never_finishes_faster_than_loose() {
    let program = || {
        vec![
            alu_imm(0, AluOp::Add, 1, ZERO, 1),
            alu_imm(4, AluOp::Add, 2, ZERO, 1),
            alu_imm(8, AluOp::Add, 3, ZERO, 1),
            alu_imm(12, AluOp::Add, 4, ZERO, 1),
        ]
    };

    let mut loose = TestContext::new(config_with(RetireMode::Loose));
    loose.load(program());
    let loose_ticks = loose.run_to_completion(500);

    let mut strict = TestContext::new(config_with(RetireMode::Strict));
    strict.load(program());
    let strict_ticks = strict.run_to_completion(500);

    assert!(strict_ticks >= loose_ticks);
}
