//! End-to-end scenarios run through the full `Cpu` driver: fetch, issue,
//! speculative execution, and retirement all participate, unlike the
//! module-local unit tests that exercise one subsystem in isolation.

use pretty_assertions::assert_eq;
use rvsim_core::isa::{AluOp, BranchCond, MulOp, Width};
use rvsim_core::word::Word;
use rvsim_core::Config;

use crate::common::*;

/// `x1 = 1; x2 = x1 + x1; x3 = x2 + 1; x4 = x2 * x2; x5 = x2 + x3`.
#[test]
fn scenario_1_arithmetic_sequence() {
    let mut ctx = TestContext::default_config();
    ctx.load(vec![
        alu_imm(0, AluOp::Add, 1, ZERO, 1),
        alu_reg(4, AluOp::Add, 2, 1, 1),
        alu_imm(8, AluOp::Add, 3, 2, 1),
        mul_reg(12, MulOp::Mul, 4, 2, 2),
        alu_reg(16, AluOp::Add, 5, 2, 3),
    ]);
    ctx.run_to_completion(500);

    assert_eq!(ctx.reg_word(1), Word::new(1));
    assert_eq!(ctx.reg_word(2), Word::new(2));
    assert_eq!(ctx.reg_word(3), Word::new(3));
    assert_eq!(ctx.reg_word(4), Word::new(4));
    assert_eq!(ctx.reg_word(5), Word::new(5));
}

/// Writes to `x0` are dropped and reads of `x0` always observe zero, even
/// after a store/load round trip through an address computed from `x0`.
#[test]
fn scenario_2_zero_register_semantics() {
    let mut ctx = TestContext::default_config();
    ctx.load(vec![
        alu_imm(0, AluOp::Add, ZERO, ZERO, 42),
        alu_imm(4, AluOp::Add, 1, ZERO, 0),
        alu_imm(8, AluOp::Add, 2, 2, 16),
        store(12, Width::Word, 2, 2, 0),
        load(16, Width::Word, false, ZERO, 2, 0),
        alu_imm(20, AluOp::Add, 2, ZERO, 0),
    ]);
    ctx.run_to_completion(500);

    assert_eq!(ctx.reg_word(ZERO), Word::new(0));
    assert_eq!(ctx.reg_word(1), Word::new(0));
    assert_eq!(ctx.reg_word(2), Word::new(0));
}

/// Calls the same subroutine three times (interleaved with a call to a
/// second routine) and checks the return-address stack keeps every call
/// site paired with the right return, rather than confusing them.
#[test]
fn scenario_3_return_stack_discipline() {
    let mut ctx = TestContext::default_config();
    let mut program = vec![
        alu_imm(0, AluOp::Add, A0, ZERO, 0),
        jump(4, RA, 28),  // call add_two, return to 8
        jump(8, RA, 28),  // call add_two, return to 12
        jump(12, RA, 36), // call mul_ten, return to 16
        jump(16, RA, 28), // call add_two, return to 20
        alu_imm(20, AluOp::Add, A7, ZERO, SYS_EXIT),
        ecall(24),
    ];
    // add_two: a0 += 2; ret
    program.push(alu_imm(28, AluOp::Add, A0, A0, 2));
    program.push(jump_register(32, ZERO, RA, 0));
    // mul_ten: t1 = a0 << 3; a0 <<= 1; a0 += t1; ret
    program.push(alu_imm(36, AluOp::Sll, T1, A0, 3));
    program.push(alu_imm(40, AluOp::Sll, A0, A0, 1));
    program.push(alu_reg(44, AluOp::Add, A0, A0, T1));
    program.push(jump_register(48, ZERO, RA, 0));

    ctx.load(program);
    ctx.run_to_completion(2000);

    // 0 -> +2 -> +2 -> *10 -> +2 == 42
    assert_eq!(ctx.reg_word(A0), Word::new(42));
}

/// A branch that mispredicts must roll every speculatively-issued
/// instruction back; only the correct-path trip count survives.
#[test]
fn scenario_5_branch_rollback() {
    let mut ctx = TestContext::default_config();
    ctx.load(vec![
        alu_imm(0, AluOp::Add, 1, ZERO, 3),
        alu_imm(4, AluOp::Add, 1, 1, -1),
        branch(8, BranchCond::Ne, 1, ZERO, 4),
    ]);
    ctx.run_to_completion(2000);

    assert_eq!(ctx.reg_word(1), Word::new(0));
}

/// Cross-referenced against `core::cache`'s own
/// `scenario_6_lru_cache_policy_determinism` unit test; this is the same
/// fixture exercised through the public `Cache` API rather than its
/// private fields, for §8 end-to-end coverage.
#[test]
fn scenario_6_lru_cache_policy_determinism() {
    use rvsim_core::config::{CacheConfig, ReplacementPolicy};
    use rvsim_core::core::cache::Cache;

    let mut cache = Cache::new(&CacheConfig {
        sets: 4,
        ways: 2,
        line_size: 4,
        replacement_policy: ReplacementPolicy::Lru,
        ..CacheConfig::default()
    })
    .unwrap();

    cache.write(0, 0, true);
    cache.write(17, 17, true);
    assert_eq!(cache.read(0, true), Some(0));
    cache.write(33, 33, true);

    assert_eq!(cache.read(0, true), Some(0));
    assert_eq!(cache.read(17, true), None);
    assert_eq!(cache.read(33, true), Some(33));
}

/// A speculative load of a privileged, never-written address reads the
/// "unwritten privileged" marker byte and faults at retirement — but a
/// *second*, dependent load that uses that value to pick an address isn't
/// blocked by the hazard tracker (only overlapping Load/Store addresses
/// create a wait), so it executes and fills the cache before the rollback
/// erases every architectural trace of the secret. The cache line it
/// touched stays filled after rollback, leaking the byte through timing.
#[test]
fn scenario_4_meltdown_speculative_read_leaves_a_cache_trace() {
    const PROBE_BASE: i64 = 0x1000;
    const STRIDE_SHIFT: i64 = 9; // scales the 0-255 secret across distinct cache lines

    let mut ctx = TestContext::default_config();
    ctx.load(vec![
        load(0, Width::Byte, false, 1, ZERO, 0x8000_0000i64),
        alu_imm(4, AluOp::Sll, 2, 1, STRIDE_SHIFT),
        load(8, Width::Byte, false, 3, 2, PROBE_BASE),
    ]);

    let fault = ctx.run_until_fault(200).expect("the privileged load must fault at retirement");
    assert_eq!(fault.instr.addr, 0);
    assert_eq!(fault.address, Some(0x8000_0000));

    let secret = 0x42u32;
    let leaked_addr = (PROBE_BASE + ((secret as i64) << STRIDE_SHIFT)) as u32;
    let wrong_guess_addr = (PROBE_BASE + ((0x41i64) << STRIDE_SHIFT)) as u32;

    assert!(ctx.cpu.memory().is_addr_cached(leaked_addr), "the probe line for the true secret must be cached");
    assert!(
        !ctx.cpu.memory().is_addr_cached(wrong_guess_addr),
        "a line that was never actually touched must not be cached"
    );
}

/// With the mitigation enabled, the value forwarded out of the faulting
/// load is scrubbed to zero before the dependent load ever sees it, so the
/// *data-dependent* probe address it computes no longer encodes the
/// secret — this specific channel is closed. But the cache still fills for
/// the secret's own (directly-addressed) line regardless, which is the
/// narrower property the mitigation does not and cannot touch.
#[test]
fn scenario_4_mitigation_closes_the_data_dependent_probe_but_not_the_direct_line() {
    const PROBE_BASE: i64 = 0x1000;
    const STRIDE_SHIFT: i64 = 9;

    let mut config = Config::default();
    config.mitigations.illegal_read_return_zero = true;
    let mut ctx = TestContext::new(config);
    ctx.load(vec![
        load(0, Width::Byte, false, 1, ZERO, 0x8000_0000i64),
        alu_imm(4, AluOp::Sll, 2, 1, STRIDE_SHIFT),
        load(8, Width::Byte, false, 3, 2, PROBE_BASE),
    ]);

    ctx.run_until_fault(200).expect("the privileged load must still fault");

    let secret = 0x42u32;
    let leaked_addr = (PROBE_BASE + ((secret as i64) << STRIDE_SHIFT)) as u32;
    let scrubbed_addr = PROBE_BASE as u32; // what the probe actually used: secret forwarded as 0

    assert!(!ctx.cpu.memory().is_addr_cached(leaked_addr), "the scrubbed value must not reach the probe address");
    assert!(ctx.cpu.memory().is_addr_cached(scrubbed_addr), "the probe still executes, just against address 0");
    assert!(
        ctx.cpu.memory().is_addr_cached(0x8000_0000),
        "the secret's own line is cached regardless of the mitigation"
    );
}
