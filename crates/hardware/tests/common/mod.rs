//! Shared test harness: a thin wrapper around [`Cpu`] for building tiny
//! hand-assembled programs and running them to completion.

#![allow(dead_code)]

use rvsim_core::core::regfile::RegValue;
use rvsim_core::isa::{DataSegment, Instruction, InstructionKind, Program, TextSegment};
use rvsim_core::word::Word;
use rvsim_core::{Config, Cpu};

/// Register ids matching the usual RISC-V calling convention, so test
/// programs read like the assembly they stand in for.
pub const ZERO: u8 = 0;
pub const RA: u8 = 1;
pub const T0: u8 = 5;
pub const T1: u8 = 6;
pub const A0: u8 = 10;
pub const A7: u8 = 17;

/// `ecall` syscall numbers understood by [`ecall`]'s caller; mirrors the
/// dispatch table in `core::cpu::syscall`.
pub const SYS_EXIT: i64 = -1;

pub struct TestContext {
    pub cpu: Cpu,
}

impl TestContext {
    pub fn new(config: Config) -> Self {
        Self { cpu: Cpu::new(config).expect("default config is always valid") }
    }

    pub fn default_config() -> Self {
        Self::new(Config::default())
    }

    pub fn load(&mut self, instructions: Vec<Instruction>) {
        let program = Program::new(0, TextSegment { base_addr: 0, instructions }, DataSegment::default());
        self.cpu.load_program(program);
    }

    pub fn load_with_entry(&mut self, entry_pc: u32, instructions: Vec<Instruction>) {
        let program = Program::new(entry_pc, TextSegment { base_addr: 0, instructions }, DataSegment::default());
        self.cpu.load_program(program);
    }

    /// Runs until the CPU reports it is no longer executing a program, or
    /// `max_ticks` elapses. Returns the number of ticks actually consumed.
    pub fn run_to_completion(&mut self, max_ticks: u32) -> u32 {
        let mut ticks = 0;
        loop {
            let status = self.cpu.tick();
            ticks += 1;
            if !status.executing_program || ticks >= max_ticks {
                return ticks;
            }
        }
    }

    /// Ticks until a fault is observed (returning it) or `max_ticks` elapses
    /// without one.
    pub fn run_until_fault(&mut self, max_ticks: u32) -> Option<rvsim_core::core::engine::slot::FaultInfo> {
        for _ in 0..max_ticks {
            let status = self.cpu.tick();
            if status.fault_info.is_some() {
                return status.fault_info;
            }
            if !status.executing_program {
                return None;
            }
        }
        None
    }

    pub fn reg_word(&self, idx: u8) -> Word {
        match self.cpu.reg(idx as usize) {
            RegValue::Word(w) => w,
            RegValue::SlotRef(slot) => panic!("register x{idx} still pending on slot {slot}"),
        }
    }
}

pub fn alu_reg(addr: u32, op: rvsim_core::isa::AluOp, rd: u8, rs1: u8, rs2: u8) -> Instruction {
    Instruction::new(addr, InstructionKind::AluReg { op, cycles: 1 }, vec![rd as i64, rs1 as i64, rs2 as i64])
}

pub fn alu_imm(addr: u32, op: rvsim_core::isa::AluOp, rd: u8, rs1: u8, imm: i64) -> Instruction {
    Instruction::new(addr, InstructionKind::AluImm { op, cycles: 1 }, vec![rd as i64, rs1 as i64, imm])
}

pub fn mul_reg(addr: u32, op: rvsim_core::isa::MulOp, rd: u8, rs1: u8, rs2: u8) -> Instruction {
    Instruction::new(addr, InstructionKind::MulReg { op }, vec![rd as i64, rs1 as i64, rs2 as i64])
}

pub fn load(addr: u32, width: rvsim_core::isa::Width, signed: bool, rd: u8, base: u8, offset: i64) -> Instruction {
    Instruction::new(addr, InstructionKind::Load { width, signed }, vec![rd as i64, base as i64, offset])
}

pub fn store(addr: u32, width: rvsim_core::isa::Width, value_reg: u8, base: u8, offset: i64) -> Instruction {
    Instruction::new(addr, InstructionKind::Store { width }, vec![value_reg as i64, base as i64, offset])
}

pub fn branch(addr: u32, cond: rvsim_core::isa::BranchCond, rs1: u8, rs2: u8, target: u32) -> Instruction {
    Instruction::new(addr, InstructionKind::Branch { cond, cycles: 1 }, vec![rs1 as i64, rs2 as i64, target as i64])
}

pub fn jump(addr: u32, rd: u8, target: u32) -> Instruction {
    Instruction::new(addr, InstructionKind::Jump, vec![rd as i64, target as i64])
}

pub fn jump_register(addr: u32, rd: u8, base: u8, offset: i64) -> Instruction {
    Instruction::new(addr, InstructionKind::JumpRegister, vec![rd as i64, base as i64, offset])
}

pub fn ecall(addr: u32) -> Instruction {
    Instruction::new(addr, InstructionKind::Serializing { effect: rvsim_core::isa::SerializingEffect::Ecall }, vec![])
}
