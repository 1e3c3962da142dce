//! Instruction frontend: prediction-driven fetch into a bounded queue.
//!
//! Holds the program counter and a FIFO of not-yet-issued instructions,
//! each tagged with whatever direction/target prediction was made for it
//! at fetch time. Consulting the BPU/BTB/RSB and advancing the PC happens
//! here, before the execution engine ever sees the instruction; this is
//! what makes branch mispredictions and speculative loads observable in
//! the first place.

use std::collections::VecDeque;

use crate::config::InstrQConfig;
use crate::core::bpu::{Bpu, Btb, Rsb};
use crate::isa::{Instruction, InstructionKind, Program, RegId};

/// An instruction in the fetch queue, paired with the prediction made for
/// it at fetch time (`None` for non-branching instructions and
/// microprogram entries).
#[derive(Clone, Debug)]
pub struct InstrFrontendInfo {
    pub instr: Instruction,
    pub prediction: Option<bool>,
    pub addr_prediction: Option<u32>,
}

#[derive(Clone)]
pub struct Frontend {
    max_length: usize,
    pc: u32,
    pc_bounds: (u32, u32),
    stalled: bool,
    queue: VecDeque<InstrFrontendInfo>,
}

impl Frontend {
    /// Builds a frontend positioned at `program.entry_pc`, bounded to the
    /// program's text segment.
    #[must_use]
    pub fn new(program: &Program, config: &InstrQConfig) -> Self {
        let lower = program.text.base_addr;
        let upper = lower + (program.text.instructions.len() as u32) * 4;
        Self {
            max_length: config.size,
            pc: program.entry_pc,
            pc_bounds: (lower, upper),
            stalled: false,
            queue: VecDeque::new(),
        }
    }

    /// Resumes fetching after a serializing instruction's stall.
    pub fn unstall(&mut self) {
        self.stalled = false;
    }

    /// Fills the queue with upcoming instructions, predicting branch/jump
    /// targets as it goes, until stalled, full, or out of program bounds.
    pub fn add_instructions_to_queue(
        &mut self,
        program: &Program,
        bpu: &Bpu,
        btb: &Btb,
        rsb: &mut Rsb,
    ) {
        while !self.stalled && self.queue.len() < self.max_length && self.pc < self.pc_bounds.1 {
            let instr = program
                .instruction_at(self.pc)
                .expect("frontend pc within bounds names a fetchable instruction")
                .clone();

            let mut prediction = None;
            let mut addr_prediction = None;

            match instr.kind {
                InstructionKind::Branch { .. } => {
                    let taken = bpu.predict(self.pc);
                    prediction = Some(taken);
                    if taken {
                        self.pc = instr.imm_operand(2).value();
                    } else {
                        self.pc += 4;
                    }
                }
                InstructionKind::Jump => {
                    let target = instr.imm_operand(1).value();
                    prediction = Some(true);
                    addr_prediction = Some(target);
                    let link_reg = instr.reg_operand(0);
                    rsb.handle(instr.addr, None, link_reg);
                    self.pc = target;
                }
                InstructionKind::JumpRegister => {
                    let link_reg = instr.reg_operand(0);
                    let base_reg = instr.reg_operand(1);
                    prediction = Some(true);
                    let predicted = rsb
                        .handle(instr.addr, Some(base_reg), link_reg)
                        .unwrap_or_else(|| btb.predict(instr.addr));
                    addr_prediction = Some(predicted);
                    self.pc = predicted;
                }
                InstructionKind::Serializing { .. } => {
                    self.stalled = true;
                    self.pc += 4;
                }
                _ => {
                    self.pc += 4;
                }
            }

            self.queue.push_back(InstrFrontendInfo { instr, prediction, addr_prediction });
        }
    }

    /// Appends a microprogram directly to the queue, ignoring the length
    /// bound. Register jumps are rejected; branches/direct jumps move the
    /// PC to their target without touching any predictor.
    ///
    /// # Panics
    ///
    /// Panics if the microprogram contains a [`InstructionKind::JumpRegister`]
    /// — callers are expected to validate microprograms before injection.
    pub fn add_micro_program(&mut self, micro_prog: Vec<Instruction>) {
        for instr in micro_prog {
            assert!(
                !matches!(instr.kind, InstructionKind::JumpRegister),
                "jump-register is unsupported inside a microprogram"
            );
            if let InstructionKind::Branch { .. } = instr.kind {
                self.pc = instr.imm_operand(2).value();
            } else if let InstructionKind::Jump = instr.kind {
                self.pc = instr.imm_operand(1).value();
            }
            self.queue.push_back(InstrFrontendInfo { instr, prediction: None, addr_prediction: None });
        }
    }

    /// Redirects the PC to the architecturally-correct path after a branch
    /// misprediction and refills the queue.
    pub fn add_instructions_after_branch(
        &mut self,
        taken: bool,
        instr_addr: u32,
        target: u32,
        program: &Program,
        bpu: &Bpu,
        btb: &Btb,
        rsb: &mut Rsb,
    ) {
        self.pc = if taken { target } else { instr_addr + 4 };
        self.add_instructions_to_queue(program, bpu, btb, rsb);
    }

    /// Removes and returns the oldest queued instruction.
    ///
    /// # Panics
    ///
    /// Panics if the queue is empty.
    pub fn pop_instruction_from_queue(&mut self) -> InstrFrontendInfo {
        self.queue.pop_front().expect("instruction queue is empty")
    }

    #[must_use]
    pub fn fetch_instruction_from_queue(&self) -> Option<&InstrFrontendInfo> {
        self.queue.front()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Empties the queue and cancels any pending stall.
    pub fn flush_instruction_queue(&mut self) {
        self.queue.clear();
        self.stalled = false;
    }

    /// Repositions the PC to an arbitrary in-bounds, aligned address.
    ///
    /// # Panics
    ///
    /// Panics if `new_pc` is misaligned or out of the program's bounds.
    pub fn set_pc(&mut self, new_pc: u32) {
        assert!(new_pc % 4 == 0, "pc {new_pc:#x} misaligned");
        assert!(
            self.pc_bounds.0 <= new_pc && new_pc <= self.pc_bounds.1,
            "pc {new_pc:#x} out of bounds"
        );
        self.pc = new_pc;
    }

    #[must_use]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// The `[lower, upper)` address range the frontend will fetch from.
    #[must_use]
    pub fn pc_bounds(&self) -> (u32, u32) {
        self.pc_bounds
    }

    /// True once the PC has reached the upper bound and the queue is
    /// empty. Not monotonic: injecting a microprogram or resetting the PC
    /// after this was observed can make it false again.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.pc >= self.pc_bounds.1 && self.queue.is_empty()
    }
}
