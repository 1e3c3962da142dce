//! CPU driver: per-tick orchestration, fault dispatch, and the snapshot
//! timeline.
//!
//! This is the only module that owns every subsystem at once — frontend,
//! execution engine, memory, predictors, console — and the only place that
//! decides what happens after a fault: where the PC resumes, whether a
//! microprogram is injected, and whether the frontend's predictors need to
//! hear about a misprediction.

/// System call (ECALL) dispatch.
pub mod syscall;

use tracing::{debug_span, info, trace, warn};

use crate::config::Config;
use crate::core::bpu::{Bpu, Btb, Rsb};
use crate::core::console::ConsoleBuffer;
use crate::core::engine::slot::FaultInfo;
use crate::core::engine::ExecutionEngine;
use crate::core::frontend::Frontend;
use crate::core::memory::MemorySubsystem;
use crate::core::regfile::RegValue;
use crate::error::{ConfigError, SnapshotError};
use crate::isa::{InstructionKind, Program, SerializingEffect};
use crate::word::Word;

use self::syscall::dispatch_syscall;

/// Everything a snapshot needs to reproduce: every subsystem that changes
/// tick to tick. Configuration and microprograms are fixed at construction
/// and are not part of the timeline.
#[derive(Clone)]
struct CpuState {
    frontend: Option<Frontend>,
    bpu: Bpu,
    btb: Btb,
    rsb: Rsb,
    memory: MemorySubsystem,
    engine: ExecutionEngine,
    program: Option<Program>,
    exit_status: Option<i64>,
    console: ConsoleBuffer,
}

/// Outcome of one `Cpu::tick` call.
#[derive(Clone, Debug, Default)]
pub struct CpuStatus {
    /// False once no program is loaded, or the loaded one has finished.
    pub executing_program: bool,
    /// The fault this tick's execution engine sweep surfaced, if any.
    pub fault_info: Option<FaultInfo>,
    /// Name of the microprogram injected in response to `fault_info`, if one
    /// was configured for this instruction kind.
    pub fault_microprog: Option<String>,
    /// Addresses of instructions issued into the execution engine this tick.
    pub issued_instructions: Vec<u32>,
}

/// Drives one loaded program: frontend, execution engine, memory, and the
/// branch predictors that feed speculative fetch.
pub struct Cpu {
    state: CpuState,
    config: Config,
    timeline: Vec<CpuState>,
    timeline_index: usize,
}

impl Cpu {
    /// Builds an idle CPU from `config`. No program is loaded yet; `tick`
    /// returns `executing_program: false` until [`Cpu::load_program`] is
    /// called.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from the memory subsystem's cache
    /// construction.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let memory = MemorySubsystem::new(&config.cache, &config.memory, &config.mitigations)?;
        let state = CpuState {
            frontend: None,
            bpu: Bpu::new(&config.bpu),
            btb: Btb::new(config.bpu.btb.index_bits),
            rsb: Rsb::new(config.bpu.rsb.resolved_depth(config.bpu.btb.index_bits)),
            memory,
            engine: ExecutionEngine::new(&config.execution_engine),
            program: None,
            exit_status: None,
            console: ConsoleBuffer::new(),
        };
        let mut cpu = Self { state, config, timeline: Vec::new(), timeline_index: 0 };
        cpu.take_snapshot();
        Ok(cpu)
    }

    /// Loads `program`, resetting the frontend and execution engine and
    /// copying the data segment into memory.
    pub fn load_program(&mut self, program: Program) {
        self.state.frontend = Some(Frontend::new(&program, &self.config.instr_q));
        self.state.engine = ExecutionEngine::new(&self.config.execution_engine);
        self.state.memory.write_blob(program.data.base_addr, &program.data.bytes);
        self.state.program = Some(program);
        self.take_snapshot();
    }

    /// Advances the simulated machine by one cycle: drains fetched
    /// instructions into the execution engine, ticks the engine, reacts to
    /// any fault it surfaces, and refills the fetch queue.
    #[allow(clippy::missing_panics_doc)]
    pub fn tick(&mut self) -> CpuStatus {
        let _span = debug_span!("tick", cycle = self.state.engine.cycle()).entered();

        if self.state.frontend.is_none() {
            return CpuStatus { executing_program: false, ..CpuStatus::default() };
        }

        let mut status = CpuStatus { executing_program: true, ..CpuStatus::default() };

        loop {
            let Some(info) = self.state.frontend.as_ref().unwrap().fetch_instruction_from_queue().cloned() else {
                break;
            };
            if self.state.engine.try_issue(info.instr.clone(), info.prediction, info.addr_prediction) {
                self.state.frontend.as_mut().unwrap().pop_instruction_from_queue();
                trace!(addr = info.instr.addr, "issued");
                status.issued_instructions.push(info.instr.addr);
            } else {
                break;
            }
        }

        if let Some(fault_info) =
            self.state.engine.tick(&mut self.state.memory, &mut self.state.bpu, &mut self.state.btb)
        {
            info!(addr = fault_info.instr.addr, effect = ?fault_info.effect, "rollback");
            self.handle_fault(&mut status, &fault_info);
            status.fault_info = Some(fault_info);
        }

        {
            let program = self.state.program.clone().expect("frontend only exists once a program is loaded");
            self.state.frontend.as_mut().unwrap().add_instructions_to_queue(
                &program,
                &self.state.bpu,
                &self.state.btb,
                &mut self.state.rsb,
            );
        }

        self.take_snapshot();

        let frontend = self.state.frontend.as_ref().unwrap();
        if frontend.is_done() && self.state.engine.is_idle() {
            return CpuStatus { executing_program: false, ..CpuStatus::default() };
        }

        status
    }

    /// Implements the CPU's reaction to a fault: PC resumption, queue
    /// flush, microprogram injection, and (for branches) notifying the
    /// frontend's predictors of the correct path.
    fn handle_fault(&mut self, status: &mut CpuStatus, fault_info: &FaultInfo) {
        let mut resume_normally = true;
        let mut resume_at_pc = fault_info.instr.addr;

        if fault_info.effect == Some(SerializingEffect::Ecall) {
            let frontend = self.state.frontend.as_mut().unwrap();
            frontend.set_pc(fault_info.instr.addr + 4);
            debug_assert_eq!(frontend.queue_len(), 0, "frontend stalls on serializing instructions");

            dispatch_syscall(self, fault_info);

            self.state.frontend.as_mut().unwrap().unstall();
            resume_normally = false;
        } else if matches!(fault_info.instr.kind, InstructionKind::Load { .. } | InstructionKind::Store { .. }) {
            // We don't model exception handlers; a faulting memory access is
            // simply skipped.
            resume_at_pc += 4;
        } else if let InstructionKind::Serializing { .. } = fault_info.instr.kind {
            // Only `ebreak` reaches here (`ecall` is handled above, `fence`
            // never faults). No special handling beyond unstalling.
            self.state.frontend.as_mut().unwrap().unstall();
            resume_normally = false;
        } else if let InstructionKind::JumpRegister = fault_info.instr.kind {
            let next = fault_info.next_instr_addr.expect("jump-register fault always names next_instr_addr");
            let (lo, hi) = self.state.frontend.as_ref().unwrap().pc_bounds();
            resume_at_pc = if lo <= next && next < hi && next % 4 == 0 { next } else { resume_at_pc + 4 };
        }

        if !resume_normally {
            return;
        }

        let frontend = self.state.frontend.as_mut().unwrap();
        frontend.set_pc(resume_at_pc);
        frontend.flush_instruction_queue();

        let key = microprogram_key(fault_info.instr.kind);
        match self.config.microprograms.get(key) {
            Some(microprogram) => {
                let microprogram = microprogram.clone();
                self.state.frontend.as_mut().unwrap().add_micro_program(microprogram);
                status.fault_microprog = Some(key.to_string());
            }
            None => warn!(kind = ?fault_info.instr.kind, "no microprogram registered for faulting instruction kind"),
        }

        if let InstructionKind::Branch { .. } = fault_info.instr.kind {
            let taken = !fault_info.prediction.expect("branch fault always names its prediction");
            let target = fault_info.instr.imm_operand(2).value();
            let program = self.state.program.clone().expect("frontend only exists once a program is loaded");
            self.state.frontend.as_mut().unwrap().add_instructions_after_branch(
                taken,
                fault_info.instr.addr,
                target,
                &program,
                &self.state.bpu,
                &self.state.btb,
                &mut self.state.rsb,
            );
        }
    }

    /// Appends the current state to the snapshot timeline, discarding any
    /// snapshots taken after the current index (they describe a future that
    /// this mutation has overwritten).
    fn take_snapshot(&mut self) {
        self.timeline.truncate(self.timeline_index + if self.timeline.is_empty() { 0 } else { 1 });
        self.timeline.push(self.state.clone());
        self.timeline_index = self.timeline.len() - 1;
    }

    /// Moves the CPU's current state `steps` snapshots away from where it is
    /// now (negative steps move back in time, positive steps forward).
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::OutOfRange`] if the requested shift would
    /// move outside the recorded timeline; the CPU is left unchanged.
    pub fn restore_snapshot(&mut self, steps: i64) -> Result<(), SnapshotError> {
        let target = self.timeline_index as i64 + steps;
        if target < 0 || target >= self.timeline.len() as i64 {
            return Err(SnapshotError::OutOfRange {
                requested: steps,
                min: -(self.timeline_index as i64),
                max: (self.timeline.len() as i64) - 1 - self.timeline_index as i64,
            });
        }
        self.timeline_index = target as usize;
        self.state = self.timeline[self.timeline_index].clone();
        Ok(())
    }

    #[must_use]
    pub fn memory(&self) -> &MemorySubsystem {
        &self.state.memory
    }

    #[must_use]
    pub fn memory_mut(&mut self) -> &mut MemorySubsystem {
        &mut self.state.memory
    }

    #[must_use]
    pub fn frontend(&self) -> Option<&Frontend> {
        self.state.frontend.as_ref()
    }

    #[must_use]
    pub fn bpu(&self) -> &Bpu {
        &self.state.bpu
    }

    #[must_use]
    pub fn btb(&self) -> &Btb {
        &self.state.btb
    }

    #[must_use]
    pub fn rsb(&self) -> &Rsb {
        &self.state.rsb
    }

    #[must_use]
    pub fn engine(&self) -> &ExecutionEngine {
        &self.state.engine
    }

    #[must_use]
    pub fn reg(&self, idx: usize) -> RegValue {
        self.state.engine.reg(idx)
    }

    #[must_use]
    pub fn exit_status(&self) -> Option<i64> {
        self.state.exit_status
    }

    #[must_use]
    pub fn console(&self) -> &ConsoleBuffer {
        &self.state.console
    }

    #[must_use]
    pub fn console_mut(&mut self) -> &mut ConsoleBuffer {
        &mut self.state.console
    }
}

/// Maps a potentially-faulting instruction kind to the configuration key
/// under which its recovery microprogram is registered.
fn microprogram_key(kind: InstructionKind) -> &'static str {
    match kind {
        InstructionKind::Load { .. } => "load",
        InstructionKind::Store { .. } => "store",
        InstructionKind::Branch { .. } => "branch",
        InstructionKind::JumpRegister => "jump_register",
        InstructionKind::Serializing { effect: SerializingEffect::Ebreak } => "ebreak",
        InstructionKind::Serializing { .. } => "serializing",
        _ => "",
    }
}
