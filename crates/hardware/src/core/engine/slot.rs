//! Reservation-station slot state machine.
//!
//! Every in-flight instruction owns exactly one slot. A slot advances
//! through `executing -> executed -> retiring -> retired` one sub-stage per
//! tick; the engine in `mod.rs` drives the transitions, this module only
//! describes what each variant carries and how far along it is.

use std::collections::HashSet;

use crate::core::memory::MemResult;
use crate::core::regfile::{RegValue, SlotId};
use crate::isa::{Instruction, SerializingEffect};
use crate::word::Word;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stage {
    Executing,
    Executed,
    Retiring,
    Retired,
}

/// Surfaced by `tick()` when a slot's retirement finds an architectural
/// fault. Plain data, not an error type — a mispredicted branch produces
/// one of these every time it happens, which is expected traffic, not an
/// exceptional condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultInfo {
    pub instr: Instruction,
    pub effect: Option<SerializingEffect>,
    pub prediction: Option<bool>,
    pub address: Option<u32>,
    pub next_instr_addr: Option<u32>,
}

/// Per-kind execute/retire state. Shares the macro state machine in
/// [`Stage`]; only the bookkeeping each kind needs to reach a result
/// differs.
#[derive(Clone, Debug)]
pub enum SlotBody {
    /// ALU-reg, ALU-imm, MulReg, LoadImm, Cyclecount: a pure function of
    /// concrete operands, gated by a cycle counter.
    Compute { cycles_remaining: u32 },
    Load(MemBody),
    Store(MemBody),
    Flush,
    FlushAll,
    Branch { cycles_remaining: u32, predicted_taken: bool, actual_taken: Option<bool> },
    Jump,
    JumpRegister { predicted_target: u32, actual_target: Option<u32> },
    /// `fence`/`ecall`/`ebreak`: waits for every slot occupied at issue time
    /// to retire before executing.
    Serializing { preceding: HashSet<SlotId>, effect: SerializingEffect },
}

#[derive(Clone, Debug, Default)]
pub struct MemBody {
    pub effective_addr: Option<u32>,
    pub hazards: HashSet<SlotId>,
    pub memory_result: Option<MemResult>,
    /// Latched copies of the memory result's own cycle budget, decremented
    /// independently in execute (`cycles_value`) and retire (`cycles_fault`).
    pub cycles_value: Option<u32>,
    pub cycles_fault: Option<u32>,
}

/// One reservation-station entry.
#[derive(Clone, Debug)]
pub struct Slot {
    pub instr: Instruction,
    pub stage: Stage,
    /// Operand values aligned 1:1 with `instr.ops`; register-source indices
    /// start as `SlotRef` and resolve to `Word` via CDB broadcast. Indices
    /// that are immediates or the destination slot are `Word` from the
    /// start (the destination entry is never read).
    pub operands: Vec<RegValue>,
    pub body: SlotBody,
    pub result: Option<Word>,
    /// Captured at issue time for potentially-faulting slots: the set of
    /// faulting-capable slots that must retire before this one may signal
    /// its own fault.
    pub preceding_faulting: Option<HashSet<SlotId>>,
    /// Captured at issue time for potentially-faulting slots: the
    /// architectural register file, used to roll back on this slot's
    /// fault. Kept current via the same CDB notifications as `operands`.
    pub register_snapshot: Option<[RegValue; 32]>,
    /// Set once `_tick_retire` has run; `None` means "no fault", `Some`
    /// carries the fault to surface on the next sweep of the `Retired`
    /// stage.
    pub retire_outcome: Option<Option<FaultInfo>>,
}

impl Slot {
    #[must_use]
    pub fn new(instr: Instruction, operands: Vec<RegValue>, body: SlotBody) -> Self {
        Self {
            instr,
            stage: Stage::Executing,
            operands,
            body,
            result: None,
            preceding_faulting: None,
            register_snapshot: None,
            retire_outcome: None,
        }
    }

    /// Replaces every `SlotRef(slot)` in this slot's operands and register
    /// snapshot with `value`, as happens on a CDB broadcast.
    pub fn notify_result(&mut self, slot: SlotId, value: Word) {
        for operand in &mut self.operands {
            if *operand == RegValue::SlotRef(slot) {
                *operand = RegValue::Word(value);
            }
        }
        if let Some(snapshot) = &mut self.register_snapshot {
            for reg in &mut snapshot[1..] {
                if *reg == RegValue::SlotRef(slot) {
                    *reg = RegValue::Word(value);
                }
            }
        }
    }

    /// Drops `slot` from every set that names predecessors, as happens
    /// when that predecessor retires.
    pub fn notify_retired(&mut self, slot: SlotId) {
        if let Some(preceding) = self.preceding_faulting.as_mut() {
            preceding.remove(&slot);
        }
        match &mut self.body {
            SlotBody::Load(mem) | SlotBody::Store(mem) => {
                mem.hazards.remove(&slot);
            }
            SlotBody::Serializing { preceding, .. } => {
                preceding.remove(&slot);
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn operand_word(&self, idx: usize) -> Option<Word> {
        self.operands[idx].as_word()
    }
}
