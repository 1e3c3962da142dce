//! Reservation-station execution engine: issue, speculative execution,
//! in-order commit, and rollback.
//!
//! This is the heart of the simulator. Instructions are issued into a pool
//! of slots in program order; each tick every occupied slot advances by at
//! most one sub-stage (`executing -> executed -> retiring -> retired`); a
//! completed result is broadcast to every dependent slot and to the
//! register file in the same tick it finishes. A fault discovered at
//! retirement rolls the whole machine back to the faulting instruction's
//! issue-time register snapshot.

pub mod slot;

use std::collections::{HashSet, VecDeque};

use self::slot::{FaultInfo, MemBody, Slot, SlotBody, Stage};
use crate::config::{ExecutionEngineConfig, RetireMode};
use crate::core::bpu::{Bpu, Btb};
use crate::core::memory::MemorySubsystem;
use crate::core::regfile::{RegValue, RegisterFile, SlotId};
use crate::isa::{Instruction, InstructionKind, RegId};
use crate::word::Word;

#[derive(Clone)]
pub struct ExecutionEngine {
    regs: RegisterFile,
    slots: Vec<Option<Slot>>,
    retire_queue: VecDeque<SlotId>,
    faulting_in_flight: HashSet<SlotId>,
    cycle: u64,
    retire_mode: RetireMode,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(config: &ExecutionEngineConfig) -> Self {
        Self {
            regs: RegisterFile::new(),
            slots: (0..config.slots).map(|_| None).collect(),
            retire_queue: VecDeque::new(),
            faulting_in_flight: HashSet::new(),
            cycle: 0,
            retire_mode: config.retire_mode,
        }
    }

    #[must_use]
    pub fn reg(&self, idx: usize) -> RegValue {
        self.regs.read(idx)
    }

    /// Overwrites a register with a concrete value outside of CDB broadcast,
    /// as a syscall handler does when it writes a return value back to the
    /// committed register file.
    pub fn set_reg(&mut self, idx: usize, value: Word) {
        self.regs.write(idx, RegValue::Word(value));
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    fn free_slot(&self) -> Option<SlotId> {
        self.slots.iter().position(Option::is_none)
    }

    fn resolve_operands(&self, instr: &Instruction) -> Vec<RegValue> {
        let mut operands = vec![RegValue::Word(Word::new(0)); instr.ops.len()];
        for &idx in instr.kind.register_source_indices() {
            operands[idx] = self.regs.read(instr.reg_operand(idx) as usize);
        }
        for &idx in instr.kind.sources() {
            if !instr.kind.register_source_indices().contains(&idx) {
                operands[idx] = RegValue::Word(instr.imm_operand(idx));
            }
        }
        operands
    }

    fn build_body(instr: &Instruction) -> SlotBody {
        match instr.kind {
            InstructionKind::AluReg { cycles, .. } | InstructionKind::AluImm { cycles, .. } => {
                SlotBody::Compute { cycles_remaining: cycles }
            }
            InstructionKind::Branch { cycles, .. } => {
                SlotBody::Branch { cycles_remaining: cycles, predicted_taken: false, actual_taken: None }
            }
            InstructionKind::MulReg { op } => SlotBody::Compute { cycles_remaining: op.cycles() },
            InstructionKind::LoadImm { .. } | InstructionKind::Cyclecount => {
                SlotBody::Compute { cycles_remaining: 1 }
            }
            InstructionKind::Load { .. } => SlotBody::Load(MemBody::default()),
            InstructionKind::Store { .. } => SlotBody::Store(MemBody::default()),
            InstructionKind::Flush => SlotBody::Flush,
            InstructionKind::FlushAll => SlotBody::FlushAll,
            InstructionKind::Jump => SlotBody::Jump,
            InstructionKind::JumpRegister => {
                SlotBody::JumpRegister { predicted_target: 0, actual_target: None }
            }
            InstructionKind::Serializing { effect } => {
                SlotBody::Serializing { preceding: HashSet::new(), effect }
            }
        }
    }

    /// Issues one instruction in program order.
    ///
    /// Refuses (returns `false`, leaving the instruction for the caller to
    /// retry next tick) if a serializing instruction currently occupies any
    /// slot, or if the reservation station is full.
    pub fn try_issue(&mut self, instr: Instruction, pred_dir: Option<bool>, pred_tgt: Option<u32>) -> bool {
        let has_serializing_in_flight =
            self.slots.iter().flatten().any(|s| matches!(s.instr.kind, InstructionKind::Serializing { .. }));
        if has_serializing_in_flight {
            return false;
        }
        let Some(id) = self.free_slot() else { return false };

        let operands = self.resolve_operands(&instr);
        let mut body = Self::build_body(&instr);

        match &mut body {
            SlotBody::Branch { predicted_taken, .. } => *predicted_taken = pred_dir.unwrap_or(false),
            SlotBody::JumpRegister { predicted_target, .. } => *predicted_target = pred_tgt.unwrap_or(instr.addr + 4),
            SlotBody::Serializing { preceding, .. } => {
                *preceding = self.slots.iter().enumerate().filter(|(_, s)| s.is_some()).map(|(i, _)| i).collect();
            }
            _ => {}
        }

        let is_faulting = instr.kind.is_potentially_faulting();
        let destination = instr.destination();

        let mut slot = Slot::new(instr, operands, body);
        if is_faulting {
            slot.preceding_faulting = Some(self.faulting_in_flight.clone());
            slot.register_snapshot = Some(self.regs.snapshot());
        }

        if let Some(dest) = destination {
            if dest != 0 {
                self.regs.write(dest as usize, RegValue::SlotRef(id));
            }
        }

        self.retire_queue.push_back(id);
        if is_faulting {
            self.faulting_in_flight.insert(id);
        }
        self.slots[id] = Some(slot);
        true
    }

    /// Advances every occupied slot by at most one sub-stage. Returns the
    /// fault surfaced by a rolled-back slot's retirement, if any.
    pub fn tick(&mut self, memory: &mut MemorySubsystem, bpu: &mut Bpu, btb: &mut Btb) -> Option<FaultInfo> {
        self.cycle += 1;
        let ids: Vec<SlotId> = (0..self.slots.len()).filter(|&i| self.slots[i].is_some()).collect();

        let mut executed_this_tick = false;
        let mut retired_this_tick = false;
        let mut fault = None;

        for id in ids {
            let Some(stage) = self.slots[id].as_ref().map(|s| s.stage) else { continue };

            match stage {
                Stage::Executing => {
                    if let Some(result) = self.tick_execute(id, memory, bpu, btb) {
                        let slot = self.slots[id].as_mut().unwrap();
                        slot.result = Some(result);
                        slot.stage = Stage::Executed;
                    }
                }
                Stage::Executed => {
                    if executed_this_tick {
                        continue;
                    }
                    executed_this_tick = true;
                    let result = self.slots[id].as_ref().unwrap().result.unwrap();
                    self.broadcast(id, result);
                    self.slots[id].as_mut().unwrap().stage = Stage::Retiring;
                    if self.retire_mode == RetireMode::Legacy {
                        return None;
                    }
                }
                Stage::Retiring => {
                    let can_progress = self.retire_mode != RetireMode::Strict || self.retire_queue.front() == Some(&id);
                    if !can_progress {
                        continue;
                    }
                    let outcome = self.tick_retire(id, memory, bpu, btb);
                    if let Some(outcome) = outcome {
                        let slot = self.slots[id].as_mut().unwrap();
                        slot.retire_outcome = Some(outcome);
                        slot.stage = Stage::Retired;
                    }
                }
                Stage::Retired => {
                    if retired_this_tick {
                        continue;
                    }
                    retired_this_tick = true;
                    let outcome = self.slots[id].as_ref().unwrap().retire_outcome.clone().unwrap();
                    match outcome {
                        None => {
                            let can_free = self.retire_mode == RetireMode::Legacy
                                || self.retire_queue.front() == Some(&id);
                            if can_free {
                                self.notify_retired(id);
                                self.retire_queue.retain(|&x| x != id);
                                self.faulting_in_flight.remove(&id);
                                self.slots[id] = None;
                            }
                        }
                        Some(fault_info) => {
                            let snapshot = self.slots[id].as_ref().unwrap().register_snapshot;
                            fault = Some(fault_info);
                            self.rollback(snapshot);
                            break;
                        }
                    }
                }
            }
        }

        fault
    }

    fn broadcast(&mut self, id: SlotId, value: Word) {
        self.regs.resolve_slot(id, value);
        for slot in self.slots.iter_mut().flatten() {
            slot.notify_result(id, value);
        }
    }

    fn notify_retired(&mut self, id: SlotId) {
        for slot in self.slots.iter_mut().flatten() {
            slot.notify_retired(id);
        }
    }

    fn rollback(&mut self, snapshot: Option<[RegValue; 32]>) {
        if let Some(snapshot) = snapshot {
            self.regs.restore(&snapshot);
        }
        for slot in &mut self.slots {
            *slot = None;
        }
        self.faulting_in_flight.clear();
        self.retire_queue.clear();
    }

    /// Byte ranges intersect.
    fn ranges_overlap(a_addr: u32, a_len: u32, b_addr: u32, b_len: u32) -> bool {
        a_addr < b_addr + b_len && b_addr < a_addr + a_len
    }

    fn tick_execute(
        &mut self,
        id: SlotId,
        memory: &mut MemorySubsystem,
        bpu: &mut Bpu,
        btb: &mut Btb,
    ) -> Option<Word> {
        let addr = self.slots[id].as_ref().unwrap().instr.addr;
        let kind = self.slots[id].as_ref().unwrap().instr.kind;

        match kind {
            InstructionKind::AluReg { op, .. } | InstructionKind::AluImm { op, .. } => {
                let slot = self.slots[id].as_mut().unwrap();
                let (a, b) = (slot.operand_word(1)?, slot.operand_word(2)?);
                match &mut slot.body {
                    SlotBody::Compute { cycles_remaining } => {
                        *cycles_remaining = cycles_remaining.saturating_sub(1);
                        if *cycles_remaining > 0 {
                            return None;
                        }
                    }
                    _ => unreachable!(),
                }
                Some(op.apply(a, b))
            }
            InstructionKind::MulReg { op } => {
                let slot = self.slots[id].as_mut().unwrap();
                let (a, b) = (slot.operand_word(1)?, slot.operand_word(2)?);
                match &mut slot.body {
                    SlotBody::Compute { cycles_remaining } => {
                        *cycles_remaining = cycles_remaining.saturating_sub(1);
                        if *cycles_remaining > 0 {
                            return None;
                        }
                    }
                    _ => unreachable!(),
                }
                Some(op.apply(a, b))
            }
            InstructionKind::LoadImm { op } => {
                let slot = self.slots[id].as_mut().unwrap();
                let imm = slot.operand_word(1)?;
                match &mut slot.body {
                    SlotBody::Compute { cycles_remaining } => {
                        *cycles_remaining = cycles_remaining.saturating_sub(1);
                        if *cycles_remaining > 0 {
                            return None;
                        }
                    }
                    _ => unreachable!(),
                }
                Some(op.apply(imm, Word::new(addr)))
            }
            InstructionKind::Cyclecount => {
                let slot = self.slots[id].as_mut().unwrap();
                match &mut slot.body {
                    SlotBody::Compute { cycles_remaining } => {
                        *cycles_remaining = cycles_remaining.saturating_sub(1);
                        if *cycles_remaining > 0 {
                            return None;
                        }
                    }
                    _ => unreachable!(),
                }
                Some(Word::new(self.cycle as u32))
            }
            InstructionKind::Load { width, signed } => self.tick_execute_load(id, memory, width.bytes(), signed),
            InstructionKind::Store { width } => self.tick_execute_store(id, memory, width.bytes()),
            InstructionKind::Flush => {
                let (base, offset) = self.slots[id].as_ref().unwrap().instr.kind.address_source_indices().unwrap();
                let slot = self.slots[id].as_ref().unwrap();
                let base_val = slot.operand_word(base)?;
                let offset_val = slot.operand_word(offset)?;
                let eff_addr = (base_val + offset_val).value();
                memory.flush_line(eff_addr);
                Some(Word::new(0))
            }
            InstructionKind::FlushAll => {
                memory.flush_all();
                Some(Word::new(0))
            }
            InstructionKind::Branch { cond, .. } => {
                let slot = self.slots[id].as_mut().unwrap();
                let (a, b) = (slot.operand_word(0)?, slot.operand_word(1)?);
                match &mut slot.body {
                    SlotBody::Branch { cycles_remaining, .. } => {
                        *cycles_remaining = cycles_remaining.saturating_sub(1);
                        if *cycles_remaining > 0 {
                            return None;
                        }
                    }
                    _ => unreachable!(),
                }
                let taken = cond.evaluate(a, b);
                bpu.update(addr, taken);
                if let SlotBody::Branch { actual_taken, .. } = &mut slot.body {
                    *actual_taken = Some(taken);
                }
                Some(Word::new(0))
            }
            InstructionKind::Jump => {
                let link_value = Word::new(addr + 4);
                Some(link_value)
            }
            InstructionKind::JumpRegister => {
                let slot = self.slots[id].as_ref().unwrap();
                let base = slot.operand_word(1)?;
                let offset = slot.operand_word(2)?;
                let target = (base + offset).value();
                btb.update(addr, target);
                let slot = self.slots[id].as_mut().unwrap();
                if let SlotBody::JumpRegister { actual_target, .. } = &mut slot.body {
                    *actual_target = Some(target);
                }
                Some(Word::new(addr + 4))
            }
            InstructionKind::Serializing { .. } => {
                let slot = self.slots[id].as_ref().unwrap();
                let SlotBody::Serializing { preceding, .. } = &slot.body else { unreachable!() };
                if !preceding.is_empty() {
                    return None;
                }
                Some(Word::new(0))
            }
        }
    }

    fn tick_execute_load(
        &mut self,
        id: SlotId,
        memory: &mut MemorySubsystem,
        width: u32,
        signed: bool,
    ) -> Option<Word> {
        let (base_idx, offset_idx) = self.slots[id].as_ref().unwrap().instr.kind.address_source_indices().unwrap();
        let slot = self.slots[id].as_ref().unwrap();
        let base = slot.operand_word(base_idx)?;
        let offset = slot.operand_word(offset_idx)?;
        let eff_addr = (base + offset).value();

        {
            let mem = match &mut self.slots[id].as_mut().unwrap().body {
                SlotBody::Load(mem) => mem,
                _ => unreachable!(),
            };
            if mem.effective_addr.is_none() {
                mem.effective_addr = Some(eff_addr);
            }
        }

        self.compute_hazards(id, eff_addr, width);
        let hazards_pending = match &self.slots[id].as_ref().unwrap().body {
            SlotBody::Load(mem) => !mem.hazards.is_empty(),
            _ => unreachable!(),
        };
        if hazards_pending {
            return None;
        }

        let mem = match &self.slots[id].as_ref().unwrap().body {
            SlotBody::Load(mem) => mem.clone(),
            _ => unreachable!(),
        };
        if mem.memory_result.is_none() {
            let result = memory.read_word(eff_addr, width, signed, true);
            let slot = self.slots[id].as_mut().unwrap();
            if let SlotBody::Load(mem) = &mut slot.body {
                mem.cycles_value = Some(result.cycles_value);
                mem.cycles_fault = Some(result.cycles_fault);
                mem.memory_result = Some(result);
            }
        }

        let slot = self.slots[id].as_mut().unwrap();
        let SlotBody::Load(mem) = &mut slot.body else { unreachable!() };
        let cycles_value = mem.cycles_value.unwrap();
        if cycles_value > 0 {
            mem.cycles_value = Some(cycles_value - 1);
            return None;
        }
        Some(Word::new(mem.memory_result.unwrap().value))
    }

    fn tick_execute_store(&mut self, id: SlotId, memory: &mut MemorySubsystem, width: u32) -> Option<Word> {
        let (base_idx, offset_idx) = self.slots[id].as_ref().unwrap().instr.kind.address_source_indices().unwrap();
        let slot = self.slots[id].as_ref().unwrap();
        let value = slot.operand_word(0)?;
        let base = slot.operand_word(base_idx)?;
        let offset = slot.operand_word(offset_idx)?;
        let eff_addr = (base + offset).value();

        {
            let mem = match &mut self.slots[id].as_mut().unwrap().body {
                SlotBody::Store(mem) => mem,
                _ => unreachable!(),
            };
            if mem.effective_addr.is_none() {
                mem.effective_addr = Some(eff_addr);
            }
        }

        self.compute_hazards(id, eff_addr, width);
        let hazards_pending = match &self.slots[id].as_ref().unwrap().body {
            SlotBody::Store(mem) => !mem.hazards.is_empty(),
            _ => unreachable!(),
        };
        if hazards_pending {
            return None;
        }

        // Stores additionally wait until every preceding potentially-faulting
        // slot has retired: they are never rolled back once committed.
        let preceding_pending =
            self.slots[id].as_ref().unwrap().preceding_faulting.as_ref().is_some_and(|p| !p.is_empty());
        if preceding_pending {
            return None;
        }

        let mem = match &self.slots[id].as_ref().unwrap().body {
            SlotBody::Store(mem) => mem.clone(),
            _ => unreachable!(),
        };
        if mem.memory_result.is_none() {
            let result = memory.write_word(eff_addr, value, width, true);
            let slot = self.slots[id].as_mut().unwrap();
            if let SlotBody::Store(mem) = &mut slot.body {
                mem.cycles_value = Some(result.cycles_value);
                mem.cycles_fault = Some(result.cycles_fault);
                mem.memory_result = Some(result);
            }
        }

        let slot = self.slots[id].as_mut().unwrap();
        let SlotBody::Store(mem) = &mut slot.body else { unreachable!() };
        let cycles_value = mem.cycles_value.unwrap();
        if cycles_value > 0 {
            mem.cycles_value = Some(cycles_value - 1);
            return None;
        }
        Some(Word::new(0))
    }

    /// Records, in the given slot's hazard set, every earlier memory slot
    /// whose effective address range overlaps `[addr, addr+width)`. Waits
    /// (returns without deciding) if an earlier memory slot has not yet
    /// computed its own effective address.
    fn compute_hazards(&mut self, id: SlotId, addr: u32, width: u32) {
        let preceding = self.slots[id].as_ref().unwrap().preceding_faulting.clone().unwrap_or_default();
        let mut hazards = HashSet::new();
        for other_id in preceding {
            let Some(other) = &self.slots[other_id] else { continue };
            let (other_addr, other_width) = match &other.body {
                SlotBody::Load(mem) | SlotBody::Store(mem) => match mem.effective_addr {
                    Some(a) => (
                        a,
                        match other.instr.kind {
                            InstructionKind::Load { width, .. } => width.bytes(),
                            InstructionKind::Store { width } => width.bytes(),
                            _ => unreachable!(),
                        },
                    ),
                    None => {
                        hazards.insert(other_id);
                        continue;
                    }
                },
                // Non-memory potentially-faulting predecessors (branch,
                // jump-register, serializing) never carry an address and
                // cannot create a memory hazard.
                _ => continue,
            };
            if Self::ranges_overlap(addr, width, other_addr, other_width) {
                hazards.insert(other_id);
            }
        }
        let slot = self.slots[id].as_mut().unwrap();
        match &mut slot.body {
            SlotBody::Load(mem) | SlotBody::Store(mem) => mem.hazards = hazards,
            _ => unreachable!(),
        }
    }

    fn tick_retire(
        &mut self,
        id: SlotId,
        memory: &mut MemorySubsystem,
        _bpu: &mut Bpu,
        _btb: &mut Btb,
    ) -> Option<Option<FaultInfo>> {
        let _ = memory;
        let instr = self.slots[id].as_ref().unwrap().instr.clone();
        let kind = instr.kind;

        match kind {
            InstructionKind::Load { .. } | InstructionKind::Store { .. } => {
                let mem = match &self.slots[id].as_ref().unwrap().body {
                    SlotBody::Load(mem) | SlotBody::Store(mem) => mem.clone(),
                    _ => unreachable!(),
                };
                let cycles_fault = mem.cycles_fault.unwrap();
                if cycles_fault > 0 {
                    let slot = self.slots[id].as_mut().unwrap();
                    match &mut slot.body {
                        SlotBody::Load(mem) | SlotBody::Store(mem) => mem.cycles_fault = Some(cycles_fault - 1),
                        _ => unreachable!(),
                    }
                    return None;
                }
                if mem.memory_result.unwrap().fault {
                    return Some(Some(FaultInfo {
                        instr: instr.clone(),
                        effect: None,
                        prediction: None,
                        address: mem.effective_addr,
                        next_instr_addr: Some(instr.addr + 4),
                    }));
                }
                Some(None)
            }
            InstructionKind::Branch { .. } => {
                let (predicted, actual) = match &self.slots[id].as_ref().unwrap().body {
                    SlotBody::Branch { predicted_taken, actual_taken, .. } => (*predicted_taken, actual_taken.unwrap()),
                    _ => unreachable!(),
                };
                if predicted != actual {
                    Some(Some(FaultInfo {
                        instr,
                        effect: None,
                        prediction: Some(predicted),
                        address: None,
                        next_instr_addr: None,
                    }))
                } else {
                    Some(None)
                }
            }
            InstructionKind::JumpRegister => {
                let (predicted_target, actual_target) = match &self.slots[id].as_ref().unwrap().body {
                    SlotBody::JumpRegister { predicted_target, actual_target } => {
                        (*predicted_target, actual_target.unwrap())
                    }
                    _ => unreachable!(),
                };
                if predicted_target != actual_target {
                    // The link value was already broadcast by `tick_execute`;
                    // patch this slot's own rollback snapshot so the
                    // writeback survives the rollback it is about to cause.
                    let dest = instr.destination();
                    let link_value = self.slots[id].as_ref().unwrap().result;
                    if let (Some(dest), Some(link_value)) = (dest, link_value) {
                        if dest != 0 {
                            if let Some(snapshot) = self.slots[id].as_mut().unwrap().register_snapshot.as_mut() {
                                snapshot[dest as usize] = RegValue::Word(link_value);
                            }
                        }
                    }
                    Some(Some(FaultInfo {
                        instr,
                        effect: None,
                        prediction: Some(false),
                        address: Some(actual_target),
                        next_instr_addr: Some(actual_target),
                    }))
                } else {
                    Some(None)
                }
            }
            InstructionKind::Serializing { effect } => match effect {
                crate::isa::SerializingEffect::Fence => Some(None),
                other => Some(Some(FaultInfo {
                    instr: instr.clone(),
                    effect: Some(other),
                    prediction: None,
                    address: None,
                    next_instr_addr: Some(instr.addr + 4),
                })),
            },
            _ => Some(None),
        }
    }

    #[must_use]
    pub fn retire_queue_len(&self) -> usize {
        self.retire_queue.len()
    }

    #[must_use]
    pub fn occupied_slot_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Resolves which register index a jump-register instruction's link goes
/// to; used by callers constructing `FaultInfo`-driven recovery.
#[must_use]
pub fn link_register_of(instr: &Instruction) -> Option<RegId> {
    instr.destination()
}
