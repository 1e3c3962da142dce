//! Architectural register file.
//!
//! Unlike a plain in-order core's register file, each slot here holds either
//! a committed [`Word`] or a [`SlotId`] naming the reservation-station entry
//! that will eventually produce it. Resolving a `SlotRef` into a concrete
//! value is the job of the execution engine's CDB broadcast, not this type —
//! the register file only stores whichever of the two is currently true.

use crate::word::Word;

/// Index into the execution engine's reservation-station slot array.
pub type SlotId = usize;

/// The contents of one register: either a committed value or a pending
/// producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegValue {
    Word(Word),
    SlotRef(SlotId),
}

impl RegValue {
    #[must_use]
    pub fn as_word(&self) -> Option<Word> {
        match self {
            RegValue::Word(w) => Some(*w),
            RegValue::SlotRef(_) => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, RegValue::SlotRef(_))
    }
}

impl Default for RegValue {
    fn default() -> Self {
        RegValue::Word(Word::new(0))
    }
}

/// 32-entry architectural register file. Register `x0` is hardwired to zero:
/// writes to it are silently dropped and reads always observe
/// `RegValue::Word(Word::new(0))`.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    regs: [RegValue; 32],
}

impl RegisterFile {
    #[must_use]
    pub fn new() -> Self {
        Self { regs: [RegValue::default(); 32] }
    }

    #[must_use]
    pub fn read(&self, idx: usize) -> RegValue {
        if idx == 0 { RegValue::Word(Word::new(0)) } else { self.regs[idx] }
    }

    pub fn write(&mut self, idx: usize, value: RegValue) {
        if idx != 0 {
            self.regs[idx] = value;
        }
    }

    /// Replaces every occurrence of `SlotRef(slot)` across the whole file
    /// with `value`, as happens on a CDB broadcast.
    pub fn resolve_slot(&mut self, slot: SlotId, value: Word) {
        for reg in &mut self.regs[1..] {
            if *reg == RegValue::SlotRef(slot) {
                *reg = RegValue::Word(value);
            }
        }
    }

    /// Overwrites the whole file, as happens on rollback to a captured
    /// snapshot.
    pub fn restore(&mut self, snapshot: &[RegValue; 32]) {
        self.regs = *snapshot;
        self.regs[0] = RegValue::Word(Word::new(0));
    }

    #[must_use]
    pub fn snapshot(&self) -> [RegValue; 32] {
        self.regs
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
