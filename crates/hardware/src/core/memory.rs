//! Byte-addressed memory subsystem: sparse backing store, cache
//! integration, and access-permission faults.
//!
//! The fault check on reads happens *after* the data has been read from the
//! backing store and written into the cache — this is the Meltdown-enabling
//! property this whole crate exists to demonstrate. A "zero on illegal"
//! mitigation can blank the *returned* value without touching the cache
//! fill, which is deliberate: it shows that scrubbing the result alone does
//! not close the covert channel.

use crate::config::{CacheConfig, MemoryConfig, MitigationsConfig};
use crate::core::cache::Cache;
use crate::error::ConfigError;
use crate::word::{Byte, Word};

/// The result of a single memory operation: a value (meaningful on success),
/// whether it faulted, and the cycle cost of each phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemResult {
    pub value: u32,
    pub fault: bool,
    pub cycles_value: u32,
    pub cycles_fault: u32,
}

/// Marker byte returned for never-written addresses in the privileged upper
/// half, distinguishing "unwritten but illegal" from "unwritten and legal".
const UNWRITTEN_PRIVILEGED_BYTE: u8 = 0x42;

#[derive(Clone)]
pub struct MemorySubsystem {
    backing: std::collections::HashMap<u32, u8>,
    cache: Cache,
    cache_hit_cycles: u32,
    cache_miss_cycles: u32,
    num_write_cycles: u32,
    num_fault_cycles: u32,
    illegal_read_return_zero: bool,
}

impl MemorySubsystem {
    /// Builds the subsystem's cache and validates configuration.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from the underlying [`Cache::new`].
    pub fn new(
        cache_config: &CacheConfig,
        memory_config: &MemoryConfig,
        mitigations: &MitigationsConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            backing: std::collections::HashMap::new(),
            cache: Cache::new(cache_config)?,
            cache_hit_cycles: cache_config.cache_hit_cycles,
            cache_miss_cycles: cache_config.cache_miss_cycles,
            num_write_cycles: memory_config.num_write_cycles,
            num_fault_cycles: memory_config.num_fault_cycles,
            illegal_read_return_zero: mitigations.illegal_read_return_zero,
        })
    }

    /// True if `addr` lies in the privileged upper half of the address space.
    #[must_use]
    pub fn is_illegal_access(addr: u32) -> bool {
        addr >= (1u32 << (Word::WIDTH - 1))
    }

    fn get_raw(&self, addr: u32) -> u8 {
        *self.backing.get(&addr).unwrap_or(&if Self::is_illegal_access(addr) {
            UNWRITTEN_PRIVILEGED_BYTE
        } else {
            0x00
        })
    }

    fn load_line(&mut self, addr: u32, side_effects: bool) {
        let line_size = self.cache.line_size();
        let base = addr - (addr % line_size);
        for offset in 0..line_size {
            let current = base + offset;
            let value = self.get_raw(current);
            self.cache.write(current, value, side_effects);
        }
    }

    /// Reads a single byte, caching the containing line before the fault
    /// check is applied.
    #[must_use]
    pub fn read_byte(&mut self, addr: u32, side_effects: bool) -> MemResult {
        let (value, cycles_value) = if let Some(cached) = self.cache.read(addr, side_effects) {
            (cached, self.cache_hit_cycles)
        } else {
            let raw = self.get_raw(addr);
            if side_effects {
                self.load_line(addr, side_effects);
            }
            (raw, self.cache_miss_cycles)
        };

        let fault = Self::is_illegal_access(addr);
        let reported_value = if fault && self.illegal_read_return_zero { 0 } else { value };

        MemResult {
            value: u32::from(reported_value),
            fault,
            cycles_value,
            cycles_fault: if fault { self.num_fault_cycles } else { 0 },
        }
    }

    /// Reads `width` (1, 2, or 4) consecutive little-endian bytes.
    #[must_use]
    pub fn read_word(&mut self, addr: u32, width: u32, sign_extend: bool, side_effects: bool) -> MemResult {
        let mut bytes = Vec::with_capacity(width as usize);
        let mut fault = false;
        let mut cycles_value = 0;
        let mut cycles_fault = 0;

        for i in 0..width {
            let r = self.read_byte(addr + i, side_effects);
            bytes.push(Byte::new(i64::from(r.value)));
            fault |= r.fault;
            cycles_value = cycles_value.max(r.cycles_value);
            cycles_fault = cycles_fault.max(r.cycles_fault);
        }

        let word = Word::from_some_bytes(&bytes, sign_extend);
        MemResult { value: word.value(), fault, cycles_value, cycles_fault }
    }

    /// Writes a single byte if legal; faulting writes commit nothing.
    pub fn write_byte(&mut self, addr: u32, value: u8, side_effects: bool) -> MemResult {
        let fault = Self::is_illegal_access(addr);
        if !fault {
            self.backing.insert(addr, value);
            if side_effects || self.cache.is_cached(addr) {
                self.cache.write(addr, value, side_effects);
            }
        }

        MemResult {
            value: 0,
            fault,
            cycles_value: self.num_write_cycles,
            cycles_fault: if fault { self.num_fault_cycles } else { 0 },
        }
    }

    /// Writes `width` little-endian bytes of `value`.
    pub fn write_word(&mut self, addr: u32, value: Word, width: u32, side_effects: bool) -> MemResult {
        let bytes = value.as_bytes();
        let mut fault = false;
        let mut cycles_value = 0;
        let mut cycles_fault = 0;

        for i in 0..width {
            let r = self.write_byte(addr + i, bytes[i as usize].value(), side_effects);
            fault |= r.fault;
            cycles_value = cycles_value.max(r.cycles_value);
            cycles_fault = cycles_fault.max(r.cycles_fault);
        }

        MemResult { value: 0, fault, cycles_value, cycles_fault }
    }

    /// Writes a contiguous byte sequence without touching the cache; used to
    /// load program text/data segments.
    pub fn write_blob(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.write_byte(addr + i as u32, b, false);
        }
    }

    pub fn flush_line(&mut self, addr: u32) {
        self.cache.flush(addr);
    }

    pub fn flush_all(&mut self) {
        self.cache.flush_all();
    }

    #[must_use]
    pub fn is_addr_cached(&self, addr: u32) -> bool {
        self.cache.is_cached(addr)
    }
}
