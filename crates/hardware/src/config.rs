//! Configuration schema for the simulator.
//!
//! This module owns the recognized option tree and its `serde`-driven
//! deserialization. It does *not* read files from disk — an embedding shell
//! reads JSON/TOML and hands the core a `Config` (or calls
//! [`Config::default`]).

use std::collections::HashMap;

use serde::Deserialize;

use crate::isa::Instruction;

/// Baseline constants used when a config field is entirely absent.
mod defaults {
    pub const BPU_INDEX_BITS: u32 = 4;
    pub const BPU_INIT_COUNTER: u8 = 2;
    pub const BTB_INDEX_BITS: u32 = 4;
    pub const CACHE_SETS: u32 = 4;
    pub const CACHE_WAYS: u32 = 2;
    pub const CACHE_LINE_SIZE: u32 = 4;
    pub const CACHE_HIT_CYCLES: u32 = 1;
    pub const CACHE_MISS_CYCLES: u32 = 10;
    pub const MEM_WRITE_CYCLES: u32 = 1;
    pub const MEM_FAULT_CYCLES: u32 = 1;
    pub const ENGINE_REGS: usize = 32;
    pub const ENGINE_SLOTS: usize = 16;
    pub const INSTR_QUEUE_SIZE: usize = 8;
}

/// Cache eviction algorithm, selected per the cache's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    #[default]
    #[serde(alias = "Random")]
    Rr,
    #[serde(alias = "Lru")]
    Lru,
    #[serde(alias = "Fifo")]
    Fifo,
}

/// Reservation-station retirement discipline; see the execution engine's
/// tick protocol for the behavior each selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetireMode {
    Legacy,
    #[default]
    Loose,
    Strict,
}

/// Branch prediction unit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BpuConfig {
    /// Use the direct-mapped per-PC predictor instead of one shared counter.
    #[serde(default)]
    pub advanced: bool,
    /// `log2` of the direct-mapped predictor's table size.
    #[serde(default = "BpuConfig::default_index_bits")]
    pub index_bits: u32,
    /// Initial value of every 2-bit saturating counter.
    #[serde(default = "BpuConfig::default_init_counter")]
    pub init_counter: u8,
    #[serde(rename = "BTB", default)]
    pub btb: BtbConfig,
    #[serde(rename = "RSB", default)]
    pub rsb: RsbConfig,
}

impl BpuConfig {
    fn default_index_bits() -> u32 {
        defaults::BPU_INDEX_BITS
    }
    fn default_init_counter() -> u8 {
        defaults::BPU_INIT_COUNTER
    }
}

impl Default for BpuConfig {
    fn default() -> Self {
        Self {
            advanced: false,
            index_bits: Self::default_index_bits(),
            init_counter: Self::default_init_counter(),
            btb: BtbConfig::default(),
            rsb: RsbConfig::default(),
        }
    }
}

/// Branch target buffer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BtbConfig {
    /// `log2` of the number of direct-mapped entries.
    #[serde(default = "BtbConfig::default_index_bits")]
    pub index_bits: u32,
}

impl BtbConfig {
    fn default_index_bits() -> u32 {
        defaults::BTB_INDEX_BITS
    }
}

impl Default for BtbConfig {
    fn default() -> Self {
        Self { index_bits: Self::default_index_bits() }
    }
}

/// Return stack buffer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RsbConfig {
    /// Maximum depth; defaults to the BTB's index span (`2^index_bits`).
    #[serde(default)]
    pub max_depth: Option<u32>,
}

impl Default for RsbConfig {
    fn default() -> Self {
        Self { max_depth: None }
    }
}

/// Set-associative cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_sets")]
    pub sets: u32,
    #[serde(default = "CacheConfig::default_ways")]
    pub ways: u32,
    #[serde(default = "CacheConfig::default_line_size")]
    pub line_size: u32,
    #[serde(default)]
    pub replacement_policy: ReplacementPolicy,
    #[serde(default = "CacheConfig::default_hit_cycles")]
    pub cache_hit_cycles: u32,
    #[serde(default = "CacheConfig::default_miss_cycles")]
    pub cache_miss_cycles: u32,
}

impl CacheConfig {
    fn default_sets() -> u32 {
        defaults::CACHE_SETS
    }
    fn default_ways() -> u32 {
        defaults::CACHE_WAYS
    }
    fn default_line_size() -> u32 {
        defaults::CACHE_LINE_SIZE
    }
    fn default_hit_cycles() -> u32 {
        defaults::CACHE_HIT_CYCLES
    }
    fn default_miss_cycles() -> u32 {
        defaults::CACHE_MISS_CYCLES
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sets: Self::default_sets(),
            ways: Self::default_ways(),
            line_size: Self::default_line_size(),
            replacement_policy: ReplacementPolicy::default(),
            cache_hit_cycles: Self::default_hit_cycles(),
            cache_miss_cycles: Self::default_miss_cycles(),
        }
    }
}

/// Backing-store timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "MemoryConfig::default_write_cycles")]
    pub num_write_cycles: u32,
    #[serde(default = "MemoryConfig::default_fault_cycles")]
    pub num_fault_cycles: u32,
}

impl MemoryConfig {
    fn default_write_cycles() -> u32 {
        defaults::MEM_WRITE_CYCLES
    }
    fn default_fault_cycles() -> u32 {
        defaults::MEM_FAULT_CYCLES
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            num_write_cycles: Self::default_write_cycles(),
            num_fault_cycles: Self::default_fault_cycles(),
        }
    }
}

/// Transient-execution mitigation toggles.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MitigationsConfig {
    /// Zero the returned value (not the cache line fill) on a faulting read.
    #[serde(default)]
    pub illegal_read_return_zero: bool,
}

/// Execution engine sizing and retirement policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionEngineConfig {
    #[serde(default = "ExecutionEngineConfig::default_regs")]
    pub regs: usize,
    #[serde(default = "ExecutionEngineConfig::default_slots")]
    pub slots: usize,
    #[serde(default)]
    pub retire_mode: RetireMode,
}

impl ExecutionEngineConfig {
    fn default_regs() -> usize {
        defaults::ENGINE_REGS
    }
    fn default_slots() -> usize {
        defaults::ENGINE_SLOTS
    }
}

impl Default for ExecutionEngineConfig {
    fn default() -> Self {
        Self {
            regs: Self::default_regs(),
            slots: Self::default_slots(),
            retire_mode: RetireMode::default(),
        }
    }
}

/// Instruction frontend queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrQConfig {
    #[serde(default = "InstrQConfig::default_size")]
    pub size: usize,
}

impl InstrQConfig {
    fn default_size() -> usize {
        defaults::INSTR_QUEUE_SIZE
    }
}

impl Default for InstrQConfig {
    fn default() -> Self {
        Self { size: Self::default_size() }
    }
}

/// Root configuration, deserializable from JSON/TOML or built with
/// [`Config::default`].
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "BPU", default)]
    pub bpu: BpuConfig,
    #[serde(rename = "Cache", default)]
    pub cache: CacheConfig,
    #[serde(rename = "Memory", default)]
    pub memory: MemoryConfig,
    #[serde(rename = "Mitigations", default)]
    pub mitigations: MitigationsConfig,
    #[serde(rename = "ExecutionEngine", default)]
    pub execution_engine: ExecutionEngineConfig,
    #[serde(rename = "InstrQ", default)]
    pub instr_q: InstrQConfig,
    /// Maps an instruction kind name (e.g. `"load"`, `"branch"`) to a
    /// pre-parsed recovery sequence injected into the frontend on fault.
    #[serde(rename = "Microprograms", default, skip_deserializing)]
    pub microprograms: HashMap<String, Vec<Instruction>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bpu: BpuConfig::default(),
            cache: CacheConfig::default(),
            memory: MemoryConfig::default(),
            mitigations: MitigationsConfig::default(),
            execution_engine: ExecutionEngineConfig::default(),
            instr_q: InstrQConfig::default(),
            microprograms: HashMap::new(),
        }
    }
}

impl RsbConfig {
    /// Resolves the configured depth, defaulting to the BTB's index span.
    #[must_use]
    pub fn resolved_depth(&self, btb_index_bits: u32) -> u32 {
        self.max_depth.unwrap_or(1u32 << btb_index_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.sets, 4);
        assert_eq!(config.cache.ways, 2);
        assert_eq!(config.cache.line_size, 4);
        assert_eq!(config.execution_engine.retire_mode, RetireMode::Loose);
        assert!(!config.mitigations.illegal_read_return_zero);
    }

    #[test]
    fn rsb_depth_defaults_to_btb_span() {
        let rsb = RsbConfig::default();
        assert_eq!(rsb.resolved_depth(4), 16);
    }

    #[test]
    fn deserializes_partial_json() {
        let json = r#"{"Cache": {"sets": 8}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.cache.sets, 8);
        assert_eq!(config.cache.ways, 2);
    }
}
