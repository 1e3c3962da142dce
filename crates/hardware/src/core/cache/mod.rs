//! Set-associative cache with pluggable eviction.
//!
//! Address decomposition: the low `log2(line_size)` bits are the offset,
//! the next `log2(num_sets)` bits are the index, and the remaining high
//! bits are the tag. A cache line stores its own data bytes directly
//! (unlike a pure timing model) because the core needs to serve actual
//! loaded bytes, not just hit/miss decisions.

pub mod policies;

use self::policies::{FifoPolicy, LruPolicy, RandomPolicy, ReplacementPolicy};
use crate::config::{CacheConfig, ReplacementPolicy as PolicyKind};
use crate::error::ConfigError;

/// One line of the cache: an optional tag (`None` means invalid/unused) and
/// its byte contents.
#[derive(Clone)]
struct CacheLine {
    tag: Option<u32>,
    data: Vec<u8>,
}

impl CacheLine {
    fn new(line_size: u32) -> Self {
        Self { tag: None, data: vec![0; line_size as usize] }
    }

    fn is_in_use(&self) -> bool {
        self.tag.is_some()
    }

    fn check_tag(&self, tag: u32) -> bool {
        self.tag == Some(tag)
    }

    fn invalidate(&mut self) {
        self.tag = None;
        self.data.iter_mut().for_each(|b| *b = 0);
    }
}

#[derive(Clone)]
pub struct Cache {
    sets: Vec<Vec<CacheLine>>,
    num_sets: u32,
    num_lines: u32,
    line_size: u32,
    offset_bits: u32,
    index_bits: u32,
    policy: Box<dyn ReplacementPolicy + Send + Sync>,
}

impl Cache {
    /// Builds a cache from its configuration, validating its geometry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `line_size` is not a multiple of the word
    /// size, or if the address decomposition leaves zero or negative tag
    /// bits.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        if config.sets == 0 {
            return Err(ConfigError::ZeroCapacity { field: "Cache.sets" });
        }
        if config.ways == 0 {
            return Err(ConfigError::ZeroCapacity { field: "Cache.ways" });
        }
        if config.line_size % crate::word::Word::WIDTH_BYTES != 0 {
            return Err(ConfigError::MisalignedLineSize { line_size: config.line_size });
        }

        let offset_bits = config.line_size.trailing_zeros();
        let index_bits = config.sets.trailing_zeros();
        if !config.line_size.is_power_of_two() || !config.sets.is_power_of_two() {
            return Err(ConfigError::InvalidCacheGeometry {
                sets: config.sets,
                line_size: config.line_size,
                reason: "sets and line_size must be powers of two",
            });
        }
        if offset_bits + index_bits >= crate::word::Word::WIDTH {
            return Err(ConfigError::InvalidCacheGeometry {
                sets: config.sets,
                line_size: config.line_size,
                reason: "no tag bits remain",
            });
        }

        let policy: Box<dyn ReplacementPolicy + Send + Sync> = match config.replacement_policy {
            PolicyKind::Rr => Box::new(RandomPolicy::new(config.sets as usize, config.ways as usize)),
            PolicyKind::Lru => Box::new(LruPolicy::new(config.sets as usize, config.ways as usize)),
            PolicyKind::Fifo => Box::new(FifoPolicy::new(config.sets as usize, config.ways as usize)),
        };

        let sets = (0..config.sets)
            .map(|_| (0..config.ways).map(|_| CacheLine::new(config.line_size)).collect())
            .collect();

        Ok(Self {
            sets,
            num_sets: config.sets,
            num_lines: config.ways,
            line_size: config.line_size,
            offset_bits,
            index_bits,
            policy,
        })
    }

    fn parse_addr(&self, addr: u32) -> (u32, usize, usize) {
        let tag = addr >> (self.offset_bits + self.index_bits);
        let index = (addr >> self.offset_bits) & ((1 << self.index_bits) - 1);
        let offset = addr & ((1 << self.offset_bits) - 1);
        (tag, index as usize, offset as usize)
    }

    /// True if `addr` currently has a matching valid line.
    #[must_use]
    pub fn is_cached(&self, addr: u32) -> bool {
        let (tag, index, _) = self.parse_addr(addr);
        self.sets[index].iter().any(|line| line.check_tag(tag))
    }

    /// Reads the byte at `addr` if it is cached.
    ///
    /// `side_effects = false` bypasses replacement-policy bookkeeping (used
    /// for speculative reads that should not perturb LRU/FIFO state).
    #[must_use]
    pub fn read(&mut self, addr: u32, side_effects: bool) -> Option<u8> {
        let (tag, index, offset) = self.parse_addr(addr);
        for way in 0..self.sets[index].len() {
            if self.sets[index][way].check_tag(tag) {
                if side_effects {
                    self.policy.on_access(index, way);
                }
                return Some(self.sets[index][way].data[offset]);
            }
        }
        None
    }

    /// Writes `value` at `addr`, filling an invalid line first, then a
    /// tag-matching line, then invoking the replacement policy.
    pub fn write(&mut self, addr: u32, value: u8, side_effects: bool) {
        let (tag, index, offset) = self.parse_addr(addr);

        if let Some(way) = self.sets[index].iter().position(|line| !line.is_in_use()) {
            self.sets[index][way].tag = Some(tag);
            self.sets[index][way].data[offset] = value;
            self.policy.on_fill(index, way);
            return;
        }

        if let Some(way) = self.sets[index].iter().position(|line| line.check_tag(tag)) {
            self.sets[index][way].data[offset] = value;
            if side_effects {
                self.policy.on_access(index, way);
            }
            return;
        }

        let victim = self.policy.choose_victim(index);
        self.sets[index][victim].invalidate();
        self.sets[index][victim].tag = Some(tag);
        self.sets[index][victim].data[offset] = value;
        self.policy.on_fill(index, victim);
    }

    /// Invalidates the line containing `addr`, if any.
    pub fn flush(&mut self, addr: u32) {
        let (tag, index, _) = self.parse_addr(addr);
        if let Some(way) = self.sets[index].iter().position(|line| line.check_tag(tag)) {
            self.sets[index][way].invalidate();
        }
    }

    /// Invalidates every line.
    pub fn flush_all(&mut self) {
        for set in &mut self.sets {
            for line in set {
                if line.is_in_use() {
                    line.invalidate();
                }
            }
        }
    }

    #[must_use]
    pub fn line_size(&self) -> u32 {
        self.line_size
    }

    #[must_use]
    pub fn num_sets(&self) -> u32 {
        self.num_sets
    }

    #[must_use]
    pub fn num_lines(&self) -> u32 {
        self.num_lines
    }
}
