//! Replacement-policy behavior exercised through `Cache`'s public API,
//! parameterized across the three selectable policies.

use rstest::rstest;
use rvsim_core::config::{CacheConfig, ReplacementPolicy};
use rvsim_core::core::cache::Cache;

fn cache_with(policy: ReplacementPolicy, sets: u32, ways: u32, line_size: u32) -> Cache {
    Cache::new(&CacheConfig { sets, ways, line_size, replacement_policy: policy, ..CacheConfig::default() }).unwrap()
}

#[rstest]
#[case(ReplacementPolicy::Rr)]
#[case(ReplacementPolicy::Lru)]
#[case(ReplacementPolicy::Fifo)]
fn write_then_read_round_trips_under_every_policy(#[case] policy: ReplacementPolicy) {
    let mut cache = cache_with(policy, 4, 2, 4);
    cache.write(8, 0x55, true);
    assert_eq!(cache.read(8, true), Some(0x55));
}

#[rstest]
#[case(ReplacementPolicy::Rr)]
#[case(ReplacementPolicy::Lru)]
#[case(ReplacementPolicy::Fifo)]
fn flush_all_invalidates_under_every_policy(#[case] policy: ReplacementPolicy) {
    let mut cache = cache_with(policy, 4, 2, 4);
    cache.write(0, 1, true);
    cache.write(4, 2, true);
    cache.flush_all();
    assert!(!cache.is_cached(0));
    assert!(!cache.is_cached(4));
}

#[rstest]
#[case(ReplacementPolicy::Rr)]
#[case(ReplacementPolicy::Lru)]
#[case(ReplacementPolicy::Fifo)]
fn an_invalid_line_is_always_filled_before_eviction_kicks_in(#[case] policy: ReplacementPolicy) {
    // One set, two ways: the second distinct line should land in the spare
    // way rather than evicting the first, regardless of the policy in use.
    let mut cache = cache_with(policy, 1, 2, 4);
    cache.write(0, 10, true);
    cache.write(4, 20, true);
    assert_eq!(cache.read(0, true), Some(10));
    assert_eq!(cache.read(4, true), Some(20));
}

#[test]
fn lru_evicts_the_least_recently_touched_line() {
    let mut cache = cache_with(ReplacementPolicy::Lru, 1, 2, 4);
    cache.write(0, 1, true);
    cache.write(4, 2, true);
    cache.read(0, true); // touches line 0, making line 4 the LRU victim
    cache.write(8, 3, true);
    assert_eq!(cache.read(0, true), Some(1));
    assert_eq!(cache.read(4, true), None);
    assert_eq!(cache.read(8, true), Some(3));
}

#[test]
fn fifo_evicts_the_first_filled_line_even_if_refreshed() {
    let mut cache = cache_with(ReplacementPolicy::Fifo, 1, 2, 4);
    cache.write(0, 1, true);
    cache.write(4, 2, true);
    cache.write(0, 99, true); // refresh, must not reset FIFO order
    cache.write(8, 3, true);
    assert_eq!(cache.read(0, true), None);
    assert_eq!(cache.read(4, true), Some(2));
    assert_eq!(cache.read(8, true), Some(3));
}
