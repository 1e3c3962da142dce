//! Least Recently Used replacement policy.
//!
//! Maintains a per-set usage stack (index 0 = most recently used). Both
//! ordinary accesses and fresh fills move a way to the front; the victim is
//! always the back of the stack.

use super::ReplacementPolicy;

#[derive(Clone)]
pub struct LruPolicy {
    usage: Vec<Vec<usize>>,
}

impl LruPolicy {
    #[must_use]
    pub fn new(sets: usize, ways: usize) -> Self {
        let mut usage = Vec::with_capacity(sets);
        for _ in 0..sets {
            usage.push((0..ways).collect());
        }
        Self { usage }
    }

    fn touch(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            stack.remove(pos);
        }
        stack.insert(0, way);
    }
}

impl ReplacementPolicy for LruPolicy {
    fn on_access(&mut self, set: usize, way: usize) {
        self.touch(set, way);
    }

    fn on_fill(&mut self, set: usize, way: usize) {
        self.touch(set, way);
    }

    fn choose_victim(&mut self, set: usize) -> usize {
        *self.usage[set].last().unwrap()
    }

    fn clone_box(&self) -> Box<dyn ReplacementPolicy + Send + Sync> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_is_least_recently_touched() {
        let mut policy = LruPolicy::new(1, 3);
        policy.on_fill(0, 0);
        policy.on_fill(0, 1);
        policy.on_fill(0, 2);
        policy.on_access(0, 0);
        assert_eq!(policy.choose_victim(0), 1);
    }
}
