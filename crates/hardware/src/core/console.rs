//! Interaction with the world beyond the simulated machine.
//!
//! A byte-queue pair standing in for a text console, read and written by the
//! `read`/`write` syscalls. Nothing here is architectural state; it is
//! ambient I/O plumbing the syscall handlers depend on.

/// Input/output byte queues for a text console.
#[derive(Clone, Debug, Default)]
pub struct ConsoleBuffer {
    in_queue: Vec<u8>,
    out_queue: Vec<u8>,
    /// Set by `read` when the input queue was empty at the time of the call;
    /// cleared by the embedding host once it supplies more input.
    pub need_input: bool,
}

impl ConsoleBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_input(&self) -> bool {
        !self.in_queue.is_empty()
    }

    #[must_use]
    pub fn has_output(&self) -> bool {
        !self.out_queue.is_empty()
    }

    /// Appends bytes to the input queue, as an embedding host feeding
    /// stdin-like data in.
    pub fn add_input(&mut self, data: &[u8]) {
        self.in_queue.extend_from_slice(data);
    }

    /// Appends bytes to the output queue, as the `write` syscall does.
    pub fn add_output(&mut self, data: &[u8]) {
        self.out_queue.extend_from_slice(data);
    }

    /// Removes and returns up to `max_amount` bytes from the front of the
    /// input queue.
    pub fn read_input(&mut self, max_amount: usize) -> Vec<u8> {
        let n = max_amount.min(self.in_queue.len());
        self.in_queue.drain(..n).collect()
    }

    /// Removes and returns output queue contents.
    ///
    /// When `flush` is false, only whole lines are returned (everything up
    /// to and including the last `\n`); the remainder stays queued. When
    /// `flush` is true, the entire queue is drained regardless of line
    /// boundaries.
    pub fn extract_output(&mut self, flush: bool) -> Vec<u8> {
        if flush {
            return std::mem::take(&mut self.out_queue);
        }
        match self.out_queue.iter().rposition(|&b| b == b'\n') {
            Some(idx) => self.out_queue.drain(..=idx).collect(),
            None => Vec::new(),
        }
    }
}
