//! Mock transport for testing.

use crate::transport::{RegisterTransport, RegisterWrite};
use std::collections::{HashMap, HashSet, VecDeque};

/// An in-memory register file that records every write.
///
/// This allows testing the controllers without a sensor, an FPGA board or
/// the vendor transport library.
///
/// # Example
///
/// ```
/// use celex_sdk::{MockTransport, RegisterTransport};
///
/// let mut mock = MockTransport::new();
/// assert!(mock.connect());
/// assert!(mock.write_register(0x10, 0xAB, 0xFF));
/// assert_eq!(mock.read_register(0x10, 0xFF), Some(0xAB));
/// assert_eq!(mock.writes().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    connect_succeeds: bool,
    connected: bool,
    registers: HashMap<u32, u32>,
    writes: Vec<RegisterWrite>,
    failing: HashSet<u32>,
    fail_all: bool,
    waits: Vec<u64>,
    bulk: VecDeque<Result<Vec<u8>, i64>>,
    cleared: usize,
}

impl MockTransport {
    /// Create a new mock that connects successfully and accepts every write.
    pub fn new() -> Self {
        Self {
            connect_succeeds: true,
            connected: false,
            registers: HashMap::new(),
            writes: Vec::new(),
            failing: HashSet::new(),
            fail_all: false,
            waits: Vec::new(),
            bulk: VecDeque::new(),
            cleared: 0,
        }
    }

    /// Create a mock whose `connect` always fails.
    pub fn unreachable() -> Self {
        Self {
            connect_succeeds: false,
            ..Self::new()
        }
    }

    /// Reject every write to `address`. The attempt is still recorded.
    pub fn fail_writes_to(mut self, address: u32) -> Self {
        self.failing.insert(address);
        self
    }

    /// Reject every write. The attempts are still recorded.
    pub fn fail_all_writes(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Queue a chunk of bulk data to be returned by the next `read_bulk`.
    pub fn push_bulk_data(&mut self, data: Vec<u8>) {
        self.bulk.push_back(Ok(data));
    }

    /// Queue an error code to be returned by the next `read_bulk`.
    pub fn push_bulk_error(&mut self, code: i64) {
        self.bulk.push_back(Err(code));
    }

    /// Preload a register value, e.g. an FPGA status wire.
    pub fn set_register(&mut self, address: u32, value: u32) {
        self.registers.insert(address, value);
    }

    /// Every write attempted so far, in order.
    pub fn writes(&self) -> &[RegisterWrite] {
        &self.writes
    }

    /// Every write attempted so far, excluding those to `address`.
    pub fn writes_excluding(&self, address: u32) -> Vec<RegisterWrite> {
        self.writes
            .iter()
            .filter(|w| w.address != address)
            .copied()
            .collect()
    }

    /// Values written to `address`, in order.
    pub fn values_written_to(&self, address: u32) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|w| w.address == address)
            .map(|w| w.value)
            .collect()
    }

    /// Forget the recorded writes and waits. Register contents are kept.
    pub fn clear_history(&mut self) {
        self.writes.clear();
        self.waits.clear();
    }

    /// Delays requested so far, in milliseconds.
    pub fn waits(&self) -> &[u64] {
        &self.waits
    }

    /// How many times the host-side buffers were cleared.
    pub fn clear_count(&self) -> usize {
        self.cleared
    }

    /// Whether the mock is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterTransport for MockTransport {
    fn connect(&mut self) -> bool {
        self.connected = self.connect_succeeds;
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_ready(&self) -> bool {
        self.connected
    }

    fn write_register(&mut self, address: u32, value: u32, mask: u32) -> bool {
        self.writes.push(RegisterWrite::new(address, value, mask));
        if self.fail_all || self.failing.contains(&address) {
            return false;
        }
        let current = self.registers.entry(address).or_insert(0);
        *current = (*current & !mask) | (value & mask);
        true
    }

    fn read_register(&mut self, address: u32, mask: u32) -> Option<u32> {
        if self.failing.contains(&address) {
            return None;
        }
        Some(self.registers.get(&address).copied().unwrap_or(0) & mask)
    }

    fn read_bulk(&mut self, _endpoint: u32, _block_size: u32, buf: &mut [u8]) -> i64 {
        match self.bulk.pop_front() {
            Some(Ok(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                len as i64
            }
            Some(Err(code)) => code,
            None => 0,
        }
    }

    fn wait(&mut self, ms: u64) {
        self.waits.push(ms);
    }

    fn clear_buffers(&mut self) {
        self.cleared += 1;
    }
}
