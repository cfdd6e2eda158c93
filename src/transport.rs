//! Register transport abstraction.
//!
//! The controllers never talk to USB or the FPGA directly. They are handed a
//! [`RegisterTransport`] at construction and own it for their whole lifetime.

use std::time::Duration;

/// A single masked register write, as issued to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Register (or FPGA wire) address.
    pub address: u32,
    /// Value to write.
    pub value: u32,
    /// Bits of `value` that are significant.
    pub mask: u32,
}

impl RegisterWrite {
    /// Create a new write descriptor.
    pub const fn new(address: u32, value: u32, mask: u32) -> Self {
        Self {
            address,
            value,
            mask,
        }
    }
}

/// Trait for the USB/FPGA bridge that carries register traffic to the sensor.
///
/// Every call is blocking. Implementations are exclusively owned by one
/// controller, so methods take `&mut self`.
pub trait RegisterTransport: Send {
    /// Open the physical connection. Returns `false` if the device is unreachable.
    fn connect(&mut self) -> bool;

    /// Close the physical connection.
    fn disconnect(&mut self);

    /// Whether the device is connected and ready to accept register traffic.
    fn is_ready(&self) -> bool;

    /// Write `value` under `mask` to `address`.
    fn write_register(&mut self, address: u32, value: u32, mask: u32) -> bool;

    /// Read the masked value at `address`, or `None` if the read failed.
    fn read_register(&mut self, address: u32, mask: u32) -> Option<u32>;

    /// Read streamed data from a bulk endpoint into `buf`.
    ///
    /// Returns the number of bytes read, or a negative transport error code.
    fn read_bulk(&mut self, endpoint: u32, block_size: u32, buf: &mut [u8]) -> i64;

    /// Block for `ms` milliseconds to let the hardware settle.
    fn wait(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    /// Drop any data buffered between the device and the host.
    fn clear_buffers(&mut self) {}
}
