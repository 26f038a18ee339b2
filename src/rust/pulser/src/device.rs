// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::Result;

/// Transport to one FPGA board.
///
/// The primitives follow the endpoint model of the USB bridge: 16-bit
/// wires read from the device, trigger bits, and bulk pipes in both
/// directions. Endpoint numbers are listed in [`crate::wire`].
pub trait Device: Send {
    /// Load a firmware image.
    fn configure(&mut self, bitfile: &[u8]) -> Result<()>;

    fn wire_out(&mut self, address: u8) -> Result<u16>;

    fn trigger_in(&mut self, address: u8, bit: u8) -> Result<()>;

    fn write_pipe(&mut self, address: u8, data: &[u8]) -> Result<()>;

    /// Fill `buffer` from an outgoing pipe; returns the number of bytes read.
    fn read_pipe(&mut self, address: u8, buffer: &mut [u8]) -> Result<usize>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn configure(&mut self, bitfile: &[u8]) -> Result<()> {
        (**self).configure(bitfile)
    }

    fn wire_out(&mut self, address: u8) -> Result<u16> {
        (**self).wire_out(address)
    }

    fn trigger_in(&mut self, address: u8, bit: u8) -> Result<()> {
        (**self).trigger_in(address, bit)
    }

    fn write_pipe(&mut self, address: u8, data: &[u8]) -> Result<()> {
        (**self).write_pipe(address, data)
    }

    fn read_pipe(&mut self, address: u8, buffer: &mut [u8]) -> Result<usize> {
        (**self).read_pipe(address, buffer)
    }
}
