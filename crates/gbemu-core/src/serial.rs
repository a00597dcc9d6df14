//! Serial port registers with a stubbed link cable.

use crate::interrupts::{Interrupt, Interrupts};

pub const SB: u16 = 0xFF01;
pub const SC: u16 = 0xFF02;

pub const REGISTERS: [u16; 2] = [SB, SC];

/// Cycles per shifted bit with the internal 8192 Hz clock.
const CYCLES_PER_BIT: u32 = 512;

pub trait LinkPort: Send {
    /// Exchange a byte with the link partner and return the byte received.
    fn transfer(&mut self, byte: u8) -> u8;
}

/// No cable attached: every incoming bit reads as 1, so transfers receive
/// 0xFF. With `loopback` the sent byte is echoed instead.
#[derive(Default)]
pub struct NullLinkPort {
    loopback: bool,
}

impl NullLinkPort {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

impl LinkPort for NullLinkPort {
    fn transfer(&mut self, byte: u8) -> u8 {
        if self.loopback { byte } else { 0xFF }
    }
}

struct Transfer {
    outgoing: u8,
    /// Cycles until all eight bits have shifted.
    remaining: u32,
}

pub struct Serial {
    sb: u8,
    sc: u8,
    out_buf: Vec<u8>,
    port: Box<dyn LinkPort + Send>,
    transfer: Option<Transfer>,
    cgb: bool,
}

impl Serial {
    pub fn new(cgb: bool) -> Self {
        Self {
            sb: 0,
            sc: if cgb { 0x7F } else { 0x7E },
            out_buf: Vec::new(),
            port: Box::new(NullLinkPort::default()),
            transfer: None,
            cgb,
        }
    }

    pub fn connect(&mut self, port: Box<dyn LinkPort + Send>) {
        self.port = port;
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            SB => self.sb,
            SC if self.cgb => self.sc | 0x7C,
            SC => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            SB => self.sb = val,
            SC => {
                self.sc = val;
                self.transfer = None;
                // Only the internal clock ever completes: an external clock
                // needs a partner driving it and the cable is not emulated.
                if val & 0x81 == 0x81 {
                    self.transfer = Some(Transfer {
                        outgoing: self.sb,
                        remaining: CYCLES_PER_BIT * 8,
                    });
                }
            }
            _ => {}
        }
    }

    pub fn step(&mut self, cycles: u32, interrupts: &mut Interrupts) {
        let Some(transfer) = self.transfer.as_mut() else {
            return;
        };
        if transfer.remaining > cycles {
            transfer.remaining -= cycles;
            return;
        }
        let outgoing = transfer.outgoing;
        self.transfer = None;
        self.sb = self.port.transfer(outgoing);
        self.out_buf.push(outgoing);
        self.sc &= 0x7F;
        interrupts.request(Interrupt::Serial);
    }

    /// Bytes sent since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}
