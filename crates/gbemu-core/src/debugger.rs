//! Optional instrumentation hooks and a watchpoint listener built on them.
//!
//! Compiled only with the `debugger` feature. The CPU reports every executed
//! instruction and the bus reports every read and write; nothing in the
//! emulation depends on whether a listener is attached.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};

use crate::cpu::{OpcodeInfo, Operand};

pub trait DebugListener: Send {
    /// Called after an instruction and its operand have been fetched and
    /// before it executes.
    fn on_instruction(&mut self, _addr: u16, _info: &OpcodeInfo, _operand: Operand) {}

    fn on_read_access(&mut self, _addr: u16) {}

    fn on_write_access(&mut self, _addr: u16, _data: u8) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchpointTrigger {
    Read,
    Write,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint {
    pub id: u32,
    pub enabled: bool,
    pub range: RangeInclusive<u16>,
    pub on_read: bool,
    pub on_write: bool,
    pub on_execute: bool,
    /// Only fire when the written byte equals this value. Reads carry no
    /// value, so a read watchpoint with a value filter never fires.
    pub value_match: Option<u8>,
}

impl Watchpoint {
    pub fn new(id: u32, range: RangeInclusive<u16>) -> Self {
        Self {
            id,
            enabled: true,
            range,
            on_read: false,
            on_write: false,
            on_execute: false,
            value_match: None,
        }
    }

    pub fn matches_addr(&self, addr: u16) -> bool {
        self.range.contains(&addr)
    }

    pub fn matches_value(&self, value: Option<u8>) -> bool {
        match (self.value_match, value) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchpointHit {
    pub id: u32,
    pub trigger: WatchpointTrigger,
    pub addr: u16,
    pub value: Option<u8>,
    /// Address of the instruction that caused the hit.
    pub pc: Option<u16>,
}

/// Shared view of the hits recorded by a [`WatchpointEngine`], usable after
/// the engine has been handed to the emulator.
#[derive(Debug, Clone, Default)]
pub struct WatchpointHits(Arc<Mutex<Vec<WatchpointHit>>>);

impl WatchpointHits {
    fn push(&self, hit: WatchpointHit) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hit);
    }

    /// Drain every hit recorded so far.
    pub fn take(&self) -> Vec<WatchpointHit> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct WatchpointEngine {
    watchpoints: Vec<Watchpoint>,
    has_read: bool,
    has_write: bool,
    has_execute: bool,
    suspended: bool,
    current_pc: Option<u16>,
    hits: WatchpointHits,
}

impl WatchpointEngine {
    pub fn new(watchpoints: Vec<Watchpoint>) -> Self {
        let mut engine = Self::default();
        engine.set_watchpoints(watchpoints);
        engine
    }

    pub fn set_watchpoints(&mut self, watchpoints: Vec<Watchpoint>) {
        self.watchpoints = watchpoints;
        self.recompute_fast_paths();
    }

    pub fn watchpoints(&self) -> &[Watchpoint] {
        &self.watchpoints
    }

    pub fn set_suspended(&mut self, value: bool) {
        self.suspended = value;
    }

    pub fn suspended(&self) -> bool {
        self.suspended
    }

    pub fn hits(&self) -> WatchpointHits {
        self.hits.clone()
    }

    fn record(&mut self, trigger: WatchpointTrigger, addr: u16, value: Option<u8>) {
        let pc = self.current_pc;
        for wp in &self.watchpoints {
            let armed = match trigger {
                WatchpointTrigger::Read => wp.on_read,
                WatchpointTrigger::Write => wp.on_write,
                WatchpointTrigger::Execute => wp.on_execute,
            };
            if !wp.enabled || !armed || !wp.matches_addr(addr) {
                continue;
            }
            if trigger != WatchpointTrigger::Execute && !wp.matches_value(value) {
                continue;
            }
            log::debug!("Watchpoint {} hit: {trigger:?} at {addr:04X}", wp.id);
            self.hits.push(WatchpointHit {
                id: wp.id,
                trigger,
                addr,
                value,
                pc,
            });
        }
    }

    fn recompute_fast_paths(&mut self) {
        self.has_read = self.watchpoints.iter().any(|wp| wp.enabled && wp.on_read);
        self.has_write = self.watchpoints.iter().any(|wp| wp.enabled && wp.on_write);
        self.has_execute = self
            .watchpoints
            .iter()
            .any(|wp| wp.enabled && wp.on_execute);
    }
}

impl DebugListener for WatchpointEngine {
    fn on_instruction(&mut self, addr: u16, _info: &OpcodeInfo, _operand: Operand) {
        self.current_pc = Some(addr);
        if self.suspended || !self.has_execute {
            return;
        }
        self.record(WatchpointTrigger::Execute, addr, None);
    }

    fn on_read_access(&mut self, addr: u16) {
        if self.suspended || !self.has_read {
            return;
        }
        self.record(WatchpointTrigger::Read, addr, None);
    }

    fn on_write_access(&mut self, addr: u16, data: u8) {
        if self.suspended || !self.has_write {
            return;
        }
        self.record(WatchpointTrigger::Write, addr, Some(data));
    }
}
