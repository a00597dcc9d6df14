use std::time::{SystemTime, UNIX_EPOCH};

use crate::CPU_CLOCK_HZ;

const RTC_CYCLES_PER_SECOND: u32 = CPU_CLOCK_HZ;

/// Length of the persisted `.rtc` image: unix time (i64 LE) + 5 registers.
pub const RTC_FILE_LEN: usize = 13;

pub const RTC_SECONDS: u8 = 0x08;
pub const RTC_MINUTES: u8 = 0x09;
pub const RTC_HOURS: u8 = 0x0A;
pub const RTC_DAYS_LO: u8 = 0x0B;
pub const RTC_DAYS_HI: u8 = 0x0C;

const DAYS_HI_DAY8: u8 = 0x01;
const DAYS_HI_HALT: u8 = 0x40;
const DAYS_HI_CARRY: u8 = 0x80;

/// Seconds since the unix epoch according to the host clock.
pub fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// MBC3 clock registers as the CPU sees them through 0xA000-0xBFFF.
///
/// `days_hi` packs bit 8 of the day counter (bit 0), the halt flag (bit 6)
/// and the sticky day-counter carry (bit 7).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub days_lo: u8,
    pub days_hi: u8,
}

impl RtcRegisters {
    pub fn days(&self) -> u16 {
        ((self.days_hi & DAYS_HI_DAY8) as u16) << 8 | self.days_lo as u16
    }

    fn set_days(&mut self, days: u16) {
        self.days_lo = days as u8;
        self.days_hi = (self.days_hi & !DAYS_HI_DAY8) | ((days >> 8) as u8 & DAYS_HI_DAY8);
    }

    pub fn halted(&self) -> bool {
        self.days_hi & DAYS_HI_HALT != 0
    }

    pub fn day_carry(&self) -> bool {
        self.days_hi & DAYS_HI_CARRY != 0
    }

    fn read(&self, reg: u8) -> u8 {
        match reg {
            RTC_SECONDS => self.seconds & 0x3F,
            RTC_MINUTES => self.minutes & 0x3F,
            RTC_HOURS => self.hours & 0x1F,
            RTC_DAYS_LO => self.days_lo,
            RTC_DAYS_HI => self.days_hi & 0xC1,
            _ => 0xFF,
        }
    }

    fn to_bytes(self) -> [u8; 5] {
        [
            self.seconds,
            self.minutes,
            self.hours,
            self.days_lo,
            self.days_hi,
        ]
    }

    fn from_bytes(bytes: [u8; 5]) -> Self {
        Self {
            seconds: bytes[0] & 0x3F,
            minutes: bytes[1] & 0x3F,
            hours: bytes[2] & 0x1F,
            days_lo: bytes[3],
            days_hi: bytes[4] & 0xC1,
        }
    }
}

/// Real-time clock of an MBC3 cartridge: free-running registers plus the
/// snapshot taken by the latch sequence.
#[derive(Clone, Debug)]
pub struct Rtc {
    live: RtcRegisters,
    latched: RtcRegisters,
    subsecond_cycles: u32,
    last_update: i64,
}

impl Rtc {
    pub fn new(now: i64) -> Self {
        Self {
            live: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            subsecond_cycles: 0,
            last_update: now,
        }
    }

    pub fn live(&self) -> RtcRegisters {
        self.live
    }

    pub fn latched(&self) -> RtcRegisters {
        self.latched
    }

    pub fn latch(&mut self) {
        self.latched = self.live;
    }

    /// CPU read of a clock register. Always observes the latched copy.
    pub fn read(&self, reg: u8) -> u8 {
        self.latched.read(reg)
    }

    /// CPU write of a clock register. Updates the live counters and the
    /// latched copy together.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            RTC_SECONDS => {
                self.live.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            RTC_MINUTES => self.live.minutes = value & 0x3F,
            RTC_HOURS => self.live.hours = value & 0x1F,
            RTC_DAYS_LO => self.live.days_lo = value,
            RTC_DAYS_HI => self.live.days_hi = value & 0xC1,
            _ => return,
        }
        self.latch();
    }

    /// Advance by emulated CPU cycles.
    pub fn step(&mut self, cycles: u32) {
        if self.live.halted() {
            return;
        }
        self.add_cycles(cycles as u64);
    }

    /// Catch up on host time elapsed since the last sync or save.
    pub fn sync_to(&mut self, now: i64) {
        let elapsed = now.saturating_sub(self.last_update);
        self.last_update = now;
        if elapsed <= 0 || self.live.halted() {
            return;
        }
        self.advance_seconds(elapsed as u64);
    }

    fn add_cycles(&mut self, cycles: u64) {
        let mut seconds = cycles / RTC_CYCLES_PER_SECOND as u64;
        let mut sub = self.subsecond_cycles + (cycles % RTC_CYCLES_PER_SECOND as u64) as u32;
        if sub >= RTC_CYCLES_PER_SECOND {
            sub -= RTC_CYCLES_PER_SECOND;
            seconds += 1;
        }
        self.subsecond_cycles = sub;
        if seconds > 0 {
            self.advance_seconds(seconds);
        }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            let until_minute = self.seconds_until_minute_tick();
            if seconds < until_minute {
                self.live.seconds = ((self.live.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }
            seconds -= until_minute;
            self.live.seconds = 0;
            self.minute_tick();
        }
    }

    // Out-of-range values written by software count up to 63 and wrap to 0
    // without carrying into the next field.
    fn seconds_until_minute_tick(&self) -> u64 {
        let sec = self.live.seconds as u64;
        if sec <= 59 { 60 - sec } else { (64 - sec) + 60 }
    }

    fn minute_tick(&mut self) {
        if self.live.minutes == 59 {
            self.live.minutes = 0;
            self.hour_tick();
        } else {
            self.live.minutes = (self.live.minutes + 1) & 0x3F;
        }
    }

    fn hour_tick(&mut self) {
        if self.live.hours == 23 {
            self.live.hours = 0;
            self.day_tick();
        } else {
            self.live.hours = (self.live.hours + 1) & 0x1F;
        }
    }

    fn day_tick(&mut self) {
        let days = self.live.days();
        if days >= 0x01FF {
            self.live.set_days(0);
            self.live.days_hi |= DAYS_HI_CARRY;
        } else {
            self.live.set_days(days + 1);
        }
    }

    /// Record that the clock state is on disk as of `now`. Emulated time
    /// already moved the live registers, so nothing is added here.
    pub fn mark_persisted(&mut self, now: i64) {
        self.last_update = now;
    }

    /// Persisted form: `now` followed by the latched registers.
    pub fn to_bytes(&mut self, now: i64) -> [u8; RTC_FILE_LEN] {
        self.mark_persisted(now);
        let mut out = [0u8; RTC_FILE_LEN];
        out[..8].copy_from_slice(&now.to_le_bytes());
        out[8..].copy_from_slice(&self.latched.to_bytes());
        out
    }

    /// Restore a clock saved by [`Rtc::to_bytes`]. The live registers restart
    /// from the saved snapshot; [`Rtc::sync_to`] then moves them forward by
    /// the host time since the saved timestamp, leaving the latch untouched.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < RTC_FILE_LEN {
            return None;
        }
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&data[..8]);
        let mut regs = [0u8; 5];
        regs.copy_from_slice(&data[8..RTC_FILE_LEN]);
        let regs = RtcRegisters::from_bytes(regs);
        Some(Self {
            live: regs,
            latched: regs,
            subsecond_cycles: 0,
            last_update: i64::from_le_bytes(stamp),
        })
    }
}
