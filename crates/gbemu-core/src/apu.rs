use crate::CPU_CLOCK_HZ;
use crate::config::AudioConfig;
use crate::frontend::AudioSink;

// 512 Hz frame sequencer tick
const FRAME_SEQUENCER_PERIOD: u32 = CPU_CLOCK_HZ / 512;
/// Peak amplitude of one channel at full terminal volume. Four channels on
/// one terminal stay within i16.
const CHANNEL_AMPLITUDE: f32 = 8191.0;

pub const NR10: u16 = 0xFF10;
pub const NR11: u16 = 0xFF11;
pub const NR12: u16 = 0xFF12;
pub const NR13: u16 = 0xFF13;
pub const NR14: u16 = 0xFF14;
pub const NR21: u16 = 0xFF16;
pub const NR22: u16 = 0xFF17;
pub const NR23: u16 = 0xFF18;
pub const NR24: u16 = 0xFF19;
pub const NR30: u16 = 0xFF1A;
pub const NR31: u16 = 0xFF1B;
pub const NR32: u16 = 0xFF1C;
pub const NR33: u16 = 0xFF1D;
pub const NR34: u16 = 0xFF1E;
pub const NR41: u16 = 0xFF20;
pub const NR42: u16 = 0xFF21;
pub const NR43: u16 = 0xFF22;
pub const NR44: u16 = 0xFF23;
pub const NR50: u16 = 0xFF24;
pub const NR51: u16 = 0xFF25;
pub const NR52: u16 = 0xFF26;
pub const WAVE_RAM_START: u16 = 0xFF30;
pub const WAVE_RAM_END: u16 = 0xFF3F;

const REG_COUNT: usize = (NR52 - NR10) as usize + 1;

/// NR10..NR52 after the boot ROM's start-up chime.
#[rustfmt::skip]
const BOOT_REGS: [u8; REG_COUNT] = [
    0x80, 0xBF, 0xF3, 0xFF, 0xBF,
    0xFF, 0x3F, 0x00, 0xFF, 0xBF,
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF,
    0xFF, 0xFF, 0x00, 0x00, 0xBF,
    0x77, 0xF3, 0xF1,
];

/// Bits that always read back as 1, NR10..NR52.
#[rustfmt::skip]
const READ_MASKS: [u8; REG_COUNT] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF,
    0xFF, 0x3F, 0x00, 0xFF, 0xBF,
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF,
    0xFF, 0xFF, 0x00, 0x00, 0xBF,
    0x00, 0x00, 0x70,
];

const DMG_WAVE_RAM: [u8; 0x10] = [
    0x84, 0x40, 0x43, 0xAA, 0x2D, 0x78, 0x92, 0x3C, 0x60, 0x59, 0x59, 0xB0, 0x34, 0xB8, 0x2E, 0xDA,
];
const CGB_WAVE_RAM: [u8; 0x10] = [
    0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF,
];

/// Pulse waveforms for 12.5%, 25%, 50% and 75% duty. Bit `n` is the output at
/// duty step `n`.
const DUTY_PATTERNS: [u8; 4] = [0x80, 0x81, 0xE1, 0x7E];

const MAX_FREQUENCY: u16 = 2047;

#[inline]
fn with_low_bits(frequency: u16, val: u8) -> u16 {
    (frequency & 0x700) | val as u16
}

#[inline]
fn with_high_bits(frequency: u16, val: u8) -> u16 {
    (frequency & 0x0FF) | ((val as u16 & 0x07) << 8)
}

/// Count `cycles` off a channel's frequency timer, reloading it with `period`
/// on every expiry. Returns the number of expiries.
fn run_timer(timer: &mut u32, period: u32, cycles: u32) -> u32 {
    if cycles < *timer {
        *timer -= cycles;
        return 0;
    }
    let period = period.max(1);
    let overshoot = cycles - *timer;
    *timer = period - overshoot % period;
    1 + overshoot / period
}

#[derive(Clone, Copy, Debug, Default)]
struct LengthCounter {
    remaining: u16,
    enabled: bool,
    /// 64 for the pulse and noise channels, 256 for the wave channel.
    max: u16,
}

impl LengthCounter {
    const fn new(max: u16) -> Self {
        Self {
            remaining: 0,
            enabled: false,
            max,
        }
    }

    fn load(&mut self, raw: u8) {
        self.remaining = self.max - (raw as u16 & (self.max - 1));
    }

    fn on_trigger(&mut self) {
        if self.remaining == 0 {
            self.remaining = self.max;
        }
    }

    /// Returns true when the counter runs out on this click.
    fn clock(&mut self) -> bool {
        if !self.enabled || self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Envelope {
    initial: u8,
    increase: bool,
    period: u8,
    volume: u8,
    countdown: u8,
}

impl Envelope {
    fn write(&mut self, val: u8) {
        self.initial = val >> 4;
        self.increase = val & 0x08 != 0;
        self.period = val & 0x07;
    }

    /// The upper five bits of NRx2 power the channel's DAC.
    fn dac_on(val: u8) -> bool {
        val & 0xF8 != 0
    }

    fn on_trigger(&mut self) {
        self.volume = self.initial;
        self.countdown = self.period;
    }

    fn clock(&mut self) {
        // Period 0 freezes the volume.
        if self.period == 0 {
            return;
        }
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return;
        }
        self.countdown = self.period;
        self.volume = if self.increase {
            (self.volume + 1).min(15)
        } else {
            self.volume.saturating_sub(1)
        };
    }
}

/// Channel 1 frequency sweep.
#[derive(Clone, Copy, Debug, Default)]
struct Sweep {
    pace: u8,
    negate: bool,
    shift: u8,
    countdown: u8,
    shadow: u16,
    active: bool,
}

impl Sweep {
    fn write(&mut self, val: u8) {
        self.pace = (val >> 4) & 0x07;
        self.negate = val & 0x08 != 0;
        self.shift = val & 0x07;
    }

    fn reload_countdown(&mut self) {
        self.countdown = if self.pace == 0 { 8 } else { self.pace };
    }

    fn next_frequency(&self) -> u16 {
        let delta = self.shadow >> self.shift;
        if self.negate {
            self.shadow.wrapping_sub(delta)
        } else {
            self.shadow.wrapping_add(delta)
        }
    }

    fn on_trigger(&mut self, frequency: u16) {
        self.shadow = frequency;
        self.reload_countdown();
        self.active = self.pace != 0 || self.shift != 0;
    }
}

#[derive(Debug, Default)]
struct Pulse {
    enabled: bool,
    dac_enabled: bool,
    length: LengthCounter,
    duty: u8,
    phase: u8,
    frequency: u16,
    timer: u32,
    envelope: Envelope,
    sweep: Option<Sweep>,
}

impl Pulse {
    fn new(with_sweep: bool) -> Self {
        Self {
            length: LengthCounter::new(64),
            sweep: with_sweep.then(Sweep::default),
            ..Default::default()
        }
    }

    fn active(&self) -> bool {
        self.enabled && self.dac_enabled
    }

    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 4
    }

    fn step(&mut self, cycles: u32) {
        if !self.active() {
            return;
        }
        let period = self.period();
        let expiries = run_timer(&mut self.timer, period, cycles);
        self.phase = ((self.phase as u32 + expiries) & 7) as u8;
    }

    fn output(&self) -> u8 {
        if !self.active() {
            return 0;
        }
        ((DUTY_PATTERNS[self.duty as usize] >> self.phase) & 1) * self.envelope.volume
    }

    fn write_duty_length(&mut self, val: u8) {
        self.duty = val >> 6;
        self.length.load(val);
    }

    fn write_envelope(&mut self, val: u8) {
        self.envelope.write(val);
        self.dac_enabled = Envelope::dac_on(val);
        self.enabled &= self.dac_enabled;
    }

    fn write_control(&mut self, val: u8) {
        self.frequency = with_high_bits(self.frequency, val);
        self.length.enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
            self.trigger();
        }
    }

    fn trigger(&mut self) {
        self.enabled = self.dac_enabled;
        self.length.on_trigger();
        self.timer = self.period();
        self.envelope.on_trigger();
        let frequency = self.frequency;
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.on_trigger(frequency);
            // With a non-zero shift the overflow check runs at once.
            if sweep.shift != 0 && sweep.next_frequency() > MAX_FREQUENCY {
                self.enabled = false;
            }
        }
    }

    fn clock_sweep(&mut self) {
        let Some(sweep) = self.sweep.as_mut() else {
            return;
        };
        sweep.countdown = sweep.countdown.saturating_sub(1);
        if sweep.countdown > 0 {
            return;
        }
        sweep.reload_countdown();
        if !sweep.active || sweep.pace == 0 {
            return;
        }
        let next = sweep.next_frequency();
        if next > MAX_FREQUENCY {
            self.enabled = false;
        } else if sweep.shift != 0 {
            sweep.shadow = next;
            self.frequency = next;
            if sweep.next_frequency() > MAX_FREQUENCY {
                self.enabled = false;
            }
        }
    }
}

#[derive(Debug)]
struct Wave {
    enabled: bool,
    dac_enabled: bool,
    length: LengthCounter,
    /// NR32 output level: 0 mute, 1 full, 2 half, 3 quarter.
    level: u8,
    position: u8,
    sample: u8,
    frequency: u16,
    timer: u32,
}

impl Wave {
    fn new() -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            length: LengthCounter::new(256),
            level: 0,
            position: 0,
            sample: 0,
            frequency: 0,
            timer: 0,
        }
    }

    fn active(&self) -> bool {
        self.enabled && self.dac_enabled
    }

    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 2
    }

    fn step(&mut self, cycles: u32, ram: &[u8; 0x10]) {
        if !self.active() {
            return;
        }
        let period = self.period();
        let expiries = run_timer(&mut self.timer, period, cycles);
        if expiries == 0 {
            return;
        }
        self.position = ((self.position as u32 + expiries) & 0x1F) as u8;
        let byte = ram[(self.position >> 1) as usize];
        self.sample = if self.position & 1 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        };
    }

    fn output(&self) -> u8 {
        if !self.active() || self.level == 0 {
            return 0;
        }
        self.sample >> (self.level - 1)
    }

    fn write_control(&mut self, val: u8) {
        self.frequency = with_high_bits(self.frequency, val);
        self.length.enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
            self.enabled = self.dac_enabled;
            self.length.on_trigger();
            self.position = 0;
            self.timer = self.period();
        }
    }
}

#[derive(Debug)]
struct Noise {
    enabled: bool,
    dac_enabled: bool,
    length: LengthCounter,
    envelope: Envelope,
    shift: u8,
    divisor_code: u8,
    /// 7-bit LFSR mode (NR43 bit 3).
    narrow: bool,
    lfsr: u16,
    timer: u32,
}

impl Noise {
    fn new() -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            length: LengthCounter::new(64),
            envelope: Envelope::default(),
            shift: 0,
            divisor_code: 0,
            narrow: false,
            lfsr: 0,
            timer: 0,
        }
    }

    fn active(&self) -> bool {
        self.enabled && self.dac_enabled
    }

    fn period(&self) -> u32 {
        let divisor = match self.divisor_code {
            0 => 8,
            code => code as u32 * 16,
        };
        divisor << self.shift
    }

    fn step(&mut self, cycles: u32) {
        // Shifts 14 and 15 never clock the LFSR.
        if !self.active() || self.shift >= 14 {
            return;
        }
        let period = self.period();
        for _ in 0..run_timer(&mut self.timer, period, cycles) {
            self.shift_lfsr();
        }
    }

    fn shift_lfsr(&mut self) {
        let feedback = (self.lfsr ^ (self.lfsr >> 1)) & 1;
        self.lfsr = (self.lfsr >> 1) | (feedback << 14);
        if self.narrow {
            self.lfsr = (self.lfsr & !0x40) | (feedback << 6);
        }
    }

    fn output(&self) -> u8 {
        if !self.active() || self.lfsr & 1 != 0 {
            return 0;
        }
        self.envelope.volume
    }

    fn write_envelope(&mut self, val: u8) {
        self.envelope.write(val);
        self.dac_enabled = Envelope::dac_on(val);
        self.enabled &= self.dac_enabled;
    }

    fn write_polynomial(&mut self, val: u8) {
        self.shift = val >> 4;
        self.narrow = val & 0x08 != 0;
        self.divisor_code = val & 0x07;
    }

    fn write_control(&mut self, val: u8) {
        self.length.enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
            self.enabled = self.dac_enabled;
            self.length.on_trigger();
            self.lfsr = 0x7FFF;
            self.timer = self.period();
            self.envelope.on_trigger();
        }
    }
}

/// 512 Hz clock for length, sweep and envelope units.
#[derive(Debug)]
struct FrameSequencer {
    step: u8,
    countdown: u32,
}

impl FrameSequencer {
    fn new() -> Self {
        Self {
            step: 0,
            countdown: FRAME_SEQUENCER_PERIOD,
        }
    }

    /// Advance by at most `countdown` cycles. Returns the step that fired, if
    /// the period elapsed.
    fn run(&mut self, cycles: u32) -> Option<u8> {
        self.countdown -= cycles;
        if self.countdown > 0 {
            return None;
        }
        self.countdown = FRAME_SEQUENCER_PERIOD;
        let fired = self.step;
        self.step = (self.step + 1) & 7;
        Some(fired)
    }
}

/// First-order high-pass that removes the DC offset of the unipolar channel
/// mix.
#[derive(Clone, Copy, Debug)]
struct HighPass {
    coef: f32,
    last_in: f32,
    last_out: f32,
}

impl HighPass {
    fn new(sample_rate: u32) -> Self {
        Self {
            coef: 0.999_958_f32.powf(CPU_CLOCK_HZ as f32 / sample_rate as f32),
            last_in: 0.0,
            last_out: 0.0,
        }
    }

    fn filter(&mut self, input: f32) -> f32 {
        let out = input - self.last_in + self.coef * self.last_out;
        self.last_in = input;
        self.last_out = out;
        out
    }

    fn reset(&mut self) {
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    wave: Wave,
    noise: Noise,
    wave_ram: [u8; 0x10],
    /// NR10..NR52 as last written.
    regs: [u8; REG_COUNT],
    nr50: u8,
    nr51: u8,
    powered: bool,
    sequencer: FrameSequencer,
    sample_period: u32,
    sample_timer: u32,
    buffer: Vec<i16>,
    buffer_len: usize,
    /// Left, right.
    filters: [HighPass; 2],
}

impl Apu {
    /// Silent APU with every register cleared, as after an NR52 power-off.
    pub fn new(cgb: bool, audio: AudioConfig) -> Self {
        let sample_rate = audio.sample_rate.max(1);
        let buffer_len = audio.buffer_frames.max(1) * 2;
        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            wave: Wave::new(),
            noise: Noise::new(),
            wave_ram: if cgb { CGB_WAVE_RAM } else { DMG_WAVE_RAM },
            regs: [0; REG_COUNT],
            nr50: 0,
            nr51: 0,
            powered: false,
            sequencer: FrameSequencer::new(),
            sample_period: (CPU_CLOCK_HZ / sample_rate).max(1),
            sample_timer: 0,
            buffer: Vec::with_capacity(buffer_len),
            buffer_len,
            filters: [HighPass::new(sample_rate); 2],
        }
    }

    /// State left behind by the boot ROM's start-up chime: powered, pulse 1
    /// faded out but still enabled.
    pub fn apply_boot_state(&mut self) {
        self.regs = BOOT_REGS;
        self.powered = true;
        self.nr50 = 0x77;
        self.nr51 = 0xF3;
        self.sequencer = FrameSequencer::new();

        self.pulse1.duty = 2;
        self.pulse1.envelope.write(0xF3);
        self.pulse1.envelope.volume = 0;
        self.pulse1.frequency = 0x07C1;
        self.pulse1.dac_enabled = true;
        self.pulse1.enabled = true;
        if let Some(sweep) = self.pulse1.sweep.as_mut() {
            sweep.write(0x80);
        }
        self.pulse2.frequency = 0x07FF;
        self.wave.frequency = 0x07FF;
        self.wave.level = 0;
    }

    /// Addresses the APU answers on the bus.
    pub fn registers() -> impl Iterator<Item = u16> {
        (NR10..=NR52).chain(WAVE_RAM_START..=WAVE_RAM_END)
    }

    /// Samples per emitted buffer (interleaved stereo).
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// CPU cycles between two output frames.
    pub fn sample_period(&self) -> u32 {
        self.sample_period
    }

    pub fn powered(&self) -> bool {
        self.powered
    }

    fn status(&self) -> u8 {
        let mut val = 0x70;
        if self.powered {
            val |= 0x80;
        }
        for (bit, on) in [
            self.pulse1.enabled,
            self.pulse2.enabled,
            self.wave.enabled,
            self.noise.enabled,
        ]
        .into_iter()
        .enumerate()
        {
            if on {
                val |= 1 << bit;
            }
        }
        val
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            NR52 => self.status(),
            NR10..NR52 => {
                let i = (addr - NR10) as usize;
                self.regs[i] | READ_MASKS[i]
            }
            // The playing wave channel owns wave RAM.
            WAVE_RAM_START..=WAVE_RAM_END if self.wave.active() => 0xFF,
            WAVE_RAM_START..=WAVE_RAM_END => self.wave_ram[(addr - WAVE_RAM_START) as usize],
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        if (WAVE_RAM_START..=WAVE_RAM_END).contains(&addr) {
            if !self.wave.active() {
                self.wave_ram[(addr - WAVE_RAM_START) as usize] = val;
            }
            return;
        }
        if addr == NR52 {
            self.write_power(val);
            return;
        }
        if !self.powered {
            return;
        }
        if (NR10..NR52).contains(&addr) {
            self.regs[(addr - NR10) as usize] = val;
        }

        match addr {
            NR10 => {
                if let Some(sweep) = self.pulse1.sweep.as_mut() {
                    sweep.write(val);
                }
            }
            NR11 => self.pulse1.write_duty_length(val),
            NR12 => self.pulse1.write_envelope(val),
            NR13 => self.pulse1.frequency = with_low_bits(self.pulse1.frequency, val),
            NR14 => self.pulse1.write_control(val),
            NR21 => self.pulse2.write_duty_length(val),
            NR22 => self.pulse2.write_envelope(val),
            NR23 => self.pulse2.frequency = with_low_bits(self.pulse2.frequency, val),
            NR24 => self.pulse2.write_control(val),
            NR30 => {
                self.wave.dac_enabled = val & 0x80 != 0;
                self.wave.enabled &= self.wave.dac_enabled;
            }
            NR31 => self.wave.length.load(val),
            NR32 => self.wave.level = (val >> 5) & 0x03,
            NR33 => self.wave.frequency = with_low_bits(self.wave.frequency, val),
            NR34 => self.wave.write_control(val),
            NR41 => self.noise.length.load(val),
            NR42 => self.noise.write_envelope(val),
            NR43 => self.noise.write_polynomial(val),
            NR44 => self.noise.write_control(val),
            NR50 => self.nr50 = val,
            NR51 => self.nr51 = val,
            _ => {}
        }
    }

    fn write_power(&mut self, val: u8) {
        let on = val & 0x80 != 0;
        if on == self.powered {
            return;
        }
        if on {
            self.powered = true;
            self.sequencer = FrameSequencer::new();
            self.wave_ram = [0; 0x10];
            log::debug!("APU powered on");
        } else {
            self.pulse1 = Pulse::new(true);
            self.pulse2 = Pulse::new(false);
            self.wave = Wave::new();
            self.noise = Noise::new();
            self.regs = [0; REG_COUNT];
            self.nr50 = 0;
            self.nr51 = 0;
            self.powered = false;
            self.filters.iter_mut().for_each(HighPass::reset);
            log::debug!("APU powered off");
        }
    }

    fn clock_frame_sequencer(&mut self, step: u8) {
        if step % 2 == 0 {
            if self.pulse1.length.clock() {
                self.pulse1.enabled = false;
            }
            if self.pulse2.length.clock() {
                self.pulse2.enabled = false;
            }
            if self.wave.length.clock() {
                self.wave.enabled = false;
            }
            if self.noise.length.clock() {
                self.noise.enabled = false;
            }
        }
        if step % 4 == 2 {
            self.pulse1.clock_sweep();
        }
        if step == 7 {
            self.pulse1.envelope.clock();
            self.pulse2.envelope.clock();
            self.noise.envelope.clock();
        }
    }

    /// Advance by `cycles` CPU cycles, handing every filled sample buffer to
    /// `sink`.
    pub fn tick(&mut self, cycles: u32, sink: &mut dyn AudioSink) {
        let mut remaining = cycles;
        while remaining > 0 {
            let mut chunk = remaining.min(self.sample_period - self.sample_timer);
            if self.powered {
                chunk = chunk.min(self.sequencer.countdown);
            }

            self.pulse1.step(chunk);
            self.pulse2.step(chunk);
            self.wave.step(chunk, &self.wave_ram);
            self.noise.step(chunk);

            if self.powered {
                if let Some(step) = self.sequencer.run(chunk) {
                    self.clock_frame_sequencer(step);
                }
            }

            self.sample_timer += chunk;
            if self.sample_timer == self.sample_period {
                self.sample_timer = 0;
                let (left, right) = self.mix();
                self.buffer.extend([left, right]);
                if self.buffer.len() >= self.buffer_len {
                    sink.on_audio_buffer_full(&self.buffer);
                    self.buffer.clear();
                }
            }
            remaining -= chunk;
        }
    }

    fn mix(&mut self) -> (i16, i16) {
        let any_dac = self.pulse1.dac_enabled
            || self.pulse2.dac_enabled
            || self.wave.dac_enabled
            || self.noise.dac_enabled;
        if !any_dac {
            self.filters.iter_mut().for_each(HighPass::reset);
            return (0, 0);
        }

        let outputs = [
            self.pulse1.output(),
            self.pulse2.output(),
            self.wave.output(),
            self.noise.output(),
        ];
        // NR51: high nibble routes to the left terminal, low nibble to the
        // right.
        let mut terminals = [0.0f32; 2];
        for (i, out) in outputs.into_iter().enumerate() {
            let level = out as f32 / 15.0;
            if self.nr51 & (0x10 << i) != 0 {
                terminals[0] += level;
            }
            if self.nr51 & (0x01 << i) != 0 {
                terminals[1] += level;
            }
        }
        let volumes = [(self.nr50 >> 4) & 0x07, self.nr50 & 0x07];

        let mut samples = [0i16; 2];
        for side in 0..2 {
            let scale = (volumes[side] + 1) as f32 / 8.0;
            let raw = (terminals[side] * scale * CHANNEL_AMPLITUDE) as i16;
            samples[side] = self.filters[side].filter(raw as f32).round() as i16;
        }
        (samples[0], samples[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::NullAudioSink;

    fn powered_apu() -> Apu {
        let mut apu = Apu::new(false, AudioConfig::default());
        apu.write_reg(NR52, 0x80);
        apu
    }

    #[test]
    fn timer_counts_expiries_and_keeps_phase() {
        let mut timer = 10;
        assert_eq!(run_timer(&mut timer, 8, 9), 0);
        assert_eq!(timer, 1);
        assert_eq!(run_timer(&mut timer, 8, 1 + 8 * 3 + 2), 4);
        assert_eq!(timer, 6);
    }

    #[test]
    fn length_counter_expires_once() {
        let mut length = LengthCounter::new(64);
        length.load(0x3E);
        length.enabled = true;
        assert!(!length.clock());
        assert!(length.clock());
        assert!(!length.clock());
        length.on_trigger();
        assert_eq!(length.remaining, 64);

        let mut wave = LengthCounter::new(256);
        wave.load(0x00);
        assert_eq!(wave.remaining, 256);
    }

    #[test]
    fn high_pass_settles_to_zero() {
        let mut hp = HighPass::new(44_100);
        let first = hp.filter(1000.0);
        let second = hp.filter(1000.0);
        assert!(second < first);
        let mut out = second;
        for _ in 0..8192 {
            out = hp.filter(1000.0);
        }
        assert!(out.abs() < 10.0);
    }

    #[test]
    fn mix_resets_filters_when_all_dacs_off() {
        let mut apu = powered_apu();
        apu.nr51 = 0x11;
        apu.pulse1.enabled = true;
        apu.pulse1.dac_enabled = true;
        apu.pulse1.envelope.volume = 15;
        apu.pulse1.duty = 3;
        apu.pulse1.phase = 1;
        let (left, right) = apu.mix();
        assert!(left > 0);
        assert_eq!(left, right);

        apu.pulse1.dac_enabled = false;
        assert_eq!(apu.mix(), (0, 0));
        assert_eq!(apu.filters[0].last_out, 0.0);
    }

    #[test]
    fn trigger_sets_status_bit_and_length_expires() {
        let mut apu = powered_apu();
        apu.write_reg(NR22, 0xF0);
        // Length 63: one length click remaining.
        apu.write_reg(NR21, 0x3F);
        apu.write_reg(NR24, 0xC0);
        assert_eq!(apu.read_reg(NR52) & 0x02, 0x02);

        apu.tick(FRAME_SEQUENCER_PERIOD, &mut NullAudioSink);
        assert_eq!(apu.read_reg(NR52) & 0x02, 0);
    }

    #[test]
    fn dac_off_disables_channel() {
        let mut apu = powered_apu();
        apu.write_reg(NR42, 0xF0);
        apu.write_reg(NR44, 0x80);
        assert_eq!(apu.read_reg(NR52) & 0x08, 0x08);
        apu.write_reg(NR42, 0x00);
        assert_eq!(apu.read_reg(NR52) & 0x08, 0);
    }

    #[test]
    fn sweep_overflow_on_trigger_disables_channel() {
        let mut apu = powered_apu();
        apu.write_reg(NR10, 0x11);
        apu.write_reg(NR12, 0xF0);
        apu.write_reg(NR13, 0xFF);
        apu.write_reg(NR14, 0x87);
        assert_eq!(apu.read_reg(NR52) & 0x01, 0);
    }

    #[test]
    fn envelope_fades_on_step_seven() {
        let mut apu = powered_apu();
        // Volume 15, decreasing every envelope click.
        apu.write_reg(NR22, 0xF1);
        apu.write_reg(NR24, 0x80);
        apu.tick(FRAME_SEQUENCER_PERIOD * 7, &mut NullAudioSink);
        assert_eq!(apu.pulse2.envelope.volume, 15);
        apu.tick(FRAME_SEQUENCER_PERIOD, &mut NullAudioSink);
        assert_eq!(apu.pulse2.envelope.volume, 14);
    }

    #[test]
    fn writes_ignored_while_powered_off() {
        let mut apu = Apu::new(false, AudioConfig::default());
        apu.write_reg(NR50, 0x77);
        assert_eq!(apu.read_reg(NR50), 0x00);
        apu.write_reg(WAVE_RAM_START, 0x12);
        assert_eq!(apu.read_reg(WAVE_RAM_START), 0x12);
        apu.write_reg(NR52, 0x80);
        apu.write_reg(NR50, 0x77);
        assert_eq!(apu.read_reg(NR50), 0x77);
    }

    #[test]
    fn boot_state_reads_documented_values() {
        let mut apu = Apu::new(false, AudioConfig::default());
        apu.apply_boot_state();
        assert_eq!(apu.read_reg(NR50), 0x77);
        assert_eq!(apu.read_reg(NR51), 0xF3);
        assert_eq!(apu.read_reg(NR52), 0xF1);
    }

    #[test]
    fn sample_period_matches_rate() {
        let apu = Apu::new(false, AudioConfig::default());
        assert_eq!(apu.sample_period(), 95);
        assert_eq!(apu.buffer_len(), 2048);
    }
}
