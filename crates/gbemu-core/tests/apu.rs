mod common;

use common::RecordingAudio;
use gbemu_core::CPU_CLOCK_HZ;
use gbemu_core::apu::{Apu, NR21, NR22, NR23, NR24, NR50, NR51, NR52, WAVE_RAM_START};
use gbemu_core::config::AudioConfig;

fn powered_apu() -> Apu {
    let mut apu = Apu::new(false, AudioConfig::default());
    apu.apply_boot_state();
    apu
}

fn cycles_per_buffer(apu: &Apu) -> u32 {
    (apu.buffer_len() / 2) as u32 * apu.sample_period()
}

#[test]
fn one_buffer_per_sample_count() {
    let mut apu = powered_apu();
    assert_eq!(apu.sample_period(), CPU_CLOCK_HZ / 44_100);
    let sink = RecordingAudio::default();
    let mut out = sink.clone();

    let cycles = cycles_per_buffer(&apu);
    apu.tick(cycles - 1, &mut out);
    assert!(sink.buffers.lock().unwrap().is_empty());
    apu.tick(1, &mut out);

    let buffers = sink.buffers.lock().unwrap();
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0].len(), 2 * AudioConfig::default().buffer_frames);
}

#[test]
fn buffer_size_follows_config() {
    let config = AudioConfig {
        sample_rate: 48_000,
        buffer_frames: 256,
    };
    let mut apu = Apu::new(true, config);
    apu.apply_boot_state();
    assert_eq!(apu.buffer_len(), 512);
    assert_eq!(apu.sample_period(), CPU_CLOCK_HZ / 48_000);

    let sink = RecordingAudio::default();
    let mut out = sink.clone();
    apu.tick(3 * cycles_per_buffer(&apu), &mut out);
    assert_eq!(sink.buffers.lock().unwrap().len(), 3);
}

#[test]
fn powered_off_apu_is_silent() {
    let mut apu = powered_apu();
    apu.write_reg(NR22, 0xF0);
    apu.write_reg(NR24, 0x87);
    apu.write_reg(NR52, 0x00);
    assert!(!apu.powered());
    assert_eq!(apu.read_reg(NR52), 0x70);
    assert_eq!(apu.read_reg(NR50), 0x00);

    let sink = RecordingAudio::default();
    let mut out = sink.clone();
    apu.tick(cycles_per_buffer(&apu), &mut out);
    let buffers = sink.buffers.lock().unwrap();
    assert_eq!(buffers.len(), 1);
    assert!(buffers[0].iter().all(|&s| s == 0));
}

#[test]
fn triggered_pulse_channel_is_audible() {
    let mut apu = powered_apu();
    apu.write_reg(NR51, 0xFF);
    apu.write_reg(NR21, 0x80);
    apu.write_reg(NR22, 0xF0);
    apu.write_reg(NR23, 0x00);
    apu.write_reg(NR24, 0x87);
    assert_ne!(apu.read_reg(NR52) & 0x02, 0);

    let sink = RecordingAudio::default();
    let mut out = sink.clone();
    apu.tick(cycles_per_buffer(&apu), &mut out);
    let buffers = sink.buffers.lock().unwrap();
    assert!(buffers[0].iter().any(|&s| s != 0));
}

#[test]
fn power_cycle_clears_wave_ram() {
    let mut apu = powered_apu();
    apu.write_reg(WAVE_RAM_START, 0x12);
    assert_eq!(apu.read_reg(WAVE_RAM_START), 0x12);

    apu.write_reg(NR52, 0x00);
    // Wave RAM stays writable while powered off.
    apu.write_reg(WAVE_RAM_START + 1, 0x34);
    assert_eq!(apu.read_reg(WAVE_RAM_START + 1), 0x34);

    apu.write_reg(NR52, 0x80);
    assert!(apu.powered());
    assert_eq!(apu.read_reg(WAVE_RAM_START), 0x00);
    assert_eq!(apu.read_reg(WAVE_RAM_START + 1), 0x00);
}

#[test]
fn unused_register_bits_read_high() {
    let mut apu = powered_apu();
    apu.write_reg(NR21, 0x00);
    assert_eq!(apu.read_reg(NR21), 0x3F);
    apu.write_reg(NR23, 0x12);
    assert_eq!(apu.read_reg(NR23), 0xFF);
    assert_eq!(apu.read_reg(0xFF15), 0xFF);
}
