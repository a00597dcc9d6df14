mod common;

use common::{RecordingVideo, dmg_with_program};
use gbemu_core::frontend::{Color, NullVideoSink, SCREEN_HEIGHT, SCREEN_WIDTH};
use gbemu_core::gameboy::CYCLES_PER_FRAME;
use gbemu_core::interrupts::Interrupt;
use gbemu_core::ppu::{LY, LYC, Mode, STAT};

// JR -2
const SPIN: [u8; 2] = [0x18, 0xFE];

#[test]
fn scanline_cycles_through_modes() {
    let mut gb = dmg_with_program(&SPIN);
    let ppu = &mut gb.bus.ppu;
    let ints = &mut gb.bus.interrupts;
    let mut video = NullVideoSink;

    assert_eq!(ppu.mode(), Mode::ReadingOam);
    ppu.tick(82, ints, &mut video);
    assert_eq!(ppu.mode(), Mode::ReadingOam);
    ppu.tick(1, ints, &mut video);
    assert_eq!(ppu.mode(), Mode::ReadingOamVram);
    ppu.tick(175, ints, &mut video);
    assert_eq!(ppu.mode(), Mode::HBlank);
    assert_eq!(ppu.ly(), 0);
    ppu.tick(207, ints, &mut video);
    assert_eq!(ppu.mode(), Mode::ReadingOam);
    assert_eq!(ppu.ly(), 1);
}

#[test]
fn ly_sweeps_all_lines_and_wraps() {
    let mut gb = dmg_with_program(&SPIN);
    let ppu = &mut gb.bus.ppu;
    let ints = &mut gb.bus.interrupts;
    let mut video = NullVideoSink;

    for line in 1..=SCREEN_HEIGHT as u8 {
        ppu.tick(465, ints, &mut video);
        assert_eq!(ppu.ly(), line);
    }
    assert_eq!(ppu.mode(), Mode::VBlank);
    for line in 145..=153u8 {
        ppu.tick(456, ints, &mut video);
        assert_eq!(ppu.ly(), line);
        assert_eq!(ppu.mode(), Mode::VBlank);
    }
    assert_eq!(ppu.frames(), 0);
    ppu.tick(456, ints, &mut video);
    assert_eq!(ppu.ly(), 0);
    assert_eq!(ppu.mode(), Mode::ReadingOam);
    assert_eq!(ppu.frames(), 1);
}

#[test]
fn one_frame_delivers_every_line_once() {
    let mut gb = dmg_with_program(&SPIN);
    let video = RecordingVideo::default();
    gb.set_video_sink(Box::new(video.clone()));

    let cycles = gb.tick_one_frame();
    assert_eq!(cycles, CYCLES_PER_FRAME);
    assert_eq!(gb.frames(), 1);
    assert_eq!(*video.frames.lock().unwrap(), 1);
    let lines = video.lines.lock().unwrap();
    assert_eq!(*lines, (0..SCREEN_HEIGHT as u8).collect::<Vec<_>>());
}

#[test]
fn vblank_interrupt_requested_at_line_144() {
    let mut gb = dmg_with_program(&SPIN);
    gb.bus.interrupts.flags = 0;
    while gb.bus.ppu.ly() < 143 {
        gb.tick();
    }
    assert_eq!(gb.bus.interrupts.flags & Interrupt::VBlank.bit(), 0);
    while gb.bus.ppu.ly() < 144 {
        gb.tick();
    }
    assert_ne!(gb.bus.interrupts.flags & Interrupt::VBlank.bit(), 0);
    assert_eq!(gb.bus.read(LY), 144);
    assert_eq!(gb.bus.read(STAT) & 0x03, Mode::VBlank as u8);
}

#[test]
fn lyc_coincidence_raises_stat_interrupt() {
    let mut gb = dmg_with_program(&SPIN);
    gb.bus.interrupts.flags = 0;
    gb.bus.write(LYC, 2);
    gb.bus.write(STAT, 0x40);
    assert_eq!(gb.bus.interrupts.flags & Interrupt::LcdStat.bit(), 0);

    while gb.bus.ppu.ly() < 2 {
        gb.tick();
    }
    assert_ne!(gb.bus.interrupts.flags & Interrupt::LcdStat.bit(), 0);
    assert_ne!(gb.bus.read(STAT) & 0x04, 0);
}

#[test]
fn lcd_off_still_paces_frames() {
    // LD A,0; LDH (0x40),A; JR -2
    let mut gb = dmg_with_program(&[0x3E, 0x00, 0xE0, 0x40, 0x18, 0xFE]);
    let cycles = gb.tick_one_frame();
    assert!(!gb.bus.ppu.lcd_enabled());
    assert!(cycles >= CYCLES_PER_FRAME);
    assert!(cycles < CYCLES_PER_FRAME + 16);
    assert_eq!(gb.frames(), 0);
    assert_eq!(gb.bus.read(LY), 0);
}

#[test]
fn background_tile_reaches_framebuffer() {
    let mut gb = dmg_with_program(&SPIN);
    // Tile 1: every pixel color 3.
    for addr in 0x8010..0x8020 {
        gb.bus.write(addr, 0xFF);
    }
    gb.bus.write(0x9800, 0x01);

    gb.tick_one_frame();
    let fb = gb.framebuffer();
    let darkest = Color::from_rgb(0x0F380F);
    let lightest = Color::from_rgb(0x9BBC0F);
    for x in 0..8 {
        assert_eq!(fb[x], darkest);
        assert_eq!(fb[7 * SCREEN_WIDTH + x], darkest);
    }
    assert_eq!(fb[8], lightest);
    assert_eq!(fb[8 * SCREEN_WIDTH], lightest);
}
