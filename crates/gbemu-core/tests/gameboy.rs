mod common;

use std::fs;

use common::{RecordingAudio, RomBuilder, dmg_config, dmg_with_program};
use gbemu_core::{Config, GameBoy, Model, ModelPreference};
use tempfile::tempdir;

#[test]
fn vblank_handler_runs_after_halt() {
    let rom = RomBuilder::new()
        .program(&[
            0x3E, 0x00, 0xE0, 0x0F, // IF = 0
            0x3E, 0x01, 0xE0, 0xFF, // IE = vblank
            0xFB, 0x76, 0x18, 0xFE, // EI; HALT; JR -2
        ])
        .bytes_at(0x0040, &[0x3E, 0x99, 0x18, 0xFE])
        .cartridge();
    let mut gb = GameBoy::with_config(rom, dmg_config());

    gb.tick_one_frame();
    assert_eq!(gb.cpu.regs.a(), 0x99);
    assert!(!gb.cpu.ime);
    assert!(!gb.cpu.halted);
}

#[test]
fn serial_output_is_captured() {
    let mut gb = dmg_with_program(&[
        0x3E, b'H', 0xE0, 0x01, // SB = 'H'
        0x3E, 0x81, 0xE0, 0x02, // SC = start, internal clock
        0x18, 0xFE,
    ]);
    gb.tick_one_frame();
    assert_eq!(gb.take_serial_output(), b"H");
    assert_eq!(gb.bus.read(0xFF01), 0xFF);
    assert!(gb.take_serial_output().is_empty());
}

#[test]
fn audio_sink_receives_buffers() {
    let mut gb = dmg_with_program(&[0x18, 0xFE]);
    let sink = RecordingAudio::default();
    gb.set_audio_sink(Box::new(sink.clone()));
    for _ in 0..4 {
        gb.tick_one_frame();
    }
    let buffers = sink.buffers.lock().unwrap();
    assert_eq!(buffers.len(), 2);
    assert!(buffers.iter().all(|b| b.len() == 2048));
}

#[test]
fn auto_model_follows_header() {
    let gb = GameBoy::new(RomBuilder::new().cgb().cartridge());
    assert_eq!(gb.model(), Model::Cgb);
    let gb = GameBoy::new(RomBuilder::new().cartridge());
    assert_eq!(gb.model(), Model::Dmg);
    let gb = GameBoy::with_config(
        RomBuilder::new().cgb().cartridge(),
        Config {
            model: ModelPreference::Dmg,
            ..Config::default()
        },
    );
    assert_eq!(gb.model(), Model::Dmg);
}

#[test]
fn load_rom_resets_machine() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.gb");
    let second = dir.path().join("second.gb");
    fs::write(&first, RomBuilder::new().program(&[0x3C, 0x18, 0xFE]).build()).unwrap();
    fs::write(&second, RomBuilder::new().cgb().build()).unwrap();

    let mut gb = GameBoy::from_file(&first, Config::default()).unwrap();
    gb.tick();
    assert_eq!(gb.cpu.regs.a(), 0x02);

    gb.load_rom(&second).unwrap();
    assert_eq!(gb.model(), Model::Cgb);
    assert_eq!(gb.cpu.pc(), 0x0100);
    assert_eq!(gb.cpu.regs.a(), 0x11);

    assert!(gb.load_rom(dir.path().join("missing.gb")).is_err());
    assert_eq!(gb.model(), Model::Cgb);
}

#[test]
fn save_ram_rtc_writes_battery_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("battery.gb");
    fs::write(
        &path,
        RomBuilder::new().cart_type(0x03).ram_size_code(0x02).build(),
    )
    .unwrap();

    let mut gb = GameBoy::from_file(&path, dmg_config()).unwrap();
    gb.bus.write(0x0000, 0x0A);
    gb.bus.write(0xA000, 0x5C);
    gb.save_ram_rtc().unwrap();

    let saved = fs::read(path.with_extension("sav")).unwrap();
    assert_eq!(saved.len(), 0x2000);
    assert_eq!(saved[0], 0x5C);
}

#[test]
fn key_press_wakes_halted_cpu() {
    // IE = joypad; HALT; INC A
    let mut gb = dmg_with_program(&[0x3E, 0x10, 0xE0, 0xFF, 0x76, 0x3C, 0x18, 0xFE]);
    gb.bus.interrupts.flags = 0;
    for _ in 0..10 {
        gb.tick();
    }
    assert!(gb.cpu.halted);
    gb.press_key(gbemu_core::Key::Start);
    gb.tick();
    gb.tick();
    assert_eq!(gb.cpu.regs.a(), 0x11);
}

#[cfg(feature = "debugger")]
#[test]
fn watchpoint_reports_write_site() {
    use gbemu_core::debugger::{Watchpoint, WatchpointEngine, WatchpointTrigger};

    // LD A,0x42; LD (0xC000),A; JR -2
    let mut gb = dmg_with_program(&[0x3E, 0x42, 0xEA, 0x00, 0xC0, 0x18, 0xFE]);
    let mut wp = Watchpoint::new(1, 0xC000..=0xC000);
    wp.on_write = true;
    let engine = WatchpointEngine::new(vec![wp]);
    let hits = engine.hits();
    gb.attach_debugger(Box::new(engine));

    for _ in 0..4 {
        gb.tick();
    }
    let recorded = hits.take();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].trigger, WatchpointTrigger::Write);
    assert_eq!(recorded[0].pc, Some(0x0102));
    assert_eq!(recorded[0].value, Some(0x42));
    assert!(gb.detach_debugger().is_some());
}
