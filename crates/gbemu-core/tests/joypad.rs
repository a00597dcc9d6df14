mod common;

use common::dmg_with_program;
use gbemu_core::Key;
use gbemu_core::interrupts::Interrupt;
use gbemu_core::joypad::JOYP;

#[test]
fn no_group_selected_reads_released() {
    let mut gb = dmg_with_program(&[]);
    gb.press_key(Key::A);
    gb.bus.write(JOYP, 0x30);
    assert_eq!(gb.bus.read(JOYP), 0xFF);
}

#[test]
fn groups_are_selected_by_bits_4_and_5() {
    let mut gb = dmg_with_program(&[]);
    gb.press_key(Key::Start);
    gb.press_key(Key::Left);

    gb.bus.write(JOYP, 0x10);
    assert_eq!(gb.bus.read(JOYP), 0xD7);

    gb.bus.write(JOYP, 0x20);
    assert_eq!(gb.bus.read(JOYP), 0xED);

    gb.release_key(Key::Start);
    gb.bus.write(JOYP, 0x10);
    assert_eq!(gb.bus.read(JOYP), 0xDF);
}

#[test]
fn press_requests_joypad_interrupt() {
    let mut gb = dmg_with_program(&[]);
    gb.bus.interrupts.flags = 0;
    gb.press_key(Key::Down);
    assert_ne!(gb.bus.interrupts.flags & Interrupt::Joypad.bit(), 0);
    assert!(gb.bus.joypad.is_pressed(Key::Down));
    gb.release_key(Key::Down);
    assert!(!gb.bus.joypad.is_pressed(Key::Down));
}
