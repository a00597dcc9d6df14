mod common;

use common::bus;
use gbemu_core::Model;
use gbemu_core::bus::{Bus, Device, HDMA1, HDMA2, HDMA3, HDMA4, HDMA5, KEY1, SVBK};
use gbemu_core::frontend::NullVideoSink;
use gbemu_core::ppu::{LCDC, Mode, VBK};

#[test]
fn wram_echo_and_bank_switch() {
    let mut bus = bus(Model::Cgb);
    bus.write(0xC000, 0xAA);
    assert_eq!(bus.read(0xE000), 0xAA);
    bus.write(0xE001, 0xBB);
    assert_eq!(bus.read(0xC001), 0xBB);

    bus.write(SVBK, 0x02);
    bus.write(0xD000, 0xCC);
    assert_eq!(bus.read(0xF000), 0xCC);

    bus.write(SVBK, 0x03);
    assert_eq!(bus.read(0xD000), 0x00);

    bus.write(SVBK, 0x02);
    assert_eq!(bus.read(0xD000), 0xCC);
    assert_eq!(bus.read(SVBK), 0xFA);
}

#[test]
fn svbk_zero_selects_bank_one() {
    let mut bus = bus(Model::Cgb);
    bus.write(SVBK, 0x00);
    bus.write(0xD123, 0x5A);
    bus.write(SVBK, 0x01);
    assert_eq!(bus.read(0xD123), 0x5A);
}

#[test]
fn cgb_registers_are_open_bus_on_dmg() {
    let mut bus = bus(Model::Dmg);
    for addr in [KEY1, SVBK, HDMA5, VBK] {
        assert_eq!(bus.delegate_at(addr), None);
        assert_eq!(bus.read(addr), 0xFF, "{addr:04X}");
    }
    // DMG WRAM has no banking: the write lands in bank 1 regardless.
    bus.write(SVBK, 0x03);
    bus.write(0xD000, 0x11);
    assert_eq!(bus.read(0xD000), 0x11);
}

#[test]
fn delegate_table_has_no_duplicates() {
    for model in [Model::Dmg, Model::Cgb] {
        let delegates = Bus::memory_delegates(model);
        let mut seen = std::collections::HashSet::new();
        for d in &delegates {
            assert!(seen.insert(d.address), "{:04X} registered twice", d.address);
        }
    }
    let bus = bus(Model::Cgb);
    assert_eq!(bus.delegate_at(LCDC), Some(Device::Ppu));
    assert_eq!(bus.delegate_at(0xFF26), Some(Device::Apu));
    assert_eq!(bus.delegate_at(0xFF30), Some(Device::Apu));
    assert_eq!(bus.delegate_at(0xFF05), Some(Device::Timer));
    assert_eq!(bus.delegate_at(0xFF00), Some(Device::Joypad));
    assert_eq!(bus.delegate_at(KEY1), Some(Device::Speed));
    assert_eq!(bus.delegate_at(0xC000), None);
}

#[test]
fn unmapped_addresses_read_ff() {
    let mut bus = bus(Model::Dmg);
    assert_eq!(bus.read(0xFEA0), 0xFF);
    assert_eq!(bus.read(0xFF7F), 0xFF);
    bus.write(0xFEA0, 0x12);
    assert_eq!(bus.read(0xFEA0), 0xFF);
}

#[test]
fn interrupt_registers_route_through_bus() {
    let mut bus = bus(Model::Dmg);
    bus.write(0xFF0F, 0x04);
    assert_eq!(bus.read(0xFF0F), 0xE4);
    assert_eq!(bus.interrupts.flags, 0x04);
    bus.write(0xFFFF, 0x1F);
    assert_eq!(bus.interrupts.enable, 0x1F);
}

#[test]
fn high_ram_and_word_access() {
    let mut bus = bus(Model::Dmg);
    bus.write_word(0xFF80, 0xBEEF);
    assert_eq!(bus.read(0xFF80), 0xEF);
    assert_eq!(bus.read(0xFF81), 0xBE);
    assert_eq!(bus.read_word(0xFF80), 0xBEEF);
}

#[test]
fn oam_dma_copies_page_into_oam() {
    let mut bus = bus(Model::Dmg);
    for i in 0..0xA0u16 {
        bus.write(0xC100 + i, i as u8 ^ 0x5A);
    }
    bus.write(0xFF46, 0xC1);
    assert_eq!(bus.read(0xFF46), 0xC1);

    bus.write(LCDC, 0x00);
    for i in 0..0xA0u16 {
        assert_eq!(bus.read(0xFE00 + i), i as u8 ^ 0x5A);
    }
}

#[test]
fn vram_is_locked_during_pixel_transfer() {
    let mut bus = bus(Model::Dmg);
    bus.write(0x8000, 0x42);
    assert_eq!(bus.read(0x8000), 0x42);
    assert_eq!(bus.read(0xFE00), 0xFF, "OAM locked during OAM scan");

    let mut video = NullVideoSink;
    bus.ppu.tick(90, &mut bus.interrupts, &mut video);
    assert_eq!(bus.ppu.mode(), Mode::ReadingOamVram);
    assert_eq!(bus.read(0x8000), 0xFF);
    bus.write(0x8000, 0x99);

    bus.ppu.tick(200, &mut bus.interrupts, &mut video);
    assert_eq!(bus.ppu.mode(), Mode::HBlank);
    assert_eq!(bus.read(0x8000), 0x42);
}

fn program_hdma(bus: &mut Bus, src: u16, dst: u16) {
    bus.write(HDMA1, (src >> 8) as u8);
    bus.write(HDMA2, src as u8);
    bus.write(HDMA3, (dst >> 8) as u8);
    bus.write(HDMA4, dst as u8);
}

#[test]
fn general_hdma_copies_immediately() {
    let mut bus = bus(Model::Cgb);
    bus.write(LCDC, 0x00);
    for i in 0..0x20u16 {
        bus.write(0xC000 + i, i as u8 + 1);
    }
    // Low nibbles of source and destination are ignored.
    program_hdma(&mut bus, 0xC00F, 0x8105);
    bus.write(HDMA5, 0x01);

    for i in 0..0x20u16 {
        assert_eq!(bus.read(0x8100 + i), i as u8 + 1);
    }
    assert!(!bus.hdma_active());
    assert_eq!(bus.read(HDMA5), 0xFF);
}

#[test]
fn hblank_hdma_copies_one_block_per_hblank() {
    let mut bus = bus(Model::Cgb);
    for i in 0..0x20u16 {
        bus.write(0xC000 + i, 0xA0 + i as u8);
    }
    program_hdma(&mut bus, 0xC000, 0x8000);
    bus.write(HDMA5, 0x81);
    assert_eq!(bus.read(HDMA5), 0x01);

    bus.hdma_hblank();
    assert_eq!(bus.read(HDMA5), 0x00);
    bus.hdma_hblank();
    assert!(!bus.hdma_active());
    assert_eq!(bus.read(HDMA5), 0xFF);

    bus.write(LCDC, 0x00);
    assert_eq!(bus.read(0x8000), 0xA0);
    assert_eq!(bus.read(0x801F), 0xBF);
}

#[test]
fn hblank_hdma_can_be_cancelled() {
    let mut bus = bus(Model::Cgb);
    program_hdma(&mut bus, 0xC000, 0x8000);
    bus.write(HDMA5, 0x83);
    bus.hdma_hblank();
    bus.write(HDMA5, 0x00);
    assert!(!bus.hdma_active());
    assert_eq!(bus.read(HDMA5), 0x82);
    bus.hdma_hblank();
    assert_eq!(bus.read(HDMA5), 0x82);
}

#[test]
fn key1_reports_normal_speed() {
    let mut bus = bus(Model::Cgb);
    assert_eq!(bus.read(KEY1), 0x7E);
    bus.write(KEY1, 0x01);
    assert_eq!(bus.read(KEY1), 0x7F);
}

#[test]
fn vram_bank_switch() {
    let mut bus = bus(Model::Cgb);
    bus.write(LCDC, 0x00);
    bus.write(0x8000, 0x11);
    bus.write(VBK, 0x01);
    assert_eq!(bus.read(0x8000), 0x00);
    bus.write(0x8000, 0x22);
    bus.write(VBK, 0x00);
    assert_eq!(bus.read(0x8000), 0x11);
    assert_eq!(bus.read(VBK), 0xFE);
}

#[test]
fn hblank_hdma_started_inside_hblank_copies_first_block_at_once() {
    let mut bus = bus(Model::Cgb);
    for i in 0..0x20u16 {
        bus.write(0xC000 + i, 0x40 + i as u8);
    }
    let mut video = NullVideoSink;
    bus.ppu.tick(83 + 175, &mut bus.interrupts, &mut video);
    assert_eq!(bus.ppu.mode(), Mode::HBlank);

    program_hdma(&mut bus, 0xC000, 0x8000);
    bus.write(HDMA5, 0x81);
    assert!(bus.hdma_active());
    assert_eq!(bus.read(HDMA5), 0x00);
    assert_eq!(bus.read(0x8000), 0x40);
    assert_eq!(bus.read(0x800F), 0x4F);
    assert_eq!(bus.read(0x8010), 0x00);

    bus.hdma_hblank();
    assert!(!bus.hdma_active());
    assert_eq!(bus.read(0x801F), 0x5F);
}

#[test]
fn hblank_hdma_with_lcd_off_starts_immediately() {
    let mut bus = bus(Model::Cgb);
    bus.write(LCDC, 0x00);
    bus.write(0xC000, 0x77);
    program_hdma(&mut bus, 0xC000, 0x8000);
    bus.write(HDMA5, 0x80);
    assert!(!bus.hdma_active());
    assert_eq!(bus.read(0x8000), 0x77);
}
