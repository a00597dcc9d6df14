use crate::frontend::{Color, SCREEN_HEIGHT, SCREEN_WIDTH, VideoSink};
use crate::interrupts::{Interrupt, Interrupts};
use crate::register::AddressRange;

// Mode lengths in T-cycles. A visible line is 83 + 175 + 207 = 465 cycles.
const READING_OAM_CYCLES: u32 = 83;
const READING_OAM_VRAM_CYCLES: u32 = 175;
const HBLANK_CYCLES: u32 = 207;
const VBLANK_LINE_CYCLES: u32 = 456;

/// 144 visible lines followed by 10 V-Blank lines.
const LAST_LINE: u8 = 153;

const SPRITES_PER_LINE: usize = 10;

const VRAM_BANK_LEN: usize = 0x2000;
const OAM_LEN: usize = 0xA0;

// Offsets into a VRAM bank.
const TILE_MAP_LOW: usize = 0x1800;
const TILE_MAP_HIGH: usize = 0x1C00;
/// Base for signed tile indices when LCDC bit 4 is clear.
const SIGNED_TILE_BASE: isize = 0x1000;

pub const VRAM_RANGE: AddressRange = AddressRange::new(0x8000, 0x9FFF);
pub const OAM_RANGE: AddressRange = AddressRange::new(0xFE00, 0xFE9F);

pub const LCDC: u16 = 0xFF40;
pub const STAT: u16 = 0xFF41;
pub const SCY: u16 = 0xFF42;
pub const SCX: u16 = 0xFF43;
pub const LY: u16 = 0xFF44;
pub const LYC: u16 = 0xFF45;
pub const BGP: u16 = 0xFF47;
pub const OBP0: u16 = 0xFF48;
pub const OBP1: u16 = 0xFF49;
pub const WY: u16 = 0xFF4A;
pub const WX: u16 = 0xFF4B;
pub const VBK: u16 = 0xFF4F;
pub const BCPS: u16 = 0xFF68;
pub const BCPD: u16 = 0xFF69;
pub const OCPS: u16 = 0xFF6A;
pub const OCPD: u16 = 0xFF6B;

const DMG_REGISTERS: [u16; 11] = [LCDC, STAT, SCY, SCX, LY, LYC, BGP, OBP0, OBP1, WY, WX];
const CGB_REGISTERS: [u16; 5] = [VBK, BCPS, BCPD, OCPS, OCPD];

// LCDC bits
const LCDC_BG_ON: u8 = 0x01;
const LCDC_OBJ_ON: u8 = 0x02;
const LCDC_TALL_OBJ: u8 = 0x04;
const LCDC_BG_MAP: u8 = 0x08;
const LCDC_UNSIGNED_TILES: u8 = 0x10;
const LCDC_WINDOW_ON: u8 = 0x20;
const LCDC_WINDOW_MAP: u8 = 0x40;
const LCDC_ENABLE: u8 = 0x80;

// Sprite and CGB map attribute bits
const ATTR_PALETTE: u8 = 0x07;
const ATTR_BANK: u8 = 0x08;
const ATTR_DMG_PALETTE: u8 = 0x10;
const ATTR_FLIP_X: u8 = 0x20;
const ATTR_FLIP_Y: u8 = 0x40;
const ATTR_PRIORITY: u8 = 0x80;

/// Default DMG palette colors, lightest first.
const DMG_PALETTE: [Color; 4] = [
    Color::from_rgb(0x9BBC0F),
    Color::from_rgb(0x8BAC0F),
    Color::from_rgb(0x306230),
    Color::from_rgb(0x0F380F),
];

/// STAT mode, valued as reported in STAT bits 0-1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    ReadingOam = 2,
    ReadingOamVram = 3,
}

impl Mode {
    fn length(self) -> u32 {
        match self {
            Mode::ReadingOam => READING_OAM_CYCLES,
            Mode::ReadingOamVram => READING_OAM_VRAM_CYCLES,
            Mode::HBlank => HBLANK_CYCLES,
            Mode::VBlank => VBLANK_LINE_CYCLES,
        }
    }
}

/// 64 bytes of CGB palette memory behind an index register (BCPS/OCPS) and a
/// data port (BCPD/OCPD).
struct PaletteRam {
    /// Bit 7 auto-increment, bits 0-5 byte index. Bit 6 reads back as 1.
    spec: u8,
    data: [u8; 0x40],
}

impl PaletteRam {
    const INDEX: u8 = 0x3F;
    const AUTO_INCREMENT: u8 = 0x80;

    fn new() -> Self {
        Self {
            spec: 0x40,
            data: [0; 0x40],
        }
    }

    fn index(&self) -> usize {
        (self.spec & Self::INDEX) as usize
    }

    fn write_spec(&mut self, val: u8) {
        self.spec = val | 0x40;
    }

    fn read_data(&self) -> u8 {
        self.data[self.index()]
    }

    fn write_data(&mut self, val: u8) {
        self.data[self.index()] = val;
        if self.spec & Self::AUTO_INCREMENT != 0 {
            let next = self.spec.wrapping_add(1) & Self::INDEX;
            self.spec = (self.spec & !Self::INDEX) | next;
        }
    }

    /// Store four little-endian RGB555 colors as `palette`.
    fn load(&mut self, palette: usize, colors: [u16; 4]) {
        for (slot, rgb) in self.data[palette * 8..palette * 8 + 8]
            .chunks_exact_mut(2)
            .zip(colors)
        {
            slot.copy_from_slice(&rgb.to_le_bytes());
        }
    }

    fn color(&self, palette: usize, color_id: usize) -> Color {
        let at = palette * 8 + color_id * 2;
        let rgb = u16::from_le_bytes([self.data[at], self.data[at + 1]]);
        // Scale 5-bit channels to 8 bits.
        let channel = |shift: u16| {
            let c = ((rgb >> shift) & 0x1F) as u8;
            (c << 3) | (c >> 2)
        };
        Color::new(channel(0), channel(5), channel(10))
    }
}

/// An OAM entry selected for the current line.
#[derive(Clone, Copy, Debug, Default)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    attrs: u8,
    oam_index: u8,
}

#[inline]
fn color_id(low: u8, high: u8, bit: u8) -> u8 {
    (((high >> bit) & 1) << 1) | ((low >> bit) & 1)
}

#[inline]
fn dmg_shade(palette: u8, color_id: u8) -> usize {
    ((palette >> (color_id * 2)) & 0x03) as usize
}

pub struct Ppu {
    vram: Box<[[u8; VRAM_BANK_LEN]; 2]>,
    vram_bank: usize,
    oam: [u8; OAM_LEN],

    cgb: bool,
    /// CGB hardware running a DMG cartridge: DMG palettes index into CGB
    /// palette RAM.
    compat: bool,

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,
    /// Window rows drawn so far this frame.
    window_line: u8,

    bg_palettes: PaletteRam,
    obj_palettes: PaletteRam,

    mode: Mode,
    mode_clock: u32,

    framebuffer: Box<[Color; SCREEN_WIDTH * SCREEN_HEIGHT]>,
    line: [Color; SCREEN_WIDTH],
    /// CGB map attribute bit 7 of the BG/window pixel under each column.
    bg_over_obj: [bool; SCREEN_WIDTH],
    /// BG/window pixel under each column uses color 0.
    bg_transparent: [bool; SCREEN_WIDTH],
    sprites: Vec<Sprite>,
    /// Level of the combined STAT interrupt line, for edge detection.
    stat_line: bool,
    frames: u64,
}

impl Ppu {
    pub fn new(cgb: bool) -> Self {
        Self {
            vram: Box::new([[0; VRAM_BANK_LEN]; 2]),
            vram_bank: 0,
            oam: [0; OAM_LEN],
            cgb,
            compat: false,
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            window_line: 0,
            bg_palettes: PaletteRam::new(),
            obj_palettes: PaletteRam::new(),
            mode: Mode::HBlank,
            mode_clock: 0,
            framebuffer: Box::new([Color::default(); SCREEN_WIDTH * SCREEN_HEIGHT]),
            line: [Color::default(); SCREEN_WIDTH],
            bg_over_obj: [false; SCREEN_WIDTH],
            bg_transparent: [true; SCREEN_WIDTH],
            sprites: Vec::with_capacity(SPRITES_PER_LINE),
            stat_line: false,
            frames: 0,
        }
    }

    /// Register state left behind by the boot ROM: LCD on, at the start of
    /// line 0.
    pub fn apply_boot_state(&mut self) {
        self.lcdc = 0x91;
        self.bgp = 0xFC;
        self.stat = 0;
        self.ly = 0;
        self.mode = Mode::ReadingOam;
        self.mode_clock = 0;
        self.window_line = 0;
        self.stat_line = false;
        if self.cgb {
            // The CGB boot ROM leaves every background palette white.
            for palette in 0..8 {
                self.bg_palettes.load(palette, [0x7FFF; 4]);
            }
        }
    }

    /// Load the palettes the CGB boot ROM installs for DMG cartridges.
    pub fn apply_dmg_compatibility_palettes(&mut self) {
        const BG: [u16; 4] = [0x7FFF, 0x1BEF, 0x6180, 0x0000];
        const OBJ: [u16; 4] = [0x7FFF, 0x421F, 0x1CF2, 0x0000];

        self.bg_palettes.load(0, BG);
        self.obj_palettes.load(0, OBJ);
        self.obj_palettes.load(1, OBJ);
        self.bgp = 0xE4;
        self.obp0 = 0xD0;
        self.obp1 = 0xE0;
        self.compat = true;
    }

    /// Memory-mapped registers owned by the PPU for the given model.
    pub fn registers(cgb: bool) -> impl Iterator<Item = u16> {
        let extra: &'static [u16] = if cgb { &CGB_REGISTERS } else { &[] };
        DMG_REGISTERS.into_iter().chain(extra.iter().copied())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ENABLE != 0
    }

    /// Number of completed LY sweeps (153 -> 0 wraps).
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn framebuffer(&self) -> &[Color; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.framebuffer
    }

    /// VRAM is owned by the PPU during pixel transfer.
    pub fn vram_blocked(&self) -> bool {
        self.lcd_enabled() && self.mode == Mode::ReadingOamVram
    }

    /// OAM is owned by the PPU during OAM scan and pixel transfer.
    pub fn oam_blocked(&self) -> bool {
        self.lcd_enabled() && matches!(self.mode, Mode::ReadingOam | Mode::ReadingOamVram)
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram[self.vram_bank][(addr - VRAM_RANGE.low) as usize]
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        self.vram[self.vram_bank][(addr - VRAM_RANGE.low) as usize] = val;
    }

    pub fn read_oam(&self, addr: u16) -> u8 {
        self.oam[(addr - OAM_RANGE.low) as usize]
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        self.oam[(addr - OAM_RANGE.low) as usize] = val;
    }

    pub fn bg_palette_color(&self, palette: usize, color_id: usize) -> Color {
        self.bg_palettes.color(palette, color_id)
    }

    pub fn ob_palette_color(&self, palette: usize, color_id: usize) -> Color {
        self.obj_palettes.color(palette, color_id)
    }

    fn stat_value(&self) -> u8 {
        let coincidence = if self.ly == self.lyc { 0x04 } else { 0 };
        0x80 | (self.stat & 0x78) | coincidence | self.mode as u8
    }

    pub fn read_reg(&mut self, addr: u16) -> u8 {
        match addr {
            LCDC => self.lcdc,
            STAT => self.stat_value(),
            SCY => self.scy,
            SCX => self.scx,
            LY => self.ly,
            LYC => self.lyc,
            BGP => self.bgp,
            OBP0 => self.obp0,
            OBP1 => self.obp1,
            WY => self.wy,
            WX => self.wx,
            VBK => 0xFE | self.vram_bank as u8,
            BCPS => self.bg_palettes.spec,
            BCPD => self.bg_palettes.read_data(),
            OCPS => self.obj_palettes.spec,
            OCPD => self.obj_palettes.read_data(),
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8, interrupts: &mut Interrupts) {
        match addr {
            LCDC => self.write_lcdc(val, interrupts),
            STAT => {
                self.stat = val & 0x78;
                self.update_stat_irq(interrupts);
            }
            SCY => self.scy = val,
            SCX => self.scx = val,
            // Read-only.
            LY => {}
            LYC => {
                self.lyc = val;
                self.update_stat_irq(interrupts);
            }
            BGP => self.bgp = val,
            OBP0 => self.obp0 = val,
            OBP1 => self.obp1 = val,
            WY => self.wy = val,
            WX => self.wx = val,
            VBK => self.vram_bank = (val & 0x01) as usize,
            BCPS => self.bg_palettes.write_spec(val),
            BCPD => self.bg_palettes.write_data(val),
            OCPS => self.obj_palettes.write_spec(val),
            OCPD => self.obj_palettes.write_data(val),
            _ => {}
        }
    }

    fn write_lcdc(&mut self, val: u8, interrupts: &mut Interrupts) {
        let was_on = self.lcd_enabled();
        self.lcdc = val;
        match (was_on, self.lcd_enabled()) {
            (true, false) => {
                self.ly = 0;
                self.mode = Mode::HBlank;
                self.mode_clock = 0;
                self.stat_line = false;
                log::trace!("LCD off");
            }
            (false, true) => {
                self.ly = 0;
                self.mode = Mode::ReadingOam;
                self.mode_clock = 0;
                self.window_line = 0;
                self.update_stat_irq(interrupts);
                log::trace!("LCD on");
            }
            _ => {}
        }
    }

    /// Advance the mode state machine by `cycles`. Returns how many times
    /// H-Blank was entered, so the caller can step H-Blank DMA.
    pub fn tick(
        &mut self,
        cycles: u32,
        interrupts: &mut Interrupts,
        video: &mut dyn VideoSink,
    ) -> u32 {
        if !self.lcd_enabled() {
            return 0;
        }
        let mut hblanks = 0;
        self.mode_clock += cycles;
        while self.mode_clock >= self.mode.length() {
            self.mode_clock -= self.mode.length();
            self.mode = match self.mode {
                Mode::ReadingOam => {
                    self.select_sprites();
                    Mode::ReadingOamVram
                }
                Mode::ReadingOamVram => {
                    self.render_scanline();
                    video.on_render_line(self.ly, &self.line);
                    hblanks += 1;
                    Mode::HBlank
                }
                Mode::HBlank => {
                    self.ly += 1;
                    if self.ly as usize == SCREEN_HEIGHT {
                        interrupts.request(Interrupt::VBlank);
                        video.on_render_frame();
                        Mode::VBlank
                    } else {
                        Mode::ReadingOam
                    }
                }
                Mode::VBlank if self.ly == LAST_LINE => {
                    self.ly = 0;
                    self.window_line = 0;
                    self.frames = self.frames.wrapping_add(1);
                    Mode::ReadingOam
                }
                Mode::VBlank => {
                    self.ly += 1;
                    Mode::VBlank
                }
            };
            self.update_stat_irq(interrupts);
        }
        hblanks
    }

    /// STAT interrupt fires on a rising edge of the OR of enabled sources.
    fn update_stat_irq(&mut self, interrupts: &mut Interrupts) {
        if !self.lcd_enabled() {
            self.stat_line = false;
            return;
        }
        let source_bit = match self.mode {
            Mode::HBlank => 0x08,
            Mode::VBlank => 0x10,
            Mode::ReadingOam => 0x20,
            Mode::ReadingOamVram => 0x00,
        };
        let lyc_bit = if self.ly == self.lyc { 0x40 } else { 0x00 };
        let line = self.stat & (source_bit | lyc_bit) != 0;
        if line && !self.stat_line {
            interrupts.request(Interrupt::LcdStat);
        }
        self.stat_line = line;
    }

    fn sprite_height(&self) -> i16 {
        if self.lcdc & LCDC_TALL_OBJ != 0 { 16 } else { 8 }
    }

    /// True when tile attributes and palette RAM drive rendering.
    fn color_rendering(&self) -> bool {
        self.cgb && !self.compat
    }

    /// Pick the first ten OAM entries overlapping LY, in drawing priority
    /// order: OAM order on CGB, otherwise X then OAM order.
    fn select_sprites(&mut self) {
        let height = self.sprite_height();
        let ly = self.ly as i16;
        self.sprites.clear();
        self.sprites.extend(
            self.oam
                .chunks_exact(4)
                .enumerate()
                .map(|(i, entry)| Sprite {
                    y: entry[0] as i16 - 16,
                    x: entry[1] as i16 - 8,
                    tile: entry[2],
                    attrs: entry[3],
                    oam_index: i as u8,
                })
                .filter(|s| (s.y..s.y + height).contains(&ly))
                .take(SPRITES_PER_LINE),
        );
        if !self.color_rendering() {
            // Stable sort keeps OAM order among equal X.
            self.sprites.sort_by_key(|s| s.x);
        }
    }

    fn bg_color(&self, palette: usize, color_id: u8) -> Color {
        if self.color_rendering() {
            return self.bg_palettes.color(palette, color_id as usize);
        }
        let shade = dmg_shade(self.bgp, color_id);
        if self.compat {
            self.bg_palettes.color(0, shade)
        } else {
            DMG_PALETTE[shade]
        }
    }

    fn obj_color(&self, attrs: u8, color_id: u8) -> Color {
        if self.color_rendering() {
            return self
                .obj_palettes
                .color((attrs & ATTR_PALETTE) as usize, color_id as usize);
        }
        let (palette, obp) = if attrs & ATTR_DMG_PALETTE != 0 {
            (1, self.obp1)
        } else {
            (0, self.obp0)
        };
        let shade = dmg_shade(obp, color_id);
        if self.compat {
            self.obj_palettes.color(palette, shade)
        } else {
            DMG_PALETTE[shade]
        }
    }

    /// Byte offset of a background tile's pixel data within a VRAM bank.
    fn bg_tile_offset(&self, tile: u8) -> usize {
        if self.lcdc & LCDC_UNSIGNED_TILES != 0 {
            tile as usize * 16
        } else {
            (SIGNED_TILE_BASE + tile as i8 as isize * 16) as usize
        }
    }

    /// Both bitplanes of row `row` of the tile at `offset`.
    fn tile_row(&self, bank: usize, offset: usize, row: usize) -> (u8, u8) {
        let at = offset + row * 2;
        (self.vram[bank][at], self.vram[bank][at + 1])
    }

    /// Fill column `x` of the line from the tile map at `map_base`, sampled
    /// at map pixel (`map_x`, `map_y`).
    fn fetch_bg_pixel(&mut self, x: usize, map_base: usize, map_x: usize, map_y: usize) {
        let entry = map_base + (map_y / 8) * 32 + map_x / 8;
        let tile = self.vram[0][entry];
        let attrs = if self.color_rendering() {
            self.vram[1][entry]
        } else {
            0
        };

        let col = (map_x % 8) as u8;
        let row = map_y % 8;
        let bit = if attrs & ATTR_FLIP_X != 0 { col } else { 7 - col };
        let row = if attrs & ATTR_FLIP_Y != 0 { 7 - row } else { row };
        let bank = usize::from(attrs & ATTR_BANK != 0);
        let (low, high) = self.tile_row(bank, self.bg_tile_offset(tile), row);
        let id = color_id(low, high, bit);

        self.line[x] = self.bg_color((attrs & ATTR_PALETTE) as usize, id);
        self.bg_over_obj[x] = attrs & ATTR_PRIORITY != 0;
        self.bg_transparent[x] = id == 0;
    }

    fn render_scanline(&mut self) {
        if self.ly as usize >= SCREEN_HEIGHT {
            return;
        }
        self.bg_over_obj.fill(false);
        self.bg_transparent.fill(true);

        // LCDC bit 0 disables BG/window on DMG; on CGB it only drops their
        // priority over sprites.
        let bg_on = self.color_rendering() || self.lcdc & LCDC_BG_ON != 0;
        let bg_can_cover = !self.color_rendering() || self.lcdc & LCDC_BG_ON != 0;

        let backdrop = self.bg_color(0, 0);
        self.line.fill(backdrop);

        if bg_on {
            self.render_background();
            self.render_window();
        }
        if self.lcdc & LCDC_OBJ_ON != 0 {
            self.render_sprites(bg_on, bg_can_cover);
        }

        let start = self.ly as usize * SCREEN_WIDTH;
        self.framebuffer[start..start + SCREEN_WIDTH].copy_from_slice(&self.line);
    }

    fn render_background(&mut self) {
        let map = if self.lcdc & LCDC_BG_MAP != 0 {
            TILE_MAP_HIGH
        } else {
            TILE_MAP_LOW
        };
        let map_y = self.ly.wrapping_add(self.scy) as usize;
        for x in 0..SCREEN_WIDTH {
            let map_x = (x as u8).wrapping_add(self.scx) as usize;
            self.fetch_bg_pixel(x, map, map_x, map_y);
        }
    }

    fn render_window(&mut self) {
        // WX values above 166 put the window off screen.
        if self.lcdc & LCDC_WINDOW_ON == 0 || self.ly < self.wy || self.wx > 166 {
            return;
        }
        let map = if self.lcdc & LCDC_WINDOW_MAP != 0 {
            TILE_MAP_HIGH
        } else {
            TILE_MAP_LOW
        };
        let left = self.wx as isize - 7;
        let row = self.window_line as usize;
        for x in left.max(0) as usize..SCREEN_WIDTH {
            self.fetch_bg_pixel(x, map, (x as isize - left) as usize, row);
        }
        self.window_line = self.window_line.wrapping_add(1);
    }

    fn render_sprites(&mut self, bg_on: bool, bg_can_cover: bool) {
        let height = self.sprite_height();
        let mut claimed = [false; SCREEN_WIDTH];
        for i in 0..self.sprites.len() {
            let s = self.sprites[i];
            let mut row = self.ly as i16 - s.y;
            if s.attrs & ATTR_FLIP_Y != 0 {
                row = height - 1 - row;
            }
            // Tall sprites ignore bit 0 of the tile index.
            let tile = if height == 16 { s.tile & 0xFE } else { s.tile };
            let bank = if self.color_rendering() {
                usize::from(s.attrs & ATTR_BANK != 0)
            } else {
                0
            };
            let (low, high) = self.tile_row(bank, tile as usize * 16, row as usize);

            for col in 0..8u8 {
                let bit = if s.attrs & ATTR_FLIP_X != 0 { col } else { 7 - col };
                let id = color_id(low, high, bit);
                let sx = s.x + col as i16;
                if id == 0 || !(0..SCREEN_WIDTH as i16).contains(&sx) {
                    continue;
                }
                let sx = sx as usize;
                if claimed[sx] {
                    continue;
                }
                // A hidden pixel still claims the column so lower priority
                // sprites cannot show through.
                claimed[sx] = true;
                let bg_opaque = bg_on && !self.bg_transparent[sx];
                let behind = self.bg_over_obj[sx] || s.attrs & ATTR_PRIORITY != 0;
                if bg_can_cover && bg_opaque && behind {
                    continue;
                }
                self.line[sx] = self.obj_color(s.attrs, id);
            }
        }
    }
}
