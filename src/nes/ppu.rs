use super::cartridge::{Cartridge, TvSystem};
use super::mapper::Mirroring;
use super::palette;

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;

const PRE_RENDER_SCANLINE: i16 = -1;
const POST_RENDER_SCANLINE: i16 = FRAME_HEIGHT as i16;
const VBLANK_SCANLINE: i16 = POST_RENDER_SCANLINE + 1;
const LAST_DOT: u16 = 340;

const CTRL_NMI_ENABLE: u8 = 0x80;
const CTRL_SPRITE_SIZE_16: u8 = 0x20;
const CTRL_BG_TABLE: u8 = 0x10;
const CTRL_SPRITE_TABLE: u8 = 0x08;
const CTRL_VRAM_INC_32: u8 = 0x04;

const MASK_GREYSCALE: u8 = 0x01;
const MASK_SHOW_BG_LEFT: u8 = 0x02;
const MASK_SHOW_SPRITE_LEFT: u8 = 0x04;
const MASK_SHOW_BG: u8 = 0x08;
const MASK_SHOW_SPRITES: u8 = 0x10;

const STATUS_SPRITE_OVERFLOW: u8 = 0x20;
const STATUS_SPRITE_ZERO_HIT: u8 = 0x40;
const STATUS_VBLANK: u8 = 0x80;

const ATTR_PALETTE: u8 = 0x03;
const ATTR_BEHIND_BG: u8 = 0x20;
const ATTR_FLIP_H: u8 = 0x40;
const ATTR_FLIP_V: u8 = 0x80;

const EMPTY_SLOT_ID: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpriteSlot {
    id: u8,
    y: u8,
    tile: u8,
    attr: u8,
    x: u8,
    pattern_lo: u8,
    pattern_hi: u8,
}

impl SpriteSlot {
    const EMPTY: Self = Self {
        id: EMPTY_SLOT_ID,
        y: 0xFF,
        tile: 0xFF,
        attr: 0xFF,
        x: 0xFF,
        pattern_lo: 0,
        pattern_hi: 0,
    };
}

pub struct Ppu {
    ctrl: u8,
    mask: u8,
    status: u8,
    oam_addr: u8,
    open_bus: u8,
    read_buffer: u8,

    // Loopy registers: yyy NN YYYYY XXXXX.
    v: u16,
    t: u16,
    fine_x: u8,
    write_toggle: bool,

    nametables: [u8; 0x800],
    palette_ram: [u8; 32],
    oam: [u8; 256],

    secondary_oam: [SpriteSlot; 8],
    sprites: [SpriteSlot; 8],

    fetch_addr: u16,
    next_tile: u8,
    next_attr: u8,
    next_pattern_lo: u8,
    next_pattern_hi: u8,
    bg_shift_lo: u16,
    bg_shift_hi: u16,
    attr_shift_lo: u8,
    attr_shift_hi: u8,
    attr_latch_lo: bool,
    attr_latch_hi: bool,

    scanline: i16,
    dot: u16,
    odd_frame: bool,
    last_scanline: i16,
    tv_system: TvSystem,
    frame_count: u64,

    nmi_pending: bool,
    frame_ready: bool,
    frame_buffer: Vec<u8>,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        let mut ppu = Self {
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            open_bus: 0,
            read_buffer: 0,
            v: 0,
            t: 0,
            fine_x: 0,
            write_toggle: false,
            nametables: [0xFF; 0x800],
            palette_ram: [0x0F; 32],
            oam: [0; 256],
            secondary_oam: [SpriteSlot::EMPTY; 8],
            sprites: [SpriteSlot::EMPTY; 8],
            fetch_addr: 0,
            next_tile: 0,
            next_attr: 0,
            next_pattern_lo: 0,
            next_pattern_hi: 0,
            bg_shift_lo: 0,
            bg_shift_hi: 0,
            attr_shift_lo: 0,
            attr_shift_hi: 0,
            attr_latch_lo: false,
            attr_latch_hi: false,
            scanline: 0,
            dot: 0,
            odd_frame: false,
            last_scanline: 0,
            tv_system: TvSystem::Ntsc,
            frame_count: 0,
            nmi_pending: false,
            frame_ready: false,
            frame_buffer: vec![0; FRAME_WIDTH * FRAME_HEIGHT * 4],
        };
        ppu.set_tv_system(TvSystem::Ntsc);
        ppu
    }

    pub fn set_tv_system(&mut self, tv_system: TvSystem) {
        self.tv_system = tv_system;
        let vblank_lines = match tv_system {
            TvSystem::Ntsc => 20,
            TvSystem::Pal => 70,
        };
        self.last_scanline = POST_RENDER_SCANLINE + vblank_lines;
    }

    pub fn reset(&mut self) {
        self.ctrl = 0;
        self.mask = 0;
        self.status = 0;
        self.oam_addr = 0;
        self.open_bus = 0;
        self.read_buffer = 0;
        self.v = 0;
        self.t = 0;
        self.fine_x = 0;
        self.write_toggle = false;
        self.secondary_oam = [SpriteSlot::EMPTY; 8];
        self.sprites = [SpriteSlot::EMPTY; 8];
        self.bg_shift_lo = 0;
        self.bg_shift_hi = 0;
        self.attr_shift_lo = 0;
        self.attr_shift_hi = 0;
        self.scanline = 0;
        self.dot = 0;
        self.odd_frame = false;
        self.frame_count = 0;
        self.nmi_pending = false;
        self.frame_ready = false;
        self.frame_buffer.fill(0);
    }

    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn scanline(&self) -> i16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    pub fn registers(&self) -> (u8, u8, u8, u8) {
        (self.ctrl, self.mask, self.status, self.oam_addr)
    }

    pub fn scroll_registers(&self) -> (u16, u16, u8, bool) {
        (self.v, self.t, self.fine_x, self.write_toggle)
    }

    pub fn nametable_ram(&self) -> &[u8] {
        &self.nametables
    }

    pub fn palette_ram(&self) -> &[u8] {
        &self.palette_ram
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn read_register(&mut self, addr: u16, cartridge: &Cartridge) -> u8 {
        let value = match addr & 0x07 {
            2 => {
                let value = (self.status & 0xE0) | (self.open_bus & 0x1F);
                self.status &= !STATUS_VBLANK;
                self.write_toggle = false;
                value
            }
            4 => self.oam[usize::from(self.oam_addr)],
            7 => {
                let addr = self.v & 0x3FFF;
                let value = self.read_memory(addr, cartridge);
                let result = if addr >= 0x3F00 {
                    // Palette reads bypass the buffer; it picks up the nametable byte underneath.
                    self.read_buffer = self.read_memory(addr - 0x1000, cartridge);
                    value
                } else {
                    std::mem::replace(&mut self.read_buffer, value)
                };
                self.increment_vram_addr();
                result
            }
            _ => self.open_bus,
        };
        self.open_bus = value;
        value
    }

    pub fn write_register(&mut self, addr: u16, value: u8, cartridge: &mut Cartridge) {
        self.open_bus = value;
        match addr & 0x07 {
            0 => {
                let nmi_was_enabled = (self.ctrl & CTRL_NMI_ENABLE) != 0;
                self.ctrl = value;
                self.t = (self.t & !0x0C00) | (u16::from(value & 0x03) << 10);
                if !nmi_was_enabled
                    && (value & CTRL_NMI_ENABLE) != 0
                    && (self.status & STATUS_VBLANK) != 0
                {
                    self.nmi_pending = true;
                }
            }
            1 => self.mask = value,
            3 => self.oam_addr = value,
            4 => {
                self.oam[usize::from(self.oam_addr)] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            5 => {
                let value = u16::from(value);
                if !self.write_toggle {
                    self.fine_x = (value & 0x07) as u8;
                    self.t = (self.t & !0x001F) | (value >> 3);
                } else {
                    self.t = (self.t & !0x73E0) | ((value & 0x07) << 12) | ((value >> 3) << 5);
                }
                self.write_toggle = !self.write_toggle;
            }
            6 => {
                if !self.write_toggle {
                    self.t = (self.t & 0x00FF) | (u16::from(value & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0x7F00) | u16::from(value);
                    self.v = self.t;
                }
                self.write_toggle = !self.write_toggle;
            }
            7 => {
                self.write_memory(self.v & 0x3FFF, value, cartridge);
                self.increment_vram_addr();
            }
            _ => {}
        }
    }

    pub fn peek_register(&self, addr: u16) -> u8 {
        match addr & 0x07 {
            2 => (self.status & 0xE0) | (self.open_bus & 0x1F),
            4 => self.oam[usize::from(self.oam_addr)],
            7 => self.read_buffer,
            _ => self.open_bus,
        }
    }

    pub fn step(&mut self, cartridge: &Cartridge) {
        if self.scanline < POST_RENDER_SCANLINE {
            self.render_dot(cartridge);
        } else if self.scanline == POST_RENDER_SCANLINE {
            if self.dot == 0 {
                self.frame_ready = true;
                self.frame_count += 1;
            }
        } else if self.scanline == VBLANK_SCANLINE && self.dot == 1 {
            self.status |= STATUS_VBLANK;
            if (self.ctrl & CTRL_NMI_ENABLE) != 0 {
                self.nmi_pending = true;
            }
        }
        self.advance();
    }

    fn advance(&mut self) {
        if self.scanline == PRE_RENDER_SCANLINE
            && self.dot == LAST_DOT - 1
            && self.odd_frame
            && self.tv_system == TvSystem::Ntsc
            && self.rendering_enabled()
        {
            self.dot = LAST_DOT;
        }

        self.dot += 1;
        if self.dot > LAST_DOT {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline > self.last_scanline {
                self.scanline = PRE_RENDER_SCANLINE;
                self.odd_frame = !self.odd_frame;
            }
        }
    }

    fn render_dot(&mut self, cartridge: &Cartridge) {
        let pre_render = self.scanline == PRE_RENDER_SCANLINE;

        match self.dot {
            1 => {
                self.secondary_oam = [SpriteSlot::EMPTY; 8];
                if pre_render {
                    self.status &= !(STATUS_SPRITE_OVERFLOW | STATUS_SPRITE_ZERO_HIT | STATUS_VBLANK);
                }
            }
            257 if self.rendering_enabled() => self.evaluate_sprites(),
            321 => self.load_sprites(cartridge),
            _ => {}
        }

        match self.dot {
            2..=255 | 322..=337 => {
                self.output_pixel();
                match self.dot % 8 {
                    1 => {
                        self.fetch_addr = self.nametable_addr();
                        self.reload_shifters();
                    }
                    2 => self.next_tile = self.read_memory(self.fetch_addr, cartridge),
                    3 => self.fetch_addr = self.attribute_addr(),
                    4 => {
                        let mut attr = self.read_memory(self.fetch_addr, cartridge);
                        if (self.v & 0x0040) != 0 {
                            attr >>= 4;
                        }
                        if (self.v & 0x0002) != 0 {
                            attr >>= 2;
                        }
                        self.next_attr = attr;
                    }
                    5 => self.fetch_addr = self.pattern_addr(),
                    6 => self.next_pattern_lo = self.read_memory(self.fetch_addr, cartridge),
                    7 => self.fetch_addr += 8,
                    _ => {
                        self.next_pattern_hi = self.read_memory(self.fetch_addr, cartridge);
                        self.increment_coarse_x();
                    }
                }
            }
            256 => {
                self.output_pixel();
                self.next_pattern_hi = self.read_memory(self.fetch_addr, cartridge);
                self.increment_y();
            }
            257 => {
                self.output_pixel();
                self.reload_shifters();
                self.copy_horizontal_bits();
            }
            280..=304 if pre_render => self.copy_vertical_bits(),
            1 | 321 | 339 => self.fetch_addr = self.nametable_addr(),
            338 | 340 => self.next_tile = self.read_memory(self.fetch_addr, cartridge),
            _ => {}
        }
    }

    fn rendering_enabled(&self) -> bool {
        (self.mask & (MASK_SHOW_BG | MASK_SHOW_SPRITES)) != 0
    }

    fn sprite_height(&self) -> i16 {
        if (self.ctrl & CTRL_SPRITE_SIZE_16) != 0 { 16 } else { 8 }
    }

    fn nametable_addr(&self) -> u16 {
        0x2000 | (self.v & 0x0FFF)
    }

    fn attribute_addr(&self) -> u16 {
        0x23C0 | (self.v & 0x0C00) | ((self.v >> 4) & 0x38) | ((self.v >> 2) & 0x07)
    }

    fn pattern_addr(&self) -> u16 {
        let table = if (self.ctrl & CTRL_BG_TABLE) != 0 { 0x1000 } else { 0 };
        table + u16::from(self.next_tile) * 16 + ((self.v >> 12) & 0x07)
    }

    fn reload_shifters(&mut self) {
        self.bg_shift_lo = (self.bg_shift_lo & 0xFF00) | u16::from(self.next_pattern_lo);
        self.bg_shift_hi = (self.bg_shift_hi & 0xFF00) | u16::from(self.next_pattern_hi);
        self.attr_latch_lo = (self.next_attr & 0x01) != 0;
        self.attr_latch_hi = (self.next_attr & 0x02) != 0;
    }

    fn increment_coarse_x(&mut self) {
        if !self.rendering_enabled() {
            return;
        }
        if (self.v & 0x001F) == 31 {
            self.v ^= 0x041F;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if !self.rendering_enabled() {
            return;
        }
        if (self.v & 0x7000) != 0x7000 {
            self.v += 0x1000;
            return;
        }

        self.v &= !0x7000;
        let mut coarse_y = (self.v & 0x03E0) >> 5;
        match coarse_y {
            29 => {
                coarse_y = 0;
                self.v ^= 0x0800;
            }
            31 => coarse_y = 0,
            _ => coarse_y += 1,
        }
        self.v = (self.v & !0x03E0) | (coarse_y << 5);
    }

    fn copy_horizontal_bits(&mut self) {
        if self.rendering_enabled() {
            self.v = (self.v & !0x041F) | (self.t & 0x041F);
        }
    }

    fn copy_vertical_bits(&mut self) {
        if self.rendering_enabled() {
            self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
        }
    }

    fn increment_vram_addr(&mut self) {
        let step = if (self.ctrl & CTRL_VRAM_INC_32) != 0 { 32 } else { 1 };
        self.v = (self.v + step) & 0x7FFF;
    }

    // Secondary OAM for the next line: OAM Y holds the sprite's top minus one.
    fn evaluate_sprites(&mut self) {
        let height = self.sprite_height();
        let mut found = 0;
        for (id, entry) in self.oam.chunks_exact(4).enumerate() {
            let row = self.scanline - i16::from(entry[0]);
            if !(0..height).contains(&row) {
                continue;
            }
            if found == self.secondary_oam.len() {
                self.status |= STATUS_SPRITE_OVERFLOW;
                break;
            }
            self.secondary_oam[found] = SpriteSlot {
                id: id as u8,
                y: entry[0],
                tile: entry[1],
                attr: entry[2],
                x: entry[3],
                pattern_lo: 0,
                pattern_hi: 0,
            };
            found += 1;
        }
    }

    fn load_sprites(&mut self, cartridge: &Cartridge) {
        let height = self.sprite_height();
        for index in 0..self.sprites.len() {
            let mut slot = self.secondary_oam[index];
            let mut addr = if height == 16 {
                (u16::from(slot.tile & 0x01) * 0x1000) + u16::from(slot.tile & 0xFE) * 16
            } else {
                let table = if (self.ctrl & CTRL_SPRITE_TABLE) != 0 { 0x1000 } else { 0 };
                table + u16::from(slot.tile) * 16
            };

            let mut row = (self.scanline - i16::from(slot.y)).rem_euclid(height) as u16;
            if (slot.attr & ATTR_FLIP_V) != 0 {
                row ^= (height - 1) as u16;
            }
            // Rows 8-15 of a tall sprite come from the next tile.
            addr += row + (row & 0x08);

            slot.pattern_lo = self.read_memory(addr, cartridge);
            slot.pattern_hi = self.read_memory(addr + 8, cartridge);
            self.sprites[index] = slot;
        }
    }

    fn output_pixel(&mut self) {
        let x = i32::from(self.dot) - 2;
        if (0..POST_RENDER_SCANLINE).contains(&self.scanline) && (0..FRAME_WIDTH as i32).contains(&x) {
            let mut pixel = 0u8;
            if (self.mask & MASK_SHOW_BG) != 0 && (x >= 8 || (self.mask & MASK_SHOW_BG_LEFT) != 0) {
                let bit = 15 - u16::from(self.fine_x);
                pixel = ((((self.bg_shift_hi >> bit) & 0x01) << 1) | ((self.bg_shift_lo >> bit) & 0x01)) as u8;
                if pixel != 0 {
                    let bit = 7 - self.fine_x;
                    let group = (((self.attr_shift_hi >> bit) & 0x01) << 1) | ((self.attr_shift_lo >> bit) & 0x01);
                    pixel |= group << 2;
                }
            }

            let mut sprite_pixel = 0u8;
            let mut sprite_in_front = false;
            if (self.mask & MASK_SHOW_SPRITES) != 0 && (x >= 8 || (self.mask & MASK_SHOW_SPRITE_LEFT) != 0) {
                for slot in self.sprites.iter().rev() {
                    if slot.id == EMPTY_SLOT_ID {
                        continue;
                    }
                    let mut column = x - i32::from(slot.x);
                    if !(0..8).contains(&column) {
                        continue;
                    }
                    if (slot.attr & ATTR_FLIP_H) != 0 {
                        column ^= 7;
                    }
                    let bit = 7 - column;
                    let color = (((slot.pattern_hi >> bit) & 0x01) << 1) | ((slot.pattern_lo >> bit) & 0x01);
                    if color == 0 {
                        continue;
                    }
                    if slot.id == 0 && pixel != 0 && x != 255 {
                        self.status |= STATUS_SPRITE_ZERO_HIT;
                    }
                    sprite_pixel = 0x10 | ((slot.attr & ATTR_PALETTE) << 2) | color;
                    sprite_in_front = (slot.attr & ATTR_BEHIND_BG) == 0;
                }
            }

            if sprite_pixel != 0 && (pixel == 0 || sprite_in_front) {
                pixel = sprite_pixel;
            }
            let index = if self.rendering_enabled() { pixel } else { 0 };
            let color = self.read_palette(0x3F00 + u16::from(index));

            let offset = (self.scanline as usize * FRAME_WIDTH + x as usize) * 4;
            self.frame_buffer[offset..offset + 4].copy_from_slice(&palette::rgba(color));
        }

        self.bg_shift_lo <<= 1;
        self.bg_shift_hi <<= 1;
        self.attr_shift_lo = (self.attr_shift_lo << 1) | u8::from(self.attr_latch_lo);
        self.attr_shift_hi = (self.attr_shift_hi << 1) | u8::from(self.attr_latch_hi);
    }

    fn read_memory(&self, addr: u16, cartridge: &Cartridge) -> u8 {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => cartridge.chr_read(addr),
            0x2000..=0x3EFF => self.nametables[nametable_index(addr, cartridge.mirroring())],
            _ => self.read_palette(addr),
        }
    }

    fn write_memory(&mut self, addr: u16, value: u8, cartridge: &mut Cartridge) {
        let addr = addr & 0x3FFF;
        match addr {
            0x0000..=0x1FFF => cartridge.chr_write(addr, value),
            0x2000..=0x3EFF => self.nametables[nametable_index(addr, cartridge.mirroring())] = value,
            _ => self.palette_ram[palette_index(addr)] = value,
        }
    }

    fn read_palette(&self, addr: u16) -> u8 {
        let value = self.palette_ram[palette_index(addr)];
        if (self.mask & MASK_GREYSCALE) != 0 {
            value & 0x30
        } else {
            value
        }
    }
}

// $3F10/$3F14/$3F18/$3F1C alias the background entries.
fn palette_index(addr: u16) -> usize {
    let mut index = usize::from(addr & 0x1F);
    if (index & 0x13) == 0x10 {
        index &= !0x10;
    }
    index
}

fn nametable_index(addr: u16, mirroring: Mirroring) -> usize {
    let index = usize::from((addr - 0x2000) & 0x0FFF);
    let table = index / 0x400;
    let offset = index % 0x400;

    let physical = match mirroring {
        Mirroring::Horizontal => table / 2,
        Mirroring::Vertical => table & 1,
        Mirroring::SingleScreenA => 0,
        Mirroring::SingleScreenB => 1,
    };

    physical * 0x400 + offset
}
