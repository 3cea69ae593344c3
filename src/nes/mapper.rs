use super::cartridge::RomImage;
use super::error::MapperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    SingleScreenA,
    SingleScreenB,
}

// CPU addresses arrive in 0x4020-0xFFFF, PPU addresses in 0x0000-0x1FFF.
pub trait Mapper {
    fn prg_read(&self, addr: u16) -> u8;
    fn prg_write(&mut self, addr: u16, value: u8);
    fn chr_read(&self, addr: u16) -> u8;
    fn chr_write(&mut self, addr: u16, value: u8);
    fn mirroring(&self) -> Mirroring;
    fn rom(&self) -> &RomImage;
    fn rom_mut(&mut self) -> &mut RomImage;
    fn debug_state(&self) -> String {
        String::new()
    }
}

pub fn mapper_name(mapper_id: u8) -> &'static str {
    match mapper_id {
        0 => "NROM",
        1 => "MMC1",
        2 => "UxROM",
        3 => "CNROM",
        7 => "AxROM",
        _ => "Unsupported",
    }
}

pub fn create_mapper(rom: RomImage) -> Result<Box<dyn Mapper>, MapperError> {
    let mapper: Box<dyn Mapper> = match rom.header.mapper_id {
        0 => Box::new(Nrom::new(rom)),
        1 => Box::new(Mmc1::new(rom)),
        2 => Box::new(Uxrom::new(rom)),
        3 => Box::new(Cnrom::new(rom)),
        7 => Box::new(Axrom::new(rom)),
        id => return Err(MapperError::Unsupported(id)),
    };
    Ok(mapper)
}

// No wrapping: a bank past the end of the image reaches checked_read/checked_write and aborts.
fn banked(bank: usize, bank_size: usize, offset: usize) -> usize {
    bank * bank_size + offset
}

fn checked_read(data: &[u8], index: usize, mapper: &str, region: &str) -> u8 {
    match data.get(index) {
        Some(value) => *value,
        None => panic!(
            "{mapper}: {region} offset ${index:X} outside ${:X}-byte array (header/ROM size mismatch)",
            data.len()
        ),
    }
}

fn checked_write(data: &mut [u8], index: usize, value: u8, mapper: &str, region: &str) {
    let len = data.len();
    match data.get_mut(index) {
        Some(slot) => *slot = value,
        None => panic!(
            "{mapper}: {region} offset ${index:X} outside ${len:X}-byte array (header/ROM size mismatch)"
        ),
    }
}

pub struct Nrom {
    rom: RomImage,
    prg_mask: usize,
    ram_mask: usize,
}

impl Nrom {
    pub fn new(rom: RomImage) -> Self {
        let prg_mask = if rom.prg_rom.len() > 0x4000 { 0x7FFF } else { 0x3FFF };
        let ram_len = rom.prg_ram.len();
        let ram_mask = if ram_len == 0x1000 || ram_len > 0x2000 {
            0x0FFF
        } else {
            0x07FF
        };
        Self {
            rom,
            prg_mask,
            ram_mask,
        }
    }
}

impl Mapper for Nrom {
    fn prg_read(&self, addr: u16) -> u8 {
        fixed_prg_read(&self.rom, addr, self.prg_mask, self.ram_mask, "NROM")
    }

    fn prg_write(&mut self, addr: u16, value: u8) {
        fixed_prg_ram_write(&mut self.rom, addr, value, self.ram_mask, "NROM");
    }

    fn chr_read(&self, addr: u16) -> u8 {
        checked_read(&self.rom.chr, usize::from(addr & 0x1FFF), "NROM", "CHR")
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        if self.rom.chr_is_ram {
            checked_write(&mut self.rom.chr, usize::from(addr & 0x1FFF), value, "NROM", "CHR");
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.rom.header.mirroring
    }

    fn rom(&self) -> &RomImage {
        &self.rom
    }

    fn rom_mut(&mut self) -> &mut RomImage {
        &mut self.rom
    }
}

fn fixed_prg_read(rom: &RomImage, addr: u16, prg_mask: usize, ram_mask: usize, name: &str) -> u8 {
    match addr {
        0x6000..=0x7FFF if !rom.prg_ram.is_empty() => checked_read(
            &rom.prg_ram,
            usize::from(addr - 0x6000) & ram_mask,
            name,
            "PRG-RAM",
        ),
        0x8000..=0xFFFF => checked_read(
            &rom.prg_rom,
            usize::from(addr - 0x8000) & prg_mask,
            name,
            "PRG",
        ),
        _ => 0,
    }
}

fn fixed_prg_ram_write(rom: &mut RomImage, addr: u16, value: u8, ram_mask: usize, name: &str) {
    if (0x6000..=0x7FFF).contains(&addr) && !rom.prg_ram.is_empty() {
        checked_write(
            &mut rom.prg_ram,
            usize::from(addr - 0x6000) & ram_mask,
            value,
            name,
            "PRG-RAM",
        );
    }
}

pub struct Uxrom {
    rom: RomImage,
    bank: usize,
}

impl Uxrom {
    pub fn new(rom: RomImage) -> Self {
        Self { rom, bank: 0 }
    }

    fn last_bank(&self) -> usize {
        (self.rom.prg_rom.len() / 0x4000).max(1) - 1
    }
}

impl Mapper for Uxrom {
    fn prg_read(&self, addr: u16) -> u8 {
        let bank = match addr {
            0x8000..=0xBFFF => self.bank,
            0xC000..=0xFFFF => self.last_bank(),
            _ => return 0,
        };
        let index = banked(bank, 0x4000, usize::from(addr & 0x3FFF));
        checked_read(&self.rom.prg_rom, index, "UxROM", "PRG")
    }

    fn prg_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.bank = usize::from(value & 0x0F);
        }
    }

    fn chr_read(&self, addr: u16) -> u8 {
        checked_read(&self.rom.chr, usize::from(addr & 0x1FFF), "UxROM", "CHR")
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        if self.rom.chr_is_ram {
            checked_write(&mut self.rom.chr, usize::from(addr & 0x1FFF), value, "UxROM", "CHR");
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.rom.header.mirroring
    }

    fn rom(&self) -> &RomImage {
        &self.rom
    }

    fn rom_mut(&mut self) -> &mut RomImage {
        &mut self.rom
    }

    fn debug_state(&self) -> String {
        format!("UxROM prg_bank={} fixed={}", self.bank, self.last_bank())
    }
}

pub struct Cnrom {
    rom: RomImage,
    prg_mask: usize,
    chr_bank: usize,
}

impl Cnrom {
    pub fn new(rom: RomImage) -> Self {
        let prg_mask = if rom.prg_rom.len() > 0x4000 { 0x7FFF } else { 0x3FFF };
        Self {
            rom,
            prg_mask,
            chr_bank: 0,
        }
    }

    fn chr_index(&self, addr: u16) -> usize {
        banked(self.chr_bank, 0x2000, usize::from(addr & 0x1FFF))
    }
}

impl Mapper for Cnrom {
    fn prg_read(&self, addr: u16) -> u8 {
        fixed_prg_read(&self.rom, addr, self.prg_mask, 0x07FF, "CNROM")
    }

    fn prg_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.chr_bank = usize::from(value & 0x03);
        } else {
            fixed_prg_ram_write(&mut self.rom, addr, value, 0x07FF, "CNROM");
        }
    }

    fn chr_read(&self, addr: u16) -> u8 {
        checked_read(&self.rom.chr, self.chr_index(addr), "CNROM", "CHR")
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        if self.rom.chr_is_ram {
            let index = self.chr_index(addr);
            checked_write(&mut self.rom.chr, index, value, "CNROM", "CHR");
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.rom.header.mirroring
    }

    fn rom(&self) -> &RomImage {
        &self.rom
    }

    fn rom_mut(&mut self) -> &mut RomImage {
        &mut self.rom
    }

    fn debug_state(&self) -> String {
        format!("CNROM chr_bank={}", self.chr_bank)
    }
}

pub struct Axrom {
    rom: RomImage,
    bank: usize,
    mirroring: Mirroring,
}

impl Axrom {
    pub fn new(rom: RomImage) -> Self {
        Self {
            rom,
            bank: 0,
            mirroring: Mirroring::SingleScreenA,
        }
    }
}

impl Mapper for Axrom {
    fn prg_read(&self, addr: u16) -> u8 {
        if addr < 0x8000 {
            return 0;
        }
        let index = banked(self.bank, 0x8000, usize::from(addr & 0x7FFF));
        checked_read(&self.rom.prg_rom, index, "AxROM", "PRG")
    }

    fn prg_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.bank = usize::from(value & 0x07);
            self.mirroring = if (value & 0x10) != 0 {
                Mirroring::SingleScreenB
            } else {
                Mirroring::SingleScreenA
            };
        }
    }

    fn chr_read(&self, addr: u16) -> u8 {
        checked_read(&self.rom.chr, usize::from(addr & 0x1FFF), "AxROM", "CHR")
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        if self.rom.chr_is_ram {
            checked_write(&mut self.rom.chr, usize::from(addr & 0x1FFF), value, "AxROM", "CHR");
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn rom(&self) -> &RomImage {
        &self.rom
    }

    fn rom_mut(&mut self) -> &mut RomImage {
        &mut self.rom
    }

    fn debug_state(&self) -> String {
        format!("AxROM prg_bank={} mirroring={:?}", self.bank, self.mirroring)
    }
}

const MMC1_SHIFT_RESET: u8 = 0x10;

pub struct Mmc1 {
    rom: RomImage,
    shift_register: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
    // 16 KB PRG windows at $8000/$C000, 4 KB CHR windows at $0000/$1000.
    prg_windows: [usize; 2],
    chr_windows: [usize; 2],
}

impl Mmc1 {
    pub fn new(mut rom: RomImage) -> Self {
        if rom.prg_ram.len() < 0x2000 {
            rom.prg_ram.resize(0x2000, 0);
        }
        let mut mapper = Self {
            rom,
            shift_register: MMC1_SHIFT_RESET,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
            prg_windows: [0; 2],
            chr_windows: [0; 2],
        };
        mapper.update_windows();
        mapper
    }

    fn prg_bank_count(&self) -> usize {
        (self.rom.prg_rom.len() / 0x4000).max(1)
    }

    fn write_shift_register(&mut self, addr: u16, value: u8) {
        if (value & 0x80) != 0 {
            self.shift_register = MMC1_SHIFT_RESET;
            self.control |= 0x0C;
            self.update_windows();
            return;
        }

        // The marker bit reaches bit 0 after four writes; the fifth completes the value.
        let commit = (self.shift_register & 0x01) != 0;
        self.shift_register = (self.shift_register >> 1) | ((value & 0x01) << 4);

        if commit {
            let data = self.shift_register;
            match addr {
                0x8000..=0x9FFF => self.control = data,
                0xA000..=0xBFFF => self.chr_bank0 = data,
                0xC000..=0xDFFF => self.chr_bank1 = data,
                _ => self.prg_bank = data,
            }
            self.shift_register = MMC1_SHIFT_RESET;
            self.update_windows();
        }
    }

    fn update_windows(&mut self) {
        let bank = usize::from(self.prg_bank & 0x0F);
        let last = self.prg_bank_count() - 1;
        self.prg_windows = match (self.control >> 2) & 0x03 {
            0 | 1 => [bank & 0x0E, (bank & 0x0E) | 0x01],
            2 => [0, bank],
            _ => [bank, last],
        };

        self.chr_windows = if (self.control & 0x10) == 0 {
            let bank = usize::from(self.chr_bank0 & 0x1E);
            [bank, bank | 0x01]
        } else {
            [usize::from(self.chr_bank0), usize::from(self.chr_bank1)]
        };
    }

    fn chr_index(&self, addr: u16) -> usize {
        let window = self.chr_windows[usize::from((addr >> 12) & 0x01)];
        banked(window, 0x1000, usize::from(addr & 0x0FFF))
    }

    #[cfg(test)]
    fn registers(&self) -> (u8, u8, u8, u8, u8) {
        (
            self.shift_register,
            self.control,
            self.chr_bank0,
            self.chr_bank1,
            self.prg_bank,
        )
    }
}

impl Mapper for Mmc1 {
    fn prg_read(&self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => checked_read(
                &self.rom.prg_ram,
                usize::from(addr - 0x6000),
                "MMC1",
                "PRG-RAM",
            ),
            0x8000..=0xFFFF => {
                let window = self.prg_windows[usize::from((addr >> 14) & 0x01)];
                let index = banked(window, 0x4000, usize::from(addr & 0x3FFF));
                checked_read(&self.rom.prg_rom, index, "MMC1", "PRG")
            }
            _ => 0,
        }
    }

    fn prg_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x6000..=0x7FFF => checked_write(
                &mut self.rom.prg_ram,
                usize::from(addr - 0x6000),
                value,
                "MMC1",
                "PRG-RAM",
            ),
            0x8000..=0xFFFF => self.write_shift_register(addr, value),
            _ => {}
        }
    }

    fn chr_read(&self, addr: u16) -> u8 {
        checked_read(&self.rom.chr, self.chr_index(addr), "MMC1", "CHR")
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        if self.rom.chr_is_ram {
            let index = self.chr_index(addr);
            checked_write(&mut self.rom.chr, index, value, "MMC1", "CHR");
        }
    }

    fn mirroring(&self) -> Mirroring {
        match self.control & 0x03 {
            0 => Mirroring::SingleScreenA,
            1 => Mirroring::SingleScreenB,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn rom(&self) -> &RomImage {
        &self.rom
    }

    fn rom_mut(&mut self) -> &mut RomImage {
        &mut self.rom
    }

    fn debug_state(&self) -> String {
        format!(
            "MMC1 control=${:02X} prg=${:02X} chr0=${:02X} chr1=${:02X} shift=${:02X} prg_windows={:?} chr_windows={:?}",
            self.control,
            self.prg_bank,
            self.chr_bank0,
            self.chr_bank1,
            self.shift_register,
            self.prg_windows,
            self.chr_windows
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::test_rom::{make_rom, patterned_banks};

    fn serial_write(mapper: &mut Mmc1, addr: u16, value: u8) {
        for bit in 0..5 {
            mapper.prg_write(addr, (value >> bit) & 0x01);
        }
    }

    #[test]
    fn unsupported_mapper_is_reported_by_id() {
        let rom = make_rom(4, patterned_banks(0x8000, 0x4000), Vec::new());
        match create_mapper(rom) {
            Err(MapperError::Unsupported(4)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("mapper 4 should be rejected"),
        }
    }

    #[test]
    fn nrom_mirrors_16k_prg_and_small_ram() {
        let mut mapper = Nrom::new(make_rom(0, patterned_banks(0x4000, 0x4000), Vec::new()));
        assert_eq!(mapper.prg_read(0x8000), 1);
        assert_eq!(mapper.prg_read(0xC000), 1);

        mapper.prg_write(0x6001, 0x5A);
        assert_eq!(mapper.prg_read(0x6801), 0x5A);
        assert_eq!(mapper.prg_read(0x7801), 0x5A);

        mapper.prg_write(0x8000, 0xFF);
        assert_eq!(mapper.prg_read(0x8000), 1);
    }

    #[test]
    fn nrom_32k_maps_both_halves() {
        let mapper = Nrom::new(make_rom(0, patterned_banks(0x8000, 0x4000), Vec::new()));
        assert_eq!(mapper.prg_read(0x8000), 1);
        assert_eq!(mapper.prg_read(0xFFFF), 2);
    }

    #[test]
    fn chr_rom_ignores_writes_and_chr_ram_accepts_them() {
        let mut rom_backed = Nrom::new(make_rom(0, patterned_banks(0x4000, 0x4000), vec![7; 0x2000]));
        rom_backed.chr_write(0x0010, 0x99);
        assert_eq!(rom_backed.chr_read(0x0010), 7);

        let mut ram_backed = Nrom::new(make_rom(0, patterned_banks(0x4000, 0x4000), Vec::new()));
        ram_backed.chr_write(0x0010, 0x99);
        assert_eq!(ram_backed.chr_read(0x0010), 0x99);
    }

    #[test]
    fn uxrom_keeps_last_bank_fixed() {
        let mut mapper = Uxrom::new(make_rom(2, patterned_banks(4 * 0x4000, 0x4000), Vec::new()));
        assert_eq!(mapper.prg_read(0x8000), 1);
        assert_eq!(mapper.prg_read(0xC000), 4);

        mapper.prg_write(0x8000, 2);
        assert_eq!(mapper.prg_read(0x8000), 3);
        assert_eq!(mapper.prg_read(0xFFFF), 4);

    }

    #[test]
    #[should_panic(expected = "UxROM: PRG offset")]
    fn uxrom_bank_past_rom_end_is_fatal() {
        let mut mapper = Uxrom::new(make_rom(2, patterned_banks(2 * 0x4000, 0x4000), Vec::new()));
        mapper.prg_write(0x8000, 0x05);
        mapper.prg_read(0x8000);
    }

    #[test]
    #[should_panic(expected = "CNROM: CHR offset")]
    fn cnrom_bank_past_chr_end_is_fatal() {
        let mut mapper = Cnrom::new(make_rom(3, patterned_banks(0x8000, 0x4000), vec![0; 0x4000]));
        mapper.prg_write(0x8000, 0x03);
        mapper.chr_read(0x0000);
    }

    #[test]
    fn cnrom_switches_chr_bank() {
        let mut mapper = Cnrom::new(make_rom(
            3,
            patterned_banks(0x8000, 0x4000),
            patterned_banks(4 * 0x2000, 0x2000),
        ));
        assert_eq!(mapper.chr_read(0x0000), 1);
        mapper.prg_write(0x8000, 0xFE);
        assert_eq!(mapper.chr_read(0x1FFF), 3);
        assert_eq!(mapper.prg_read(0xC000), 2);
    }

    #[test]
    fn axrom_switches_32k_and_single_screen() {
        let mut mapper = Axrom::new(make_rom(7, patterned_banks(4 * 0x8000, 0x8000), Vec::new()));
        assert_eq!(mapper.mirroring(), Mirroring::SingleScreenA);

        mapper.prg_write(0x8000, 0x12);
        assert_eq!(mapper.prg_read(0x8000), 3);
        assert_eq!(mapper.prg_read(0xFFFF), 3);
        assert_eq!(mapper.mirroring(), Mirroring::SingleScreenB);

        mapper.prg_write(0x8000, 0x01);
        assert_eq!(mapper.mirroring(), Mirroring::SingleScreenA);
    }

    #[test]
    fn mmc1_five_writes_latch_control() {
        let mut mapper = Mmc1::new(make_rom(1, patterned_banks(8 * 0x4000, 0x4000), Vec::new()));
        for bit in [1, 0, 1, 0, 1] {
            mapper.prg_write(0x8000, bit);
        }
        let (shift, control, ..) = mapper.registers();
        assert_eq!(control, 0b10101);
        assert_eq!(shift, MMC1_SHIFT_RESET);
        assert_eq!(mapper.mirroring(), Mirroring::SingleScreenB);
    }

    #[test]
    fn mmc1_reset_write_discards_partial_value() {
        let mut mapper = Mmc1::new(make_rom(1, patterned_banks(8 * 0x4000, 0x4000), Vec::new()));
        serial_write(&mut mapper, 0x8000, 0x00);
        assert_eq!(mapper.registers().1, 0x00);

        mapper.prg_write(0xE000, 1);
        mapper.prg_write(0xE000, 1);
        mapper.prg_write(0xE000, 1);
        mapper.prg_write(0xE000, 0x80);

        let (shift, control, _, _, prg) = mapper.registers();
        assert_eq!(shift, MMC1_SHIFT_RESET);
        assert_eq!(control & 0x0C, 0x0C);
        assert_eq!(prg, 0);
        assert_eq!(mapper.prg_read(0xC000), 8);
    }

    #[test]
    fn mmc1_prg_modes() {
        let mut mapper = Mmc1::new(make_rom(1, patterned_banks(8 * 0x4000, 0x4000), Vec::new()));

        // Mode 3: switchable low, fixed last.
        serial_write(&mut mapper, 0xE000, 0x02);
        assert_eq!(mapper.prg_read(0x8000), 3);
        assert_eq!(mapper.prg_read(0xC000), 8);

        // Mode 2: fixed first, switchable high.
        serial_write(&mut mapper, 0x8000, 0x08);
        assert_eq!(mapper.prg_read(0x8000), 1);
        assert_eq!(mapper.prg_read(0xC000), 3);

        // Mode 0: 32 KB, low bit ignored.
        serial_write(&mut mapper, 0x8000, 0x00);
        serial_write(&mut mapper, 0xE000, 0x05);
        assert_eq!(mapper.prg_read(0x8000), 5);
        assert_eq!(mapper.prg_read(0xC000), 6);
    }

    #[test]
    fn mmc1_chr_modes() {
        let mut mapper = Mmc1::new(make_rom(
            1,
            patterned_banks(2 * 0x4000, 0x4000),
            patterned_banks(8 * 0x1000, 0x1000),
        ));

        serial_write(&mut mapper, 0xA000, 0x03);
        assert_eq!(mapper.chr_read(0x0000), 3);
        assert_eq!(mapper.chr_read(0x1000), 4);

        serial_write(&mut mapper, 0x8000, 0x1C);
        serial_write(&mut mapper, 0xC000, 0x06);
        assert_eq!(mapper.chr_read(0x0000), 4);
        assert_eq!(mapper.chr_read(0x1000), 7);
    }

    #[test]
    fn mmc1_prg_ram_is_mapped_at_6000() {
        let mut mapper = Mmc1::new(make_rom(1, patterned_banks(2 * 0x4000, 0x4000), Vec::new()));
        mapper.prg_write(0x7ABC, 0x33);
        assert_eq!(mapper.prg_read(0x7ABC), 0x33);
        assert_eq!(mapper.rom().prg_ram[0x1ABC], 0x33);
    }

    #[test]
    #[should_panic(expected = "CHR offset")]
    fn out_of_range_offset_is_fatal() {
        let mut rom = make_rom(0, patterned_banks(0x4000, 0x4000), Vec::new());
        rom.chr.truncate(0x1000);
        let mapper = Nrom::new(rom);
        mapper.chr_read(0x1800);
    }
}
