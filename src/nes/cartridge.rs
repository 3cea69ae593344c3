use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::error::{CartridgeError, LoadError};
use super::mapper::{Mapper, Mirroring, create_mapper, mapper_name};

const HEADER_LEN: usize = 16;
const TRAINER_LEN: usize = 512;
const PRG_CHUNK: usize = 16 * 1024;
const CHR_CHUNK: usize = 8 * 1024;
const SAVE_EXTENSION: &str = "prgram";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvSystem {
    #[default]
    Ntsc,
    Pal,
}

impl TvSystem {
    pub fn frame_cycles(self) -> i64 {
        match self {
            TvSystem::Ntsc => 29_781,
            TvSystem::Pal => 33_248,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomFormat {
    INes,
    Nes2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomHeader {
    pub format: RomFormat,
    pub mapper_id: u8,
    pub mirroring: Mirroring,
    pub has_battery: bool,
    pub has_trainer: bool,
    pub tv_system: TvSystem,
    pub prg_rom_size: usize,
    pub chr_rom_size: usize,
    pub prg_ram_size: usize,
}

impl RomHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.get(0..4) != Some(b"NES\x1A".as_slice()) {
            return Err(CartridgeError::BadMagic {
                found: bytes.iter().take(4).copied().collect(),
            });
        }
        if bytes.len() < HEADER_LEN {
            return Err(CartridgeError::Truncated {
                section: "header",
                expected: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let flags6 = bytes[6];
        let flags7 = bytes[7];
        let format = if (flags7 & 0x0C) == 0x08 {
            RomFormat::Nes2
        } else {
            RomFormat::INes
        };

        let mapper_id = (flags7 & 0xF0) | (flags6 >> 4);
        let mirroring = if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let (prg_rom_size, chr_rom_size, prg_ram_size, tv_system) = match format {
            RomFormat::Nes2 => {
                let prg_rom_size = nes2_rom_size(bytes[4], bytes[9] & 0x0F, PRG_CHUNK);
                let chr_rom_size = nes2_rom_size(bytes[5], bytes[9] >> 4, CHR_CHUNK);
                let prg_ram_size = nes2_ram_size(bytes[10] & 0x0F) + nes2_ram_size(bytes[10] >> 4);
                let tv_system = if (bytes[12] & 0x03) == 0x01 {
                    TvSystem::Pal
                } else {
                    TvSystem::Ntsc
                };
                (prg_rom_size, chr_rom_size, prg_ram_size, tv_system)
            }
            RomFormat::INes => {
                let prg_ram_chunks = usize::from(bytes[8]).max(1);
                let tv_system = if (bytes[9] & 0x01) != 0 {
                    TvSystem::Pal
                } else {
                    TvSystem::Ntsc
                };
                (
                    usize::from(bytes[4]) * PRG_CHUNK,
                    usize::from(bytes[5]) * CHR_CHUNK,
                    prg_ram_chunks * 8 * 1024,
                    tv_system,
                )
            }
        };

        Ok(Self {
            format,
            mapper_id,
            mirroring,
            has_battery: (flags6 & 0x02) != 0,
            has_trainer: (flags6 & 0x04) != 0,
            tv_system,
            prg_rom_size,
            chr_rom_size,
            prg_ram_size,
        })
    }
}

fn nes2_rom_size(lsb: u8, msb_nibble: u8, chunk: usize) -> usize {
    if msb_nibble == 0x0F {
        // Exponent-multiplier form: 2^E * (MM * 2 + 1).
        let exponent = u32::from(lsb >> 2).min(usize::BITS - 4);
        let multiplier = usize::from(lsb & 0x03) * 2 + 1;
        (1usize << exponent) * multiplier
    } else {
        ((usize::from(msb_nibble) << 8) | usize::from(lsb)) * chunk
    }
}

fn nes2_ram_size(shift: u8) -> usize {
    if shift == 0 { 0 } else { 64usize << shift }
}

#[derive(Debug, Clone)]
pub struct RomImage {
    pub header: RomHeader,
    pub prg_rom: Vec<u8>,
    pub chr: Vec<u8>,
    pub chr_is_ram: bool,
    pub prg_ram: Vec<u8>,
}

impl RomImage {
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        let header = RomHeader::parse(bytes)?;

        let mut cursor = HEADER_LEN;
        if header.has_trainer {
            cursor += TRAINER_LEN;
        }

        let prg_rom = take_section(bytes, &mut cursor, header.prg_rom_size, "PRG")?;
        if prg_rom.is_empty() {
            return Err(CartridgeError::EmptyPrg);
        }

        let (chr, chr_is_ram) = if header.chr_rom_size == 0 {
            (vec![0; CHR_CHUNK], true)
        } else {
            (
                take_section(bytes, &mut cursor, header.chr_rom_size, "CHR")?,
                false,
            )
        };

        Ok(Self {
            header,
            prg_rom,
            chr,
            chr_is_ram,
            prg_ram: vec![0; header.prg_ram_size],
        })
    }
}

fn take_section(
    bytes: &[u8],
    cursor: &mut usize,
    len: usize,
    section: &'static str,
) -> Result<Vec<u8>, CartridgeError> {
    let available = bytes.len().saturating_sub(*cursor);
    if available < len {
        return Err(CartridgeError::Truncated {
            section,
            expected: len,
            available,
        });
    }
    let data = bytes[*cursor..*cursor + len].to_vec();
    *cursor += len;
    Ok(data)
}

#[derive(Default)]
pub struct Cartridge {
    mapper: Option<Box<dyn Mapper>>,
    save_path: Option<PathBuf>,
    save_dir: Option<PathBuf>,
}

impl Cartridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_save_dir(&mut self, dir: Option<PathBuf>) {
        self.save_dir = dir;
    }

    pub fn save_path_for(&self, rom_path: &Path) -> PathBuf {
        match &self.save_dir {
            Some(dir) => {
                let mut name = rom_path.file_stem().unwrap_or_default().to_os_string();
                name.push(".");
                name.push(SAVE_EXTENSION);
                dir.join(name)
            }
            None => rom_path.with_extension(SAVE_EXTENSION),
        }
    }

    pub fn load(&mut self, path: &Path) -> Result<(), LoadError> {
        let bytes = fs::read(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CartridgeError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CartridgeError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let save_path = self.save_path_for(path);
        self.load_bytes(&bytes, Some(save_path))
    }

    pub fn load_bytes(&mut self, bytes: &[u8], save_path: Option<PathBuf>) -> Result<(), LoadError> {
        let image = RomImage::parse(bytes)?;
        let header = image.header;
        let mut mapper = create_mapper(image)?;

        // The outgoing game may share this save file; flush it before reading.
        self.unload();

        if let Some(path) = save_path.as_deref() {
            restore_prg_ram(path, &mut mapper.rom_mut().prg_ram);
        }

        log::info!(
            "cartridge loaded: {} (mapper {}), {:?}, PRG {} KB, CHR {} KB{}, PRG-RAM {} KB, {:?}, {:?}",
            mapper_name(header.mapper_id),
            header.mapper_id,
            header.format,
            header.prg_rom_size / 1024,
            mapper.rom().chr.len() / 1024,
            if mapper.rom().chr_is_ram { " (RAM)" } else { "" },
            mapper.rom().prg_ram.len() / 1024,
            header.tv_system,
            header.mirroring,
        );

        self.mapper = Some(mapper);
        self.save_path = save_path;
        Ok(())
    }

    pub fn unload(&mut self) {
        self.persist_prg_ram();
        if self.mapper.take().is_some() {
            log::debug!("cartridge unloaded");
        }
        self.save_path = None;
    }

    pub fn persist_prg_ram(&self) {
        let (Some(mapper), Some(path)) = (self.mapper.as_ref(), self.save_path.as_ref()) else {
            return;
        };
        let rom = mapper.rom();
        if !rom.header.has_battery || rom.prg_ram.is_empty() {
            return;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = fs::create_dir_all(parent) {
                log::warn!("could not create save directory {}: {err}", parent.display());
                return;
            }
        }
        match fs::write(path, &rom.prg_ram) {
            Ok(()) => log::info!("saved {} bytes of PRG-RAM to {}", rom.prg_ram.len(), path.display()),
            Err(err) => log::warn!("could not write save file {}: {err}", path.display()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.mapper.is_some()
    }

    pub fn mapper(&self) -> Option<&dyn Mapper> {
        self.mapper.as_deref()
    }

    pub fn header(&self) -> Option<&RomHeader> {
        self.mapper.as_ref().map(|m| &m.rom().header)
    }

    pub fn tv_system(&self) -> TvSystem {
        self.header().map(|h| h.tv_system).unwrap_or_default()
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    pub fn prg_read(&self, addr: u16) -> u8 {
        self.mapper.as_ref().map_or(0, |m| m.prg_read(addr))
    }

    pub fn prg_write(&mut self, addr: u16, value: u8) {
        if let Some(mapper) = self.mapper.as_mut() {
            mapper.prg_write(addr, value);
        }
    }

    pub fn chr_read(&self, addr: u16) -> u8 {
        self.mapper.as_ref().map_or(0, |m| m.chr_read(addr))
    }

    pub fn chr_write(&mut self, addr: u16, value: u8) {
        if let Some(mapper) = self.mapper.as_mut() {
            mapper.chr_write(addr, value);
        }
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mapper
            .as_ref()
            .map_or(Mirroring::Horizontal, |m| m.mirroring())
    }
}

impl Drop for Cartridge {
    fn drop(&mut self) {
        self.persist_prg_ram();
    }
}

fn restore_prg_ram(path: &Path, prg_ram: &mut [u8]) {
    match fs::read(path) {
        Ok(data) => {
            let len = data.len().min(prg_ram.len());
            prg_ram[..len].copy_from_slice(&data[..len]);
            log::info!("restored {len} bytes of PRG-RAM from {}", path.display());
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("could not read save file {}: {err}", path.display()),
    }
}
