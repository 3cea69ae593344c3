use super::cartridge::{Cartridge, RomImage};

pub(crate) const RESET_ENTRY: u16 = 0x8000;
pub(crate) const NMI_ENTRY: u16 = 0x9000;
pub(crate) const IRQ_ENTRY: u16 = 0xA000;

pub(crate) fn patterned_banks(total_size: usize, bank_size: usize) -> Vec<u8> {
    let mut data = vec![0u8; total_size];
    for (bank, chunk) in data.chunks_mut(bank_size).enumerate() {
        chunk.fill((bank as u8).wrapping_add(1));
    }
    data
}

// iNES file bytes. `prg`/`chr` lengths must be multiples of 16 KB / 8 KB.
pub(crate) fn ines_image(mapper_id: u8, prg: &[u8], chr: &[u8], flags6: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; 16];
    bytes[0..4].copy_from_slice(b"NES\x1A");
    bytes[4] = (prg.len() / 0x4000) as u8;
    bytes[5] = (chr.len() / 0x2000) as u8;
    bytes[6] = flags6 | ((mapper_id & 0x0F) << 4);
    bytes[7] = mapper_id & 0xF0;
    bytes.extend_from_slice(prg);
    bytes.extend_from_slice(chr);
    bytes
}

pub(crate) fn make_rom(mapper_id: u8, prg: Vec<u8>, chr: Vec<u8>) -> RomImage {
    RomImage::parse(&ines_image(mapper_id, &prg, &chr, 0)).expect("synthetic ROM parses")
}

// 32 KB NROM PRG filled with NOPs, `program` placed at $8000, and the vectors
// pointing at `RESET_ENTRY`, `NMI_ENTRY` and `IRQ_ENTRY`.
pub(crate) fn program_prg(program: &[u8]) -> Vec<u8> {
    let mut prg = vec![0xEA; 0x8000];
    prg[..program.len()].copy_from_slice(program);
    let vectors: [(u16, u16); 3] = [(0xFFFA, NMI_ENTRY), (0xFFFC, RESET_ENTRY), (0xFFFE, IRQ_ENTRY)];
    for (vector, target) in vectors {
        let offset = usize::from(vector - 0x8000);
        prg[offset] = target as u8;
        prg[offset + 1] = (target >> 8) as u8;
    }
    prg
}

pub(crate) fn program_image(program: &[u8]) -> Vec<u8> {
    ines_image(0, &program_prg(program), &[], 0)
}

pub(crate) fn program_cartridge(program: &[u8]) -> Cartridge {
    let mut cart = Cartridge::new();
    cart.load_bytes(&program_image(program), None)
        .expect("synthetic program loads");
    cart
}
