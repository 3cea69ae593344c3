// A golden line looks like
// `C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7`;
// only the register, PPU and cycle columns are compared.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub scanline: i16,
    pub dot: u16,
    pub cycles: u64,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} PPU:{:3},{:3} CYC:{}",
            self.pc, self.a, self.x, self.y, self.p, self.sp, self.scanline, self.dot, self.cycles
        )
    }
}

impl TraceRecord {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let pc = u16::from_str_radix(line.get(0..4)?, 16).ok()?;
        let registers = line.get(line.find("A:")?..)?;

        let ppu = registers.get(registers.find("PPU:")? + 4..)?;
        let mut position = ppu.split([',', ' ']).filter(|s| !s.is_empty());
        let scanline = position.next()?.parse().ok()?;
        let dot = position.next()?.parse().ok()?;

        let cycles = registers.get(registers.find("CYC:")? + 4..)?;
        let cycles = cycles.split_whitespace().next()?.parse().ok()?;

        Some(Self {
            pc,
            a: hex_field(registers, "A:")?,
            x: hex_field(registers, "X:")?,
            y: hex_field(registers, "Y:")?,
            p: hex_field(registers, "P:")?,
            sp: hex_field(registers, "SP:")?,
            scanline,
            dot,
            cycles,
        })
    }

    pub fn diff(&self, expected: &TraceRecord, compare_ppu: bool) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let checks = [
            ("PC", self.pc == expected.pc),
            ("A", self.a == expected.a),
            ("X", self.x == expected.x),
            ("Y", self.y == expected.y),
            ("P", self.p == expected.p),
            ("SP", self.sp == expected.sp),
            ("CYC", self.cycles == expected.cycles),
        ];
        for (name, same) in checks {
            if !same {
                fields.push(name);
            }
        }
        if compare_ppu && (self.scanline, self.dot) != (expected.scanline, expected.dot) {
            fields.push("PPU");
        }
        fields
    }
}

fn hex_field(text: &str, prefix: &str) -> Option<u8> {
    // "P:" also matches inside "SP:", so insist on a word boundary.
    let mut search = 0;
    loop {
        let at = search + text.get(search..)?.find(prefix)?;
        let boundary = at == 0 || text.as_bytes()[at - 1] == b' ';
        if boundary {
            let start = at + prefix.len();
            return u8::from_str_radix(text.get(start..start + 2)?, 16).ok();
        }
        search = at + prefix.len();
    }
}
