#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Adc => "ADC",
            Op::And => "AND",
            Op::Asl => "ASL",
            Op::Bcc => "BCC",
            Op::Bcs => "BCS",
            Op::Beq => "BEQ",
            Op::Bit => "BIT",
            Op::Bmi => "BMI",
            Op::Bne => "BNE",
            Op::Bpl => "BPL",
            Op::Brk => "BRK",
            Op::Bvc => "BVC",
            Op::Bvs => "BVS",
            Op::Clc => "CLC",
            Op::Cld => "CLD",
            Op::Cli => "CLI",
            Op::Clv => "CLV",
            Op::Cmp => "CMP",
            Op::Cpx => "CPX",
            Op::Cpy => "CPY",
            Op::Dec => "DEC",
            Op::Dex => "DEX",
            Op::Dey => "DEY",
            Op::Eor => "EOR",
            Op::Inc => "INC",
            Op::Inx => "INX",
            Op::Iny => "INY",
            Op::Jmp => "JMP",
            Op::Jsr => "JSR",
            Op::Lda => "LDA",
            Op::Ldx => "LDX",
            Op::Ldy => "LDY",
            Op::Lsr => "LSR",
            Op::Nop => "NOP",
            Op::Ora => "ORA",
            Op::Pha => "PHA",
            Op::Php => "PHP",
            Op::Pla => "PLA",
            Op::Plp => "PLP",
            Op::Rol => "ROL",
            Op::Ror => "ROR",
            Op::Rti => "RTI",
            Op::Rts => "RTS",
            Op::Sbc => "SBC",
            Op::Sec => "SEC",
            Op::Sed => "SED",
            Op::Sei => "SEI",
            Op::Sta => "STA",
            Op::Stx => "STX",
            Op::Sty => "STY",
            Op::Tax => "TAX",
            Op::Tay => "TAY",
            Op::Tsx => "TSX",
            Op::Txa => "TXA",
            Op::Txs => "TXS",
            Op::Tya => "TYA",
        }
    }

    // Stores and read-modify-write ops pay the index cycle even without a page cross.
    pub fn always_pays_index_cycle(self) -> bool {
        matches!(
            self,
            Op::Sta | Op::Stx | Op::Sty | Op::Asl | Op::Lsr | Op::Rol | Op::Ror | Op::Inc | Op::Dec
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirect,
    IndirectIndexed,
    Relative,
}

impl AddrMode {
    pub fn operand_len(self) -> u16 {
        match self {
            AddrMode::Implied | AddrMode::Accumulator => 0,
            AddrMode::Absolute | AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::Indirect => 2,
            _ => 1,
        }
    }
}

pub fn decode(opcode: u8) -> (Op, AddrMode) {
    use AddrMode::*;

    match opcode {
        0x69 => (Op::Adc, Immediate),
        0x65 => (Op::Adc, ZeroPage),
        0x75 => (Op::Adc, ZeroPageX),
        0x6D => (Op::Adc, Absolute),
        0x7D => (Op::Adc, AbsoluteX),
        0x79 => (Op::Adc, AbsoluteY),
        0x61 => (Op::Adc, IndexedIndirect),
        0x71 => (Op::Adc, IndirectIndexed),

        0x29 => (Op::And, Immediate),
        0x25 => (Op::And, ZeroPage),
        0x35 => (Op::And, ZeroPageX),
        0x2D => (Op::And, Absolute),
        0x3D => (Op::And, AbsoluteX),
        0x39 => (Op::And, AbsoluteY),
        0x21 => (Op::And, IndexedIndirect),
        0x31 => (Op::And, IndirectIndexed),

        0x0A => (Op::Asl, Accumulator),
        0x06 => (Op::Asl, ZeroPage),
        0x16 => (Op::Asl, ZeroPageX),
        0x0E => (Op::Asl, Absolute),
        0x1E => (Op::Asl, AbsoluteX),

        0x90 => (Op::Bcc, Relative),
        0xB0 => (Op::Bcs, Relative),
        0xF0 => (Op::Beq, Relative),
        0x30 => (Op::Bmi, Relative),
        0xD0 => (Op::Bne, Relative),
        0x10 => (Op::Bpl, Relative),
        0x50 => (Op::Bvc, Relative),
        0x70 => (Op::Bvs, Relative),

        0x24 => (Op::Bit, ZeroPage),
        0x2C => (Op::Bit, Absolute),

        0x00 => (Op::Brk, Implied),

        0x18 => (Op::Clc, Implied),
        0xD8 => (Op::Cld, Implied),
        0x58 => (Op::Cli, Implied),
        0xB8 => (Op::Clv, Implied),

        0xC9 => (Op::Cmp, Immediate),
        0xC5 => (Op::Cmp, ZeroPage),
        0xD5 => (Op::Cmp, ZeroPageX),
        0xCD => (Op::Cmp, Absolute),
        0xDD => (Op::Cmp, AbsoluteX),
        0xD9 => (Op::Cmp, AbsoluteY),
        0xC1 => (Op::Cmp, IndexedIndirect),
        0xD1 => (Op::Cmp, IndirectIndexed),

        0xE0 => (Op::Cpx, Immediate),
        0xE4 => (Op::Cpx, ZeroPage),
        0xEC => (Op::Cpx, Absolute),

        0xC0 => (Op::Cpy, Immediate),
        0xC4 => (Op::Cpy, ZeroPage),
        0xCC => (Op::Cpy, Absolute),

        0xC6 => (Op::Dec, ZeroPage),
        0xD6 => (Op::Dec, ZeroPageX),
        0xCE => (Op::Dec, Absolute),
        0xDE => (Op::Dec, AbsoluteX),

        0xCA => (Op::Dex, Implied),
        0x88 => (Op::Dey, Implied),

        0x49 => (Op::Eor, Immediate),
        0x45 => (Op::Eor, ZeroPage),
        0x55 => (Op::Eor, ZeroPageX),
        0x4D => (Op::Eor, Absolute),
        0x5D => (Op::Eor, AbsoluteX),
        0x59 => (Op::Eor, AbsoluteY),
        0x41 => (Op::Eor, IndexedIndirect),
        0x51 => (Op::Eor, IndirectIndexed),

        0xE6 => (Op::Inc, ZeroPage),
        0xF6 => (Op::Inc, ZeroPageX),
        0xEE => (Op::Inc, Absolute),
        0xFE => (Op::Inc, AbsoluteX),

        0xE8 => (Op::Inx, Implied),
        0xC8 => (Op::Iny, Implied),

        0x4C => (Op::Jmp, Absolute),
        0x6C => (Op::Jmp, Indirect),
        0x20 => (Op::Jsr, Absolute),

        0xA9 => (Op::Lda, Immediate),
        0xA5 => (Op::Lda, ZeroPage),
        0xB5 => (Op::Lda, ZeroPageX),
        0xAD => (Op::Lda, Absolute),
        0xBD => (Op::Lda, AbsoluteX),
        0xB9 => (Op::Lda, AbsoluteY),
        0xA1 => (Op::Lda, IndexedIndirect),
        0xB1 => (Op::Lda, IndirectIndexed),

        0xA2 => (Op::Ldx, Immediate),
        0xA6 => (Op::Ldx, ZeroPage),
        0xB6 => (Op::Ldx, ZeroPageY),
        0xAE => (Op::Ldx, Absolute),
        0xBE => (Op::Ldx, AbsoluteY),

        0xA0 => (Op::Ldy, Immediate),
        0xA4 => (Op::Ldy, ZeroPage),
        0xB4 => (Op::Ldy, ZeroPageX),
        0xAC => (Op::Ldy, Absolute),
        0xBC => (Op::Ldy, AbsoluteX),

        0x4A => (Op::Lsr, Accumulator),
        0x46 => (Op::Lsr, ZeroPage),
        0x56 => (Op::Lsr, ZeroPageX),
        0x4E => (Op::Lsr, Absolute),
        0x5E => (Op::Lsr, AbsoluteX),

        0xEA => (Op::Nop, Implied),

        0x09 => (Op::Ora, Immediate),
        0x05 => (Op::Ora, ZeroPage),
        0x15 => (Op::Ora, ZeroPageX),
        0x0D => (Op::Ora, Absolute),
        0x1D => (Op::Ora, AbsoluteX),
        0x19 => (Op::Ora, AbsoluteY),
        0x01 => (Op::Ora, IndexedIndirect),
        0x11 => (Op::Ora, IndirectIndexed),

        0x48 => (Op::Pha, Implied),
        0x08 => (Op::Php, Implied),
        0x68 => (Op::Pla, Implied),
        0x28 => (Op::Plp, Implied),

        0x2A => (Op::Rol, Accumulator),
        0x26 => (Op::Rol, ZeroPage),
        0x36 => (Op::Rol, ZeroPageX),
        0x2E => (Op::Rol, Absolute),
        0x3E => (Op::Rol, AbsoluteX),

        0x6A => (Op::Ror, Accumulator),
        0x66 => (Op::Ror, ZeroPage),
        0x76 => (Op::Ror, ZeroPageX),
        0x6E => (Op::Ror, Absolute),
        0x7E => (Op::Ror, AbsoluteX),

        0x40 => (Op::Rti, Implied),
        0x60 => (Op::Rts, Implied),

        0xE9 => (Op::Sbc, Immediate),
        0xE5 => (Op::Sbc, ZeroPage),
        0xF5 => (Op::Sbc, ZeroPageX),
        0xED => (Op::Sbc, Absolute),
        0xFD => (Op::Sbc, AbsoluteX),
        0xF9 => (Op::Sbc, AbsoluteY),
        0xE1 => (Op::Sbc, IndexedIndirect),
        0xF1 => (Op::Sbc, IndirectIndexed),

        0x38 => (Op::Sec, Implied),
        0xF8 => (Op::Sed, Implied),
        0x78 => (Op::Sei, Implied),

        0x85 => (Op::Sta, ZeroPage),
        0x95 => (Op::Sta, ZeroPageX),
        0x8D => (Op::Sta, Absolute),
        0x9D => (Op::Sta, AbsoluteX),
        0x99 => (Op::Sta, AbsoluteY),
        0x81 => (Op::Sta, IndexedIndirect),
        0x91 => (Op::Sta, IndirectIndexed),

        0x86 => (Op::Stx, ZeroPage),
        0x96 => (Op::Stx, ZeroPageY),
        0x8E => (Op::Stx, Absolute),

        0x84 => (Op::Sty, ZeroPage),
        0x94 => (Op::Sty, ZeroPageX),
        0x8C => (Op::Sty, Absolute),

        0xAA => (Op::Tax, Implied),
        0xA8 => (Op::Tay, Implied),
        0xBA => (Op::Tsx, Implied),
        0x8A => (Op::Txa, Implied),
        0x9A => (Op::Txs, Implied),
        0x98 => (Op::Tya, Implied),

        _ => (Op::Nop, undocumented_mode(opcode)),
    }
}

// Addressing mode the hardware decodes for an undocumented opcode. JAMs come out implied.
fn undocumented_mode(opcode: u8) -> AddrMode {
    use AddrMode::*;

    let aaa = opcode >> 5;
    let bbb = (opcode >> 2) & 0x07;
    let y_indexed = aaa == 4 || aaa == 5;

    if opcode & 0x03 == 0x03 {
        return match bbb {
            0 => IndexedIndirect,
            1 => ZeroPage,
            2 => Immediate,
            3 => Absolute,
            4 => IndirectIndexed,
            5 if y_indexed => ZeroPageY,
            5 => ZeroPageX,
            6 => AbsoluteY,
            _ if y_indexed => AbsoluteY,
            _ => AbsoluteX,
        };
    }

    match opcode {
        0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => Immediate,
        0x04 | 0x44 | 0x64 => ZeroPage,
        0x0C => Absolute,
        0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => ZeroPageX,
        0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC | 0x9C => AbsoluteX,
        0x9E => AbsoluteY,
        _ => Implied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_table_has_151_entries() {
        let documented = (0..=255u8)
            .filter(|&opcode| opcode == 0xEA || decode(opcode).0 != Op::Nop)
            .count();
        assert_eq!(documented, 151);
    }

    #[test]
    fn undocumented_opcodes_keep_operand_width() {
        assert_eq!(decode(0x80), (Op::Nop, AddrMode::Immediate));
        assert_eq!(decode(0x04), (Op::Nop, AddrMode::ZeroPage));
        assert_eq!(decode(0x0C), (Op::Nop, AddrMode::Absolute));
        assert_eq!(decode(0x1C), (Op::Nop, AddrMode::AbsoluteX));
        assert_eq!(decode(0x1A), (Op::Nop, AddrMode::Implied));
        assert_eq!(decode(0x02), (Op::Nop, AddrMode::Implied));
        assert_eq!(decode(0xA7), (Op::Nop, AddrMode::ZeroPage));
        assert_eq!(decode(0xB7), (Op::Nop, AddrMode::ZeroPageY));
        assert_eq!(decode(0xBF), (Op::Nop, AddrMode::AbsoluteY));
        assert_eq!(decode(0xFF), (Op::Nop, AddrMode::AbsoluteX));
        assert_eq!(decode(0xB3), (Op::Nop, AddrMode::IndirectIndexed));
        assert_eq!(AddrMode::AbsoluteX.operand_len(), 2);
    }
}
