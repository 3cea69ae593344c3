use super::bus::Bus;
use super::cartridge::TvSystem;
use super::opcodes::{AddrMode, Op, decode};

pub const FLAG_CARRY: u8 = 0x01;
pub const FLAG_ZERO: u8 = 0x02;
pub const FLAG_INTERRUPT: u8 = 0x04;
pub const FLAG_DECIMAL: u8 = 0x08;
pub const FLAG_BREAK: u8 = 0x10;
pub const FLAG_UNUSED: u8 = 0x20;
pub const FLAG_OVERFLOW: u8 = 0x40;
pub const FLAG_NEGATIVE: u8 = 0x80;

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

const RAM_SIZE: usize = 0x800;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuRegisters {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub pc: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    None,
    Accumulator,
    Address(u16),
}

#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Nmi,
    Irq,
}

pub struct Cpu {
    pub(crate) a: u8,
    pub(crate) x: u8,
    pub(crate) y: u8,
    pub(crate) p: u8,
    pub(crate) sp: u8,
    pub(crate) pc: u16,
    pub(crate) ram: [u8; RAM_SIZE],

    remaining_cycles: i64,
    total_cycles: u64,
    nmi_pending: bool,
    irq_line: bool,
    tv_system: TvSystem,
    pal_phase: u8,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_INTERRUPT | FLAG_UNUSED,
            sp: 0xFD,
            pc: 0,
            ram: [0; RAM_SIZE],
            remaining_cycles: 0,
            total_cycles: 0,
            nmi_pending: false,
            irq_line: false,
            tv_system: TvSystem::Ntsc,
            pal_phase: 0,
        }
    }

    pub fn set_tv_system(&mut self, tv_system: TvSystem) {
        self.tv_system = tv_system;
        self.pal_phase = 0;
    }

    pub fn registers(&self) -> CpuRegisters {
        CpuRegisters {
            a: self.a,
            x: self.x,
            y: self.y,
            p: self.p,
            sp: self.sp,
            pc: self.pc,
        }
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn remaining_cycles(&self) -> i64 {
        self.remaining_cycles
    }

    pub fn set_nmi(&mut self) {
        self.nmi_pending = true;
    }

    pub fn set_irq(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    pub fn reset(&mut self, bus: &mut Bus<'_>) {
        self.nmi_pending = false;
        for _ in 0..5 {
            self.idle(bus);
        }
        self.sp = 0xFD;
        self.set_flag(FLAG_INTERRUPT, true);
        self.pc = self.read_u16(bus, RESET_VECTOR);
        log::debug!("CPU reset -> PC=${:04X}", self.pc);
    }

    pub fn run_frame(&mut self, bus: &mut Bus<'_>) {
        self.remaining_cycles += self.tv_system.frame_cycles();
        while self.remaining_cycles > 0 {
            self.execute(bus);
        }
    }

    pub fn execute(&mut self, bus: &mut Bus<'_>) {
        if self.nmi_pending {
            self.nmi_pending = false;
            self.interrupt(bus, Interrupt::Nmi);
            return;
        }
        if self.irq_line && !self.get_flag(FLAG_INTERRUPT) {
            self.interrupt(bus, Interrupt::Irq);
            return;
        }

        let opcode = self.fetch_byte(bus);
        let (op, mode) = decode(opcode);
        let operand = self.resolve(bus, op, mode);
        self.run(bus, op, operand);
    }

    // Every call costs one cycle.
    pub fn access(&mut self, bus: &mut Bus<'_>, addr: u16, data: u8, is_write: bool) -> u8 {
        self.cycle(bus);

        match addr {
            0x0000..=0x1FFF => {
                let index = usize::from(addr) % RAM_SIZE;
                if is_write {
                    self.ram[index] = data;
                    0
                } else {
                    self.ram[index]
                }
            }
            0x2000..=0x3FFF => {
                let register = 0x2000 + addr % 8;
                if is_write {
                    bus.write_ppu_register(register, data);
                    0
                } else {
                    bus.read_ppu_register(register)
                }
            }
            0x4014 if is_write => {
                self.oam_dma(bus, data);
                0
            }
            0x4016 => {
                if is_write {
                    bus.controller.write_strobe(data);
                    0
                } else {
                    bus.controller.read()
                }
            }
            // Second pad port and the APU range are not wired.
            0x4000..=0x401F => 0,
            _ => {
                if is_write {
                    bus.cartridge.prg_write(addr, data);
                    0
                } else {
                    bus.cartridge.prg_read(addr)
                }
            }
        }
    }

    fn cycle(&mut self, bus: &mut Bus<'_>) {
        self.total_cycles += 1;
        self.remaining_cycles -= 1;

        let mut dots = 3;
        if self.tv_system == TvSystem::Pal {
            self.pal_phase += 1;
            if self.pal_phase == 5 {
                self.pal_phase = 0;
                dots += 1;
            }
        }

        for _ in 0..dots {
            if bus.step_ppu() {
                self.nmi_pending = true;
            }
        }
    }

    fn read(&mut self, bus: &mut Bus<'_>, addr: u16) -> u8 {
        self.access(bus, addr, 0, false)
    }

    fn write(&mut self, bus: &mut Bus<'_>, addr: u16, value: u8) {
        self.access(bus, addr, value, true);
    }

    fn idle(&mut self, bus: &mut Bus<'_>) {
        self.cycle(bus);
    }

    fn read_u16(&mut self, bus: &mut Bus<'_>, addr: u16) -> u16 {
        let lo = self.read(bus, addr) as u16;
        let hi = self.read(bus, addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn read_zp_u16(&mut self, bus: &mut Bus<'_>, addr: u8) -> u16 {
        let lo = self.read(bus, addr as u16) as u16;
        let hi = self.read(bus, addr.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    fn fetch_byte(&mut self, bus: &mut Bus<'_>) -> u8 {
        let byte = self.read(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self, bus: &mut Bus<'_>) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut Bus<'_>, value: u8) {
        let addr = 0x0100 | self.sp as u16;
        self.write(bus, addr, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut Bus<'_>) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        let addr = 0x0100 | self.sp as u16;
        self.read(bus, addr)
    }

    fn push_u16(&mut self, bus: &mut Bus<'_>, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_u16(&mut self, bus: &mut Bus<'_>) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    fn get_flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }

    fn interrupt(&mut self, bus: &mut Bus<'_>, kind: Interrupt) {
        self.idle(bus);
        self.idle(bus);
        self.push_u16(bus, self.pc);
        self.push(bus, (self.p & !FLAG_BREAK) | FLAG_UNUSED);
        self.set_flag(FLAG_INTERRUPT, true);
        let vector = match kind {
            Interrupt::Nmi => NMI_VECTOR,
            Interrupt::Irq => IRQ_VECTOR,
        };
        self.pc = self.read_u16(bus, vector);
        log::trace!("{kind:?} serviced -> PC=${:04X}", self.pc);
    }

    // 256 read/write pairs into $2004, plus one alignment cycle (two when started on an odd cycle).
    fn oam_dma(&mut self, bus: &mut Bus<'_>, page: u8) {
        let odd = self.total_cycles % 2 == 1;
        self.idle(bus);
        if odd {
            self.idle(bus);
        }

        let base = u16::from(page) << 8;
        for offset in 0..0x100 {
            let value = self.read(bus, base + offset);
            self.write(bus, 0x2004, value);
        }
    }

    fn resolve(&mut self, bus: &mut Bus<'_>, op: Op, mode: AddrMode) -> Operand {
        match mode {
            AddrMode::Implied => {
                self.idle(bus);
                Operand::None
            }
            AddrMode::Accumulator => {
                self.idle(bus);
                Operand::Accumulator
            }
            AddrMode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                Operand::Address(addr)
            }
            AddrMode::ZeroPage => Operand::Address(self.fetch_byte(bus) as u16),
            AddrMode::ZeroPageX => {
                let base = self.fetch_byte(bus);
                self.idle(bus);
                Operand::Address(base.wrapping_add(self.x) as u16)
            }
            AddrMode::ZeroPageY => {
                let base = self.fetch_byte(bus);
                self.idle(bus);
                Operand::Address(base.wrapping_add(self.y) as u16)
            }
            AddrMode::Absolute => Operand::Address(self.fetch_word(bus)),
            AddrMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                Operand::Address(self.indexed(bus, op, base, self.x))
            }
            AddrMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                Operand::Address(self.indexed(bus, op, base, self.y))
            }
            AddrMode::Indirect => {
                let ptr = self.fetch_word(bus);
                let lo = self.read(bus, ptr) as u16;
                // The high byte never carries into the next page.
                let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let hi = self.read(bus, hi_addr) as u16;
                Operand::Address((hi << 8) | lo)
            }
            AddrMode::IndexedIndirect => {
                let zp = self.fetch_byte(bus);
                self.idle(bus);
                Operand::Address(self.read_zp_u16(bus, zp.wrapping_add(self.x)))
            }
            AddrMode::IndirectIndexed => {
                let zp = self.fetch_byte(bus);
                let base = self.read_zp_u16(bus, zp);
                Operand::Address(self.indexed(bus, op, base, self.y))
            }
            AddrMode::Relative => {
                let offset = self.fetch_byte(bus) as i8;
                Operand::Address(self.pc.wrapping_add_signed(offset as i16))
            }
        }
    }

    fn indexed(&mut self, bus: &mut Bus<'_>, op: Op, base: u16, index: u8) -> u16 {
        let addr = base.wrapping_add(index as u16);
        if op.always_pays_index_cycle() || (base & 0xFF00) != (addr & 0xFF00) {
            self.idle(bus);
        }
        addr
    }

    fn load(&mut self, bus: &mut Bus<'_>, operand: Operand) -> u8 {
        match operand {
            Operand::Address(addr) => self.read(bus, addr),
            Operand::Accumulator => self.a,
            Operand::None => 0,
        }
    }

    fn store(&mut self, bus: &mut Bus<'_>, operand: Operand, value: u8) {
        if let Operand::Address(addr) = operand {
            self.write(bus, addr, value);
        }
    }

    fn modify(&mut self, bus: &mut Bus<'_>, operand: Operand, f: fn(&mut Self, u8) -> u8) {
        match operand {
            Operand::Accumulator => {
                let value = self.a;
                self.a = f(self, value);
            }
            Operand::Address(addr) => {
                let value = self.read(bus, addr);
                self.idle(bus);
                let result = f(self, value);
                self.write(bus, addr, result);
            }
            Operand::None => {}
        }
    }

    fn run(&mut self, bus: &mut Bus<'_>, op: Op, operand: Operand) {
        match op {
            Op::Lda => {
                self.a = self.load(bus, operand);
                self.update_zn(self.a);
            }
            Op::Ldx => {
                self.x = self.load(bus, operand);
                self.update_zn(self.x);
            }
            Op::Ldy => {
                self.y = self.load(bus, operand);
                self.update_zn(self.y);
            }
            Op::Sta => self.store(bus, operand, self.a),
            Op::Stx => self.store(bus, operand, self.x),
            Op::Sty => self.store(bus, operand, self.y),

            Op::Adc => {
                let value = self.load(bus, operand);
                self.adc(value);
            }
            Op::Sbc => {
                let value = self.load(bus, operand);
                self.sbc(value);
            }
            Op::And => {
                let value = self.load(bus, operand);
                self.and(value);
            }
            Op::Ora => {
                let value = self.load(bus, operand);
                self.ora(value);
            }
            Op::Eor => {
                let value = self.load(bus, operand);
                self.eor(value);
            }
            Op::Bit => {
                let value = self.load(bus, operand);
                self.bit(value);
            }
            Op::Cmp => {
                let value = self.load(bus, operand);
                self.compare(self.a, value);
            }
            Op::Cpx => {
                let value = self.load(bus, operand);
                self.compare(self.x, value);
            }
            Op::Cpy => {
                let value = self.load(bus, operand);
                self.compare(self.y, value);
            }

            Op::Asl => self.modify(bus, operand, Self::asl),
            Op::Lsr => self.modify(bus, operand, Self::lsr),
            Op::Rol => self.modify(bus, operand, Self::rol),
            Op::Ror => self.modify(bus, operand, Self::ror),
            Op::Inc => self.modify(bus, operand, |cpu, value| {
                let result = value.wrapping_add(1);
                cpu.update_zn(result);
                result
            }),
            Op::Dec => self.modify(bus, operand, |cpu, value| {
                let result = value.wrapping_sub(1);
                cpu.update_zn(result);
                result
            }),

            Op::Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
            }
            Op::Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
            }
            Op::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
            }
            Op::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
            }

            Op::Tax => {
                self.x = self.a;
                self.update_zn(self.x);
            }
            Op::Tay => {
                self.y = self.a;
                self.update_zn(self.y);
            }
            Op::Tsx => {
                self.x = self.sp;
                self.update_zn(self.x);
            }
            Op::Txa => {
                self.a = self.x;
                self.update_zn(self.a);
            }
            Op::Tya => {
                self.a = self.y;
                self.update_zn(self.a);
            }
            Op::Txs => self.sp = self.x,

            Op::Clc => self.set_flag(FLAG_CARRY, false),
            Op::Cld => self.set_flag(FLAG_DECIMAL, false),
            Op::Cli => self.set_flag(FLAG_INTERRUPT, false),
            Op::Clv => self.set_flag(FLAG_OVERFLOW, false),
            Op::Sec => self.set_flag(FLAG_CARRY, true),
            Op::Sed => self.set_flag(FLAG_DECIMAL, true),
            Op::Sei => self.set_flag(FLAG_INTERRUPT, true),

            Op::Bcc => self.branch(bus, operand, !self.get_flag(FLAG_CARRY)),
            Op::Bcs => self.branch(bus, operand, self.get_flag(FLAG_CARRY)),
            Op::Bne => self.branch(bus, operand, !self.get_flag(FLAG_ZERO)),
            Op::Beq => self.branch(bus, operand, self.get_flag(FLAG_ZERO)),
            Op::Bpl => self.branch(bus, operand, !self.get_flag(FLAG_NEGATIVE)),
            Op::Bmi => self.branch(bus, operand, self.get_flag(FLAG_NEGATIVE)),
            Op::Bvc => self.branch(bus, operand, !self.get_flag(FLAG_OVERFLOW)),
            Op::Bvs => self.branch(bus, operand, self.get_flag(FLAG_OVERFLOW)),

            Op::Jmp => {
                if let Operand::Address(addr) = operand {
                    self.pc = addr;
                }
            }
            Op::Jsr => {
                if let Operand::Address(addr) = operand {
                    self.idle(bus);
                    self.push_u16(bus, self.pc.wrapping_sub(1));
                    self.pc = addr;
                }
            }
            Op::Rts => {
                self.idle(bus);
                let addr = self.pop_u16(bus);
                self.idle(bus);
                self.pc = addr.wrapping_add(1);
            }
            Op::Rti => {
                self.idle(bus);
                self.p = (self.pop(bus) & !FLAG_BREAK) | FLAG_UNUSED;
                self.pc = self.pop_u16(bus);
            }
            Op::Brk => {
                self.pc = self.pc.wrapping_add(1);
                self.push_u16(bus, self.pc);
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                self.set_flag(FLAG_INTERRUPT, true);
                self.pc = self.read_u16(bus, IRQ_VECTOR);
            }

            Op::Pha => self.push(bus, self.a),
            Op::Php => self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED),
            Op::Pla => {
                self.idle(bus);
                self.a = self.pop(bus);
                self.update_zn(self.a);
            }
            Op::Plp => {
                self.idle(bus);
                self.p = (self.pop(bus) & !FLAG_BREAK) | FLAG_UNUSED;
            }

            // Undocumented opcodes still read their operand.
            Op::Nop => {
                if let Operand::Address(addr) = operand {
                    self.read(bus, addr);
                }
            }
        }
    }

    fn branch(&mut self, bus: &mut Bus<'_>, operand: Operand, condition: bool) {
        let Operand::Address(target) = operand else {
            return;
        };
        if !condition {
            return;
        }
        self.idle(bus);
        if (self.pc & 0xFF00) != (target & 0xFF00) {
            self.idle(bus);
        }
        self.pc = target;
    }

    fn ora(&mut self, value: u8) {
        self.a |= value;
        self.update_zn(self.a);
    }

    fn and(&mut self, value: u8) {
        self.a &= value;
        self.update_zn(self.a);
    }

    fn eor(&mut self, value: u8) {
        self.a ^= value;
        self.update_zn(self.a);
    }

    fn bit(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, (self.a & value) == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
        self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(result);
    }

    fn adc(&mut self, value: u8) {
        let carry_in = u16::from(self.get_flag(FLAG_CARRY));
        let result = self.a as u16 + value as u16 + carry_in;
        let out = result as u8;

        self.set_flag(FLAG_CARRY, result > 0xFF);
        self.set_flag(FLAG_OVERFLOW, ((self.a ^ out) & (value ^ out) & 0x80) != 0);

        self.a = out;
        self.update_zn(self.a);
    }

    fn sbc(&mut self, value: u8) {
        self.adc(!value);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.get_flag(FLAG_CARRY));
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::Cartridge;
    use crate::nes::controller::Controller;
    use crate::nes::ppu::Ppu;
    use crate::nes::sink::FrameSink;
    use crate::nes::test_rom::{IRQ_ENTRY, NMI_ENTRY, RESET_ENTRY, program_cartridge};

    struct Rig {
        cpu: Cpu,
        ppu: Ppu,
        cart: Cartridge,
        pad: Controller,
        sink: Option<Box<dyn FrameSink>>,
    }

    impl Rig {
        fn new(program: &[u8]) -> Self {
            Self::with_tv(program, TvSystem::Ntsc)
        }

        fn with_tv(program: &[u8], tv_system: TvSystem) -> Self {
            let mut rig = Self {
                cpu: Cpu::new(),
                ppu: Ppu::new(),
                cart: program_cartridge(program),
                pad: Controller::new(),
                sink: None,
            };
            rig.cpu.set_tv_system(tv_system);
            rig.ppu.set_tv_system(tv_system);
            let mut bus = Bus::new(&mut rig.ppu, &mut rig.cart, &mut rig.pad, &mut rig.sink);
            rig.cpu.reset(&mut bus);
            rig
        }

        fn step(&mut self) -> u64 {
            let before = self.cpu.cycles();
            let mut bus = Bus::new(&mut self.ppu, &mut self.cart, &mut self.pad, &mut self.sink);
            self.cpu.execute(&mut bus);
            self.cpu.cycles() - before
        }

        fn run_frame(&mut self) {
            let mut bus = Bus::new(&mut self.ppu, &mut self.cart, &mut self.pad, &mut self.sink);
            self.cpu.run_frame(&mut bus);
        }
    }

    #[test]
    fn reset_takes_seven_cycles_and_loads_vector() {
        let rig = Rig::new(&[]);
        assert_eq!(rig.cpu.cycles(), 7);
        assert_eq!(rig.cpu.pc, RESET_ENTRY);
        assert_eq!(rig.cpu.sp, 0xFD);
        assert_eq!(rig.cpu.p, 0x24);
        assert_eq!((rig.ppu.scanline(), rig.ppu.dot()), (0, 21));
    }

    #[test]
    fn pal_adds_a_dot_every_fifth_cycle() {
        let mut rig = Rig::with_tv(&[], TvSystem::Pal);
        assert_eq!((rig.ppu.scanline(), rig.ppu.dot()), (0, 22));

        for _ in 0..4 {
            rig.step();
        }
        assert_eq!(rig.cpu.cycles(), 15);
        assert_eq!((rig.ppu.scanline(), rig.ppu.dot()), (0, 48));

        let mut ntsc = Rig::new(&[]);
        for _ in 0..4 {
            ntsc.step();
        }
        assert_eq!((ntsc.ppu.scanline(), ntsc.ppu.dot()), (0, 45));
    }

    #[test]
    fn adc_sets_overflow_on_signed_wrap() {
        // CLC; LDA #$50; ADC #$50
        let mut rig = Rig::new(&[0x18, 0xA9, 0x50, 0x69, 0x50]);
        rig.step();
        rig.step();
        assert_eq!(rig.step(), 2);
        assert_eq!(rig.cpu.a, 0xA0);
        assert!(rig.cpu.get_flag(FLAG_OVERFLOW));
        assert!(rig.cpu.get_flag(FLAG_NEGATIVE));
        assert!(!rig.cpu.get_flag(FLAG_CARRY));
    }

    #[test]
    fn sbc_borrows_through_carry() {
        // SEC; LDA #$00; SBC #$01
        let mut rig = Rig::new(&[0x38, 0xA9, 0x00, 0xE9, 0x01]);
        rig.step();
        rig.step();
        rig.step();
        assert_eq!(rig.cpu.a, 0xFF);
        assert!(!rig.cpu.get_flag(FLAG_CARRY));
        assert!(rig.cpu.get_flag(FLAG_NEGATIVE));
        assert!(!rig.cpu.get_flag(FLAG_OVERFLOW));
    }

    #[test]
    fn branch_costs_two_three_or_four() {
        // LDA #$00; BNE +5; BEQ +0; BEQ -16
        let mut rig = Rig::new(&[0xA9, 0x00, 0xD0, 0x05, 0xF0, 0x00, 0xF0, 0xF0]);
        rig.step();
        assert_eq!(rig.step(), 2);
        assert_eq!(rig.cpu.pc, 0x8004);
        assert_eq!(rig.step(), 3);
        assert_eq!(rig.cpu.pc, 0x8006);
        assert_eq!(rig.step(), 4);
        assert_eq!(rig.cpu.pc, 0x7FF8);
    }

    #[test]
    fn oam_dma_costs_513_or_514() {
        // LDA #$02; STA $4014; LDA $00; STA $4014
        let mut rig = Rig::new(&[0xA9, 0x02, 0x8D, 0x14, 0x40, 0xA5, 0x00, 0x8D, 0x14, 0x40]);
        for (i, byte) in rig.cpu.ram[0x200..0x300].iter_mut().enumerate() {
            *byte = i as u8;
        }
        rig.cpu.ram[0] = 0x02;

        rig.step();
        assert_eq!(rig.cpu.cycles(), 9);
        assert_eq!(rig.step(), 4 + 514);
        assert_eq!(rig.ppu.oam()[0x80], 0x80);
        rig.step();
        assert_eq!(rig.step(), 4 + 513);
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        // JMP ($02FF)
        let mut rig = Rig::new(&[0x6C, 0xFF, 0x02]);
        rig.cpu.ram[0x2FF] = 0x34;
        rig.cpu.ram[0x200] = 0x12;
        rig.cpu.ram[0x300] = 0x56;
        assert_eq!(rig.step(), 5);
        assert_eq!(rig.cpu.pc, 0x1234);
    }

    #[test]
    fn jsr_and_rts_round_trip() {
        let mut program = vec![0xEA; 0x11];
        program[0..3].copy_from_slice(&[0x20, 0x10, 0x80]);
        program[0x10] = 0x60;
        let mut rig = Rig::new(&program);

        assert_eq!(rig.step(), 6);
        assert_eq!(rig.cpu.pc, 0x8010);
        assert_eq!(rig.cpu.ram[0x1FD], 0x80);
        assert_eq!(rig.cpu.ram[0x1FC], 0x02);
        assert_eq!(rig.step(), 6);
        assert_eq!(rig.cpu.pc, 0x8003);
        assert_eq!(rig.cpu.sp, 0xFD);
    }

    #[test]
    fn brk_pushes_break_flag_and_skips_padding() {
        let mut rig = Rig::new(&[0x00, 0xFF]);
        assert_eq!(rig.step(), 7);
        assert_eq!(rig.cpu.pc, IRQ_ENTRY);
        assert_eq!(rig.cpu.ram[0x1FD], 0x80);
        assert_eq!(rig.cpu.ram[0x1FC], 0x02);
        assert_eq!(rig.cpu.ram[0x1FB] & (FLAG_BREAK | FLAG_UNUSED), FLAG_BREAK | FLAG_UNUSED);
        assert!(rig.cpu.get_flag(FLAG_INTERRUPT));
    }

    #[test]
    fn nmi_entry_pushes_status_without_break() {
        let mut rig = Rig::new(&[]);
        rig.cpu.set_nmi();
        assert_eq!(rig.step(), 7);
        assert_eq!(rig.cpu.pc, NMI_ENTRY);
        assert_eq!(rig.cpu.ram[0x1FB] & FLAG_BREAK, 0);
        assert_ne!(rig.cpu.ram[0x1FB] & FLAG_UNUSED, 0);
    }

    #[test]
    fn irq_waits_for_interrupt_flag_clear() {
        // CLI; NOP
        let mut rig = Rig::new(&[0x58, 0xEA]);
        rig.cpu.set_irq(true);
        assert_eq!(rig.step(), 2);
        assert_eq!(rig.cpu.pc, 0x8001);
        assert_eq!(rig.step(), 7);
        assert_eq!(rig.cpu.pc, IRQ_ENTRY);
    }

    #[test]
    fn rti_restores_status_and_pc() {
        let mut rig = Rig::new(&[]);
        rig.cpu.set_nmi();
        rig.step();
        // NMI handler is NOP-filled; drop an RTI in by pointing PC at one.
        rig.cpu.ram[0x10] = 0x40;
        rig.cpu.pc = 0x0010;
        assert_eq!(rig.step(), 6);
        assert_eq!(rig.cpu.pc, RESET_ENTRY);
        assert_eq!(rig.cpu.sp, 0xFD);
        assert_eq!(rig.cpu.p, 0x24);
    }

    #[test]
    fn stack_wraps_within_page_one() {
        // LDA #$77; PHA
        let mut rig = Rig::new(&[0xA9, 0x77, 0x48]);
        rig.cpu.sp = 0x00;
        rig.step();
        assert_eq!(rig.step(), 3);
        assert_eq!(rig.cpu.ram[0x100], 0x77);
        assert_eq!(rig.cpu.sp, 0xFF);
    }

    #[test]
    fn plp_drops_break_and_keeps_unused() {
        // LDA #$FF; PHA; PLP
        let mut rig = Rig::new(&[0xA9, 0xFF, 0x48, 0x28]);
        rig.step();
        rig.step();
        assert_eq!(rig.step(), 4);
        assert_eq!(rig.cpu.p, 0xEF);
    }

    #[test]
    fn work_ram_mirrors_every_2k() {
        // LDA #$42; STA $0805; LDX $1805
        let mut rig = Rig::new(&[0xA9, 0x42, 0x8D, 0x05, 0x08, 0xAE, 0x05, 0x18]);
        rig.step();
        rig.step();
        rig.step();
        assert_eq!(rig.cpu.ram[5], 0x42);
        assert_eq!(rig.cpu.x, 0x42);
    }

    #[test]
    fn indexed_penalty_applies_to_reads_on_page_cross_and_always_to_stores() {
        // LDX #$01; LDA $00FF,X; LDA $0010,X; STA $0010,X; INC $10
        let mut rig = Rig::new(&[
            0xA2, 0x01, 0xBD, 0xFF, 0x00, 0xBD, 0x10, 0x00, 0x9D, 0x10, 0x00, 0xE6, 0x10,
        ]);
        rig.step();
        assert_eq!(rig.step(), 5);
        assert_eq!(rig.step(), 4);
        assert_eq!(rig.step(), 5);
        assert_eq!(rig.step(), 5);
    }

    #[test]
    fn undocumented_nop_consumes_operand() {
        // LDX #$01; NOP $00FF,X (undocumented); NOP #$12
        let mut rig = Rig::new(&[0xA2, 0x01, 0x1C, 0xFF, 0x00, 0x80, 0x12]);
        rig.step();
        assert_eq!(rig.step(), 5);
        assert_eq!(rig.cpu.pc, 0x8005);
        assert_eq!(rig.step(), 2);
        assert_eq!(rig.cpu.pc, 0x8007);
    }

    #[test]
    fn frame_budget_carries_overshoot() {
        let mut rig = Rig::new(&[]);
        for frame in 1..=3i64 {
            rig.run_frame();
            let budget = TvSystem::Ntsc.frame_cycles();
            assert_eq!(rig.cpu.cycles() as i64 + rig.cpu.remaining_cycles(), frame * budget);
            assert!(rig.cpu.remaining_cycles() <= 0);
        }
    }

    #[test]
    fn vblank_nmi_reaches_the_cpu() {
        // LDA #$80; STA $2000; then NOPs
        let mut rig = Rig::new(&[0xA9, 0x80, 0x8D, 0x00, 0x20]);
        let mut entered = false;
        for _ in 0..20_000 {
            rig.step();
            if rig.cpu.sp == 0xFA {
                entered = true;
                break;
            }
        }
        assert!(entered);
        assert_eq!(rig.cpu.pc, NMI_ENTRY);
        assert!(rig.ppu.scanline() >= 241);
    }
}
