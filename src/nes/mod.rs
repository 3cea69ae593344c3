pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod mapper;
pub mod opcodes;
mod palette;
pub mod ppu;
pub mod sink;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_rom;

use std::{collections::VecDeque, path::Path};

use crate::config::EmulatorConfig;
use bus::Bus;
use cartridge::{Cartridge, TvSystem};
use controller::Controller;
use cpu::{Cpu, CpuRegisters};
use error::LoadError;
use mapper::mapper_name;
use ppu::Ppu;
use sink::{ErrorSink, FileErrorLog, FrameSink};
use trace::TraceRecord;

pub use controller::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP,
};

pub struct Nes {
    cpu: Cpu,
    ppu: Ppu,
    cartridge: Cartridge,
    controller: Controller,
    renderer: Option<Box<dyn FrameSink>>,
    error_sink: Option<Box<dyn ErrorSink>>,
    config: EmulatorConfig,
    tv_system: TvSystem,
    debug_events: VecDeque<String>,
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nes {
    pub fn new() -> Self {
        Self::with_config(EmulatorConfig::default())
    }

    pub fn with_config(config: EmulatorConfig) -> Self {
        let mut cartridge = Cartridge::new();
        cartridge.set_save_dir(config.save_dir.clone());
        let error_sink = config
            .error_log
            .as_ref()
            .map(|path| Box::new(FileErrorLog::new(path)) as Box<dyn ErrorSink>);

        Self {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            cartridge,
            controller: Controller::new(),
            renderer: None,
            error_sink,
            tv_system: config.tv_system.unwrap_or_default(),
            debug_events: VecDeque::with_capacity(config.debug_event_capacity),
            config,
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn set_renderer(&mut self, renderer: Option<Box<dyn FrameSink>>) {
        self.renderer = renderer;
    }

    pub fn set_error_sink(&mut self, sink: Option<Box<dyn ErrorSink>>) {
        self.error_sink = sink;
    }

    pub fn has_rom(&self) -> bool {
        self.cartridge.is_loaded()
    }

    pub fn tv_system(&self) -> TvSystem {
        self.tv_system
    }

    pub fn mapper_name(&self) -> &'static str {
        match self.cartridge.header() {
            Some(header) => mapper_name(header.mapper_id),
            None => "No ROM loaded",
        }
    }

    pub fn load_rom(&mut self, path: &Path) -> Result<(), LoadError> {
        let result = self.cartridge.load(path);
        self.finish_load(result, &path.display().to_string())
    }

    pub fn load_rom_bytes(&mut self, bytes: &[u8], name: &str) -> Result<(), LoadError> {
        let result = self.cartridge.load_bytes(bytes, None);
        self.finish_load(result, name)
    }

    fn finish_load(&mut self, result: Result<(), LoadError>, source: &str) -> Result<(), LoadError> {
        match result {
            Ok(()) => {
                self.power_on();
                self.push_debug_event(format!("ROM loaded: {source} ({})", self.mapper_name()));
                Ok(())
            }
            Err(err) => {
                let message = format!("failed to load {source}: {err}");
                log::error!("{message}");
                if let Some(sink) = self.error_sink.as_mut() {
                    sink.record(&message);
                }
                self.push_debug_event(message);
                Err(err)
            }
        }
    }

    pub fn unload(&mut self) {
        self.cartridge.unload();
        self.push_debug_event("ROM unloaded");
    }

    fn power_on(&mut self) {
        self.tv_system = self
            .config
            .tv_system
            .unwrap_or_else(|| self.cartridge.tv_system());
        self.cpu = Cpu::new();
        self.cpu.set_tv_system(self.tv_system);
        self.ppu.set_tv_system(self.tv_system);
        self.reset();
    }

    pub fn reset(&mut self) {
        if !self.has_rom() {
            return;
        }
        self.ppu.reset();
        let mut bus = Bus::new(
            &mut self.ppu,
            &mut self.cartridge,
            &mut self.controller,
            &mut self.renderer,
        );
        self.cpu.reset(&mut bus);
        self.push_debug_event(format!("CPU reset, PC=${:04X}", self.cpu.registers().pc));
    }

    pub fn run_frame(&mut self) {
        if !self.has_rom() {
            return;
        }
        let mut bus = Bus::new(
            &mut self.ppu,
            &mut self.cartridge,
            &mut self.controller,
            &mut self.renderer,
        );
        self.cpu.run_frame(&mut bus);
    }

    pub fn step_instruction(&mut self) -> u64 {
        if !self.has_rom() {
            return 0;
        }
        let before = self.cpu.cycles();
        let mut bus = Bus::new(
            &mut self.ppu,
            &mut self.cartridge,
            &mut self.controller,
            &mut self.renderer,
        );
        self.cpu.execute(&mut bus);
        self.cpu.cycles() - before
    }

    pub fn set_controller_state(&mut self, state: u8) {
        self.controller.set_state(state);
    }

    pub fn set_irq_line(&mut self, asserted: bool) {
        self.cpu.set_irq(asserted);
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.cpu.set_pc(pc);
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.ppu.frame_buffer()
    }

    pub fn frame_count(&self) -> u64 {
        self.ppu.frame_count()
    }

    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    pub fn remaining_cycles(&self) -> i64 {
        self.cpu.remaining_cycles()
    }

    pub fn cpu_registers(&self) -> CpuRegisters {
        self.cpu.registers()
    }

    pub fn cpu_ram(&self) -> &[u8] {
        self.cpu.ram()
    }

    pub fn ppu_position(&self) -> (i16, u16) {
        (self.ppu.scanline(), self.ppu.dot())
    }

    pub fn ppu_registers(&self) -> (u8, u8, u8, u8) {
        self.ppu.registers()
    }

    pub fn ppu_scroll(&self) -> (u16, u16, u8, bool) {
        self.ppu.scroll_registers()
    }

    pub fn ppu_nametables(&self) -> &[u8] {
        self.ppu.nametable_ram()
    }

    pub fn ppu_palette(&self) -> &[u8] {
        self.ppu.palette_ram()
    }

    pub fn ppu_oam(&self) -> &[u8] {
        self.ppu.oam()
    }

    pub fn prg_rom(&self) -> &[u8] {
        self.cartridge
            .mapper()
            .map(|mapper| mapper.rom().prg_rom.as_slice())
            .unwrap_or(&[])
    }

    pub fn prg_ram(&self) -> &[u8] {
        self.cartridge
            .mapper()
            .map(|mapper| mapper.rom().prg_ram.as_slice())
            .unwrap_or(&[])
    }

    pub fn chr(&self) -> &[u8] {
        self.cartridge
            .mapper()
            .map(|mapper| mapper.rom().chr.as_slice())
            .unwrap_or(&[])
    }

    // CPU address space read without side effects: no cycles, no register latches.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.cpu.ram()[usize::from(addr) % 0x800],
            0x2000..=0x3FFF => self.ppu.peek_register(addr),
            0x4016 => self.controller.peek(),
            0x4000..=0x401F => 0,
            _ => self.cartridge.prg_read(addr),
        }
    }

    pub fn debug_mapper_state(&self) -> String {
        match self.cartridge.mapper() {
            Some(mapper) => {
                let state = mapper.debug_state();
                if state.is_empty() {
                    self.mapper_name().to_string()
                } else {
                    state
                }
            }
            None => "No mapper".to_string(),
        }
    }

    // Newest first.
    pub fn debug_events(&self, limit: usize) -> Vec<String> {
        self.debug_events.iter().rev().take(limit).cloned().collect()
    }

    fn push_debug_event<S: Into<String>>(&mut self, event: S) {
        let capacity = self.config.debug_event_capacity;
        if capacity == 0 {
            return;
        }
        while self.debug_events.len() >= capacity {
            self.debug_events.pop_front();
        }
        self.debug_events.push_back(event.into());
    }

    pub fn trace_record(&self) -> TraceRecord {
        let regs = self.cpu.registers();
        let (scanline, dot) = self.ppu_position();
        TraceRecord {
            pc: regs.pc,
            a: regs.a,
            x: regs.x,
            y: regs.y,
            p: regs.p,
            sp: regs.sp,
            scanline,
            dot,
            cycles: self.cpu.cycles(),
        }
    }

    pub fn trace_line(&self) -> String {
        self.trace_record().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::sink::MemoryErrorLog;
    use crate::nes::test_rom::{RESET_ENTRY, ines_image, program_image};
    use std::{cell::RefCell, rc::Rc};

    fn quiet_config() -> EmulatorConfig {
        EmulatorConfig {
            error_log: None,
            ..EmulatorConfig::default()
        }
    }

    struct CountingSink(Rc<RefCell<usize>>);

    impl FrameSink for CountingSink {
        fn present_frame(&mut self, rgba: &[u8]) {
            assert_eq!(rgba.len(), ppu::FRAME_WIDTH * ppu::FRAME_HEIGHT * 4);
            *self.0.borrow_mut() += 1;
        }
    }

    #[test]
    fn load_powers_on_at_reset_vector() {
        let mut nes = Nes::with_config(quiet_config());
        nes.load_rom_bytes(&program_image(&[]), "nops").unwrap();
        assert!(nes.has_rom());
        assert_eq!(nes.cpu_registers().pc, RESET_ENTRY);
        assert_eq!(nes.cycles(), 7);
        assert_eq!(nes.mapper_name(), "NROM");
        assert!(nes.trace_line().starts_with("8000 A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7"));
    }

    #[test]
    fn failed_load_keeps_previous_game_and_records_error() {
        let log = MemoryErrorLog::new();
        let mut nes = Nes::with_config(quiet_config());
        nes.set_error_sink(Some(Box::new(log.clone())));
        nes.load_rom_bytes(&program_image(&[0xA9, 0x11]), "first").unwrap();
        nes.step_instruction();
        let regs = nes.cpu_registers();

        let bad = ines_image(4, &vec![0; 0x8000], &[], 0);
        assert!(matches!(
            nes.load_rom_bytes(&bad, "mmc3"),
            Err(LoadError::Mapper(error::MapperError::Unsupported(4)))
        ));
        assert!(nes.load_rom_bytes(b"not a rom", "junk").is_err());

        assert!(nes.has_rom());
        assert_eq!(nes.cpu_registers(), regs);
        assert_eq!(nes.mapper_name(), "NROM");

        let messages = log.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("mapper 4 not supported"));
        assert!(nes.debug_events(1)[0].contains("junk"));
    }

    #[test]
    fn run_frame_without_rom_is_a_no_op() {
        let mut nes = Nes::with_config(quiet_config());
        nes.run_frame();
        assert_eq!(nes.cycles(), 0);
        assert_eq!(nes.step_instruction(), 0);
    }

    #[test]
    fn frames_honor_budget_and_reach_the_renderer() {
        let presented = Rc::new(RefCell::new(0));
        let mut nes = Nes::with_config(quiet_config());
        nes.set_renderer(Some(Box::new(CountingSink(presented.clone()))));
        nes.load_rom_bytes(&program_image(&[]), "nops").unwrap();

        for _ in 0..4 {
            nes.run_frame();
        }
        assert_eq!(
            nes.cycles() as i64 + nes.remaining_cycles(),
            4 * TvSystem::Ntsc.frame_cycles()
        );
        assert_eq!(*presented.borrow(), 4);
        assert_eq!(nes.frame_count(), 4);
    }

    #[test]
    fn config_overrides_cartridge_timing() {
        let mut nes = Nes::with_config(EmulatorConfig {
            tv_system: Some(TvSystem::Pal),
            ..quiet_config()
        });
        nes.load_rom_bytes(&program_image(&[]), "nops").unwrap();
        assert_eq!(nes.tv_system(), TvSystem::Pal);
        nes.run_frame();
        assert_eq!(
            nes.cycles() as i64 + nes.remaining_cycles(),
            TvSystem::Pal.frame_cycles()
        );
    }

    #[test]
    fn controller_reads_through_cpu_bus() {
        // LDA #$01; STA $4016; LDA #$00; STA $4016; LDA $4016; LDX $4016
        let program = [
            0xA9, 0x01, 0x8D, 0x16, 0x40, 0xA9, 0x00, 0x8D, 0x16, 0x40, 0xAD, 0x16, 0x40, 0xAE,
            0x16, 0x40,
        ];
        let mut nes = Nes::with_config(quiet_config());
        nes.load_rom_bytes(&program_image(&program), "pad").unwrap();
        nes.set_controller_state(BUTTON_B);
        for _ in 0..6 {
            nes.step_instruction();
        }
        let regs = nes.cpu_registers();
        assert_eq!(regs.a, 0x40);
        assert_eq!(regs.x, 0x41);
    }

    #[test]
    fn peek_has_no_side_effects() {
        let mut nes = Nes::with_config(quiet_config());
        nes.load_rom_bytes(&program_image(&[0xA9, 0x5A]), "peek").unwrap();
        assert_eq!(nes.peek(0x8001), 0x5A);
        assert_eq!(nes.peek(0xFFFC), 0x00);
        assert_eq!(nes.peek(0xFFFD), 0x80);
        let before = nes.cycles();
        nes.peek(0x2002);
        nes.peek(0x2002);
        assert_eq!(nes.cycles(), before);
        assert_eq!(nes.prg_rom().len(), 0x8000);
        assert_eq!(nes.chr().len(), 0x2000);
    }

    #[test]
    fn debug_events_respect_capacity() {
        let mut nes = Nes::with_config(EmulatorConfig {
            debug_event_capacity: 2,
            ..quiet_config()
        });
        nes.load_rom_bytes(&program_image(&[]), "a").unwrap();
        nes.reset();
        nes.reset();
        let events = nes.debug_events(10);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.starts_with("CPU reset")));
    }
}
