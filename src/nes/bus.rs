use super::cartridge::Cartridge;
use super::controller::Controller;
use super::ppu::Ppu;
use super::sink::FrameSink;

pub struct Bus<'a> {
    pub ppu: &'a mut Ppu,
    pub cartridge: &'a mut Cartridge,
    pub controller: &'a mut Controller,
    pub frame_sink: &'a mut Option<Box<dyn FrameSink>>,
}

impl<'a> Bus<'a> {
    pub fn new(
        ppu: &'a mut Ppu,
        cartridge: &'a mut Cartridge,
        controller: &'a mut Controller,
        frame_sink: &'a mut Option<Box<dyn FrameSink>>,
    ) -> Self {
        Self {
            ppu,
            cartridge,
            controller,
            frame_sink,
        }
    }

    pub fn step_ppu(&mut self) -> bool {
        self.ppu.step(self.cartridge);
        if self.ppu.take_frame_ready() {
            if let Some(sink) = self.frame_sink.as_mut() {
                sink.present_frame(self.ppu.frame_buffer());
            }
        }
        self.ppu.take_nmi()
    }

    pub fn read_ppu_register(&mut self, addr: u16) -> u8 {
        self.ppu.read_register(addr, self.cartridge)
    }

    pub fn write_ppu_register(&mut self, addr: u16, value: u8) {
        self.ppu.write_register(addr, value, self.cartridge);
    }
}
