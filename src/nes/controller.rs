pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_UP: u8 = 0x10;
pub const BUTTON_DOWN: u8 = 0x20;
pub const BUTTON_LEFT: u8 = 0x40;
pub const BUTTON_RIGHT: u8 = 0x80;

#[derive(Debug, Clone, Default)]
pub struct Controller {
    state: u8,
    shift: u8,
    strobe: bool,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&mut self, state: u8) {
        self.state = state;
        if self.strobe {
            self.shift = state;
        }
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    pub fn write_strobe(&mut self, value: u8) {
        self.strobe = (value & 0x01) != 0;
        if self.strobe {
            self.shift = self.state;
        }
    }

    // Next button bit, A first. Upper bits read back as open bus ($40).
    pub fn read(&mut self) -> u8 {
        if self.strobe {
            return 0x40 | (self.state & 0x01);
        }
        let bit = self.shift & 0x01;
        self.shift = (self.shift >> 1) | 0x80;
        0x40 | bit
    }

    pub fn peek(&self) -> u8 {
        let source = if self.strobe { self.state } else { self.shift };
        0x40 | (source & 0x01)
    }
}
