// Controller ports ($4016/$4017 serial reads, $4218-$421F auto-joypad)

use bitflags::bitflags;

bitflags! {
    /// Per-frame button-state vector handed in by the host.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Buttons: u16 {
        const B = 0x0001;
        const Y = 0x0002;
        const SELECT = 0x0004;
        const START = 0x0008;
        const UP = 0x0010;
        const DOWN = 0x0020;
        const LEFT = 0x0040;
        const RIGHT = 0x0080;
        const A = 0x0100;
        const X = 0x0200;
        const L = 0x0400;
        const R = 0x0800;
    }
}

// 読み出し順序（MSB→LSB）: B, Y, Select, Start, Up, Down, Left, Right, A, X, L, R, 0, 0, 0, 0
const SERIAL_ORDER: [Buttons; 12] = [
    Buttons::B,
    Buttons::Y,
    Buttons::SELECT,
    Buttons::START,
    Buttons::UP,
    Buttons::DOWN,
    Buttons::LEFT,
    Buttons::RIGHT,
    Buttons::A,
    Buttons::X,
    Buttons::L,
    Buttons::R,
];

#[derive(Debug, Clone, Default)]
pub struct Controller {
    buttons: Buttons,
    shift_register: u16,
    strobe: bool,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_buttons(&mut self, buttons: Buttons) {
        self.buttons = buttons;
        if self.strobe {
            self.latch();
        }
    }

    pub fn buttons(&self) -> Buttons {
        self.buttons
    }

    /// 16-bit report in hardware order, 1 = pressed, controller signature bits 0000.
    pub fn report(&self) -> u16 {
        SERIAL_ORDER
            .iter()
            .enumerate()
            .filter(|(_, b)| self.buttons.contains(**b))
            .fold(0u16, |acc, (i, _)| acc | (0x8000 >> i))
    }

    // ストローブ書き込み（$4016 bit0）
    pub fn write_strobe(&mut self, value: u8) {
        let new_strobe = value & 0x01 != 0;
        if self.strobe && !new_strobe {
            self.latch();
        }
        self.strobe = new_strobe;
        if self.strobe {
            self.latch();
        }
    }

    pub fn read_serial(&mut self) -> u8 {
        if self.strobe {
            return self.buttons.contains(Buttons::B) as u8;
        }
        let bit = ((self.shift_register & 0x8000) != 0) as u8;
        // 読み切った後は 1 が返る
        self.shift_register = (self.shift_register << 1) | 1;
        bit
    }

    fn latch(&mut self) {
        self.shift_register = self.report();
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputPorts {
    pub ports: [Controller; 2],
    auto_read: [u16; 2],
}

impl InputPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_buttons(&mut self, port: usize, buttons: Buttons) {
        if let Some(c) = self.ports.get_mut(port) {
            c.set_buttons(buttons);
        }
    }

    pub fn write_strobe(&mut self, value: u8) {
        for c in &mut self.ports {
            c.write_strobe(value);
        }
    }

    pub fn read_serial(&mut self, port: usize) -> u8 {
        self.ports.get_mut(port).map(|c| c.read_serial()).unwrap_or(0)
    }

    /// Auto-joypad read performed by hardware at the start of VBlank.
    pub fn latch_auto_read(&mut self) {
        for (slot, c) in self.auto_read.iter_mut().zip(self.ports.iter()) {
            *slot = c.report();
        }
    }

    // $4218-$421F
    pub fn read_auto(&self, reg: u16) -> u8 {
        let idx = ((reg - 0x4218) / 2) as usize;
        let word = self.auto_read.get(idx).copied().unwrap_or(0);
        if reg & 1 == 0 {
            word as u8
        } else {
            (word >> 8) as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_bit_order() {
        let mut c = Controller::new();
        c.set_buttons(Buttons::B | Buttons::R);
        assert_eq!(c.report(), 0x8010);
    }

    #[test]
    fn test_serial_read_sequence() {
        let mut c = Controller::new();
        c.set_buttons(Buttons::B | Buttons::START);
        c.write_strobe(1);
        c.write_strobe(0);
        let bits: Vec<u8> = (0..16).map(|_| c.read_serial()).collect();
        assert_eq!(&bits[..4], &[1, 0, 0, 1]);
        assert!(bits[4..].iter().all(|&b| b == 0));
        // 読み切った後は 1
        assert_eq!(c.read_serial(), 1);
    }

    #[test]
    fn test_auto_read_registers() {
        let mut ports = InputPorts::new();
        ports.set_buttons(0, Buttons::A);
        ports.set_buttons(1, Buttons::B);
        ports.latch_auto_read();
        assert_eq!(ports.read_auto(0x4218), 0x80);
        assert_eq!(ports.read_auto(0x4219), 0x00);
        assert_eq!(ports.read_auto(0x421B), 0x80);
        assert_eq!(ports.read_auto(0x421C), 0x00);
    }
}
