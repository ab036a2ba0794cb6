// ウィンドウマスク (W12SEL/W34SEL/WOBJSEL, WH0-WH3, WBGLOG/WOBJLOG)

pub const TARGET_COUNT: usize = 6;
pub const OBJ: usize = 4;
pub const COLOR: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowBounds {
    pub left: u8,
    pub right: u8,
}

impl WindowBounds {
    /// left > right wraps around the line edge.
    pub fn contains(&self, x: u8) -> bool {
        if self.left <= self.right {
            x >= self.left && x <= self.right
        } else {
            x >= self.left || x <= self.right
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowLogic {
    #[default]
    Or,
    And,
    Xor,
    Xnor,
}

impl WindowLogic {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => WindowLogic::Or,
            1 => WindowLogic::And,
            2 => WindowLogic::Xor,
            _ => WindowLogic::Xnor,
        }
    }

    pub fn combine(self, a: bool, b: bool) -> bool {
        match self {
            WindowLogic::Or => a || b,
            WindowLogic::And => a && b,
            WindowLogic::Xor => a ^ b,
            WindowLogic::Xnor => !(a ^ b),
        }
    }
}

/// Per-target mask nibble:
/// bit0 W1 invert, bit1 W1 enable, bit2 W2 invert, bit3 W2 enable.
#[derive(Debug, Clone, Default)]
pub struct WindowSettings {
    pub window1: WindowBounds,
    pub window2: WindowBounds,
    pub masks: [u8; TARGET_COUNT],
    pub logic: [WindowLogic; TARGET_COUNT],
}

impl WindowSettings {
    pub fn new() -> Self {
        Self::default()
    }

    // $2123-$2125
    pub fn write_mask_pair(&mut self, first_target: usize, value: u8) {
        if let Some(m) = self.masks.get_mut(first_target) {
            *m = value & 0x0F;
        }
        if let Some(m) = self.masks.get_mut(first_target + 1) {
            *m = value >> 4;
        }
    }

    // $212A
    pub fn write_bg_logic(&mut self, value: u8) {
        for i in 0..4 {
            self.logic[i] = WindowLogic::from_bits(value >> (i * 2));
        }
    }

    // $212B
    pub fn write_obj_logic(&mut self, value: u8) {
        self.logic[OBJ] = WindowLogic::from_bits(value);
        self.logic[COLOR] = WindowLogic::from_bits(value >> 2);
    }

    /// True when `x` falls inside the combined window for `target`.
    pub fn covers(&self, target: usize, x: u8) -> bool {
        let Some(&mask) = self.masks.get(target) else {
            return false;
        };
        if mask == 0 {
            return false;
        }
        let w1 = (mask & 0x02 != 0).then(|| self.window1.contains(x) ^ (mask & 0x01 != 0));
        let w2 = (mask & 0x08 != 0).then(|| self.window2.contains(x) ^ (mask & 0x04 != 0));
        match (w1, w2) {
            (None, None) => false,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (Some(a), Some(b)) => self.logic[target].combine(a, b),
        }
    }

    pub fn line_mask(&self, target: usize) -> [bool; 256] {
        let mut out = [false; 256];
        if self.masks.get(target).copied().unwrap_or(0) == 0 {
            return out;
        }
        for (x, slot) in out.iter_mut().enumerate() {
            *slot = self.covers(target, x as u8);
        }
        out
    }
}

/// CGWSEL clip / prevent region: 0 never, 1 outside the color window, 2 inside, 3 always.
pub fn region_applies(region: u8, inside_color_window: bool) -> bool {
    match region & 0x03 {
        0 => false,
        1 => !inside_color_window,
        2 => inside_color_window,
        _ => true,
    }
}
