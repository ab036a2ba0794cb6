//! BGR555 color helpers and the CGWSEL/CGADSUB/COLDATA compositor state.

/// 5-bit channel to 8-bit.
#[inline]
pub fn expand5(c: u16) -> u8 {
    let c = c & 0x1F;
    ((c << 3) | (c >> 2)) as u8
}

#[inline]
pub fn channels(color: u16) -> (u16, u16, u16) {
    (color & 0x1F, (color >> 5) & 0x1F, (color >> 10) & 0x1F)
}

#[inline]
pub fn pack(r: u16, g: u16, b: u16) -> u16 {
    (r & 0x1F) | ((g & 0x1F) << 5) | ((b & 0x1F) << 10)
}

/// BGR555 to RGBA bytes, master brightness applied.
pub fn to_rgba(color: u16, brightness: u8) -> [u8; 4] {
    // 0 = 黒, 15 = そのまま
    let scale = brightness.min(15) as u16;
    let (r, g, b) = channels(color);
    [
        expand5(r * scale / 15),
        expand5(g * scale / 15),
        expand5(b * scale / 15),
        0xFF,
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Overflow {
    #[default]
    Clamp,
    Wrap,
}

/// 5-bit per-channel add/sub. Halving happens before the range fix-up.
pub fn blend(main: u16, other: u16, subtract: bool, half: bool, overflow: Overflow) -> u16 {
    let (r1, g1, b1) = channels(main);
    let (r2, g2, b2) = channels(other);
    let mix = |a: u16, b: u16| -> u16 {
        let mut v = if subtract {
            a as i16 - b as i16
        } else {
            a as i16 + b as i16
        };
        if half {
            v >>= 1;
        }
        match overflow {
            Overflow::Clamp => v.clamp(0, 31) as u16,
            Overflow::Wrap => (v as u16) & 0x1F,
        }
    };
    pack(mix(r1, r2), mix(g1, g2), mix(b1, b2))
}

#[derive(Debug, Clone, Default)]
pub struct ColorMath {
    pub cgwsel: u8,  // $2130
    pub cgadsub: u8, // $2131
    pub fixed: u16,  // $2132
    pub overflow: Overflow,
}

impl ColorMath {
    pub fn new(overflow: Overflow) -> Self {
        Self {
            overflow,
            ..Self::default()
        }
    }

    // COLDATA: bit7 blue, bit6 green, bit5 red, bits0-4 intensity
    pub fn write_coldata(&mut self, value: u8) {
        let v = (value & 0x1F) as u16;
        let (mut r, mut g, mut b) = channels(self.fixed);
        if value & 0x20 != 0 {
            r = v;
        }
        if value & 0x40 != 0 {
            g = v;
        }
        if value & 0x80 != 0 {
            b = v;
        }
        self.fixed = pack(r, g, b);
    }

    pub fn uses_subscreen(&self) -> bool {
        self.cgwsel & 0x02 != 0
    }

    pub fn clip_region(&self) -> u8 {
        (self.cgwsel >> 6) & 0x03
    }

    pub fn prevent_region(&self) -> u8 {
        (self.cgwsel >> 4) & 0x03
    }

    pub fn subtract(&self) -> bool {
        self.cgadsub & 0x80 != 0
    }

    pub fn half(&self) -> bool {
        self.cgadsub & 0x40 != 0
    }

    /// Bits 0-3 BG1-4, bit 4 OBJ, bit 5 backdrop.
    pub fn enabled_for(&self, target_bit: u8) -> bool {
        self.cgadsub & (1 << target_bit) != 0
    }

    pub fn apply(&self, main: u16, addend: u16, halve: bool) -> u16 {
        blend(main, addend, self.subtract(), halve && self.half(), self.overflow)
    }
}
