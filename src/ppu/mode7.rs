//! Mode 7 affine background.

use super::background::{BgLine, BgPixel};
use super::color_math::pack;
use crate::bus::VideoMemory;

// 空の色 (0x7ACEFF) の BGR555 成分
const HORIZON_RGB5: (u16, u16, u16) = (0x7A >> 3, 0xCE >> 3, 0xFF >> 3);
const HORIZON_FADE_ROWS: i32 = 100;

/// Optional pseudo-3D extras layered over the hardware transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode7Effects {
    pub perspective: bool,
    pub horizon: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Mode7Registers {
    pub sel: u8, // M7SEL
    pub a: i16,
    pub b: i16,
    pub c: i16,
    pub d: i16,
    pub center_x: i16,
    pub center_y: i16,
    pub hofs: i16,
    pub vofs: i16,
    latch: u8,
    mult_operand: i8,
}

#[inline]
fn sign13(v: u16) -> i16 {
    ((v << 3) as i16) >> 3
}

#[inline]
fn fixed8_floor(val: i64) -> i32 {
    // Floor division by 256 for signed 8.8 fixed
    if val >= 0 {
        (val >> 8) as i32
    } else {
        -(((-val + 255) >> 8) as i32)
    }
}

impl Mode7Registers {
    fn latched(&mut self, value: u8) -> u16 {
        let word = ((value as u16) << 8) | self.latch as u16;
        self.latch = value;
        word
    }

    // $211B-$2120
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            0x1B => self.a = self.latched(value) as i16,
            0x1C => {
                self.b = self.latched(value) as i16;
                self.mult_operand = value as i8;
            }
            0x1D => self.c = self.latched(value) as i16,
            0x1E => self.d = self.latched(value) as i16,
            0x1F => self.center_x = sign13(self.latched(value)),
            0x20 => self.center_y = sign13(self.latched(value)),
            _ => {}
        }
    }

    // $210D / $210E share the Mode 7 latch
    pub fn write_hofs(&mut self, value: u8) {
        self.hofs = sign13(self.latched(value));
    }

    pub fn write_vofs(&mut self, value: u8) {
        self.vofs = sign13(self.latched(value));
    }

    /// $2134-$2136: signed 16x8 product.
    pub fn product(&self) -> i32 {
        self.a as i32 * self.mult_operand as i32
    }

    /// Screen pixel to integer world pixel, 8.8 fixed point throughout.
    pub fn world_xy(&self, sx: i32, sy: i32) -> (i32, i32) {
        let a = self.a as i64;
        let b = self.b as i64;
        let c = self.c as i64;
        let d = self.d as i64;
        let cx = self.center_x as i64;
        let cy = self.center_y as i64;
        let dx = sx as i64 + self.hofs as i64 - cx;
        let dy = sy as i64 + self.vofs as i64 - cy;
        let xw = a * dx + b * dy + (cx << 8);
        let yw = c * dx + d * dy + (cy << 8);
        (fixed8_floor(xw), fixed8_floor(yw))
    }
}

/// Perspective squeeze: 8.8 factor, 1.0 at the center row down to 0.25 at the edges.
fn perspective_factor(line: i32) -> i32 {
    let dist = (line - 112).abs();
    (256 - dist * 256 / 112).max(64)
}

fn horizon_color(world_y: i32) -> u16 {
    let fade = world_y.abs().min(HORIZON_FADE_ROWS) as u16;
    let keep = HORIZON_FADE_ROWS as u16 - fade;
    let (r, g, b) = HORIZON_RGB5;
    pack(
        r * keep / HORIZON_FADE_ROWS as u16,
        g * keep / HORIZON_FADE_ROWS as u16,
        b * keep / HORIZON_FADE_ROWS as u16,
    )
}

/// Color index at a world pixel; tilemap in even VRAM bytes, 8bpp chr in odd bytes.
fn sample(vram: &[u8], tile: u8, px: i32, py: i32) -> u8 {
    let addr = ((tile as usize * 64 + (py as usize) * 8 + px as usize) * 2 + 1) & 0xFFFF;
    vram[addr]
}

pub fn render_line(
    regs: &Mode7Registers,
    effects: Mode7Effects,
    line: u16,
    mem: &VideoMemory,
    out: &mut BgLine,
) {
    let flip_x = regs.sel & 0x01 != 0;
    let flip_y = regs.sel & 0x02 != 0;
    let over = regs.sel >> 6;
    let mut sy = if flip_y { 255 - line as i32 } else { line as i32 };
    let factor = if effects.perspective {
        perspective_factor(line as i32)
    } else {
        256
    };
    if effects.perspective {
        sy = 112 + (sy - 112) * factor / 256;
    }

    for (x, slot) in out.iter_mut().enumerate() {
        let mut sx = if flip_x { 255 - x as i32 } else { x as i32 };
        if effects.perspective {
            sx = 128 + (sx - 128) * factor / 256;
        }
        let (wx, wy) = regs.world_xy(sx, sy);

        if effects.horizon && wy < 0 {
            *slot = Some(BgPixel {
                color: horizon_color(wy),
                high: false,
            });
            continue;
        }

        let outside = !(0..1024).contains(&wx) || !(0..1024).contains(&wy);
        let index = if outside && over == 2 {
            0
        } else if outside && over == 3 {
            sample(&mem.vram, 0, wx & 7, wy & 7)
        } else {
            let (wx, wy) = (wx & 0x3FF, wy & 0x3FF);
            let map_addr = (((wy >> 3) * 128 + (wx >> 3)) * 2) as usize;
            sample(&mem.vram, mem.vram[map_addr], wx & 7, wy & 7)
        };

        *slot = if index == 0 {
            None
        } else {
            Some(BgPixel {
                color: mem.cgram_color(index),
                high: false,
            })
        };
    }
}
