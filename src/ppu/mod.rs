//! Picture processing unit: $2100-$213F registers and the per-scanline pipeline.
//!
//! VRAM/OAM/CGRAM live in the bus-owned [`VideoMemory`] arena. Register writes
//! borrow it mutably; rendering only ever sees a shared reference.

pub mod background;
pub mod color_math;
pub mod mode7;
pub mod sprites;
pub mod tile_cache;
pub mod window;


use crate::bus::VideoMemory;
use crate::debug_flags;
use background::{BgLayer, BgLine};
use color_math::{ColorMath, Overflow};
use mode7::{Mode7Effects, Mode7Registers};
use sprites::{ObjConfig, ObjLine};
use tile_cache::TileCache;
use window::WindowSettings;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 224;
pub const SCANLINES_PER_FRAME: u16 = 262;
pub const FRAME_BUFFER_LEN: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Bg(usize, bool),
    Obj(u8),
}

use Slot::{Bg, Obj};

// 前面から背面へ
const MODE0_ORDER: [Slot; 12] = [
    Obj(3), Bg(0, true), Bg(1, true), Obj(2), Bg(0, false), Bg(1, false),
    Obj(1), Bg(2, true), Bg(3, true), Obj(0), Bg(2, false), Bg(3, false),
];
const MODE1_ORDER: [Slot; 10] = [
    Obj(3), Bg(0, true), Bg(1, true), Obj(2), Bg(0, false), Bg(1, false),
    Obj(1), Bg(2, true), Obj(0), Bg(2, false),
];
const MODE1_BG3_FRONT_ORDER: [Slot; 10] = [
    Bg(2, true), Obj(3), Bg(0, true), Bg(1, true), Obj(2), Bg(0, false),
    Bg(1, false), Obj(1), Obj(0), Bg(2, false),
];
const MODE2_6_ORDER: [Slot; 8] = [
    Obj(3), Bg(0, true), Obj(2), Bg(1, true), Obj(1), Bg(0, false), Obj(0), Bg(1, false),
];
const MODE7_ORDER: [Slot; 5] = [Obj(3), Obj(2), Obj(1), Bg(0, false), Obj(0)];

fn priority_order(mode: u8, bg3_front: bool) -> &'static [Slot] {
    match mode {
        0 => &MODE0_ORDER,
        1 if bg3_front => &MODE1_BG3_FRONT_ORDER,
        1 => &MODE1_ORDER,
        7 => &MODE7_ORDER,
        _ => &MODE2_6_ORDER,
    }
}

/// Bits per pixel of a tiled layer in a given mode; None when the layer is absent.
pub fn layer_bpp(mode: u8, layer: usize) -> Option<u8> {
    match (mode, layer) {
        (0, 0..=3) => Some(2),
        (1, 0 | 1) | (2, 0 | 1) | (5, 0) | (6, 0) => Some(4),
        (1, 2) | (4, 1) | (5, 1) => Some(2),
        (3, 0) | (4, 0) => Some(8),
        (3, 1) => Some(4),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Bg(usize),
    Obj { math: bool },
    Backdrop,
}

#[derive(Debug, Clone, Copy)]
struct ScreenPixel {
    color: u16,
    source: Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Main,
    Sub,
}

pub struct Ppu {
    // INIDISP
    forced_blank: bool,
    brightness: u8,

    // OBSEL / OAM port
    obj_size: u8,
    obj_name_base: u16,
    obj_name_gap: u16,
    oam_addr: u16,
    oam_latch: u8,

    bg_mode: u8,
    bg3_priority: bool,
    bgs: [BgLayer; 4],
    mosaic_size: u8,
    scroll_latch: u8,
    hscroll_latch: u8,

    // VRAM port
    vram_addr: u16,
    vram_increment: u16,
    vram_remap: u8,
    vram_inc_on_high: bool,
    vram_read_buffer: u16,

    mode7: Mode7Registers,
    mode7_effects: Mode7Effects,

    // CGRAM port
    cgram_addr: u8,
    cgram_latch: Option<u8>,
    cgram_read_high: bool,

    window: WindowSettings,
    main_layers: u8,
    sub_layers: u8,
    main_window_layers: u8,
    sub_window_layers: u8,
    color_math: ColorMath,
    setini: u8,

    scanline: u16,
    hv_latch: u16,
    range_over: bool,
    frame_buffer: Vec<u8>,
    tile_cache: TileCache,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            forced_blank: true,
            brightness: 0,
            obj_size: 0,
            obj_name_base: 0,
            obj_name_gap: 0x2000,
            oam_addr: 0,
            oam_latch: 0,
            bg_mode: 0,
            bg3_priority: false,
            bgs: [BgLayer::default(); 4],
            mosaic_size: 1,
            scroll_latch: 0,
            hscroll_latch: 0,
            vram_addr: 0,
            vram_increment: 1,
            vram_remap: 0,
            vram_inc_on_high: false,
            vram_read_buffer: 0,
            mode7: Mode7Registers::default(),
            mode7_effects: Mode7Effects::default(),
            cgram_addr: 0,
            cgram_latch: None,
            cgram_read_high: false,
            window: WindowSettings::new(),
            main_layers: 0,
            sub_layers: 0,
            main_window_layers: 0,
            sub_window_layers: 0,
            color_math: ColorMath::new(Overflow::Clamp),
            setini: 0,
            scanline: 0,
            hv_latch: 0,
            range_over: false,
            frame_buffer: vec![0; FRAME_BUFFER_LEN],
            tile_cache: TileCache::new(),
        }
    }

    /// Power-on register state. Presentation options survive.
    pub fn reset(&mut self) {
        let effects = self.mode7_effects;
        let overflow = self.color_math.overflow;
        *self = Self::new();
        self.mode7_effects = effects;
        self.color_math.overflow = overflow;
    }

    pub fn set_mode7_effects(&mut self, effects: Mode7Effects) {
        self.mode7_effects = effects;
    }

    pub fn set_color_clamp(&mut self, clamp: bool) {
        self.color_math.overflow = if clamp {
            Overflow::Clamp
        } else {
            Overflow::Wrap
        };
    }

    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn bg_mode(&self) -> u8 {
        self.bg_mode
    }

    pub fn is_forced_blank(&self) -> bool {
        self.forced_blank
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tile_cache
    }

    /// VRAM was replaced wholesale (save-state load).
    pub fn invalidate_tile_cache(&mut self) {
        self.tile_cache.clear();
    }

    fn remapped_vram_word(&self) -> u16 {
        let a = self.vram_addr;
        let word = match self.vram_remap {
            0 => a,
            1 => (a & 0xFF00) | ((a & 0x001F) << 3) | ((a >> 5) & 0x07),
            2 => (a & 0xFE00) | ((a & 0x003F) << 3) | ((a >> 6) & 0x07),
            _ => (a & 0xFC00) | ((a & 0x007F) << 3) | ((a >> 7) & 0x07),
        };
        word & 0x7FFF
    }

    fn prefetch_vram(&mut self, mem: &VideoMemory) {
        let i = self.remapped_vram_word() as usize * 2;
        self.vram_read_buffer = u16::from_le_bytes([mem.vram[i], mem.vram[i + 1]]);
    }

    fn write_vram(&mut self, mem: &mut VideoMemory, high: bool, value: u8) {
        let i = self.remapped_vram_word() as usize * 2 + high as usize;
        mem.vram[i] = value;
        self.tile_cache.invalidate(i as u16);
        if high == self.vram_inc_on_high {
            self.vram_addr = self.vram_addr.wrapping_add(self.vram_increment);
        }
    }

    fn write_bg_scroll(&mut self, layer: usize, vertical: bool, value: u8) {
        let bg = &mut self.bgs[layer];
        if vertical {
            bg.vscroll = (((value as u16) << 8) | self.scroll_latch as u16) & 0x03FF;
        } else {
            bg.hscroll = (((value as u16) << 8)
                | (self.scroll_latch & !0x07) as u16
                | (self.hscroll_latch & 0x07) as u16)
                & 0x03FF;
            self.hscroll_latch = value;
        }
        self.scroll_latch = value;
    }

    pub fn write_register(&mut self, addr: u16, value: u8, mem: &mut VideoMemory) {
        if debug_flags::ppu_write() {
            log::trace!("PPU ${:04X} <- {:02X}", addr, value);
        }
        match addr & 0xFF {
            0x00 => {
                self.forced_blank = value & 0x80 != 0;
                self.brightness = value & 0x0F;
            }
            0x01 => {
                self.obj_size = value >> 5;
                self.obj_name_base = ((value & 0x07) as u16) << 14;
                self.obj_name_gap = (((value >> 3) & 0x03) as u16 + 1) << 13;
            }
            0x02 => self.oam_addr = (self.oam_addr & 0x200) | ((value as u16) << 1),
            0x03 => self.oam_addr = (self.oam_addr & 0x1FE) | (((value & 0x01) as u16) << 9),
            0x04 => {
                let a = self.oam_addr as usize;
                if a < 0x200 {
                    if a & 1 == 0 {
                        self.oam_latch = value;
                    } else {
                        mem.oam[a - 1] = self.oam_latch;
                        mem.oam[a] = value;
                    }
                } else {
                    mem.oam[0x200 | (a & 0x1F)] = value;
                }
                self.oam_addr = (self.oam_addr + 1) % 0x220;
            }
            0x05 => {
                self.bg_mode = value & 0x07;
                self.bg3_priority = value & 0x08 != 0;
                for (i, bg) in self.bgs.iter_mut().enumerate() {
                    bg.tile16 = value & (0x10 << i) != 0;
                }
            }
            0x06 => {
                self.mosaic_size = (value >> 4) + 1;
                for (i, bg) in self.bgs.iter_mut().enumerate() {
                    bg.mosaic = value & (1 << i) != 0;
                }
            }
            0x07..=0x0A => self.bgs[(addr & 0xFF) as usize - 0x07].write_screen(value),
            0x0B => {
                self.bgs[0].set_char_nibble(value);
                self.bgs[1].set_char_nibble(value >> 4);
            }
            0x0C => {
                self.bgs[2].set_char_nibble(value);
                self.bgs[3].set_char_nibble(value >> 4);
            }
            0x0D => {
                self.write_bg_scroll(0, false, value);
                self.mode7.write_hofs(value);
            }
            0x0E => {
                self.write_bg_scroll(0, true, value);
                self.mode7.write_vofs(value);
            }
            0x0F..=0x14 => {
                let r = (addr & 0xFF) as usize - 0x0F;
                self.write_bg_scroll(1 + r / 2, r % 2 == 1, value);
            }
            0x15 => {
                self.vram_increment = match value & 0x03 {
                    0 => 1,
                    1 => 32,
                    _ => 128,
                };
                self.vram_remap = (value >> 2) & 0x03;
                self.vram_inc_on_high = value & 0x80 != 0;
            }
            0x16 => {
                self.vram_addr = (self.vram_addr & 0xFF00) | value as u16;
                self.prefetch_vram(mem);
            }
            0x17 => {
                self.vram_addr = (self.vram_addr & 0x00FF) | ((value as u16) << 8);
                self.prefetch_vram(mem);
            }
            0x18 => self.write_vram(mem, false, value),
            0x19 => self.write_vram(mem, true, value),
            0x1A => self.mode7.sel = value,
            0x1B..=0x20 => self.mode7.write((addr & 0xFF) as u8, value),
            0x21 => {
                self.cgram_addr = value;
                self.cgram_latch = None;
                self.cgram_read_high = false;
            }
            0x22 => match self.cgram_latch.take() {
                None => self.cgram_latch = Some(value),
                Some(lo) => {
                    let i = self.cgram_addr as usize * 2;
                    mem.cgram[i] = lo;
                    mem.cgram[i + 1] = value & 0x7F;
                    self.cgram_addr = self.cgram_addr.wrapping_add(1);
                }
            },
            0x23 => self.window.write_mask_pair(0, value),
            0x24 => self.window.write_mask_pair(2, value),
            0x25 => self.window.write_mask_pair(window::OBJ, value),
            0x26 => self.window.window1.left = value,
            0x27 => self.window.window1.right = value,
            0x28 => self.window.window2.left = value,
            0x29 => self.window.window2.right = value,
            0x2A => self.window.write_bg_logic(value),
            0x2B => self.window.write_obj_logic(value),
            0x2C => self.main_layers = value & 0x1F,
            0x2D => self.sub_layers = value & 0x1F,
            0x2E => self.main_window_layers = value & 0x1F,
            0x2F => self.sub_window_layers = value & 0x1F,
            0x30 => self.color_math.cgwsel = value,
            0x31 => self.color_math.cgadsub = value,
            0x32 => self.color_math.write_coldata(value),
            0x33 => self.setini = value,
            _ => {}
        }
    }

    pub fn read_register(&mut self, addr: u16, mem: &VideoMemory) -> u8 {
        match addr & 0xFF {
            0x34..=0x36 => {
                let shift = ((addr & 0xFF) - 0x34) * 8;
                (self.mode7.product() >> shift) as u8
            }
            0x37 => {
                self.hv_latch = self.scanline;
                0
            }
            0x38 => {
                let v = mem.oam[self.oam_addr as usize];
                self.oam_addr = (self.oam_addr + 1) % 0x220;
                v
            }
            0x39 | 0x3A => {
                let high = addr & 0xFF == 0x3A;
                let [lo, hi] = self.vram_read_buffer.to_le_bytes();
                let v = if high { hi } else { lo };
                if high == self.vram_inc_on_high {
                    self.vram_addr = self.vram_addr.wrapping_add(self.vram_increment);
                    self.prefetch_vram(mem);
                }
                v
            }
            0x3B => {
                let i = self.cgram_addr as usize * 2;
                if self.cgram_read_high {
                    self.cgram_read_high = false;
                    self.cgram_addr = self.cgram_addr.wrapping_add(1);
                    mem.cgram[i + 1] & 0x7F
                } else {
                    self.cgram_read_high = true;
                    mem.cgram[i]
                }
            }
            0x3C => 0,
            0x3D => self.hv_latch as u8,
            0x3E => 0x01 | if self.range_over { 0x40 } else { 0 },
            0x3F => 0x03,
            _ => 0,
        }
    }

    fn layer_visible(&self, screen: Screen, bit: usize, x: usize, masks: &[[bool; 256]; 6]) -> bool {
        let (layers, windowed) = match screen {
            Screen::Main => (self.main_layers, self.main_window_layers),
            Screen::Sub => (self.sub_layers, self.sub_window_layers),
        };
        if layers & (1 << bit) == 0 {
            return false;
        }
        !(windowed & (1 << bit) != 0 && masks[bit][x])
    }

    fn pick(
        &self,
        screen: Screen,
        x: usize,
        bg: &[BgLine; 4],
        obj: &ObjLine,
        masks: &[[bool; 256]; 6],
    ) -> Option<ScreenPixel> {
        for slot in priority_order(self.bg_mode, self.bg3_priority) {
            match *slot {
                Slot::Bg(i, high) => {
                    if !self.layer_visible(screen, i, x, masks) {
                        continue;
                    }
                    if let Some(p) = bg[i][x] {
                        if p.high == high {
                            return Some(ScreenPixel {
                                color: p.color,
                                source: Source::Bg(i),
                            });
                        }
                    }
                }
                Slot::Obj(prio) => {
                    if !self.layer_visible(screen, window::OBJ, x, masks) {
                        continue;
                    }
                    if let Some(p) = obj[x] {
                        if p.priority == prio {
                            return Some(ScreenPixel {
                                color: p.color,
                                source: Source::Obj { math: p.math },
                            });
                        }
                    }
                }
            }
        }
        None
    }

    fn math_enabled_for(&self, source: Source) -> bool {
        match source {
            Source::Bg(i) => self.color_math.enabled_for(i as u8),
            Source::Obj { math } => math && self.color_math.enabled_for(4),
            Source::Backdrop => self.color_math.enabled_for(5),
        }
    }

    /// Renders one visible line into the frame buffer. Lines past 223 only advance the counter.
    pub fn render_scanline(&mut self, line: u16, mem: &VideoMemory) {
        self.scanline = line % SCANLINES_PER_FRAME;
        let y = self.scanline as usize;
        if y >= SCREEN_HEIGHT {
            return;
        }
        if self.forced_blank {
            let row = &mut self.frame_buffer[y * SCREEN_WIDTH * 4..(y + 1) * SCREEN_WIDTH * 4];
            for px in row.chunks_exact_mut(4) {
                px.copy_from_slice(&[0, 0, 0, 0xFF]);
            }
            return;
        }

        let mut bg: [BgLine; 4] = [[None; 256]; 4];
        if self.bg_mode == 7 {
            mode7::render_line(&self.mode7, self.mode7_effects, line, mem, &mut bg[0]);
        } else {
            for (i, out) in bg.iter_mut().enumerate() {
                let Some(bpp) = layer_bpp(self.bg_mode, i) else {
                    continue;
                };
                let palette_base = if self.bg_mode == 0 { i as u16 * 32 } else { 0 };
                background::render_line(
                    &self.bgs[i],
                    bpp,
                    palette_base,
                    line,
                    self.mosaic_size,
                    mem,
                    &mut self.tile_cache,
                    out,
                );
            }
        }

        let mut obj: ObjLine = [None; 256];
        let obj_config = ObjConfig {
            size_select: self.obj_size,
            name_base: self.obj_name_base,
            name_gap: self.obj_name_gap,
        };
        self.range_over = sprites::render_line(&obj_config, line, mem, &mut self.tile_cache, &mut obj);

        let mut masks = [[false; 256]; 6];
        for (target, mask) in masks.iter_mut().enumerate() {
            *mask = self.window.line_mask(target);
        }

        let backdrop = mem.cgram_color(0);
        let math = &self.color_math;
        let mut line_colors = [0u16; 256];
        for (x, out) in line_colors.iter_mut().enumerate() {
            let main = self.pick(Screen::Main, x, &bg, &obj, &masks).unwrap_or(ScreenPixel {
                color: backdrop,
                source: Source::Backdrop,
            });
            let in_color_window = masks[window::COLOR][x];
            let mut color = main.color;
            if window::region_applies(math.clip_region(), in_color_window) {
                color = 0;
            }
            if !window::region_applies(math.prevent_region(), in_color_window)
                && self.math_enabled_for(main.source)
            {
                let (addend, halve) = if math.uses_subscreen() {
                    match self.pick(Screen::Sub, x, &bg, &obj, &masks) {
                        Some(sub) => (sub.color, true),
                        None => (math.fixed, false),
                    }
                } else {
                    (math.fixed, true)
                };
                color = math.apply(color, addend, halve);
            }
            *out = color;
        }

        let brightness = self.brightness;
        let row = &mut self.frame_buffer[y * SCREEN_WIDTH * 4..(y + 1) * SCREEN_WIDTH * 4];
        for (px, color) in row.chunks_exact_mut(4).zip(line_colors.iter()) {
            px.copy_from_slice(&color_math::to_rgba(*color, brightness));
        }
    }
}
