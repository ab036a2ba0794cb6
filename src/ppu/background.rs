use super::tile_cache::TileCache;
use crate::bus::VideoMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BgPixel {
    pub color: u16,
    pub high: bool,
}

pub type BgLine = [Option<BgPixel>; 256];

/// One background layer's register state.
#[derive(Debug, Clone, Copy, Default)]
pub struct BgLayer {
    pub tilemap_base: u16, // byte address
    pub screen_size: u8,   // 0: 32x32, 1: 64x32, 2: 32x64, 3: 64x64
    pub char_base: u16,    // byte address
    pub hscroll: u16,
    pub vscroll: u16,
    pub tile16: bool,
    pub mosaic: bool,
}

impl BgLayer {
    // BGnSC ($2107-$210A)
    pub fn write_screen(&mut self, value: u8) {
        self.tilemap_base = ((value & 0xFC) as u16) << 9;
        self.screen_size = value & 0x03;
    }

    pub fn set_char_nibble(&mut self, nibble: u8) {
        self.char_base = ((nibble & 0x0F) as u16) << 13;
    }

    fn wrap(&self) -> (u16, u16) {
        let tile_px = if self.tile16 { 16 } else { 8 };
        let w = if self.screen_size & 1 != 0 { 64 } else { 32 };
        let h = if self.screen_size & 2 != 0 { 64 } else { 32 };
        (w * tile_px, h * tile_px)
    }

    /// Tilemap entry at pixel (bg_x, bg_y) of the scrolled plane.
    fn map_entry(&self, vram: &[u8], tile_x: u16, tile_y: u16) -> u16 {
        let width_screens: u16 = if self.screen_size & 1 != 0 { 2 } else { 1 };
        let quadrant = (tile_x / 32) + (tile_y / 32) * width_screens;
        let word = (self.tilemap_base >> 1)
            .wrapping_add(quadrant * 0x400)
            .wrapping_add((tile_y % 32) * 32 + tile_x % 32)
            & 0x7FFF;
        let addr = word as usize * 2;
        u16::from_le_bytes([vram[addr], vram[addr + 1]])
    }
}

/// CGRAM index for a background pixel.
pub fn palette_index(bpp: u8, palette_base: u16, palette: u8, pixel: u8) -> u8 {
    let index = match bpp {
        2 => palette_base + palette as u16 * 4 + pixel as u16,
        4 => palette as u16 * 16 + pixel as u16,
        _ => pixel as u16,
    };
    index as u8
}

// モザイク: ブロック左上の座標へ丸める
pub fn apply_mosaic(x: u16, y: u16, size: u8, enabled: bool) -> (u16, u16) {
    if !enabled || size <= 1 {
        return (x, y);
    }
    let s = size as u16;
    ((x / s) * s, (y / s) * s)
}

/// Draws one line of a tiled layer. `palette_base` is the mode-0 per-layer offset.
#[allow(clippy::too_many_arguments)]
pub fn render_line(
    layer: &BgLayer,
    bpp: u8,
    palette_base: u16,
    line: u16,
    mosaic_size: u8,
    mem: &VideoMemory,
    cache: &mut TileCache,
    out: &mut BgLine,
) {
    let tile_px: u16 = if layer.tile16 { 16 } else { 8 };
    let (wrap_x, wrap_y) = layer.wrap();
    let tile_bytes = 8 * bpp as u16;
    let mut last: Option<(u16, [u8; 64])> = None;

    for x in 0..256u16 {
        let (mx, my) = apply_mosaic(x, line, mosaic_size, layer.mosaic);
        let bg_x = (mx + layer.hscroll) % wrap_x;
        let bg_y = (my + layer.vscroll) % wrap_y;

        let entry = layer.map_entry(&mem.vram, bg_x / tile_px, bg_y / tile_px);
        let mut tile_id = entry & 0x03FF;
        let palette = ((entry >> 10) & 0x07) as u8;
        let high = entry & 0x2000 != 0;
        let flip_x = entry & 0x4000 != 0;
        let flip_y = entry & 0x8000 != 0;

        let mut rel_x = bg_x % tile_px;
        let mut rel_y = bg_y % tile_px;
        if flip_x {
            rel_x = tile_px - 1 - rel_x;
        }
        if flip_y {
            rel_y = tile_px - 1 - rel_y;
        }
        if layer.tile16 {
            tile_id = tile_id + rel_x / 8 + (rel_y / 8) * 16;
            rel_x %= 8;
            rel_y %= 8;
        }

        let addr = layer
            .char_base
            .wrapping_add((tile_id & 0x03FF).wrapping_mul(tile_bytes));
        let pixels = match last {
            Some((a, p)) if a == addr => p,
            _ => {
                let p = cache.tile(&mem.vram, addr, bpp);
                last = Some((addr, p));
                p
            }
        };

        let pixel = pixels[(rel_y * 8 + rel_x) as usize];
        out[x as usize] = if pixel == 0 {
            None
        } else {
            let index = palette_index(bpp, palette_base, palette, pixel);
            Some(BgPixel {
                color: mem.cgram_color(index),
                high,
            })
        };
    }
}
