// スプライト (OBJ) 描画
use super::tile_cache::TileCache;
use crate::bus::VideoMemory;

pub const SPRITE_COUNT: usize = 128;
pub const MAX_PER_LINE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjPixel {
    pub color: u16,
    pub priority: u8,
    /// Palettes 4-7 take part in color math.
    pub math: bool,
}

pub type ObjLine = [Option<ObjPixel>; 256];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteData {
    pub index: usize,
    pub x: i16,
    pub y: u8,
    pub tile: u16,
    pub palette: u8,
    pub priority: u8,
    pub flip_x: bool,
    pub flip_y: bool,
    pub large: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteSize {
    pub width: u16,
    pub height: u16,
}

const fn square(edge: u16) -> SpriteSize {
    SpriteSize {
        width: edge,
        height: edge,
    }
}

// 6/7 は縦長 (16x32, 32x64 / 16x32, 32x32)
const TALL_16X32: SpriteSize = SpriteSize {
    width: 16,
    height: 32,
};
const TALL_32X64: SpriteSize = SpriteSize {
    width: 32,
    height: 64,
};

/// OBSEL size select: (small, large).
pub fn sprite_sizes(obsel_size: u8) -> (SpriteSize, SpriteSize) {
    match obsel_size & 0x07 {
        0 => (square(8), square(16)),
        1 => (square(8), square(32)),
        2 => (square(8), square(64)),
        3 => (square(16), square(32)),
        4 => (square(16), square(64)),
        5 => (square(32), square(64)),
        6 => (TALL_16X32, TALL_32X64),
        _ => (TALL_16X32, square(32)),
    }
}

pub fn parse_sprite(oam: &[u8], index: usize) -> SpriteData {
    let base = index * 4;
    let x_lo = oam[base] as i16;
    let y = oam[base + 1];
    let tile_lo = oam[base + 2] as u16;
    let attr = oam[base + 3];

    // 高位テーブル: 2ビット/スプライト
    let high = (oam[0x200 + index / 4] >> ((index % 4) * 2)) & 0x03;
    let mut x = x_lo | (((high & 0x01) as i16) << 8);
    if x >= 256 {
        x -= 512;
    }

    SpriteData {
        index,
        x,
        y,
        tile: tile_lo | (((attr & 0x01) as u16) << 8),
        palette: (attr >> 1) & 0x07,
        priority: (attr >> 4) & 0x03,
        flip_x: attr & 0x40 != 0,
        flip_y: attr & 0x80 != 0,
        large: high & 0x02 != 0,
    }
}

/// Sprites intersecting `line`, in draw-priority order (X, then OAM index).
/// The flag reports more than `MAX_PER_LINE` candidates.
pub fn sprites_on_line(oam: &[u8], obsel_size: u8, line: u16) -> (Vec<SpriteData>, bool) {
    let (small, large) = sprite_sizes(obsel_size);
    let mut hits = Vec::new();
    for i in 0..SPRITE_COUNT {
        let s = parse_sprite(oam, i);
        let size = if s.large { large } else { small };
        let dy = (line as u8).wrapping_sub(s.y) as u16;
        if dy >= size.height {
            continue;
        }
        if s.x + size.width as i16 <= 0 {
            continue;
        }
        hits.push(s);
    }
    let overflow = hits.len() > MAX_PER_LINE;
    hits.truncate(MAX_PER_LINE);
    hits.sort_by_key(|s| (s.x, s.index));
    (hits, overflow)
}

/// Name-table address of a sub tile inside a large sprite.
fn tile_address(tile: u16, col: u16, row: u16, name_base: u16, name_gap: u16) -> u16 {
    // 16x16 タイルグリッドで折り返す
    let t = (tile & 0x100) | ((((tile >> 4) + row) & 0x0F) << 4) | ((tile + col) & 0x0F);
    let mut addr = name_base.wrapping_add((t & 0xFF) * 32);
    if t & 0x100 != 0 {
        addr = addr.wrapping_add(name_gap);
    }
    addr
}

pub struct ObjConfig {
    pub size_select: u8,
    pub name_base: u16,
    pub name_gap: u16,
}

/// Draws every sprite on `line`. Returns the range-over flag.
pub fn render_line(
    config: &ObjConfig,
    line: u16,
    mem: &VideoMemory,
    cache: &mut TileCache,
    out: &mut ObjLine,
) -> bool {
    let (small, large) = sprite_sizes(config.size_select);
    let (sprites, overflow) = sprites_on_line(&mem.oam, config.size_select, line);

    for s in &sprites {
        let size = if s.large { large } else { small };
        let mut dy = (line as u8).wrapping_sub(s.y) as u16;
        if s.flip_y {
            dy = size.height - 1 - dy;
        }
        for dx in 0..size.width {
            let sx = s.x + dx as i16;
            if !(0..256).contains(&sx) {
                continue;
            }
            let slot = &mut out[sx as usize];
            // 先に描いたスプライトが優先
            if slot.is_some() {
                continue;
            }
            let px = if s.flip_x { size.width - 1 - dx } else { dx };
            let addr = tile_address(s.tile, px / 8, dy / 8, config.name_base, config.name_gap);
            let pixels = cache.tile(&mem.vram, addr, 4);
            let pixel = pixels[((dy % 8) * 8 + px % 8) as usize];
            if pixel == 0 {
                continue;
            }
            let index = 128 + s.palette * 16 + pixel;
            *slot = Some(ObjPixel {
                color: mem.cgram_color(index),
                priority: s.priority,
                math: s.palette >= 4,
            });
        }
    }
    overflow
}
