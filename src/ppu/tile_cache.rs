//! Decoded 8x8 tile cache keyed by VRAM byte address and bit depth.

use std::collections::HashMap;

pub const CAPACITY: usize = 1024;
/// Share of the entries dropped when the cache is full.
const EVICT_DIVISOR: usize = 4;

pub type TilePixels = [u8; 64];

#[derive(Debug, Clone)]
struct CachedTile {
    pixels: TilePixels,
    stamp: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TileCache {
    entries: HashMap<(u16, u8), CachedTile>,
    clock: u64,
    hits: u64,
    misses: u64,
}

/// Bitplane decode. Plane pair `p` lives at `addr + p*16`, two bytes per row.
pub fn decode_tile(vram: &[u8], addr: u16, bpp: u8) -> TilePixels {
    let mut pixels = [0u8; 64];
    let pairs = (bpp / 2) as u16;
    for row in 0..8u16 {
        for pair in 0..pairs {
            let base = addr.wrapping_add(pair * 16 + row * 2) as usize;
            let lo = vram.get(base).copied().unwrap_or(0);
            let hi = vram.get(base + 1).copied().unwrap_or(0);
            for col in 0..8 {
                let bit = 7 - col;
                let plane_bits = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
                pixels[(row as usize) * 8 + col] |= plane_bits << (pair * 2);
            }
        }
    }
    pixels
}

impl TileCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::with_capacity(CAPACITY),
            ..Self::default()
        }
    }

    pub fn tile(&mut self, vram: &[u8], addr: u16, bpp: u8) -> TilePixels {
        self.clock += 1;
        let stamp = self.clock;
        if let Some(hit) = self.entries.get_mut(&(addr, bpp)) {
            hit.stamp = stamp;
            self.hits += 1;
            return hit.pixels;
        }
        self.misses += 1;
        if self.entries.len() >= CAPACITY {
            self.evict_oldest();
        }
        let pixels = decode_tile(vram, addr, bpp);
        self.entries.insert((addr, bpp), CachedTile { pixels, stamp });
        pixels
    }

    fn evict_oldest(&mut self) {
        let mut stamps: Vec<((u16, u8), u64)> =
            self.entries.iter().map(|(k, v)| (*k, v.stamp)).collect();
        stamps.sort_unstable_by_key(|(_, stamp)| *stamp);
        for (key, _) in stamps.into_iter().take(CAPACITY / EVICT_DIVISOR) {
            self.entries.remove(&key);
        }
    }

    /// A VRAM byte changed: drop every tile whose bytes cover it.
    pub fn invalidate(&mut self, byte_addr: u16) {
        if self.entries.is_empty() {
            return;
        }
        for bpp in [2u8, 4, 8] {
            let span = 8 * bpp as u16;
            self.entries.remove(&(byte_addr & !(span - 1), bpp));
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: u16, bpp: u8) -> bool {
        self.entries.contains_key(&(addr, bpp))
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
