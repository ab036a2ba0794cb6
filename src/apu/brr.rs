//! BRR (bit rate reduction) sample decoding.

pub const BLOCK_LEN: usize = 9;
pub const SAMPLES_PER_BLOCK: usize = 16;
// 64KB の RAM を一周する前に打ち切る
const MAX_BLOCKS: usize = 0x10000 / BLOCK_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub shift: u8,
    pub filter: u8,
    pub loop_flag: bool,
    pub end: bool,
}

impl BlockHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            shift: byte >> 4,
            filter: (byte >> 2) & 0x03,
            loop_flag: byte & 0x02 != 0,
            end: byte & 0x01 != 0,
        }
    }
}

/// A fully decoded sample, ready for playback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrrSample {
    pub samples: Vec<i16>,
    /// Index the play position jumps back to after the end block.
    pub loop_start: usize,
    pub looping: bool,
}

impl BrrSample {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn apply_filter(filter: u8, s: i32, p1: i32, p2: i32) -> i32 {
    match filter {
        1 => s + p1 + ((-p1) >> 4),
        2 => s + (p1 << 1) + ((-(p1 * 3)) >> 5) - p2 + (p2 >> 4),
        3 => s + (p1 << 1) + ((-(p1 * 13)) >> 6) - p2 + ((p2 * 3) >> 4),
        _ => s,
    }
}

/// Decodes one 9-byte block. `history` carries the last two outputs (newest first).
pub fn decode_block(block: &[u8], history: &mut [i16; 2]) -> [i16; SAMPLES_PER_BLOCK] {
    let header = BlockHeader::parse(block[0]);
    let mut out = [0i16; SAMPLES_PER_BLOCK];
    for (i, slot) in out.iter_mut().enumerate() {
        let byte = block[1 + i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        // 4ビット符号拡張
        let mut s = ((nibble << 4) as i8 >> 4) as i32;
        s = if header.shift <= 12 {
            (s << header.shift) >> 1
        } else if s < 0 {
            -2048
        } else {
            0
        };
        let s = apply_filter(header.filter, s, history[0] as i32, history[1] as i32);
        let s = s.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        history[1] = history[0];
        history[0] = s;
        *slot = s;
    }
    out
}

/// Decodes blocks from `start` until an end block. `loop_addr` comes from the sample
/// directory and is mapped to the block it points into.
pub fn decode_sample(ram: &[u8], start: u16, loop_addr: u16) -> BrrSample {
    let mut sample = BrrSample::default();
    let mut history = [0i16; 2];
    let mut addr = start as usize;
    let mut loop_start = None;

    for _ in 0..MAX_BLOCKS {
        if addr == loop_addr as usize {
            loop_start = Some(sample.samples.len());
        }
        let mut block = [0u8; BLOCK_LEN];
        for (i, b) in block.iter_mut().enumerate() {
            *b = ram[(addr + i) & 0xFFFF];
        }
        let header = BlockHeader::parse(block[0]);
        sample
            .samples
            .extend_from_slice(&decode_block(&block, &mut history));
        if header.end {
            sample.looping = header.loop_flag;
            break;
        }
        addr = (addr + BLOCK_LEN) & 0xFFFF;
    }

    sample.loop_start = loop_start.unwrap_or(0);
    sample
}
