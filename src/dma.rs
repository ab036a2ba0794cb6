// SNES DMA and HDMA implementation
use crate::cpu_bus::CpuBus;
use crate::debug_flags;
use std::sync::atomic::AtomicU32;

pub const CHANNEL_COUNT: usize = 8;
/// Bus cycles charged per transferred byte.
pub const CYCLES_PER_BYTE: u32 = 8;

#[derive(Debug, Clone)]
pub struct DmaChannel {
    pub control: u8,      // DMA制御レジスタ ($43X0)
    pub dest_address: u8, // 転送先アドレス ($43X1) - Bバス $21xx
    pub src_address: u32, // 転送元アドレス ($43X2-$43X4)
    pub size: u16,        // 転送サイズ / HDMA間接アドレス ($43X5-$43X6)
    pub indirect_bank: u8, // HDMA間接バンク ($43X7)
    pub table_addr: u16,  // HDMAテーブル現在位置 ($43X8-$43X9)
    pub line_counter: u8, // HDMAライン残数 ($43XA)

    // HDMA状態
    pub repeat: bool,
    pub do_transfer: bool, // repeat=0 のとき最初のラインだけ転送する
    pub terminated: bool,
}

impl Default for DmaChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaChannel {
    pub fn new() -> Self {
        Self {
            // Power-on: DMAPn/BBADn = $FF, A1Tn = $FFFFFF, DASn = $FFFF
            control: 0xFF,
            dest_address: 0xFF,
            src_address: 0x00FF_FFFF,
            size: 0xFFFF,
            indirect_bank: 0xFF,
            table_addr: 0xFFFF,
            line_counter: 0xFF,
            repeat: false,
            do_transfer: false,
            terminated: false,
        }
    }

    // B→A 転送か
    pub fn is_b_to_a(&self) -> bool {
        self.control & 0x80 != 0
    }

    pub fn is_indirect(&self) -> bool {
        self.control & 0x40 != 0
    }

    // 転送単位（0-7）
    pub fn transfer_unit(&self) -> u8 {
        self.control & 0x07
    }

    // Aバスアドレスの増減: 0=増加, 2=減少, 1/3=固定
    pub fn address_step(&self) -> i32 {
        match (self.control >> 3) & 0x03 {
            0 => 1,
            2 => -1,
            _ => 0,
        }
    }

    pub fn bank(&self) -> u32 {
        self.src_address & 0xFF_0000
    }

    fn indirect_address(&self) -> u32 {
        ((self.indirect_bank as u32) << 16) | self.size as u32
    }
}

/// Bytes moved per HDMA line for each transfer unit.
pub fn transfer_len(unit: u8) -> usize {
    match unit & 0x07 {
        0 => 1,
        1 | 2 | 6 => 2,
        _ => 4,
    }
}

/// B-bus register offset for the `index`th byte of a unit.
pub fn dest_offset(unit: u8, base: u8, index: usize) -> u8 {
    let i = index as u8;
    match unit & 0x07 {
        0 | 2 | 6 => base,                          // A / A,A
        1 | 5 => base.wrapping_add(i & 1),          // A,B (,A,B)
        3 | 7 => base.wrapping_add((i >> 1) & 1),   // A,A,B,B
        _ => base.wrapping_add(i & 3),              // A,B,C,D
    }
}

static INVALID_CHANNEL_LOG: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Default)]
pub struct DmaEngine {
    pub channels: [DmaChannel; CHANNEL_COUNT],
    pub dma_enable: u8,  // $420B
    pub hdma_enable: u8, // $420C
}

impl DmaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn channel(&self, index: usize) -> Option<&DmaChannel> {
        let ch = self.channels.get(index);
        if ch.is_none() && debug_flags::first_n(&INVALID_CHANNEL_LOG, 16) {
            log::warn!("DMA channel index {} out of range", index);
        }
        ch
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut DmaChannel> {
        let ch = self.channels.get_mut(index);
        if ch.is_none() && debug_flags::first_n(&INVALID_CHANNEL_LOG, 16) {
            log::warn!("DMA channel index {} out of range", index);
        }
        ch
    }

    // DMAレジスタ書き込み（$4300-$437F）
    pub fn write_register(&mut self, addr: u16, value: u8) {
        let channel = ((addr.wrapping_sub(0x4300)) >> 4) as usize;
        let reg = addr & 0x0F;
        let Some(ch) = self.channel_mut(channel) else {
            return;
        };
        match reg {
            0x00 => ch.control = value,
            0x01 => ch.dest_address = value,
            0x02 => ch.src_address = (ch.src_address & 0xFF_FF00) | value as u32,
            0x03 => ch.src_address = (ch.src_address & 0xFF_00FF) | ((value as u32) << 8),
            0x04 => ch.src_address = (ch.src_address & 0x00_FFFF) | ((value as u32) << 16),
            0x05 => ch.size = (ch.size & 0xFF00) | value as u16,
            0x06 => ch.size = (ch.size & 0x00FF) | ((value as u16) << 8),
            0x07 => ch.indirect_bank = value,
            0x08 => ch.table_addr = (ch.table_addr & 0xFF00) | value as u16,
            0x09 => ch.table_addr = (ch.table_addr & 0x00FF) | ((value as u16) << 8),
            0x0A => ch.line_counter = value,
            _ => {}
        }
        if debug_flags::dma() {
            log::debug!("DMA ch{} reg=${:X} <- {:02X}", channel, reg, value);
        }
    }

    // DMAレジスタ読み込み
    pub fn read_register(&self, addr: u16) -> u8 {
        let channel = ((addr.wrapping_sub(0x4300)) >> 4) as usize;
        let Some(ch) = self.channels.get(channel) else {
            return 0;
        };
        match addr & 0x0F {
            0x00 => ch.control,
            0x01 => ch.dest_address,
            0x02 => ch.src_address as u8,
            0x03 => (ch.src_address >> 8) as u8,
            0x04 => (ch.src_address >> 16) as u8,
            0x05 => ch.size as u8,
            0x06 => (ch.size >> 8) as u8,
            0x07 => ch.indirect_bank,
            0x08 => ch.table_addr as u8,
            0x09 => (ch.table_addr >> 8) as u8,
            0x0A => ch.line_counter,
            _ => 0xFF,
        }
    }

    /// $420B: runs every selected channel to completion, lowest index first.
    /// Returns the bus cycles consumed.
    pub fn start_general<B: CpuBus + ?Sized>(&mut self, mask: u8, bus: &mut B) -> u32 {
        self.dma_enable = mask;
        let mut cycles = 0;
        for i in 0..CHANNEL_COUNT {
            if mask & (1 << i) != 0 {
                cycles += self.run_channel(i, bus);
            }
        }
        cycles
    }

    /// Drains one channel. Size 0 means idle: nothing moves.
    pub fn run_channel<B: CpuBus + ?Sized>(&mut self, index: usize, bus: &mut B) -> u32 {
        let Some(ch) = self.channel_mut(index) else {
            return 0;
        };
        let unit = ch.transfer_unit();
        let step = ch.address_step();
        let bank = ch.bank();
        let mut addr = ch.src_address as u16;
        let mut moved = 0usize;
        let mut cycles = 0;

        if debug_flags::dma() {
            log::debug!(
                "DMA ch{} start: src=${:06X} dest=$21{:02X} size={} unit={} dir={}",
                index,
                ch.src_address,
                ch.dest_address,
                ch.size,
                unit,
                if ch.is_b_to_a() { "B->A" } else { "A->B" }
            );
        }

        while ch.size > 0 {
            let a_addr = bank | addr as u32;
            let b_addr = 0x2100 | dest_offset(unit, ch.dest_address, moved) as u32;
            if ch.is_b_to_a() {
                let v = bus.read_u8(b_addr);
                bus.write_u8(a_addr, v);
            } else {
                let v = bus.read_u8(a_addr);
                bus.write_u8(b_addr, v);
            }
            addr = (addr as i32 + step) as u16;
            ch.size -= 1;
            moved += 1;
            cycles += CYCLES_PER_BYTE;
        }

        ch.src_address = bank | addr as u32;
        self.dma_enable &= !(1 << index);
        cycles
    }

    // $420C
    pub fn set_hdma_enable(&mut self, value: u8) {
        let newly = value & !self.hdma_enable;
        self.hdma_enable = value;
        for i in 0..CHANNEL_COUNT {
            if newly & (1 << i) != 0 {
                self.init_hdma_channel(i);
            }
        }
    }

    /// Reloads every enabled channel's table pointer; called at the top of each frame.
    pub fn hdma_frame_init(&mut self) {
        for i in 0..CHANNEL_COUNT {
            if self.hdma_enable & (1 << i) != 0 {
                self.init_hdma_channel(i);
            }
        }
    }

    fn init_hdma_channel(&mut self, index: usize) {
        let ch = &mut self.channels[index];
        ch.table_addr = ch.src_address as u16;
        ch.line_counter = 0;
        ch.repeat = false;
        ch.do_transfer = false;
        ch.terminated = false;
    }

    pub fn is_hdma_active(&self, index: usize) -> bool {
        self.channels
            .get(index)
            .map(|ch| self.hdma_enable & (1 << index) != 0 && !ch.terminated)
            .unwrap_or(false)
    }

    /// Runs one horizontal blank worth of HDMA. Returns bus cycles consumed.
    pub fn hdma_scanline<B: CpuBus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let mut cycles = 0;
        for i in 0..CHANNEL_COUNT {
            if !self.is_hdma_active(i) {
                continue;
            }
            let ch = &mut self.channels[i];
            let bank = ch.bank();

            if ch.line_counter == 0 {
                let header = bus.read_u8(bank | ch.table_addr as u32);
                ch.table_addr = ch.table_addr.wrapping_add(1);
                if header == 0 {
                    ch.terminated = true;
                    if debug_flags::dma() {
                        log::debug!("HDMA ch{} terminated", i);
                    }
                    continue;
                }
                ch.repeat = header & 0x80 != 0;
                ch.line_counter = match header & 0x7F {
                    0 => 128,
                    n => n,
                };
                if ch.is_indirect() {
                    let lo = bus.read_u8(bank | ch.table_addr as u32) as u16;
                    let hi = bus.read_u8(bank | ch.table_addr.wrapping_add(1) as u32) as u16;
                    ch.size = (hi << 8) | lo;
                    ch.table_addr = ch.table_addr.wrapping_add(2);
                }
                ch.do_transfer = true;
            }

            if ch.do_transfer {
                let unit = ch.transfer_unit();
                for k in 0..transfer_len(unit) {
                    let src = if ch.is_indirect() {
                        let a = ch.indirect_address();
                        ch.size = ch.size.wrapping_add(1);
                        a
                    } else {
                        let a = bank | ch.table_addr as u32;
                        ch.table_addr = ch.table_addr.wrapping_add(1);
                        a
                    };
                    let v = bus.read_u8(src);
                    bus.write_u8(0x2100 | dest_offset(unit, ch.dest_address, k) as u32, v);
                    cycles += CYCLES_PER_BYTE;
                }
            }

            ch.line_counter -= 1;
            ch.do_transfer = ch.repeat;
        }
        cycles
    }
}
