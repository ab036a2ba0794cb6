//! Sound subsystem: SPC700 + S-DSP on a private 64KB RAM. The main CPU only reaches it
//! through the four port latches at $2140-$2143.

pub mod brr;
pub mod dsp;
pub mod echo;
pub mod spc700;
pub mod timer;
pub mod voice;

#[cfg(test)]
mod tests;

pub use dsp::{Dsp, DspFlags};
pub use spc700::{Spc700, SpcBus, SpcSnapshot};

use crate::debug_flags;
use timer::Timer;

pub const RAM_LEN: usize = 0x10000;
pub const IPL_ROM_LEN: usize = 64;
pub const MASTER_CLOCK: u64 = 21_477_272;
pub const SPC_CLOCK: u64 = 1_024_000;
pub const DEFAULT_OUTPUT_RATE: u32 = 32000;
// 取り出されないまま溜まるのは約1秒分まで
const MAX_BUFFERED_FRAMES: usize = 48000;

const IPL_BASE: u16 = 0xFFC0;

static DEFAULT_IPL_ROM: [u8; IPL_ROM_LEN] = [
    0xcd, 0xef, 0xbd, 0xe8, 0x00, 0xc6, 0x1d, 0xd0,
    0xfc, 0x8f, 0xaa, 0xf4, 0x8f, 0xbb, 0xf5, 0x78,
    0xcc, 0xf4, 0xd0, 0xfb, 0x2f, 0x19, 0xeb, 0xf4,
    0xd0, 0xfc, 0x7e, 0xf4, 0xd0, 0x0b, 0xe4, 0xf5,
    0xcb, 0xf4, 0xd7, 0x00, 0xfc, 0xd0, 0xf3, 0xab,
    0x01, 0x10, 0xef, 0x7e, 0xf4, 0x10, 0xeb, 0xba,
    0xf6, 0xda, 0x00, 0xba, 0xf4, 0xc4, 0xf4, 0xdd,
    0x5d, 0xd0, 0xdb, 0x1f, 0x00, 0x00, 0xc0, 0xff];

/// Everything the SPC700 addresses: RAM, IPL ROM, DSP window, timers and ports.
pub struct ApuMemory {
    ram: Vec<u8>,
    ipl_rom: [u8; IPL_ROM_LEN],
    dsp: Dsp,
    timers: [Timer; 3],
    ipl_enabled: bool,
    dsp_addr: u8,

    // 2組のラッチ: CPU が書いた値を SPC が $F4-$F7 で読み、
    // SPC が $F4-$F7 に書いた値を CPU が $2140-$2143 で読む。
    cpu_to_apu: [u8; 4],
    apu_to_cpu: [u8; 4],
}

impl ApuMemory {
    fn new(output_rate: u32) -> Self {
        Self {
            ram: vec![0; RAM_LEN],
            ipl_rom: DEFAULT_IPL_ROM,
            dsp: Dsp::new(output_rate),
            timers: [Timer::new(128), Timer::new(128), Timer::new(16)],
            ipl_enabled: true,
            dsp_addr: 0,
            cpu_to_apu: [0; 4],
            apu_to_cpu: [0; 4],
        }
    }

    fn reset(&mut self) {
        self.ram.iter_mut().for_each(|b| *b = 0);
        self.ipl_rom = DEFAULT_IPL_ROM;
        self.dsp.reset();
        self.timers.iter_mut().for_each(Timer::reset);
        self.ipl_enabled = true;
        self.dsp_addr = 0;
        self.cpu_to_apu = [0; 4];
        self.apu_to_cpu = [0; 4];
    }

    fn set_control(&mut self, value: u8) {
        self.ipl_enabled = value & 0x80 != 0;
        if value & 0x10 != 0 {
            self.cpu_to_apu[0] = 0;
            self.cpu_to_apu[1] = 0;
        }
        if value & 0x20 != 0 {
            self.cpu_to_apu[2] = 0;
            self.cpu_to_apu[3] = 0;
        }
        for (i, t) in self.timers.iter_mut().enumerate() {
            t.set_enabled(value & (1 << i) != 0);
        }
    }

    fn run_timers(&mut self, cycles: u32) {
        for t in self.timers.iter_mut() {
            t.run(cycles);
        }
    }
}

impl SpcBus for ApuMemory {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x00F0 | 0x00F1 | 0x00FA..=0x00FC => 0,
            0x00F2 => self.dsp_addr,
            0x00F3 => self.dsp.read(self.dsp_addr),
            0x00F4..=0x00F7 => self.cpu_to_apu[(addr - 0xF4) as usize],
            0x00FD..=0x00FF => self.timers[(addr - 0xFD) as usize].read_counter(),
            _ if addr >= IPL_BASE && self.ipl_enabled => self.ipl_rom[(addr - IPL_BASE) as usize],
            _ => self.ram[addr as usize],
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x00F0 => log::debug!("SPC700 test register write ${:02X} ignored", value),
            0x00F1 => self.set_control(value),
            0x00F2 => self.dsp_addr = value,
            0x00F3 => self.dsp.write(self.dsp_addr, value, &self.ram),
            0x00F4..=0x00F7 => self.apu_to_cpu[(addr - 0xF4) as usize] = value,
            0x00FA..=0x00FC => self.timers[(addr - 0xFA) as usize].set_target(value),
            0x00FD..=0x00FF => {}
            // $F8/$F9 と IPL 下の RAM は普通に書ける
            _ => self.ram[addr as usize] = value,
        }
    }
}

pub struct Apu {
    spc: Spc700,
    mem: ApuMemory,
    output_rate: u32,
    // 未消化の SPC サイクル (MASTER_CLOCK 単位)
    cycle_budget: i64,
    sample_phase: u64,
    samples: Vec<i16>,
}

impl Default for Apu {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_RATE)
    }
}

impl Apu {
    pub fn new(output_rate: u32) -> Self {
        let mut apu = Self {
            spc: Spc700::new(),
            mem: ApuMemory::new(output_rate),
            output_rate: output_rate.max(1),
            cycle_budget: 0,
            sample_phase: 0,
            samples: Vec::new(),
        };
        apu.reset();
        apu
    }

    pub fn reset(&mut self) {
        self.mem.reset();
        self.mem.dsp.set_output_rate(self.output_rate);
        self.spc.reset(&mut self.mem);
        self.cycle_budget = 0;
        self.sample_phase = 0;
        self.samples.clear();
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn set_output_rate(&mut self, rate: u32) {
        self.output_rate = rate.max(1);
        self.mem.dsp.set_output_rate(self.output_rate);
    }

    /// S-CPU write to $2140-$2143.
    pub fn cpu_write_port(&mut self, port: u8, value: u8) {
        let p = (port & 0x03) as usize;
        if debug_flags::apu() {
            log::trace!("APUIO{} <- ${:02X}", p, value);
        }
        self.mem.cpu_to_apu[p] = value;
    }

    /// S-CPU read of $2140-$2143.
    pub fn cpu_read_port(&self, port: u8) -> u8 {
        self.mem.apu_to_cpu[(port & 0x03) as usize]
    }

    /// Advances the sound side by `master_cycles` of main-clock time and emits one
    /// stereo sample per `MASTER_CLOCK / output_rate` cycles.
    pub fn process(&mut self, master_cycles: u32) {
        self.cycle_budget += master_cycles as i64 * SPC_CLOCK as i64;
        while self.cycle_budget >= MASTER_CLOCK as i64 {
            let cycles = self.spc.step(&mut self.mem);
            self.mem.run_timers(cycles);
            self.cycle_budget -= cycles as i64 * MASTER_CLOCK as i64;
        }

        self.sample_phase += master_cycles as u64 * self.output_rate as u64;
        while self.sample_phase >= MASTER_CLOCK {
            self.sample_phase -= MASTER_CLOCK;
            let frame = self.mem.dsp.render_sample();
            self.samples.extend_from_slice(&frame);
        }
        if self.samples.len() > MAX_BUFFERED_FRAMES * 2 {
            let excess = self.samples.len() - MAX_BUFFERED_FRAMES * 2;
            self.samples.drain(..excess);
        }
    }

    /// Interleaved L/R samples produced since the last call.
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    pub fn buffered_frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Voices that finished (release hit zero or a one-shot sample ended).
    pub fn take_voice_events(&mut self) -> Vec<usize> {
        self.mem.dsp.take_completed()
    }

    pub fn spc(&self) -> &Spc700 {
        &self.spc
    }

    pub fn dsp(&self) -> &Dsp {
        &self.mem.dsp
    }

    pub fn ram(&self) -> &[u8] {
        &self.mem.ram
    }

    pub fn is_ipl_enabled(&self) -> bool {
        self.mem.ipl_enabled
    }

    /// Direct DSP register write, as if through $F2/$F3.
    pub fn write_dsp(&mut self, addr: u8, value: u8) {
        self.mem.dsp.write(addr, value, &self.mem.ram);
    }

    pub fn read_dsp(&self, addr: u8) -> u8 {
        self.mem.dsp.read(addr)
    }

    /// Raw RAM write that bypasses the I/O page (loaders, tests).
    pub fn poke_ram(&mut self, addr: u16, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.mem.ram[(addr as usize + i) & 0xFFFF] = *b;
        }
    }

    /// Reinstates saved RAM, DSP registers and SPC700 registers.
    pub fn restore(&mut self, ram: &[u8], dsp_regs: &[u8; dsp::REGISTER_COUNT], spc: &SpcSnapshot) {
        let n = ram.len().min(RAM_LEN);
        self.mem.ram[..n].copy_from_slice(&ram[..n]);
        self.mem.dsp.load_registers(dsp_regs);
        self.spc.restore(spc);
        self.cycle_budget = 0;
        self.sample_phase = 0;
        self.samples.clear();
    }
}
