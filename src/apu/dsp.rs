//! S-DSP: 128-byte register file, 8 voices, noise, echo and the final mix.

use bitflags::bitflags;
use std::collections::VecDeque;

use super::brr::decode_sample;
use super::echo::Echo;
use super::voice::{Voice, VoiceOutput, RATE_PERIODS};

pub const REGISTER_COUNT: usize = 128;
pub const VOICE_COUNT: usize = 8;
const EVENT_CAPACITY: usize = 64;

// ボイスレジスタ (下位ニブル)
pub const V_VOL_L: u8 = 0x0;
pub const V_VOL_R: u8 = 0x1;
pub const V_PITCH_L: u8 = 0x2;
pub const V_PITCH_H: u8 = 0x3;
pub const V_ADSR1: u8 = 0x4;
pub const V_ADSR2: u8 = 0x5;
pub const V_SRCN: u8 = 0x6;
pub const V_GAIN: u8 = 0x7;
pub const V_ENVX: u8 = 0x8;
pub const V_OUTX: u8 = 0x9;

pub const MVOL_L: u8 = 0x0C;
pub const MVOL_R: u8 = 0x1C;
pub const EVOL_L: u8 = 0x2C;
pub const EVOL_R: u8 = 0x3C;
pub const KON: u8 = 0x4C;
pub const KOFF: u8 = 0x5C;
pub const FLG: u8 = 0x6C;
pub const ENDX: u8 = 0x7C;
pub const EFB: u8 = 0x0D;
pub const PMON: u8 = 0x2D;
pub const NON: u8 = 0x3D;
pub const EON: u8 = 0x4D;
pub const DIR: u8 = 0x5D;
pub const ESA: u8 = 0x6D;
pub const EDL: u8 = 0x7D;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DspFlags: u8 {
        const RESET = 0x80;
        const MUTE = 0x40;
        const ECHO_WRITE_DISABLE = 0x20;
        const NOISE_RATE = 0x1F;
    }
}

pub struct Dsp {
    regs: [u8; REGISTER_COUNT],
    voices: [Voice; VOICE_COUNT],
    echo: Echo,
    noise_lfsr: u16,
    noise_counter: u16,
    output_rate: u32,
    completed: VecDeque<usize>,
}

impl Default for Dsp {
    fn default() -> Self {
        Self::new(super::DEFAULT_OUTPUT_RATE)
    }
}

impl Dsp {
    pub fn new(output_rate: u32) -> Self {
        let mut dsp = Self {
            regs: [0; REGISTER_COUNT],
            voices: Default::default(),
            echo: Echo::new(),
            noise_lfsr: 0x4000,
            noise_counter: 0,
            output_rate,
            completed: VecDeque::with_capacity(EVENT_CAPACITY),
        };
        dsp.reset();
        dsp
    }

    pub fn reset(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.voices.iter_mut().for_each(Voice::reset);
        self.echo.reset();
        self.noise_lfsr = 0x4000;
        self.noise_counter = 0;
        self.completed.clear();
        self.regs[FLG as usize] = 0xE0;
        self.apply_flags(0xE0);
    }

    pub fn set_output_rate(&mut self, rate: u32) {
        self.output_rate = rate.max(1);
    }

    pub fn flags(&self) -> DspFlags {
        DspFlags::from_bits_truncate(self.regs[FLG as usize])
    }

    pub fn voice(&self, index: usize) -> &Voice {
        &self.voices[index % VOICE_COUNT]
    }

    pub fn echo(&self) -> &Echo {
        &self.echo
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.regs
    }

    pub fn read(&self, addr: u8) -> u8 {
        self.regs[(addr & 0x7F) as usize]
    }

    /// Register write. `ram` is needed to fetch samples on key-on.
    pub fn write(&mut self, addr: u8, value: u8, ram: &[u8]) {
        // $80-$FF は読み出し専用ミラー
        if addr >= 0x80 {
            return;
        }
        self.regs[addr as usize] = value;

        let voice = (addr >> 4) as usize;
        match addr & 0x0F {
            V_VOL_L => self.voices[voice].volume_left = value as i8,
            V_VOL_R => self.voices[voice].volume_right = value as i8,
            V_PITCH_L | V_PITCH_H => {
                let base = (addr & 0x70) as usize;
                let pitch = u16::from_le_bytes([self.regs[base + 2], self.regs[base + 3]]);
                self.voices[voice].set_pitch(pitch);
            }
            V_ADSR1 | V_ADSR2 => {
                let base = (addr & 0x70) as usize;
                let (r4, r5) = (self.regs[base + 4], self.regs[base + 5]);
                self.voices[voice].set_adsr(r4, r5);
            }
            V_SRCN => self.voices[voice].source = value,
            V_GAIN => self.voices[voice].gain = value,
            _ => self.write_global(addr, value, ram),
        }
    }

    fn write_global(&mut self, addr: u8, value: u8, ram: &[u8]) {
        match addr {
            KON => self.key_on(value, ram),
            KOFF => {
                for (i, v) in self.voices.iter_mut().enumerate() {
                    if value & (1 << i) != 0 {
                        v.key_off();
                    }
                }
            }
            FLG => self.apply_flags(value),
            ENDX => self.regs[ENDX as usize] = 0,
            EFB => self.echo.feedback = value as i8,
            EDL => self.echo.set_delay(value),
            _ if addr & 0x0F == 0x0F => self.echo.fir[(addr >> 4) as usize] = value as i8,
            _ => {}
        }
    }

    fn apply_flags(&mut self, value: u8) {
        let flags = DspFlags::from_bits_truncate(value);
        self.echo.write_enabled = !flags.contains(DspFlags::ECHO_WRITE_DISABLE);
        if flags.contains(DspFlags::RESET) {
            self.voices.iter_mut().for_each(Voice::silence);
        }
    }

    fn key_on(&mut self, mask: u8, ram: &[u8]) {
        let dir = (self.regs[DIR as usize] as usize) << 8;
        for i in 0..VOICE_COUNT {
            if mask & (1 << i) == 0 {
                continue;
            }
            let entry = dir + self.voices[i].source as usize * 4;
            let word = |at: usize| u16::from_le_bytes([ram[at & 0xFFFF], ram[(at + 1) & 0xFFFF]]);
            let start = word(entry);
            let loop_addr = word(entry + 2);
            self.voices[i].key_on(decode_sample(ram, start, loop_addr));
            self.regs[ENDX as usize] &= !(1 << i);
            log::trace!("DSP key-on voice {} src=${:04X} loop=${:04X}", i, start, loop_addr);
        }
    }

    /// Completed-voice indices since the last call.
    pub fn take_completed(&mut self) -> Vec<usize> {
        self.completed.drain(..).collect()
    }

    fn step_noise(&mut self) -> i16 {
        let rate = (self.regs[FLG as usize] & DspFlags::NOISE_RATE.bits()) as usize;
        let period = RATE_PERIODS[rate];
        if period != 0 {
            self.noise_counter += 1;
            if self.noise_counter >= period {
                self.noise_counter = 0;
                let feedback = (self.noise_lfsr ^ (self.noise_lfsr >> 1)) & 1;
                self.noise_lfsr = (self.noise_lfsr >> 1) | (feedback << 14);
            }
        }
        (self.noise_lfsr << 1) as i16
    }

    /// Mixes one stereo output sample.
    pub fn render_sample(&mut self) -> [i16; 2] {
        let pmon = self.regs[PMON as usize] & 0xFE;
        let non = self.regs[NON as usize];
        let eon = self.regs[EON as usize];
        let noise = self.step_noise();

        let mut main = [0i32; 2];
        let mut echo_in = [0i32; 2];
        let mut prev_pitch = 0u16;
        for i in 0..VOICE_COUNT {
            let bit = 1u8 << i;
            let modulator = (pmon & bit != 0).then_some(prev_pitch);
            let noise = (non & bit != 0).then_some(noise);
            let out: VoiceOutput = self.voices[i].render(modulator, noise, self.output_rate);
            prev_pitch = self.voices[i].pitch;

            let base = i * 16;
            self.regs[base + V_ENVX as usize] = self.voices[i].envelope();
            self.regs[base + V_OUTX as usize] = (out.sample >> 8) as u8;
            if out.reached_end {
                self.regs[ENDX as usize] |= bit;
            }
            if out.completed {
                if self.completed.len() >= EVENT_CAPACITY {
                    self.completed.pop_front();
                }
                self.completed.push_back(i);
            }

            main[0] += out.left;
            main[1] += out.right;
            if eon & bit != 0 {
                echo_in[0] += out.left;
                echo_in[1] += out.right;
            }
        }

        let echo_in = echo_in.map(|v| v.clamp(i16::MIN as i32, i16::MAX as i32));
        let echo_out = self.echo.process(echo_in);

        if self.flags().intersects(DspFlags::MUTE | DspFlags::RESET) {
            return [0, 0];
        }
        let mvol = [self.regs[MVOL_L as usize] as i8, self.regs[MVOL_R as usize] as i8];
        let evol = [self.regs[EVOL_L as usize] as i8, self.regs[EVOL_R as usize] as i8];
        let mut out = [0i16; 2];
        for ch in 0..2 {
            let mixed = ((main[ch] * mvol[ch] as i32) >> 7) + ((echo_out[ch] * evol[ch] as i32) >> 7);
            out[ch] = mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
        out
    }

    /// Restores a register image (save-state load). Voices restart silent.
    pub fn load_registers(&mut self, regs: &[u8; REGISTER_COUNT]) {
        self.voices.iter_mut().for_each(Voice::reset);
        self.echo.reset();
        for (i, v) in self.voices.iter_mut().enumerate() {
            let base = i * 16;
            v.volume_left = regs[base] as i8;
            v.volume_right = regs[base + 1] as i8;
            v.set_pitch(u16::from_le_bytes([regs[base + 2], regs[base + 3]]));
            v.set_adsr(regs[base + 4], regs[base + 5]);
            v.source = regs[base + V_SRCN as usize];
            v.gain = regs[base + V_GAIN as usize];
        }
        self.echo.feedback = regs[EFB as usize] as i8;
        self.echo.set_delay(regs[EDL as usize]);
        for tap in 0..8 {
            self.echo.fir[tap] = regs[tap * 16 + 0x0F] as i8;
        }
        self.regs = *regs;
        let flags = regs[FLG as usize];
        self.apply_flags(flags);
    }
}
