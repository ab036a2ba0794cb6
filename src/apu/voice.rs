//! One DSP voice: sample playback, pitch stepping, and the envelope generator.

use super::brr::BrrSample;

pub const ENVELOPE_MAX: u8 = 127;
/// Pitch value that plays a sample at its recorded rate (4.12 fixed point).
pub const PITCH_UNITY: u32 = 0x1000;
pub const NATIVE_RATE: u32 = 32000;

// 周期 (サンプル数)。0 は停止
pub(crate) const RATE_PERIODS: [u16; 32] = [
    0, 2048, 1536, 1280, 1024, 768, 640, 512, 384, 320, 256, 192, 160, 128, 96, 80, 64, 48, 40,
    32, 24, 20, 16, 12, 10, 8, 6, 5, 4, 3, 2, 1,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    Attack,
    Decay,
    Sustain,
    /// ADSR off: the GAIN register owns the level until key-off.
    Gain,
    Release,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Adsr {
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
}

impl Adsr {
    /// Register pair x4/x5: x4 = E AAA -DDD, x5 = SSSS RRRR.
    pub fn from_registers(reg4: u8, reg5: u8) -> Self {
        Self {
            attack: (reg4 >> 4) & 0x07,
            decay: reg4 & 0x07,
            sustain: reg5 >> 4,
            release: reg5 & 0x0F,
        }
    }

    pub fn sustain_level(&self) -> u8 {
        (self.sustain + 1) * 8 - 1
    }

    fn attack_rate(&self) -> usize {
        self.attack as usize * 4 + 3
    }

    fn decay_rate(&self) -> usize {
        self.decay as usize * 2 + 16
    }

    fn release_rate(&self) -> usize {
        self.release as usize * 2 + 1
    }
}

/// Per-sample result handed back to the mixer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceOutput {
    pub left: i32,
    pub right: i32,
    /// Post-envelope sample, before panning.
    pub sample: i32,
    /// The end block was passed this sample.
    pub reached_end: bool,
    /// The voice shut itself off this sample.
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct Voice {
    pub volume_left: i8,
    pub volume_right: i8,
    pub pitch: u16,
    pub adsr: Adsr,
    pub adsr_enabled: bool,
    pub gain: u8,
    pub source: u8,
    level: u8,
    phase: EnvelopePhase,
    rate_counter: u16,
    position: u32,
    sample: BrrSample,
    enabled: bool,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    pub fn new() -> Self {
        Self {
            volume_left: 0,
            volume_right: 0,
            pitch: 0,
            adsr: Adsr::default(),
            adsr_enabled: false,
            gain: 0,
            source: 0,
            level: 0,
            phase: EnvelopePhase::Release,
            rate_counter: 0,
            position: 0,
            sample: BrrSample::default(),
            enabled: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_pitch(&mut self, pitch: u16) {
        self.pitch = pitch & 0x3FFF;
    }

    /// Flipping x4 bit 7 mid-note hands the level between the ADSR machine and GAIN.
    pub fn set_adsr(&mut self, reg4: u8, reg5: u8) {
        self.adsr_enabled = reg4 & 0x80 != 0;
        self.adsr = Adsr::from_registers(reg4, reg5);
        if !self.enabled || self.phase == EnvelopePhase::Release {
            return;
        }
        let gain_owned = self.phase == EnvelopePhase::Gain;
        if self.adsr_enabled == gain_owned {
            self.phase = if self.adsr_enabled {
                EnvelopePhase::Attack
            } else {
                EnvelopePhase::Gain
            };
            self.rate_counter = 0;
        }
    }

    pub fn envelope(&self) -> u8 {
        self.level
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn key_on(&mut self, sample: BrrSample) {
        self.sample = sample;
        self.position = 0;
        self.level = 0;
        self.rate_counter = 0;
        self.phase = if self.adsr_enabled {
            EnvelopePhase::Attack
        } else {
            EnvelopePhase::Gain
        };
        self.enabled = true;
    }

    pub fn key_off(&mut self) {
        if self.enabled {
            self.phase = EnvelopePhase::Release;
            self.rate_counter = 0;
        }
    }

    /// Immediate silence (FLG soft reset).
    pub fn silence(&mut self) {
        self.level = 0;
        self.enabled = false;
        self.phase = EnvelopePhase::Release;
    }

    fn interpolate(&self) -> i32 {
        let len = self.sample.len();
        if len == 0 {
            return 0;
        }
        let index = (self.position >> 12) as usize;
        let frac = (self.position & 0xFFF) as i32;
        let s0 = self.sample.samples[index.min(len - 1)] as i32;
        let s1 = if index + 1 < len {
            self.sample.samples[index + 1] as i32
        } else if self.sample.looping {
            self.sample.samples[self.sample.loop_start.min(len - 1)] as i32
        } else {
            0
        };
        s0 + (((s1 - s0) * frac) >> 12)
    }

    /// Moves the play position; returns (passed end block, must stop).
    fn advance(&mut self, step: u32) -> (bool, bool) {
        let len = self.sample.len() as u32;
        if len == 0 {
            return (true, true);
        }
        self.position = self.position.wrapping_add(step);
        let index = self.position >> 12;
        if index < len {
            return (false, false);
        }
        if !self.sample.looping {
            return (true, true);
        }
        let loop_start = (self.sample.loop_start as u32).min(len - 1);
        let loop_len = len - loop_start;
        let wrapped = loop_start + (index - loop_start) % loop_len;
        self.position = (wrapped << 12) | (self.position & 0xFFF);
        (true, false)
    }

    fn tick_rate(&mut self, rate: usize) -> bool {
        let period = RATE_PERIODS[rate.min(31)];
        if period == 0 {
            return false;
        }
        self.rate_counter += 1;
        if self.rate_counter >= period {
            self.rate_counter = 0;
            true
        } else {
            false
        }
    }

    fn exp_decrease(level: u8) -> u8 {
        level.saturating_sub(((level.saturating_sub(1)) >> 4) + 1)
    }

    /// One envelope step; returns true when release ran out.
    fn update_envelope(&mut self) -> bool {
        match self.phase {
            EnvelopePhase::Release => {
                if self.tick_rate(self.adsr.release_rate()) {
                    self.level = self.level.saturating_sub(1);
                }
                return self.level == 0;
            }
            EnvelopePhase::Gain => self.update_gain(),
            EnvelopePhase::Attack => {
                let rate = self.adsr.attack_rate();
                if self.tick_rate(rate) {
                    let step = if rate >= 31 { 64 } else { 2 };
                    self.level = (self.level + step).min(ENVELOPE_MAX);
                }
                if self.level >= ENVELOPE_MAX {
                    self.phase = EnvelopePhase::Decay;
                    self.rate_counter = 0;
                }
            }
            EnvelopePhase::Decay => {
                let sustain = self.adsr.sustain_level();
                if self.tick_rate(self.adsr.decay_rate()) {
                    self.level = Self::exp_decrease(self.level).max(sustain);
                }
                if self.level <= sustain {
                    self.phase = EnvelopePhase::Sustain;
                }
            }
            EnvelopePhase::Sustain => {}
        }
        false
    }

    // GAIN: bit7=0 で直接値、1 で増減モード
    fn update_gain(&mut self) {
        if self.gain & 0x80 == 0 {
            self.level = self.gain & 0x7F;
            return;
        }
        if !self.tick_rate((self.gain & 0x1F) as usize) {
            return;
        }
        self.level = match (self.gain >> 5) & 0x03 {
            0 => self.level.saturating_sub(2),
            1 => Self::exp_decrease(self.level),
            2 => (self.level + 2).min(ENVELOPE_MAX),
            _ => {
                let step = if self.level < 96 { 2 } else { 1 };
                (self.level + step).min(ENVELOPE_MAX)
            }
        };
    }

    /// Produces one output sample. `modulator` is the previous voice's pitch when
    /// pitch modulation is on; `noise` replaces the sample data when set.
    pub fn render(
        &mut self,
        modulator: Option<u16>,
        noise: Option<i16>,
        output_rate: u32,
    ) -> VoiceOutput {
        if !self.enabled {
            return VoiceOutput::default();
        }

        let raw = match noise {
            Some(n) => n as i32,
            None => self.interpolate(),
        };

        let mut pitch = self.pitch as u32;
        if let Some(prev) = modulator {
            pitch = ((pitch * prev as u32) >> 12).min(0x3FFF);
        }
        let step = (pitch as u64 * NATIVE_RATE as u64 / output_rate.max(1) as u64) as u32;
        let (reached_end, stop) = self.advance(step);

        let mut completed = false;
        if stop {
            self.silence();
            completed = true;
        } else if self.update_envelope() {
            self.enabled = false;
            completed = true;
        }

        let sample = (raw * self.level as i32) >> 7;
        VoiceOutput {
            left: (sample * self.volume_left as i32) >> 7,
            right: (sample * self.volume_right as i32) >> 7,
            sample,
            reached_end,
            completed,
        }
    }
}
