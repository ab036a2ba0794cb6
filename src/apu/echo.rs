//! Echo unit: stereo delay line with an 8-tap FIR on the delayed signal.

pub const BUFFER_FRAMES: usize = 0x8000;
/// Delay added per EDL step, in frames.
pub const FRAMES_PER_EDL: usize = 2048;
pub const FIR_TAPS: usize = 8;

#[inline]
fn clamp16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[derive(Debug, Clone)]
pub struct Echo {
    buffer: Vec<[i16; 2]>,
    write_pos: usize,
    length: usize,
    pub fir: [i8; FIR_TAPS],
    pub feedback: i8,
    pub write_enabled: bool,
    // FIR 用の直近8サンプル
    history: [[i32; 2]; FIR_TAPS],
    history_pos: usize,
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

impl Echo {
    pub fn new() -> Self {
        Self {
            buffer: vec![[0; 2]; BUFFER_FRAMES],
            write_pos: 0,
            length: 0,
            fir: [0; FIR_TAPS],
            feedback: 0,
            write_enabled: false,
            history: [[0; 2]; FIR_TAPS],
            history_pos: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// EDL register ($7D), low nibble.
    pub fn set_delay(&mut self, edl: u8) {
        self.length = ((edl & 0x0F) as usize * FRAMES_PER_EDL).min(BUFFER_FRAMES - 1);
    }

    pub fn delay_frames(&self) -> usize {
        self.length.max(1)
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|f| *f = [0; 2]);
        self.history = [[0; 2]; FIR_TAPS];
    }

    fn filter(&self) -> [i32; 2] {
        let mut acc = [0i32; 2];
        for tap in 0..FIR_TAPS {
            // tap 0 = 最も古いサンプル
            let h = self.history[(self.history_pos + tap) % FIR_TAPS];
            let c = self.fir[tap] as i32;
            acc[0] += (h[0] * c) >> 7;
            acc[1] += (h[1] * c) >> 7;
        }
        [clamp16(acc[0]) as i32, clamp16(acc[1]) as i32]
    }

    /// Feeds one stereo frame in and returns the filtered delayed frame.
    pub fn process(&mut self, input: [i32; 2]) -> [i32; 2] {
        let read_pos = (self.write_pos + BUFFER_FRAMES - self.delay_frames()) % BUFFER_FRAMES;
        let delayed = self.buffer[read_pos];
        self.history[self.history_pos] = [delayed[0] as i32, delayed[1] as i32];
        self.history_pos = (self.history_pos + 1) % FIR_TAPS;
        let filtered = self.filter();

        if self.write_enabled {
            let fb = self.feedback as i32;
            self.buffer[self.write_pos] = [
                clamp16(input[0] + ((filtered[0] * fb) >> 7)),
                clamp16(input[1] + ((filtered[1] * fb) >> 7)),
            ];
        }
        self.write_pos = (self.write_pos + 1) % BUFFER_FRAMES;
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough() -> Echo {
        let mut e = Echo::new();
        e.fir[FIR_TAPS - 1] = 127;
        e.write_enabled = true;
        e.set_delay(1);
        e
    }

    #[test]
    fn impulse_returns_after_delay() {
        let mut e = passthrough();
        let mut seen = None;
        for i in 0..FRAMES_PER_EDL + 4 {
            let input = if i == 0 { [10000, -10000] } else { [0, 0] };
            let out = e.process(input);
            if out[0] != 0 && seen.is_none() {
                seen = Some((i, out));
            }
        }
        let (at, out) = seen.expect("echo never came back");
        assert_eq!(at, FRAMES_PER_EDL);
        assert_eq!(out, [(10000 * 127) >> 7, (-10000 * 127) >> 7]);
    }

    #[test]
    fn write_disable_keeps_buffer_silent() {
        let mut e = passthrough();
        e.write_enabled = false;
        for _ in 0..FRAMES_PER_EDL * 2 {
            assert_eq!(e.process([20000, 20000]), [0, 0]);
        }
    }

    #[test]
    fn feedback_repeats_the_echo() {
        let mut e = passthrough();
        e.feedback = 64;
        let mut peaks = Vec::new();
        for i in 0..FRAMES_PER_EDL * 3 {
            let input = if i == 0 { [16000, 16000] } else { [0, 0] };
            let out = e.process(input);
            if out[0] != 0 {
                peaks.push((i, out[0]));
            }
        }
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[1].0, FRAMES_PER_EDL * 2);
        assert!(peaks[1].1 < peaks[0].1);
    }
}
