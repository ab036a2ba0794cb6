/// One of the three SPC700 interval timers ($FA-$FC targets, $FD-$FF counters).
#[derive(Debug, Clone)]
pub struct Timer {
    divider: u32,
    running: bool,
    ticks: u32,
    // $FA-$FC に書いた値。0 は 256 カウント
    target: u8,
    stage2: u8,
    counter: u8,
}

impl Timer {
    /// `divider` is in SPC700 cycles per stage-2 tick.
    pub fn new(divider: u32) -> Self {
        Self {
            divider,
            running: false,
            ticks: 0,
            target: 0,
            stage2: 0,
            counter: 0,
        }
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.ticks = 0;
        self.target = 0;
        self.stage2 = 0;
        self.counter = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn run(&mut self, cycles: u32) {
        if !self.running {
            return;
        }
        self.ticks += cycles;
        while self.ticks >= self.divider {
            self.ticks -= self.divider;
            self.stage2 = self.stage2.wrapping_add(1);
            // target 0 は 8ビットの折り返しで一致する
            if self.stage2 == self.target {
                self.stage2 = 0;
                self.counter = (self.counter + 1) & 0x0F;
            }
        }
    }

    /// Control bit from $F1. Only a 0 -> 1 edge restarts the count.
    pub fn set_enabled(&mut self, on: bool) {
        if on && !self.running {
            self.ticks = 0;
            self.stage2 = 0;
            self.counter = 0;
        }
        self.running = on;
    }

    pub fn set_target(&mut self, value: u8) {
        self.target = value;
    }

    /// 4-bit counter; reading clears it.
    pub fn read_counter(&mut self) -> u8 {
        let v = self.counter;
        self.counter = 0;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_target_periods() {
        let mut t = Timer::new(128);
        t.set_target(4);
        t.set_enabled(true);
        t.run(128 * 4 * 3 + 100);
        assert_eq!(t.read_counter(), 3);
        assert_eq!(t.read_counter(), 0);
    }

    #[test]
    fn zero_target_means_256() {
        let mut t = Timer::new(16);
        t.set_target(0);
        t.set_enabled(true);
        t.run(16 * 255);
        assert_eq!(t.read_counter(), 0);
        t.run(16);
        assert_eq!(t.read_counter(), 1);
    }

    #[test]
    fn counter_is_four_bits_and_stopped_timer_holds() {
        let mut t = Timer::new(16);
        t.set_target(1);
        t.set_enabled(true);
        assert!(t.is_running());
        t.run(16 * 17);
        assert_eq!(t.read_counter(), 1);
        t.set_enabled(false);
        assert!(!t.is_running());
        t.run(16 * 5);
        assert_eq!(t.read_counter(), 0);
    }

    #[test]
    fn re_enabling_running_timer_keeps_count() {
        let mut t = Timer::new(16);
        t.set_target(1);
        t.set_enabled(true);
        t.run(16 * 2);
        t.set_enabled(true);
        assert_eq!(t.read_counter(), 2);
    }
}
