//! The `Console` aggregate: owns CPU, interrupts and the bus (which owns everything
//! else) and advances them one frame at a time.

use std::path::Path;

use crate::bus::{Bus, BusObserver};
use crate::cartridge::{ChecksumReport, RomHeader, RomImage};
use crate::cpu::{Cpu, CpuSnapshot};
use crate::debug_flags;
use crate::input::Buttons;
use crate::interrupts::{InterruptKind, InterruptSystem, DEFAULT_NMI_PERIOD};
use crate::ppu::mode7::Mode7Effects;
use crate::ppu::{SCANLINES_PER_FRAME, SCREEN_HEIGHT};
use crate::savestate::{RunFlags, SaveState, CURRENT_VERSION, MAGIC};

pub const MASTER_CYCLES_PER_LINE: u32 = 1364;
// CPU 1サイクル = マスタークロック 6
pub const MASTER_CYCLES_PER_CPU_CYCLE: u32 = 6;
pub const VBLANK_START_LINE: u16 = 225;

pub type FrameObserver = Box<dyn FnMut(u64, &[u8]) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub sample_rate: u32,
    pub nmi_period: u32,
    pub mode7_effects: Mode7Effects,
    pub clamp_color_math: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::apu::DEFAULT_OUTPUT_RATE,
            nmi_period: DEFAULT_NMI_PERIOD,
            mode7_effects: Mode7Effects::default(),
            clamp_color_math: true,
        }
    }
}

impl ConsoleConfig {
    /// Defaults overlaid with SNES_SAMPLE_RATE, SNES_NMI_PERIOD, SNES_MODE7_PERSPECTIVE
    /// and SNES_MODE7_HORIZON.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            sample_rate: debug_flags::env_u32("SNES_SAMPLE_RATE", d.sample_rate).max(1),
            nmi_period: debug_flags::env_u32("SNES_NMI_PERIOD", d.nmi_period).max(1),
            mode7_effects: Mode7Effects {
                perspective: debug_flags::env_bool("SNES_MODE7_PERSPECTIVE", d.mode7_effects.perspective),
                horizon: debug_flags::env_bool("SNES_MODE7_HORIZON", d.mode7_effects.horizon),
            },
            clamp_color_math: d.clamp_color_math,
        }
    }
}

struct LoadedRom {
    header: RomHeader,
    checksum: ChecksumReport,
}

pub struct Console {
    cpu: Cpu,
    interrupts: InterruptSystem,
    bus: Bus,
    config: ConsoleConfig,
    rom: Option<LoadedRom>,
    running: bool,
    frame_count: u64,
    // 前のラインからはみ出したマスターサイクル (DMA 停止分を含む)
    overrun: u32,
    frame_observers: Vec<FrameObserver>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(ConsoleConfig::default())
    }
}

impl Console {
    pub fn new(config: ConsoleConfig) -> Self {
        let mut bus = Bus::new();
        bus.apu_mut().set_output_rate(config.sample_rate);
        bus.ppu_mut().set_mode7_effects(config.mode7_effects);
        bus.ppu_mut().set_color_clamp(config.clamp_color_math);
        Self {
            cpu: Cpu::new(),
            interrupts: InterruptSystem::new(config.nmi_period),
            bus,
            config,
            rom: None,
            running: false,
            frame_count: 0,
            overrun: 0,
            frame_observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Parses and maps a cartridge image, then resets. Rejected images leave the
    /// current cartridge in place.
    pub fn load_rom(&mut self, data: Vec<u8>) -> Result<&RomHeader, String> {
        let image = RomImage::load_from_bytes(data)?;
        self.bus.load_rom(&image);
        let loaded = self.rom.insert(LoadedRom {
            header: image.header.clone(),
            checksum: image.checksum,
        });
        log::info!(
            "Loaded \"{}\" ({}, checksum {})",
            loaded.header.title,
            loaded.header.bank_mode,
            if loaded.checksum.valid { "ok" } else { "mismatch" }
        );
        self.reset();
        self.rom
            .as_ref()
            .map(|r| &r.header)
            .ok_or_else(|| "ROM was not retained".to_string())
    }

    pub fn load_rom_file<P: AsRef<Path>>(&mut self, path: P) -> Result<&RomHeader, String> {
        let data = std::fs::read(path).map_err(|e| format!("Failed to read ROM file: {}", e))?;
        self.load_rom(data)
    }

    pub fn rom_header(&self) -> Option<&RomHeader> {
        self.rom.as_ref().map(|r| &r.header)
    }

    pub fn checksum(&self) -> Option<ChecksumReport> {
        self.rom.as_ref().map(|r| r.checksum)
    }

    /// Power-on reset. The RESET interrupt is serviced immediately so the PC
    /// holds the reset vector when this returns.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.interrupts.reset();
        self.cpu.reset();
        self.cpu.service_pending(&mut self.bus, &mut self.interrupts);
        self.frame_count = 0;
        self.overrun = 0;
        self.running = self.bus.has_rom();
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.cpu.stop();
    }

    pub fn resume(&mut self) {
        self.running = self.bus.has_rom();
        self.cpu.resume();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Runs 262 scanlines. Returns false (and does nothing) while stopped.
    pub fn run_frame(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.bus.leave_vblank();
        self.bus.hdma_frame_init();

        for line in 0..SCANLINES_PER_FRAME {
            if line == VBLANK_START_LINE {
                self.bus.enter_vblank();
                if self.bus.nmi_enabled() {
                    // 1フレーム = NMI タイマー1周期
                    self.interrupts.tick(self.interrupts.nmi_period());
                }
            }
            if self.bus.vtimer_irq_enabled() && self.bus.vtime() == line {
                self.bus.raise_timeup();
                self.interrupts.request(InterruptKind::Irq);
            }

            let mut hdma_cycles = 0;
            if (line as usize) < SCREEN_HEIGHT {
                hdma_cycles = self.bus.run_hdma();
                self.bus.render_scanline(line);
            }

            self.run_cpu_line(hdma_cycles * MASTER_CYCLES_PER_CPU_CYCLE);
            self.bus.apu_mut().process(MASTER_CYCLES_PER_LINE);
        }

        self.frame_count += 1;
        let frame = self.bus.ppu().frame_buffer();
        for observer in self.frame_observers.iter_mut() {
            observer(self.frame_count, frame);
        }
        true
    }

    fn run_cpu_line(&mut self, already_used: u32) {
        let mut elapsed = self.overrun.saturating_add(already_used);
        while elapsed < MASTER_CYCLES_PER_LINE {
            let cycles = self.cpu.step(&mut self.bus, &mut self.interrupts).max(1);
            elapsed = elapsed.saturating_add(cycles * MASTER_CYCLES_PER_CPU_CYCLE);
        }
        self.overrun = elapsed - MASTER_CYCLES_PER_LINE;
    }

    /// Single instruction (or interrupt entry) for debuggers. The APU is kept in step.
    pub fn step_instruction(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.bus, &mut self.interrupts);
        self.bus
            .apu_mut()
            .process(cycles * MASTER_CYCLES_PER_CPU_CYCLE);
        cycles
    }

    pub fn set_buttons(&mut self, port: usize, buttons: Buttons) {
        self.bus.set_buttons(port, buttons);
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu().frame_buffer()
    }

    /// Interleaved stereo samples produced since the last call.
    pub fn take_audio_samples(&mut self) -> Vec<i16> {
        self.bus.apu_mut().take_samples()
    }

    pub fn take_voice_events(&mut self) -> Vec<usize> {
        self.bus.apu_mut().take_voice_events()
    }

    pub fn cpu_snapshot(&self) -> CpuSnapshot {
        self.cpu.snapshot()
    }

    /// CPU cycles executed since power-on.
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu.total_cycles()
    }

    pub fn subscribe_memory(&mut self, observer: BusObserver) {
        self.bus.subscribe(observer);
    }

    pub fn subscribe_frames(&mut self, observer: FrameObserver) {
        self.frame_observers.push(observer);
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn interrupts(&self) -> &InterruptSystem {
        &self.interrupts
    }

    pub fn capture_state(&self) -> SaveState {
        let video = self.bus.video();
        let apu = self.bus.apu();
        SaveState {
            magic: MAGIC,
            version: CURRENT_VERSION,
            cpu: self.cpu.snapshot(),
            vram: video.vram.clone(),
            oam: video.oam.clone(),
            cgram: video.cgram.clone(),
            wram: self.bus.wram().to_vec(),
            sram: self.bus.sram().to_vec(),
            apu_ram: apu.ram().to_vec(),
            dsp_registers: apu.dsp().registers().to_vec(),
            spc: apu.spc().snapshot(),
            frame_count: self.frame_count,
            flags: RunFlags {
                running: self.running,
                cpu_stopped: self.cpu.is_stopped(),
            },
        }
    }

    pub fn save_state(&self) -> Result<Vec<u8>, String> {
        self.capture_state().encode()
    }

    /// Decodes and validates `data` completely before touching any state.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), String> {
        let state = SaveState::decode(data)?;
        self.apply_state(&state)
    }

    pub fn apply_state(&mut self, state: &SaveState) -> Result<(), String> {
        state.validate()?;
        let dsp_regs: [u8; crate::apu::dsp::REGISTER_COUNT] = state
            .dsp_registers
            .as_slice()
            .try_into()
            .map_err(|_| "Save state DSP block is malformed".to_string())?;

        self.cpu.restore(&state.cpu);
        if state.flags.cpu_stopped {
            self.cpu.stop();
        } else {
            self.cpu.resume();
        }

        let video = self.bus.video_mut();
        video.vram.copy_from_slice(&state.vram);
        video.oam.copy_from_slice(&state.oam);
        video.cgram.copy_from_slice(&state.cgram);
        self.bus.wram_mut().copy_from_slice(&state.wram);
        self.bus.restore_sram(&state.sram);
        self.bus
            .apu_mut()
            .restore(&state.apu_ram, &dsp_regs, &state.spc);
        self.bus.ppu_mut().invalidate_tile_cache();

        self.frame_count = state.frame_count;
        self.overrun = 0;
        self.running = state.flags.running && self.bus.has_rom();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEvent;
    use crate::cartridge::{build_test_rom, BankMode};
    use crate::cpu_bus::CpuBus;
    use crate::ppu::FRAME_BUFFER_LEN;
    use std::sync::{Arc, Mutex};

    // LDA #$0F / STA $2100 / JMP $8005
    const IDLE_PROGRAM: [u8; 8] = [0xA9, 0x0F, 0x8D, 0x00, 0x21, 0x4C, 0x05, 0x80];

    fn patch(rom: &mut [u8], offset: usize, bytes: &[u8]) {
        rom[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn console_with(rom: Vec<u8>) -> Console {
        let mut console = Console::default();
        console.load_rom(rom).unwrap();
        console
    }

    #[test]
    fn test_end_to_end_lorom() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &IDLE_PROGRAM);
        let mut console = Console::default();
        let header = console.load_rom(rom).unwrap();
        assert_eq!(header.bank_mode, BankMode::LoRom);
        assert!(console.checksum().unwrap().valid);
        assert_eq!(console.cpu_snapshot().pc, 0x8000);

        for n in 1..=5u64 {
            assert!(console.run_frame());
            assert_eq!(console.frame_buffer().len(), FRAME_BUFFER_LEN);
            assert_eq!(console.frame_count(), n);
        }
        assert_eq!(console.bus().ppu().brightness(), 0x0F);
        assert!(!console.bus().ppu().is_forced_blank());
    }

    #[test]
    fn test_reset_vector_hirom() {
        let rom = build_test_rom(0x1_0000, BankMode::HiRom, 0xC123, &[0xEA]);
        let console = console_with(rom);
        assert_eq!(console.rom_header().unwrap().bank_mode, BankMode::HiRom);
        assert_eq!(console.cpu_snapshot().pc, 0xC123);
    }

    #[test]
    fn test_bad_rom_is_rejected_without_side_effects() {
        let mut console = Console::default();
        let err = console.load_rom(vec![0; 1000]).unwrap_err();
        assert!(err.starts_with("ROM file too small"), "{}", err);
        assert!(console.rom_header().is_none());
        assert!(!console.run_frame());
    }

    #[test]
    fn test_vblank_nmi_once_per_frame() {
        // LDA #$80 / STA $4200 / JMP $8005
        let program = [0xA9, 0x80, 0x8D, 0x00, 0x42, 0x4C, 0x05, 0x80];
        let mut rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &program);
        // INC $10 / RTI
        patch(&mut rom, 0x0100, &[0xE6, 0x10, 0x40]);
        patch(&mut rom, 0x7FEA, &[0x00, 0x81]);
        let mut console = console_with(rom);

        for _ in 0..3 {
            console.run_frame();
        }
        assert_eq!(console.bus().wram()[0x10], 3);
    }

    #[test]
    fn test_nmi_disabled_by_default() {
        let mut rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &IDLE_PROGRAM);
        patch(&mut rom, 0x0100, &[0xE6, 0x10, 0x40]);
        patch(&mut rom, 0x7FEA, &[0x00, 0x81]);
        let mut console = console_with(rom);
        console.run_frame();
        console.run_frame();
        assert_eq!(console.bus().wram()[0x10], 0);
    }

    #[test]
    fn test_vtimer_irq() {
        // CLI / LDA #$0A / STA $4209 / STZ $420A / LDA #$20 / STA $4200 / JMP *
        let program = [
            0x58, 0xA9, 0x0A, 0x8D, 0x09, 0x42, 0x9C, 0x0A, 0x42, 0xA9, 0x20, 0x8D, 0x00, 0x42,
            0x4C, 0x0E, 0x80,
        ];
        let mut rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &program);
        // INC $11 / LDA $4211 / RTI
        patch(&mut rom, 0x0200, &[0xE6, 0x11, 0xAD, 0x11, 0x42, 0x40]);
        patch(&mut rom, 0x7FEE, &[0x00, 0x82]);
        let mut console = console_with(rom);

        console.run_frame();
        assert_eq!(console.bus().wram()[0x11], 1);
        console.run_frame();
        assert_eq!(console.bus().wram()[0x11], 2);
    }

    #[test]
    fn test_stop_and_resume() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &IDLE_PROGRAM);
        let mut console = console_with(rom);
        console.run_frame();
        console.stop();
        assert!(!console.run_frame());
        assert_eq!(console.frame_count(), 1);
        let pc = console.cpu_snapshot().pc;
        console.resume();
        assert_eq!(console.cpu_snapshot().pc, pc);
        assert!(console.run_frame());
        assert_eq!(console.frame_count(), 2);
    }

    #[test]
    fn test_audio_stream_rate() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &IDLE_PROGRAM);
        let mut console = console_with(rom);
        console.run_frame();
        let samples = console.take_audio_samples();
        // 32000Hz * 357368 / 21477272 ≒ 532 ステレオフレーム
        let frames = samples.len() / 2;
        assert_eq!(samples.len() % 2, 0);
        assert!((530..=534).contains(&frames), "{}", frames);
        assert!(console.take_audio_samples().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &IDLE_PROGRAM);
        let mut console = console_with(rom);
        console.run_frame();
        console.run_frame();
        console.bus_mut().video_mut().vram[0x100] = 0x42;
        console.bus_mut().video_mut().oam[0x10] = 0x24;
        console.bus_mut().video_mut().cgram[0x20] = 0x1F;
        let before = console.capture_state();
        let blob = console.save_state().unwrap();

        console.run_frame();
        console.bus_mut().video_mut().vram[0x100] = 0;
        console.bus_mut().video_mut().cgram[0x20] = 0;
        console.load_state(&blob).unwrap();

        let after = console.capture_state();
        assert_eq!(after.cpu, before.cpu);
        assert_eq!(after.vram, before.vram);
        assert_eq!(after.oam, before.oam);
        assert_eq!(after.cgram, before.cgram);
        assert_eq!(console.frame_count(), 2);
    }

    #[test]
    fn test_load_state_rejects_bad_magic_untouched() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &IDLE_PROGRAM);
        let mut console = console_with(rom);
        console.run_frame();
        let mut blob = console.save_state().unwrap();
        blob[3] = 0;
        console.bus_mut().video_mut().vram[7] = 0x99;
        let pc = console.cpu_snapshot().pc;

        assert!(console.load_state(&blob).is_err());
        assert_eq!(console.bus().video().vram[7], 0x99);
        assert_eq!(console.cpu_snapshot().pc, pc);
        assert_eq!(console.frame_count(), 1);
    }

    #[test]
    fn test_memory_and_frame_observers() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &IDLE_PROGRAM);
        let mut console = console_with(rom);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        console.subscribe_memory(Box::new(move |e: &BusEvent| sink.lock().unwrap().push(*e)));
        let frames = Arc::new(Mutex::new(Vec::new()));
        let frame_sink = frames.clone();
        console.subscribe_frames(Box::new(move |n: u64, fb: &[u8]| {
            frame_sink.lock().unwrap().push((n, fb.len()))
        }));

        // LDA #$0F: opcode + operand fetch
        console.step_instruction();
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                BusEvent::Read { addr: 0x8000, value: 0xA9 },
                BusEvent::Read { addr: 0x8001, value: 0x0F },
            ]
        );

        console.run_frame();
        console.run_frame();
        assert_eq!(
            *frames.lock().unwrap(),
            vec![(1, FRAME_BUFFER_LEN), (2, FRAME_BUFFER_LEN)]
        );
    }

    #[test]
    fn test_general_dma_stalls_the_cpu() {
        // LDA #$01 / STA $420B / JMP *
        let program = [0xA9, 0x01, 0x8D, 0x0B, 0x42, 0x4C, 0x05, 0x80];
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &program);
        let mut console = console_with(rom);
        // WRAM $7E:0000 -> VRAM, 16 bytes. Channel registers power on at $FF
        let bus = console.bus_mut();
        let channel = [
            (0x4300, 0x01),
            (0x4301, 0x18),
            (0x4302, 0x00),
            (0x4303, 0x00),
            (0x4304, 0x7E),
            (0x4305, 0x10),
            (0x4306, 0x00),
        ];
        for (reg, value) in channel {
            bus.write_u8(reg, value);
        }

        console.step_instruction();
        let cycles = console.step_instruction();
        assert_eq!(cycles, 4 + 16 * crate::dma::CYCLES_PER_BYTE);
    }

    #[test]
    fn test_config_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.sample_rate, 32000);
        assert_eq!(config.nmi_period, 1364);
        assert!(config.clamp_color_math);
        assert!(!config.mode7_effects.perspective);
    }
}
