//! System bus: 24-bit address decode, WRAM/SRAM/ROM, MMIO dispatch and the
//! VRAM/OAM/CGRAM arena handed to the PPU.

use std::sync::atomic::AtomicU32;

use crate::apu::Apu;
use crate::cartridge::{BankMode, RomImage};
use crate::cpu_bus::CpuBus;
use crate::debug_flags;
use crate::dma::DmaEngine;
use crate::input::{Buttons, InputPorts};
use crate::ppu::Ppu;

pub const WRAM_LEN: usize = 0x2_0000;
pub const VRAM_LEN: usize = 0x1_0000;
pub const OAM_LEN: usize = 0x220;
pub const CGRAM_LEN: usize = 0x200;

// $4210 下位4ビットは CPU バージョン
const CPU_VERSION: u8 = 0x02;

static UNMAPPED_READ_LOG: AtomicU32 = AtomicU32::new(0);
static UNMAPPED_WRITE_LOG: AtomicU32 = AtomicU32::new(0);

/// Video memory arena. Owned by the bus; the PPU only ever borrows it.
#[derive(Debug, Clone)]
pub struct VideoMemory {
    pub vram: Vec<u8>,
    pub oam: Vec<u8>,
    pub cgram: Vec<u8>,
}

impl Default for VideoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoMemory {
    pub fn new() -> Self {
        Self {
            vram: vec![0; VRAM_LEN],
            oam: vec![0; OAM_LEN],
            cgram: vec![0; CGRAM_LEN],
        }
    }

    pub fn reset(&mut self) {
        self.vram.fill(0);
        self.oam.fill(0);
        self.cgram.fill(0);
    }

    /// 15-bit BGR palette entry.
    pub fn cgram_color(&self, index: u8) -> u16 {
        let i = index as usize * 2;
        u16::from_le_bytes([self.cgram[i], self.cgram[i + 1]]) & 0x7FFF
    }
}

/// Notifications for debug tooling. Delivered in order, after the access completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Read { addr: u32, value: u8 },
    Write { addr: u32, value: u8 },
    RomLoaded { bank_mode: BankMode, size: usize },
    BankModeChanged(BankMode),
    Reset,
}

pub type BusObserver = Box<dyn FnMut(&BusEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    WorkRam,
    PpuRegisters,
    ApuPorts,
    Mmio,
    SaveRam,
    Rom,
    Unmapped,
}

/// Address decode. Depends only on the address and the bank mode.
pub fn region(addr: u32, mode: BankMode) -> Region {
    let bank = ((addr >> 16) & 0xFF) as u8;
    let offset = addr as u16;

    match bank {
        0x7E | 0x7F => Region::WorkRam,
        0x00..=0x3F | 0x80..=0xBF => match offset {
            0x0000..=0x1FFF => Region::WorkRam,
            0x2100..=0x213F => Region::PpuRegisters,
            0x2140..=0x217F => Region::ApuPorts,
            0x2180..=0x2183 | 0x4016 | 0x4017 | 0x4200..=0x421F | 0x4300..=0x437F => {
                Region::Mmio
            }
            0x6000..=0x7FFF if mode == BankMode::HiRom && bank & 0x7F >= 0x20 => {
                Region::SaveRam
            }
            0x8000..=0xFFFF => Region::Rom,
            _ => Region::Unmapped,
        },
        _ => match mode {
            BankMode::HiRom => Region::Rom,
            BankMode::LoRom => {
                let sram_bank = matches!(bank, 0x70..=0x7D | 0xF0..=0xFF);
                if offset >= 0x8000 {
                    Region::Rom
                } else if sram_bank {
                    Region::SaveRam
                } else {
                    Region::Unmapped
                }
            }
        },
    }
}

/// Linear ROM offset before wrapping to the image size.
pub fn rom_offset(addr: u32, mode: BankMode) -> usize {
    match mode {
        BankMode::LoRom => {
            let bank = ((addr >> 16) & 0x7F) as usize;
            (bank * 0x8000) | (addr as usize & 0x7FFF)
        }
        BankMode::HiRom => (addr & 0x3F_FFFF) as usize,
    }
}

fn sram_offset(addr: u32, mode: BankMode) -> usize {
    let bank = ((addr >> 16) & 0xFF) as usize;
    let offset = (addr & 0xFFFF) as usize;
    match mode {
        BankMode::LoRom => (bank & 0x0F) * 0x8000 + offset,
        BankMode::HiRom => (bank & 0x1F) * 0x2000 + (offset - 0x6000),
    }
}

fn wram_offset(addr: u32) -> usize {
    let bank = (addr >> 16) & 0xFF;
    match bank {
        0x7E | 0x7F => (addr & 0x1_FFFF) as usize,
        _ => (addr & 0x1FFF) as usize,
    }
}

pub struct Bus {
    wram: Vec<u8>,
    sram: Vec<u8>,
    rom: Vec<u8>,
    bank_mode: BankMode,
    video: VideoMemory,
    ppu: Ppu,
    apu: Apu,
    dma: DmaEngine,
    input: InputPorts,
    observers: Vec<BusObserver>,
    stall_cycles: u32,

    // $2181-$2183
    wram_port: u32,

    nmitimen: u8,
    htime: u16,
    vtime: u16,
    nmi_flag: bool,
    timeup: bool,
    in_vblank: bool,

    // 乗除算ユニット
    mul_a: u8,
    dividend: u16,
    quotient: u16,
    product_or_remainder: u16,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            wram: vec![0; WRAM_LEN],
            sram: Vec::new(),
            rom: Vec::new(),
            bank_mode: BankMode::LoRom,
            video: VideoMemory::new(),
            ppu: Ppu::new(),
            apu: Apu::default(),
            dma: DmaEngine::new(),
            input: InputPorts::new(),
            observers: Vec::new(),
            stall_cycles: 0,
            wram_port: 0,
            nmitimen: 0,
            htime: 0x1FF,
            vtime: 0x1FF,
            nmi_flag: false,
            timeup: false,
            in_vblank: false,
            mul_a: 0xFF,
            dividend: 0xFFFF,
            quotient: 0,
            product_or_remainder: 0,
        }
    }

    /// Power-cycles everything except the cartridge (ROM and battery RAM survive).
    pub fn reset(&mut self) {
        self.wram.fill(0);
        self.video.reset();
        self.ppu.reset();
        self.apu.reset();
        self.dma.reset();
        let buttons = [self.input.ports[0].buttons(), self.input.ports[1].buttons()];
        self.input = InputPorts::new();
        for (port, b) in buttons.into_iter().enumerate() {
            self.input.set_buttons(port, b);
        }
        self.stall_cycles = 0;
        self.wram_port = 0;
        self.nmitimen = 0;
        self.htime = 0x1FF;
        self.vtime = 0x1FF;
        self.nmi_flag = false;
        self.timeup = false;
        self.in_vblank = false;
        self.mul_a = 0xFF;
        self.dividend = 0xFFFF;
        self.quotient = 0;
        self.product_or_remainder = 0;
        self.notify(BusEvent::Reset);
    }

    pub fn load_rom(&mut self, image: &RomImage) {
        self.rom = image.bytes().to_vec();
        self.sram = vec![0; image.header.sram_bytes()];
        self.bank_mode = image.header.bank_mode;
        log::info!(
            "Cartridge mapped: {} {} ROM {}KB SRAM {}KB",
            image.header.title,
            self.bank_mode,
            self.rom.len() / 1024,
            self.sram.len() / 1024
        );
        self.notify(BusEvent::RomLoaded {
            bank_mode: self.bank_mode,
            size: self.rom.len(),
        });
    }

    pub fn set_bank_mode(&mut self, mode: BankMode) {
        if self.bank_mode != mode {
            self.bank_mode = mode;
            self.notify(BusEvent::BankModeChanged(mode));
        }
    }

    pub fn bank_mode(&self) -> BankMode {
        self.bank_mode
    }

    pub fn has_rom(&self) -> bool {
        !self.rom.is_empty()
    }

    pub fn subscribe(&mut self, observer: BusObserver) {
        self.observers.push(observer);
    }

    fn notify(&mut self, event: BusEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    pub fn wram(&self) -> &[u8] {
        &self.wram
    }

    pub fn wram_mut(&mut self) -> &mut [u8] {
        &mut self.wram
    }

    pub fn sram(&self) -> &[u8] {
        &self.sram
    }

    /// Copies saved battery RAM back in; a size mismatch copies the common prefix.
    pub fn restore_sram(&mut self, data: &[u8]) {
        let n = data.len().min(self.sram.len());
        self.sram[..n].copy_from_slice(&data[..n]);
    }

    pub fn video(&self) -> &VideoMemory {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut VideoMemory {
        &mut self.video
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn dma(&self) -> &DmaEngine {
        &self.dma
    }

    pub fn set_buttons(&mut self, port: usize, buttons: Buttons) {
        self.input.set_buttons(port, buttons);
    }

    pub fn nmi_enabled(&self) -> bool {
        self.nmitimen & 0x80 != 0
    }

    pub fn vtimer_irq_enabled(&self) -> bool {
        self.nmitimen & 0x20 != 0
    }

    pub fn auto_joypad_enabled(&self) -> bool {
        self.nmitimen & 0x01 != 0
    }

    pub fn vtime(&self) -> u16 {
        self.vtime
    }

    pub fn htime(&self) -> u16 {
        self.htime
    }

    /// VBlank edge from the orchestrator: latches RDNMI and the auto-joypad registers.
    pub fn enter_vblank(&mut self) {
        self.in_vblank = true;
        self.nmi_flag = true;
        if self.auto_joypad_enabled() {
            self.input.latch_auto_read();
        }
    }

    pub fn leave_vblank(&mut self) {
        self.in_vblank = false;
        self.nmi_flag = false;
    }

    pub fn raise_timeup(&mut self) {
        self.timeup = true;
    }

    pub fn render_scanline(&mut self, line: u16) {
        self.ppu.render_scanline(line, &self.video);
    }

    pub fn hdma_frame_init(&mut self) {
        self.dma.hdma_frame_init();
    }

    /// One horizontal blank of HDMA. Returns the bus cycles it used.
    pub fn run_hdma(&mut self) -> u32 {
        let mut dma = std::mem::take(&mut self.dma);
        let cycles = dma.hdma_scanline(self);
        self.dma = dma;
        cycles
    }

    fn start_dma(&mut self, mask: u8) {
        let mut dma = std::mem::take(&mut self.dma);
        let cycles = dma.start_general(mask, self);
        self.dma = dma;
        self.stall_cycles += cycles;
    }

    fn read_rom(&self, addr: u32) -> u8 {
        if self.rom.is_empty() {
            return 0;
        }
        self.rom[rom_offset(addr, self.bank_mode) % self.rom.len()]
    }

    fn read_wram_port(&mut self) -> u8 {
        let v = self.wram[self.wram_port as usize];
        self.wram_port = (self.wram_port + 1) & 0x1_FFFF;
        v
    }

    fn write_wram_port(&mut self, value: u8) {
        self.wram[self.wram_port as usize] = value;
        self.wram_port = (self.wram_port + 1) & 0x1_FFFF;
    }

    fn divide(&mut self, divisor: u8) {
        if divisor == 0 {
            self.quotient = 0xFFFF;
            self.product_or_remainder = self.dividend;
        } else {
            self.quotient = self.dividend / divisor as u16;
            self.product_or_remainder = self.dividend % divisor as u16;
        }
    }

    fn read_mmio(&mut self, offset: u16) -> Option<u8> {
        let v = match offset {
            0x2180 => self.read_wram_port(),
            0x2181..=0x2183 => 0,
            0x4016 => self.input.read_serial(0),
            0x4017 => self.input.read_serial(1),
            0x4210 => {
                let v = (if self.nmi_flag { 0x80 } else { 0 }) | CPU_VERSION;
                self.nmi_flag = false;
                v
            }
            0x4211 => {
                let v = if self.timeup { 0x80 } else { 0 };
                self.timeup = false;
                v
            }
            0x4212 => {
                if self.in_vblank {
                    0x80
                } else {
                    0
                }
            }
            0x4213 => 0xFF,
            0x4214 => self.quotient as u8,
            0x4215 => (self.quotient >> 8) as u8,
            0x4216 => self.product_or_remainder as u8,
            0x4217 => (self.product_or_remainder >> 8) as u8,
            0x4218..=0x421F => self.input.read_auto(offset),
            0x4300..=0x437F => self.dma.read_register(offset),
            _ => return None,
        };
        Some(v)
    }

    fn write_mmio(&mut self, offset: u16, value: u8) -> bool {
        match offset {
            0x2180 => self.write_wram_port(value),
            0x2181 => self.wram_port = (self.wram_port & 0x1_FF00) | value as u32,
            0x2182 => self.wram_port = (self.wram_port & 0x1_00FF) | ((value as u32) << 8),
            0x2183 => self.wram_port = (self.wram_port & 0xFFFF) | (((value & 1) as u32) << 16),
            0x4016 => self.input.write_strobe(value),
            0x4200 => self.nmitimen = value,
            0x4201 | 0x420D => {}
            0x4202 => self.mul_a = value,
            0x4203 => self.product_or_remainder = self.mul_a as u16 * value as u16,
            0x4204 => self.dividend = (self.dividend & 0xFF00) | value as u16,
            0x4205 => self.dividend = (self.dividend & 0x00FF) | ((value as u16) << 8),
            0x4206 => self.divide(value),
            0x4207 => self.htime = (self.htime & 0x100) | value as u16,
            0x4208 => self.htime = (self.htime & 0xFF) | (((value & 1) as u16) << 8),
            0x4209 => self.vtime = (self.vtime & 0x100) | value as u16,
            0x420A => self.vtime = (self.vtime & 0xFF) | (((value & 1) as u16) << 8),
            0x420B => self.start_dma(value),
            0x420C => self.dma.set_hdma_enable(value),
            0x4300..=0x437F => self.dma.write_register(offset, value),
            _ => return false,
        }
        true
    }

    fn read_unmapped(&self, addr: u32) -> u8 {
        if debug_flags::mapper() || debug_flags::first_n(&UNMAPPED_READ_LOG, 16) {
            log::warn!("Unmapped read at ${:06X}", addr);
        }
        0
    }

    fn write_unmapped(&self, addr: u32, value: u8) {
        if debug_flags::mapper() || debug_flags::first_n(&UNMAPPED_WRITE_LOG, 16) {
            log::warn!("Unmapped write ${:02X} to ${:06X}", value, addr);
        }
    }

    fn read_byte(&mut self, addr: u32) -> u8 {
        let addr = addr & 0xFF_FFFF;
        let offset = addr as u16;
        match region(addr, self.bank_mode) {
            Region::WorkRam => self.wram[wram_offset(addr)],
            Region::PpuRegisters => self.ppu.read_register(offset, &self.video),
            Region::ApuPorts => self.apu.cpu_read_port((offset & 0x03) as u8),
            Region::Mmio => match self.read_mmio(offset) {
                Some(v) => v,
                None => self.read_unmapped(addr),
            },
            Region::SaveRam if !self.sram.is_empty() => {
                self.sram[sram_offset(addr, self.bank_mode) % self.sram.len()]
            }
            Region::Rom => self.read_rom(addr),
            Region::SaveRam | Region::Unmapped => self.read_unmapped(addr),
        }
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        let addr = addr & 0xFF_FFFF;
        let offset = addr as u16;
        match region(addr, self.bank_mode) {
            Region::WorkRam => self.wram[wram_offset(addr)] = value,
            Region::PpuRegisters => self.ppu.write_register(offset, value, &mut self.video),
            Region::ApuPorts => self.apu.cpu_write_port((offset & 0x03) as u8, value),
            Region::Mmio => {
                if !self.write_mmio(offset, value) {
                    self.write_unmapped(addr, value);
                }
            }
            Region::SaveRam if !self.sram.is_empty() => {
                let i = sram_offset(addr, self.bank_mode) % self.sram.len();
                self.sram[i] = value;
            }
            Region::Rom => {
                if debug_flags::mapper() {
                    log::debug!("ROM write ${:02X} to ${:06X} ignored", value, addr);
                }
            }
            Region::SaveRam | Region::Unmapped => self.write_unmapped(addr, value),
        }
    }
}

impl CpuBus for Bus {
    fn read_u8(&mut self, addr: u32) -> u8 {
        let value = self.read_byte(addr);
        if !self.observers.is_empty() {
            self.notify(BusEvent::Read { addr, value });
        }
        value
    }

    fn write_u8(&mut self, addr: u32, value: u8) {
        self.write_byte(addr, value);
        if !self.observers.is_empty() {
            self.notify(BusEvent::Write { addr, value });
        }
    }

    fn take_stall_cycles(&mut self) -> u32 {
        std::mem::take(&mut self.stall_cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::build_test_rom;
    use std::sync::{Arc, Mutex};

    fn bus_with_rom(mode: BankMode) -> Bus {
        let mut rom = build_test_rom(0x2_0000, mode, 0x8000, &[0xEA]);
        rom[0x1_8123] = 0x5A;
        let image = RomImage::load_from_bytes(rom).unwrap();
        let mut bus = Bus::new();
        bus.load_rom(&image);
        bus
    }

    #[test]
    fn test_region_map() {
        let lo = BankMode::LoRom;
        let hi = BankMode::HiRom;
        assert_eq!(region(0x00_0000, lo), Region::WorkRam);
        assert_eq!(region(0x80_1FFF, lo), Region::WorkRam);
        assert_eq!(region(0x7F_FFFF, lo), Region::WorkRam);
        assert_eq!(region(0x00_2118, lo), Region::PpuRegisters);
        assert_eq!(region(0x00_2177, lo), Region::ApuPorts);
        assert_eq!(region(0x00_4200, lo), Region::Mmio);
        assert_eq!(region(0x00_4372, lo), Region::Mmio);
        assert_eq!(region(0x00_4000, lo), Region::Unmapped);
        assert_eq!(region(0x70_0000, lo), Region::SaveRam);
        assert_eq!(region(0x40_0000, lo), Region::Unmapped);
        assert_eq!(region(0x30_6000, lo), Region::Unmapped);
        assert_eq!(region(0x30_6000, hi), Region::SaveRam);
        assert_eq!(region(0x10_6000, hi), Region::Unmapped);
        assert_eq!(region(0x40_0000, hi), Region::Rom);
        assert_eq!(region(0x00_8000, lo), Region::Rom);
    }

    #[test]
    fn test_rom_translation() {
        assert_eq!(rom_offset(0x00_8000, BankMode::LoRom), 0);
        assert_eq!(rom_offset(0x01_8000, BankMode::LoRom), 0x8000);
        assert_eq!(rom_offset(0x81_FFFF, BankMode::LoRom), 0xFFFF);
        assert_eq!(rom_offset(0x03_8123, BankMode::LoRom), 0x1_8123);
        assert_eq!(rom_offset(0xC1_2345, BankMode::HiRom), 0x1_2345);
        assert_eq!(rom_offset(0x00_FFFC, BankMode::HiRom), 0xFFFC);
    }

    #[test]
    fn test_rom_reads_follow_bank_mode() {
        let mut lo = bus_with_rom(BankMode::LoRom);
        assert_eq!(lo.read_u8(0x03_8123), 0x5A);
        assert_eq!(lo.read_u8(0x83_8123), 0x5A);
        let mut hi = bus_with_rom(BankMode::HiRom);
        assert_eq!(hi.read_u8(0xC1_8123), 0x5A);
        assert_eq!(hi.read_u8(0x01_8123), 0x5A);
    }

    #[test]
    fn test_wram_mirror_and_full_banks() {
        let mut bus = Bus::new();
        bus.write_u8(0x00_0123, 0x42);
        assert_eq!(bus.read_u8(0x7E_0123), 0x42);
        assert_eq!(bus.read_u8(0xBF_0123), 0x42);
        bus.write_u8(0x7F_0010, 0x99);
        assert_eq!(bus.wram()[0x1_0010], 0x99);
    }

    #[test]
    fn test_wram_port_autoincrements() {
        let mut bus = Bus::new();
        bus.write_u8(0x2181, 0xFE);
        bus.write_u8(0x2182, 0xFF);
        bus.write_u8(0x2183, 0x00);
        bus.write_u8(0x2180, 0x11);
        bus.write_u8(0x2180, 0x22);
        bus.write_u8(0x2180, 0x33);
        assert_eq!(&bus.wram()[0xFFFE..0x10001], &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_unmapped_access_is_absorbed_and_reported() {
        let mut bus = Bus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe(Box::new(move |e: &BusEvent| sink.lock().unwrap().push(*e)));

        bus.write_u8(0x00_5000, 0x12);
        assert_eq!(bus.read_u8(0x00_5000), 0);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                BusEvent::Write { addr: 0x5000, value: 0x12 },
                BusEvent::Read { addr: 0x5000, value: 0 },
            ]
        );
    }

    #[test]
    fn test_observers_see_rom_and_mode_changes() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut bus = Bus::new();
        bus.subscribe(Box::new(move |e: &BusEvent| sink.lock().unwrap().push(*e)));

        let image = RomImage::load_from_bytes(build_test_rom(0x8000, BankMode::LoRom, 0x8000, &[])).unwrap();
        bus.load_rom(&image);
        bus.set_bank_mode(BankMode::HiRom);
        bus.set_bank_mode(BankMode::HiRom);
        bus.reset();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                BusEvent::RomLoaded { bank_mode: BankMode::LoRom, size: 0x8000 },
                BusEvent::BankModeChanged(BankMode::HiRom),
                BusEvent::Reset,
            ]
        );
    }

    #[test]
    fn test_sram_roundtrip_lorom() {
        let mut bus = bus_with_rom(BankMode::LoRom);
        assert_eq!(bus.sram().len(), 0x2000);
        bus.write_u8(0x70_0005, 0xAB);
        assert_eq!(bus.read_u8(0x70_0005), 0xAB);
        // 8KB なので $2005 は折り返す
        assert_eq!(bus.read_u8(0x70_2005), 0xAB);
    }

    #[test]
    fn test_general_dma_into_vram() {
        let mut bus = Bus::new();
        for (i, b) in [0x11u8, 0x22, 0x33, 0x44].iter().enumerate() {
            bus.write_u8(0x7E_1000 + i as u32, *b);
        }
        bus.write_u8(0x2115, 0x80);
        bus.write_u8(0x2116, 0x00);
        bus.write_u8(0x2117, 0x10);

        bus.write_u8(0x4300, 0x01);
        bus.write_u8(0x4301, 0x18);
        bus.write_u8(0x4302, 0x00);
        bus.write_u8(0x4303, 0x10);
        bus.write_u8(0x4304, 0x7E);
        bus.write_u8(0x4305, 0x04);
        bus.write_u8(0x4306, 0x00);
        bus.write_u8(0x420B, 0x01);

        assert_eq!(&bus.video().vram[0x2000..0x2004], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(bus.take_stall_cycles(), 4 * crate::dma::CYCLES_PER_BYTE);
        assert_eq!(bus.take_stall_cycles(), 0);
        assert_eq!(bus.dma().channels[0].size, 0);
    }

    #[test]
    fn test_apu_ports_mirror() {
        let mut bus = Bus::new();
        bus.write_u8(0x2145, 0x77);
        assert_eq!(bus.read_u8(0x2140), 0x00);
        // IPL の待機値 $AA/$BB が見える
        bus.apu_mut().process(400_000);
        assert_eq!(bus.read_u8(0x2140), 0xAA);
        assert_eq!(bus.read_u8(0x2141), 0xBB);
        assert_eq!(bus.read_u8(0x2175), 0xBB);
    }

    #[test]
    fn test_multiply_and_divide() {
        let mut bus = Bus::new();
        bus.write_u8(0x4202, 200);
        bus.write_u8(0x4203, 100);
        assert_eq!(bus.read_u8(0x4216), (20000u16 & 0xFF) as u8);
        assert_eq!(bus.read_u8(0x4217), (20000u16 >> 8) as u8);

        bus.write_u8(0x4204, 0xE8);
        bus.write_u8(0x4205, 0x03);
        bus.write_u8(0x4206, 7);
        assert_eq!(bus.read_u8(0x4214), 142);
        assert_eq!(bus.read_u8(0x4216), 6);

        bus.write_u8(0x4206, 0);
        assert_eq!(bus.read_u8(0x4214), 0xFF);
        assert_eq!(bus.read_u8(0x4215), 0xFF);
        assert_eq!(bus.read_u8(0x4216), 0xE8);
    }

    #[test]
    fn test_rdnmi_clears_on_read() {
        let mut bus = Bus::new();
        bus.enter_vblank();
        assert_eq!(bus.read_u8(0x4212) & 0x80, 0x80);
        assert_eq!(bus.read_u8(0x4210), 0x80 | CPU_VERSION);
        assert_eq!(bus.read_u8(0x4210), CPU_VERSION);
        bus.leave_vblank();
        assert_eq!(bus.read_u8(0x4212) & 0x80, 0);
    }

    #[test]
    fn test_auto_joypad_latch() {
        let mut bus = Bus::new();
        bus.write_u8(0x4200, 0x81);
        bus.set_buttons(0, Buttons::A | Buttons::START);
        bus.enter_vblank();
        let word = bus.read_u8(0x4218) as u16 | ((bus.read_u8(0x4219) as u16) << 8);
        // A = bit 7, Start = bit 12 (hardware order)
        assert_eq!(word, 0x1080);
        assert!(bus.nmi_enabled());
    }

    #[test]
    fn test_vtime_registers() {
        let mut bus = Bus::new();
        bus.write_u8(0x4209, 0x40);
        bus.write_u8(0x420A, 0x01);
        assert_eq!(bus.vtime(), 0x140);
    }
}
