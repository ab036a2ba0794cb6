//! Headless 16-bit console core: 65C816-class CPU, PPU, SPC700/DSP sound, DMA and
//! the bus that ties them together.

pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod console;
pub mod cpu;
pub mod cpu_bus;
pub mod debug_flags;
pub mod dma;
pub mod input;
pub mod interrupts;
pub mod ppu;
pub mod savestate;

pub use console::{Console, ConsoleConfig};
