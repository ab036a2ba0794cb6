use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::apu::{self, SpcSnapshot};
use crate::bus::{CGRAM_LEN, OAM_LEN, VRAM_LEN, WRAM_LEN};
use crate::cpu::CpuSnapshot;

/// "SNES"
pub const MAGIC: u32 = 0x534E_4553;
pub const CURRENT_VERSION: u32 = 1;
// magic + version (bincode は固定長リトルエンディアン)
const PREAMBLE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    pub running: bool,
    pub cpu_stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub magic: u32,
    pub version: u32,
    pub cpu: CpuSnapshot,
    pub vram: Vec<u8>,
    pub oam: Vec<u8>,
    pub cgram: Vec<u8>,
    pub wram: Vec<u8>,
    pub sram: Vec<u8>,
    pub apu_ram: Vec<u8>,
    pub dsp_registers: Vec<u8>,
    pub spc: SpcSnapshot,
    pub frame_count: u64,
    pub flags: RunFlags,
}

impl SaveState {
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| format!("Failed to encode save state: {}", e))
    }

    /// Checks magic and version from the preamble before decoding the rest, then
    /// checks every fixed-size block. Nothing is applied here.
    pub fn decode(data: &[u8]) -> Result<Self, String> {
        if data.len() < PREAMBLE_LEN {
            return Err(format!("Save state too short ({} bytes)", data.len()));
        }
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != MAGIC {
            return Err(format!("Invalid save state magic: 0x{:08X}", magic));
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != CURRENT_VERSION {
            return Err(format!(
                "Unsupported save state version: {} (expected {})",
                version, CURRENT_VERSION
            ));
        }

        let state: SaveState = bincode::deserialize(data)
            .map_err(|e| format!("Failed to decode save state: {}", e))?;
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<(), String> {
        let blocks: [(&str, usize, usize); 6] = [
            ("vram", self.vram.len(), VRAM_LEN),
            ("oam", self.oam.len(), OAM_LEN),
            ("cgram", self.cgram.len(), CGRAM_LEN),
            ("wram", self.wram.len(), WRAM_LEN),
            ("apu_ram", self.apu_ram.len(), apu::RAM_LEN),
            ("dsp", self.dsp_registers.len(), apu::dsp::REGISTER_COUNT),
        ];
        for (name, len, expected) in blocks {
            if len != expected {
                return Err(format!(
                    "Save state block '{}' has length {}, expected {}",
                    name, len, expected
                ));
            }
        }
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let data = self.encode()?;
        let mut file =
            File::create(path).map_err(|e| format!("Failed to create save file: {}", e))?;
        file.write_all(&data)
            .map_err(|e| format!("Failed to write save file: {}", e))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let mut file = File::open(path).map_err(|e| format!("Failed to open save file: {}", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| format!("Failed to read save file: {}", e))?;
        Self::decode(&data)
    }
}
