use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const MIN_ROM_SIZE: usize = 0x8000;
pub const MAX_ROM_SIZE: usize = 0x80_0000;
const COPIER_HEADER_SIZE: usize = 512;

// Header base. Title lives at +0x10 (= 0x7FC0), map mode at +0x25 (= 0x7FD5).
pub const HEADER_OFFSET: usize = 0x7FB0;
const TITLE_LENGTH: usize = 21;
const CHECKSUM_FIELD: std::ops::RangeInclusive<usize> = (HEADER_OFFSET + 0x2C)..=(HEADER_OFFSET + 0x2F);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankMode {
    LoRom,
    HiRom,
}

impl std::fmt::Display for BankMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BankMode::LoRom => write!(f, "LoROM"),
            BankMode::HiRom => write!(f, "HiROM"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RomHeader {
    pub title: String,
    pub bank_mode: BankMode,
    pub rom_size: usize,
    pub sram_size: usize,
    pub rom_size_flag: u8,
    pub sram_size_flag: u8,
    pub region: u8,
    pub license: u8,
    pub version: u8,
    pub checksum: u16,
    pub checksum_complement: u16,
}

impl RomHeader {
    /// Bytes of battery RAM the cartridge board carries (`1KB << flag`, capped at 128KB).
    pub fn sram_bytes(&self) -> usize {
        match self.sram_size_flag {
            0 => 0,
            f if f > 7 => 0x2_0000,
            f => (0x400usize << f).min(0x2_0000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumReport {
    pub calculated: u16,
    pub expected: u16,
    pub complement: u16,
    pub valid: bool,
}

pub struct RomImage {
    data: Vec<u8>,
    pub header: RomHeader,
    pub checksum: ChecksumReport,
    pub had_copier_header: bool,
}

impl RomImage {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let mut file = File::open(path).map_err(|e| format!("Failed to open ROM file: {}", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| format!("Failed to read ROM file: {}", e))?;

        Self::load_from_bytes(data)
    }

    pub fn load_from_bytes(mut data: Vec<u8>) -> Result<Self, String> {
        let had_copier_header = data.len() % 1024 == COPIER_HEADER_SIZE;
        if had_copier_header {
            data.drain(0..COPIER_HEADER_SIZE);
        }

        validate_size(data.len())?;

        let header = parse_header(&data);
        let checksum = verify_checksum(&data);
        if !checksum.valid && !crate::debug_flags::quiet() {
            log::warn!(
                "ROM checksum mismatch: calculated=0x{:04X} stored=0x{:04X} complement=0x{:04X}",
                checksum.calculated,
                checksum.expected,
                checksum.complement
            );
        }

        Ok(RomImage {
            data,
            header,
            checksum,
            had_copier_header,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub fn validate_size(size: usize) -> Result<(), String> {
    if size < MIN_ROM_SIZE {
        return Err(format!(
            "ROM file too small ({:.1}KB). Minimum size: {:.1}KB",
            size as f64 / 1024.0,
            MIN_ROM_SIZE as f64 / 1024.0
        ));
    }
    if size > MAX_ROM_SIZE {
        return Err(format!(
            "ROM file too large ({:.1}MB). Maximum size: {:.1}MB",
            size as f64 / 1024.0 / 1024.0,
            MAX_ROM_SIZE as f64 / 1024.0 / 1024.0
        ));
    }
    if size % 1024 != 0 {
        return Err("Invalid ROM size. Must be a multiple of 1KB".to_string());
    }
    Ok(())
}

// `1024 << (flag - 7)`; zero flag means "not present".
fn decode_size_flag(flag: u8) -> usize {
    match flag {
        0 => 0,
        f if f >= 7 => 1024usize.checked_shl(u32::from(f - 7)).unwrap_or(0),
        f => 1024usize >> (7 - f),
    }
}

fn extract_title(title_bytes: &[u8]) -> String {
    let mut title = String::new();
    for &byte in title_bytes {
        match byte {
            0x00 => continue,
            0x20..=0x7E => title.push(byte as char),
            _ => title.push('?'),
        }
    }
    title.trim().to_string()
}

/// Caller guarantees `rom.len() >= MIN_ROM_SIZE`.
pub fn parse_header(rom: &[u8]) -> RomHeader {
    let h = HEADER_OFFSET;
    let title = extract_title(&rom[h + 0x10..h + 0x10 + TITLE_LENGTH]);
    let bank_mode = if rom[h + 0x25] & 0x01 == 0 {
        BankMode::LoRom
    } else {
        BankMode::HiRom
    };
    let rom_size_flag = rom[h + 0x27];
    let sram_size_flag = rom[h + 0x28];

    RomHeader {
        title,
        bank_mode,
        rom_size: decode_size_flag(rom_size_flag),
        sram_size: decode_size_flag(sram_size_flag),
        rom_size_flag,
        sram_size_flag,
        region: rom[h + 0x29],
        license: rom[h + 0x2A],
        version: rom[h + 0x2B],
        checksum_complement: u16::from_le_bytes([rom[h + 0x2C], rom[h + 0x2D]]),
        checksum: u16::from_le_bytes([rom[h + 0x2E], rom[h + 0x2F]]),
    }
}

pub fn calculate_checksum(rom: &[u8]) -> u16 {
    rom.iter()
        .enumerate()
        .filter(|(i, _)| !CHECKSUM_FIELD.contains(i))
        .fold(0u32, |acc, (_, &b)| acc.wrapping_add(b as u32)) as u16
}

pub fn verify_checksum(rom: &[u8]) -> ChecksumReport {
    let h = HEADER_OFFSET;
    let complement = u16::from_le_bytes([rom[h + 0x2C], rom[h + 0x2D]]);
    let expected = u16::from_le_bytes([rom[h + 0x2E], rom[h + 0x2F]]);
    let calculated = calculate_checksum(rom);
    let valid = calculated == expected && calculated as u32 + complement as u32 == 0xFFFF;
    ChecksumReport {
        calculated,
        expected,
        complement,
        valid,
    }
}

/// Builds an in-memory cartridge image with a consistent header and checksum.
#[cfg(test)]
pub(crate) fn build_test_rom(size: usize, mode: BankMode, reset_vector: u16, program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; size];
    let h = HEADER_OFFSET;
    let title = b"TEST CARTRIDGE";
    rom[h + 0x10..h + 0x10 + title.len()].copy_from_slice(title);
    for b in &mut rom[h + 0x10 + title.len()..h + 0x10 + TITLE_LENGTH] {
        *b = b' ';
    }
    rom[h + 0x25] = match mode {
        BankMode::LoRom => 0x20,
        BankMode::HiRom => 0x21,
    };
    rom[h + 0x27] = 0x08;
    rom[h + 0x28] = 0x03;
    rom[h + 0x29] = 0x01;
    rom[h + 0x2B] = 0x00;

    // Reset vector lives at CPU $00:FFFC in both mappings.
    let vector_offset = match mode {
        BankMode::LoRom => 0x7FFC,
        BankMode::HiRom => 0xFFFC,
    };
    rom[vector_offset] = reset_vector as u8;
    rom[vector_offset + 1] = (reset_vector >> 8) as u8;

    let program_offset = match mode {
        BankMode::LoRom => (reset_vector as usize) & 0x7FFF,
        BankMode::HiRom => reset_vector as usize,
    };
    rom[program_offset..program_offset + program.len()].copy_from_slice(program);

    let sum = calculate_checksum(&rom);
    let complement = !sum;
    rom[h + 0x2C..h + 0x2E].copy_from_slice(&complement.to_le_bytes());
    rom[h + 0x2E..h + 0x30].copy_from_slice(&sum.to_le_bytes());
    rom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lorom_checksum() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &[0xEA]);
        let image = RomImage::load_from_bytes(rom).unwrap();
        assert!(image.checksum.valid);
        assert_eq!(image.header.bank_mode, BankMode::LoRom);
        assert_eq!(image.header.title, "TEST CARTRIDGE");
    }

    #[test]
    fn test_flipping_payload_byte_invalidates_checksum() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &[]);
        for &offset in &[0x0000usize, 0x1234, 0x7FFF - 4] {
            let mut broken = rom.clone();
            broken[offset] ^= 0x01;
            let report = verify_checksum(&broken);
            assert!(!report.valid, "offset {:#X} should break checksum", offset);
        }
    }

    #[test]
    fn test_checksum_failure_is_not_fatal() {
        let mut rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &[]);
        rom[0x10] ^= 0xFF;
        let image = RomImage::load_from_bytes(rom).unwrap();
        assert!(!image.checksum.valid);
    }

    #[test]
    fn test_bank_mode_from_map_byte_bit0() {
        for &size in &[0x8000usize, 0x10000, 0x40000] {
            let mut rom = vec![0u8; size];
            rom[HEADER_OFFSET + 0x25] = 0x31;
            assert_eq!(parse_header(&rom).bank_mode, BankMode::HiRom);
            rom[HEADER_OFFSET + 0x25] = 0x30;
            assert_eq!(parse_header(&rom).bank_mode, BankMode::LoRom);
        }
    }

    #[test]
    fn test_copier_header_is_stripped() {
        let rom = build_test_rom(0x8000, BankMode::LoRom, 0x8000, &[]);
        let mut with_header = vec![0xFFu8; 512];
        with_header.extend_from_slice(&rom);
        let image = RomImage::load_from_bytes(with_header).unwrap();
        assert!(image.had_copier_header);
        assert_eq!(image.len(), 0x8000);
        assert!(image.checksum.valid);
    }

    #[test]
    fn test_size_rejections() {
        let err = RomImage::load_from_bytes(vec![0; 0x4000]).err().unwrap();
        assert_eq!(err, "ROM file too small (16.0KB). Minimum size: 32.0KB");

        let err = RomImage::load_from_bytes(vec![0; 0x8000 + 100]).err().unwrap();
        assert_eq!(err, "Invalid ROM size. Must be a multiple of 1KB");

        let err = validate_size(MAX_ROM_SIZE + 1024).err().unwrap();
        assert!(err.starts_with("ROM file too large"));
    }

    #[test]
    fn test_size_flags() {
        assert_eq!(decode_size_flag(0), 0);
        assert_eq!(decode_size_flag(7), 1024);
        assert_eq!(decode_size_flag(8), 2048);
        assert_eq!(decode_size_flag(12), 32 * 1024);
    }
}
