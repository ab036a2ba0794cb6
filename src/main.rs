use snes_emulator::console::{Console, ConsoleConfig};
use snes_emulator::debug_flags;
use std::env;
use std::path::{Path, PathBuf};
use std::process;

const ROM_EXTENSIONS: [&str; 2] = ["sfc", "smc"];

fn with_ext(base: &Path) -> Option<PathBuf> {
    if base.extension().is_some() {
        return None;
    }
    ROM_EXTENSIONS
        .iter()
        .map(|ext| base.with_extension(ext))
        .find(|p| p.exists())
}

fn resolve_rom_path(arg: &str) -> Result<PathBuf, String> {
    // 1) そのままのパス
    let direct = PathBuf::from(arg);
    if direct.exists() {
        return Ok(direct);
    }
    // 2) 拡張子補完
    if let Some(p) = with_ext(&direct) {
        return Ok(p);
    }
    // 3) roms/ 以下
    let in_roms = Path::new("roms").join(arg);
    if in_roms.exists() {
        return Ok(in_roms);
    }
    if let Some(p) = with_ext(&in_roms) {
        return Ok(p);
    }

    let available = std::fs::read_dir("roms")
        .ok()
        .into_iter()
        .flat_map(|it| it.flatten())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|ext| ROM_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
                .unwrap_or(false)
        })
        .map(|p| format!("- {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(if available.is_empty() {
        format!(
            "ROM '{}' not found. Place *.sfc or *.smc files under ./roms or provide a valid path.",
            arg
        )
    } else {
        format!("ROM '{}' not found. Available ROMs under ./roms:\n{}", arg, available)
    })
}

// FNV-1a over the RGBA frame, so runs can be compared without dumping images.
fn frame_hash(frame: &[u8]) -> u64 {
    frame.iter().fold(0xcbf2_9ce4_8422_2325u64, |h, &b| {
        (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01B3)
    })
}

fn usage(program: &str) {
    eprintln!("Usage: {} [--save-state PATH] <rom> [frames]", program);
    eprintln!("Supported formats: .sfc, .smc");
}

fn main() {
    env_logger::Builder::from_default_env().init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("snes-emulator");
    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        usage(program);
        return;
    }

    let mut positional: Vec<&str> = Vec::new();
    let mut save_path: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--save-state" => {
                let Some(p) = args.get(i + 1) else {
                    eprintln!("--save-state requires a value");
                    process::exit(2);
                };
                save_path = Some(PathBuf::from(p));
                i += 2;
            }
            s if s.starts_with('-') => {
                eprintln!("Unknown option: {}", s);
                process::exit(2);
            }
            s => {
                positional.push(s);
                i += 1;
            }
        }
    }

    let Some(rom_arg) = positional.first() else {
        eprintln!("ROM argument missing");
        process::exit(2);
    };
    let frames = match positional.get(1) {
        Some(n) => match n.parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("Invalid frame count: {}", n);
                process::exit(2);
            }
        },
        None => debug_flags::headless_frames(),
    };

    let rom_path = match resolve_rom_path(rom_arg) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };

    let quiet = debug_flags::quiet();
    if !quiet {
        println!("Loading ROM: {}", rom_path.display());
    }

    let mut console = Console::new(ConsoleConfig::from_env());
    match console.load_rom_file(&rom_path) {
        Ok(header) => {
            if !quiet {
                println!("Title: {}", header.title);
                println!("Mapping: {}", header.bank_mode);
                println!("ROM Size: {} KB", header.rom_size / 1024);
                println!("SRAM Size: {} KB", header.sram_bytes() / 1024);
                println!("Region: {:02X}  Version: {:02X}", header.region, header.version);
            }
        }
        Err(e) => {
            eprintln!("Failed to load ROM: {}", e);
            process::exit(1);
        }
    }
    if let Some(report) = console.checksum() {
        if !quiet {
            println!(
                "Checksum: {} (calculated {:04X}, header {:04X}, complement {:04X})",
                if report.valid { "OK" } else { "MISMATCH" },
                report.calculated,
                report.expected,
                report.complement
            );
        }
    }

    let mut audio_frames = 0usize;
    for _ in 0..frames {
        if !console.run_frame() {
            break;
        }
        audio_frames += console.take_audio_samples().len() / 2;
    }

    println!(
        "Frames: {}  CPU cycles: {}  Audio samples: {}  Frame hash: {:016X}  PC: {:04X}",
        console.frame_count(),
        console.cpu_cycles(),
        audio_frames,
        frame_hash(console.frame_buffer()),
        console.cpu_snapshot().pc
    );

    if let Some(path) = save_path {
        if let Err(e) = console.capture_state().save_to_file(&path) {
            eprintln!("{}", e);
            process::exit(1);
        }
        if !quiet {
            println!("Save state written to {}", path.display());
        }
    }
}
