//! Checks on the engine executable before anything is run.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Executable formats the harness refuses to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Elf64,
    Elf32,
    MachO,
    /// Scripts and anything else we do not recognise.
    Other,
}

const MACHO_MAGICS: [[u8; 4]; 5] = [
    [0xfe, 0xed, 0xfa, 0xce],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
    [0xca, 0xfe, 0xba, 0xbe],
];

/// Classify an executable from its first bytes.
pub fn sniff_format(header: &[u8]) -> BinaryFormat {
    if header.len() >= 5 && header.starts_with(b"\x7fELF") {
        return match header[4] {
            1 => BinaryFormat::Elf32,
            _ => BinaryFormat::Elf64,
        };
    }
    if header.len() >= 4 && MACHO_MAGICS.iter().any(|magic| header.starts_with(magic)) {
        return BinaryFormat::MachO;
    }
    BinaryFormat::Other
}

/// Verify the engine binary exists and is in a runnable format.
///
/// Returns the path to execute. Bare relative paths gain a `./` prefix so the
/// binary is never looked up on `PATH`.
pub fn check_binary(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(Error::Environment("Binary file not found".to_string()));
    }

    let mut header = [0u8; 5];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;

    match sniff_format(&header[..read]) {
        BinaryFormat::MachO => Err(Error::Environment(
            "Binary file is in unsupported format (MacOS)".to_string(),
        )),
        BinaryFormat::Elf32 => Err(Error::Environment(
            "Binary file is in unsupported format (32-bit)".to_string(),
        )),
        BinaryFormat::Elf64 | BinaryFormat::Other => Ok(runnable_path(path)),
    }
}

fn runnable_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw.starts_with('.') || raw.starts_with('/') {
        path.to_path_buf()
    } else {
        Path::new(".").join(path)
    }
}
