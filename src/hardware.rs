//! Hardware environment detection
//!
//! Firmware mode decides whether an install can proceed at all (only UEFI
//! targets are supported); the CPU vendor decides which microcode package and
//! early-load image the bootloader references.

use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::command::Executor;

/// Present only when the live system booted through UEFI.
pub const EFI_FIRMWARE_DIR: &str = "/sys/firmware/efi";

pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Detected firmware mode of the running system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareMode {
    Uefi,
    Bios,
}

impl FirmwareMode {
    pub fn is_uefi(self) -> bool {
        matches!(self, Self::Uefi)
    }
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// UEFI if `/sys/firmware/efi` exists, BIOS otherwise.
pub fn detect_firmware_mode<E: Executor>(exec: &E) -> FirmwareMode {
    let mode = if exec.path_exists(Path::new(EFI_FIRMWARE_DIR)) {
        FirmwareMode::Uefi
    } else {
        FirmwareMode::Bios
    };
    info!("Firmware mode: {}", mode);
    mode
}

/// CPU microcode to install and load before the initramfs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Microcode {
    Intel,
    Amd,
}

impl Microcode {
    pub fn package(self) -> &'static str {
        match self {
            Self::Intel => "intel-ucode",
            Self::Amd => "amd-ucode",
        }
    }

    /// Image name under `/boot`.
    pub fn image(self) -> &'static str {
        match self {
            Self::Intel => "intel-ucode.img",
            Self::Amd => "amd-ucode.img",
        }
    }
}

/// Microcode for the CPU described by `cpuinfo`, read from its `vendor_id`
/// lines. Unknown vendors get `None`.
pub fn detect_microcode(cpuinfo: &str) -> Option<Microcode> {
    cpuinfo
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(key, _)| key.trim() == "vendor_id")
        .find_map(|(_, value)| match value.trim() {
            "GenuineIntel" => Some(Microcode::Intel),
            "AuthenticAMD" => Some(Microcode::Amd),
            _ => None,
        })
}

/// Read `/proc/cpuinfo` through `exec` and detect the microcode.
/// An unreadable file is a warning, not an error.
pub fn detect_host_microcode<E: Executor>(exec: &E) -> Option<Microcode> {
    match exec.read_file(Path::new(CPUINFO_PATH)) {
        Ok(cpuinfo) => {
            let microcode = detect_microcode(&cpuinfo);
            match microcode {
                Some(m) => info!("CPU microcode: {}", m.package()),
                None => info!("No microcode package for this CPU vendor"),
            }
            microcode
        }
        Err(e) => {
            warn!("Could not read {}: {}; skipping microcode", CPUINFO_PATH, e);
            None
        }
    }
}
