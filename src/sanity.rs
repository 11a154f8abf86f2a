//! Pre-flight sanity checks for runtime environment
//!
//! Run before the terminal UI starts:
//! - Every external tool the pipeline calls is in PATH
//! - Running with root privileges (EUID 0), unless this is a dry run
//!
//! If a check fails, the program exits with a clear error message before the
//! TUI is initialized.

use std::process::{Command, Stdio};

use tracing::{debug, error, info};

use crate::process_guard::CommandProcessGroup;

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
    /// Dry runs do not need root.
    pub root_required: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && (self.is_root || !self.root_required)
    }
}

/// Tools run on the live system. Everything else runs inside `arch-chroot`.
pub const REQUIRED_BINARIES: &[&str] = &[
    "lsblk",       // Disk listing (util-linux)
    "wipefs",      // Signature wipe (util-linux)
    "sgdisk",      // GPT partitioning (gptfdisk)
    "mkfs.fat",    // EFI partition (dosfstools)
    "mkfs.ext4",   // Root filesystem (e2fsprogs)
    "mount",
    "umount",
    "swapoff",
    "reflector",   // Mirror ranking
    "pacstrap",    // Base install (arch-install-scripts)
    "genfstab",
    "arch-chroot",
];

fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .in_new_process_group()
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Perform all sanity checks and return the result
pub fn verify_environment(root_required: bool) -> SanityCheckResult {
    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(binary))
        .map(|binary| binary.to_string())
        .collect();

    SanityCheckResult {
        missing_binaries,
        is_root: is_running_as_root(),
        root_required,
    }
}

/// Human-readable report for a failed check.
pub fn render_report(result: &SanityCheckResult) -> String {
    let mut out = String::new();
    out.push_str("\n╔══════════════════════════════════════════════════════════════════╗\n");
    out.push_str("║                 miniarch - Pre-flight Check Failed               ║\n");
    out.push_str("╚══════════════════════════════════════════════════════════════════╝\n\n");

    if result.root_required && !result.is_root {
        out.push_str("❌ ERROR: Root privileges required\n");
        out.push_str("   The installer partitions disks and installs packages.\n\n");
        out.push_str("   Solution: run as root, or pass --dry-run to preview:\n");
        out.push_str("     sudo miniarch\n\n");
    }

    if !result.missing_binaries.is_empty() {
        out.push_str("❌ ERROR: Missing required binaries\n\n");
        for binary in &result.missing_binaries {
            out.push_str(&format!(
                "   • {} (install: pacman -S {})\n",
                binary,
                get_package_for_binary(binary)
            ));
        }
        let mut packages: Vec<&str> = result
            .missing_binaries
            .iter()
            .map(|b| get_package_for_binary(b))
            .collect();
        packages.sort_unstable();
        packages.dedup();
        out.push_str("\n   Solution: Install missing packages:\n");
        out.push_str(&format!("     pacman -S {}\n\n", packages.join(" ")));
    }

    out.push_str("╔══════════════════════════════════════════════════════════════════╗\n");
    out.push_str("║  Fix the above issues and try again.                             ║\n");
    out.push_str("╚══════════════════════════════════════════════════════════════════╝\n");
    out
}

/// Map binary names to their Arch Linux package names
fn get_package_for_binary(binary: &str) -> &'static str {
    match binary {
        "lsblk" | "wipefs" | "mount" | "umount" | "swapoff" => "util-linux",
        "sgdisk" => "gptfdisk",
        "mkfs.fat" => "dosfstools",
        "mkfs.ext4" => "e2fsprogs",
        "reflector" => "reflector",
        "pacstrap" | "genfstab" | "arch-chroot" => "arch-install-scripts",
        _ => "unknown",
    }
}

/// Verify the environment; print the report and exit 1 on failure.
/// Call this before initializing the TUI.
pub fn run_preflight_checks(root_required: bool) {
    debug!("Running pre-flight sanity checks...");

    let result = verify_environment(root_required);
    if !result.is_ok() {
        error!(
            "Pre-flight checks failed: root={}, missing={:?}",
            result.is_root,
            result.missing_binaries
        );
        eprint!("{}", render_report(&result));
        std::process::exit(1);
    }

    info!("Pre-flight checks passed: root={}, all binaries present", result.is_root);
}
