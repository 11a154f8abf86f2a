//! Partition planner
//!
//! Computes the fixed two-partition GPT layout for the target device and the
//! exact command sequence that lays it down:
//!
//! | # | Partition | Size      | Type   | Filesystem | Mounted at     |
//! |---|-----------|-----------|--------|------------|----------------|
//! | 1 | EFI       | 1 GiB     | `ef00` | FAT32      | `<root>/boot`  |
//! | 2 | Root      | remainder | `8300` | ext4       | `<root>`       |
//!
//! Planning is pure. [`materialize`] is the only function here with side
//! effects, and any failure it reports leaves the device in an unknown state.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::command::{CommandSpec, Executor};
use crate::error::{InstallError, Result};

pub const EFI_PARTITION_NUMBER: u32 = 1;
pub const ROOT_PARTITION_NUMBER: u32 = 2;
pub const EFI_SIZE: &str = "+1G";
/// `0` is sgdisk for "to the end of the disk".
pub const ROOT_SIZE: &str = "0";

const EFI_TYPE: &str = "ef00";
const ROOT_TYPE: &str = "8300";

/// Layout of the target device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    pub device: PathBuf,
    pub efi_partition: PathBuf,
    pub root_partition: PathBuf,
    pub efi_size_spec: String,
    pub root_size_spec: String,
}

impl PartitionPlan {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        let device = device.into();
        Self {
            efi_partition: partition_path(&device, EFI_PARTITION_NUMBER),
            root_partition: partition_path(&device, ROOT_PARTITION_NUMBER),
            device,
            efi_size_spec: EFI_SIZE.to_string(),
            root_size_spec: ROOT_SIZE.to_string(),
        }
    }

    /// Commands that wipe, partition, format and mount, in execution order.
    pub fn commands(&self, mount_root: &Path) -> Vec<CommandSpec> {
        let boot = mount_root.join("boot");
        vec![
            CommandSpec::new("wipefs")
                .arg("-a")
                .path_arg(&self.device)
                .destructive(),
            CommandSpec::new("sgdisk")
                .arg("--zap-all")
                .path_arg(&self.device)
                .destructive(),
            CommandSpec::new("sgdisk")
                .arg("-o")
                .path_arg(&self.device)
                .destructive(),
            CommandSpec::new("sgdisk")
                .arg("-n")
                .arg(format!("{}:0:{}", EFI_PARTITION_NUMBER, self.efi_size_spec))
                .arg("-t")
                .arg(format!("{}:{}", EFI_PARTITION_NUMBER, EFI_TYPE))
                .path_arg(&self.device)
                .destructive(),
            CommandSpec::new("sgdisk")
                .arg("-n")
                .arg(format!("{}:0:{}", ROOT_PARTITION_NUMBER, self.root_size_spec))
                .arg("-t")
                .arg(format!("{}:{}", ROOT_PARTITION_NUMBER, ROOT_TYPE))
                .path_arg(&self.device)
                .destructive(),
            CommandSpec::new("mkfs.fat")
                .args(["-F", "32"])
                .path_arg(&self.efi_partition)
                .destructive(),
            CommandSpec::new("mkfs.ext4")
                .arg("-F")
                .path_arg(&self.root_partition)
                .destructive(),
            CommandSpec::new("mount")
                .path_arg(&self.root_partition)
                .path_arg(mount_root),
            CommandSpec::new("mkdir").arg("-p").path_arg(&boot),
            CommandSpec::new("mount")
                .path_arg(&self.efi_partition)
                .path_arg(&boot),
        ]
    }

    /// Human-readable description, one command per line.
    pub fn summary(&self, mount_root: &Path) -> String {
        let mut lines = vec![
            format!("Target: {}", self.device.display()),
            format!(
                "  EFI:  {} ({}, FAT32, {})",
                self.efi_partition.display(),
                self.efi_size_spec,
                mount_root.join("boot").display()
            ),
            format!(
                "  Root: {} (remainder, ext4, {})",
                self.root_partition.display(),
                mount_root.display()
            ),
            "  Commands:".to_string(),
        ];
        for (i, spec) in self.commands(mount_root).iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, spec.display()));
        }
        lines.join("\n")
    }
}

/// Device path of partition `number` on `device`.
///
/// Names ending in a digit (`nvme0n1`, `mmcblk0`, `loop0`) take a `p`
/// separator, as the kernel names them.
pub fn partition_path(device: &Path, number: u32) -> PathBuf {
    let base = device.to_string_lossy();
    if base.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{}p{}", base, number))
    } else {
        PathBuf::from(format!("{}{}", base, number))
    }
}

/// Run the plan's commands. Never retried.
///
/// Any failure is reported as [`InstallError::DeviceIndeterminate`]: the
/// device has to be wiped again before another attempt.
pub fn materialize<E: Executor>(exec: &mut E, plan: &PartitionPlan, mount_root: &Path) -> Result<()> {
    info!(
        "Partitioning {}: EFI {}, root {}",
        plan.device.display(),
        plan.efi_partition.display(),
        plan.root_partition.display()
    );
    for spec in plan.commands(mount_root) {
        if let Err(source) = exec.run(&spec) {
            error!(
                "Partitioning {} stopped at `{}`",
                plan.device.display(),
                spec.display()
            );
            return Err(InstallError::DeviceIndeterminate {
                device: plan.device.clone(),
                source: Box::new(source),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
