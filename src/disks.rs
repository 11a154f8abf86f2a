//! Disk and device inspection
//!
//! Enumerates candidate install targets with `lsblk`, finds what is mounted
//! from a device and unmounts it before partitioning.
//!
//! `lsblk -r` (raw) output is used throughout: one device per line, columns
//! separated by single spaces, spaces inside values escaped as `\x20`.
//! Lines that do not parse are skipped, never fatal.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::command::{CommandSpec, Executor};
use crate::error::{InstallError, Result};

/// Block device type as reported in lsblk's TYPE column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Disk,
    Part,
}

/// One row of `lsblk -n -r -o NAME,SIZE,TYPE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub size_label: String,
    pub kind: DeviceKind,
}

impl DeviceDescriptor {
    pub fn path(&self) -> PathBuf {
        Path::new("/dev").join(&self.name)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path().display(), self.size_label)
    }
}

/// Parse raw lsblk output. Other device types (loop, rom, crypt, lvm) and
/// malformed lines are dropped.
pub fn parse_lsblk(output: &str) -> Vec<DeviceDescriptor> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let (name, size, kind) = match (cols.next(), cols.next(), cols.next()) {
                (Some(n), Some(s), Some(t)) => (n, s, t),
                _ => {
                    if !line.trim().is_empty() {
                        debug!("Skipping malformed lsblk line: {:?}", line);
                    }
                    return None;
                }
            };
            let kind = match kind {
                "disk" => DeviceKind::Disk,
                "part" => DeviceKind::Part,
                _ => return None,
            };
            Some(DeviceDescriptor {
                name: unescape(name),
                size_label: size.to_string(),
                kind,
            })
        })
        .collect()
}

/// Decode lsblk's `\xHH` escapes.
fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            if let Some(b) = std::str::from_utf8(&bytes[i + 2..i + 4])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(b);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Lists install targets and remembers which device has been committed to.
///
/// Once [`commit`](Self::commit) is called for a device, partitioning is
/// under way on it: it no longer appears in [`list_disks`](Self::list_disks)
/// and [`select`](Self::select) refuses it.
#[derive(Debug, Default)]
pub struct DiskInspector {
    committed: BTreeSet<PathBuf>,
}

impl DiskInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole disks available as install targets.
    pub fn list_disks<E: Executor>(&self, exec: &mut E) -> Result<Vec<DeviceDescriptor>> {
        let out = exec.run(
            &CommandSpec::new("lsblk")
                .args(["-n", "-r", "-o", "NAME,SIZE,TYPE"])
                .capture()
                .read_only(),
        )?;
        let disks: Vec<_> = parse_lsblk(&out.stdout)
            .into_iter()
            .filter(|d| d.kind == DeviceKind::Disk && !self.committed.contains(&d.path()))
            .collect();
        debug!("Found {} candidate disks", disks.len());
        Ok(disks)
    }

    /// Pick entry `index` from a previous [`list_disks`](Self::list_disks) result.
    pub fn select(&self, disks: &[DeviceDescriptor], index: usize) -> Result<DeviceDescriptor> {
        let disk = disks.get(index).ok_or_else(|| {
            InstallError::precondition(format!(
                "disk index {} out of range ({} disks)",
                index,
                disks.len()
            ))
        })?;
        if self.committed.contains(&disk.path()) {
            return Err(InstallError::precondition(format!(
                "{} is already being partitioned",
                disk.path().display()
            )));
        }
        Ok(disk.clone())
    }

    pub fn commit(&mut self, device: &Path) {
        info!("Committed to {}", device.display());
        self.committed.insert(device.to_path_buf());
    }

    pub fn is_committed(&self, device: &Path) -> bool {
        self.committed.contains(device)
    }
}

/// A mounted filesystem or active swap backed by the inspected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub source: PathBuf,
    /// Mount target, or `[SWAP]` for swap.
    pub target: String,
}

impl MountPoint {
    pub fn is_swap(&self) -> bool {
        self.target == "[SWAP]"
    }

    fn depth(&self) -> usize {
        Path::new(&self.target).components().count()
    }
}

/// Everything mounted from `device` or its partitions.
pub fn mount_points<E: Executor>(exec: &mut E, device: &Path) -> Result<Vec<MountPoint>> {
    let out = exec.run(
        &CommandSpec::new("lsblk")
            .args(["-n", "-r", "-o", "NAME,MOUNTPOINT"])
            .path_arg(device)
            .capture()
            .read_only(),
    )?;
    Ok(out
        .stdout
        .lines()
        .filter_map(|line| {
            let (name, target) = line.split_once(' ')?;
            let target = unescape(target.trim());
            if target.is_empty() {
                return None;
            }
            Some(MountPoint {
                source: Path::new("/dev").join(unescape(name)),
                target,
            })
        })
        .collect())
}

pub fn is_mounted<E: Executor>(exec: &mut E, device: &Path) -> Result<bool> {
    Ok(!mount_points(exec, device)?.is_empty())
}

fn already_gone(err: &InstallError) -> bool {
    err.stderr()
        .map(|s| {
            let s = s.to_lowercase();
            s.contains("not mounted") || s.contains("not found")
        })
        .unwrap_or(false)
}

/// Unmount everything on `device`, deepest mount point first, and turn off
/// swap on it. Safe to call when nothing is mounted.
pub fn unmount_all<E: Executor>(exec: &mut E, device: &Path) -> Result<()> {
    let mut mounts = mount_points(exec, device)?;
    if mounts.is_empty() {
        debug!("Nothing mounted from {}", device.display());
        return Ok(());
    }
    mounts.sort_by(|a, b| b.depth().cmp(&a.depth()));

    for mount in &mounts {
        let spec = if mount.is_swap() {
            CommandSpec::new("swapoff").path_arg(&mount.source)
        } else {
            CommandSpec::new("umount").arg("-f").arg(mount.target.as_str())
        };
        match exec.run(&spec) {
            Ok(_) => {}
            Err(e) if already_gone(&e) => {
                debug!("{} was already released", mount.target);
            }
            Err(e) => return Err(e),
        }
    }
    info!("Released {} mount(s) from {}", mounts.len(), device.display());
    Ok(())
}
