//! Bootloader configuration
//!
//! Installs either systemd-boot or GRUB into the mounted target. Both paths
//! run inside `arch-chroot`; systemd-boot entries are written directly into
//! `<root>/boot/loader`.

use std::path::Path;

use tracing::info;

use crate::command::{Executor, chroot};
use crate::config::InstallSettings;
use crate::error::Result;
use crate::hardware::Microcode;
use crate::partition::PartitionPlan;
use crate::types::{Bootloader, GpuDriver, Kernel};

pub const LOADER_CONF: &str = "default arch.conf\ntimeout 3\nconsole-mode max\neditor no\n";

const GRUB_DEFAULTS: &str = "etc/default/grub";
const GRUB_CMDLINE_KEY: &str = "GRUB_CMDLINE_LINUX_DEFAULT";

/// One systemd-boot loader entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    pub title: String,
    pub kernel_image_path: String,
    /// Microcode image first when present, then the initramfs.
    pub initrd_lines: Vec<String>,
    pub options_line: String,
}

impl BootEntry {
    pub fn render(&self) -> String {
        let mut out = format!("title   {}\nlinux   {}\n", self.title, self.kernel_image_path);
        for initrd in &self.initrd_lines {
            out.push_str(&format!("initrd  {}\n", initrd));
        }
        out.push_str(&format!("options {}\n", self.options_line));
        out
    }
}

/// Kernel command line for the installed system.
pub fn kernel_options(root_partition: &Path, gpu: GpuDriver) -> String {
    let mut options = format!("root={} rw quiet", root_partition.display());
    if gpu == GpuDriver::Nvidia {
        options.push_str(" nvidia_drm.modeset=1");
    }
    options
}

/// The default and fallback entries, keyed by file name.
pub fn boot_entries(
    kernel: Kernel,
    options: &str,
    microcode: Option<Microcode>,
) -> [(String, BootEntry); 2] {
    let pkg = kernel.package();
    let entry = |title: String, image: String| {
        let mut initrd_lines = Vec::new();
        if let Some(ucode) = microcode {
            initrd_lines.push(format!("/{}", ucode.image()));
        }
        initrd_lines.push(image);
        BootEntry {
            title,
            kernel_image_path: format!("/vmlinuz-{}", pkg),
            initrd_lines,
            options_line: options.to_string(),
        }
    };
    [
        (
            "arch.conf".to_string(),
            entry(format!("Arch Linux ({})", pkg), format!("/initramfs-{}.img", pkg)),
        ),
        (
            "arch-fallback.conf".to_string(),
            entry(
                format!("Arch Linux ({}, fallback initramfs)", pkg),
                format!("/initramfs-{}-fallback.img", pkg),
            ),
        ),
    ]
}

/// Install the microcode package into the target. Returns its image name.
pub fn install_microcode<E: Executor>(
    exec: &mut E,
    root: &Path,
    microcode: Option<Microcode>,
) -> Result<Option<&'static str>> {
    let Some(ucode) = microcode else {
        return Ok(None);
    };
    exec.run(
        &chroot(root, "pacman")
            .args(["-S", "--noconfirm", "--needed"])
            .arg(ucode.package()),
    )?;
    Ok(Some(ucode.image()))
}

pub fn configure_systemd_boot<E: Executor>(
    exec: &mut E,
    root: &Path,
    settings: &InstallSettings,
    plan: &PartitionPlan,
    microcode: Option<Microcode>,
) -> Result<()> {
    exec.run(&chroot(root, "bootctl").args(["--esp-path=/boot", "install"]))?;

    let loader_dir = root.join("boot/loader");
    let entries_dir = loader_dir.join("entries");
    exec.create_dir_all(&entries_dir)?;
    exec.write_file(&loader_dir.join("loader.conf"), LOADER_CONF)?;

    let options = kernel_options(&plan.root_partition, settings.gpu);
    for (file, entry) in boot_entries(settings.kernel, &options, microcode) {
        exec.write_file(&entries_dir.join(file), &entry.render())?;
    }
    info!("systemd-boot installed with default and fallback entries");
    Ok(())
}

pub fn configure_grub<E: Executor>(exec: &mut E, root: &Path, microcode_image: Option<&str>) -> Result<()> {
    exec.run(
        &chroot(root, "pacman")
            .args(["-S", "--noconfirm", "--needed", "grub", "efibootmgr"]),
    )?;
    exec.run(&chroot(root, "grub-install").args([
        "--target=x86_64-efi",
        "--efi-directory=/boot",
        "--bootloader-id=GRUB",
    ]))?;

    if let Some(image) = microcode_image {
        let defaults = root.join(GRUB_DEFAULTS);
        let current = if exec.path_exists(&defaults) {
            exec.read_file(&defaults)?
        } else {
            String::new()
        };
        let updated = add_kernel_param(&current, GRUB_CMDLINE_KEY, &format!("initrd=/{}", image));
        exec.write_file(&defaults, &updated)?;
    }

    exec.run(&chroot(root, "grub-mkconfig").args(["-o", "/boot/grub/grub.cfg"]))?;
    info!("GRUB installed");
    Ok(())
}

/// Install the microcode and the selected bootloader.
pub fn configure<E: Executor>(
    exec: &mut E,
    root: &Path,
    settings: &InstallSettings,
    plan: &PartitionPlan,
    microcode: Option<Microcode>,
) -> Result<()> {
    let image = install_microcode(exec, root, microcode)?;
    match settings.bootloader {
        Bootloader::SystemdBoot => configure_systemd_boot(exec, root, settings, plan, microcode),
        Bootloader::Grub => configure_grub(exec, root, image),
    }
}

/// Append `param` to the quoted value of `key` in a GRUB defaults file.
/// The line is added if missing.
fn add_kernel_param(content: &str, key: &str, param: &str) -> String {
    let prefix = format!("{}=", key);
    let mut found = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let Some(value) = line.trim_start().strip_prefix(&prefix) else {
                return line.to_string();
            };
            found = true;
            let inner = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            if inner.split_whitespace().any(|p| p == param) {
                return line.to_string();
            }
            if inner.is_empty() {
                format!("{}\"{}\"", prefix, param)
            } else {
                format!("{}\"{} {}\"", prefix, inner, param)
            }
        })
        .collect();
    if !found {
        lines.push(format!("{}\"{}\"", prefix, param));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
