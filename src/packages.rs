//! Package & service resolver
//!
//! Translates the kernel/GPU/desktop choices into the package set handed to
//! `pacstrap` and the services enabled in the target.
//!
//! Pure logic: no I/O. The result is a `BTreeSet`, so the set passed to
//! `pacstrap` is duplicate-free and its order deterministic.

use std::collections::BTreeSet;
use std::str::FromStr;

use tracing::warn;

use crate::types::{Desktop, GpuDriver, Kernel};

/// Always installed, alongside the kernel and its headers.
pub const BASE_PACKAGES: &[&str] = &["base", "networkmanager", "sudo"];

pub mod gpu_packages {
    pub const NVIDIA: &[&str] = &["nvidia-dkms", "nvidia-utils", "nvidia-settings"];
    pub const AMD: &[&str] = &["xf86-video-amdgpu", "mesa", "vulkan-radeon"];
    pub const INTEL: &[&str] = &["mesa", "vulkan-intel", "xf86-video-intel"];
}

pub mod desktop_packages {
    pub const BSPWM: &[&str] = &["bspwm", "sxhkd", "alacritty", "polybar", "xorg", "xorg-xinit"];
    pub const HYPRLAND: &[&str] = &[
        "hyprland",
        "waybar",
        "alacritty",
        "xdg-desktop-portal-hyprland",
    ];
    pub const GNOME: &[&str] = &["gnome", "gdm"];
    pub const KDE: &[&str] = &["plasma", "sddm", "konsole"];
}

pub type PackageSet = BTreeSet<String>;

// ============================================================================
// Package Resolution
// ============================================================================

fn gpu_set(gpu: GpuDriver) -> &'static [&'static str] {
    match gpu {
        GpuDriver::Nvidia => gpu_packages::NVIDIA,
        GpuDriver::Amd => gpu_packages::AMD,
        GpuDriver::Intel => gpu_packages::INTEL,
    }
}

fn desktop_set(desktop: Desktop) -> &'static [&'static str] {
    match desktop {
        Desktop::Bspwm => desktop_packages::BSPWM,
        Desktop::Hyprland => desktop_packages::HYPRLAND,
        Desktop::Gnome => desktop_packages::GNOME,
        Desktop::Kde => desktop_packages::KDE,
    }
}

fn assemble(kernel: Kernel, gpu: &[&str], desktop: &[&str]) -> PackageSet {
    let mut packages: PackageSet = BASE_PACKAGES.iter().map(|p| p.to_string()).collect();
    packages.insert(kernel.package().to_string());
    packages.insert(format!("{}-headers", kernel.package()));
    packages.extend(gpu.iter().map(|p| p.to_string()));
    packages.extend(desktop.iter().map(|p| p.to_string()));
    packages
}

/// Union of the base, GPU and desktop package sets for the chosen kernel.
pub fn resolve_packages(kernel: Kernel, gpu: GpuDriver, desktop: Desktop) -> PackageSet {
    assemble(kernel, gpu_set(gpu), desktop_set(desktop))
}

/// String form of [`resolve_packages`].
///
/// An unrecognized GPU or desktop name contributes no packages. An
/// unrecognized kernel name falls back to `linux`. Both are logged.
pub fn resolve_packages_by_name(kernel: &str, gpu: &str, desktop: &str) -> PackageSet {
    let kernel = Kernel::from_str(kernel).unwrap_or_else(|_| {
        warn!("Unknown kernel '{}', falling back to linux", kernel);
        Kernel::Linux
    });
    let gpu: &[&str] = match GpuDriver::from_str(gpu) {
        Ok(gpu) => gpu_set(gpu),
        Err(_) => {
            warn!("Unknown GPU driver '{}', no driver packages added", gpu);
            &[]
        }
    };
    let desktop: &[&str] = match Desktop::from_str(desktop) {
        Ok(desktop) => desktop_set(desktop),
        Err(_) => {
            warn!("Unknown desktop '{}', no desktop packages added", desktop);
            &[]
        }
    };
    assemble(kernel, gpu, desktop)
}

// ============================================================================
// Service Resolution
// ============================================================================

/// Services to `systemctl enable` in the target, in enable order.
///
/// NetworkManager is always first; the display manager follows for desktops
/// that ship one.
pub fn resolve_services(desktop: Desktop) -> Vec<String> {
    let mut services = vec!["NetworkManager".to_string()];
    if let Some(dm) = desktop.display_manager() {
        services.push(dm.to_string());
    }
    services
}
