//! Menu option types
//!
//! Each installer menu offers a fixed set of mutually exclusive options.
//! The labels shown in the menu, written to the config store and accepted on
//! the command line are the strum serializations below.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Kernel package to install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
pub enum Kernel {
    #[default]
    #[strum(serialize = "linux")]
    Linux,
    #[strum(serialize = "linux-lts")]
    LinuxLts,
    #[strum(serialize = "linux-zen")]
    LinuxZen,
    #[strum(serialize = "linux-hardened")]
    LinuxHardened,
}

impl Kernel {
    /// Package name, also the suffix of `/vmlinuz-*` and `/initramfs-*.img`.
    pub fn package(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::LinuxLts => "linux-lts",
            Self::LinuxZen => "linux-zen",
            Self::LinuxHardened => "linux-hardened",
        }
    }
}

/// GPU driver stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum GpuDriver {
    #[strum(serialize = "nvidia")]
    Nvidia,
    #[strum(serialize = "amd")]
    Amd,
    #[strum(serialize = "intel")]
    Intel,
}

/// Desktop environment or window manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum Desktop {
    #[strum(serialize = "bspwm")]
    Bspwm,
    #[strum(serialize = "hyprland")]
    Hyprland,
    #[strum(serialize = "gnome")]
    Gnome,
    #[strum(serialize = "kde")]
    Kde,
}

impl Desktop {
    /// Display manager service enabled for this desktop, if any.
    pub fn display_manager(self) -> Option<&'static str> {
        match self {
            Self::Gnome => Some("gdm"),
            Self::Kde => Some("sddm"),
            Self::Bspwm | Self::Hyprland => None,
        }
    }
}

/// Bootloader selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
pub enum Bootloader {
    #[default]
    #[strum(serialize = "systemd-boot")]
    SystemdBoot,
    #[strum(serialize = "grub")]
    Grub,
}

/// Simple Yes/No option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Toggle {
    #[default]
    #[strum(serialize = "Yes")]
    Yes,
    #[strum(serialize = "No")]
    No,
}

impl Toggle {
    pub fn as_bool(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }
}

/// Menu labels for every variant of `T`, in declaration order.
pub fn labels<T: IntoEnumIterator + ToString>() -> Vec<String> {
    T::iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kernel_labels() {
        assert_eq!(
            labels::<Kernel>(),
            vec!["linux", "linux-lts", "linux-zen", "linux-hardened"]
        );
        assert_eq!(Kernel::from_str("linux-zen").unwrap(), Kernel::LinuxZen);
        assert_eq!(Kernel::LinuxLts.package(), "linux-lts");
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        assert!(GpuDriver::from_str("matrox").is_err());
        assert!(Desktop::from_str("xfce").is_err());
    }

    #[test]
    fn test_display_managers() {
        assert_eq!(Desktop::Gnome.display_manager(), Some("gdm"));
        assert_eq!(Desktop::Kde.display_manager(), Some("sddm"));
        assert_eq!(Desktop::Bspwm.display_manager(), None);
        assert_eq!(Desktop::Hyprland.display_manager(), None);
    }

    #[test]
    fn test_bootloader_serialization() {
        assert_eq!(Bootloader::SystemdBoot.to_string(), "systemd-boot");
        let json = serde_json::to_string(&Bootloader::SystemdBoot).unwrap();
        assert_eq!(json, "\"systemd-boot\"");
    }

    #[test]
    fn test_toggle_conversion() {
        assert!(Toggle::Yes.as_bool());
        assert!(!Toggle::No.as_bool());
        assert_eq!(Toggle::from(true), Toggle::Yes);
        assert_eq!(Toggle::from_str("No").unwrap(), Toggle::No);
    }
}
