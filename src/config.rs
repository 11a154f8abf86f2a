//! Configuration accumulator
//!
//! Operator choices are collected one prompt at a time into an
//! [`InstallConfig`]: an ordered key/value store whose insertion order is the
//! order rows appear in the confirmation summary. Once collection is done the
//! store is resolved into a typed [`InstallSettings`], which is what the
//! pipeline stages receive.
//!
//! Credentials live in the same store as [`Secret`] values. They are masked in
//! the summary and moved out with [`InstallConfig::take_secret`] at the moment
//! they are fed to `chpasswd`, leaving a consumed marker behind.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use strum::{Display, EnumIter};

use crate::error::{InstallError, Result};
use crate::secret::{REDACTED, Secret};
use crate::types::{Bootloader, Desktop, GpuDriver, Kernel, Toggle};

/// Every setting the installer collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SettingKey {
    #[strum(serialize = "Target device")]
    Device,
    #[strum(serialize = "Create user")]
    CreateUser,
    #[strum(serialize = "Username")]
    Username,
    #[strum(serialize = "User password")]
    UserPassword,
    #[strum(serialize = "Root password")]
    RootPassword,
    #[strum(serialize = "Kernel")]
    Kernel,
    #[strum(serialize = "GPU driver")]
    Gpu,
    #[strum(serialize = "Desktop")]
    Desktop,
    #[strum(serialize = "Bootloader")]
    Bootloader,
    #[strum(serialize = "Swap file")]
    SwapFile,
    #[strum(serialize = "Locale")]
    Locale,
    #[strum(serialize = "LANG")]
    Lang,
    #[strum(serialize = "LC_TIME")]
    LcTime,
    #[strum(serialize = "LC_NUMERIC")]
    LcNumeric,
    #[strum(serialize = "LC_MONETARY")]
    LcMonetary,
    #[strum(serialize = "Hostname")]
    Hostname,
    #[strum(serialize = "Timezone")]
    Timezone,
}

#[derive(Debug, Clone)]
pub enum SettingValue {
    Plain(String),
    Secret(Secret),
    /// A secret that has already been handed to its consumer.
    Consumed,
}

/// Ordered store of operator choices.
#[derive(Debug, Clone, Default)]
pub struct InstallConfig {
    entries: Vec<(SettingKey, SettingValue)>,
}

impl InstallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&mut self, key: SettingKey, value: SettingValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Record a plain value. Re-setting a key keeps its original position.
    pub fn set(&mut self, key: SettingKey, value: impl Into<String>) {
        self.put(key, SettingValue::Plain(value.into()));
    }

    pub fn set_secret(&mut self, key: SettingKey, secret: Secret) {
        self.put(key, SettingValue::Secret(secret));
    }

    /// Plain value for `key`. Secrets are never returned here.
    pub fn get(&self, key: SettingKey) -> Option<&str> {
        self.entries.iter().find_map(|(k, v)| match v {
            SettingValue::Plain(s) if *k == key => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn contains(&self, key: SettingKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// True if `key` currently holds an unconsumed secret.
    pub fn has_secret(&self, key: SettingKey) -> bool {
        self.entries
            .iter()
            .any(|(k, v)| *k == key && matches!(v, SettingValue::Secret(_)))
    }

    /// Move a secret out of the store. The key stays, marked as consumed.
    pub fn take_secret(&mut self, key: SettingKey) -> Option<Secret> {
        let (_, slot) = self.entries.iter_mut().find(|(k, _)| *k == key)?;
        match std::mem::replace(slot, SettingValue::Consumed) {
            SettingValue::Secret(secret) => Some(secret),
            other => {
                *slot = other;
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(label, value)` rows in insertion order, secrets masked and values
    /// longer than `width` characters cut with an ellipsis.
    pub fn render_summary(&self, width: usize) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(key, value)| {
                let shown = match value {
                    SettingValue::Plain(s) => truncate(s, width),
                    SettingValue::Secret(_) | SettingValue::Consumed => {
                        truncate(REDACTED, width)
                    }
                };
                (key.to_string(), shown)
            })
            .collect()
    }

    fn required(&self, key: SettingKey) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| InstallError::config(format!("{} is not set", key)))
    }

    fn parsed<T: FromStr>(&self, key: SettingKey) -> Result<T> {
        let raw = self.required(key)?;
        raw.parse()
            .map_err(|_| InstallError::config(format!("{} has invalid value '{}'", key, raw)))
    }

    fn toggle(&self, key: SettingKey) -> Result<bool> {
        match self.get(key) {
            Some(_) => Ok(self.parsed::<Toggle>(key)?.as_bool()),
            None => Ok(false),
        }
    }

    /// Turn the collected strings into typed settings.
    ///
    /// Device, kernel, GPU, desktop and bootloader are required. Locale
    /// fields fall back to the locale id; hostname and timezone to
    /// `archlinux` and `UTC`.
    pub fn resolve(&self) -> Result<InstallSettings> {
        let device = PathBuf::from(self.required(SettingKey::Device)?);
        let create_user = self.toggle(SettingKey::CreateUser)?;
        let username = if create_user {
            Some(self.required(SettingKey::Username)?.to_string())
        } else {
            None
        };

        let locale_id = self.get(SettingKey::Locale).unwrap_or(DEFAULT_LOCALE);
        let or_locale = |key| self.get(key).unwrap_or(locale_id).to_string();

        Ok(InstallSettings {
            device,
            kernel: self.parsed(SettingKey::Kernel)?,
            gpu: self.parsed(SettingKey::Gpu)?,
            desktop: self.parsed(SettingKey::Desktop)?,
            bootloader: self.parsed(SettingKey::Bootloader)?,
            swap_file: self.toggle(SettingKey::SwapFile)?,
            locale: LocaleSettings {
                locale: locale_id.to_string(),
                lang: or_locale(SettingKey::Lang),
                lc_time: or_locale(SettingKey::LcTime),
                lc_numeric: or_locale(SettingKey::LcNumeric),
                lc_monetary: or_locale(SettingKey::LcMonetary),
            },
            hostname: self
                .get(SettingKey::Hostname)
                .unwrap_or(DEFAULT_HOSTNAME)
                .to_string(),
            timezone: self
                .get(SettingKey::Timezone)
                .unwrap_or(DEFAULT_TIMEZONE)
                .to_string(),
            username,
        })
    }
}

pub const DEFAULT_LOCALE: &str = "en_US.UTF-8";
pub const DEFAULT_HOSTNAME: &str = "archlinux";
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// The `locale.gen` line that enables locale `id`, e.g. `en_US.UTF-8 UTF-8`.
pub fn locale_gen_entry(id: &str) -> String {
    let charset = id.split_once('.').map(|(_, c)| c).unwrap_or("ISO-8859-1");
    format!("{} {}", id, charset)
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut cut: String = value.chars().take(width - 1).collect();
    cut.push('…');
    cut
}

/// Locale selection for the target system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleSettings {
    /// Locale id to generate, e.g. `en_US.UTF-8`.
    pub locale: String,
    pub lang: String,
    pub lc_time: String,
    pub lc_numeric: String,
    pub lc_monetary: String,
}

impl LocaleSettings {
    /// Every distinct locale id referenced, primary first.
    pub fn required(&self) -> Vec<&str> {
        let mut ids = vec![self.locale.as_str()];
        for id in [&self.lang, &self.lc_time, &self.lc_numeric, &self.lc_monetary] {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        ids
    }

    /// Contents of `locale.conf`.
    pub fn conf(&self) -> String {
        format!(
            "LANG={}\nLC_TIME={}\nLC_NUMERIC={}\nLC_MONETARY={}\n",
            self.lang, self.lc_time, self.lc_numeric, self.lc_monetary
        )
    }
}

/// Typed, immutable settings handed to every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSettings {
    pub device: PathBuf,
    pub kernel: Kernel,
    pub gpu: GpuDriver,
    pub desktop: Desktop,
    pub bootloader: Bootloader,
    pub swap_file: bool,
    pub locale: LocaleSettings,
    pub hostname: String,
    pub timezone: String,
    /// Set when an unprivileged user is to be created.
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> InstallConfig {
        let mut config = InstallConfig::new();
        config.set(SettingKey::Device, "/dev/sdx");
        config.set(SettingKey::Kernel, "linux-zen");
        config.set(SettingKey::Gpu, "amd");
        config.set(SettingKey::Desktop, "bspwm");
        config.set(SettingKey::Bootloader, "grub");
        config
    }

    #[test]
    fn test_insertion_order_and_last_write_wins() {
        let mut config = InstallConfig::new();
        config.set(SettingKey::Kernel, "linux");
        config.set(SettingKey::Gpu, "intel");
        config.set(SettingKey::Kernel, "linux-lts");

        let rows = config.render_summary(40);
        assert_eq!(
            rows,
            vec![
                ("Kernel".to_string(), "linux-lts".to_string()),
                ("GPU driver".to_string(), "intel".to_string()),
            ]
        );
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn test_summary_masks_secrets() {
        let mut config = InstallConfig::new();
        config.set_secret(SettingKey::RootPassword, Secret::from("toor"));
        let rows = config.render_summary(40);
        assert_eq!(rows[0].1, REDACTED);
        assert!(config.get(SettingKey::RootPassword).is_none());
    }

    #[test]
    fn test_summary_truncates_long_values() {
        let mut config = InstallConfig::new();
        config.set(SettingKey::Device, "/dev/disk/by-id/nvme-Samsung_SSD_980");
        let rows = config.render_summary(12);
        assert_eq!(rows[0].1, "/dev/disk/b…");
        assert_eq!(rows[0].1.chars().count(), 12);
    }

    #[test]
    fn test_take_secret_leaves_consumed_marker() {
        let mut config = InstallConfig::new();
        config.set_secret(SettingKey::RootPassword, Secret::from("toor"));
        assert!(config.has_secret(SettingKey::RootPassword));

        let taken = config.take_secret(SettingKey::RootPassword).unwrap();
        assert_eq!(taken.expose(), "toor");
        assert!(config.contains(SettingKey::RootPassword));
        assert!(!config.has_secret(SettingKey::RootPassword));
        assert!(config.take_secret(SettingKey::RootPassword).is_none());
    }

    #[test]
    fn test_take_secret_ignores_plain_values() {
        let mut config = InstallConfig::new();
        config.set(SettingKey::Username, "alice");
        assert!(config.take_secret(SettingKey::Username).is_none());
        assert_eq!(config.get(SettingKey::Username), Some("alice"));
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = base_config().resolve().unwrap();
        assert_eq!(settings.device, PathBuf::from("/dev/sdx"));
        assert_eq!(settings.kernel, Kernel::LinuxZen);
        assert_eq!(settings.gpu, GpuDriver::Amd);
        assert_eq!(settings.bootloader, Bootloader::Grub);
        assert!(!settings.swap_file);
        assert_eq!(settings.username, None);
        assert_eq!(settings.hostname, "archlinux");
        assert_eq!(settings.timezone, "UTC");
        assert_eq!(settings.locale.lang, "en_US.UTF-8");
    }

    #[test]
    fn test_resolve_with_user_and_locale() {
        let mut config = base_config();
        config.set(SettingKey::CreateUser, "Yes");
        config.set(SettingKey::Username, "alice");
        config.set(SettingKey::SwapFile, "Yes");
        config.set(SettingKey::Locale, "de_DE.UTF-8");
        config.set(SettingKey::LcTime, "en_GB.UTF-8");

        let settings = config.resolve().unwrap();
        assert_eq!(settings.username.as_deref(), Some("alice"));
        assert!(settings.swap_file);
        assert_eq!(settings.locale.lang, "de_DE.UTF-8");
        assert_eq!(settings.locale.lc_time, "en_GB.UTF-8");
        assert_eq!(settings.locale.required(), vec!["de_DE.UTF-8", "en_GB.UTF-8"]);
    }

    #[test]
    fn test_resolve_rejects_missing_and_invalid() {
        let mut config = base_config();
        config.set(SettingKey::Gpu, "matrox");
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("GPU driver has invalid value 'matrox'"));

        let err = InstallConfig::new().resolve().unwrap_err();
        assert!(err.to_string().contains("Target device is not set"));
    }

    #[test]
    fn test_locale_gen_entry() {
        assert_eq!(locale_gen_entry("de_DE.UTF-8"), "de_DE.UTF-8 UTF-8");
        assert_eq!(locale_gen_entry("en_US"), "en_US ISO-8859-1");
    }

    #[test]
    fn test_locale_conf() {
        let locale = LocaleSettings {
            locale: "en_US.UTF-8".into(),
            lang: "en_US.UTF-8".into(),
            lc_time: "en_GB.UTF-8".into(),
            lc_numeric: "en_US.UTF-8".into(),
            lc_monetary: "de_DE.UTF-8".into(),
        };
        assert_eq!(
            locale.conf(),
            "LANG=en_US.UTF-8\nLC_TIME=en_GB.UTF-8\nLC_NUMERIC=en_US.UTF-8\nLC_MONETARY=de_DE.UTF-8\n"
        );
    }
}
