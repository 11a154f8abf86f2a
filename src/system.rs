//! Target system provisioning
//!
//! Every step after the disk is mounted: mirror ranking, the base install,
//! fstab, the optional swap file, timezone/hostname/locale, services, and the
//! root and user accounts. Steps that change the installed system run through
//! `arch-chroot`; configuration files are written straight into the mounted
//! root.
//!
//! Passwords reach `chpasswd` over stdin only, never through argv, a file, or
//! the log.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{CommandSpec, Executor, chroot};
use crate::config::{InstallConfig, InstallSettings, LocaleSettings, SettingKey, locale_gen_entry};
use crate::error::{InstallError, Result};
use crate::packages::PackageSet;
use crate::secret::Secret;

pub const MIRRORLIST: &str = "/etc/pacman.d/mirrorlist";
pub const SWAP_FILE: &str = "/swapfile";
pub const SWAP_SIZE: &str = "4G";
pub const SUDOERS_DROP_IN: &str = "etc/sudoers.d/10-wheel";
pub const SUDOERS_RULE: &str = "%wheel ALL=(ALL:ALL) ALL\n";
pub const SUDOERS_MODE: u32 = 0o440;

const MAX_USERNAME_LEN: usize = 32;

/// Path inside the target root. `inner` is absolute on the target.
fn target(root: &Path, inner: &str) -> PathBuf {
    root.join(inner.trim_start_matches('/'))
}

// ============================================================================
// Package installation
// ============================================================================

/// Rank HTTPS mirrors on the live system. Failure is fatal.
pub fn rank_mirrors<E: Executor>(exec: &mut E) -> Result<()> {
    exec.run(&CommandSpec::new("reflector").args([
        "--latest",
        "20",
        "--protocol",
        "https",
        "--sort",
        "rate",
        "--save",
        MIRRORLIST,
    ]))?;
    Ok(())
}

/// `pacstrap -K` the package set into `root`. Output goes to the terminal.
pub fn install_base<E: Executor>(exec: &mut E, root: &Path, packages: &PackageSet) -> Result<()> {
    info!("Installing {} packages into {}", packages.len(), root.display());
    exec.run(
        &CommandSpec::new("pacstrap")
            .arg("-K")
            .path_arg(root)
            .args(packages.iter().cloned()),
    )?;
    Ok(())
}

/// Append `genfstab -U` output to the target's fstab.
pub fn generate_fstab<E: Executor>(exec: &mut E, root: &Path) -> Result<()> {
    let out = exec.run(&CommandSpec::new("genfstab").arg("-U").path_arg(root).capture())?;
    exec.append_file(&target(root, "/etc/fstab"), &out.stdout)?;
    Ok(())
}

/// Create a swap file in the target and register it in fstab.
pub fn create_swap_file<E: Executor>(exec: &mut E, root: &Path) -> Result<()> {
    exec.run(&chroot(root, "mkswap").args([
        "-U",
        "clear",
        "--size",
        SWAP_SIZE,
        "--file",
        SWAP_FILE,
    ]))?;
    exec.append_file(
        &target(root, "/etc/fstab"),
        &format!("{} none swap defaults 0 0\n", SWAP_FILE),
    )?;
    Ok(())
}

// ============================================================================
// System configuration
// ============================================================================

/// Accepts `Region/City` style names: no empty or `..` components.
pub fn validate_timezone(timezone: &str) -> Result<()> {
    let valid = !timezone.is_empty()
        && timezone.split('/').all(|part| {
            !part.is_empty()
                && part != ".."
                && part != "."
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
        });
    if valid {
        Ok(())
    } else {
        Err(InstallError::config(format!("invalid timezone '{}'", timezone)))
    }
}

/// RFC 1123 host label: 1-63 of `[a-z0-9-]`, not starting or ending with `-`.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let valid = (1..=63).contains(&hostname.len())
        && !hostname.starts_with('-')
        && !hostname.ends_with('-')
        && hostname
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(InstallError::config(format!("invalid hostname '{}'", hostname)))
    }
}

pub fn configure_timezone<E: Executor>(exec: &mut E, root: &Path, timezone: &str) -> Result<()> {
    validate_timezone(timezone)?;
    exec.run(
        &chroot(root, "ln")
            .arg("-sf")
            .arg(format!("/usr/share/zoneinfo/{}", timezone))
            .arg("/etc/localtime"),
    )?;
    exec.run(&chroot(root, "hwclock").arg("--systohc"))?;
    Ok(())
}

pub fn set_hostname<E: Executor>(exec: &mut E, root: &Path, hostname: &str) -> Result<()> {
    validate_hostname(hostname)?;
    exec.write_file(&target(root, "/etc/hostname"), &format!("{}\n", hostname))
}

/// Enable `entry` in a locale.gen body: uncomment it, or append it.
fn enable_locale_entry(content: &str, entry: &str) -> String {
    let mut found = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            // Only `#<entry>` is a disabled entry; `#  <entry>` is header prose
            let candidate = line.strip_prefix('#').unwrap_or(line).trim_end();
            if !found && candidate == entry {
                found = true;
                entry.to_string()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push(entry.to_string());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Enable every referenced locale, run `locale-gen`, write `locale.conf`.
pub fn configure_locale<E: Executor>(exec: &mut E, root: &Path, locale: &LocaleSettings) -> Result<()> {
    let locale_gen = target(root, "/etc/locale.gen");
    let mut content = if exec.path_exists(&locale_gen) {
        exec.read_file(&locale_gen)?
    } else {
        String::new()
    };
    for id in locale.required() {
        content = enable_locale_entry(&content, &locale_gen_entry(id));
    }
    exec.write_file(&locale_gen, &content)?;
    exec.run(&chroot(root, "locale-gen"))?;
    exec.write_file(&target(root, "/etc/locale.conf"), &locale.conf())?;
    Ok(())
}

pub fn enable_services<E: Executor>(exec: &mut E, root: &Path, services: &[String]) -> Result<()> {
    for service in services {
        exec.run(&chroot(root, "systemctl").arg("enable").arg(service.as_str()))?;
    }
    Ok(())
}

/// Timezone, hostname, locale and services, in that order.
pub fn configure_system<E: Executor>(
    exec: &mut E,
    root: &Path,
    settings: &InstallSettings,
    services: &[String],
) -> Result<()> {
    configure_timezone(exec, root, &settings.timezone)?;
    set_hostname(exec, root, &settings.hostname)?;
    configure_locale(exec, root, &settings.locale)?;
    enable_services(exec, root, services)?;
    Ok(())
}

// ============================================================================
// Accounts
// ============================================================================

/// Login name rules enforced by `useradd`'s default policy.
pub fn validate_username(username: &str) -> Result<()> {
    let mut chars = username.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && username.len() <= MAX_USERNAME_LEN
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        }
        None => false,
    };
    if !valid {
        return Err(InstallError::config(format!(
            "invalid username '{}': use lowercase letters, digits, '_' or '-', starting with a letter or '_'",
            username
        )));
    }
    if username == "root" {
        return Err(InstallError::config("username 'root' is reserved"));
    }
    Ok(())
}

/// `chpasswd` reads `name:password` lines, so neither may appear in a password.
pub fn validate_password(password: &Secret) -> Result<()> {
    if password.is_empty() {
        return Err(InstallError::config("password must not be empty"));
    }
    if password.expose().contains([':', '\n', '\r']) {
        return Err(InstallError::config(
            "password must not contain ':' or line breaks",
        ));
    }
    Ok(())
}

/// `user:password\n` for `chpasswd`, built in a single allocation.
fn chpasswd_line(user: &str, password: &Secret) -> Secret {
    let mut line = String::with_capacity(user.len() + password.len() + 2);
    line.push_str(user);
    line.push(':');
    line.push_str(password.expose());
    line.push('\n');
    Secret::new(line)
}

/// Set `user`'s password by feeding `chpasswd` over stdin.
pub fn set_password<E: Executor>(exec: &mut E, root: &Path, user: &str, password: Secret) -> Result<()> {
    let payload = chpasswd_line(user, &password);
    drop(password);
    exec.run(&chroot(root, "chpasswd").stdin(payload))?;
    info!("Password set for {}", user);
    Ok(())
}

/// Create the unprivileged user with wheel membership and a locale file.
pub fn create_user<E: Executor>(
    exec: &mut E,
    root: &Path,
    username: &str,
    password: Secret,
    locale: &LocaleSettings,
) -> Result<()> {
    validate_username(username)?;
    exec.run(
        &chroot(root, "useradd")
            .args(["-m", "-G", "wheel", "-s", "/bin/bash"])
            .arg(username),
    )?;
    set_password(exec, root, username, password)?;

    let sudoers = root.join(SUDOERS_DROP_IN);
    if let Some(dir) = sudoers.parent() {
        exec.create_dir_all(dir)?;
    }
    exec.write_file(&sudoers, SUDOERS_RULE)?;
    exec.set_mode(&sudoers, SUDOERS_MODE)?;

    let home = format!("/home/{}", username);
    let config_dir = target(root, &format!("{}/.config", home));
    exec.create_dir_all(&config_dir)?;
    exec.write_file(&config_dir.join("locale.conf"), &locale.conf())?;
    exec.run(
        &chroot(root, "chown")
            .arg("-R")
            .arg(format!("{}:{}", username, username))
            .arg(format!("{}/.config", home)),
    )?;
    info!("User {} created", username);
    Ok(())
}

/// Root password, then the optional user.
///
/// Both secrets are moved out of `config` as they are used, so they are
/// zeroed as soon as `chpasswd` has them.
pub fn provision_accounts<E: Executor>(
    exec: &mut E,
    root: &Path,
    settings: &InstallSettings,
    config: &mut InstallConfig,
) -> Result<()> {
    let root_password = config
        .take_secret(SettingKey::RootPassword)
        .ok_or_else(|| InstallError::precondition("no root password has been collected"))?;
    set_password(exec, root, "root", root_password)?;

    match &settings.username {
        Some(username) => {
            let password = config.take_secret(SettingKey::UserPassword).ok_or_else(|| {
                InstallError::precondition(format!("no password collected for {}", username))
            })?;
            create_user(exec, root, username, password, &settings.locale)
        }
        None => {
            warn!("No user account requested; only root can log in");
            Ok(())
        }
    }
}
