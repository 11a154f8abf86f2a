//! Install orchestrator
//!
//! One run has three phases:
//!
//! 1. **Collection**: firmware check, target disk, credentials, variants and
//!    locale are gathered through the [`Prompter`]. Nothing on disk changes.
//! 2. **Confirmation**: the summary is shown and the operator must pick
//!    "Install". Anything else ends the run with [`InstallError::Cancelled`].
//! 3. **Pipeline**: the stages of [`InstallStage`] run in order against the
//!    [`Executor`]. The first failure ends the run.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};

use crate::bootloader;
use crate::command::{CommandSpec, Executor};
use crate::config::{DEFAULT_HOSTNAME, DEFAULT_TIMEZONE, InstallConfig, InstallSettings, SettingKey};
use crate::disks::{self, DiskInspector};
use crate::error::{InstallError, Result};
use crate::hardware;
use crate::install_state::{InstallProgress, InstallStage};
use crate::packages;
use crate::partition::{self, PartitionPlan};
use crate::process_guard::InterruptFlag;
use crate::prompt::Prompter;
use crate::secret::Secret;
use crate::system;
use crate::types::{Bootloader, Desktop, GpuDriver, Kernel, Toggle, labels};

/// Locales offered in the locale menus. The first is the default.
pub const LOCALES: &[&str] = &[
    "en_US.UTF-8",
    "en_GB.UTF-8",
    "de_DE.UTF-8",
    "fr_FR.UTF-8",
    "es_ES.UTF-8",
    "pt_BR.UTF-8",
    "ja_JP.UTF-8",
    "vi_VN.UTF-8",
];

pub const INSTALL: &str = "Install";
pub const CANCEL: &str = "Cancel";
pub const REBOOT_NOW: &str = "Reboot now";
pub const EXIT: &str = "Exit";

/// Widest value shown in the summary table.
const SUMMARY_WIDTH: usize = 48;

/// Run parameters that do not come from the menus.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Where the target root is mounted.
    pub mount_root: PathBuf,
    pub hostname: String,
    pub timezone: String,
    /// Skip the disk menu and use this device.
    pub disk: Option<PathBuf>,
    pub skip_mirrors: bool,
    /// Shown on the completion screen.
    pub log_file: Option<PathBuf>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/mnt"),
            hostname: DEFAULT_HOSTNAME.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            disk: None,
            skip_mirrors: false,
            log_file: None,
        }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub settings: InstallSettings,
    pub reboot: bool,
}

pub struct Installer<E: Executor, P: Prompter> {
    exec: E,
    prompter: P,
    options: InstallOptions,
    interrupt: InterruptFlag,
    inspector: DiskInspector,
    progress: InstallProgress,
    config: InstallConfig,
}

impl<E: Executor, P: Prompter> Installer<E, P> {
    pub fn new(exec: E, prompter: P, options: InstallOptions, interrupt: InterruptFlag) -> Self {
        Self {
            exec,
            prompter,
            options,
            interrupt,
            inspector: DiskInspector::new(),
            progress: InstallProgress::new(),
            config: InstallConfig::new(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.exec
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    pub fn progress(&self) -> &InstallProgress {
        &self.progress
    }

    /// Device chosen in this run, once selected.
    pub fn device(&self) -> Option<&str> {
        self.config.get(SettingKey::Device)
    }

    /// Collect, confirm and install.
    pub fn run(&mut self) -> Result<Completion> {
        let settings = self.collect()?;
        self.confirm(&settings)?;

        if let Err(err) = self.execute(&settings) {
            let stage = self.progress.current_stage();
            let _ = self.progress.fail();
            if err.is_cancelled() {
                warn!("Installation interrupted before {}", stage);
            } else {
                error!(
                    "Installation failed during '{}' on {}: {}",
                    stage,
                    settings.device.display(),
                    err
                );
            }
            if stage.touches_disk() {
                warn!(
                    "{} was modified; it needs manual attention before the next attempt",
                    settings.device.display()
                );
            }
            return Err(err);
        }

        let reboot = self.finish()?;
        Ok(Completion { settings, reboot })
    }

    /// A pending SIGINT/SIGTERM/SIGHUP ends the run here.
    fn checkpoint(&self) -> Result<()> {
        if self.interrupt.is_raised() {
            warn!("Interrupt received, stopping");
            return Err(InstallError::Cancelled);
        }
        Ok(())
    }

    fn choose(&mut self, title: &str, options: &[String]) -> Result<usize> {
        self.checkpoint()?;
        self.prompter.choose(title, options)
    }

    fn read_text(&mut self, title: &str, hidden: bool) -> Result<String> {
        self.checkpoint()?;
        self.prompter.read_text(title, hidden)
    }

    // ========================================================================
    // Collection
    // ========================================================================

    fn collect(&mut self) -> Result<InstallSettings> {
        let firmware = hardware::detect_firmware_mode(&self.exec);
        if !firmware.is_uefi() {
            return Err(InstallError::precondition(format!(
                "{} firmware detected; this installer only supports UEFI systems",
                firmware
            )));
        }

        self.select_device()?;
        self.collect_credentials()?;

        self.select_option::<Kernel>("Select kernel", SettingKey::Kernel)?;
        self.select_option::<GpuDriver>("Select GPU driver", SettingKey::Gpu)?;
        self.select_option::<Desktop>("Select desktop", SettingKey::Desktop)?;
        self.select_option::<Bootloader>("Select bootloader", SettingKey::Bootloader)?;
        self.select_option::<Toggle>("Create a 4G swap file?", SettingKey::SwapFile)?;

        self.select_locales()?;

        system::validate_hostname(&self.options.hostname)?;
        system::validate_timezone(&self.options.timezone)?;
        self.config.set(SettingKey::Hostname, self.options.hostname.as_str());
        self.config.set(SettingKey::Timezone, self.options.timezone.as_str());

        self.config.resolve()
    }

    fn select_device(&mut self) -> Result<()> {
        let candidates = self.inspector.list_disks(&mut self.exec)?;
        if candidates.is_empty() {
            return Err(InstallError::precondition("no installable disks found"));
        }

        let index = match &self.options.disk {
            Some(wanted) => candidates
                .iter()
                .position(|d| d.path() == *wanted)
                .ok_or_else(|| {
                    InstallError::precondition(format!(
                        "{} is not an available disk",
                        wanted.display()
                    ))
                })?,
            None => {
                let labels: Vec<String> = candidates.iter().map(|d| d.to_string()).collect();
                self.choose("Select target disk", &labels)?
            }
        };

        let disk = self.inspector.select(&candidates, index)?;
        info!("Target disk: {}", disk);
        self.config
            .set(SettingKey::Device, disk.path().display().to_string());
        Ok(())
    }

    fn collect_credentials(&mut self) -> Result<()> {
        let root_password = self.read_password("Root password")?;
        self.config.set_secret(SettingKey::RootPassword, root_password);

        let create_user = self.select_option::<Toggle>("Create a user account?", SettingKey::CreateUser)?;
        if !create_user.as_bool() {
            return Ok(());
        }

        let username = loop {
            let name = self.read_text("Username", false)?;
            match system::validate_username(&name) {
                Ok(()) => break name,
                Err(err) => self.prompter.notify(&err.to_string())?,
            }
        };
        self.config.set(SettingKey::Username, username.as_str());

        let password = self.read_password(&format!("Password for {}", username))?;
        self.config.set_secret(SettingKey::UserPassword, password);
        Ok(())
    }

    /// Hidden input, entered twice. Re-prompts until both entries match and
    /// the password is acceptable to `chpasswd`.
    fn read_password(&mut self, title: &str) -> Result<Secret> {
        loop {
            let first = Secret::new(self.read_text(title, true)?);
            if let Err(err) = system::validate_password(&first) {
                self.prompter.notify(&err.to_string())?;
                continue;
            }
            let second = Secret::new(self.read_text(&format!("Confirm {}", title.to_lowercase()), true)?);
            if first.expose() != second.expose() {
                self.prompter.notify("Passwords do not match, try again")?;
                continue;
            }
            return Ok(first);
        }
    }

    fn select_option<T>(&mut self, title: &str, key: SettingKey) -> Result<T>
    where
        T: IntoEnumIterator + Display + FromStr,
    {
        let options = labels::<T>();
        let index = self.choose(title, &options)?;
        let label = &options[index];
        let value = label
            .parse()
            .map_err(|_| InstallError::config(format!("{} has invalid value '{}'", key, label)))?;
        debug!("{} = {}", key, label);
        self.config.set(key, label.as_str());
        Ok(value)
    }

    fn select_locales(&mut self) -> Result<()> {
        let all: Vec<String> = LOCALES.iter().map(|s| s.to_string()).collect();
        let index = self.choose("Select system locale", &all)?;
        let primary = all[index].clone();
        self.config.set(SettingKey::Locale, primary.as_str());

        // Chosen locale first so Enter keeps it
        let mut ordered = vec![primary.clone()];
        ordered.extend(all.into_iter().filter(|l| *l != primary));

        for key in [
            SettingKey::Lang,
            SettingKey::LcTime,
            SettingKey::LcNumeric,
            SettingKey::LcMonetary,
        ] {
            let index = self.choose(&format!("Select {}", key), &ordered)?;
            self.config.set(key, ordered[index].as_str());
        }
        Ok(())
    }

    // ========================================================================
    // Confirmation gate
    // ========================================================================

    fn confirm(&mut self, settings: &InstallSettings) -> Result<()> {
        let rows = self.config.render_summary(SUMMARY_WIDTH);
        self.prompter.render_summary("Installation summary", &rows)?;
        self.prompter.notify(&format!(
            "All data on {} will be erased",
            settings.device.display()
        ))?;

        let options = vec![INSTALL.to_string(), CANCEL.to_string()];
        let choice = self.choose("Start installation?", &options)?;
        if options[choice] != INSTALL {
            info!("Installation cancelled at confirmation");
            return Err(InstallError::Cancelled);
        }

        info!("Installation confirmed for {}", settings.device.display());
        self.progress.confirm_destructive_operations();
        Ok(())
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Cancellation point, then the stage transition.
    fn enter(&mut self, stage: InstallStage) -> Result<()> {
        self.checkpoint()?;
        self.progress.transition_to(stage)?;
        Ok(())
    }

    fn execute(&mut self, settings: &InstallSettings) -> Result<()> {
        let root = self.options.mount_root.clone();
        let plan = PartitionPlan::new(&settings.device);

        self.prompter.suspend()?;

        self.enter(InstallStage::Unmounting)?;
        disks::unmount_all(&mut self.exec, &settings.device)?;

        self.enter(InstallStage::Partitioning)?;
        self.inspector.commit(&settings.device);
        info!("{}", plan.summary(&root));
        partition::materialize(&mut self.exec, &plan, &root)?;

        self.enter(InstallStage::RankingMirrors)?;
        if self.options.skip_mirrors {
            info!("Mirror ranking skipped; using the live system's mirrorlist");
        } else {
            system::rank_mirrors(&mut self.exec)?;
        }

        self.enter(InstallStage::InstallingBase)?;
        let package_set = packages::resolve_packages(settings.kernel, settings.gpu, settings.desktop);
        system::install_base(&mut self.exec, &root, &package_set)?;

        self.enter(InstallStage::GeneratingFstab)?;
        system::generate_fstab(&mut self.exec, &root)?;

        self.enter(InstallStage::CreatingSwap)?;
        if settings.swap_file {
            system::create_swap_file(&mut self.exec, &root)?;
        } else {
            debug!("No swap file requested");
        }

        self.enter(InstallStage::ConfiguringSystem)?;
        let services = packages::resolve_services(settings.desktop);
        system::configure_system(&mut self.exec, &root, settings, &services)?;

        self.enter(InstallStage::InstallingBootloader)?;
        let microcode = hardware::detect_host_microcode(&self.exec);
        bootloader::configure(&mut self.exec, &root, settings, &plan, microcode)?;

        self.enter(InstallStage::ProvisioningAccounts)?;
        system::provision_accounts(&mut self.exec, &root, settings, &mut self.config)?;

        self.progress.advance()?;
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Offer a reboot. Returns whether one was issued.
    fn finish(&mut self) -> Result<bool> {
        self.prompter.resume()?;
        let message = match &self.options.log_file {
            Some(path) => format!("Installation complete. Log written to {}", path.display()),
            None => "Installation complete".to_string(),
        };
        self.prompter.notify(&message)?;

        let options = vec![REBOOT_NOW.to_string(), EXIT.to_string()];
        let reboot = match self.prompter.choose("Reboot into the new system?", &options) {
            Ok(index) => options[index] == REBOOT_NOW,
            Err(err) if err.is_cancelled() => false,
            Err(err) => return Err(err),
        };

        if reboot {
            self.prompter.suspend()?;
            info!("Rebooting");
            self.exec.run(&CommandSpec::new("reboot"))?;
        } else {
            info!("Exiting without reboot");
        }
        Ok(reboot)
    }
}
