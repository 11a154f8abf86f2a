use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_HOSTNAME, DEFAULT_TIMEZONE};
use crate::installer::InstallOptions;

/// miniarch - a small menu-driven Arch Linux installer
#[derive(Parser, Debug)]
#[command(name = "miniarch")]
#[command(about = "Menu-driven Arch Linux installer: partition, pacstrap, bootloader, users")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Read-only commands (lsblk) still run so the menus show real disks.
    /// Everything that would change the system is logged and skipped.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the interactive installer (default)
    Install(InstallArgs),
    /// List disks that can be installed to
    ListDisks,
    /// Print the partition plan for a disk without touching it
    Plan {
        /// Target disk (e.g., /dev/nvme0n1)
        #[arg(short, long)]
        disk: PathBuf,

        /// Where the target root would be mounted
        #[arg(long, default_value = "/mnt")]
        mount_root: PathBuf,

        /// Emit the plan and its commands as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct InstallArgs {
    /// Target disk; skips the disk menu (e.g., /dev/nvme0n1)
    #[arg(short, long)]
    pub disk: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_HOSTNAME)]
    pub hostname: String,

    /// Timezone as a zoneinfo path, e.g. Europe/Berlin
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// Where the target root is mounted during installation
    #[arg(long, default_value = "/mnt")]
    pub mount_root: PathBuf,

    /// Log file (default: $HOME/install.log)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Keep the live system's mirrorlist instead of running reflector
    #[arg(long)]
    pub skip_mirrors: bool,
}

impl Default for InstallArgs {
    fn default() -> Self {
        Self {
            disk: None,
            hostname: DEFAULT_HOSTNAME.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            mount_root: PathBuf::from("/mnt"),
            log_file: None,
            skip_mirrors: false,
        }
    }
}

impl InstallArgs {
    pub fn to_options(&self, log_file: PathBuf) -> InstallOptions {
        InstallOptions {
            mount_root: self.mount_root.clone(),
            hostname: self.hostname.clone(),
            timezone: self.timezone.clone(),
            disk: self.disk.clone(),
            skip_mirrors: self.skip_mirrors,
            log_file: Some(log_file),
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run; no subcommand means `install` with defaults.
    pub fn command(self) -> Commands {
        self.command
            .unwrap_or_else(|| Commands::Install(InstallArgs::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_no_args_is_install() {
        let cli = Cli::try_parse_from(["miniarch"]).unwrap();
        assert!(!cli.dry_run);
        match cli.command() {
            Commands::Install(args) => assert_eq!(args, InstallArgs::default()),
            other => panic!("Expected Install, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_install_flags() {
        let cli = Cli::try_parse_from([
            "miniarch",
            "install",
            "--disk",
            "/dev/sdx",
            "--hostname",
            "box",
            "--timezone",
            "Asia/Ho_Chi_Minh",
            "--skip-mirrors",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.dry_run);
        match cli.command() {
            Commands::Install(args) => {
                assert_eq!(args.disk, Some(PathBuf::from("/dev/sdx")));
                assert_eq!(args.hostname, "box");
                assert_eq!(args.timezone, "Asia/Ho_Chi_Minh");
                assert!(args.skip_mirrors);
                assert_eq!(args.mount_root, PathBuf::from("/mnt"));
            }
            other => panic!("Expected Install, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_plan_requires_disk() {
        assert!(Cli::try_parse_from(["miniarch", "plan"]).is_err());
        let cli = Cli::try_parse_from(["miniarch", "plan", "--disk", "/dev/nvme0n1", "--json"]).unwrap();
        match cli.command() {
            Commands::Plan { disk, json, .. } => {
                assert_eq!(disk, PathBuf::from("/dev/nvme0n1"));
                assert!(json);
            }
            other => panic!("Expected Plan, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_list_disks() {
        let cli = Cli::try_parse_from(["miniarch", "list-disks"]).unwrap();
        assert!(matches!(cli.command(), Commands::ListDisks));
    }

    #[test]
    fn test_install_args_to_options() {
        let options = InstallArgs::default().to_options(PathBuf::from("/root/install.log"));
        assert_eq!(options.mount_root, PathBuf::from("/mnt"));
        assert_eq!(options.log_file, Some(PathBuf::from("/root/install.log")));
    }
}
