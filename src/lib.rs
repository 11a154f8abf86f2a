//! miniarch Library
//!
//! A menu-driven Arch Linux installer: every external tool is invoked through
//! [`command::Executor`], every operator interaction through
//! [`prompt::Prompter`], so the whole pipeline runs headless in tests.

pub mod bootloader;
pub mod cli;
pub mod command;
pub mod config;
pub mod disks;
pub mod error;
pub mod hardware;
pub mod install_state;
pub mod installer;
pub mod logging;
pub mod packages;
pub mod partition;
pub mod process_guard;
pub mod prompt;
pub mod sanity;
pub mod secret;
pub mod system;
pub mod theme;
pub mod types;
pub mod ui;

// Re-export main types for convenience
pub use command::{CommandSpec, Executor, RecordingExecutor, SystemExecutor};
pub use config::{InstallConfig, InstallSettings, SettingKey};
pub use error::{InstallError, Result};
pub use install_state::{InstallProgress, InstallStage, InstallTransitionError};
pub use installer::{Completion, InstallOptions, Installer};
pub use partition::PartitionPlan;
pub use process_guard::{CommandProcessGroup, InterruptFlag};
pub use prompt::{Answer, Prompter, ScriptedPrompter};
pub use secret::Secret;
pub use types::{Bootloader, Desktop, GpuDriver, Kernel, Toggle};
