//! Install stage tracking
//!
//! [`InstallProgress`] is the single record of where a run is. Transitions
//! only move forward one stage at a time, the destructive `Partitioning`
//! stage cannot be entered before the operator confirmed, and a failure
//! remembers the stage it happened in so the final error can name it.
//!
//! ```text
//! NotStarted → Unmounting → Partitioning → RankingMirrors → InstallingBase
//!   → GeneratingFstab → CreatingSwap → ConfiguringSystem
//!   → InstallingBootloader → ProvisioningAccounts → Completed
//!
//! (any non-terminal stage → Failed)
//! ```

use std::fmt;
use std::time::Instant;

use thiserror::Error;
use tracing::info;

use crate::error::InstallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    NotStarted = 0,
    /// Release everything mounted from the target device
    Unmounting = 1,
    /// Wipe, partition, format and mount. Destructive: needs confirmation.
    Partitioning = 2,
    RankingMirrors = 3,
    InstallingBase = 4,
    GeneratingFstab = 5,
    /// Runs even when no swap file was requested; the stage is then a no-op
    CreatingSwap = 6,
    ConfiguringSystem = 7,
    InstallingBootloader = 8,
    ProvisioningAccounts = 9,
    Completed = 10,
    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[inline]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::Partitioning)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Unmounting),
            Self::Unmounting => Some(Self::Partitioning),
            Self::Partitioning => Some(Self::RankingMirrors),
            Self::RankingMirrors => Some(Self::InstallingBase),
            Self::InstallingBase => Some(Self::GeneratingFstab),
            Self::GeneratingFstab => Some(Self::CreatingSwap),
            Self::CreatingSwap => Some(Self::ConfiguringSystem),
            Self::ConfiguringSystem => Some(Self::InstallingBootloader),
            Self::InstallingBootloader => Some(Self::ProvisioningAccounts),
            Self::ProvisioningAccounts => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Unmounting => "Unmounting target device",
            Self::Partitioning => "Partitioning and formatting",
            Self::RankingMirrors => "Ranking mirrors",
            Self::InstallingBase => "Installing base system",
            Self::GeneratingFstab => "Generating fstab",
            Self::CreatingSwap => "Creating swap file",
            Self::ConfiguringSystem => "Configuring system",
            Self::InstallingBootloader => "Installing bootloader",
            Self::ProvisioningAccounts => "Setting up accounts",
            Self::Completed => "Installation complete",
            Self::Failed => "Installation failed",
        }
    }

    /// Approximate completion, weighted towards the package download.
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Unmounting => 2,
            Self::Partitioning => 5,
            Self::RankingMirrors => 10,
            Self::InstallingBase => 20,
            Self::GeneratingFstab => 70,
            Self::CreatingSwap => 72,
            Self::ConfiguringSystem => 75,
            Self::InstallingBootloader => 85,
            Self::ProvisioningAccounts => 95,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    /// Does anything on the target device change once this stage starts?
    pub const fn touches_disk(self) -> bool {
        self.order() >= Self::Partitioning.order() && !matches!(self, Self::Failed)
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: InstallStage, to: InstallStage },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: InstallStage, to: InstallStage },

    #[error("Cannot leave terminal stage {from}")]
    FromTerminalState { from: InstallStage },

    #[error("{stage} requires explicit confirmation")]
    MissingConfirmation { stage: InstallStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

impl From<InstallTransitionError> for InstallError {
    fn from(err: InstallTransitionError) -> Self {
        InstallError::precondition(err.to_string())
    }
}

/// Forward-only progress of one installation run.
#[derive(Debug, Clone)]
pub struct InstallProgress {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    destructive_confirmed: bool,
    entered_at: Instant,
}

impl Default for InstallProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallProgress {
    pub fn new() -> Self {
        Self {
            current: InstallStage::NotStarted,
            failed_at: None,
            destructive_confirmed: false,
            entered_at: Instant::now(),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == InstallStage::Completed
    }

    /// One-way: once confirmed, the run may partition.
    pub fn confirm_destructive_operations(&mut self) {
        self.destructive_confirmed = true;
    }

    #[inline]
    pub fn is_destructive_confirmed(&self) -> bool {
        self.destructive_confirmed
    }

    /// Move to `target`, which must be the immediate next stage.
    pub fn transition_to(&mut self, target: InstallStage) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }
        if target.order() < self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        if target.is_destructive() && !self.destructive_confirmed {
            return Err(InstallTransitionError::MissingConfirmation { stage: target });
        }

        self.enter(target);
        Ok(target)
    }

    /// Move to whatever stage follows the current one.
    pub fn advance(&mut self) -> Result<InstallStage, InstallTransitionError> {
        match self.current.next() {
            Some(next) => self.transition_to(next),
            None => Err(InstallTransitionError::FromTerminalState { from: self.current }),
        }
    }

    /// Record a failure in the current stage.
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        self.failed_at = Some(self.current);
        self.enter(InstallStage::Failed);
        Ok(())
    }

    fn enter(&mut self, stage: InstallStage) {
        if self.current != InstallStage::NotStarted {
            info!(
                "{} finished after {:.1}s",
                self.current,
                self.entered_at.elapsed().as_secs_f32()
            );
        }
        info!("[{:>3}%] {}", stage.progress_percent(), stage);
        self.current = stage;
        self.entered_at = Instant::now();
    }
}

// ============================================================================
// Tests
// ============================================================================
