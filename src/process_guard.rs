//! Process lifecycle management for child processes
//!
//! Destructive tools (`wipefs`, `sgdisk`, `mkfs`) must never be interrupted
//! half way. Three rules make that hold:
//!
//! - Every child is spawned in its own process group, so a Ctrl+C typed at the
//!   terminal reaches the installer only, never the running tool.
//! - Non-destructive children also get a parent-death signal so a crashed
//!   installer does not leave `pacstrap` or `reflector` running. Destructive
//!   children ([`in_detached_process_group`](CommandProcessGroup::in_detached_process_group))
//!   get none: a `mkfs` outlives a crashed installer and finishes its write.
//! - SIGINT, SIGTERM and SIGHUP only raise a flag. The orchestrator checks the
//!   flag between pipeline stages, which are the only safe cancellation points.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc;
use nix::unistd::Pid;

/// Shared "an interrupt was requested" flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once any registered signal has been delivered.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag by hand.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn inner(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Register SIGINT, SIGTERM and SIGHUP to raise `flag` instead of terminating.
///
/// Call this once at program start.
pub fn init_signal_handlers(flag: &InterruptFlag) -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

    for sig in [SIGINT, SIGTERM, SIGHUP] {
        signal_hook::flag::register(sig, flag.inner())?;
    }
    tracing::debug!("Signal handlers registered (SIGINT, SIGTERM, SIGHUP)");
    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run in its own process group and receive SIGTERM when the spawning
    /// thread dies.
    fn in_new_process_group(&mut self) -> &mut Self;

    /// Run in its own process group with no parent-death signal.
    fn in_detached_process_group(&mut self) -> &mut Self;
}

fn isolate(cmd: &mut std::process::Command, death_signal: bool) -> &mut std::process::Command {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(move || {
            // Leader of a new process group: terminal signals skip this child
            nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(std::io::Error::other)?;

            if death_signal && libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(std::io::Error::last_os_error());
            }

            Ok(())
        });
    }
    cmd
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        isolate(self, true)
    }

    fn in_detached_process_group(&mut self) -> &mut Self {
        isolate(self, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_lowered() {
        let flag = InterruptFlag::new();
        assert!(!flag.is_raised());
    }

    #[test]
    fn test_flag_clone_shares_state() {
        let flag = InterruptFlag::new();
        let other = flag.clone();
        other.raise();
        assert!(flag.is_raised());
    }
}
