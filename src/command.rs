//! Command execution
//!
//! Every external tool the installer touches is described by a [`CommandSpec`]
//! and run through an [`Executor`]. Arguments are always a structured argv;
//! nothing is ever passed through a shell, so operator input (usernames,
//! hostnames) cannot be interpreted as shell syntax.
//!
//! Two executors exist:
//!
//! - [`SystemExecutor`] spawns real processes, each in its own process group,
//!   and touches the real filesystem. With `dry_run` set it only performs
//!   read-only work and logs everything else.
//! - [`RecordingExecutor`] is an in-memory spy used to drive whole pipeline
//!   stages headlessly: it records commands and file writes, serves scripted
//!   output and injects failures.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, error, info};

use crate::error::{InstallError, Result};
use crate::process_guard::CommandProcessGroup;
use crate::secret::Secret;

/// How much a command changes the machine it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Inspection only (`lsblk`). Still executed in dry-run mode.
    ReadOnly,
    /// Changes the live or target system.
    Mutating,
    /// Destroys data on a block device.
    Destructive,
}

/// A single external command: program, argv, optional stdin payload.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Secret>,
    pub capture: bool,
    pub side_effect: SideEffect,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            capture: false,
            side_effect: SideEffect::Mutating,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a filesystem path as an argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Feed `payload` to the child's stdin. The payload is never logged.
    pub fn stdin(mut self, payload: Secret) -> Self {
        self.stdin = Some(payload);
        self
    }

    /// Capture stdout instead of letting it through to the terminal.
    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.side_effect = SideEffect::ReadOnly;
        self
    }

    pub fn destructive(mut self) -> Self {
        self.side_effect = SideEffect::Destructive;
        self
    }

    /// The command line as it appears in the log.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())?;
        if self.stdin.is_some() {
            f.write_str(" <stdin: redacted>")?;
        }
        Ok(())
    }
}

/// Build `arch-chroot <root> <program>`; chain `.arg()` for the rest.
pub fn chroot(root: &Path, program: &str) -> CommandSpec {
    CommandSpec::new("arch-chroot").path_arg(root).arg(program)
}

/// Output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Empty unless the command asked for capture.
    pub stdout: String,
    pub stderr: String,
    /// None if terminated by signal.
    pub exit_code: Option<i32>,
}

/// Runs commands and performs file operations on behalf of the pipeline.
pub trait Executor {
    /// Run a command to completion. Non-zero exit is an error.
    fn run(&mut self, spec: &CommandSpec) -> Result<CapturedOutput>;

    fn write_file(&mut self, path: &Path, contents: &str) -> Result<()>;

    fn append_file(&mut self, path: &Path, contents: &str) -> Result<()>;

    fn read_file(&self, path: &Path) -> Result<String>;

    fn create_dir_all(&mut self, path: &Path) -> Result<()>;

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<()>;

    fn path_exists(&self, path: &Path) -> bool;

    /// True when mutating work is only being logged.
    fn is_dry_run(&self) -> bool {
        false
    }
}

// ============================================================================
// System executor
// ============================================================================

/// Executes commands on the live system.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    dry_run: bool,
}

impl SystemExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn skip(&self, what: fmt::Arguments<'_>) -> bool {
        if self.dry_run {
            info!("[dry-run] Would {}", what);
        }
        self.dry_run
    }
}

impl Executor for SystemExecutor {
    fn run(&mut self, spec: &CommandSpec) -> Result<CapturedOutput> {
        if spec.side_effect != SideEffect::ReadOnly && self.skip(format_args!("run: {}", spec)) {
            return Ok(CapturedOutput {
                exit_code: Some(0),
                ..CapturedOutput::default()
            });
        }

        info!("Running: {}", spec);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if spec.capture {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(Stdio::piped());
        if spec.side_effect == SideEffect::Destructive {
            cmd.in_detached_process_group();
        } else {
            cmd.in_new_process_group();
        }

        let mut child = cmd.spawn().map_err(|source| {
            error!("Failed to start {}: {}", spec.program, source);
            InstallError::Spawn {
                program: spec.program.clone(),
                source,
            }
        })?;

        if let (Some(payload), Some(mut pipe)) = (&spec.stdin, child.stdin.take()) {
            pipe.write_all(payload.expose().as_bytes())?;
            // Dropping the pipe closes it so the child sees EOF
        }

        let output = child.wait_with_output()?;
        let captured = CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        if output.status.success() {
            debug!("{} exited successfully", spec.program);
            Ok(captured)
        } else {
            error!(
                "Command failed: {} (exit code {:?}): {}",
                spec.display(),
                captured.exit_code,
                captured.stderr.trim()
            );
            Err(InstallError::CommandFailed {
                command: spec.display(),
                exit_code: captured.exit_code,
                stderr: captured.stderr,
            })
        }
    }

    fn write_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        if self.skip(format_args!("write {}", path.display())) {
            return Ok(());
        }
        info!("Writing {}", path.display());
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn append_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        if self.skip(format_args!("append to {}", path.display())) {
            return Ok(());
        }
        info!("Appending to {}", path.display());
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn create_dir_all(&mut self, path: &Path) -> Result<()> {
        if self.skip(format_args!("create directory {}", path.display())) {
            return Ok(());
        }
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if self.skip(format_args!("chmod {:o} {}", mode, path.display())) {
            return Ok(());
        }
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

// ============================================================================
// Recording executor
// ============================================================================

/// One command seen by the [`RecordingExecutor`].
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub line: String,
    pub side_effect: SideEffect,
    pub stdin: Option<Secret>,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    stdout: String,
    failure: Option<(i32, String)>,
}

/// In-memory executor that records everything and runs nothing.
///
/// Scripted responses and failures are matched against the full command line
/// by substring; the first matching rule wins. Commands with no matching rule
/// succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    pub commands: Vec<RecordedCommand>,
    pub files: BTreeMap<PathBuf, String>,
    pub modes: BTreeMap<PathBuf, u32>,
    pub dirs: BTreeSet<PathBuf>,
    rules: Vec<Rule>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `stdout` to every command whose line contains `pattern`.
    pub fn respond(&mut self, pattern: &str, stdout: &str) -> &mut Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            stdout: stdout.to_string(),
            failure: None,
        });
        self
    }

    /// Make every command whose line contains `pattern` exit 1 with `stderr`.
    pub fn fail_on(&mut self, pattern: &str, stderr: &str) -> &mut Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            stdout: String::new(),
            failure: Some((1, stderr.to_string())),
        });
        self
    }

    /// Pretend `path` exists (a directory such as `/sys/firmware/efi`).
    pub fn add_dir(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.dirs.insert(path.into());
        self
    }

    /// Seed an existing file.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, contents: &str) -> &mut Self {
        self.files.insert(path.into(), contents.to_string());
        self
    }

    /// Command lines in execution order.
    pub fn lines(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.line.clone()).collect()
    }

    /// Index of the first command whose line contains `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.line.contains(pattern))
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }
}

impl Executor for RecordingExecutor {
    fn run(&mut self, spec: &CommandSpec) -> Result<CapturedOutput> {
        let line = spec.display();
        self.commands.push(RecordedCommand {
            line: line.clone(),
            side_effect: spec.side_effect,
            stdin: spec.stdin.clone(),
        });

        let rule = self.rules.iter().find(|r| line.contains(&r.pattern));
        match rule {
            Some(Rule {
                failure: Some((code, stderr)),
                ..
            }) => Err(InstallError::CommandFailed {
                command: line,
                exit_code: Some(*code),
                stderr: stderr.clone(),
            }),
            Some(rule) => Ok(CapturedOutput {
                stdout: rule.stdout.clone(),
                stderr: String::new(),
                exit_code: Some(0),
            }),
            None => Ok(CapturedOutput {
                exit_code: Some(0),
                ..CapturedOutput::default()
            }),
        }
    }

    fn write_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        self.files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn append_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        self.files
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            InstallError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    fn create_dir_all(&mut self, path: &Path) -> Result<()> {
        self.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<()> {
        self.modes.insert(path.to_path_buf(), mode);
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }
}
