//! Invocation of external tools.
//!
//! The workflow never spawns processes itself; it goes through a
//! [`ProcessRunner`], so a test double can stand in for a real CA installation.

use std::collections::BTreeMap;
use std::fmt;
use std::process::{Command, Stdio};

use crate::error::{Result, VpnKitError};

/// A single command to run.
///
/// # Fields
/// * `program` - Executable name or path.
/// * `args` - Command-line arguments.
/// * `env` - Variables merged over the current process environment for this
///   invocation only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
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

    /// Sets every variable of `env` for this invocation.
    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Capability to run an external command and wait for it.
pub trait ProcessRunner {
    /// Runs `invocation` to completion.
    ///
    /// Only failure to start the process is an error here; a non-zero exit is
    /// reported through [`ProcessOutput::code`].
    fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput>;

    /// Runs `invocation` and turns a non-zero exit into [`VpnKitError::ToolFailed`].
    fn run_checked(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        log::debug!("running: {invocation}");
        let output = self.invoke(invocation)?;
        if !output.stdout.is_empty() {
            log::trace!("{} stdout:\n{}", invocation.program, output.stdout);
        }
        if !output.stderr.is_empty() {
            log::trace!("{} stderr:\n{}", invocation.program, output.stderr);
        }
        if output.success() {
            Ok(output)
        } else {
            Err(VpnKitError::ToolFailed {
                command: invocation.to_string(),
                status: output.status_text(),
                stderr: tail(&output.stderr, 5),
            })
        }
    }
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        (**self).invoke(invocation)
    }
}

/// Runs commands with [`std::process::Command`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| VpnKitError::ToolSpawn {
                command: invocation.program.clone(),
                source,
            })?;
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Last `n` non-empty lines of `text`, joined with `" | "`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines[lines.len().saturating_sub(n)..].join(" | ")
}
