//! Process boundary for the `security` tool
//!
//! Every keychain operation ends up here: a [`CommandRunner`] spawns the
//! tool and captures its output, and [`Security`] turns a non-zero exit into
//! a [`MellonError::Command`] carrying the shell-escaped invocation.
//!
//! - `SystemRunner`: spawns real processes via `std::process::Command`
//! - `FakeSecurity`: in-memory emulation of the tool's text protocol
//! - `ScriptedRunner`: canned responses for exact command lines

pub mod fake;

use std::process::Command;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::MellonConfig;
use crate::error::{MellonError, MellonResult};

pub use fake::{FakeEntry, FakeSecurity, ScriptedRunner};

/// Name of the macOS secret-management tool
pub const DEFAULT_PROGRAM: &str = "security";

/// Placeholder shown instead of secret payloads in logs and errors
const REDACTED: &str = "<redacted>";

/// Captured result of one process invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// A successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    /// A failed run with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program and captures its output
///
/// Implementations must not retry and must not interpret the exit code;
/// that is left to [`Security::run`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Runner that spawns real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }
}

/// Handle on the `security` tool
///
/// Cheap to clone; every [`Keychain`](crate::Keychain) carries one.
#[derive(Clone)]
pub struct Security {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl Security {
    /// Spawn the real `security` binary
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemRunner))
    }

    /// Route invocations through a custom runner
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            runner,
        }
    }

    /// Build from configuration (program override)
    pub fn from_config(config: &MellonConfig) -> Self {
        Self::new().with_program(config.program.clone())
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the tool, returning stdout with its trailing newline removed
    pub fn run(&self, args: &[&str]) -> MellonResult<String> {
        self.run_full(args).map(|output| output.stdout)
    }

    /// Run the tool, returning both streams with trailing newlines removed
    ///
    /// Fails with [`MellonError::Command`] on any non-zero exit.
    pub fn run_full(&self, args: &[&str]) -> MellonResult<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let rendered = self.render(&args);
        debug!("$ {}", rendered);

        let output = self
            .runner
            .run(&self.program, &args)
            .map_err(|source| MellonError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout = chomp(&output.stdout).to_string();
        let stderr = chomp(&output.stderr).to_string();
        for line in stdout.lines() {
            trace!("--> {}", line);
        }
        for line in stderr.lines() {
            trace!("--! {}", line);
        }

        if !output.success() {
            return Err(MellonError::command(rendered, stderr));
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            code: output.code,
        })
    }

    /// Shell-escaped rendering of an invocation, with payloads redacted
    pub fn render(&self, args: &[String]) -> String {
        let mut parts = vec![quote(&self.program)];
        let mut redact_next = false;
        for arg in args {
            if redact_next {
                parts.push(REDACTED.to_string());
                redact_next = false;
                continue;
            }
            redact_next = arg == "-w";
            parts.push(quote(arg));
        }
        parts.join(" ")
    }
}

impl Default for Security {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security")
            .field("program", &self.program)
            .finish()
    }
}

fn quote(arg: &str) -> String {
    shlex::try_quote(arg)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| arg.to_string())
}

/// Remove one trailing line ending
fn chomp(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security(runner: ScriptedRunner) -> Security {
        Security::with_runner(Arc::new(runner))
    }

    #[test]
    fn test_chomp() {
        assert_eq!(chomp("line\n"), "line");
        assert_eq!(chomp("line\r\n"), "line");
        assert_eq!(chomp("two\n\n"), "two\n");
        assert_eq!(chomp(""), "");
    }

    #[test]
    fn test_run_trims_trailing_newline() {
        let runner = ScriptedRunner::new().respond(
            "security default-keychain",
            CommandOutput::ok("    \"/k/login.keychain\"\n"),
        );
        let out = security(runner).run(&["default-keychain"]).unwrap();
        assert_eq!(out, "    \"/k/login.keychain\"");
    }

    #[test]
    fn test_non_zero_exit_is_command_error() {
        let runner = ScriptedRunner::new().respond(
            "security show-keychain-info /tmp/a b.keychain",
            CommandOutput::failed(50, "security: no such keychain\n"),
        );
        let err = security(runner)
            .run(&["show-keychain-info", "/tmp/a b.keychain"])
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("[ERROR] security show-keychain-info "));
        assert!(!message.contains("show-keychain-info /tmp/a b.keychain"));
        assert!(message.ends_with("\n  security: no such keychain"));
    }

    #[test]
    fn test_empty_stderr_placeholder() {
        let runner = ScriptedRunner::new()
            .respond("security list-keychains", CommandOutput::failed(1, ""));
        let err = security(runner).run(&["list-keychains"]).unwrap_err();
        assert!(err.to_string().ends_with("<no output>"));
    }

    #[test]
    fn test_unscripted_command_is_spawn_error() {
        let err = security(ScriptedRunner::new())
            .run(&["list-keychains"])
            .unwrap_err();
        assert!(matches!(err, MellonError::Spawn { .. }));
    }

    #[test]
    fn test_render_redacts_payload() {
        let sec = Security::new();
        let args: Vec<String> = ["add-generic-password", "-s", "db", "-w", "hunter 2", "-U"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            sec.render(&args),
            "security add-generic-password -s db -w <redacted> -U"
        );
    }

    #[test]
    fn test_program_override() {
        let config = MellonConfig {
            program: "/usr/local/bin/security".to_string(),
            ..Default::default()
        };
        assert_eq!(
            Security::from_config(&config).program(),
            "/usr/local/bin/security"
        );
    }
}
