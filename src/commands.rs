//! External command layer: detached worker launches, affinity binds and
//! batched kills all go through this seam so the supervisor can be tested
//! against a fake.

use std::env;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

pub trait ExternalCommands {
    /// Whether `tool` resolves to an executable on PATH.
    fn tool_available(&self, tool: &str) -> bool;

    /// Run `tool` to completion; a non-zero exit is an `Err` carrying the
    /// tool's diagnostic output.
    fn run_tool(&mut self, tool: &str, args: &[String]) -> Result<(), String>;

    /// Launch `program` detached: new session, discarded stdio, outlives
    /// the calling process.
    fn spawn_detached(&mut self, program: &Path, args: &[String]) -> Result<(), String>;
}

pub struct ShellCommands;

impl ExternalCommands for ShellCommands {
    fn tool_available(&self, tool: &str) -> bool {
        env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).any(|dir| dir.join(tool).is_file()))
            .unwrap_or(false)
    }

    fn run_tool(&mut self, tool: &str, args: &[String]) -> Result<(), String> {
        let output = Command::new(tool)
            .args(args)
            .output()
            .map_err(|err| format!("{tool}: {err}"))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("{tool} exited with {}: {}", output.status, stderr.trim()))
        }
    }

    fn spawn_detached(&mut self, program: &Path, args: &[String]) -> Result<(), String> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        command
            .spawn()
            .map(drop)
            .map_err(|err| format!("{}: {err}", program.display()))
    }
}
