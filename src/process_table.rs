//! Worker discovery by command-line signature.
//!
//! Workers are detached and re-parented, so no PID is carried across
//! invocations. Instead every lookup scans the OS process table for the
//! worker binary plus its detachment marker, and optionally the tag that
//! singles out one per-core worker.

use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};

/// Argument marking a process as a detached burn worker.
pub const WORKER_MARKER: &str = "--nohup";
/// Argument pairing a per-core worker with its tag.
pub const TAG_FLAG: &str = "--cpu-processor";

#[derive(Debug, Clone)]
pub struct Signature {
    pub binary: String,
    pub tag: Option<String>,
}

impl Signature {
    pub fn new(binary: impl Into<String>) -> Self {
        Signature {
            binary: binary.into(),
            tag: None,
        }
    }

    pub fn tagged(binary: impl Into<String>, tag: impl Into<String>) -> Self {
        Signature {
            binary: binary.into(),
            tag: Some(tag.into()),
        }
    }

    /// Match a process-table entry against this signature. `name` may be
    /// truncated by the OS, so a prefix of the binary name is accepted.
    pub fn matches(&self, name: &str, cmd: &[String]) -> bool {
        if name != self.binary && !(name.len() >= 15 && self.binary.starts_with(name)) {
            return false;
        }
        if !cmd.iter().any(|arg| arg == WORKER_MARKER) {
            return false;
        }
        match &self.tag {
            Some(tag) => cmd
                .windows(2)
                .any(|pair| pair[0] == TAG_FLAG && &pair[1] == tag),
            None => true,
        }
    }
}

/// Process-table lookup, abstracted so tests can substitute an in-memory
/// table for the live OS one.
pub trait ProcessTable {
    /// PIDs of all processes matching `signature`, excluding the caller.
    fn find_pids(&mut self, signature: &Signature) -> Vec<u32>;
}

pub struct SysinfoTable {
    sys: System,
    self_pid: Option<Pid>,
}

impl SysinfoTable {
    pub fn new() -> Self {
        SysinfoTable {
            sys: System::new(),
            self_pid: get_current_pid().ok(),
        }
    }
}

impl ProcessTable for SysinfoTable {
    fn find_pids(&mut self, signature: &Signature) -> Vec<u32> {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);

        let mut pids: Vec<u32> = self
            .sys
            .processes()
            .values()
            .filter(|process| Some(process.pid()) != self.self_pid)
            .filter(|process| {
                let name = process.name().to_string_lossy();
                let cmd: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect();
                signature.matches(&name, &cmd)
            })
            .map(|process| process.pid().as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }
}
