//! Lifecycle control for detached burn workers: launch, bind, verify, kill.
//!
//! The supervisor never keeps a PID across invocations. Workers are found
//! again by their command-line signature, which is the only durable handle
//! a detached, re-parented process leaves behind.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::commands::ExternalCommands;
use crate::config::BurnConfig;
use crate::error::BurnError;
use crate::process_table::{ProcessTable, Signature, TAG_FLAG, WORKER_MARKER};

const TASKSET: &str = "taskset";
const KILL: &str = "kill";

/// Delay before re-querying the process table after a detached launch.
const VERIFY_GRACE: Duration = Duration::from_secs(1);
/// Delay before resolving a freshly launched per-core worker's PID.
const LAUNCH_GRACE: Duration = Duration::from_millis(200);

/// A worker spawned by this invocation. The PID is only resolved when a
/// core binding needed it; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct WorkerProcessRecord {
    pub pid: Option<u32>,
    pub core: Option<u32>,
}

pub struct Supervisor<T, C> {
    table: T,
    commands: C,
    exe: PathBuf,
    binary: String,
}

impl<T: ProcessTable, C: ExternalCommands> Supervisor<T, C> {
    pub fn new(table: T, commands: C, exe: PathBuf) -> Result<Self, BurnError> {
        let binary = exe
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                BurnError::Launch(format!(
                    "executable path {} has no usable file name",
                    exe.display()
                ))
            })?;
        Ok(Supervisor {
            table,
            commands,
            exe,
            binary,
        })
    }

    /// Launch the configured worker process(es) and verify they are alive.
    /// Any failure first tears down whatever was already started.
    pub fn start(&mut self, config: &BurnConfig) -> Result<Vec<WorkerProcessRecord>, BurnError> {
        match self.launch_all(config) {
            Ok(records) => Ok(records),
            Err(err) => {
                if let Err(stop_err) = self.stop() {
                    warn!("cleanup after failed start also failed: {stop_err}");
                }
                Err(err)
            }
        }
    }

    fn launch_all(&mut self, config: &BurnConfig) -> Result<Vec<WorkerProcessRecord>, BurnError> {
        let mut records = Vec::new();

        match &config.core_list {
            Some(cores) => {
                for &core in cores {
                    let tag = core.to_string();
                    let pid = self.launch_worker(config, Some(&tag))?;
                    let pid = pid.ok_or_else(|| {
                        BurnError::Discovery(format!(
                            "no worker process found for core tag {tag}"
                        ))
                    })?;
                    self.bind_to_core(core, pid)?;
                    records.push(WorkerProcessRecord {
                        pid: Some(pid),
                        core: Some(core),
                    });
                }
            }
            None => {
                self.launch_worker(config, None)?;
                records.push(WorkerProcessRecord {
                    pid: None,
                    core: None,
                });
            }
        }

        self.verify_started()?;
        Ok(records)
    }

    /// Re-exec this binary as a detached worker. Returns the new worker's
    /// PID when a tag was given, since only tagged workers need binding.
    fn launch_worker(
        &mut self,
        config: &BurnConfig,
        tag: Option<&str>,
    ) -> Result<Option<u32>, BurnError> {
        let core_count = if tag.is_some() { 1 } else { config.core_count };

        let mut args: Vec<String> = vec![
            WORKER_MARKER.to_string(),
            "--cpu-count".to_string(),
            core_count.to_string(),
            "--cpu-percent".to_string(),
            config.percent.to_string(),
            "--climb-time".to_string(),
            config.climb_secs.to_string(),
        ];
        if let Some(tag) = tag {
            args.push(TAG_FLAG.to_string());
            args.push(tag.to_string());
        }
        if config.absolute {
            args.push("--absolute".to_string());
        }

        debug!("launching detached worker: {} {}", self.exe.display(), args.join(" "));
        self.commands
            .spawn_detached(&self.exe, &args)
            .map_err(BurnError::Launch)?;

        match tag {
            Some(tag) => {
                thread::sleep(LAUNCH_GRACE);
                let signature = Signature::tagged(&self.binary, tag);
                Ok(self.table.find_pids(&signature).first().copied())
            }
            None => Ok(None),
        }
    }

    /// Restrict `pid` to `core` via the external affinity tool.
    pub fn bind_to_core(&mut self, core: u32, pid: u32) -> Result<(), BurnError> {
        if !self.commands.tool_available(TASKSET) {
            return Err(BurnError::ToolMissing(TASKSET));
        }
        let args = vec![
            "-a".to_string(),
            "-cp".to_string(),
            core.to_string(),
            pid.to_string(),
        ];
        self.commands
            .run_tool(TASKSET, &args)
            .map_err(|reason| BurnError::Bind { core, pid, reason })
    }

    /// A detached launch reporting success does not guarantee the child is
    /// alive; check the process table again after a grace delay.
    fn verify_started(&mut self) -> Result<(), BurnError> {
        thread::sleep(VERIFY_GRACE);
        let signature = Signature::new(&self.binary);
        if self.table.find_pids(&signature).is_empty() {
            return Err(BurnError::Discovery(format!(
                "{} worker process not found after start",
                self.binary
            )));
        }
        Ok(())
    }

    /// Kill every worker matching this binary's signature in one batched
    /// request. Finding none is an idempotent no-op success.
    pub fn stop(&mut self) -> Result<Vec<u32>, BurnError> {
        let signature = Signature::new(&self.binary);
        let pids = self.table.find_pids(&signature);
        if pids.is_empty() {
            return Ok(pids);
        }

        let mut args: Vec<String> = vec!["-9".to_string()];
        args.extend(pids.iter().map(|pid| pid.to_string()));
        self.commands
            .run_tool(KILL, &args)
            .map_err(BurnError::Kill)?;
        Ok(pids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    struct Entry {
        pid: u32,
        name: String,
        cmd: Vec<String>,
    }

    type Entries = Rc<RefCell<Vec<Entry>>>;

    struct FakeTable {
        entries: Entries,
    }

    impl ProcessTable for FakeTable {
        fn find_pids(&mut self, signature: &Signature) -> Vec<u32> {
            self.entries
                .borrow()
                .iter()
                .filter(|entry| signature.matches(&entry.name, &entry.cmd))
                .map(|entry| entry.pid)
                .collect()
        }
    }

    struct FakeCommands {
        entries: Entries,
        next_pid: u32,
        taskset_installed: bool,
        spawn_fails: bool,
        spawned_workers_die: bool,
        binds: Rc<RefCell<Vec<Vec<String>>>>,
        kills: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl ExternalCommands for FakeCommands {
        fn tool_available(&self, tool: &str) -> bool {
            tool != TASKSET || self.taskset_installed
        }

        fn run_tool(&mut self, tool: &str, args: &[String]) -> Result<(), String> {
            match tool {
                TASKSET => {
                    self.binds.borrow_mut().push(args.to_vec());
                    Ok(())
                }
                KILL => {
                    let killed: Vec<u32> = args[1..]
                        .iter()
                        .map(|pid| pid.parse().unwrap())
                        .collect();
                    self.entries
                        .borrow_mut()
                        .retain(|entry| !killed.contains(&entry.pid));
                    self.kills.borrow_mut().push(args.to_vec());
                    Ok(())
                }
                other => Err(format!("unexpected tool {other}")),
            }
        }

        fn spawn_detached(&mut self, program: &Path, args: &[String]) -> Result<(), String> {
            if self.spawn_fails {
                return Err("spawn failed".to_string());
            }
            if self.spawned_workers_die {
                return Ok(());
            }
            let name = program.file_name().unwrap().to_str().unwrap().to_string();
            let mut cmd = vec![name.clone()];
            cmd.extend(args.iter().cloned());
            let pid = self.next_pid;
            self.next_pid += 1;
            self.entries.borrow_mut().push(Entry { pid, name, cmd });
            Ok(())
        }
    }

    struct Harness {
        supervisor: Supervisor<FakeTable, FakeCommands>,
        entries: Entries,
        binds: Rc<RefCell<Vec<Vec<String>>>>,
        kills: Rc<RefCell<Vec<Vec<String>>>>,
    }

    fn harness(configure: impl FnOnce(&mut FakeCommands)) -> Harness {
        let entries: Entries = Rc::new(RefCell::new(Vec::new()));
        let binds = Rc::new(RefCell::new(Vec::new()));
        let kills = Rc::new(RefCell::new(Vec::new()));

        let mut commands = FakeCommands {
            entries: Rc::clone(&entries),
            next_pid: 100,
            taskset_installed: true,
            spawn_fails: false,
            spawned_workers_die: false,
            binds: Rc::clone(&binds),
            kills: Rc::clone(&kills),
        };
        configure(&mut commands);

        let table = FakeTable {
            entries: Rc::clone(&entries),
        };
        let supervisor =
            Supervisor::new(table, commands, PathBuf::from("/usr/local/bin/cpuburn")).unwrap();

        Harness {
            supervisor,
            entries,
            binds,
            kills,
        }
    }

    fn config(core_list: Option<Vec<u32>>) -> BurnConfig {
        BurnConfig {
            core_count: 2,
            percent: 75.0,
            climb_secs: 0,
            absolute: false,
            core_list,
            processor_tag: None,
        }
    }

    #[test]
    fn test_stop_without_workers_is_noop_success() {
        let mut h = harness(|_| {});
        let pids = h.supervisor.stop().unwrap();
        assert!(pids.is_empty());
        assert!(h.kills.borrow().is_empty());
    }

    #[test]
    fn test_stop_kills_all_matches_in_one_batch() {
        let mut h = harness(|_| {});
        h.supervisor.start(&config(None)).unwrap();
        h.supervisor
            .launch_worker(&config(None), Some("1"))
            .unwrap();

        let pids = h.supervisor.stop().unwrap();
        assert_eq!(pids.len(), 2);
        assert_eq!(h.kills.borrow().len(), 1);
        assert_eq!(h.kills.borrow()[0][0], "-9");
        assert!(h.entries.borrow().is_empty());
    }

    #[test]
    fn test_plain_start_launches_single_worker() {
        let mut h = harness(|_| {});
        let records = h.supervisor.start(&config(None)).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].pid.is_none());

        let entries = h.entries.borrow();
        assert_eq!(entries.len(), 1);
        let cmd = entries[0].cmd.join(" ");
        assert!(cmd.contains("--nohup"));
        assert!(cmd.contains("--cpu-count 2"));
        assert!(cmd.contains("--cpu-percent 75"));
        assert!(!cmd.contains(TAG_FLAG));
        assert!(h.binds.borrow().is_empty());
    }

    #[test]
    fn test_core_list_start_spawns_and_binds_one_worker_per_core() {
        let mut h = harness(|_| {});
        let records = h.supervisor.start(&config(Some(vec![0, 2]))).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].core, Some(0));
        assert_eq!(records[1].core, Some(2));

        let entries = h.entries.borrow();
        assert_eq!(entries.len(), 2);
        for (entry, core) in entries.iter().zip(["0", "2"]) {
            let cmd = entry.cmd.join(" ");
            assert!(cmd.contains("--cpu-count 1"));
            assert!(cmd.contains(&format!("{TAG_FLAG} {core}")));
        }

        let pid0 = records[0].pid.unwrap().to_string();
        let pid2 = records[1].pid.unwrap().to_string();
        let binds = h.binds.borrow();
        assert_eq!(binds.len(), 2);
        assert_eq!(binds[0], ["-a", "-cp", "0", pid0.as_str()]);
        assert_eq!(binds[1], ["-a", "-cp", "2", pid2.as_str()]);
    }

    #[test]
    fn test_missing_taskset_aborts_start_and_cleans_up() {
        let mut h = harness(|commands| commands.taskset_installed = false);
        let err = h.supervisor.start(&config(Some(vec![0]))).unwrap_err();

        assert!(matches!(err, BurnError::ToolMissing(TASKSET)));
        // The already-launched worker must not be left running.
        assert!(h.entries.borrow().is_empty());
        assert_eq!(h.kills.borrow().len(), 1);
    }

    #[test]
    fn test_launch_failure_propagates() {
        let mut h = harness(|commands| commands.spawn_fails = true);
        let err = h.supervisor.start(&config(None)).unwrap_err();
        assert!(matches!(err, BurnError::Launch(_)));
    }

    #[test]
    fn test_verification_failure_when_worker_died() {
        let mut h = harness(|commands| commands.spawned_workers_die = true);
        let err = h.supervisor.start(&config(None)).unwrap_err();
        assert!(matches!(err, BurnError::Discovery(_)));
    }

    #[test]
    fn test_tagged_worker_not_found_is_discovery_failure() {
        let mut h = harness(|commands| commands.spawned_workers_die = true);
        let err = h.supervisor.start(&config(Some(vec![3]))).unwrap_err();
        assert!(matches!(err, BurnError::Discovery(_)));
    }
}
