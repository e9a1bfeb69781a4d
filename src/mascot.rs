//! Desktop gopher (mascot) process control.
//!
//! The live set of mascots is always read from the operating system. Nothing
//! is cached, so gophers started or closed by hand are picked up on the next
//! call.

use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};

use crate::core::ReplySender;

/// One running mascot instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MascotProcess {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Where mascots live and how to poke them.
pub trait MascotHost: Send + Sync {
    /// Fresh list of running mascots.
    fn lookup(&self) -> Vec<MascotProcess>;

    /// Start one mascot without waiting for it.
    fn launch(&self) -> std::io::Result<()>;

    /// Make `mascot` jump. Returns whether the request was delivered.
    fn jump(&self, mascot: &MascotProcess) -> bool;

    /// Ask `mascot` to exit. Returns whether the request was delivered.
    fn terminate(&self, mascot: &MascotProcess) -> bool;
}

/// Mascots as OS processes of a given executable.
///
/// A jump is `SIGUSR1`, termination is `SIGTERM`. The default action for
/// `SIGUSR1` is to terminate the process, so a mascot program that installs no
/// handler for it exits on "jump gopher" instead of jumping.
pub struct SystemHost {
    program: PathBuf,
}

impl SystemHost {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn program_name(&self) -> Option<&OsStr> {
        self.program.file_name()
    }

    fn signal(&self, mascot: &MascotProcess, signal: Signal) -> bool {
        let mut sys = System::new();
        let pid = Pid::from_u32(mascot.pid);
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid)
            .and_then(|p| p.kill_with(signal))
            .unwrap_or(false)
    }
}

fn is_mascot(name: &OsStr, exe: Option<&Path>, target: &OsStr) -> bool {
    exe.and_then(Path::file_name) == Some(target) || name == target
}

impl MascotHost for SystemHost {
    fn lookup(&self) -> Vec<MascotProcess> {
        let Some(target) = self.program_name() else {
            return Vec::new();
        };

        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );

        let mut found: Vec<MascotProcess> = sys
            .processes()
            .values()
            .filter(|p| is_mascot(p.name(), p.exe(), target))
            .map(|p| MascotProcess {
                pid: p.pid().as_u32(),
                started_at: DateTime::<Utc>::from_timestamp(p.start_time() as i64, 0)
                    .unwrap_or_default(),
            })
            .collect();
        found.sort_by_key(|m| (m.started_at, m.pid));
        found
    }

    fn launch(&self) -> std::io::Result<()> {
        // The child handle is dropped on purpose; tokio reaps it in the background.
        tokio::process::Command::new(&self.program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }

    fn jump(&self, mascot: &MascotProcess) -> bool {
        self.signal(mascot, Signal::User1)
    }

    fn terminate(&self, mascot: &MascotProcess) -> bool {
        self.signal(mascot, Signal::Term)
    }
}

/// What a [`MascotController::spawn`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Launched,
    /// Too many mascots already; a warning was posted instead.
    Crowded { live: usize },
    /// The program could not be started. Callers ignore this.
    LaunchFailed,
}

/// Bounded pool of mascots.
///
/// No locking: every operation enumerates then acts, so concurrent callers or
/// manual launches can race between the two steps.
pub struct MascotController {
    host: Arc<dyn MascotHost>,
    replies: Arc<ReplySender>,
    max_instances: usize,
}

impl MascotController {
    pub fn new(host: Arc<dyn MascotHost>, replies: Arc<ReplySender>, max_instances: usize) -> Self {
        Self {
            host,
            replies,
            max_instances,
        }
    }

    /// Start one mascot unless `max_instances` are already running.
    ///
    /// Launch is fire-and-forget and a launch failure is only logged; it never
    /// reaches the chat.
    pub async fn spawn(&self) -> SpawnOutcome {
        let live = self.host.lookup().len();
        if live >= self.max_instances {
            tracing::info!(live, max = self.max_instances, "Refusing to spawn gopher");
            let warning = format!(
                "Here is so crowded! (Max: {} gophers)",
                self.max_instances
            );
            if let Err(e) = self.replies.send(&warning, None).await {
                tracing::warn!("Failed to post crowd warning: {}", e);
            }
            return SpawnOutcome::Crowded { live };
        }

        match self.host.launch() {
            Ok(()) => {
                tracing::debug!(live, "Launched gopher");
                SpawnOutcome::Launched
            }
            Err(e) => {
                tracing::warn!("Failed to launch gopher: {}", e);
                SpawnOutcome::LaunchFailed
            }
        }
    }

    /// Make every live mascot jump. Returns how many were reached.
    pub fn jump(&self) -> usize {
        let mascots = self.host.lookup();
        let reached = mascots.iter().filter(|m| self.host.jump(m)).count();
        tracing::debug!(live = mascots.len(), reached, "Jumped gophers");
        reached
    }

    /// Ask every live mascot to exit. Returns how many were reached.
    pub fn terminate(&self) -> usize {
        let mascots = self.host.lookup();
        let reached = mascots.iter().filter(|m| self.host.terminate(m)).count();
        tracing::info!(live = mascots.len(), reached, "Dismissed gophers");
        reached
    }
}
