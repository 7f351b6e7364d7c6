//! Lifecycle of the engine's `server` process.
//!
//! [`ServerSupervisor`] is the run's registry for the one live server: the
//! process is registered when `start` spawns it and released when `stop`
//! confirms it is gone. Failure paths call [`ServerSupervisor::sweep`], and
//! dropping the supervisor sweeps as well. The pid is also published in a
//! [`ProcessRegistry`] so the signal handlers can stop the server when the
//! harness itself is interrupted.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use newscheck_core::config::ServerConfig;
use newscheck_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::shutdown::ProcessRegistry;

const REAP_POLL: Duration = Duration::from_millis(50);

/// Starting and stopping the server under test.
pub trait ServerControl {
    /// Start a server bound to `port`, returning its process id.
    fn start(&mut self, port: u16) -> Result<u32>;

    /// Stop the live server. A no-op when nothing is running.
    fn stop(&mut self) -> Result<()>;
}

/// A spawned server process and where its output goes.
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
    log_path: PathBuf,
    reaped: Option<ExitStatus>,
}

impl SupervisedProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Whether the process has exited.
    ///
    /// Where the platform allows it the exited leader is left unreaped, so its
    /// pid and group id stay reserved until [`terminate`](Self::terminate).
    pub fn has_exited(&mut self) -> Result<bool> {
        if self.reaped.is_some() {
            return Ok(true);
        }
        if let Some(exited) = leader_exited(self.pid()) {
            return Ok(exited);
        }
        self.reaped = self.child.try_wait()?;
        Ok(self.reaped.is_some())
    }

    /// SIGTERM, wait up to `grace`, SIGKILL the process group, then reap.
    ///
    /// Safe to call on a process that already exited.
    pub fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        let pid = self.pid();
        if self.has_exited()? {
            debug!("Server (pid {}) already exited", pid);
        } else {
            request_shutdown(&mut self.child);
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline && !self.has_exited()? {
                std::thread::sleep(REAP_POLL);
            }
        }

        // Only an unreaped leader pins the group id.
        if self.reaped.is_none() {
            force_kill(&mut self.child);
        }
        let status = match self.reaped {
            Some(status) => status,
            None => self.child.wait()?,
        };
        self.reaped = Some(status);
        Ok(status)
    }
}

/// `Some(true)` once the child `pid` has exited, without reaping it.
#[cfg(target_os = "linux")]
pub(crate) fn leader_exited(pid: u32) -> Option<bool> {
    // SAFETY: siginfo_t is plain data; all zeroes is a valid value.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is a valid, writable siginfo_t for the whole call.
    let rc = unsafe {
        libc::waitid(
            libc::P_PID,
            pid as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    if rc != 0 {
        return None;
    }
    // WNOHANG leaves si_pid at zero while the child is still running.
    // SAFETY: waitid succeeded and filled `info`.
    Some(unsafe { info.si_pid() } != 0)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn leader_exited(_pid: u32) -> Option<bool> {
    None
}

#[cfg(unix)]
fn request_shutdown(child: &mut Child) {
    send_term(child.id());
}

#[cfg(not(unix))]
fn request_shutdown(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
pub(crate) fn send_term(pid: u32) {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        debug!("SIGTERM to {} failed: {}", pid, std::io::Error::last_os_error());
    }
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    kill_group(child.id());
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    let _ = child.kill();
}

/// SIGKILL every process left in the server's group; missing groups are fine.
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) {
    // The server leads its own group, so its pid is the group id.
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!("SIGKILL to group {} failed: {}", pid, err);
        }
    }
}

/// Stop a server known only by pid: SIGTERM, wait up to `grace`, kill the group.
///
/// The caller must hold the registry lock so the owning supervisor cannot
/// reap the leader meanwhile.
#[cfg(unix)]
pub(crate) fn sweep_pid(pid: u32, grace: Duration) {
    send_term(pid);
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline && leader_exited(pid) != Some(true) {
        std::thread::sleep(REAP_POLL);
    }
    kill_group(pid);
}

/// Runs `<binary> server <port>` and owns the resulting process.
#[derive(Debug)]
pub struct ServerSupervisor {
    binary: PathBuf,
    config: ServerConfig,
    live: Option<SupervisedProcess>,
    registry: ProcessRegistry,
}

impl ServerSupervisor {
    pub fn new(binary: impl Into<PathBuf>, config: ServerConfig) -> Self {
        Self {
            binary: binary.into(),
            config,
            live: None,
            registry: ProcessRegistry::new(),
        }
    }

    /// Publish the live server's pid in `registry` for the signal handlers.
    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Process id of the live server, if any.
    pub fn live_pid(&self) -> Option<u32> {
        self.live.as_ref().map(SupervisedProcess::pid)
    }

    /// Best-effort stop used on failure paths; never fails.
    pub fn sweep(&mut self) {
        if let Some(pid) = self.live_pid() {
            warn!("Stopping server (pid {}) after failure", pid);
        }
        if let Err(e) = self.stop() {
            warn!("Failed to stop server cleanly: {}", e);
        }
    }

    /// Terminate and forget the live process, holding the registry lock so a
    /// signal never races the reap.
    fn release(&mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        let registry = self.registry.clone();
        let mut registered = registry.lock();
        let Some(mut process) = self.live.take() else {
            return Ok(None);
        };
        let status = process.terminate(grace);
        *registered = None;
        status.map(Some)
    }

    fn spawn(&self, port: u16) -> Result<Child> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_path)
            .map_err(|e| {
                Error::Process(format!(
                    "cannot open server log {}: {}",
                    self.config.log_path.display(),
                    e
                ))
            })?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&self.binary);
        command
            .arg("server")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            // Detach into its own group so the whole tree can be killed.
            command.process_group(0);
        }

        command.spawn().map_err(|e| {
            Error::Process(format!("cannot start {}: {}", self.binary.display(), e))
        })
    }
}

impl ServerControl for ServerSupervisor {
    fn start(&mut self, port: u16) -> Result<u32> {
        if let Some(pid) = self.live_pid() {
            return Err(Error::Process(format!(
                "server is already running (pid {pid})"
            )));
        }

        info!("Running server command...");
        info!("{} server {}", self.binary.display(), port);

        let pid = {
            let registry = self.registry.clone();
            let mut registered = registry.lock();
            let child = self.spawn(port)?;
            let pid = child.id();
            self.live = Some(SupervisedProcess {
                child,
                log_path: self.config.log_path.clone(),
                reaped: None,
            });
            *registered = Some(pid);
            pid
        };
        if pid == 0 {
            self.sweep();
            return Err(Error::Process(format!("Invalid pid {pid}")));
        }

        std::thread::sleep(self.config.startup_probe());
        let exited = {
            let registry = self.registry.clone();
            let _registered = registry.lock();
            match self.live.as_mut() {
                Some(process) => process.has_exited()?,
                None => false,
            }
        };
        if exited {
            let status = self.release(Duration::ZERO)?;
            let status = status.map_or_else(|| "unknown status".to_string(), |s| s.to_string());
            return Err(Error::Process(format!(
                "server exited immediately ({status}); see {}",
                self.config.log_path.display()
            )));
        }

        info!("HTTP-server running at http://127.0.0.1:{}/ (pid {})", port, pid);
        Ok(pid)
    }

    fn stop(&mut self) -> Result<()> {
        let Some(process) = self.live.as_ref() else {
            return Ok(());
        };

        info!(
            "Stopping server (pid {}, output in {})...",
            process.pid(),
            process.log_path().display()
        );
        if let Some(status) = self.release(self.config.stop_grace())? {
            debug!("Server exited with {}", status);
        }
        Ok(())
    }
}

impl Drop for ServerSupervisor {
    fn drop(&mut self) {
        self.sweep();
    }
}
