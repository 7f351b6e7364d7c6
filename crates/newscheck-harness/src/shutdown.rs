//! Stopping the live server when the harness is interrupted.
//!
//! The supervisor publishes its server's pid in a [`ProcessRegistry`]. On
//! SIGINT, SIGTERM or SIGHUP a listener thread takes the registry lock, stops
//! whatever is registered and exits with `128 + signal`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use newscheck_core::Result;

/// Pid of the live server, shared between the supervisor and signal handlers.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    live: Arc<Mutex<Option<u32>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registered server pid, if one is running.
    pub fn live(&self) -> Option<u32> {
        *self.lock()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<u32>> {
        // A panicking holder leaves a pid that still needs stopping.
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawn the listener that stops the registered server on the first signal.
///
/// `grace` is how long the server gets to exit after SIGTERM before its
/// process group is killed.
#[cfg(unix)]
pub fn install_signal_handlers(registry: ProcessRegistry, grace: Duration) -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use tracing::warn;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP]).map_err(|e| {
        newscheck_core::Error::Process(format!("cannot install signal handlers: {e}"))
    })?;

    std::thread::Builder::new()
        .name("newscheck-signals".to_owned())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                // Held until exit so nothing new gets spawned.
                let mut registered = registry.lock();
                match registered.take() {
                    Some(pid) => {
                        warn!("Interrupted by signal {}, stopping server (pid {})", signal, pid);
                        crate::supervisor::sweep_pid(pid, grace);
                    }
                    None => warn!("Interrupted by signal {}", signal),
                }
                std::process::exit(128 + signal);
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_handlers(_registry: ProcessRegistry, _grace: Duration) -> Result<()> {
    Ok(())
}
