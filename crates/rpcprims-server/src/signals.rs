use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use signal_hook::consts::FORBIDDEN;
use signal_hook::low_level::{self, pipe};
use signal_hook::SigId;
use tokio::io::AsyncReadExt;
use tokio::signal::unix::SignalKind;
use tracing::trace;

/// Per-signal bookkeeping for signals whose disposition was the default
/// action before the first listener was installed.
///
/// The emulated default action stays registered for the life of the process
/// and only fires while no listener for that signal is alive.
struct DefaultAction {
    enabled: Option<Arc<AtomicBool>>,
    listeners: usize,
}

fn default_actions() -> &'static Mutex<HashMap<c_int, DefaultAction>> {
    static ACTIONS: OnceLock<Mutex<HashMap<c_int, DefaultAction>>> = OnceLock::new();
    ACTIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A signal subscription that gives the signal back when dropped.
///
/// While alive, deliveries are turned into readable bytes on a socket pair.
/// Dropping it unregisters that action; once the last listener for a signal
/// whose previous disposition was the default action is gone, the default
/// action (usually process termination) applies again.
pub(crate) struct SignalListener {
    kind: SignalKind,
    id: SigId,
    reader: tokio::net::UnixStream,
}

impl SignalListener {
    /// Start listening for `kind`. Must be called within a tokio runtime.
    pub(crate) fn install(kind: SignalKind) -> io::Result<Self> {
        let signo = kind.as_raw_value();
        if FORBIDDEN.contains(&signo) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("signal {signo} cannot be handled"),
            ));
        }

        let (reader, writer) = std::os::unix::net::UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        let reader = tokio::net::UnixStream::from_std(reader)?;

        suppress_default(signo)?;
        let id = match pipe::register(signo, writer) {
            Ok(id) => id,
            Err(err) => {
                release_default(signo);
                return Err(err);
            }
        };
        trace!(signal = signo, "signal listener installed");
        Ok(Self { kind, id, reader })
    }

    pub(crate) fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Wait for the next delivery.
    pub(crate) async fn recv(&mut self) -> io::Result<()> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte).await {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        low_level::unregister(self.id);
        release_default(self.kind.as_raw_value());
        trace!(signal = self.kind.as_raw_value(), "signal listener removed");
    }
}

/// Count one more listener for `signo`, keeping the default action off while
/// it lives.
fn suppress_default(signo: c_int) -> io::Result<()> {
    let mut actions = default_actions()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let action = match actions.entry(signo) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let enabled = if has_default_disposition(signo)? {
                let flag = Arc::new(AtomicBool::new(false));
                signal_hook::flag::register_conditional_default(signo, Arc::clone(&flag))?;
                Some(flag)
            } else {
                // Ignored signals and handlers installed elsewhere keep
                // their own behaviour.
                None
            };
            entry.insert(DefaultAction {
                enabled,
                listeners: 0,
            })
        }
    };
    action.listeners += 1;
    if let Some(flag) = &action.enabled {
        flag.store(false, Ordering::SeqCst);
    }
    Ok(())
}

fn release_default(signo: c_int) {
    let mut actions = default_actions()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let Some(action) = actions.get_mut(&signo) else {
        return;
    };
    action.listeners = action.listeners.saturating_sub(1);
    if action.listeners == 0 {
        if let Some(flag) = &action.enabled {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

fn has_default_disposition(signo: c_int) -> io::Result<bool> {
    // SAFETY: an all-zero sigaction is a valid out-parameter, and a null new
    // action only reads the current disposition.
    let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::sigaction(signo, std::ptr::null(), &mut current) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(current.sa_sigaction == libc::SIG_DFL)
}
