//! Scoped resources held during the capability probe
//!
//! Toolkit initialization has two side effects we must undo: it writes
//! diagnostics to stderr, and it may clear the startup-notification
//! identifier from the environment. Both are wrapped in guards that restore
//! the previous state when dropped.

use nix::unistd::dup2;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::ops::{Deref, DerefMut};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use tracing::debug;

/// Environment access seen by the probe and the toolkit
pub trait SessionEnv {
    fn var_os(&self, key: &str) -> Option<OsString>;
    fn set_var(&mut self, key: &str, value: &OsStr);
    fn remove_var(&mut self, key: &str);

    /// Value of `key` if present and non-empty
    fn non_empty(&self, key: &str) -> Option<OsString> {
        self.var_os(key).filter(|v| !v.is_empty())
    }
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl SessionEnv for ProcessEnv {
    fn var_os(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }

    fn set_var(&mut self, key: &str, value: &OsStr) {
        std::env::set_var(key, value);
    }

    fn remove_var(&mut self, key: &str) {
        std::env::remove_var(key);
    }
}

/// In-memory environment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapEnv {
    vars: HashMap<String, OsString>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<OsString>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }
}

impl SessionEnv for MapEnv {
    fn var_os(&self, key: &str) -> Option<OsString> {
        self.vars.get(key).cloned()
    }

    fn set_var(&mut self, key: &str, value: &OsStr) {
        self.vars.insert(key.to_string(), value.to_os_string());
    }

    fn remove_var(&mut self, key: &str) {
        self.vars.remove(key);
    }
}

/// Whether standard input is an interactive terminal
pub trait Terminal {
    fn stdin_is_terminal(&self) -> bool;
}

/// The process's real standard input
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTerminal;

impl Terminal for ProcessTerminal {
    fn stdin_is_terminal(&self) -> bool {
        io::stdin().is_terminal()
    }
}

/// Snapshot of selected environment values, restored exactly on drop
///
/// Values removed or changed while the snapshot is held are put back;
/// values created while it is held are removed again.
pub struct EnvSnapshot<'a, E: SessionEnv + ?Sized> {
    env: &'a mut E,
    saved: Vec<(String, Option<OsString>)>,
}

impl<'a, E: SessionEnv + ?Sized> EnvSnapshot<'a, E> {
    pub fn take<K: AsRef<str>>(env: &'a mut E, keys: &[K]) -> Self {
        let saved = keys
            .iter()
            .map(|k| {
                let key = k.as_ref().to_string();
                let value = env.var_os(&key);
                (key, value)
            })
            .collect();

        Self { env, saved }
    }
}

impl<E: SessionEnv + ?Sized> Deref for EnvSnapshot<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.env
    }
}

impl<E: SessionEnv + ?Sized> DerefMut for EnvSnapshot<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.env
    }
}

impl<E: SessionEnv + ?Sized> Drop for EnvSnapshot<'_, E> {
    fn drop(&mut self) {
        for (key, saved) in self.saved.drain(..) {
            let current = self.env.var_os(&key);
            if current == saved {
                continue;
            }

            debug!("Restoring {}", key);
            match saved {
                Some(value) => self.env.set_var(&key, &value),
                None => self.env.remove_var(&key),
            }
        }
    }
}

/// Stderr pointed at `/dev/null` until dropped
///
/// The saved descriptor is close-on-exec. If stderr cannot be duplicated or
/// `/dev/null` cannot be opened, stderr is left exactly as it was.
pub struct StderrGuard {
    saved: Option<OwnedFd>,
}

impl StderrGuard {
    pub fn silence() -> Self {
        let saved = match io::stderr().as_fd().try_clone_to_owned() {
            Ok(fd) => fd,
            Err(e) => {
                debug!("Cannot save stderr, probing unsilenced: {}", e);
                return Self { saved: None };
            }
        };

        let devnull = match OpenOptions::new().append(true).open("/dev/null") {
            Ok(f) => f,
            Err(e) => {
                debug!("Cannot open /dev/null, probing unsilenced: {}", e);
                return Self { saved: None };
            }
        };

        if let Err(e) = dup2(devnull.as_raw_fd(), stderr_fd()) {
            debug!("Cannot redirect stderr: {}", e);
            return Self { saved: None };
        }

        Self { saved: Some(saved) }
    }

    /// Guard that leaves stderr untouched
    pub fn inactive() -> Self {
        Self { saved: None }
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for StderrGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            restore_stderr(saved.as_raw_fd());
        }
    }
}

fn restore_stderr(saved: RawFd) -> bool {
    match dup2(saved, stderr_fd()) {
        Ok(_) => true,
        Err(e) => {
            debug!("Cannot restore stderr: {}", e);
            false
        }
    }
}

fn stderr_fd() -> RawFd {
    io::stderr().as_raw_fd()
}
