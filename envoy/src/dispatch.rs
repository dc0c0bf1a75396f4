//! Hand-off to the privileged helper
//!
//! Process replacement is a control transfer, not a call. [`Launcher::replace`]
//! returns `Result<Infallible, _>`: the only value it can ever hand back is
//! the failure.

use crate::args::SanitizedArguments;
use crate::error::{EnvoyError, Result};
use crate::invocation::HelperInvocation;
use crate::probe::InteractionMode;
use std::convert::Infallible;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info, warn};

/// Process control used by the dispatcher
pub trait Launcher {
    /// Replace the current process image. Returns only on failure.
    fn replace(&self, program: &Path, argv: &[OsString]) -> io::Result<Infallible>;

    /// Run `program` as a supervised child and wait for it
    fn supervise(&self, program: &Path, argv: &[OsString]) -> io::Result<ExitStatus>;
}

/// The real `execv`/`fork` based launcher
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(program: &Path, argv: &[OsString]) -> Command {
        let mut cmd = Command::new(program);
        if let Some((argv0, rest)) = argv.split_first() {
            cmd.arg0(argv0);
            cmd.args(rest);
        }
        cmd
    }
}

impl Launcher for SystemLauncher {
    fn replace(&self, program: &Path, argv: &[OsString]) -> io::Result<Infallible> {
        Err(Self::command(program, argv).exec())
    }

    fn supervise(&self, program: &Path, argv: &[OsString]) -> io::Result<ExitStatus> {
        Self::command(program, argv).status()
    }
}

/// Map a child's status to our own exit code
///
/// Signal deaths use the shell convention `128 + signo`.
pub fn exit_code_of(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return (code & 0xff) as u8;
    }

    match status.signal() {
        Some(signo) => 128u8.wrapping_add(signo as u8),
        None => 1,
    }
}

/// Executes a built invocation
pub struct Dispatcher<'a, L: Launcher> {
    launcher: &'a L,
}

impl<'a, L: Launcher> Dispatcher<'a, L> {
    pub fn new(launcher: &'a L) -> Self {
        Self { launcher }
    }

    /// Hand off to the helper
    ///
    /// Text mode replaces this process and only returns on failure. Graphical
    /// mode supervises the helper and returns its exit code.
    pub fn dispatch(&self, mode: InteractionMode, invocation: &HelperInvocation) -> Result<u8> {
        match mode {
            InteractionMode::Text => {
                info!("Replacing process with {}", invocation.helper().display());
                match self.launcher.replace(invocation.helper(), invocation.argv()) {
                    Ok(never) => match never {},
                    Err(e) => {
                        warn!("exec {} failed: {}", invocation.helper().display(), e);
                        Err(EnvoyError::handoff(invocation.helper(), e))
                    }
                }
            }
            InteractionMode::Graphical => {
                info!("Supervising {}", invocation.helper().display());
                let status = self
                    .launcher
                    .supervise(invocation.helper(), invocation.argv())
                    .map_err(|e| EnvoyError::handoff(invocation.helper(), e))?;

                let code = exit_code_of(status);
                debug!("Helper exited with {}", code);
                Ok(code)
            }
        }
    }

    /// Try each sibling build in turn with the unchanged arguments
    ///
    /// Returns only if none of them could be executed. A sibling that is the
    /// running executable is skipped.
    pub fn try_fallbacks(&self, fallbacks: &[PathBuf], args: &SanitizedArguments, current_exe: Option<&Path>) {
        for sibling in fallbacks {
            if is_same_file(sibling, current_exe) {
                debug!("Skipping fallback {}: it is this executable", sibling.display());
                continue;
            }

            debug!("Trying fallback {}", sibling.display());
            match self.launcher.replace(sibling, args.as_slice()) {
                Ok(never) => match never {},
                Err(e) => debug!("exec {} failed: {}", sibling.display(), e),
            }
        }
    }
}

fn is_same_file(candidate: &Path, current_exe: Option<&Path>) -> bool {
    let Some(current) = current_exe else {
        return false;
    };

    match (candidate.canonicalize(), current.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => candidate == current,
    }
}
