//! # Envoy
//!
//! Privilege escalation front end for DaemonOS.
//!
//! Envoy is installed under the name of a privileged action (usually as a
//! symlink). It never authenticates anyone and never runs the target itself.
//! It decides whether the user can be reached through a graphical surface,
//! builds an argument vector for the privileged helper, and hands off:
//!
//! ```text
//! argv ─► SanitizedArguments ─► [fallback builds] ─► ProgramName
//!                                                        │
//!            Dispatcher ◄─ HelperInvocation ◄─ DisplayProbe
//! ```
//!
//! - **Text mode** replaces this process with the helper.
//! - **Graphical mode** runs the helper as a supervised child and exits with
//!   its status.

pub mod args;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod guard;
pub mod invocation;
pub mod logging;
pub mod probe;

pub use args::{ProgramName, SanitizedArguments};
pub use config::EnvoyConfig;
pub use dispatch::{Dispatcher, Launcher, SystemLauncher};
pub use display::{SocketToolkit, SurfaceToolkit};
pub use error::{EnvoyError, Result};
pub use guard::{ProcessEnv, ProcessTerminal, SessionEnv, Terminal};
pub use invocation::{HelperFlags, HelperInvocation};
pub use probe::{DisplayProbe, InteractionMode, ProbeSettings};

use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::debug;

/// Collaborators for one dispatcher run
pub struct Envoy<'a, E: SessionEnv, T: Terminal, K: SurfaceToolkit, L: Launcher> {
    pub config: &'a EnvoyConfig,
    pub env: &'a mut E,
    pub terminal: &'a T,
    pub toolkit: &'a mut K,
    pub launcher: &'a L,
    /// Running executable, used to avoid re-executing ourselves
    pub current_exe: Option<PathBuf>,
}

impl<E: SessionEnv, T: Terminal, K: SurfaceToolkit, L: Launcher> Envoy<'_, E, T, K, L> {
    /// Run the whole dispatch sequence
    ///
    /// Returns the exit code to report: the supervised helper's status in
    /// graphical mode. In text mode this only returns if the helper could not
    /// be executed.
    pub fn run(self, args: SanitizedArguments) -> Result<u8> {
        let dispatcher = Dispatcher::new(self.launcher);

        if !self.config.graphical_support() {
            dispatcher.try_fallbacks(&self.config.fallbacks, &args, self.current_exe.as_deref());
            debug!("No fallback build available, continuing in text mode");
        }

        let program = args.program_name()?;
        debug!("Invoked as {}", program);

        let argv0 = args.invoked_as().unwrap_or(OsStr::new(""));
        let mode = DisplayProbe::new(
            ProbeSettings::from(self.config),
            self.env,
            self.terminal,
            self.toolkit,
        )
        .resolve(argv0);

        let invocation = HelperInvocation::build(
            mode,
            &self.config.helper_path,
            &HelperFlags::from(self.config),
            &program,
            args.caller_args(),
        )?;

        dispatcher.dispatch(mode, &invocation)
    }
}

/// Run against the real process: environment, stdin, display and `exec`
pub fn run_process(config: &EnvoyConfig, args: SanitizedArguments) -> Result<u8> {
    config.validate()?;

    let mut env = ProcessEnv;
    let mut toolkit = SocketToolkit::from_config(config);

    Envoy {
        config,
        env: &mut env,
        terminal: &ProcessTerminal,
        toolkit: &mut toolkit,
        launcher: &SystemLauncher,
        current_exe: std::env::current_exe().ok(),
    }
    .run(args)
}
