//! Helper invocation construction
//!
//! The helper's control prefix always occupies the leading slots:
//!
//! ```text
//! text:      [helper, text_flag, wrap_flag, program, args...]
//! graphical: [helper, wrap_flag, program, args...]
//! ```
//!
//! Caller arguments are opaque payload placed strictly after the program
//! name, so nothing a caller passes can be read as one of the helper's own
//! leading flags.

use crate::args::{try_copy, ProgramName, SanitizedArguments};
use crate::config::EnvoyConfig;
use crate::error::Result;
use crate::probe::InteractionMode;
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upper bound on control slots ahead of the caller's arguments
pub const MAX_CONTROL_SLOTS: usize = 4;

/// Flags the helper understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperFlags {
    pub text: OsString,
    pub wrap: OsString,
}

impl From<&EnvoyConfig> for HelperFlags {
    fn from(config: &EnvoyConfig) -> Self {
        Self {
            text: OsString::from(&config.text_flag),
            wrap: OsString::from(&config.wrap_flag),
        }
    }
}

/// Argument vector for the privileged helper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperInvocation {
    helper: PathBuf,
    argv: Vec<OsString>,
    control_len: usize,
}

impl HelperInvocation {
    /// Build the invocation for `mode`
    pub fn build(
        mode: InteractionMode,
        helper: &Path,
        flags: &HelperFlags,
        program: &ProgramName,
        caller_args: &[OsString],
    ) -> Result<Self> {
        let mut argv: Vec<OsString> = Vec::new();
        argv.try_reserve_exact(MAX_CONTROL_SLOTS + caller_args.len())?;

        argv.push(try_copy(helper.as_os_str())?);
        if mode == InteractionMode::Text {
            argv.push(try_copy(&flags.text)?);
        }
        argv.push(try_copy(&flags.wrap)?);
        argv.push(try_copy(program.as_os_str())?);

        let control_len = argv.len();
        for arg in caller_args {
            argv.push(try_copy(arg)?);
        }

        debug!("Built {} invocation: {:?}", mode, argv);

        Ok(Self {
            helper: helper.to_path_buf(),
            argv,
            control_len,
        })
    }

    /// Build from configuration and sanitized arguments
    pub fn for_arguments(
        mode: InteractionMode,
        config: &EnvoyConfig,
        args: &SanitizedArguments,
    ) -> Result<Self> {
        let program = args.program_name()?;
        Self::build(
            mode,
            &config.helper_path,
            &HelperFlags::from(config),
            &program,
            args.caller_args(),
        )
    }

    /// Executable to run
    pub fn helper(&self) -> &Path {
        &self.helper
    }

    /// Full argument vector, argv[0] included
    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    /// Helper path, mode flags and program name
    pub fn control_prefix(&self) -> &[OsString] {
        &self.argv[..self.control_len]
    }

    /// Caller arguments, in their original order
    pub fn caller_args(&self) -> &[OsString] {
        &self.argv[self.control_len..]
    }

    /// Arguments after argv[0]
    pub fn args(&self) -> &[OsString] {
        &self.argv[1..]
    }

    /// Program name slot
    pub fn program(&self) -> &OsStr {
        &self.argv[self.control_len - 1]
    }

    pub fn to_plan(&self, mode: InteractionMode) -> InvocationPlan {
        InvocationPlan {
            mode,
            helper: self.helper.to_string_lossy().into_owned(),
            argv: self
                .argv
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            control_len: self.control_len,
        }
    }
}

/// Printable form of an invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvocationPlan {
    pub mode: InteractionMode,
    pub helper: String,
    pub argv: Vec<String>,
    pub control_len: usize,
}
