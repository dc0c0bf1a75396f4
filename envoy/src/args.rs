//! Argument sanitizing and program name resolution
//!
//! The raw argument vector is read exactly once into an owned, independently
//! allocated copy. Nothing downstream ever looks at the process's own argv
//! again.

use crate::error::{EnvoyError, Result};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use tracing::debug;

/// Owned copy of the invoking argument vector
///
/// Index 0 is the invoking path, the rest are the caller's arguments for the
/// target program. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedArguments {
    argv: Box<[OsString]>,
}

impl SanitizedArguments {
    /// Copy a raw argument list into owned storage
    ///
    /// Allocation failure is reported as [`EnvoyError::ResourceExhaustion`]
    /// instead of aborting.
    pub fn from_raw<I, S>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let raw = raw.into_iter();
        let mut argv: Vec<OsString> = Vec::new();
        argv.try_reserve_exact(raw.size_hint().0)?;

        for arg in raw {
            let owned = try_copy(arg.as_ref())?;
            argv.try_reserve(1)?;
            argv.push(owned);
        }

        debug!("Sanitized {} arguments", argv.len());

        Ok(Self {
            argv: argv.into_boxed_slice(),
        })
    }

    /// Read the current process's arguments
    pub fn from_env() -> Result<Self> {
        Self::from_raw(std::env::args_os())
    }

    /// The invoking path (argv[0]), if any
    pub fn invoked_as(&self) -> Option<&OsStr> {
        self.argv.first().map(OsString::as_os_str)
    }

    /// Caller-supplied arguments (argv[1..])
    pub fn caller_args(&self) -> &[OsString] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// The whole vector, argv[0] included
    pub fn as_slice(&self) -> &[OsString] {
        &self.argv
    }

    pub fn len(&self) -> usize {
        self.argv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Resolve the program name from argv[0]
    pub fn program_name(&self) -> Result<ProgramName> {
        let invoked = self.invoked_as().ok_or(EnvoyError::MissingProgramName)?;
        ProgramName::from_path(invoked)
    }
}

/// Final path segment of the invoking path
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramName(OsString);

impl ProgramName {
    /// Take everything after the last `/`, or the whole string if there is none
    pub fn from_path(path: &OsStr) -> Result<Self> {
        let bytes = path.as_bytes();
        let name = match bytes.iter().rposition(|&b| b == b'/') {
            Some(idx) => &bytes[idx + 1..],
            None => bytes,
        };

        if name.is_empty() {
            return Err(EnvoyError::MissingProgramName);
        }

        Ok(Self(try_copy(OsStr::from_bytes(name))?))
    }

    pub fn as_os_str(&self) -> &OsStr {
        &self.0
    }
}

impl AsRef<OsStr> for ProgramName {
    fn as_ref(&self) -> &OsStr {
        &self.0
    }
}

impl std::fmt::Display for ProgramName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

/// Owned copy of `arg`, reporting allocation failure instead of aborting
pub(crate) fn try_copy(arg: &OsStr) -> Result<OsString> {
    let mut owned = OsString::new();
    owned.try_reserve_exact(arg.len())?;
    owned.push(arg);
    Ok(owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn name(path: &str) -> Result<ProgramName> {
        ProgramName::from_path(OsStr::new(path))
    }

    #[test]
    fn test_basename() {
        assert_eq!(name("/usr/bin/reboot").unwrap().as_os_str(), "reboot");
        assert_eq!(name("reboot").unwrap().as_os_str(), "reboot");
        assert_eq!(name("./sbin/halt").unwrap().as_os_str(), "halt");
        assert_eq!(name("/x").unwrap().as_os_str(), "x");
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(matches!(name(""), Err(EnvoyError::MissingProgramName)));
        assert!(matches!(name("/usr/bin/"), Err(EnvoyError::MissingProgramName)));
        assert!(matches!(name("/"), Err(EnvoyError::MissingProgramName)));
    }

    #[test]
    fn test_non_utf8_name() {
        let raw = OsStr::from_bytes(b"/usr/bin/\xffname");
        let program = ProgramName::from_path(raw).unwrap();
        assert_eq!(program.as_os_str().as_bytes(), b"\xffname");
    }

    #[test]
    fn test_try_copy_is_exact() {
        let raw = OsStr::from_bytes(b"--opt=\xfe\x00tail");
        let copy = try_copy(raw).unwrap();
        assert_eq!(copy.as_bytes(), raw.as_bytes());
        assert!(try_copy(OsStr::new("")).unwrap().is_empty());
    }

    #[test]
    fn test_empty_argv() {
        let args = SanitizedArguments::from_raw(Vec::<OsString>::new()).unwrap();
        assert!(args.is_empty());
        assert!(args.caller_args().is_empty());
        assert!(matches!(args.program_name(), Err(EnvoyError::MissingProgramName)));
    }

    #[test]
    fn test_caller_args() {
        let args = SanitizedArguments::from_raw(["/usr/bin/anything", "foo", "bar"]).unwrap();
        assert_eq!(args.invoked_as().unwrap(), "/usr/bin/anything");
        assert_eq!(args.caller_args(), &[OsString::from("foo"), OsString::from("bar")]);
        assert_eq!(args.program_name().unwrap().as_os_str(), "anything");
    }

    #[test]
    fn test_copy_is_independent() {
        let mut raw = vec![OsString::from("/bin/tool"), OsString::from("--flag")];
        let args = SanitizedArguments::from_raw(&raw).unwrap();

        raw[1].push("-mutated");
        raw.clear();
        drop(raw);

        assert_eq!(args.as_slice(), &[OsString::from("/bin/tool"), OsString::from("--flag")]);
    }

    proptest! {
        #[test]
        fn prop_copy_matches_input(raw in proptest::collection::vec(".*", 0..16)) {
            let args = SanitizedArguments::from_raw(&raw).unwrap();
            prop_assert_eq!(args.len(), raw.len());
            for (copied, original) in args.as_slice().iter().zip(&raw) {
                prop_assert_eq!(copied.to_str(), Some(original.as_str()));
            }
        }

        #[test]
        fn prop_basename_after_last_slash(dir in "[a-z/]{0,12}", base in "[a-zA-Z0-9._-]{1,12}") {
            let path = format!("{}/{}", dir, base);
            let program = name(&path).unwrap();
            prop_assert_eq!(program.as_os_str().to_str(), Some(base.as_str()));
        }

        #[test]
        fn prop_no_slash_is_whole_name(base in "[^/]{1,24}") {
            let program = name(&base).unwrap();
            prop_assert_eq!(program.as_os_str().to_str(), Some(base.as_str()));
        }
    }
}
