//! Supervised hand-off through real child processes
//!
//! `/bin/sh` stands in for the helper: with the wrap flag set to `-c`, the
//! program-name slot becomes the script and the caller arguments become its
//! positional parameters.

use envoy::dispatch::exit_code_of;
use envoy::invocation::{HelperFlags, HelperInvocation};
use envoy::{Dispatcher, EnvoyError, InteractionMode, ProgramName, SystemLauncher};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Command;

fn shell_invocation(script: &str, args: &[&str]) -> HelperInvocation {
    let flags = HelperFlags {
        text: "-t".into(),
        wrap: "-c".into(),
    };
    let program = ProgramName::from_path(OsStr::new(script)).unwrap();
    let args: Vec<OsString> = args.iter().map(OsString::from).collect();

    HelperInvocation::build(InteractionMode::Graphical, Path::new("/bin/sh"), &flags, &program, &args)
        .unwrap()
}

#[test]
fn test_child_exit_code_is_propagated() {
    let launcher = SystemLauncher;
    let dispatcher = Dispatcher::new(&launcher);

    for code in ["0", "1", "42", "255"] {
        let inv = shell_invocation("exit $1", &["sh", code]);
        let result = dispatcher.dispatch(InteractionMode::Graphical, &inv).unwrap();
        assert_eq!(result.to_string(), code);
    }
}

#[test]
fn test_caller_args_arrive_in_order() {
    let launcher = SystemLauncher;
    let dispatcher = Dispatcher::new(&launcher);

    let inv = shell_invocation(
        r#"[ "$1" = "-t" ] && [ "$2" = "-w" ] && [ "$3" = "two words" ]"#,
        &["sh", "-t", "-w", "two words"],
    );
    assert_eq!(dispatcher.dispatch(InteractionMode::Graphical, &inv).unwrap(), 0);
}

#[test]
fn test_signal_death_maps_to_shell_convention() {
    let launcher = SystemLauncher;
    let dispatcher = Dispatcher::new(&launcher);

    let inv = shell_invocation("kill -TERM $$", &[]);
    assert_eq!(dispatcher.dispatch(InteractionMode::Graphical, &inv).unwrap(), 143);
}

#[test]
fn test_missing_helper_is_handoff_failure() {
    let launcher = SystemLauncher;
    let dispatcher = Dispatcher::new(&launcher);

    let flags = HelperFlags {
        text: "-t".into(),
        wrap: "-w".into(),
    };
    let program = ProgramName::from_path(OsStr::new("/usr/bin/reboot")).unwrap();
    let inv = HelperInvocation::build(
        InteractionMode::Graphical,
        Path::new("/nonexistent/envoy-helper"),
        &flags,
        &program,
        &[],
    )
    .unwrap();

    let err = dispatcher.dispatch(InteractionMode::Graphical, &inv).unwrap_err();
    assert!(matches!(err, EnvoyError::Handoff { .. }));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_text_mode_failure_returns() {
    let launcher = SystemLauncher;
    let dispatcher = Dispatcher::new(&launcher);

    let flags = HelperFlags {
        text: "-t".into(),
        wrap: "-w".into(),
    };
    let program = ProgramName::from_path(OsStr::new("reboot")).unwrap();
    let inv = HelperInvocation::build(
        InteractionMode::Text,
        Path::new("/nonexistent/envoy-helper"),
        &flags,
        &program,
        &[],
    )
    .unwrap();

    let err = dispatcher.dispatch(InteractionMode::Text, &inv).unwrap_err();
    assert!(err.is_handoff());
}

#[test]
fn test_exit_code_matches_shell() {
    let status = Command::new("/bin/sh").args(["-c", "exit 7"]).status().unwrap();
    assert_eq!(exit_code_of(status), 7);
}
