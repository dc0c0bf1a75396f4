//! envoy - privilege escalation front end
//!
//! Installed under the name of the privileged action to run. All arguments
//! belong to the target program; envoy parses none of them.

use envoy::config::{self, SYSTEM_CONFIG_PATH};
use envoy::SanitizedArguments;
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;

fn main() -> ExitCode {
    let args = match SanitizedArguments::from_env() {
        Ok(args) => args,
        Err(_) => return ExitCode::from(1),
    };

    envoy::logging::init_front_end();

    let config = config::load_config(Path::new(SYSTEM_CONFIG_PATH));

    match envoy::run_process(&config, args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            debug!("Dispatch failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
