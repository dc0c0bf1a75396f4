//! Display capability probe
//!
//! Decides once per run whether the helper should interact through a
//! graphical surface or through the terminal.

use crate::config::EnvoyConfig;
use crate::display::SurfaceToolkit;
use crate::guard::{EnvSnapshot, SessionEnv, StderrGuard, Terminal};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use tracing::{debug, info};

/// How the helper interacts with the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Helper wrapped with a graphical interaction surface
    Graphical,
    /// Helper uses its text interface
    Text,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::Graphical => "graphical",
            InteractionMode::Text => "text",
        }
    }
}

impl std::fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe settings taken from [`EnvoyConfig`]
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub graphical_support: bool,
    pub display_vars: Vec<String>,
    pub startup_id_var: Option<String>,
    pub silence: bool,
}

impl From<&EnvoyConfig> for ProbeSettings {
    fn from(config: &EnvoyConfig) -> Self {
        Self {
            graphical_support: config.graphical_support(),
            display_vars: config.display_vars.clone(),
            startup_id_var: config.startup_id_var.clone(),
            silence: config.silence_probe,
        }
    }
}

/// Inputs of the pre-check, kept for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub mode: InteractionMode,
    pub graphical_support: bool,
    /// First display variable found set and non-empty
    pub display_var: Option<String>,
    pub stdin_is_terminal: bool,
    /// Whether the trial initialization ran at all
    pub attempted: bool,
}

/// Capability probe over an environment, a terminal, and a toolkit
pub struct DisplayProbe<'a, E: SessionEnv, T: Terminal, K: SurfaceToolkit> {
    settings: ProbeSettings,
    env: &'a mut E,
    terminal: &'a T,
    toolkit: &'a mut K,
}

impl<'a, E: SessionEnv, T: Terminal, K: SurfaceToolkit> DisplayProbe<'a, E, T, K> {
    pub fn new(
        settings: ProbeSettings,
        env: &'a mut E,
        terminal: &'a T,
        toolkit: &'a mut K,
    ) -> Self {
        Self {
            settings,
            env,
            terminal,
            toolkit,
        }
    }

    /// Resolve the interaction mode
    pub fn resolve(self, argv0: &OsStr) -> InteractionMode {
        self.run(argv0).mode
    }

    /// Resolve the interaction mode and report how it was reached
    pub fn run(self, argv0: &OsStr) -> ProbeReport {
        let mut report = ProbeReport {
            mode: InteractionMode::Text,
            graphical_support: self.settings.graphical_support,
            display_var: None,
            stdin_is_terminal: self.terminal.stdin_is_terminal(),
            attempted: false,
        };

        if !self.settings.graphical_support {
            debug!("Graphical support disabled, using text mode");
            return report;
        }

        report.display_var = self
            .settings
            .display_vars
            .iter()
            .find(|key| self.env.non_empty(key).is_some())
            .cloned();

        // A configured display, or input that is not a terminal, makes a
        // window worth trying. Otherwise text is the only option.
        if report.display_var.is_none() && report.stdin_is_terminal {
            debug!("No display and stdin is a terminal, using text mode");
            return report;
        }

        report.attempted = true;
        if self.trial(argv0) {
            report.mode = InteractionMode::Graphical;
        }

        info!("Interaction mode: {}", report.mode);
        report
    }

    fn trial(self, argv0: &OsStr) -> bool {
        let mut preserved: Vec<&str> = self.settings.display_vars.iter().map(String::as_str).collect();
        if let Some(startup_id) = &self.settings.startup_id_var {
            preserved.push(startup_id);
        }

        let mut env = EnvSnapshot::take(self.env, &preserved);
        let quiet = if self.settings.silence {
            StderrGuard::silence()
        } else {
            StderrGuard::inactive()
        };

        let available = self.toolkit.init_check(&[argv0], &mut *env);

        // Stderr first, then the environment.
        drop(quiet);
        drop(env);

        debug!("Trial initialization {}", if available { "succeeded" } else { "failed" });
        available
    }
}
