//! envoyctl - inspect how envoy would dispatch

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;

use envoy::config::{self, EnvoyConfig, SYSTEM_CONFIG_PATH};
use envoy::probe::{DisplayProbe, InteractionMode, ProbeSettings};
use envoy::{HelperInvocation, ProcessEnv, ProcessTerminal, SanitizedArguments, SocketToolkit};

#[derive(Parser)]
#[command(name = "envoyctl", version)]
#[command(about = "Inspect envoy dispatch decisions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration overlay
    #[arg(long, default_value = SYSTEM_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging (also: ENVOY_DEBUG env var)
    #[arg(short, long, env = "ENVOY_DEBUG")]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the display capability probe
    Probe {
        /// Let toolkit diagnostics through to stderr
        #[arg(long)]
        verbose: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the helper invocation for an argument vector (never executes)
    Plan {
        /// Interaction mode; probes when omitted
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Invoked name followed by the target's arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<OsString>,
    },

    /// Show the effective configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Text,
    Graphical,
}

impl From<ModeArg> for InteractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Text => InteractionMode::Text,
            ModeArg::Graphical => InteractionMode::Graphical,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "warn" };
    envoy::logging::init(log_level);

    let config = config::load_config(&cli.config);

    match cli.command {
        Commands::Probe { verbose, json } => {
            let mut settings = ProbeSettings::from(&config);
            settings.silence = !verbose;

            let report = probe(&config, settings, "envoyctl".into());

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{:<20} {}", "MODE", report.mode);
                println!("{:<20} {}", "GRAPHICAL SUPPORT", yes_no(report.graphical_support));
                println!("{:<20} {}", "DISPLAY VARIABLE", report.display_var.as_deref().unwrap_or("-"));
                println!("{:<20} {}", "STDIN IS TTY", yes_no(report.stdin_is_terminal));
                println!("{:<20} {}", "TRIAL ATTEMPTED", yes_no(report.attempted));
            }
        }

        Commands::Plan { mode, json, argv } => {
            let args = SanitizedArguments::from_raw(&argv)?;
            let mode = match mode {
                Some(mode) => mode.into(),
                None => {
                    let argv0 = args.invoked_as().map(|a| a.to_os_string()).unwrap_or_default();
                    probe(&config, ProbeSettings::from(&config), argv0).mode
                }
            };

            let invocation = HelperInvocation::for_arguments(mode, &config, &args)
                .context("Failed to build helper invocation")?;
            let plan = invocation.to_plan(mode);

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("mode: {}", plan.mode);
                for (i, arg) in plan.argv.iter().enumerate() {
                    let role = if i < plan.control_len { "control" } else { "caller" };
                    println!("  [{:>2}] {:<8} {}", i, role, arg);
                }
            }
        }

        Commands::Config { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", serde_yaml::to_string(&config)?);
            }
            if let Err(e) = config.validate() {
                eprintln!("warning: {}", e);
            }
        }
    }

    Ok(())
}

fn probe(config: &EnvoyConfig, settings: ProbeSettings, argv0: OsString) -> envoy::probe::ProbeReport {
    let mut env = ProcessEnv;
    let mut toolkit = SocketToolkit::from_config(config);

    DisplayProbe::new(settings, &mut env, &ProcessTerminal, &mut toolkit).run(&argv0)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
