//! member-forward: activate and inspect member forwards on the demo model
//!
//! ## Example Usage
//!
//! ```bash
//! # Activate every forward, call the stubs and print the results
//! member-forward demo
//!
//! # Same, as JSON, with options from a config file
//! member-forward demo --json --config forward.json
//!
//! # List registry keys, targets and generated routines
//! member-forward inspect -v
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use forward_core::ForwardConfig;
use member_forward::output::{
    format_calls, format_declarations, format_report, DemoOutput, InspectOutput,
};
use member_forward::{DemoSession, DEFAULT_GROUP};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "member-forward",
    author,
    version,
    about = "Bind static stubs to hidden members through generated dispatch routines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with forwarding options (MEMBER_FORWARD_* variables override it)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Activate the demo forwards and call the stubs
    Demo(GroupArgs),

    /// List forward declarations with their keys and resolved targets
    Inspect(GroupArgs),
}

#[derive(Args)]
struct GroupArgs {
    /// Patch group id to activate under
    #[arg(long, default_value = DEFAULT_GROUP)]
    group: String,
}

fn main() -> Result<()> {
    let Cli {
        command,
        config,
        json,
        verbose,
        quiet,
    } = Cli::parse();
    setup_logging(verbose, quiet);

    let config = load_config(config.as_deref())?;
    debug!(?config, "forward config");
    let session = DemoSession::new(config)?;

    match command {
        Commands::Demo(args) => {
            let report = session.activate(&args.group)?;
            let calls = session.run_calls()?;
            if json {
                let out = DemoOutput {
                    report: &report,
                    calls: &calls,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print!("{}", format_report(&report));
                print!("{}", format_calls(&calls));
            }
        }
        Commands::Inspect(args) => {
            session.activate(&args.group)?;
            let declarations = session.declarations();
            if json {
                let out = InspectOutput {
                    group: &args.group,
                    declarations: &declarations,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print!("{}", format_declarations(&declarations, verbose > 0));
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ForwardConfig> {
    let config = match path {
        Some(path) => ForwardConfig::from_json_file(path)?,
        None => ForwardConfig::default(),
    };
    Ok(config.overlay_env())
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
