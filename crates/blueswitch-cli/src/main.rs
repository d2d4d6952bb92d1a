//! `blueswitch` — command-line control for BS-21 Bluetooth power outlets
//!
//! Resolves the target device from an address or alias, runs the given
//! command queue over one connection, and renders the resulting state
//! snapshot as text or JSON.

mod alias;
mod queue;
mod render;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use blueswitch_core::protocol::{Command, QueueExecutor, SessionConfig};

#[derive(Parser, Debug)]
#[command(
    name = "blueswitch",
    version,
    about = "Control a BS-21 Bluetooth power outlet",
    after_help = queue::COMMAND_HELP
)]
struct Args {
    /// Device address (e.g. 5C:B6:CC:00:1A:AE) or an alias prefix from
    /// ~/.known_bs21
    target: String,

    /// 4-digit PIN; overrides the alias table entry
    #[arg(long)]
    pin: Option<String>,

    /// RFCOMM tty to use instead of the first /dev/rfcomm*
    #[arg(long)]
    port: Option<String>,

    /// Reply timeout in seconds
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// Log every frame sent and received
    #[arg(long)]
    debug: bool,

    /// Print the full device state as JSON after the queue finishes
    #[arg(long)]
    json: bool,

    /// Command queue, e.g. `-on -sleep 5 -off`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    commands: Vec<String>,
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "blueswitch=debug,blueswitch_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let mut parsed = queue::parse_tokens(&args.commands)?;
    parsed.json |= args.json;
    if parsed.json && parsed.commands.is_empty() {
        // Bare --json still needs something to query
        parsed.commands.push(Command::QueryStatus);
        parsed.commands.push(Command::QueryTimers);
    }
    if parsed.commands.is_empty() {
        bail!("no commands given; see --help for the command list");
    }

    let entries = alias::load(None).context("loading the alias table")?;
    let handle = alias::resolve(&args.target, args.pin.as_deref(), &entries)?;

    let config = SessionConfig {
        port: args.port.clone(),
        reply_timeout_ms: args.timeout.saturating_mul(1000),
        ..SessionConfig::default()
    };
    let total = parsed.commands.len();
    let mut executor = QueueExecutor::new(handle, config);
    let outcome = executor.run(&parsed.commands);

    match outcome {
        Ok(summary) => {
            tracing::debug!(completed = summary.completed, "queue finished");
            if parsed.show_status {
                println!("{}", render::status_report(executor.model()));
            }
            if parsed.show_timers {
                println!("{}", render::timer_report(executor.model()));
            }
            if parsed.json {
                println!("{}", serde_json::to_string_pretty(executor.model())?);
            }
            Ok(())
        }
        Err(error) => {
            let completed = error.completed;
            Err(error).with_context(|| {
                format!("{completed} of {total} commands completed; the rest did not run")
            })
        }
    }
}
