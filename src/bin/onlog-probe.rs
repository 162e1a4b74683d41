use std::{process::ExitCode, time::Duration};

use clap::{CommandFactory, Parser};
use env_logger::Env;
use log::LevelFilter;

use onlog_probe::{probe::{self, ProbeEvent}, ProbeConfig};

/// Fetch the log of a device under test over WebSocket.
///
/// Connects to ws://<HOST>/ws, sends "getlog" and prints the reply.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// IP address or hostname of the DUT, optionally with a port
    host: Option<String>,

    /// Seconds to wait for connecting, sending and the reply
    #[arg(long, value_name = "SECONDS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Log the handshake and every frame
    #[arg(short, long)]
    trace: bool
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.trace);

    let config = ProbeConfig::default().with_timeout(Duration::from_secs(cli.timeout));

    match probe::run(cli.host.as_deref(), &config, print_event) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_usage_error() {
                println!("You must supply the DUT IP address on the command line.");
                println!("{}", Cli::command().render_usage());
            }
            eprintln!("error: {}: {e}", e.kind());

            ExitCode::from(e.exit_code())
        }
    }
}

fn print_event(event: ProbeEvent<'_>) {
    match event {
        ProbeEvent::Connecting(target) => println!("Connecting to {target}"),
        ProbeEvent::Sent => println!("Sent"),
        ProbeEvent::Receiving => println!("Receiving..."),
        ProbeEvent::Received(reply) => println!("Received '{reply}'")
    }
}

fn init_logging(trace: bool) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));
    if trace {
        builder.filter_module("onlog_probe", LevelFilter::Trace);
    }
    builder.init();
}
