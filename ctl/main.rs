#![forbid(unsafe_code)]

//! `netwatch-ctl`: local CLI companion for `netwatch`.
//!
//! Connects to the control channel and writes a single command. The
//! channel never replies, so success only means the command was delivered.

use std::io::Write;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "netwatch-ctl",
    about = "Local CLI for the netwatch supervisor",
    version,
    long_about = None
)]
struct Cli {
    /// Control channel name (must match the supervisor's `ipc_name`).
    #[arg(long, default_value = "LabMonitorPipe_v1")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the supervisor to stop restarting its target.
    Stop,

    /// Send arbitrary text, for checking how the channel treats it.
    Send {
        /// Raw command text (a trailing newline is added).
        text: String,
    },
}

fn main() {
    let args = Cli::parse();

    let payload = match &args.command {
        Command::Stop => "STOP".to_owned(),
        Command::Send { text } => text.clone(),
    };

    if let Err(err) = send_command(&args.ipc_name, &payload) {
        eprintln!("Failed to reach supervisor: {err}");
        eprintln!("Is netwatch running with ipc_name '{}'?", args.ipc_name);
        std::process::exit(1);
    }

    println!("sent");
}

/// Connect to the control channel and write `payload` as one line.
fn send_command(ipc_name: &str, payload: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut line = payload.to_owned();
    line.push('\n');
    stream.write_all(line.as_bytes())?;
    stream.flush()?;
    Ok(())
}
