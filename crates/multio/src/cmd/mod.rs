use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod demo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept one connection and print what arrives on each stream.
    Listen(ListenArgs),
    /// Connect and write a payload to one stream.
    Send(SendArgs),
    /// Run the in-process pipe and read-writer demos.
    Demo(DemoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Demo(args) => demo::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Streams to read (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pub streams: Vec<u32>,
    /// Exit after printing N chunks.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Stream to write to.
    #[arg(long, short = 's', default_value = "0")]
    pub stream: u32,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file. Without --data or --file, stdin is sent.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Give up if the peer has not taken the payload in time (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct DemoArgs {
    /// Run only the one-way two-stream demo.
    #[arg(long, conflicts_with = "read_writer")]
    pub simple_pipe: bool,
    /// Run only the echo demo over one combined stream.
    #[arg(long, conflicts_with = "simple_pipe")]
    pub read_writer: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
