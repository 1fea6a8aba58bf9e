use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use tracing::debug;
use treelink_tree::{BlobConfig, ConfigTree, NodeDef};

use crate::exit::{io_error, tree_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod exec;
pub mod inspect;
pub mod pack;
pub mod sim;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the frame a command encodes to.
    Encode(EncodeArgs),
    /// Reassemble hex frames and print the decoded messages.
    Decode(DecodeArgs),
    /// Print the address table of a tree file.
    Inspect(InspectArgs),
    /// Build a compressed tree blob from a JSON tree description.
    Pack(PackArgs),
    /// Run a simulated instrument on a datagram socket.
    Sim(SimArgs),
    /// Fetch an instrument's tree, run commands and print the replies.
    Exec(ExecArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Pack(args) => pack::run(args, format),
        Command::Sim(args) => sim::run(args),
        Command::Exec(args) => exec::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Command text: a long name, optionally followed by a value to write.
    pub command: String,
    /// Tree to encode against (JSON or blob). Default: the bootstrap tree.
    #[arg(long, value_name = "FILE")]
    pub tree: Option<PathBuf>,
    /// Prefix the frame with this sequence number, as sent on the wire.
    #[arg(long, value_name = "N")]
    pub sequence: Option<u8>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Inbound frames in hex, in arrival order.
    #[arg(required = true, value_name = "HEX")]
    pub frames: Vec<String>,
    /// Tree to decode against (JSON or blob). Default: the bootstrap tree.
    #[arg(long, value_name = "FILE")]
    pub tree: Option<PathBuf>,
    /// Frames start with a sequence byte to strip.
    #[arg(long)]
    pub sequenced: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Tree file: a JSON tree description or a compressed blob.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// JSON tree description.
    pub tree: PathBuf,
    /// Where to write the compressed blob.
    #[arg(long, short = 'o', value_name = "BLOB")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Socket path to bind.
    #[arg(env = "TREELINK_SOCKET")]
    pub path: PathBuf,
    /// JSON tree description the instrument serves.
    #[arg(long, value_name = "FILE")]
    pub tree: PathBuf,
    /// Prefix notification frames with a sequence byte.
    #[arg(long)]
    pub notify_sequence: bool,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Instrument socket path.
    #[arg(env = "TREELINK_SOCKET")]
    pub path: PathBuf,
    /// Commands to run, in order.
    #[arg(value_name = "COMMAND")]
    pub commands: Vec<String>,
    /// Local socket path. Default: a per-process path in the temp directory.
    #[arg(long, value_name = "PATH")]
    pub local: Option<PathBuf>,
    /// Time allowed for the full tree to arrive (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// How long to collect replies after each command (e.g. 200ms).
    #[arg(long, default_value = "200ms")]
    pub settle: String,
    /// Print the address table once the tree is loaded.
    #[arg(long)]
    pub list: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Read a JSON tree description.
pub fn read_def(path: &Path) -> CliResult<NodeDef> {
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("{} is not a tree description: {err}", path.display()),
        )
    })
}

/// Load a tree from a JSON description or a compressed blob.
///
/// Files whose first non-blank byte is `{` are taken as JSON.
pub fn load_tree_file(path: &Path) -> CliResult<ConfigTree> {
    let bytes =
        fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    let is_json = bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');

    let context = format!("invalid tree {}", path.display());
    if is_json {
        let def = read_def(path)?;
        debug!(path = %path.display(), "loading JSON tree");
        ConfigTree::build(&def).map_err(|err| tree_error(&context, err))
    } else {
        debug!(path = %path.display(), size = bytes.len(), "loading tree blob");
        ConfigTree::from_blob(&bytes, &BlobConfig::default()).map_err(|err| tree_error(&context, err))
    }
}

/// The tree named by `--tree`, or the bootstrap tree.
pub fn tree_or_bootstrap(path: Option<&Path>) -> CliResult<ConfigTree> {
    match path {
        Some(path) => load_tree_file(path),
        None => Ok(ConfigTree::bootstrap()),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
