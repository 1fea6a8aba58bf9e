use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use treelink_frame::Message;
use treelink_session::{Session, SessionError};
use treelink_transport::{DatagramLink, LinkConfig, TransportError};

use crate::cmd::{parse_duration, ExecArgs};
use crate::exit::{session_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_address_table, print_messages, MessageRow, OutputFormat};

/// Read timeout on the host socket; bounds each wait for a reply.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(args: ExecArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let settle = parse_duration(&args.settle)?;
    let local = args.local.clone().unwrap_or_else(default_local_path);

    let config = LinkConfig {
        read_timeout: Some(POLL_INTERVAL),
        ..LinkConfig::default()
    };
    let mut link = DatagramLink::connect_with_config(&local, &args.path, config)
        .map_err(|err| transport_error("connect failed", err))?;
    let sink = link
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;
    let session = Session::new(sink);

    session
        .load_tree(&mut link, timeout)
        .map_err(|err| session_error("tree fetch failed", err))?;
    info!(
        addresses = session.address_table().len(),
        "instrument tree loaded"
    );

    if args.list {
        session.with_tree(|tree| print_address_table(tree, format));
    }

    for command in &args.commands {
        let sequence = session
            .execute(command)
            .map_err(|err| session_error(&format!("command {command:?} failed"), err))?;
        debug!(sequence, command = %command, "command sent");

        let messages = collect(&session, &mut link, settle)?;
        let rows: Vec<MessageRow> = session.with_tree(|tree| {
            messages
                .iter()
                .map(|message| MessageRow::new(tree, message))
                .collect()
        });
        print_messages(&rows, format);
    }

    Ok(SUCCESS)
}

/// Process inbound frames until `settle` has passed.
fn collect(
    session: &Session<DatagramLink>,
    link: &mut DatagramLink,
    settle: Duration,
) -> CliResult<Vec<Message>> {
    let deadline = Instant::now() + settle;
    let mut messages = Vec::new();
    while Instant::now() < deadline {
        match session.receive(link) {
            Ok(batch) => messages.extend(batch),
            Err(SessionError::Transport(TransportError::Io(err)))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(SessionError::Frame(err)) => warn!(%err, "dropping undecodable input"),
            Err(err) => return Err(session_error("receive failed", err)),
        }
    }
    Ok(messages)
}

fn default_local_path() -> PathBuf {
    std::env::temp_dir().join(format!("treelink-exec-{}.sock", std::process::id()))
}
