use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use treelink_session::{Instrument, InstrumentConfig};
use treelink_transport::{DatagramLink, LinkConfig};

use crate::cmd::{read_def, SimArgs};
use crate::exit::{session_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

/// How often the serve loop rechecks for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: SimArgs) -> CliResult<i32> {
    let def = read_def(&args.tree)?;
    let config = InstrumentConfig {
        notify_sequence: args.notify_sequence,
        ..InstrumentConfig::default()
    };
    let mut instrument =
        Instrument::with_config(&def, config).map_err(|err| session_error("invalid tree", err))?;

    let link_config = LinkConfig {
        max_frame_size: instrument.config().max_frame,
        read_timeout: Some(POLL_INTERVAL),
        ..LinkConfig::default()
    };
    let mut link = DatagramLink::bind_with_config(&args.path, link_config)
        .map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(path = %args.path.display(), "instrument listening");
    instrument
        .serve(&mut link, &running)
        .map_err(|err| session_error("serve failed", err))?;
    info!("instrument stopped");

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
