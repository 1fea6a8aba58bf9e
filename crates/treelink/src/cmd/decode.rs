use tracing::warn;
use treelink_frame::{Reassembler, ReassemblerConfig};

use crate::cmd::{tree_or_bootstrap, DecodeArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_messages, MessageRow, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut tree = tree_or_bootstrap(args.tree.as_deref())?;
    let frames = args
        .frames
        .iter()
        .map(|text| parse_hex(text))
        .collect::<CliResult<Vec<_>>>()?;

    let mut reassembler = Reassembler::with_config(ReassemblerConfig {
        inbound_sequence: args.sequenced,
    });
    let mut rows = Vec::new();
    let mut failed = false;

    for frame in &frames {
        reassembler.push_frame(frame);
        loop {
            match reassembler.next_message(tree.address_map()) {
                Ok(Some(message)) => {
                    tree.notify(message.node, message.value.clone(), None);
                    rows.push(MessageRow::new(&tree, &message));
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "dropping undecodable input");
                    reassembler.clear();
                    failed = true;
                    break;
                }
            }
        }
    }

    print_messages(&rows, format);
    if !reassembler.buffered().is_empty() {
        warn!(
            buffered = reassembler.buffered().len(),
            "input ends inside a message"
        );
        failed = true;
    }
    Ok(if failed { DATA_INVALID } else { SUCCESS })
}

/// Parse a hex frame, ignoring whitespace and `:` separators.
fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    hex::decode(digits).map_err(|err| CliError::new(USAGE, format!("invalid hex frame {text:?}: {err}")))
}
