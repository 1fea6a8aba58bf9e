use treelink_frame::{encode_command, DEFAULT_MAX_PAYLOAD};

use crate::cmd::{tree_or_bootstrap, EncodeArgs};
use crate::exit::{command_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let tree = tree_or_bootstrap(args.tree.as_deref())?;
    let payload = encode_command(&tree, &args.command, DEFAULT_MAX_PAYLOAD)
        .map_err(|err| command_error("encode failed", err))?;

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend(args.sequence);
    frame.extend_from_slice(&payload);
    print_frame(args.command.trim(), args.sequence, &frame, format);
    Ok(SUCCESS)
}
