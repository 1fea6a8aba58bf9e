use std::fs;

use tracing::info;
use treelink_tree::{checksum, ConfigTree};

use crate::cmd::{read_def, PackArgs};
use crate::exit::{io_error, tree_error, CliResult, SUCCESS};
use crate::output::{print_blob_summary, BlobSummary, OutputFormat};

pub fn run(args: PackArgs, format: OutputFormat) -> CliResult<i32> {
    let def = read_def(&args.tree)?;
    let context = format!("invalid tree {}", args.tree.display());
    let tree = ConfigTree::build(&def).map_err(|err| tree_error(&context, err))?;
    let blob = tree
        .to_blob()
        .map_err(|err| tree_error("compression failed", err))?;

    fs::write(&args.output, &blob)
        .map_err(|err| io_error(&format!("failed writing {}", args.output.display()), err))?;
    let summary = BlobSummary {
        path: args.output.display().to_string(),
        nodes: tree.len(),
        addresses: tree.address_map().len(),
        size: blob.len(),
        crc32: checksum(&blob),
    };
    info!(path = %summary.path, size = summary.size, crc32 = summary.crc32, "tree packed");
    print_blob_summary(&summary, format);
    Ok(SUCCESS)
}
