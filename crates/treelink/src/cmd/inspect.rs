use crate::cmd::{load_tree_file, InspectArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_address_table, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let tree = load_tree_file(&args.file)?;
    print_address_table(&tree, format);
    Ok(SUCCESS)
}
