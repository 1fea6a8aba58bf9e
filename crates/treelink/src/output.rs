use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use treelink_frame::Message;
use treelink_tree::{AddressEntry, ConfigTree, NodeType, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A decoded message, resolved against the tree it arrived on.
#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub address: u8,
    pub name: String,
    #[serde(rename = "type")]
    pub ntype: NodeType,
    pub value: String,
}

impl MessageRow {
    pub fn new(tree: &ConfigTree, message: &Message) -> Self {
        let name = match tree.node_at_address(message.address) {
            Some(id) => tree.long_name(id).to_string(),
            None => format!("#{}", message.address),
        };
        Self {
            address: message.address,
            name,
            ntype: message.value.node_type(),
            value: render_value(&message.value),
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    command: &'a str,
    sequence: Option<u8>,
    size: usize,
    frame: String,
}

pub fn print_frame(command: &str, sequence: Option<u8>, frame: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                command,
                sequence,
                size: frame.len(),
                frame: hex::encode(frame),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "SEQ", "SIZE", "FRAME"]);
            table.add_row(vec![
                command.to_string(),
                sequence.map(|s| s.to_string()).unwrap_or_default(),
                frame.len().to_string(),
                spaced_hex(frame),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{command} => {}", spaced_hex(frame));
        }
    }
}

pub fn print_messages(rows: &[MessageRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json(row);
            }
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                return;
            }
            let mut table = new_table(vec!["ADDR", "NAME", "TYPE", "VALUE"]);
            for row in rows {
                table.add_row(vec![
                    row.address.to_string(),
                    row.name.clone(),
                    row.ntype.to_string(),
                    row.value.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!("{} = {}", row.name, row.value);
            }
        }
    }
}

#[derive(Serialize)]
struct TreeOutput<'a> {
    nodes: usize,
    addresses: &'a [AddressEntry],
}

pub fn print_address_table(tree: &ConfigTree, format: OutputFormat) {
    let entries = tree.address_table();
    match format {
        OutputFormat::Json => {
            let out = TreeOutput {
                nodes: tree.len(),
                addresses: &entries,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["ADDR", "NAME", "TYPE"]);
            for entry in &entries {
                table.add_row(vec![
                    entry.address.to_string(),
                    entry.long_name.clone(),
                    entry.ntype.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            print!("{}", tree.enumerate(tree.root()));
        }
    }
}

#[derive(Serialize)]
pub struct BlobSummary {
    pub path: String,
    pub nodes: usize,
    pub addresses: usize,
    pub size: usize,
    pub crc32: u32,
}

pub fn print_blob_summary(summary: &BlobSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PATH", "NODES", "ADDRESSES", "SIZE", "CRC32"]);
            table.add_row(vec![
                summary.path.clone(),
                summary.nodes.to_string(),
                summary.addresses.to_string(),
                summary.size.to_string(),
                format!("{:#010x}", summary.crc32),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "wrote {} ({} bytes, crc32={:#010x}, {} nodes, {} addresses)",
                summary.path, summary.size, summary.crc32, summary.nodes, summary.addresses
            );
        }
    }
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::Bin(bytes) => hex::encode(bytes),
        other => other.to_string(),
    }
}

fn spaced_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
