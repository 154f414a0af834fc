use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::demo::{DemoOutcome, MethodName};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Serialize)]
struct ListeningOutput {
    listening: String,
    threads: usize,
}

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'static str,
    peer: Option<String>,
    result: &'a DemoOutcome,
    elapsed_ms: u128,
}

/// Announce the bound address. Always a single line so scripts can read it.
pub fn print_listening(addr: SocketAddr, threads: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            listening: addr.to_string(),
            threads,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("listening on {addr} ({threads} worker thread(s)); Ctrl-C to stop");
        }
    }
}

pub fn print_call(
    method: MethodName,
    peer: Option<SocketAddr>,
    result: &DemoOutcome,
    elapsed: Duration,
    format: OutputFormat,
) {
    let peer_label = peer.map_or_else(|| "-".to_string(), |addr| addr.to_string());
    match format {
        OutputFormat::Json => print_json(&CallOutput {
            method: method.as_str(),
            peer: peer.map(|addr| addr.to_string()),
            result,
            elapsed_ms: elapsed.as_millis(),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "PEER", "RESULT", "ELAPSED"])
                .add_row(vec![
                    method.as_str().to_string(),
                    peer_label,
                    result.to_string(),
                    format!("{} ms", elapsed.as_millis()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} -> {} ({} ms, {})",
                method.as_str(),
                result,
                elapsed.as_millis(),
                peer_label
            );
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
