use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

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

#[derive(Serialize)]
struct ReplyOutput<'a> {
    method: &'a str,
    endpoint: &'a str,
    index: usize,
    reply: &'a Value,
    timestamp: String,
}

/// Print the replies of one call. JSON output is one object per line.
pub fn print_replies(method: &str, endpoint: &str, replies: &[Value], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let timestamp = now_unix_seconds();
            for (index, reply) in replies.iter().enumerate() {
                let out = ReplyOutput {
                    method,
                    endpoint,
                    index,
                    reply,
                    timestamp: timestamp.clone(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "METHOD", "ENDPOINT", "REPLY"]);
            for (index, reply) in replies.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    method.to_string(),
                    endpoint.to_string(),
                    reply.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (index, reply) in replies.iter().enumerate() {
                println!("reply #{index} from {method} at {endpoint}:");
                println!("{}", pretty(reply));
            }
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
