use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use verbmux_peer::Response;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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
struct ResponseOutput<'a> {
    verb: &'a str,
    status: u16,
    // Sorted so output is stable across runs.
    header: BTreeMap<&'a str, &'a str>,
    payload_size: usize,
    payload: String,
    client_id: &'a str,
    timestamp: String,
}

pub fn print_response(resp: &Response, client_id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                verb: &resp.verb,
                status: resp.status,
                header: resp
                    .header
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect(),
                payload_size: resp.payload.len(),
                payload: payload_preview(&resp.payload),
                client_id,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["VERB", "STATUS", "SIZE", "CLIENT", "PAYLOAD"])
                .add_row(vec![
                    resp.verb.clone(),
                    resp.status.to_string(),
                    resp.payload.len().to_string(),
                    client_id.to_string(),
                    payload_preview(&resp.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "verb={} status={} size={} client={} payload={}",
                resp.verb,
                resp.status,
                resp.payload.len(),
                client_id,
                payload_preview(&resp.payload).trim_end()
            );
        }
        OutputFormat::Raw => {
            print_raw(&resp.payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
