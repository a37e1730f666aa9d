use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    event: &'a str,
    stream: u32,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    timestamp: String,
}

/// Print bytes read from `stream`.
pub fn print_chunk(out: &mut impl Write, stream: u32, data: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(
            out,
            &ChunkOutput {
                event: "data",
                stream,
                size: data.len(),
                payload: Some(payload_preview(data)),
                timestamp: now_unix_seconds(),
            },
        ),
        OutputFormat::Pretty => {
            let _ = writeln!(
                out,
                "stream={stream} size={} payload={}",
                data.len(),
                payload_preview(data)
            );
        }
        OutputFormat::Raw => print_raw(out, data),
    }
}

/// Report that `stream` reached end of stream. Raw output prints nothing.
pub fn print_closed(out: &mut impl Write, stream: u32, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(
            out,
            &ChunkOutput {
                event: "closed",
                stream,
                size: 0,
                payload: None,
                timestamp: now_unix_seconds(),
            },
        ),
        OutputFormat::Pretty => {
            let _ = writeln!(out, "stream={stream} closed");
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(out: &mut impl Write, data: &[u8]) {
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json(out: &mut impl Write, value: &ChunkOutput<'_>) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let _ = writeln!(out, "{line}");
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
