use std::fs;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use multio_mux::Multiplexer;
use multio_transport::UnixDomainSocket;
use tracing::{info, warn};

use crate::cmd::SendArgs;
use crate::exit::{io_error, mux_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let payload = resolve_payload(&args)?;

    let conn = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mux = Arc::new(
        Multiplexer::from_stream(conn).map_err(|err| mux_error("session setup failed", err))?,
    );

    let timed_out = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = channel::bounded::<()>(0);
    if let Some(timeout) = timeout {
        let mux = Arc::clone(&mux);
        let timed_out = Arc::clone(&timed_out);
        thread::Builder::new()
            .name("send-timeout".to_string())
            .spawn(move || {
                if done_rx.recv_timeout(timeout) == Err(RecvTimeoutError::Timeout) {
                    warn!(?timeout, "peer did not take the payload in time");
                    timed_out.store(true, Ordering::SeqCst);
                    let _ = mux.close();
                }
            })
            .map_err(|err| io_error("failed to start timer", err))?;
    }

    let mut writer = mux.writer(args.stream);
    let sent = writer
        .write_all(&payload)
        .and_then(|()| writer.close().map_err(io::Error::from));
    drop(done_tx);

    if let Err(err) = sent {
        let _ = mux.close();
        if timed_out.load(Ordering::SeqCst) {
            return Err(CliError::new(TIMEOUT, "send timed out"));
        }
        return Err(io_error("send failed", err));
    }

    mux.close()
        .map_err(|err| mux_error("closing session failed", err))?;
    info!(stream = args.stream, bytes = payload.len(), "payload sent");
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let mut buf = Vec::new();
    io::stdin()
        .read_to_end(&mut buf)
        .map_err(|err| io_error("failed reading stdin", err))?;
    Ok(buf)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
