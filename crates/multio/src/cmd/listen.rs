use std::io::{self, Read};
use std::thread;

use crossbeam::channel::{self, Sender};
use multio_frame::PAGE_SIZE;
use multio_mux::{Multiplexer, StreamReader};
use multio_transport::UnixDomainSocket;
use tracing::{debug, info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{io_error, mux_error, transport_error, CliError, CliResult, INTERRUPTED, SUCCESS};
use crate::output::{print_chunk, print_closed, OutputFormat};

enum Event {
    Data(u32, Vec<u8>),
    Closed(u32),
    Failed(u32, io::Error),
    Interrupted,
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut streams = args.streams.clone();
    streams.sort_unstable();
    streams.dedup();

    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let conn = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    let mux = Multiplexer::from_stream(conn).map_err(|err| mux_error("session setup failed", err))?;
    info!(path = ?args.path, ?streams, "peer connected");

    let (events_tx, events) = channel::unbounded();
    install_ctrlc_handler(events_tx.clone())?;
    for &id in &streams {
        let reader = mux.reader(id);
        let tx = events_tx.clone();
        thread::Builder::new()
            .name(format!("listen-{id}"))
            .spawn(move || pump(reader, &tx))
            .map_err(|err| io_error("failed to start stream reader", err))?;
    }

    let mut stdout = io::stdout().lock();
    let mut open = streams.len();
    let mut printed = 0usize;
    let mut outcome = Ok(SUCCESS);

    while open > 0 {
        let Ok(event) = events.recv() else {
            break;
        };
        match event {
            Event::Data(id, data) => {
                print_chunk(&mut stdout, id, &data, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    debug!(printed, "chunk count reached");
                    break;
                }
            }
            Event::Closed(id) => {
                print_closed(&mut stdout, id, format);
                open -= 1;
            }
            Event::Failed(id, err) => {
                outcome = Err(io_error(&format!("read on stream {id} failed"), err));
                break;
            }
            Event::Interrupted => {
                warn!("interrupted");
                outcome = Ok(INTERRUPTED);
                break;
            }
        }
    }

    mux.close()
        .map_err(|err| mux_error("closing session failed", err))?;
    mux.join().map_err(|err| mux_error("session failed", err))?;
    outcome
}

/// Forward everything read from one stream to the printing loop.
fn pump(mut reader: StreamReader, events: &Sender<Event>) {
    let id = reader.id();
    let mut buf = vec![0u8; PAGE_SIZE];
    loop {
        let event = match reader.read(&mut buf) {
            Ok(0) => Event::Closed(id),
            Ok(n) => Event::Data(id, buf[..n].to_vec()),
            Err(err) => Event::Failed(id, err),
        };
        let last = !matches!(event, Event::Data(..));
        if events.send(event).is_err() || last {
            return;
        }
    }
}

fn install_ctrlc_handler(events: Sender<Event>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = events.send(Event::Interrupted);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
