//! Read-writer example: one combined stream, written to and echoed back.
//!
//! Run with:
//!   cargo run --example read-writer

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use multio::frame::PAGE_SIZE;
use multio::Multiplexer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = UnixStream::pair()?;

    let client = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let mux = Multiplexer::from_stream(left)?;
            let mut stream = mux.stream(0);

            stream.write_all(b"Hello World!!!\n")?;
            // Everything the other side echoes, until it closes the stream.
            io::copy(&mut stream, &mut io::stdout())?;
            stream.close()?;

            mux.close()?;
            Ok(())
        },
    );

    let mux = Multiplexer::from_stream(right)?;
    let mut stream = mux.stream(0);

    let mut buf = vec![0u8; PAGE_SIZE];
    let n = stream.read(&mut buf)?;
    stream.write_all(&buf[..n])?;
    stream.close()?;

    match client.join() {
        Ok(result) => result.map_err(|err| err as Box<dyn std::error::Error>)?,
        Err(_) => return Err("client thread panicked".into()),
    }
    mux.close()?;
    Ok(())
}
