//! Simple pipe example: two streams from one side to the other.
//!
//! Run with:
//!   cargo run --example simple-pipe

use std::io::{self, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use multio::Multiplexer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // One socket pair per direction, as two processes joined by pipes would be.
    let (a_out, b_in) = UnixStream::pair()?;
    let (b_out, a_in) = UnixStream::pair()?;

    let sender = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let mux = Multiplexer::builder()
                .reader(a_in.try_clone()?)
                .writer(a_out.try_clone()?)
                .closer(a_in)
                .closer(a_out)
                .build()?;

            let mut first = mux.writer(0);
            let mut second = mux.writer(1);

            // The reader drains stream 0 before it looks at stream 1, so
            // stream 0 has to be closed before anything is written to 1.
            first.write_all(b"Hello World!!!\n")?;
            first.close()?;
            second.write_all(b"Hello the World!!!\n")?;
            second.close()?;

            mux.close()?;
            Ok(())
        },
    );

    let mux = Multiplexer::builder()
        .reader(b_in.try_clone()?)
        .writer(b_out.try_clone()?)
        .closer(b_in)
        .closer(b_out)
        .build()?;

    let mut first = mux.reader(0);
    let mut second = mux.reader(1);
    let mut stdout = io::stdout();
    io::copy(&mut first, &mut stdout)?;
    io::copy(&mut second, &mut stdout)?;

    match sender.join() {
        Ok(result) => result.map_err(|err| err as Box<dyn std::error::Error>)?,
        Err(_) => return Err("sender thread panicked".into()),
    }
    mux.close()?;
    Ok(())
}
