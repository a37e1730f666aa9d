use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use multio_frame::PAGE_SIZE;
use multio_mux::{Multiplexer, MuxError, Result};

use crate::cmd::DemoArgs;
use crate::exit::{mux_error, CliResult, SUCCESS};

pub fn run(args: DemoArgs) -> CliResult<i32> {
    let mut stdout = io::stdout().lock();
    let both = !args.simple_pipe && !args.read_writer;

    if args.simple_pipe || both {
        simple_pipe(&mut stdout).map_err(|err| mux_error("simple-pipe demo failed", err))?;
    }
    if args.read_writer || both {
        read_writer(&mut stdout).map_err(|err| mux_error("read-writer demo failed", err))?;
    }
    Ok(SUCCESS)
}

/// Two engines joined by one socket pair per direction, the way two
/// processes would be joined by a pair of pipes.
fn pipe_pair() -> Result<(Multiplexer, Multiplexer)> {
    let (a_out, b_in) = UnixStream::pair()?;
    let (b_out, a_in) = UnixStream::pair()?;
    Ok((engine(a_in, a_out)?, engine(b_in, b_out)?))
}

fn engine(input: UnixStream, output: UnixStream) -> Result<Multiplexer> {
    Multiplexer::builder()
        .reader(input.try_clone()?)
        .writer(output.try_clone()?)
        .closer(input)
        .closer(output)
        .build()
}

/// Stream 0 and stream 1 from one side to the other, copied to `out` in order.
pub fn simple_pipe(out: &mut impl Write) -> Result<()> {
    let (a, b) = pipe_pair()?;

    let sender = thread::spawn(move || -> Result<Multiplexer> {
        let mut first = a.writer(0);
        let mut second = a.writer(1);
        // Stream 1 is only read after stream 0 ends, so close 0 first.
        first.write_all(b"Hello World!!!\n")?;
        first.close()?;
        second.write_all(b"Hello the World!!!\n")?;
        second.close()?;
        Ok(a)
    });

    let mut first = b.reader(0);
    let mut second = b.reader(1);
    io::copy(&mut first, &mut *out)?;
    io::copy(&mut second, &mut *out)?;

    let a = join_demo(sender)?;
    a.close()?;
    b.close()
}

/// One side writes and then reads back whatever the other side echoes.
pub fn read_writer(out: &mut impl Write) -> Result<()> {
    let (a, b) = pipe_pair()?;

    let client = thread::spawn(move || -> Result<(Multiplexer, Vec<u8>)> {
        let mut stream = a.stream(0);
        stream.write_all(b"Hello World!!!\n")?;
        let mut echoed = Vec::new();
        stream.read_to_end(&mut echoed)?;
        stream.close()?;
        Ok((a, echoed))
    });

    let mut stream = b.stream(0);
    let mut buf = vec![0u8; PAGE_SIZE];
    let n = stream.read(&mut buf)?;
    stream.write_all(&buf[..n])?;
    stream.close()?;

    let (a, echoed) = join_demo(client)?;
    out.write_all(&echoed)?;
    a.close()?;
    b.close()
}

fn join_demo<T>(handle: thread::JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(MuxError::Io(io::Error::other("demo thread panicked"))))
}
