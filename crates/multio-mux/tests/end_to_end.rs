#![cfg(unix)]

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use multio_frame::{encode, Frame, FrameWriter, PAGE_SIZE};
use multio_mux::{MuxConfig, MuxError, Multiplexer};

const HELLO: &[u8] = b"Hello World!!!\n";

fn engine_pair() -> (Multiplexer, Multiplexer) {
    let (left, right) = UnixStream::pair().unwrap();
    (
        Multiplexer::from_stream(left).unwrap(),
        Multiplexer::from_stream(right).unwrap(),
    )
}

#[test]
fn hello_world_over_stream_zero() {
    let (a, b) = engine_pair();

    let sender = thread::spawn(move || {
        let mut writer = a.writer(0);
        writer.write_all(HELLO).unwrap();
        writer.close().unwrap();
        a
    });

    let mut reader = b.reader(0);
    let mut received = Vec::new();
    reader.read_to_end(&mut received).unwrap();
    assert_eq!(received, HELLO);

    let a = sender.join().unwrap();
    a.close().unwrap();
    b.close().unwrap();
}

#[test]
fn engines_over_separate_pipes() {
    // A writes on one socket pair, B writes on another.
    let (a_out, b_in) = UnixStream::pair().unwrap();
    let (b_out, a_in) = UnixStream::pair().unwrap();
    let a = Multiplexer::new(a_in, a_out).unwrap();
    let b = Multiplexer::new(b_in, b_out).unwrap();

    let mut reader = b.reader(0);
    let writer = thread::spawn(move || {
        let mut w = a.writer(0);
        w.write_all(HELLO).unwrap();
        w.close().unwrap();
        a
    });

    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    assert_eq!(text.as_bytes(), HELLO);

    let _a = writer.join().unwrap();
    b.close().unwrap();
}

#[test]
fn streams_do_not_cross_deliver() {
    let (a, b) = engine_pair();
    let mut r0 = b.reader(0);
    let mut r1 = b.reader(1);

    let w0 = a.writer(0);
    let w1 = a.writer(1);
    let t0 = thread::spawn(move || {
        for _ in 0..10 {
            (&w0).send_all(b"zero");
        }
        w0.close().unwrap();
    });
    let t1 = thread::spawn(move || {
        for _ in 0..10 {
            (&w1).send_all(b"one");
        }
        w1.close().unwrap();
    });

    let reader1 = thread::spawn(move || {
        let mut got = String::new();
        r1.read_to_string(&mut got).unwrap();
        got
    });
    let mut got0 = String::new();
    r0.read_to_string(&mut got0).unwrap();
    let got1 = reader1.join().unwrap();

    assert_eq!(got0, "zero".repeat(10));
    assert_eq!(got1, "one".repeat(10));

    t0.join().unwrap();
    t1.join().unwrap();
    a.close().unwrap();
    b.close().unwrap();
}

trait SendAll {
    fn send_all(self, buf: &[u8]);
}

impl SendAll for &multio_mux::StreamWriter {
    fn send_all(self, mut buf: &[u8]) {
        while !buf.is_empty() {
            let n = self.send(buf).unwrap();
            buf = &buf[n..];
        }
    }
}

#[test]
fn close_unblocks_peer_reader() {
    let (a, b) = engine_pair();
    let mut reader = b.reader(0);
    let (done_tx, done_rx) = mpsc::channel();

    let t = thread::spawn(move || {
        let n = reader.read(&mut [0u8; 16]).unwrap();
        done_tx.send(n).unwrap();
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    a.writer(0).close().unwrap();
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);

    t.join().unwrap();
    a.close().unwrap();
    b.close().unwrap();
}

#[test]
fn write_blocks_until_acknowledged() {
    let (a, b) = engine_pair();
    let (done_tx, done_rx) = mpsc::channel();

    let writer = a.writer(4);
    let t = thread::spawn(move || {
        let n = writer.send(b"wait for me").unwrap();
        done_tx.send(n).unwrap();
        writer
    });

    // Nobody has read stream 4 yet.
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    let mut reader = b.reader(4);
    let mut buf = [0u8; 64];
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"wait for me");
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 11);

    t.join().unwrap().close().unwrap();
    a.close().unwrap();
    b.close().unwrap();
}

#[test]
fn small_read_buffer_loses_nothing() {
    let (a, b) = engine_pair();
    let payload: Vec<u8> = (0..=255u8).cycle().take(3 * PAGE_SIZE + 17).collect();
    let expected = payload.clone();

    let t = thread::spawn(move || {
        let mut w = a.writer(2);
        w.write_all(&payload).unwrap();
        w.close().unwrap();
        a
    });

    let mut reader = b.reader(2);
    let mut received = Vec::new();
    let mut chunk = [0u8; 100];
    loop {
        let n = reader.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(received, expected);

    t.join().unwrap().close().unwrap();
    b.close().unwrap();
}

#[test]
fn combined_stream_echoes() {
    let (a, b) = engine_pair();

    let echo = thread::spawn(move || {
        let mut stream = b.stream(1);
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        stream.write_all(&buf).unwrap();
        stream.close().unwrap();
        b
    });

    let mut stream = a.stream(1);
    stream.write_all(b"ping").unwrap();
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"ping");
    stream.close().unwrap();

    echo.join().unwrap().close().unwrap();
    a.close().unwrap();
}

#[test]
fn peer_eof_tears_down_and_unblocks_reader() {
    let (left, right) = UnixStream::pair().unwrap();
    let b = Multiplexer::from_stream(right).unwrap();
    let mut reader = b.reader(0);
    let writer = b.writer(0);

    drop(left);

    assert_eq!(reader.read(&mut [0u8; 8]).unwrap(), 0);
    b.join().unwrap();
    assert!(b.is_closed());
    assert!(matches!(
        writer.send(b"late"),
        Err(MuxError::StreamClosed { stream_id: 0 })
    ));
}

#[test]
fn unknown_kind_surfaces_through_join() {
    let (mut raw, right) = UnixStream::pair().unwrap();
    let b = Multiplexer::from_stream(right).unwrap();
    let mut reader = b.reader(3);

    raw.write_all(&encode(&Frame::new(
        multio_frame::FrameKind::Unknown(7),
        3,
        Bytes::new(),
    )))
    .unwrap();

    assert_eq!(reader.read(&mut [0u8; 8]).unwrap(), 0);
    let err = b.join().unwrap_err();
    assert!(matches!(err, MuxError::UnknownKind { kind: 7, stream_id: 3 }));
}

#[test]
fn invalid_frame_does_not_stop_read_loop() {
    let (raw, right) = UnixStream::pair().unwrap();
    let b = Multiplexer::from_stream(right).unwrap();
    let mut reader = b.reader(0);

    let mut bad = encode(&Frame::data(0, Bytes::from_static(b"bad"))).to_vec();
    bad[3] = 2;
    let mut frames = FrameWriter::new(raw);
    frames.get_ref().try_clone().unwrap().write_all(&bad).unwrap();
    frames
        .write_frame(&Frame::data(0, Bytes::from_static(b"good")))
        .unwrap();

    let mut buf = [0u8; 8];
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"good");
    assert!(!b.is_closed());

    b.close().unwrap();
    drop(frames);
}

#[test]
fn oversized_writes_are_split_at_max_payload() {
    let (left, right) = UnixStream::pair().unwrap();
    let config = MuxConfig {
        max_payload: 8,
        ..MuxConfig::default()
    };
    let a = Multiplexer::builder()
        .stream(left)
        .unwrap()
        .config(config.clone())
        .build()
        .unwrap();
    let b = Multiplexer::builder()
        .stream(right)
        .unwrap()
        .config(config)
        .build()
        .unwrap();

    let writer = a.writer(0);
    let t = thread::spawn(move || writer.send(b"0123456789abcdef!"));

    let mut reader = b.reader(0);
    let mut buf = [0u8; 32];
    let n = reader.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"01234567");
    assert_eq!(t.join().unwrap().unwrap(), 8);

    a.close().unwrap();
    b.close().unwrap();
}

#[test]
fn close_is_idempotent_and_ends_streams() {
    let (a, b) = engine_pair();
    let mut reader = a.reader(9);

    a.close().unwrap();
    a.close().unwrap();
    assert!(a.is_closed());
    assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), 0);

    // Closing `a` shut the shared socket down, so `b` sees end of input.
    b.join().unwrap();
    assert!(b.is_closed());
}

#[test]
fn unread_stream_does_not_block_others() {
    let (a, b) = engine_pair();

    // Stream 0 has no reader yet; its frame waits in b's delivery.
    let stuck = a.writer(0);
    let (stuck_tx, stuck_rx) = mpsc::channel();
    let t0 = thread::spawn(move || {
        stuck_tx.send(stuck.send(b"nobody reads me yet")).unwrap();
        stuck
    });
    assert!(stuck_rx.recv_timeout(Duration::from_millis(100)).is_err());

    let w1 = a.writer(1);
    let t1 = thread::spawn(move || {
        (&w1).send_all(b"still flowing");
        w1.close().unwrap();
    });
    let (got_tx, got_rx) = mpsc::channel();
    let mut r1 = b.reader(1);
    thread::spawn(move || {
        let mut text = String::new();
        r1.read_to_string(&mut text).unwrap();
        got_tx.send(text).unwrap();
    });
    assert_eq!(
        got_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        "still flowing"
    );
    t1.join().unwrap();

    let mut r0 = b.reader(0);
    let mut buf = [0u8; 64];
    let n = r0.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"nobody reads me yet");
    assert_eq!(stuck_rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(), 19);

    t0.join().unwrap().close().unwrap();
    a.close().unwrap();
    b.close().unwrap();
}

#[test]
fn close_during_frame_flood_leaves_no_lanes() {
    for _ in 0..20 {
        let (raw, right) = UnixStream::pair().unwrap();
        let b = Multiplexer::from_stream(right).unwrap();

        let flood = thread::spawn(move || {
            let mut frames = FrameWriter::new(raw);
            for id in (0u32..64).cycle() {
                let frame = if id % 2 == 0 {
                    Frame::data(id, Bytes::from_static(b"flood"))
                } else {
                    // Nobody waits on these acks; they park the read loop.
                    Frame::ack(id)
                };
                if frames.write_frame(&frame).is_err() {
                    return;
                }
            }
        });

        thread::sleep(Duration::from_millis(5));
        b.close().unwrap();
        b.join().unwrap();
        assert_eq!(b.stream_count(), 0);
        flood.join().unwrap();
    }
}

#[derive(Clone, Default)]
struct Capture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn injected_dispatch_receives_engine_events() {
    let capture = Capture::default();
    let sink = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish();

    let (left, _right) = UnixStream::pair().unwrap();
    let mux = Multiplexer::builder()
        .stream(left)
        .unwrap()
        .config(MuxConfig {
            name: "traced".to_string(),
            ..MuxConfig::default()
        })
        .dispatch(tracing::Dispatch::new(subscriber))
        .build()
        .unwrap();
    mux.close().unwrap();
    mux.join().unwrap();

    let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("multiplexer started"), "{logs}");
    assert!(logs.contains("read loop finished"), "{logs}");
    assert!(logs.contains("traced"), "{logs}");
}
