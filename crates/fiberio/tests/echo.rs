//! End-to-end echo round-trip over a loopback TCP socket, driven by a real
//! `Runtime`: a client writes N bytes, the server echoes them back
//! unchanged.

use fiberio::{Endpoint, Runtime, RuntimeConfig, Socket};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;

fn run_with_backend(backend: &str) {
    let (port_tx, port_rx) = mpsc::channel();

    let handle = std::thread::spawn({
        let backend = backend.to_string();
        move || {
            let mut rt = match Runtime::new(RuntimeConfig::new().backend(backend)) {
                Ok(rt) => rt,
                Err(_) => {
                    // Backend unavailable on this machine (e.g. no io_uring
                    // support in the kernel/container); tell the client side
                    // to skip rather than hang waiting for a port.
                    let _ = port_tx.send(None);
                    return;
                }
            };
            rt.entry(move || {
                let mut listener = Socket::init(Endpoint::Tcp { host: "127.0.0.1", port: 0 }).expect("init");
                listener.bind().expect("bind");
                listener.listen(16).expect("listen");
                let port = listener.local_port().expect("local_port");
                let _ = port_tx.send(Some(port));

                let conn = listener.accept().expect("accept");
                let mut buf = [0u8; 64];
                let n = conn.recv(&mut buf).expect("recv");
                conn.send_all(&buf[..n]).expect("send_all");
                fiberio::stop();
            })
            .expect("entry");
        }
    });

    let Some(port) = port_rx.recv().expect("server thread died before reporting a port") else {
        handle.join().unwrap();
        return;
    };

    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    stream.write_all(b"hello fiberio").expect("write");
    let mut out = [0u8; 64];
    let n = stream.read(&mut out).expect("read");
    assert_eq!(&out[..n], b"hello fiberio");

    handle.join().unwrap();
}

#[test]
fn echo_round_trip_busy_backend() {
    run_with_backend("busy");
}

#[test]
fn echo_round_trip_readiness_backend() {
    run_with_backend("readiness");
}
