//! Scenario E: a peer that drops the connection mid-transfer produces a
//! short `recv_all` count rather than a propagated error.

use fiberio::{Endpoint, Runtime, RuntimeConfig, Socket};
use std::net::TcpStream;
use std::sync::mpsc;

#[test]
fn recv_all_returns_a_short_count_when_the_peer_drops() {
    let (port_tx, port_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let handle = std::thread::spawn(move || {
        let mut rt = Runtime::new(RuntimeConfig::new().backend("busy")).expect("runtime construction");
        rt.entry(move || {
            let mut listener = Socket::init(Endpoint::Tcp { host: "127.0.0.1", port: 0 }).expect("init");
            listener.bind().expect("bind");
            listener.listen(16).expect("listen");
            let port = listener.local_port().expect("local_port");
            let _ = port_tx.send(port);

            let conn = listener.accept().expect("accept");
            let mut buf = [0u8; 32];
            // Peer sends 4 bytes then closes: recv_all asks for 32 and must
            // come back with a short count, not an error.
            let n = conn.recv_all(&mut buf).expect("recv_all must not error on a peer drop");
            let _ = done_tx.send(n);
            fiberio::stop();
        })
        .expect("entry");
    });

    let port = port_rx.recv().expect("server never reported a port");
    {
        use std::io::Write;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.write_all(b"ping").expect("write");
        // stream drops here, closing the connection before 32 bytes arrive.
    }

    let n = done_rx.recv().expect("server never reported a result");
    assert_eq!(n, 4);

    handle.join().unwrap();
}
