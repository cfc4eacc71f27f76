//! TCP echo server, driven by a fiberio runtime.
//!
//! Each connection gets its own frame; the frame's code reads top to bottom
//! like a blocking echo loop even though `recv`/`send` suspend onto
//! whatever backend the runtime selected.
//!
//! Usage:
//!     echo [port] [backend]
//!     echo 9999 uring

use fiberio::{Endpoint, RtError, Runtime, RuntimeConfig, Socket};

fn main() {
    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(9999);
    let backend = args.next().unwrap_or_default();

    let config = RuntimeConfig::from_env().backend(backend);
    let mut rt = Runtime::new(config).expect("runtime construction failed");
    eprintln!("echo: selected {} backend, listening on 0.0.0.0:{}", rt.backend_kind().as_str(), port);

    rt.entry(move || {
        let mut listener = Socket::init(Endpoint::Tcp { host: "0.0.0.0", port }).expect("socket init failed");
        listener.bind().expect("bind failed");
        listener.listen(1024).expect("listen failed");

        loop {
            match listener.accept() {
                Ok(conn) => {
                    let _ = fiberio::spawn(move || handle(conn), 64 * 1024);
                }
                Err(e) => {
                    eprintln!("echo: accept failed: {e}");
                }
            }
        }
    })
    .expect("runtime entry failed");
}

fn handle(conn: Socket) {
    let mut buf = [0u8; 4096];
    loop {
        let n = match conn.recv(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.is_closed() => break,
            Err(e) => {
                eprintln!("echo: recv failed: {e}");
                break;
            }
        };

        if let Err(e) = conn.send_all(&buf[..n]) {
            if !matches!(e, RtError::Closed) {
                eprintln!("echo: send failed: {e}");
            }
            break;
        }
    }
}
