//! Prints a file's contents through the fiberio file I/O surface.
//!
//! Usage:
//!     cat <path>
//!
//! A missing or unreadable path reports the runtime's error taxonomy
//! rather than a raw errno, and exits non-zero.

use fiberio::{File, Runtime, RuntimeConfig};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

fn main() {
    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: cat <path>");
            std::process::exit(2);
        }
    };

    let mut rt = Runtime::new(RuntimeConfig::from_env()).expect("runtime construction failed");
    let exit_code = Arc::new(AtomicI32::new(0));

    rt.entry({
        let exit_code = Arc::clone(&exit_code);
        move || {
            if let Err(e) = run(&path) {
                eprintln!("cat: {path}: {e}");
                exit_code.store(1, Ordering::SeqCst);
            }
            fiberio::stop();
        }
    })
    .expect("runtime entry failed");

    std::process::exit(exit_code.load(Ordering::SeqCst));
}

fn run(path: &str) -> fiberio::RtResult<()> {
    let file = File::open(path, libc::O_RDONLY, 0)?;
    let mut buf = [0u8; 8192];
    let mut offset = 0i64;
    loop {
        let n = file.read(&mut buf, offset)?;
        if n == 0 {
            break;
        }
        use std::io::Write;
        std::io::stdout().write_all(&buf[..n]).expect("stdout write failed");
        offset += n as i64;
    }
    Ok(())
}
