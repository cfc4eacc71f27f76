//! Spawns several frames that sleep for different durations, demonstrating
//! that a blocked frame never blocks its siblings.
//!
//! Usage:
//!     timer [backend]

use fiberio::{Runtime, RuntimeConfig};
use std::time::Duration;

fn main() {
    let backend = std::env::args().nth(1).unwrap_or_default();
    let mut rt = Runtime::new(RuntimeConfig::from_env().backend(backend)).expect("runtime construction failed");
    eprintln!("timer: selected {} backend", rt.backend_kind().as_str());

    rt.entry(|| {
        let delays_ms = [300u64, 100, 200];
        let mut handles = Vec::new();
        for (i, ms) in delays_ms.into_iter().enumerate() {
            let handle = fiberio::spawn(
                move || {
                    eprintln!("timer: frame {i} sleeping {ms}ms");
                    fiberio::sleep(Duration::from_millis(ms)).expect("sleep failed");
                    eprintln!("timer: frame {i} woke up");
                },
                64 * 1024,
            )
            .expect("spawn failed");
            handles.push(handle);
        }
        fiberio::stop();
    })
    .expect("runtime entry failed");
}
