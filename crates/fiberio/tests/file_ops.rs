//! File I/O scenario: writing then reading a temp file, and the
//! missing-path error case (scenario B from the testable-properties list).

use fiberio::{File, Runtime, RuntimeConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn cat_missing_file_reports_an_error() {
    let mut rt = Runtime::new(RuntimeConfig::new()).expect("runtime construction");
    let saw_error = Arc::new(AtomicBool::new(false));

    rt.entry({
        let saw_error = Arc::clone(&saw_error);
        move || {
            let outcome = File::open("/no/such/path/fiberio-missing", libc::O_RDONLY, 0);
            saw_error.store(outcome.is_err(), Ordering::SeqCst);
            fiberio::stop();
        }
    })
    .expect("entry");

    assert!(saw_error.load(Ordering::SeqCst));
}

#[test]
fn write_then_read_back_full_contents() {
    let mut rt = Runtime::new(RuntimeConfig::new()).expect("runtime construction");
    let path = std::env::temp_dir().join(format!("fiberio-it-{}.txt", std::process::id()));
    let path_str = path.to_str().unwrap().to_string();

    rt.entry(move || {
        let mut file = File::open(&path_str, libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC, 0o600).expect("open");
        let written = file.write(b"the quick brown fox", 0).expect("write");
        assert_eq!(written, 20);

        let mut buf = [0u8; 20];
        let read = file.read_all(&mut buf, 0).expect("read_all");
        assert_eq!(read, 20);
        assert_eq!(&buf, b"the quick brown fox");

        file.close().expect("close");
        let _ = std::fs::remove_file(&path_str);
        fiberio::stop();
    })
    .expect("entry");
}
