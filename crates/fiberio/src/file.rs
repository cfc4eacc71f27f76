//! Regular file I/O.
//!
//! Files route through the same [`fiberio_runtime::io_await`] path as
//! sockets, just against `Open`/`Read`/`Write`/`Close` ops instead of
//! `Accept`/`Connect`/`Recv`/`Send`. Grounded on the busy-loop backend's own
//! `poll_open`/`poll_read`/`poll_write` (`fiberio-backends/src/busy.rs`),
//! which this module's fallback path mirrors directly with `pread`/`pwrite`
//! so a positioned read/write never disturbs a shared file offset.

use crate::fallback::{classify_wouldblock, yield_until};
use fiberio_core::backend::Capabilities;
use fiberio_core::completion::CompletionResult;
use fiberio_core::error::{RtError, RtResult};
use fiberio_core::job::AioOp;
use fiberio_runtime::{current_capabilities, io_await};
use std::ffi::CString;

/// An open file. Reads and writes are positioned (`pread`/`pwrite`
/// semantics) — there is no implicit cursor to race across concurrent
/// frames sharing a `File`.
pub struct File {
    fd: i32,
}

impl File {
    /// Open `path` with the given `open(2)` `flags`/`mode`.
    pub fn open(path: &str, flags: i32, mode: u32) -> RtResult<File> {
        let cpath = CString::new(path)
            .map_err(|_| RtError::Unexpected(std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains a NUL byte")))?;

        let fd = if current_capabilities().contains(Capabilities::OPEN) {
            match io_await(AioOp::Open { path: cpath, flags, mode })? {
                CompletionResult::Fd(fd) => fd,
                other => unreachable!("open completion must carry a fd, got {:?}", other),
            }
        } else {
            let ret = unsafe { libc::open(cpath.as_ptr(), flags, mode as libc::mode_t) };
            if ret < 0 {
                return Err(RtError::from(std::io::Error::last_os_error()));
            }
            ret
        };

        Ok(File { fd })
    }

    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes read (`0` at EOF).
    pub fn read(&self, buf: &mut [u8], offset: i64) -> RtResult<usize> {
        let ptr = buf.as_mut_ptr();
        let len = buf.len();
        let n = if current_capabilities().contains(Capabilities::READ) {
            match io_await(AioOp::Read { fd: self.fd, buf: ptr, len, offset })? {
                CompletionResult::Value(n) => n,
                other => unreachable!("read completion must carry a value, got {:?}", other),
            }
        } else {
            yield_until(|| {
                let ret = unsafe { libc::pread(self.fd, ptr as *mut libc::c_void, len, offset) };
                if ret >= 0 {
                    return Ok(Some(ret as i64));
                }
                classify_wouldblock()
            })?
        };
        Ok(n as usize)
    }

    /// Write `buf` starting at `offset`, returning the number of bytes
    /// actually written.
    pub fn write(&self, buf: &[u8], offset: i64) -> RtResult<usize> {
        let ptr = buf.as_ptr();
        let len = buf.len();
        let n = if current_capabilities().contains(Capabilities::WRITE) {
            match io_await(AioOp::Write { fd: self.fd, buf: ptr, len, offset })? {
                CompletionResult::Value(n) => n,
                other => unreachable!("write completion must carry a value, got {:?}", other),
            }
        } else {
            yield_until(|| {
                let ret = unsafe { libc::pwrite(self.fd, ptr as *const libc::c_void, len, offset) };
                if ret >= 0 {
                    return Ok(Some(ret as i64));
                }
                classify_wouldblock()
            })?
        };
        Ok(n as usize)
    }

    /// Read until `buf` is full or EOF is reached, returning the short
    /// count in the EOF case.
    pub fn read_all(&self, buf: &mut [u8], offset: i64) -> RtResult<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.read(&mut buf[total..], offset + total as i64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Close through the runtime; idempotent.
    pub fn close(&mut self) -> RtResult<()> {
        if self.fd < 0 {
            return Ok(());
        }
        let fd = self.fd;
        self.fd = -1;
        if current_capabilities().contains(Capabilities::CLOSE) {
            io_await(AioOp::Close { fd })?;
        } else {
            let ret = unsafe { libc::close(fd) };
            if ret != 0 {
                return Err(RtError::from(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    /// Synchronous close for use outside a running frame.
    pub fn close_blocking(&mut self) {
        if self.fd < 0 {
            return;
        }
        let fd = self.fd;
        self.fd = -1;
        unsafe { libc::close(fd) };
    }

    pub fn as_raw_fd(&self) -> i32 {
        self.fd
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_reports_unexpected_error() {
        let err = File::open("/no/such/path/fiberio-test", libc::O_RDONLY, 0).unwrap_err();
        assert!(matches!(err, RtError::Unexpected(_)));
    }

    #[test]
    fn write_then_read_round_trips() {
        let path = std::env::temp_dir().join(format!("fiberio-file-test-{}", std::process::id()));
        let path = path.to_str().unwrap();
        let mut file = File::open(path, libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC, 0o600).unwrap();
        let n = file.write(b"hello", 0).unwrap();
        assert_eq!(n, 5);
        let mut buf = [0u8; 5];
        let n = file.read(&mut buf, 0).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
        file.close_blocking();
        let _ = std::fs::remove_file(path);
    }
}
