// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A cancellation token that can interrupt a blocked wait.

use crate::Result;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A process-wide cancellation token.
///
/// Cloneable and settable from any thread, including an interrupt
/// notification handler. In addition to the flag the token carries a
/// self-pipe: [`cancel`](CancelToken::cancel) writes to the pipe, so a
/// wait blocked in `ppoll` on [`read_fd`](CancelToken::read_fd) returns
/// promptly rather than noticing the flag on some later iteration.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    read_fd: RawFd,
    write_fd: RawFd,
}

impl CancelToken {
    /// Create a new, uncancelled token.
    pub fn new() -> Result<CancelToken> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        // SAFETY: fds is a valid two element array.
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) } == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                read_fd: fds[0],
                write_fd: fds[1],
            }),
        })
    }

    /// Cancel the token, waking any wait blocked on [`read_fd`].
    ///
    /// Idempotent - only the first call writes to the pipe.
    ///
    /// [`read_fd`]: CancelToken::read_fd
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            let buf = [1u8];
            // a full pipe means a wake is already pending, so the
            // result can be ignored
            // SAFETY: buf outlives the call.
            unsafe { libc::write(self.inner.write_fd, buf.as_ptr().cast(), 1) };
        }
    }

    /// Returns true once [`cancel`](CancelToken::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The fd that becomes readable when the token is cancelled.
    ///
    /// Intended to be polled alongside a request fd.
    pub fn read_fd(&self) -> RawFd {
        self.inner.read_fd
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // SAFETY: the fds are exclusively owned by this Inner.
        unsafe {
            libc::close(self.write_fd);
            libc::close(self.read_fd);
        }
    }
}
