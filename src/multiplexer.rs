//! PTY I/O multiplexer (§4.8): a single dedicated worker polls every live
//! pane's master fd and feeds bytes into it. Grounded on the teacher's
//! `agent/pty/mod.rs` `PtySession` — master fd ownership and the
//! kill-on-hangup intent carry over — but restructured from the teacher's
//! one-thread-per-pty `reader_thread` into a single poll-based worker, since
//! the latter is what this daemon's fd cap and wake-pipe model call for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::Session;

/// Hard cap on simultaneously polled master fds (§4.8).
pub const MAX_POLLED_PANES: usize = 64;
const READ_BUF_SIZE: usize = 4096;
const POLL_TIMEOUT_MS: i32 = 1000;
const IDLE_SLEEP_MS: u64 = 100;

/// One end of the wake pipe: written after every feed so client-facing
/// workers blocked in their own `poll` wake up and re-check pane state.
pub struct WakePipe {
    read_fd: i32,
    write_fd: i32,
}

impl WakePipe {
    pub fn new() -> std::io::Result<Self> {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(WakePipe {
            read_fd: fds[0],
            write_fd: fds[1],
        })
    }

    pub fn read_fd(&self) -> i32 {
        self.read_fd
    }

    pub fn signal(&self) {
        let byte = [1u8];
        unsafe {
            libc::write(self.write_fd, byte.as_ptr() as *const libc::c_void, 1);
        }
    }

    /// Drain any pending wake bytes so the fd doesn't stay perpetually readable.
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }
}

impl Drop for WakePipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

/// Run the multiplexer loop until `shutdown` is set. Intended to be spawned
/// on its own OS thread (§5 "PTY reader thread").
pub fn run(session: Arc<Session>, wake: Arc<WakePipe>, shutdown: Arc<AtomicBool>) {
    let mut read_buf = [0u8; READ_BUF_SIZE];

    while !shutdown.load(Ordering::Relaxed) {
        let live: Vec<(u64, Arc<std::sync::Mutex<crate::pane::Pane>>, i32)> = session
            .pane_snapshot()
            .into_iter()
            .filter_map(|(id, pane)| {
                let fd = {
                    let guard = pane.lock().expect("pane lock poisoned");
                    pane_master_fd(&guard)
                };
                fd.map(|fd| (id, pane, fd))
            })
            .take(MAX_POLLED_PANES)
            .collect();

        if live.is_empty() {
            std::thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
            continue;
        }

        let mut pollfds: Vec<libc::pollfd> = live
            .iter()
            .map(|(_, _, fd)| libc::pollfd {
                fd: *fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, POLL_TIMEOUT_MS) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            log::warn!("multiplexer poll failed: {err}");
            std::thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
            continue;
        }
        if rc == 0 {
            continue;
        }

        let mut any_fed = false;
        for ((pane_id, pane, fd), pfd) in live.iter().zip(pollfds.iter()) {
            if pfd.revents & libc::POLLIN != 0 {
                let n = unsafe {
                    libc::read(*fd, read_buf.as_mut_ptr() as *mut libc::c_void, read_buf.len())
                };
                if n > 0 {
                    let mut guard = pane.lock().expect("pane lock poisoned");
                    guard.feed(&read_buf[..n as usize]);
                    any_fed = true;
                } else if n == 0 {
                    log::debug!("pane {pane_id}: pty closed (eof)");
                } else {
                    let err = std::io::Error::last_os_error();
                    if err.kind() != std::io::ErrorKind::WouldBlock {
                        log::debug!("pane {pane_id}: pty read error (likely child exit): {err}");
                    }
                }
            }
            if pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0 {
                // Child exit / PTY closed (§7): reap without signaling and
                // keep the grid around for clients to read back. Tearing a
                // pane down on purpose goes through `Pane::shutdown` on an
                // explicit destroy path, not here.
                let mut guard = pane.lock().expect("pane lock poisoned");
                guard.reap();
            }
        }

        if any_fed {
            wake.signal();
        }
    }
}

fn pane_master_fd(pane: &crate::pane::Pane) -> Option<i32> {
    pane.master_raw_fd()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_pipe_signal_and_drain_roundtrip() {
        let pipe = WakePipe::new().unwrap();
        pipe.signal();
        pipe.signal();
        pipe.drain();
    }

    #[test]
    fn empty_session_does_not_panic_one_iteration() {
        let session = Arc::new(Session::new());
        let wake = Arc::new(WakePipe::new().unwrap());
        let shutdown = Arc::new(AtomicBool::new(true));
        run(session, wake, shutdown);
    }
}
